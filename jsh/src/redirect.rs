//! Active I/O channels and redirection scopes
//!
//! Every read and write in a session goes through [`Channels`]. Redirection
//! pushes a frame and hands back a scope token recording the stack depth;
//! closing the scope truncates the stack to that depth, so frames opened by
//! nested statements are dropped with it even when those statements bailed
//! out early.

use crate::error::{ShellError, ShellResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

/// Where output goes
#[derive(Clone, Debug)]
pub enum Sink {
    Stdout,
    Stderr,
    Memory(Arc<Mutex<Vec<u8>>>),
    File(Arc<File>),
}

impl Sink {
    pub fn memory() -> Self {
        Self::Memory(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn write_bytes(&self, bytes: &[u8]) -> ShellResult<()> {
        match self {
            Self::Stdout => {
                let mut out = std::io::stdout().lock();
                out.write_all(bytes)?;
                out.flush()?;
            }
            Self::Stderr => std::io::stderr().lock().write_all(bytes)?,
            Self::Memory(buf) => buf
                .lock()
                .map_err(|_| std::io::Error::other("capture buffer poisoned"))?
                .extend_from_slice(bytes),
            Self::File(file) => (&**file).write_all(bytes)?,
        }
        Ok(())
    }

    /// Accumulated text of an in-memory sink
    pub fn contents(&self) -> Option<String> {
        match self {
            Self::Memory(buf) => buf
                .lock()
                .ok()
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
            _ => None,
        }
    }

    /// A handle a child process can write to directly; in-memory sinks
    /// need a pipe instead.
    pub fn stdio(&self) -> Option<Stdio> {
        match self {
            Self::Stdout => Some(Stdio::inherit()),
            Self::Stderr => Some(Stdio::from(std::io::stderr())),
            Self::File(file) => file.try_clone().ok().map(Stdio::from),
            Self::Memory(_) => None,
        }
    }
}

/// Line-oriented input supplied by the terminal side of a session
#[async_trait]
pub trait LineSource: Send {
    /// Next line without its terminator; `EndOfInput` once exhausted.
    async fn read_line(&mut self, prompt: &str) -> ShellResult<String>;

    fn is_interactive(&self) -> bool {
        false
    }
}

/// Fixed lines, as if typed one by one
#[derive(Debug, Default)]
pub struct ScriptedSource {
    lines: VecDeque<String>,
    interactive: bool,
}

impl ScriptedSource {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            interactive: false,
        }
    }

    /// Pretend to be a terminal
    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }
}

#[async_trait]
impl LineSource for ScriptedSource {
    async fn read_line(&mut self, _prompt: &str) -> ShellResult<String> {
        self.lines.pop_front().ok_or(ShellError::EndOfInput)
    }

    fn is_interactive(&self) -> bool {
        self.interactive
    }
}

/// Terminal input of background jobs
#[derive(Debug, Default)]
pub struct ClosedSource;

#[async_trait]
impl LineSource for ClosedSource {
    async fn read_line(&mut self, _prompt: &str) -> ShellResult<String> {
        Err(ShellError::NotInteractive)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    /// `<` or `<<` on a statement; external commands consume it as stdin
    Redirect,
    /// Lines of a script being run; only the resolver reads them
    Script,
}

#[derive(Clone)]
struct InputFrame {
    lines: VecDeque<String>,
    kind: InputKind,
}

/// Standard input for an external command
#[derive(Debug, PartialEq, Eq)]
pub enum InputFeed {
    Inherit,
    Null,
    Bytes(Vec<u8>),
}

#[must_use = "an output scope must be closed"]
#[derive(Debug)]
pub struct OutputScope {
    depth: usize,
}

#[must_use = "an input scope must be closed"]
#[derive(Debug)]
pub struct InputScope {
    depth: usize,
}

pub struct Channels {
    input: Box<dyn LineSource>,
    output: Sink,
    error: Sink,
    outputs: Vec<Sink>,
    inputs: Vec<InputFrame>,
}

impl Channels {
    pub fn new(input: Box<dyn LineSource>, output: Sink, error: Sink) -> Self {
        Self {
            input,
            output,
            error,
            outputs: Vec::new(),
            inputs: Vec::new(),
        }
    }

    /// Real stdout/stderr with the given input
    pub fn stdio(input: Box<dyn LineSource>) -> Self {
        Self::new(input, Sink::Stdout, Sink::Stderr)
    }

    /// Channels of a background job: no terminal input, output goes where
    /// the spawner's output currently goes. A redirected statement keeps
    /// what is left of its input.
    pub fn snapshot(&self) -> Self {
        let mut io = Self::new(Box::new(ClosedSource), self.current_sink(), self.error.clone());
        if let Some(frame) = self.inputs.last().filter(|f| f.kind == InputKind::Redirect) {
            io.inputs.push(frame.clone());
        }
        io
    }

    /// Swap the terminal input, e.g. for a line editor
    pub fn set_input(&mut self, input: Box<dyn LineSource>) {
        self.input = input;
    }

    pub fn current_sink(&self) -> Sink {
        self.outputs.last().unwrap_or(&self.output).clone()
    }

    pub fn error_sink(&self) -> &Sink {
        &self.error
    }

    pub fn write(&self, text: &str) -> ShellResult<()> {
        self.current_sink().write_bytes(text.as_bytes())
    }

    pub fn writeln(&self, text: &str) -> ShellResult<()> {
        self.write(&format!("{text}\n"))
    }

    /// Diagnostics always reach the terminal error channel.
    pub fn diagnostic(&self, text: &str) {
        if let Err(e) = self.error.write_bytes(format!("{text}\n").as_bytes()) {
            tracing::warn!(error = %e, "Failed to write diagnostic");
        }
    }

    pub fn open_output(&mut self, sink: Sink) -> OutputScope {
        let depth = self.outputs.len();
        self.outputs.push(sink);
        OutputScope { depth }
    }

    pub fn open_file(&mut self, path: &Path, append: bool) -> ShellResult<OutputScope> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .map_err(|e| ShellError::file_access(path.display(), e))?;
        Ok(self.open_output(Sink::File(Arc::new(file))))
    }

    pub fn capture(&mut self) -> OutputScope {
        self.open_output(Sink::memory())
    }

    /// Restore the channel active before `scope` opened. Returns the text
    /// captured when the scope wrote to memory.
    pub fn close_output(&mut self, scope: OutputScope) -> Option<String> {
        let sink = self.outputs.get(scope.depth).cloned();
        self.outputs.truncate(scope.depth);
        sink.and_then(|s| s.contents())
    }

    pub fn open_input(&mut self, lines: Vec<String>, kind: InputKind) -> InputScope {
        let depth = self.inputs.len();
        self.inputs.push(InputFrame {
            lines: lines.into(),
            kind,
        });
        InputScope { depth }
    }

    pub fn open_input_file(&mut self, path: &Path, kind: InputKind) -> ShellResult<InputScope> {
        let lines = read_text_lines(path)?;
        Ok(self.open_input(lines, kind))
    }

    pub fn close_input(&mut self, scope: InputScope) {
        self.inputs.truncate(scope.depth);
    }

    /// Next line from the innermost input scope, or the terminal when none
    /// is open. An exhausted scope reports `EndOfInput`; it never falls
    /// through to the enclosing one.
    pub async fn read_line(&mut self, prompt: &str) -> ShellResult<String> {
        match self.inputs.last_mut() {
            Some(frame) => frame.lines.pop_front().ok_or(ShellError::EndOfInput),
            None => self.input.read_line(prompt).await,
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.inputs.is_empty() && self.input.is_interactive()
    }

    /// Standard input for an external command. A redirected statement hands
    /// over whatever its scope has left.
    pub fn take_input(&mut self) -> InputFeed {
        match self.inputs.last_mut() {
            Some(frame) if frame.kind == InputKind::Redirect => {
                let mut bytes = Vec::new();
                for line in frame.lines.drain(..) {
                    bytes.extend_from_slice(line.as_bytes());
                    bytes.push(b'\n');
                }
                InputFeed::Bytes(bytes)
            }
            Some(_) => InputFeed::Null,
            None if self.input.is_interactive() => InputFeed::Inherit,
            None => InputFeed::Null,
        }
    }

    /// Open (output, input) scopes
    pub fn depth(&self) -> (usize, usize) {
        (self.outputs.len(), self.inputs.len())
    }

    /// Back to the bare terminal
    pub fn reset(&mut self) {
        if self.depth() != (0, 0) {
            tracing::debug!(depth = ?self.depth(), "Dropping open redirection scopes");
        }
        self.outputs.clear();
        self.inputs.clear();
    }
}

/// Read a file as text lines; binary content is a decode error.
pub fn read_text_lines(path: &Path) -> ShellResult<Vec<String>> {
    let bytes = std::fs::read(path).map_err(|e| ShellError::file_access(path.display(), e))?;
    let text = String::from_utf8(bytes).map_err(|_| ShellError::Decode(path.display().to_string()))?;
    Ok(text.lines().map(str::to_string).collect())
}
