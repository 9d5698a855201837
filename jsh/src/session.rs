//! Session context
//!
//! One [`Session`] bundles everything a running shell shares between its
//! statements: stores, job table, history and the active I/O channels.
//! Background jobs run on a snapshot of it.

use crate::builtins::BuiltinRegistry;
use crate::error::{ShellError, ShellResult};
use crate::grammar::{Bindings, GrammarRegistry};
use crate::history::History;
use crate::jobs::{JobGuard, JobId, JobSpec, JobTable};
use crate::redirect::{Channels, LineSource, ScriptedSource, Sink};
use crate::store::{EnvironmentCache, VariableStore};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Nesting limit for statement resolution
pub const MAX_DEPTH: usize = 64;

pub struct Session {
    pub(crate) grammar: Arc<GrammarRegistry>,
    pub(crate) builtins: Arc<BuiltinRegistry>,
    pub vars: VariableStore,
    pub env: EnvironmentCache,
    pub jobs: JobTable,
    history: Arc<Mutex<History>>,
    pub io: Channels,
    cwd: PathBuf,
    home: String,
    prompt: String,
    /// Innermost running interactive shell job (`$$`)
    shell_job: Option<JobId>,
    /// Job this session runs as; parent of the jobs it starts
    owner: Option<JobId>,
    daemon: bool,
    pub(crate) depth: usize,
}

/// Output of [`Session::execute_capture`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    pub success: bool,
    pub stdout: String,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn set_cwd(&mut self, path: PathBuf) {
        tracing::debug!(cwd = ?path, "Working directory changed");
        self.cwd = path;
    }

    /// Resolve `path` against the session working directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        self.cwd.join(path)
    }

    pub fn home_dir(&self) -> &str {
        &self.home
    }

    pub fn prompt(&self) -> String {
        let user = self.env.get("USER").unwrap_or_default();
        self.prompt
            .replace("{cwd}", &self.cwd.display().to_string())
            .replace("{user}", &user)
    }

    pub fn history(&self) -> MutexGuard<'_, History> {
        self.history
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Shared handle for the line editor's recall shortcuts
    pub fn history_handle(&self) -> Arc<Mutex<History>> {
        Arc::clone(&self.history)
    }

    /// Replace the terminal input once the session exists
    pub fn set_terminal(&mut self, input: impl LineSource + 'static) {
        self.io.set_input(Box::new(input));
    }

    pub fn builtins(&self) -> &BuiltinRegistry {
        &self.builtins
    }

    pub fn grammar(&self) -> &GrammarRegistry {
        &self.grammar
    }

    pub fn shell_job(&self) -> Option<JobId> {
        self.shell_job
    }

    pub fn owner(&self) -> Option<JobId> {
        self.owner
    }

    pub fn is_daemon(&self) -> bool {
        self.daemon
    }

    /// Register a shell job for top-level work unless one is running.
    pub(crate) fn enter_shell(&mut self) -> Option<JobGuard> {
        if self.shell_job.is_some() {
            return None;
        }
        let guard = self.jobs.register(
            JobSpec::foreground("jsh")
                .interactive()
                .parent(self.owner),
        );
        self.shell_job = Some(guard.id());
        Some(guard)
    }

    pub(crate) fn leave_shell(&mut self, guard: Option<JobGuard>) {
        if guard.is_some() {
            self.shell_job = None;
        }
    }

    /// Run one line as a top-level statement.
    pub async fn execute(&mut self, line: &str) -> ShellResult<bool> {
        let shell_guard = self.enter_shell();
        let result = self.run_line(line).await;
        self.leave_shell(shell_guard);
        result
    }

    /// Run one line with its output captured.
    pub async fn execute_capture(&mut self, line: &str) -> ShellResult<Captured> {
        let scope = self.io.capture();
        let result = self.execute(line).await;
        let stdout = self.io.close_output(scope).unwrap_or_default();
        Ok(Captured {
            success: result?,
            stdout,
        })
    }

    /// Interactive loop over the active input channel.
    ///
    /// Runs as its own interactive job, so `$$` names it while it runs.
    /// Returns the exit status: 0 once input is exhausted, or the code
    /// given to `exit`.
    pub async fn interact(&mut self) -> ShellResult<i32> {
        let guard = self.jobs.register(
            JobSpec::foreground("jsh")
                .interactive()
                .parent(self.owner),
        );
        let outer = self.shell_job.replace(guard.id());
        tracing::debug!(job = %guard.id(), depth = self.depth, "Interactive loop started");

        let status = loop {
            let prompt = self.prompt();
            let line = match self.io.read_line(&prompt).await {
                Ok(line) => line,
                Err(ShellError::EndOfInput) => break Ok(0),
                Err(ShellError::Exit(code)) => break Ok(code),
                Err(e) => break Err(e),
            };
            if line.trim().is_empty() {
                continue;
            }
            match self.run_line(&line).await {
                Ok(_) => {}
                Err(ShellError::EndOfInput) => break Ok(0),
                Err(ShellError::Exit(code)) => break Ok(code),
                Err(e) => break Err(e),
            }
        };

        self.shell_job = outer;
        tracing::debug!(job = %guard.id(), status = ?status, "Interactive loop ended");
        status
    }

    /// Session for a background job: copies of the stores, the shared job
    /// table and history, no terminal input.
    pub(crate) fn snapshot(&self, daemon: bool, owner: JobId) -> Self {
        Self {
            grammar: Arc::clone(&self.grammar),
            builtins: Arc::clone(&self.builtins),
            vars: self.vars.clone(),
            env: self.env.clone(),
            jobs: self.jobs.clone(),
            history: Arc::clone(&self.history),
            io: self.io.snapshot(),
            cwd: self.cwd.clone(),
            home: self.home.clone(),
            prompt: self.prompt.clone(),
            shell_job: self.shell_job,
            owner: Some(owner),
            daemon,
            depth: self.depth,
        }
    }

    /// Tear down daemon jobs and let the other background jobs finish.
    pub async fn shutdown(&mut self) {
        let aborted = self.jobs.abort_daemons(None);
        if aborted > 0 {
            tracing::debug!(aborted, "Daemon jobs torn down");
        }
        self.jobs.wait_background().await;
        self.io.reset();
    }
}

impl Bindings for Session {
    fn shell_id(&self) -> Option<JobId> {
        self.shell_job
    }

    fn home(&self) -> String {
        self.home.clone()
    }

    fn lookup(&self, name: &str) -> Option<String> {
        self.vars
            .get(name)
            .map(str::to_string)
            .or_else(|| self.env.get(name))
    }
}

pub struct SessionBuilder {
    input: Option<Box<dyn LineSource>>,
    output: Sink,
    error: Sink,
    env_file: Option<PathBuf>,
    home: Option<String>,
    cwd: Option<PathBuf>,
    prompt: String,
    history: usize,
    env: Vec<(String, String)>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            input: None,
            output: Sink::Stdout,
            error: Sink::Stderr,
            env_file: None,
            home: None,
            cwd: None,
            prompt: "jsh:{cwd}$ ".to_string(),
            history: 100,
            env: Vec::new(),
        }
    }

    /// Prompt, environment record and history size from configuration
    pub fn config(self, config: &jsh_config::JshConfig) -> Self {
        self.prompt(config.shell.prompt.clone())
            .env_file(config.shell.env_file_path())
            .history(config.shell.history.commands)
    }

    pub fn input(mut self, input: impl LineSource + 'static) -> Self {
        self.input = Some(Box::new(input));
        self
    }

    pub fn output(mut self, sink: Sink) -> Self {
        self.output = sink;
        self
    }

    pub fn errors(mut self, sink: Sink) -> Self {
        self.error = sink;
        self
    }

    pub fn env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = Some(path.into());
        self
    }

    pub fn home(mut self, home: impl Into<String>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn history(mut self, capacity: usize) -> Self {
        self.history = capacity;
        self
    }

    /// Environment value added on top of the persisted record
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((name.into(), value.into()));
        self
    }

    pub fn build(self) -> ShellResult<Session> {
        let mut env = match self.env_file {
            Some(path) => EnvironmentCache::load(path),
            None => EnvironmentCache::in_memory(),
        };
        if !self.env.is_empty() {
            env.extend(self.env)?;
        }
        let cwd = match self.cwd {
            Some(cwd) => cwd,
            None => std::env::current_dir()?,
        };
        let home = self.home.unwrap_or_else(|| {
            dirs::home_dir().map_or_else(|| "/".to_string(), |h| h.display().to_string())
        });
        let input = self
            .input
            .unwrap_or_else(|| Box::new(ScriptedSource::default()));

        Ok(Session {
            grammar: Arc::new(GrammarRegistry::standard()),
            builtins: Arc::new(BuiltinRegistry::standard()),
            vars: VariableStore::new(),
            env,
            jobs: JobTable::new(),
            history: Arc::new(Mutex::new(History::new(self.history))),
            io: Channels::new(input, self.output, self.error),
            cwd,
            home,
            prompt: self.prompt,
            shell_job: None,
            owner: None,
            daemon: false,
            depth: 0,
        })
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
