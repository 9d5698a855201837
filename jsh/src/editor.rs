//! Terminal input through rustyline
//!
//! The editor is not `Send`, so it lives on its own thread; the session asks
//! for lines over a channel and awaits the answer.

use crate::completer::JshHelper;
use async_trait::async_trait;
use jsh::{History, LineSource, Recall, ShellError, ShellResult};
use jsh_config::HistoryConfig;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{CompletionType, Config, Editor};
use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};
use tokio::sync::oneshot;

type Answer = Result<String, ReadlineError>;

struct Request {
    prompt: String,
    answer: oneshot::Sender<Answer>,
}

pub struct Terminal {
    requests: mpsc::Sender<Request>,
    history: Arc<Mutex<History>>,
}

impl Terminal {
    pub fn spawn(
        config: &HistoryConfig,
        builtins: Vec<&'static str>,
        history: Arc<Mutex<History>>,
    ) -> ShellResult<Self> {
        let rl_config = Config::builder()
            .completion_type(CompletionType::List)
            .max_history_size(config.max_entries)
            .map_err(editor_error)?
            .history_ignore_dups(true)
            .map_err(editor_error)?
            .history_ignore_space(true)
            .build();
        let history_file = config.enabled.then(|| config.file_path());
        let helper = JshHelper::new(builtins, Arc::clone(&history));

        let (requests, inbox) = mpsc::channel::<Request>();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        std::thread::Builder::new()
            .name("jsh-editor".to_string())
            .spawn(move || {
                let mut rl = match Editor::<JshHelper, DefaultHistory>::with_config(rl_config) {
                    Ok(rl) => rl,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                rl.set_helper(Some(helper));
                if let Some(path) = &history_file {
                    if let Err(e) = rl.load_history(path) {
                        tracing::debug!(error = %e, path = ?path, "No editor history loaded");
                    }
                }
                let _ = ready_tx.send(Ok(()));
                serve(&mut rl, &inbox, history_file.as_ref());
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { requests, history }),
            Ok(Err(e)) => Err(editor_error(e)),
            Err(_) => Err(ShellError::Io(std::io::Error::other("line editor thread died"))),
        }
    }

    async fn prompt(&self, prompt: &str) -> ShellResult<String> {
        let (answer, reply) = oneshot::channel();
        self.requests
            .send(Request {
                prompt: prompt.to_string(),
                answer,
            })
            .map_err(|_| ShellError::EndOfInput)?;
        match reply.await.map_err(|_| ShellError::EndOfInput)? {
            Ok(line) => Ok(line),
            Err(ReadlineError::Eof) => Err(ShellError::EndOfInput),
            Err(ReadlineError::Interrupted) => Err(ShellError::Exit(130)),
            Err(e) => Err(editor_error(e)),
        }
    }
}

fn serve(
    rl: &mut Editor<JshHelper, DefaultHistory>,
    inbox: &mpsc::Receiver<Request>,
    history_file: Option<&PathBuf>,
) {
    while let Ok(Request { prompt, answer }) = inbox.recv() {
        let line = rl.readline(&prompt);
        if let Ok(line) = &line {
            if !line.trim().is_empty() {
                let _ = rl.add_history_entry(line.as_str());
                if let Some(path) = history_file {
                    if let Err(e) = rl.save_history(path) {
                        tracing::warn!(error = %e, path = ?path, "Failed to save editor history");
                    }
                }
            }
        }
        if answer.send(line).is_err() {
            break;
        }
    }
}

fn editor_error(e: ReadlineError) -> ShellError {
    match e {
        ReadlineError::Io(e) => ShellError::Io(e),
        other => ShellError::Io(std::io::Error::other(other.to_string())),
    }
}

#[async_trait]
impl LineSource for Terminal {
    async fn read_line(&mut self, prompt: &str) -> ShellResult<String> {
        loop {
            let line = self.prompt(prompt).await?;
            let recall = self
                .history
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .recall(&line);
            match recall {
                None => return Ok(line),
                Some(Recall::Run(line)) => {
                    println!("{line}");
                    return Ok(line);
                }
                Some(Recall::Echo(line)) => println!("{line}"),
                Some(Recall::Missing(event)) => eprintln!("jsh: {event}: event not found"),
            }
        }
    }

    fn is_interactive(&self) -> bool {
        true
    }
}
