//! Error types for jsh

use crate::jobs::JobId;
use thiserror::Error;

/// Result type alias for jsh operations
pub type ShellResult<T> = Result<T, ShellError>;

/// Error types for jsh shell operations
#[derive(Error, Debug)]
pub enum ShellError {
    /// Malformed quoting or an unpaired backtick
    #[error("Lex error: {0}")]
    Lex(String),

    /// Command not found
    #[error("{0}: command not found")]
    CommandNotFound(String),

    /// Redirection target or script missing, unreadable or unwritable
    #[error("{path}: {source}")]
    FileAccess {
        path: String,
        source: std::io::Error,
    },

    /// A redirection operator with nothing after it
    #[error("missing target after `{0}`")]
    MissingOperand(String),

    /// Binary content fed where text was expected
    #[error("{0}: cannot decode content as text")]
    Decode(String),

    #[error("{0}: no such job")]
    JobNotFound(JobId),

    #[error("{id}: {reason}")]
    JobNotTerminable { id: JobId, reason: &'static str },

    #[error("daemon jobs cannot start background jobs")]
    DaemonSpawn,

    #[error("background jobs cannot read interactive input")]
    NotInteractive,

    #[error("maximum statement nesting depth ({0}) exceeded")]
    RecursionLimit(usize),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// IO error (terminal, files, child processes)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The active input ran out (not really an error)
    #[error("no more input")]
    EndOfInput,

    /// Exit requested (not really an error)
    #[error("Exit with code {0}")]
    Exit(i32),
}

impl ShellError {
    /// Control signals unwind through statement boundaries instead of being
    /// reported there.
    pub fn is_control(&self) -> bool {
        matches!(self, Self::EndOfInput | Self::Exit(_))
    }

    pub(crate) fn file_access(path: impl std::fmt::Display, source: std::io::Error) -> Self {
        Self::FileAccess {
            path: path.to_string(),
            source,
        }
    }
}
