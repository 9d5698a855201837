//! jsh - Interactive shell with statement rewriting and job tracking
//!
//! This crate provides:
//! - A lexer and a fixed table of grammar rules (`;`, `&&`, `&`, `$$`, `~`,
//!   assignments, `$name`, redirection, backtick substitution, `export`,
//!   `exec`, `--daemon`, `--join`)
//! - A statement resolver that applies those rules in a fixed order and
//!   recurses for compound statements
//! - A job controller running builtins, external executables and scripts in
//!   the foreground or as background jobs tracked in a shared job table
//! - Scoped redirection of the session's active input and output channels

pub mod builtins;
pub mod controller;
pub mod error;
pub mod grammar;
pub mod history;
pub mod jobs;
pub mod lexer;
pub mod redirect;
pub mod resolver;
pub mod session;
pub mod store;

pub use builtins::{Builtin, BuiltinRegistry, BuiltinSpec};
pub use controller::Target;
pub use error::{ShellError, ShellResult};
pub use grammar::{GrammarRegistry, GrammarRule, RuleKind};
pub use history::{History, Recall};
pub use jobs::{JobId, JobInfo, JobMode, JobTable};
pub use lexer::{tokenize, Quote, Token};
pub use redirect::{Channels, LineSource, ScriptedSource, Sink};
pub use resolver::Flags;
pub use session::{Captured, Session, SessionBuilder, MAX_DEPTH};
pub use store::{EnvironmentCache, VariableStore};
