//! Builtin commands
//!
//! Each builtin is parsed from its argument words into a value and then run
//! against the session. The table below is the whole command set; the
//! registry built from it never changes after startup.

mod fs;
mod jobs;
mod shell;

use crate::error::{ShellError, ShellResult};
use crate::session::Session;
use async_trait::async_trait;
use std::collections::BTreeMap;

#[async_trait]
pub trait Builtin: Send {
    async fn run(self: Box<Self>, session: &mut Session) -> ShellResult<bool>;
}

pub type Constructor = fn(Vec<String>) -> ShellResult<Box<dyn Builtin>>;

pub struct BuiltinSpec {
    pub name: &'static str,
    pub summary: &'static str,
    pub usage: &'static str,
    pub options: &'static [(&'static str, &'static str)],
    /// Reads interactive input and runs as its own shell job
    pub interactive: bool,
    pub construct: Constructor,
}

impl std::fmt::Debug for BuiltinSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinSpec")
            .field("name", &self.name)
            .field("interactive", &self.interactive)
            .finish_non_exhaustive()
    }
}

pub const COMMANDS: &[BuiltinSpec] = &[
    BuiltinSpec {
        name: "cd",
        summary: "Change the working directory",
        usage: "cd [DIR]",
        options: &[],
        interactive: false,
        construct: fs::Cd::construct,
    },
    BuiltinSpec {
        name: "echo",
        summary: "Print arguments separated by spaces",
        usage: "echo [WORD]...",
        options: &[],
        interactive: false,
        construct: shell::Echo::construct,
    },
    BuiltinSpec {
        name: "exit",
        summary: "Leave the current shell",
        usage: "exit [CODE]",
        options: &[],
        interactive: false,
        construct: shell::Exit::construct,
    },
    BuiltinSpec {
        name: "false",
        summary: "Do nothing, unsuccessfully",
        usage: "false",
        options: &[],
        interactive: false,
        construct: shell::Status::failure,
    },
    BuiltinSpec {
        name: "hash",
        summary: "Show or forget remembered command locations",
        usage: "hash -l | -r",
        options: &[
            ("-l", "List cached command paths"),
            ("-r", "Forget every cached path"),
        ],
        interactive: false,
        construct: jobs::Hash::construct,
    },
    BuiltinSpec {
        name: "help",
        summary: "Describe builtins and grammar",
        usage: "help [-v | -vv | -vvv] [COMMAND]",
        options: &[
            ("-v", "List builtin commands"),
            ("-vv", "List builtin commands with usage"),
            ("-vvv", "Also list grammar symbols and keywords"),
        ],
        interactive: false,
        construct: shell::Help::construct,
    },
    BuiltinSpec {
        name: "history",
        summary: "Show or edit the command history",
        usage: "history [N] | --maxlen [N] | --clear [N]",
        options: &[
            ("N", "Show the N most recent commands, newest first"),
            ("--maxlen [N]", "Show the capacity, or set it to N"),
            ("--clear [N]", "Forget the N most recent commands, or all"),
        ],
        interactive: false,
        construct: shell::HistoryCmd::construct,
    },
    BuiltinSpec {
        name: "jsh",
        summary: "Run a nested shell on the current input",
        usage: "jsh",
        options: &[],
        interactive: true,
        construct: shell::Nested::construct,
    },
    BuiltinSpec {
        name: "kill",
        summary: "Terminate background jobs",
        usage: "kill ID...",
        options: &[],
        interactive: false,
        construct: jobs::Kill::construct,
    },
    BuiltinSpec {
        name: "ls",
        summary: "List directory contents",
        usage: "ls [-a | -A | -B | -l | -r] [PATH]...",
        options: &[
            ("-a", "Include . and .. and hidden entries"),
            ("-A", "Include hidden entries"),
            ("-B", "Skip entries ending with ~"),
            ("-l", "One entry per line"),
            ("-r", "Reverse order"),
        ],
        interactive: false,
        construct: fs::Ls::construct,
    },
    BuiltinSpec {
        name: "ps",
        summary: "List running jobs",
        usage: "ps [NAME]...",
        options: &[],
        interactive: false,
        construct: jobs::Ps::construct,
    },
    BuiltinSpec {
        name: "sleep",
        summary: "Pause for a number of seconds",
        usage: "sleep SECONDS",
        options: &[],
        interactive: false,
        construct: shell::Sleep::construct,
    },
    BuiltinSpec {
        name: "true",
        summary: "Do nothing, successfully",
        usage: "true",
        options: &[],
        interactive: false,
        construct: shell::Status::success,
    },
];

pub struct BuiltinRegistry {
    commands: BTreeMap<&'static str, &'static BuiltinSpec>,
}

impl BuiltinRegistry {
    pub fn standard() -> Self {
        Self {
            commands: COMMANDS.iter().map(|c| (c.name, c)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&'static BuiltinSpec> {
        self.commands.get(name).copied()
    }

    /// Specs sorted by name
    pub fn iter(&self) -> impl Iterator<Item = &'static BuiltinSpec> + '_ {
        self.commands.values().copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.keys().copied()
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

pub fn format_help(cmd: &BuiltinSpec) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} - {}\n\n", cmd.name, cmd.summary));
    out.push_str(&format!("Usage: {}\n", cmd.usage));
    if !cmd.options.is_empty() {
        out.push_str("\nOptions:\n");
        for (opt, desc) in cmd.options {
            out.push_str(&format!("  {opt:16} {desc}\n"));
        }
    }
    out
}

pub fn wants_help(args: &[String]) -> bool {
    args.iter().any(|a| a == "--help")
}

fn invalid(message: impl Into<String>) -> ShellError {
    ShellError::InvalidArgument(message.into())
}
