use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JshConfig {
    pub shell: ShellConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Prompt template. `{cwd}` and `{user}` are substituted on every line.
    pub prompt: String,
    /// Persisted environment record, rewritten on every `export`.
    pub env_file: String,
    pub history: HistoryConfig,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: "jsh:{cwd}$ ".to_string(),
            env_file: "~/.jsh_env".to_string(),
            history: HistoryConfig::default(),
        }
    }
}

impl ShellConfig {
    pub fn env_file_path(&self) -> PathBuf {
        expand_path(&self.env_file)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    /// Line history kept by the editor between sessions.
    pub file: String,
    pub max_entries: usize,
    /// Capacity of the dispatched-command ring used by `history` and `!` recall.
    pub commands: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: "~/.jsh_history".to_string(),
            max_entries: 10000,
            commands: 100,
        }
    }
}

impl HistoryConfig {
    pub fn file_path(&self) -> PathBuf {
        expand_path(&self.file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            format: LogFormat::Compact,
            filter: String::new(),
        }
    }
}

impl LoggingConfig {
    /// Filter directive for the subscriber: the explicit filter when set,
    /// otherwise the plain level.
    pub fn directive(&self) -> &str {
        if self.filter.is_empty() {
            self.level.as_str()
        } else {
            &self.filter
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Compact,
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}
