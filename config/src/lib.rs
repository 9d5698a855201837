//! jsh configuration
//!
//! YAML settings for the interactive shell: prompt, persisted environment
//! record, history sizes and logging.
//!
//! # Configuration Loading Priority
//!
//! 1. Compiled-in defaults
//! 2. `/etc/jsh/jsh.yaml` (system-wide)
//! 3. `~/.config/jsh/jsh.yaml` (user)
//! 4. `./jsh.yaml` (project-local)
//! 5. `JSH_CONFIG=/path/to/config.yaml` (explicit)
//! 6. Environment variables (highest priority)
//!
//! # Example Configuration
//!
//! ```yaml
//! shell:
//!   prompt: "{user}@jsh:{cwd}$ "
//!   env_file: "~/.jsh_env"
//!   history:
//!     file: "~/.jsh_history"
//!     commands: 200
//!
//! logging:
//!   level: debug
//! ```

#![allow(missing_docs)]

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use types::*;

/// Load configuration from default locations.
///
/// Searches for config files in order and merges them.
/// Environment variables override file values.
pub fn load() -> Result<JshConfig, ConfigError> {
    ConfigLoader::new().load()
}

/// Load configuration from a specific file.
pub fn load_from_file(path: &str) -> Result<JshConfig, ConfigError> {
    ConfigLoader::new().with_file(path).load()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = JshConfig::default();
        assert_eq!(config.shell.prompt, "jsh:{cwd}$ ");
        assert_eq!(config.shell.history.commands, 100);
        assert_eq!(config.logging.level, LogLevel::Warn);
    }

    #[test]
    fn parse_minimal_yaml() {
        let yaml = r#"
shell:
  prompt: "> "
"#;
        let config: JshConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.shell.prompt, "> ");
        assert_eq!(config.shell.env_file, "~/.jsh_env"); // default
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
shell:
  prompt: "{user}:{cwd}$ "
  env_file: "/tmp/jsh_env"
  history:
    enabled: false
    file: "/tmp/jsh_history"
    max_entries: 50
    commands: 10

logging:
  level: debug
  format: pretty
  filter: "jsh=trace"
"#;
        let config: JshConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.shell.env_file_path().to_str(), Some("/tmp/jsh_env"));
        assert!(!config.shell.history.enabled);
        assert_eq!(config.shell.history.commands, 10);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.logging.directive(), "jsh=trace");
    }

    #[test]
    fn tilde_paths_expand_to_home() {
        let config = ShellConfig::default();
        let path = config.env_file_path();
        assert!(path.ends_with(".jsh_env"));
        assert!(!path.starts_with("~"));
    }
}
