use crate::{ConfigError, JshConfig};
use regex::Regex;
use std::path::PathBuf;

pub struct ConfigLoader {
    explicit_file: Option<PathBuf>,
    search_paths: Vec<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        if let Some(home) = dirs::home_dir() {
            search_paths.push(home.join(".config/jsh/jsh.yaml"));
        }
        search_paths.push(PathBuf::from("./jsh.yaml"));

        #[cfg(unix)]
        search_paths.insert(0, PathBuf::from("/etc/jsh/jsh.yaml"));

        Self {
            explicit_file: None,
            search_paths,
        }
    }

    pub fn with_file(mut self, path: &str) -> Self {
        self.explicit_file = Some(PathBuf::from(path));
        self
    }

    pub fn load(&self) -> Result<JshConfig, ConfigError> {
        let mut config = JshConfig::default();

        if let Ok(env_path) = std::env::var("JSH_CONFIG") {
            let content =
                std::fs::read_to_string(&env_path).map_err(|e| ConfigError::ReadFile {
                    path: PathBuf::from(&env_path),
                    source: e,
                })?;
            config = self.parse_yaml(&content)?;
        } else if let Some(ref explicit) = self.explicit_file {
            let content = std::fs::read_to_string(explicit).map_err(|e| ConfigError::ReadFile {
                path: explicit.clone(),
                source: e,
            })?;
            config = self.parse_yaml(&content)?;
        } else {
            for path in &self.search_paths {
                if path.exists() {
                    if let Ok(content) = std::fs::read_to_string(path) {
                        tracing::debug!(path = ?path, "Merging config file");
                        config = self.merge_yaml(&config, &content)?;
                    }
                }
            }
        }

        self.apply_env_overrides(&mut config);
        Self::validate(&config)?;
        Ok(config)
    }

    fn parse_yaml(&self, content: &str) -> Result<JshConfig, ConfigError> {
        let expanded = self.expand_env_vars(content);
        Ok(serde_yaml::from_str(&expanded)?)
    }

    fn merge_yaml(&self, base: &JshConfig, content: &str) -> Result<JshConfig, ConfigError> {
        let expanded = self.expand_env_vars(content);
        let overlay: JshConfig = serde_yaml::from_str(&expanded)?;
        Ok(self.merge_configs(base, &overlay))
    }

    fn merge_configs(&self, base: &JshConfig, overlay: &JshConfig) -> JshConfig {
        let defaults = JshConfig::default();
        let mut result = base.clone();

        if overlay.shell.prompt != defaults.shell.prompt {
            result.shell.prompt = overlay.shell.prompt.clone();
        }
        if overlay.shell.env_file != defaults.shell.env_file {
            result.shell.env_file = overlay.shell.env_file.clone();
        }
        if overlay.shell.history != defaults.shell.history {
            result.shell.history = overlay.shell.history.clone();
        }
        if overlay.logging.level != defaults.logging.level
            || overlay.logging.format != defaults.logging.format
            || !overlay.logging.filter.is_empty()
        {
            result.logging = overlay.logging.clone();
        }

        result
    }

    fn expand_env_vars(&self, content: &str) -> String {
        let Ok(re) = Regex::new(r"\$\{([^}]+)\}") else {
            return content.to_string();
        };
        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_default()
        })
        .to_string()
    }

    fn apply_env_overrides(&self, config: &mut JshConfig) {
        if let Ok(prompt) = std::env::var("JSH_PROMPT") {
            config.shell.prompt = prompt;
        }
        if let Ok(env_file) = std::env::var("JSH_ENV_FILE") {
            if !env_file.is_empty() {
                config.shell.env_file = env_file;
            }
        }
        if let Ok(history_file) = std::env::var("JSH_HISTORY_FILE") {
            if !history_file.is_empty() {
                config.shell.history.file = history_file;
            }
        }
        if let Ok(level) = std::env::var("JSH_LOG_LEVEL") {
            if let Ok(l) = serde_yaml::from_str(&level) {
                config.logging.level = l;
            }
        }
    }

    fn validate(config: &JshConfig) -> Result<(), ConfigError> {
        if config.shell.history.commands == 0 {
            return Err(ConfigError::InvalidValue(
                "shell.history.commands must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
