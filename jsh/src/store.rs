//! Variable and environment stores

use crate::error::{ShellError, ShellResult};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Session-local variables
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    vars: BTreeMap<String, String>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Persisted environment record plus the resolved-executable cache.
///
/// The record is a file of `key=value` lines. It is read permissively and
/// rewritten in full on every mutation.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentCache {
    file: Option<PathBuf>,
    vars: BTreeMap<String, String>,
    paths: HashMap<String, PathBuf>,
}

impl EnvironmentCache {
    /// A cache that never touches disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the record at `file`. A missing file is an empty record.
    pub fn load(file: impl Into<PathBuf>) -> Self {
        let file = file.into();
        let vars = match std::fs::read_to_string(&file) {
            Ok(content) => parse_record(&content),
            Err(e) => {
                tracing::debug!(path = ?file, error = %e, "No environment record loaded");
                BTreeMap::new()
            }
        };
        Self {
            file: Some(file),
            vars,
            paths: HashMap::new(),
        }
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Persisted value first, then the process environment.
    pub fn get(&self, name: &str) -> Option<String> {
        self.vars
            .get(name)
            .cloned()
            .or_else(|| std::env::var(name).ok())
    }

    /// Values handed to child processes on top of the inherited environment
    pub fn persisted(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> ShellResult<()> {
        self.vars.insert(name.into(), value.into());
        self.persist()
    }

    pub fn extend<I>(&mut self, pairs: I) -> ShellResult<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.vars.extend(pairs);
        self.persist()
    }

    fn persist(&self) -> ShellResult<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        let content: String = self
            .vars
            .iter()
            .map(|(k, v)| format!("{k}={v}\n"))
            .collect();
        std::fs::write(file, content).map_err(|e| ShellError::file_access(file.display(), e))?;
        tracing::debug!(path = ?file, entries = self.vars.len(), "Environment record rewritten");
        Ok(())
    }

    pub fn cached_path(&self, name: &str) -> Option<&Path> {
        self.paths.get(name).map(PathBuf::as_path)
    }

    pub fn cache_path(&mut self, name: impl Into<String>, path: PathBuf) {
        self.paths.insert(name.into(), path);
    }

    /// Cached executables sorted by name
    pub fn cached_paths(&self) -> Vec<(&str, &Path)> {
        let mut entries: Vec<_> = self
            .paths
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_path()))
            .collect();
        entries.sort_unstable();
        entries
    }

    /// Drops every cached entry at once.
    pub fn clear_paths(&mut self) {
        self.paths.clear();
    }

    /// Directories of the search path, in order
    pub fn search_path(&self) -> Vec<PathBuf> {
        self.get("PATH")
            .map(|value| std::env::split_paths(&value).collect())
            .unwrap_or_default()
    }

    /// Scan the search path for `name`; first match wins.
    pub fn scan(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || name.contains(std::path::MAIN_SEPARATOR) || name.contains('/') {
            return None;
        }
        let file_name = format!("{name}{}", std::env::consts::EXE_SUFFIX);
        self.search_path()
            .into_iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| is_executable(candidate))
    }
}

fn parse_record(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .filter_map(|line| {
            let parsed = line
                .split_once('=')
                .filter(|(key, _)| !key.trim().is_empty());
            if parsed.is_none() && !line.trim().is_empty() {
                tracing::debug!(line, "Skipping malformed environment record line");
            }
            parsed.map(|(k, v)| (k.trim().to_string(), v.to_string()))
        })
        .collect()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_store() {
        let mut vars = VariableStore::new();
        assert!(vars.is_empty());
        vars.set("a", "1");
        vars.set("a", "2");
        assert_eq!(vars.get("a"), Some("2"));
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn test_record_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("env");
        std::fs::write(&file, "A=1\ngarbage\n=nokey\nB=x=y\n\n").unwrap();

        let env = EnvironmentCache::load(&file);
        assert_eq!(env.get("A").as_deref(), Some("1"));
        assert_eq!(env.get("B").as_deref(), Some("x=y"));
        assert_eq!(env.persisted().count(), 2);
    }

    #[test]
    fn test_record_rewritten_on_set() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("env");

        let mut env = EnvironmentCache::load(&file);
        env.set("JSH_STORE_B", "2").unwrap();
        env.extend([("JSH_STORE_A".to_string(), "1".to_string())])
            .unwrap();

        let content = std::fs::read_to_string(&file).unwrap();
        assert_eq!(content, "JSH_STORE_A=1\nJSH_STORE_B=2\n");
        assert_eq!(EnvironmentCache::load(&file).get("JSH_STORE_B").as_deref(), Some("2"));
    }

    #[test]
    fn test_missing_falls_back_to_process_env() {
        let env = EnvironmentCache::in_memory();
        assert!(env.get("JSH_STORE_SURELY_UNSET").is_none());
        assert!(env.get("PATH").is_some());
    }

    #[test]
    fn test_path_cache_clears_all() {
        let mut env = EnvironmentCache::in_memory();
        env.cache_path("a", PathBuf::from("/bin/a"));
        env.cache_path("b", PathBuf::from("/bin/b"));
        assert_eq!(env.cached_path("a"), Some(Path::new("/bin/a")));
        assert_eq!(env.cached_paths().len(), 2);
        env.clear_paths();
        assert!(env.cached_paths().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_finds_executable() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = EnvironmentCache::in_memory();
        env.vars
            .insert("PATH".to_string(), dir.path().display().to_string());

        let tool = dir.path().join("jsh-tool");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        assert!(env.scan("jsh-tool").is_none());

        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(env.scan("jsh-tool"), Some(tool));
        assert!(env.scan("./jsh-tool").is_none());
    }
}
