//! Job controller
//!
//! Turns a resolved command name into something runnable (builtin, external
//! executable or script) and runs it in the foreground or as a background
//! job.

use crate::builtins::{format_help, wants_help, BuiltinSpec};
use crate::error::{ShellError, ShellResult};
use crate::jobs::{JobMode, JobSpec};
use crate::redirect::{read_text_lines, InputFeed, InputKind};
use crate::resolver::{BoxFuture, Flags};
use crate::session::Session;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncWriteExt;

/// What a command name resolved to
#[derive(Clone, Debug)]
pub enum Target {
    Builtin(&'static BuiltinSpec),
    External(PathBuf),
    Script(PathBuf),
}

impl Session {
    /// Resolve `command` and run it. The name is recorded in history before
    /// resolution, so unknown commands are remembered too.
    pub(crate) async fn dispatch(
        &mut self,
        command: String,
        args: Vec<String>,
        flags: Flags,
    ) -> ShellResult<bool> {
        self.history().push(command.clone());
        let target = self.resolve_command(&command)?;
        tracing::debug!(%command, ?target, ?flags, "Resolved command");

        if flags.background {
            return self.spawn_background(command, target, args, flags).await;
        }

        // The nested shell registers its own interactive job
        let _job = match &target {
            Target::Builtin(spec) if spec.interactive => None,
            _ => Some(self.jobs.register(JobSpec::foreground(&command).parent(self.owner()))),
        };
        self.run_target(target, args).await
    }

    /// Run a script file as a top-level statement.
    pub async fn execute_script(&mut self, path: &Path, args: &[String]) -> ShellResult<bool> {
        let shell_guard = self.enter_shell();
        let name = path.display().to_string();
        self.history().push(name.clone());
        let job = self.jobs.register(JobSpec::foreground(name).parent(self.owner()));
        let result = self.run_script(path, args).await;
        drop(job);
        self.leave_shell(shell_guard);
        result
    }

    /// Builtin, then cached path, then a fresh search-path scan, then a
    /// script file.
    pub fn resolve_command(&mut self, name: &str) -> ShellResult<Target> {
        if let Some(spec) = self.builtins.get(name) {
            return Ok(Target::Builtin(spec));
        }
        if let Some(path) = self.env.cached_path(name) {
            return Ok(Target::External(path.to_path_buf()));
        }
        if let Some(path) = self.env.scan(name) {
            tracing::debug!(name, path = ?path, "Caching command path");
            self.env.cache_path(name, path.clone());
            return Ok(Target::External(path));
        }
        let path = self.resolve_path(name);
        if path.is_file() {
            return Ok(Target::Script(path));
        }
        Err(ShellError::CommandNotFound(name.to_string()))
    }

    pub(crate) fn run_target(
        &mut self,
        target: Target,
        args: Vec<String>,
    ) -> BoxFuture<'_, ShellResult<bool>> {
        Box::pin(async move {
            match target {
                Target::Builtin(spec) => {
                    if wants_help(&args) {
                        self.io.write(&format_help(spec))?;
                        return Ok(true);
                    }
                    let builtin = (spec.construct)(args)?;
                    builtin.run(self).await
                }
                Target::External(path) => self.run_external(&path, &args).await,
                Target::Script(path) => self.run_script(&path, &args).await,
            }
        })
    }

    async fn spawn_background(
        &mut self,
        name: String,
        target: Target,
        args: Vec<String>,
        flags: Flags,
    ) -> ShellResult<bool> {
        if self.is_daemon() {
            return Err(ShellError::DaemonSpawn);
        }
        let mode = if flags.daemon {
            JobMode::Daemon
        } else {
            JobMode::Background
        };
        let guard = self
            .jobs
            .register(
                JobSpec::foreground(&name)
                    .with_mode(mode)
                    .joined(flags.join)
                    .parent(self.owner()),
            )
            .reaping_daemons();
        let id = guard.id();
        let mut child = self.snapshot(flags.daemon, id);

        let task = self.jobs.spawn(guard, async move {
            match child.run_target(target, args).await {
                Ok(success) => success,
                Err(ShellError::Exit(code)) => code == 0,
                Err(e) => {
                    child.io.diagnostic(&format!("jsh: [{id}] {e}"));
                    false
                }
            }
        });
        self.io.diagnostic(&format!("[{id}] {name}"));

        if !flags.join {
            return Ok(true);
        }
        self.jobs.wait_removed(id).await;
        Ok(task.await.unwrap_or(false))
    }

    async fn run_external(&mut self, program: &Path, args: &[String]) -> ShellResult<bool> {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .current_dir(self.cwd())
            .envs(self.env.persisted())
            .kill_on_drop(true);

        let feed = self.io.take_input();
        cmd.stdin(match feed {
            InputFeed::Inherit => Stdio::inherit(),
            InputFeed::Null => Stdio::null(),
            InputFeed::Bytes(_) => Stdio::piped(),
        });
        let out = self.io.current_sink();
        cmd.stdout(out.stdio().unwrap_or_else(Stdio::piped));
        let err = self.io.error_sink().clone();
        cmd.stderr(err.stdio().unwrap_or_else(Stdio::piped));

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ShellError::CommandNotFound(program.display().to_string())
            }
            _ => ShellError::file_access(program.display(), e),
        })?;
        if let (InputFeed::Bytes(bytes), Some(mut stdin)) = (feed, child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&bytes).await {
                    tracing::debug!(error = %e, "Child closed its input early");
                }
            });
        }

        let output = child.wait_with_output().await?;
        out.write_bytes(&output.stdout)?;
        err.write_bytes(&output.stderr)?;
        if !output.status.success() {
            tracing::debug!(
                program = ?program,
                code = exit_code(output.status),
                "External command failed"
            );
        }
        Ok(output.status.success())
    }

    async fn run_script(&mut self, path: &Path, args: &[String]) -> ShellResult<bool> {
        let lines = read_text_lines(path)?;
        if let Some(marker) = lines.first().and_then(|l| l.strip_prefix("#!")) {
            let mut words = marker.split_whitespace();
            let Some(interpreter) = words.next() else {
                return Err(ShellError::InvalidArgument(format!(
                    "{}: empty interpreter line",
                    path.display()
                )));
            };
            let mut argv: Vec<String> = words.map(str::to_string).collect();
            argv.push(path.display().to_string());
            argv.extend(args.iter().cloned());
            tracing::debug!(script = ?path, interpreter, "Running script with interpreter");
            return self.run_external(Path::new(interpreter), &argv).await;
        }

        tracing::debug!(script = ?path, lines = lines.len(), "Feeding script to resolver");
        let scope = self.io.open_input(lines, InputKind::Script);
        let mut status = Ok(true);
        loop {
            let line = match self.io.read_line("").await {
                Ok(line) => line,
                Err(ShellError::EndOfInput) => break,
                Err(e) => {
                    status = Err(e);
                    break;
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match self.run_line(&line).await {
                Ok(success) => status = Ok(success),
                Err(ShellError::EndOfInput) => break,
                Err(ShellError::Exit(code)) => {
                    status = Ok(code == 0);
                    break;
                }
                Err(e) => {
                    status = Err(e);
                    break;
                }
            }
        }
        self.io.close_input(scope);
        status
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redirect::Sink;

    fn session(cwd: &Path) -> Session {
        Session::builder()
            .output(Sink::memory())
            .errors(Sink::memory())
            .cwd(cwd)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builtin_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        assert!(matches!(
            s.resolve_command("echo").unwrap(),
            Target::Builtin(spec) if spec.name == "echo"
        ));
    }

    #[test]
    fn test_unknown_command() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        assert!(matches!(
            s.resolve_command("jsh-surely-missing"),
            Err(ShellError::CommandNotFound(name)) if name == "jsh-surely-missing"
        ));
    }

    #[test]
    fn test_existing_file_is_script() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("run.jsh"), "echo hi\n").unwrap();
        let mut s = session(dir.path());
        assert!(matches!(
            s.resolve_command("run.jsh").unwrap(),
            Target::Script(path) if path.ends_with("run.jsh")
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_search_path_hit_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        if s.env.scan("sh").is_none() {
            return;
        }
        assert!(matches!(s.resolve_command("sh").unwrap(), Target::External(_)));
        assert!(s.env.cached_path("sh").is_some());
    }
}
