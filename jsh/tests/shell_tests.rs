//! Integration tests for jsh
//!
//! Each test drives a [`Session`] with scripted terminal input and in-memory
//! output, working inside a temporary directory.

use jsh::{tokenize, JobMode, ScriptedSource, Session, ShellError, Sink};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

struct Harness {
    session: Session,
    out: Sink,
    err: Sink,
    dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        Self::with_input(&[])
    }

    fn with_input(lines: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let out = Sink::memory();
        let err = Sink::memory();
        let session = Session::builder()
            .input(ScriptedSource::new(lines.iter().copied()))
            .output(out.clone())
            .errors(err.clone())
            .home(dir.path().display().to_string())
            .cwd(dir.path())
            .env_file(dir.path().join("env"))
            .build()
            .unwrap();
        Self {
            session,
            out,
            err,
            dir,
        }
    }

    async fn run(&mut self, line: &str) -> bool {
        assert_ok!(self.session.execute(line).await)
    }

    fn stdout(&self) -> String {
        self.out.contents().unwrap_or_default()
    }

    fn stderr(&self) -> String {
        self.err.contents().unwrap_or_default()
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, content: &str) {
        std::fs::write(self.path(name), content).unwrap();
    }

    fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.path(name)).unwrap()
    }
}

#[test]
fn test_canonical_line_rejoins() {
    for line in ["echo a ; echo b", "x=1 && ls -l > out.txt", "sleep 1 & --join"] {
        let tokens = assert_ok!(tokenize(line));
        let words: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words.join(" "), line);
    }
}

#[tokio::test]
async fn test_assignment_prefix() {
    let mut h = Harness::new();
    h.run("a=1 b=2 ls").await;
    assert!(h.session.vars.get("a").is_none());
    assert!(h.session.vars.get("b").is_none());

    assert!(h.run("a=1 b=2").await);
    assert_eq!(h.session.vars.get("a"), Some("1"));
    assert_eq!(h.session.vars.get("b"), Some("2"));
    assert_eq!(h.stdout(), "");
}

#[tokio::test]
async fn test_semicolon_runs_every_piece() {
    let mut h = Harness::new();
    assert!(!h.run("echo a ; echo b ; badcmd").await);
    assert_eq!(h.stdout(), "a\nb\n");
    assert_eq!(h.stderr(), "jsh: badcmd: command not found\n");
}

#[tokio::test]
async fn test_and_stops_at_first_failure() {
    let mut h = Harness::new();
    assert!(!h.run("true && echo ok && false && echo never").await);
    assert_eq!(h.stdout(), "ok\n");
}

#[tokio::test]
async fn test_join_waits_for_the_job() {
    let mut h = Harness::new();
    assert!(h.run("sleep 0.05 & --join").await);
    assert!(h.session.jobs.is_empty());
}

#[tokio::test]
async fn test_job_ids_are_reused() {
    let mut h = Harness::new();
    // the line's own shell job holds id 0
    h.run("sleep 0.01 & --join").await;
    h.run("sleep 0.01 & --join").await;
    assert_eq!(h.stderr(), "[1] sleep\n[1] sleep\n");
}

#[tokio::test]
async fn test_background_job_outlives_the_line() {
    let mut h = Harness::new();
    assert!(h.run("echo later &").await);
    h.session.shutdown().await;
    assert!(h.session.jobs.is_empty());
    assert_eq!(h.stdout(), "later\n");
}

#[tokio::test]
async fn test_redirection_round_trip() {
    let mut h = Harness::new();
    h.run("echo hello > f.txt").await;
    assert_eq!(h.read("f.txt"), "hello\n");
    h.run("echo world >> f.txt").await;
    assert_eq!(h.read("f.txt"), "hello\nworld\n");
    h.run("echo overwritten > f.txt").await;
    assert_eq!(h.read("f.txt"), "overwritten\n");
    assert_eq!(h.stdout(), "");
}

#[tokio::test]
async fn test_substitution_reparses_the_line() {
    let mut h = Harness::new();
    assert!(h.run("echo `echo sub` done").await);
    assert_eq!(h.stdout(), "sub done\n");

    h.run("echo `echo x ; echo y` > out.txt").await;
    assert_eq!(h.read("out.txt"), "x y\n");
    assert_eq!(h.stdout(), "sub done\n");
}

#[tokio::test]
async fn test_substitution_reads_the_statement_input() {
    let mut h = Harness::with_input(&["echo fromterminal"]);
    h.write("cmds.txt", "echo fromfile\n");
    assert!(h.run("echo `jsh` < cmds.txt").await);
    assert_eq!(h.stdout(), "fromfile\n");
    assert_eq!(assert_ok!(h.session.io.read_line("").await), "echo fromterminal");
}

#[tokio::test]
async fn test_unknown_command_is_remembered() {
    let mut h = Harness::new();
    assert!(!h.run("no-such-command --flag").await);
    assert!(h.stderr().contains("no-such-command: command not found"));
    assert_eq!(h.session.history().last(), Some("no-such-command"));
}

#[tokio::test]
async fn test_nested_shell_reads_redirected_file() {
    let mut h = Harness::new();
    h.write("cmds.txt", "echo one\n\ngreeting=hi\necho $greeting\n");
    assert!(h.run("jsh < cmds.txt").await);
    assert_eq!(h.stdout(), "one\nhi\n");
    assert_eq!(h.session.io.depth(), (0, 0));
}

#[tokio::test]
async fn test_heredoc_consumes_terminal_lines() {
    let mut h = Harness::with_input(&["echo a", "echo b", "EOF", "left over"]);
    assert!(h.run("jsh << EOF > doc.txt").await);
    assert_eq!(h.read("doc.txt"), "a\nb\n");
    assert_eq!(assert_ok!(h.session.io.read_line("").await), "left over");
}

#[tokio::test]
async fn test_script_runs_until_exit() {
    let mut h = Harness::new();
    h.write("run.jsh", "echo one\n# comment\n\necho two\nexit 3\necho never\n");
    assert!(!h.run("run.jsh").await);
    assert_eq!(h.stdout(), "one\ntwo\n");

    // exit inside a script does not end the caller
    assert!(h.run("echo still here").await);
}

#[tokio::test]
async fn test_execute_script_entry_point() {
    let mut h = Harness::new();
    h.write("entry.jsh", "echo $$\n");
    let path = h.path("entry.jsh");
    assert!(assert_ok!(h.session.execute_script(&path, &[]).await));
    assert_eq!(h.stdout(), "0\n");
}

#[tokio::test]
async fn test_binary_script_is_decode_error() {
    let mut h = Harness::new();
    std::fs::write(h.path("blob"), [0xff, 0xfe, 0x00, 0x01]).unwrap();
    assert!(!h.run("blob").await);
    assert!(h.stderr().contains("cannot decode"));
}

#[tokio::test]
async fn test_script_that_runs_itself_hits_depth_limit() {
    let mut h = Harness::new();
    h.write("loop.jsh", "loop.jsh\n");
    assert!(!h.run("loop.jsh").await);
    assert!(h.stderr().contains("nesting depth"));
    assert_eq!(h.session.io.depth(), (0, 0));
}

#[tokio::test]
async fn test_exec_captures_remaining_input() {
    let mut h = Harness::with_input(&["line one", "line two"]);
    let err = assert_err!(h.session.execute("exec > cap.txt").await);
    assert!(matches!(err, ShellError::Exit(0)));
    assert_eq!(h.read("cap.txt"), "line one\nline two\n");
    assert_eq!(h.session.io.depth(), (0, 0));
}

#[tokio::test]
async fn test_exit_unwinds_through_redirection() {
    let mut h = Harness::new();
    let err = assert_err!(h.session.execute("exit 2 > f.txt").await);
    assert!(matches!(err, ShellError::Exit(2)));
    assert_eq!(h.session.io.depth(), (0, 0));
    h.run("echo back").await;
    assert_eq!(h.stdout(), "back\n");
}

#[tokio::test]
async fn test_failed_statement_restores_channels() {
    let mut h = Harness::new();
    assert!(h.run("badcmd > out.txt ; echo after").await);
    assert_eq!(h.read("out.txt"), "");
    assert_eq!(h.stdout(), "after\n");
    assert!(!h.run("echo x > missing-dir/f.txt").await);
    assert!(!h.run("echo x < nothing-here.txt").await);
    assert_eq!(h.session.io.depth(), (0, 0));
}

#[tokio::test]
async fn test_kill_diagnostics() {
    let mut h = Harness::new();
    assert!(!h.run("kill 0").await);
    assert!(!h.run("kill 9").await);
    let err = h.stderr();
    assert!(err.contains("kill: 0: job is waiting for interactive input"));
    assert!(err.contains("kill: 9: no such job"));
}

#[tokio::test]
async fn test_kill_background_job() {
    let mut h = Harness::new();
    assert!(h.run("sleep 30 &").await);
    assert!(h.run("kill 1").await);
    h.session.shutdown().await;
    assert!(h.session.jobs.is_empty());
    assert_eq!(h.stdout(), "[1] Terminated sleep\n");
}

#[tokio::test]
async fn test_shell_id_and_home() {
    let mut h = Harness::new();
    h.run("echo $$ ~/notes log$$.txt").await;
    assert_eq!(h.stdout(), format!("0 {}/notes log0.txt\n", h.dir.path().display()));
}

#[tokio::test]
async fn test_daemon_cannot_spawn_jobs() {
    let mut h = Harness::new();
    h.write("spawn.jsh", "sleep 0 &\necho done\n");
    assert!(h.run("spawn.jsh & --join --daemon").await);
    assert!(h.stderr().contains("jsh: daemon jobs cannot start background jobs"));
    assert_eq!(h.stdout(), "done\n");
}

#[tokio::test]
async fn test_shutdown_aborts_daemons() {
    let mut h = Harness::new();
    assert!(h.run("sleep 30 & --daemon").await);
    assert_eq!(h.session.jobs.len(), 1);
    h.session.shutdown().await;
    assert!(h.session.jobs.is_empty());
}

#[tokio::test]
async fn test_killing_a_parent_tears_down_its_daemons() {
    let mut h = Harness::new();
    h.write("parent.jsh", "sleep 30 & --daemon\nsleep 30\n");
    assert!(h.run("parent.jsh &").await);

    let daemon_started = async {
        while !h.session.jobs.list().iter().any(|j| j.mode == JobMode::Daemon) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    assert_ok!(tokio::time::timeout(Duration::from_secs(5), daemon_started).await);

    assert!(h.run("kill 1").await);
    let drained = tokio::time::timeout(Duration::from_secs(5), h.session.jobs.wait_background());
    assert_ok!(drained.await);
    assert!(h.session.jobs.is_empty());
    assert!(h.stdout().contains("[1] Terminated parent.jsh"));
}

#[tokio::test]
async fn test_export_persists() {
    let mut h = Harness::new();
    assert!(h.run("export GREETING=hi PLACE=there").await);
    assert_eq!(h.read("env"), "GREETING=hi\nPLACE=there\n");

    let mut again = Session::builder()
        .output(Sink::memory())
        .errors(Sink::memory())
        .cwd(h.dir.path())
        .env_file(h.path("env"))
        .build()
        .unwrap();
    let captured = assert_ok!(again.execute_capture("echo $GREETING $PLACE").await);
    assert!(captured.success);
    assert_eq!(captured.stdout, "hi there\n");
}

#[tokio::test]
async fn test_builtin_help_flag() {
    let mut h = Harness::new();
    assert!(h.run("ls --help").await);
    assert!(h.stdout().starts_with("ls - List directory contents"));
}

#[cfg(unix)]
mod external {
    use super::*;

    fn available(h: &Harness, name: &str) -> bool {
        h.session.env.scan(name).is_some()
    }

    #[tokio::test]
    async fn test_external_output_is_captured_and_cached() {
        let mut h = Harness::new();
        if !available(&h, "sh") {
            return;
        }
        assert!(h.run("sh -c 'echo external'").await);
        assert!(!h.run("sh -c 'exit 4'").await);
        assert_eq!(h.stdout(), "external\n");

        h.run("hash -l").await;
        assert!(h.stdout().contains("sh\t"));
        h.run("hash -r").await;
        assert!(h.session.env.cached_paths().is_empty());
    }

    #[tokio::test]
    async fn test_external_reads_redirected_input() {
        let mut h = Harness::new();
        if !available(&h, "cat") {
            return;
        }
        h.write("in.txt", "first\nsecond\n");
        assert!(h.run("cat < in.txt > copy.txt").await);
        assert_eq!(h.read("copy.txt"), "first\nsecond\n");
    }

    #[tokio::test]
    async fn test_interpreter_line() {
        let mut h = Harness::new();
        if !available(&h, "sh") {
            return;
        }
        h.write("hello.sh", "#!/bin/sh\necho from sh \"$1\"\n");
        assert!(h.run("hello.sh arg").await);
        assert_eq!(h.stdout(), "from sh arg\n");
    }
}
