//! Job table and path cache builtins

use super::{invalid, Builtin};
use crate::error::ShellResult;
use crate::jobs::JobId;
use crate::session::Session;
use async_trait::async_trait;

pub struct Ps {
    names: Vec<String>,
}

impl Ps {
    pub fn construct(args: Vec<String>) -> ShellResult<Box<dyn Builtin>> {
        Ok(Box::new(Self { names: args }))
    }
}

#[async_trait]
impl Builtin for Ps {
    async fn run(self: Box<Self>, session: &mut Session) -> ShellResult<bool> {
        let mut out = format!("{:<6}{:<12}{:<12}{}\n", "ID", "NAME", "MODE", "STARTED");
        for job in session.jobs.list() {
            if !self.names.is_empty() && !self.names.contains(&job.name) {
                continue;
            }
            out.push_str(&format!(
                "{:<6}{:<12}{:<12}{}\n",
                job.id,
                job.name,
                job.mode.as_str(),
                job.started.format("%H:%M:%S")
            ));
        }
        session.io.write(&out)?;
        Ok(true)
    }
}

pub struct Kill {
    ids: Vec<String>,
}

impl Kill {
    pub fn construct(args: Vec<String>) -> ShellResult<Box<dyn Builtin>> {
        if args.is_empty() {
            return Err(invalid("usage: kill ID..."));
        }
        Ok(Box::new(Self { ids: args }))
    }
}

#[async_trait]
impl Builtin for Kill {
    async fn run(self: Box<Self>, session: &mut Session) -> ShellResult<bool> {
        let mut ok = true;
        for raw in &self.ids {
            let Ok(id) = raw.parse::<JobId>() else {
                session.io.diagnostic(&format!("kill: {raw}: not a job id"));
                ok = false;
                continue;
            };
            match session.jobs.terminate(id) {
                Ok(job) => session.io.writeln(&format!("[{}] Terminated {}", job.id, job.name))?,
                Err(e) => {
                    session.io.diagnostic(&format!("kill: {e}"));
                    ok = false;
                }
            }
        }
        Ok(ok)
    }
}

enum HashAction {
    List,
    Clear,
}

pub struct Hash {
    action: HashAction,
}

impl Hash {
    pub fn construct(args: Vec<String>) -> ShellResult<Box<dyn Builtin>> {
        let action = match args.first().map(String::as_str) {
            Some("-l") => HashAction::List,
            Some("-r") => HashAction::Clear,
            _ => return Err(invalid("usage: hash -l | -r")),
        };
        Ok(Box::new(Self { action }))
    }
}

#[async_trait]
impl Builtin for Hash {
    async fn run(self: Box<Self>, session: &mut Session) -> ShellResult<bool> {
        match self.action {
            HashAction::List => {
                let listing: String = session
                    .env
                    .cached_paths()
                    .into_iter()
                    .map(|(name, path)| format!("{name}\t{}\n", path.display()))
                    .collect();
                session.io.write(&listing)?;
            }
            HashAction::Clear => {
                let forgotten = session.env.cached_paths().len();
                session.env.clear_paths();
                tracing::debug!(forgotten, "Path cache cleared");
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobMode, JobSpec};
    use crate::redirect::Sink;
    use std::path::PathBuf;

    fn session() -> (Session, Sink, Sink) {
        let out = Sink::memory();
        let err = Sink::memory();
        let session = Session::builder()
            .output(out.clone())
            .errors(err.clone())
            .cwd(std::env::temp_dir())
            .build()
            .unwrap();
        (session, out, err)
    }

    fn args(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| (*w).to_string()).collect()
    }

    #[tokio::test]
    async fn test_ps_filters_by_name() {
        let (mut s, out, _) = session();
        let _a = s.jobs.register(JobSpec::foreground("alpha"));
        let _b = s.jobs.register(JobSpec::foreground("beta"));
        Ps::construct(args(&["beta"])).unwrap().run(&mut s).await.unwrap();

        let listing = out.contents().unwrap();
        let lines: Vec<_> = listing.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("ID"));
        assert!(lines[1].starts_with("1     beta        fg"));
    }

    #[tokio::test]
    async fn test_kill_reports_every_refusal() {
        let (mut s, _, err) = session();
        let _fg = s.jobs.register(JobSpec::foreground("sleep"));
        let kill = Kill::construct(args(&["0", "7", "x"])).unwrap();
        assert!(!kill.run(&mut s).await.unwrap());

        let diagnostics = err.contents().unwrap();
        assert!(diagnostics.contains("foreground jobs cannot be terminated"));
        assert!(diagnostics.contains("7: no such job"));
        assert!(diagnostics.contains("x: not a job id"));
    }

    #[tokio::test]
    async fn test_kill_background_job() {
        let (mut s, out, _) = session();
        let guard = s
            .jobs
            .register(JobSpec::foreground("sleep").with_mode(JobMode::Background));
        let id = guard.id();
        let task = tokio::spawn(async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        });
        s.jobs.attach(id, task.abort_handle());

        let kill = Kill::construct(vec![format!("%{id}")]).unwrap();
        assert!(kill.run(&mut s).await.unwrap());
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(!s.jobs.contains(id));
        assert_eq!(out.contents().as_deref(), Some("[0] Terminated sleep\n"));
    }

    #[test]
    fn test_kill_requires_ids() {
        assert!(Kill::construct(Vec::new()).is_err());
    }

    #[tokio::test]
    async fn test_hash_list_and_clear() {
        let (mut s, out, _) = session();
        s.env.cache_path("tool", PathBuf::from("/opt/bin/tool"));
        Hash::construct(args(&["-l"])).unwrap().run(&mut s).await.unwrap();
        assert_eq!(out.contents().as_deref(), Some("tool\t/opt/bin/tool\n"));

        Hash::construct(args(&["-r"])).unwrap().run(&mut s).await.unwrap();
        assert!(s.env.cached_paths().is_empty());
        assert!(Hash::construct(Vec::new()).is_err());
    }
}
