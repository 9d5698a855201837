//! Working directory and listing builtins

use super::{invalid, Builtin};
use crate::error::{ShellError, ShellResult};
use crate::session::Session;
use async_trait::async_trait;

pub struct Cd {
    path: Option<String>,
}

impl Cd {
    pub fn construct(args: Vec<String>) -> ShellResult<Box<dyn Builtin>> {
        if args.len() > 1 {
            return Err(invalid("cd: too many arguments"));
        }
        Ok(Box::new(Self {
            path: args.into_iter().next(),
        }))
    }
}

#[async_trait]
impl Builtin for Cd {
    async fn run(self: Box<Self>, session: &mut Session) -> ShellResult<bool> {
        let target = match &self.path {
            Some(path) => session.resolve_path(path),
            None => session.home_dir().into(),
        };
        let target = std::fs::canonicalize(&target)
            .map_err(|e| ShellError::file_access(target.display(), e))?;
        if !target.is_dir() {
            return Err(invalid(format!("cd: {}: Not a directory", target.display())));
        }
        session.set_cwd(target);
        Ok(true)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct LsOptions {
    all: bool,
    almost_all: bool,
    ignore_backups: bool,
    list: bool,
    reverse: bool,
}

pub struct Ls {
    options: LsOptions,
    paths: Vec<String>,
}

impl Ls {
    pub fn construct(args: Vec<String>) -> ShellResult<Box<dyn Builtin>> {
        let mut options = LsOptions::default();
        let mut paths = Vec::new();
        for arg in args {
            match arg.as_str() {
                "-a" | "--all" => options.all = true,
                "-A" | "--almost-all" => options.almost_all = true,
                "-B" | "--ignore-backups" => options.ignore_backups = true,
                "-l" => options.list = true,
                "-r" | "--reverse" => options.reverse = true,
                flag if flag.starts_with('-') && flag.len() > 1 => {
                    return Err(invalid(format!("ls: unknown option `{flag}`")));
                }
                _ => paths.push(arg),
            }
        }
        if paths.is_empty() {
            paths.push(".".to_string());
        }
        Ok(Box::new(Self { options, paths }))
    }

    fn entries(&self, session: &Session, path: &str) -> ShellResult<Vec<String>> {
        let dir = session.resolve_path(path);
        let read = std::fs::read_dir(&dir).map_err(|e| ShellError::file_access(path, e))?;
        let mut names = Vec::new();
        for entry in read {
            let entry = entry.map_err(|e| ShellError::file_access(path, e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort_unstable();

        let options = self.options;
        names.retain(|name| {
            let hidden = name.starts_with('.');
            (!hidden || options.all || options.almost_all)
                && !(options.ignore_backups && name.ends_with('~'))
        });
        if options.all {
            names.splice(0..0, [".".to_string(), "..".to_string()]);
        }
        if options.reverse {
            names.reverse();
        }
        Ok(names)
    }
}

#[async_trait]
impl Builtin for Ls {
    async fn run(self: Box<Self>, session: &mut Session) -> ShellResult<bool> {
        let mut ok = true;
        let titled = self.paths.len() > 1;
        for path in &self.paths {
            let names = match self.entries(session, path) {
                Ok(names) => names,
                Err(e) => {
                    session.io.diagnostic(&format!("ls: {e}"));
                    ok = false;
                    continue;
                }
            };
            if titled {
                session.io.writeln(&format!("{path}:"))?;
            }
            let separator = if self.options.list { "\n" } else { "  " };
            if !names.is_empty() {
                session.io.writeln(&names.join(separator))?;
            }
        }
        Ok(ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redirect::Sink;
    use std::path::Path;

    fn session(cwd: &Path) -> (Session, Sink) {
        let out = Sink::memory();
        let session = Session::builder()
            .output(out.clone())
            .errors(Sink::memory())
            .home(cwd.display().to_string())
            .cwd(cwd)
            .build()
            .unwrap();
        (session, out)
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "a.txt", ".hidden", "notes~"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        dir
    }

    async fn ls(s: &mut Session, words: &[&str]) -> bool {
        let args = words.iter().map(|w| (*w).to_string()).collect();
        Ls::construct(args).unwrap().run(s).await.unwrap()
    }

    #[tokio::test]
    async fn test_ls_hides_dotfiles() {
        let dir = fixture();
        let (mut s, out) = session(dir.path());
        assert!(ls(&mut s, &[]).await);
        assert_eq!(out.contents().as_deref(), Some("a.txt  b.txt  notes~  sub\n"));
    }

    #[tokio::test]
    async fn test_ls_flags() {
        let dir = fixture();
        let (mut s, out) = session(dir.path());
        ls(&mut s, &["-a", "-B", "-l"]).await;
        assert_eq!(
            out.contents().as_deref(),
            Some(".\n..\n.hidden\na.txt\nb.txt\nsub\n")
        );
    }

    #[tokio::test]
    async fn test_ls_almost_all_reversed() {
        let dir = fixture();
        let (mut s, out) = session(dir.path());
        ls(&mut s, &["-A", "-r"]).await;
        assert_eq!(
            out.contents().as_deref(),
            Some("sub  notes~  b.txt  a.txt  .hidden\n")
        );
    }

    #[tokio::test]
    async fn test_ls_missing_directory_fails() {
        let dir = fixture();
        let (mut s, _) = session(dir.path());
        assert!(!ls(&mut s, &["nope"]).await);
    }

    #[tokio::test]
    async fn test_cd_relative_and_home() {
        let dir = fixture();
        let (mut s, _) = session(dir.path());
        let cd = Cd::construct(vec!["sub".into()]).unwrap();
        assert!(cd.run(&mut s).await.unwrap());
        assert!(s.cwd().ends_with("sub"));

        Cd::construct(Vec::new()).unwrap().run(&mut s).await.unwrap();
        assert_eq!(s.cwd(), std::fs::canonicalize(dir.path()).unwrap());
    }

    #[tokio::test]
    async fn test_cd_into_file_is_refused() {
        let dir = fixture();
        let (mut s, _) = session(dir.path());
        let cd = Cd::construct(vec!["a.txt".into()]).unwrap();
        assert!(matches!(
            cd.run(&mut s).await,
            Err(ShellError::InvalidArgument(_))
        ));
        let cd = Cd::construct(vec!["missing".into()]).unwrap();
        assert!(matches!(
            cd.run(&mut s).await,
            Err(ShellError::FileAccess { .. })
        ));
    }
}
