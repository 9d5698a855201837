//! Shell-level builtins: output, status, exit, help, history and the
//! nested shell

use super::{format_help, invalid, Builtin};
use crate::error::{ShellError, ShellResult};
use crate::grammar::Family;
use crate::session::Session;
use async_trait::async_trait;
use std::time::Duration;

pub struct Echo {
    words: Vec<String>,
}

impl Echo {
    pub fn construct(args: Vec<String>) -> ShellResult<Box<dyn Builtin>> {
        Ok(Box::new(Self { words: args }))
    }
}

#[async_trait]
impl Builtin for Echo {
    async fn run(self: Box<Self>, session: &mut Session) -> ShellResult<bool> {
        session.io.writeln(&self.words.join(" "))?;
        Ok(true)
    }
}

/// `true` and `false`
pub struct Status(bool);

impl Status {
    pub fn success(_args: Vec<String>) -> ShellResult<Box<dyn Builtin>> {
        Ok(Box::new(Self(true)))
    }

    pub fn failure(_args: Vec<String>) -> ShellResult<Box<dyn Builtin>> {
        Ok(Box::new(Self(false)))
    }
}

#[async_trait]
impl Builtin for Status {
    async fn run(self: Box<Self>, _session: &mut Session) -> ShellResult<bool> {
        Ok(self.0)
    }
}

pub struct Exit {
    code: i32,
}

impl Exit {
    pub fn construct(args: Vec<String>) -> ShellResult<Box<dyn Builtin>> {
        let code = match args.first() {
            Some(code) => code
                .parse()
                .map_err(|_| invalid(format!("exit: {code}: numeric argument required")))?,
            None => 0,
        };
        Ok(Box::new(Self { code }))
    }
}

#[async_trait]
impl Builtin for Exit {
    async fn run(self: Box<Self>, _session: &mut Session) -> ShellResult<bool> {
        Err(ShellError::Exit(self.code))
    }
}

pub struct Sleep {
    duration: Duration,
}

impl Sleep {
    pub fn construct(args: Vec<String>) -> ShellResult<Box<dyn Builtin>> {
        let [seconds] = args.as_slice() else {
            return Err(invalid("usage: sleep SECONDS"));
        };
        let duration = seconds
            .parse::<f64>()
            .ok()
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
            .ok_or_else(|| invalid(format!("sleep: invalid time interval `{seconds}`")))?;
        Ok(Box::new(Self { duration }))
    }
}

#[async_trait]
impl Builtin for Sleep {
    async fn run(self: Box<Self>, _session: &mut Session) -> ShellResult<bool> {
        tokio::time::sleep(self.duration).await;
        Ok(true)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum HelpMode {
    Usage,
    Commands,
    CommandsWithUsage,
    Everything,
    Command(String),
}

pub struct Help {
    mode: HelpMode,
}

impl Help {
    pub fn construct(args: Vec<String>) -> ShellResult<Box<dyn Builtin>> {
        let mode = match args.first().map(String::as_str) {
            None => HelpMode::Usage,
            Some("-v") => HelpMode::Commands,
            Some("-vv") => HelpMode::CommandsWithUsage,
            Some("-vvv") => HelpMode::Everything,
            Some(flag) if flag.starts_with('-') => {
                return Err(invalid(format!("help: unknown option `{flag}`")));
            }
            Some(name) => HelpMode::Command(name.to_string()),
        };
        Ok(Box::new(Self { mode }))
    }
}

fn grammar_section(session: &Session, family: Family, title: &str) -> String {
    let mut out = format!("\n{title}:\n");
    for rule in session.grammar().rules().filter(|r| r.family == family) {
        out.push_str(&format!("  {:10} {:18} {}\n", rule.trigger, rule.name, rule.description));
    }
    out
}

#[async_trait]
impl Builtin for Help {
    async fn run(self: Box<Self>, session: &mut Session) -> ShellResult<bool> {
        let builtins = session.builtins();
        let text = match &self.mode {
            HelpMode::Usage => match builtins.get("help") {
                Some(spec) => format_help(spec),
                None => String::new(),
            },
            HelpMode::Command(name) => match builtins.get(name) {
                Some(spec) => format_help(spec),
                None => return Err(ShellError::CommandNotFound(name.clone())),
            },
            HelpMode::Commands => {
                let mut out = String::from("Builtin commands:\n");
                for spec in builtins.iter() {
                    out.push_str(&format!("  {:10} {}\n", spec.name, spec.summary));
                }
                out
            }
            HelpMode::CommandsWithUsage | HelpMode::Everything => {
                let mut out = String::from("Builtin commands:\n");
                for spec in builtins.iter() {
                    out.push_str(&format!("\n  {} - {}\n    {}\n", spec.name, spec.summary, spec.usage));
                }
                if self.mode == HelpMode::Everything {
                    out.push_str(&grammar_section(session, Family::Symbol, "Symbols"));
                    out.push_str(&grammar_section(session, Family::Keyword, "Keywords"));
                }
                out
            }
        };
        session.io.write(&text)?;
        Ok(true)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum HistoryAction {
    List,
    Recent(usize),
    ShowCapacity,
    Resize(usize),
    Clear(Option<usize>),
}

pub struct HistoryCmd {
    action: HistoryAction,
}

fn count(flag: &str, value: &str) -> ShellResult<usize> {
    value
        .parse()
        .map_err(|_| invalid(format!("history: {flag}: `{value}` is not a count")))
}

impl HistoryCmd {
    pub fn construct(args: Vec<String>) -> ShellResult<Box<dyn Builtin>> {
        let action = match args.as_slice() {
            [] => HistoryAction::List,
            [flag] if flag == "--maxlen" => HistoryAction::ShowCapacity,
            [flag, n] if flag == "--maxlen" => HistoryAction::Resize(count(flag, n)?),
            [flag] if flag == "--clear" => HistoryAction::Clear(None),
            [flag, n] if flag == "--clear" => HistoryAction::Clear(Some(count(flag, n)?)),
            [n] => HistoryAction::Recent(count("N", n)?),
            _ => return Err(invalid("usage: history [N] | --maxlen [N] | --clear [N]")),
        };
        Ok(Box::new(Self { action }))
    }
}

#[async_trait]
impl Builtin for HistoryCmd {
    async fn run(self: Box<Self>, session: &mut Session) -> ShellResult<bool> {
        let text = {
            let mut history = session.history();
            match self.action {
                HistoryAction::List => history.iter().map(|e| format!("{e}\n")).collect(),
                HistoryAction::Recent(n) => history
                    .iter()
                    .rev()
                    .take(n)
                    .map(|e| format!("{e}\n"))
                    .collect(),
                HistoryAction::ShowCapacity => format!("{}\n", history.capacity()),
                HistoryAction::Resize(n) => {
                    history.resize(n);
                    String::new()
                }
                HistoryAction::Clear(None) => {
                    history.clear();
                    String::new()
                }
                HistoryAction::Clear(Some(n)) => {
                    history.forget_recent(n);
                    String::new()
                }
            }
        };
        session.io.write(&text)?;
        Ok(true)
    }
}

/// `jsh`: a shell inside the shell, reading whatever input is active
pub struct Nested;

impl Nested {
    pub fn construct(args: Vec<String>) -> ShellResult<Box<dyn Builtin>> {
        if let Some(arg) = args.first() {
            return Err(invalid(format!("jsh: unexpected argument `{arg}`")));
        }
        Ok(Box::new(Self))
    }
}

#[async_trait]
impl Builtin for Nested {
    async fn run(self: Box<Self>, session: &mut Session) -> ShellResult<bool> {
        let code = session.interact().await?;
        if session.io.is_interactive() {
            session.io.writeln("logout")?;
        }
        Ok(code == 0)
    }
}
