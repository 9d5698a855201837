//! Grammar rules for jsh statements
//!
//! The registry is a fixed table built once at startup. Each rule is a
//! transform over a token sequence that reports whether its trigger was
//! present; only the resolver decides what a fired rule means for the rest
//! of the statement.

use crate::error::{ShellError, ShellResult};
use crate::jobs::JobId;
use crate::lexer::{Quote, Token};
use regex::Regex;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*=.+$").expect("assignment pattern is valid")
});

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("variable pattern is valid")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleKind {
    Semicolon,
    And,
    Background,
    ShellId,
    Home,
    Assign,
    Expand,
    InputFile,
    Heredoc,
    OutputTruncate,
    OutputAppend,
    Substitution,
    Export,
    Exec,
    Daemon,
    Join,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Family {
    Symbol,
    Keyword,
}

/// Where a trigger must sit for the rule to fire
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Position {
    Anywhere,
    First,
    Last,
}

#[derive(Clone, Debug)]
pub struct GrammarRule {
    pub kind: RuleKind,
    pub name: &'static str,
    pub trigger: &'static str,
    pub family: Family,
    pub position: Position,
    pub description: &'static str,
}

const fn rule(
    kind: RuleKind,
    name: &'static str,
    trigger: &'static str,
    family: Family,
    position: Position,
    description: &'static str,
) -> GrammarRule {
    GrammarRule {
        kind,
        name,
        trigger,
        family,
        position,
        description,
    }
}

const RULES: &[GrammarRule] = &[
    rule(RuleKind::Semicolon, "semicolon", ";", Family::Symbol, Position::Anywhere, "run several statements in order"),
    rule(RuleKind::And, "and", "&&", Family::Symbol, Position::Anywhere, "run the next statement only if the previous one succeeded"),
    rule(RuleKind::Background, "background", "&", Family::Symbol, Position::Last, "run the statement as a background job"),
    rule(RuleKind::ShellId, "shell_id", "$$", Family::Symbol, Position::Anywhere, "id of the running shell job"),
    rule(RuleKind::Home, "home", "~", Family::Symbol, Position::Anywhere, "home directory"),
    rule(RuleKind::Assign, "assign", "=", Family::Symbol, Position::First, "set shell variables"),
    rule(RuleKind::Expand, "expand", "$", Family::Symbol, Position::Anywhere, "read a variable"),
    rule(RuleKind::InputFile, "input_file", "<", Family::Symbol, Position::Anywhere, "read input from a file"),
    rule(RuleKind::Heredoc, "heredoc", "<<", Family::Symbol, Position::Anywhere, "read input lines up to a terminator"),
    rule(RuleKind::OutputTruncate, "output_truncate", ">", Family::Symbol, Position::Anywhere, "write output to a file, replacing it"),
    rule(RuleKind::OutputAppend, "output_append", ">>", Family::Symbol, Position::Anywhere, "append output to a file"),
    rule(RuleKind::Substitution, "substitution", "`", Family::Symbol, Position::Anywhere, "replace a command with its output"),
    rule(RuleKind::Export, "export", "export", Family::Keyword, Position::First, "set persisted environment variables"),
    rule(RuleKind::Exec, "exec", "exec", Family::Keyword, Position::First, "run one statement or capture the session to a file, then exit"),
    rule(RuleKind::Daemon, "daemon", "--daemon", Family::Keyword, Position::Last, "background job dies with the shell"),
    rule(RuleKind::Join, "join", "--join", Family::Keyword, Position::Anywhere, "wait for the background job to finish"),
];

/// Session values the literal-unfolding rules read
pub trait Bindings {
    fn shell_id(&self) -> Option<JobId>;
    fn home(&self) -> String;
    fn lookup(&self, name: &str) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCapture {
    pub path: String,
    pub append: bool,
}

/// Outcome of applying one rule
#[derive(Debug, PartialEq, Eq)]
pub enum Rewrite {
    /// Trigger absent; tokens handed back as they came
    Untouched(Vec<Token>),
    Tokens(Vec<Token>),
    Pieces(Vec<Vec<Token>>),
    Assign {
        pairs: Vec<(String, String)>,
        rest: Vec<Token>,
    },
    Operand {
        operand: Option<String>,
        rest: Vec<Token>,
    },
    Flag(Vec<Token>),
    Exec {
        capture: Option<ExecCapture>,
        rest: Vec<Token>,
    },
    /// Byte spans of every backtick pair, backticks included
    Substitute(Vec<Range<usize>>),
}

impl Rewrite {
    pub fn fired(&self) -> bool {
        !matches!(self, Self::Untouched(_))
    }
}

pub struct GrammarRegistry {
    rules: HashMap<RuleKind, GrammarRule>,
    triggers: HashMap<&'static str, RuleKind>,
}

impl GrammarRegistry {
    pub fn standard() -> Self {
        let rules = RULES.iter().map(|r| (r.kind, r.clone())).collect();
        let triggers = RULES.iter().map(|r| (r.trigger, r.kind)).collect();
        Self { rules, triggers }
    }

    pub fn rule(&self, kind: RuleKind) -> Option<&GrammarRule> {
        self.rules.get(&kind)
    }

    pub fn by_trigger(&self, trigger: &str) -> Option<&GrammarRule> {
        self.triggers.get(trigger).and_then(|k| self.rules.get(k))
    }

    /// Rules in table order, symbols before keywords
    pub fn rules(&self) -> impl Iterator<Item = &GrammarRule> {
        RULES.iter().filter_map(|r| self.rules.get(&r.kind))
    }

    pub fn apply(
        &self,
        kind: RuleKind,
        tokens: Vec<Token>,
        bindings: &dyn Bindings,
    ) -> ShellResult<Rewrite> {
        let trigger = self.rules.get(&kind).map_or("", |r| r.trigger);
        let rewrite = match kind {
            RuleKind::Semicolon | RuleKind::And => split_on(tokens, trigger),
            RuleKind::Background => background(tokens),
            RuleKind::ShellId => {
                let id = bindings.shell_id().map(|id| id.to_string()).unwrap_or_default();
                rewrite_each(tokens, |t| {
                    (t.expandable() && t.text.contains("$$")).then(|| t.text.replace("$$", &id))
                })
            }
            RuleKind::Home => {
                let home = bindings.home();
                rewrite_each(tokens, |t| {
                    if t.quote != Quote::Bare {
                        None
                    } else if t.text == "~" {
                        Some(home.clone())
                    } else {
                        t.text.strip_prefix("~/").map(|rest| format!("{home}/{rest}"))
                    }
                })
            }
            RuleKind::Assign => assign(tokens),
            RuleKind::Expand => expand(tokens, bindings),
            RuleKind::InputFile
            | RuleKind::Heredoc
            | RuleKind::OutputTruncate
            | RuleKind::OutputAppend => operand(tokens, trigger),
            RuleKind::Substitution => substitution(tokens)?,
            RuleKind::Export => export(tokens),
            RuleKind::Exec => exec(tokens),
            RuleKind::Daemon => {
                if tokens.last().is_some_and(|t| t.is(trigger)) {
                    let mut rest = tokens;
                    rest.pop();
                    Rewrite::Flag(rest)
                } else {
                    Rewrite::Untouched(tokens)
                }
            }
            RuleKind::Join => {
                if tokens.iter().any(|t| t.is(trigger)) {
                    Rewrite::Flag(tokens.into_iter().filter(|t| !t.is(trigger)).collect())
                } else {
                    Rewrite::Untouched(tokens)
                }
            }
        };
        if rewrite.fired() {
            tracing::trace!(rule = ?kind, "grammar rule fired");
        }
        Ok(rewrite)
    }
}

impl Default for GrammarRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

pub fn is_assignment(token: &Token) -> bool {
    token.quote == Quote::Bare && ASSIGNMENT.is_match(&token.text)
}

fn pair(token: &Token) -> (String, String) {
    let (name, value) = token.text.split_once('=').unwrap_or((&token.text, ""));
    (name.to_string(), value.to_string())
}

/// Split at every top-level occurrence of `op`; separators between a pair of
/// backticks belong to the substituted command.
fn split_on(tokens: Vec<Token>, op: &str) -> Rewrite {
    let mut in_backticks = false;
    let top_level = |t: &Token, inside: bool| !inside && t.is(op);
    if !tokens.iter().any(|t| {
        if t.is("`") {
            in_backticks = !in_backticks;
        }
        top_level(t, in_backticks)
    }) {
        return Rewrite::Untouched(tokens);
    }

    let mut pieces = Vec::new();
    let mut current = Vec::new();
    in_backticks = false;
    for token in tokens {
        if token.is("`") {
            in_backticks = !in_backticks;
        }
        if top_level(&token, in_backticks) {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
        } else {
            current.push(token);
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    Rewrite::Pieces(pieces)
}

/// `&` must be the last token apart from `--join`/`--daemon`.
fn background(mut tokens: Vec<Token>) -> Rewrite {
    let marker = tokens
        .iter()
        .rposition(|t| !t.is("--join") && !t.is("--daemon"));
    match marker {
        Some(i) if tokens[i].is("&") => {
            tokens.remove(i);
            Rewrite::Flag(tokens)
        }
        _ => Rewrite::Untouched(tokens),
    }
}

fn rewrite_each(tokens: Vec<Token>, with: impl Fn(&Token) -> Option<String>) -> Rewrite {
    let mut fired = false;
    let tokens = tokens
        .into_iter()
        .map(|mut t| {
            if let Some(text) = with(&t) {
                t.text = text;
                fired = true;
            }
            t
        })
        .collect();
    if fired {
        Rewrite::Tokens(tokens)
    } else {
        Rewrite::Untouched(tokens)
    }
}

/// Leading assignments only take effect when nothing else follows them;
/// either way they are stripped from the statement.
fn assign(mut tokens: Vec<Token>) -> Rewrite {
    let leading = tokens.iter().take_while(|t| is_assignment(t)).count();
    if leading == 0 {
        return Rewrite::Untouched(tokens);
    }
    let rest = tokens.split_off(leading);
    let pairs = if rest.is_empty() {
        tokens.iter().map(pair).collect()
    } else {
        Vec::new()
    };
    Rewrite::Assign { pairs, rest }
}

fn expand(tokens: Vec<Token>, bindings: &dyn Bindings) -> Rewrite {
    let mut fired = false;
    let tokens = tokens
        .into_iter()
        .map(|mut t| {
            if t.expandable() && VARIABLE.is_match(&t.text) {
                t.text = VARIABLE
                    .replace_all(&t.text, |caps: &regex::Captures| {
                        bindings.lookup(&caps[1]).unwrap_or_default()
                    })
                    .into_owned();
                fired = true;
            }
            t
        })
        .collect();
    if fired {
        Rewrite::Tokens(tokens)
    } else {
        Rewrite::Untouched(tokens)
    }
}

fn operand(mut tokens: Vec<Token>, op: &str) -> Rewrite {
    let Some(i) = tokens.iter().position(|t| t.is(op)) else {
        return Rewrite::Untouched(tokens);
    };
    tokens.remove(i);
    let operand = (i < tokens.len()).then(|| tokens.remove(i).text);
    Rewrite::Operand {
        operand,
        rest: tokens,
    }
}

fn substitution(tokens: Vec<Token>) -> ShellResult<Rewrite> {
    let marks: Vec<&Token> = tokens.iter().filter(|t| t.is("`")).collect();
    if marks.is_empty() {
        return Ok(Rewrite::Untouched(tokens));
    }
    if marks.len() % 2 != 0 {
        return Err(ShellError::Lex("unpaired backtick".to_string()));
    }
    let spans = marks
        .chunks(2)
        .map(|marks| marks[0].span.start..marks[1].span.end)
        .collect();
    Ok(Rewrite::Substitute(spans))
}

fn export(tokens: Vec<Token>) -> Rewrite {
    if !tokens.first().is_some_and(|t| t.is("export")) {
        return Rewrite::Untouched(tokens);
    }
    let args = &tokens[1..];
    let pairs = if args.iter().all(is_assignment) {
        args.iter().map(pair).collect()
    } else {
        tracing::warn!("export ignored: every argument must be name=value");
        Vec::new()
    };
    Rewrite::Assign {
        pairs,
        rest: Vec::new(),
    }
}

fn exec(mut tokens: Vec<Token>) -> Rewrite {
    if !tokens.first().is_some_and(|t| t.is("exec")) {
        return Rewrite::Untouched(tokens);
    }
    let rest = tokens.split_off(1);
    let capture = match rest.as_slice() {
        [op, path, ..] if op.is(">") || op.is(">>") => Some(ExecCapture {
            path: path.text.clone(),
            append: op.is(">>"),
        }),
        _ => None,
    };
    Rewrite::Exec { capture, rest }
}
