//! Statement resolution
//!
//! A line runs through a fixed sequence of stages:
//!
//! 1. `exec`
//! 2. `;` splitting
//! 3. `&&` splitting
//! 4. literal unfolding: `$$`, `~`, assignments, `$name`, `export`
//! 5. background detection (`&`, then `--join` and `--daemon`)
//! 6. `<`, `<<`, `>`, `>>` scopes, then command substitution inside them
//! 7. dispatch
//!
//! A stage that fully handles the statement returns early, so later stages
//! never see it. Sub-statements go back through [`Session::run_line`], the
//! statement boundary where ordinary errors become a printed diagnostic and
//! a failed result while `Exit`/`EndOfInput` keep unwinding.

use crate::error::{ShellError, ShellResult};
use crate::grammar::{ExecCapture, Rewrite, RuleKind};
use crate::lexer::{texts, tokenize, Token};
use crate::redirect::InputKind;
use crate::session::{Session, MAX_DEPTH};
use std::future::Future;
use std::ops::Range;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// How a resolved command is to be run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Flags {
    pub background: bool,
    pub daemon: bool,
    pub join: bool,
}

/// Raw text covered by `tokens`
fn raw_slice<'a>(raw: &'a str, tokens: &[Token]) -> &'a str {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => raw.get(first.span.start..last.span.end).unwrap_or(""),
        _ => "",
    }
}

impl Flags {
    /// Markers that bring these flags back when a rewritten line is resolved
    /// again from the start.
    fn markers(self) -> &'static str {
        match (self.background, self.join, self.daemon) {
            (false, ..) => "",
            (true, false, false) => " &",
            (true, true, false) => " & --join",
            (true, false, true) => " & --daemon",
            (true, true, true) => " & --join --daemon",
        }
    }
}

/// Substituted output reads as one line of words.
fn flatten_output(output: &str) -> String {
    output.trim_end_matches(['\n', '\r']).replace(['\r', '\n'], " ")
}

impl Session {
    /// Resolve and run one raw line. Never fails except for control signals.
    pub fn run_line<'a>(&'a mut self, line: &'a str) -> BoxFuture<'a, ShellResult<bool>> {
        Box::pin(async move {
            if self.depth >= MAX_DEPTH {
                self.io
                    .diagnostic(&format!("jsh: {}", ShellError::RecursionLimit(MAX_DEPTH)));
                return Ok(false);
            }
            self.depth += 1;
            let result = match tokenize(line) {
                Ok(tokens) => self.resolve(line, tokens).await,
                Err(e) => Err(e),
            };
            self.depth -= 1;

            match result {
                Err(e) if !e.is_control() => {
                    tracing::debug!(error = %e, line, "Statement failed");
                    self.io.diagnostic(&format!("jsh: {e}"));
                    Ok(false)
                }
                other => other,
            }
        })
    }

    async fn resolve(&mut self, raw: &str, tokens: Vec<Token>) -> ShellResult<bool> {
        if tokens.is_empty() {
            return Ok(true);
        }
        let grammar = std::sync::Arc::clone(&self.grammar);

        // 1. exec
        let tokens = match grammar.apply(RuleKind::Exec, tokens, &*self)? {
            Rewrite::Exec { capture, rest } => {
                tracing::debug!(stage = "exec", capture = capture.is_some(), "Stage fired");
                return self.exec(capture, raw_slice(raw, &rest)).await;
            }
            rewrite => into_tokens(rewrite),
        };

        // 2. statement separator
        let tokens = match grammar.apply(RuleKind::Semicolon, tokens, &*self)? {
            Rewrite::Pieces(pieces) => {
                tracing::debug!(stage = "semicolon", pieces = pieces.len(), "Stage fired");
                let mut last = true;
                for piece in &pieces {
                    last = self.run_line(raw_slice(raw, piece)).await?;
                }
                return Ok(last);
            }
            rewrite => into_tokens(rewrite),
        };

        // 3. logical AND
        let tokens = match grammar.apply(RuleKind::And, tokens, &*self)? {
            Rewrite::Pieces(pieces) => {
                tracing::debug!(stage = "and", pieces = pieces.len(), "Stage fired");
                for piece in &pieces {
                    if !self.run_line(raw_slice(raw, piece)).await? {
                        return Ok(false);
                    }
                }
                return Ok(true);
            }
            rewrite => into_tokens(rewrite),
        };

        // 4. literal unfolding
        let tokens = into_tokens(grammar.apply(RuleKind::ShellId, tokens, &*self)?);
        let tokens = into_tokens(grammar.apply(RuleKind::Home, tokens, &*self)?);
        let tokens = match grammar.apply(RuleKind::Assign, tokens, &*self)? {
            Rewrite::Assign { pairs, rest } if rest.is_empty() => {
                tracing::debug!(stage = "assign", count = pairs.len(), "Stage fired");
                for (name, value) in pairs {
                    self.vars.set(name, value);
                }
                return Ok(true);
            }
            rewrite => into_tokens(rewrite),
        };
        let tokens = into_tokens(grammar.apply(RuleKind::Expand, tokens, &*self)?);
        let tokens = match grammar.apply(RuleKind::Export, tokens, &*self)? {
            Rewrite::Assign { pairs, .. } => {
                tracing::debug!(stage = "export", count = pairs.len(), "Stage fired");
                if !pairs.is_empty() {
                    self.env.extend(pairs)?;
                }
                return Ok(true);
            }
            rewrite => into_tokens(rewrite),
        };

        // 5. background detection
        let mut flags = Flags::default();
        let mut tokens = tokens;
        if let Rewrite::Flag(rest) = grammar.apply(RuleKind::Background, tokens.clone(), &*self)? {
            flags.background = true;
            tokens = rest;
            if let Rewrite::Flag(rest) = grammar.apply(RuleKind::Join, tokens.clone(), &*self)? {
                flags.join = true;
                tokens = rest;
            }
            if let Rewrite::Flag(rest) = grammar.apply(RuleKind::Daemon, tokens.clone(), &*self)? {
                flags.daemon = true;
                tokens = rest;
            }
            tracing::debug!(stage = "background", ?flags, "Stage fired");
        }

        self.redirect(raw, tokens, flags).await
    }

    /// Redirection scopes around the rest of the statement, then command
    /// substitution or dispatch.
    fn redirect<'a>(
        &'a mut self,
        raw: &'a str,
        tokens: Vec<Token>,
        flags: Flags,
    ) -> BoxFuture<'a, ShellResult<bool>> {
        Box::pin(async move {
            let grammar = std::sync::Arc::clone(&self.grammar);

            if let Rewrite::Operand { operand, rest } =
                grammar.apply(RuleKind::InputFile, tokens.clone(), &*self)?
            {
                let path = self.resolve_path(&operand.ok_or_else(|| missing("<"))?);
                tracing::debug!(stage = "input_file", path = ?path, "Stage fired");
                let scope = self.io.open_input_file(&path, InputKind::Redirect)?;
                let result = self.redirect(raw, rest, flags).await;
                self.io.close_input(scope);
                return result;
            }

            if let Rewrite::Operand { operand, rest } =
                grammar.apply(RuleKind::Heredoc, tokens.clone(), &*self)?
            {
                let tag = operand.ok_or_else(|| missing("<<"))?;
                tracing::debug!(stage = "heredoc", tag = %tag, "Stage fired");
                let lines = self.heredoc(&tag).await?;
                let scope = self.io.open_input(lines, InputKind::Redirect);
                let result = self.redirect(raw, rest, flags).await;
                self.io.close_input(scope);
                return result;
            }

            for (kind, op, append) in [
                (RuleKind::OutputTruncate, ">", false),
                (RuleKind::OutputAppend, ">>", true),
            ] {
                if let Rewrite::Operand { operand, rest } =
                    grammar.apply(kind, tokens.clone(), &*self)?
                {
                    let path = self.resolve_path(&operand.ok_or_else(|| missing(op))?);
                    tracing::debug!(stage = op, path = ?path, "Stage fired");
                    let scope = self.io.open_file(&path, append)?;
                    let result = self.redirect(raw, rest, flags).await;
                    let _ = self.io.close_output(scope);
                    return result;
                }
            }

            // substitution re-resolves the rewritten statement from stage 1
            // while this statement's scopes stay open
            if let Rewrite::Substitute(spans) =
                grammar.apply(RuleKind::Substitution, tokens.clone(), &*self)?
            {
                tracing::debug!(stage = "substitution", count = spans.len(), "Stage fired");
                let mut rewritten = self.substitute(raw, &tokens, &spans).await?;
                rewritten.push_str(flags.markers());
                return self.run_line(&rewritten).await;
            }

            // 7. dispatch
            tracing::debug!(tokens = ?texts(&tokens), ?flags, "Dispatch");
            let Some((command, args)) = tokens.split_first() else {
                return Ok(true);
            };
            let args = args.iter().map(|t| t.text.clone()).collect();
            self.dispatch(command.text.clone(), args, flags).await
        })
    }

    /// Lines typed up to `tag`. Running out of input ends the document early.
    async fn heredoc(&mut self, tag: &str) -> ShellResult<Vec<String>> {
        let mut lines = Vec::new();
        loop {
            match self.io.read_line("> ").await {
                Ok(line) if line == tag => break,
                Ok(line) => lines.push(line),
                Err(ShellError::EndOfInput) => {
                    tracing::warn!(tag, "Here-document ended by end of input");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(lines)
    }

    /// Run each backtick span with captured output and rebuild the raw text
    /// of `tokens` around the results. A gap left by a consumed token reads
    /// as one space.
    async fn substitute(
        &mut self,
        raw: &str,
        tokens: &[Token],
        spans: &[Range<usize>],
    ) -> ShellResult<String> {
        let mut outputs = Vec::with_capacity(spans.len());
        for span in spans {
            let inner = raw.get(span.start + 1..span.end - 1).unwrap_or("");
            let scope = self.io.capture();
            let result = self.run_line(inner).await;
            let output = self.io.close_output(scope).unwrap_or_default();
            result?;
            outputs.push(flatten_output(&output));
        }

        let mut rewritten = String::with_capacity(raw.len());
        let mut pending = spans.iter().zip(outputs).peekable();
        let mut cursor: Option<usize> = None;
        for token in tokens {
            if let Some(end) = cursor {
                if token.span.start < end {
                    continue;
                }
                let gap = raw.get(end..token.span.start).unwrap_or(" ");
                if gap.chars().all(char::is_whitespace) {
                    rewritten.push_str(gap);
                } else {
                    rewritten.push(' ');
                }
            }
            match pending.next_if(|(span, _)| span.start == token.span.start) {
                Some((span, output)) => {
                    rewritten.push_str(&output);
                    cursor = Some(span.end);
                }
                None => {
                    rewritten.push_str(raw.get(token.span.clone()).unwrap_or(&token.text));
                    cursor = Some(token.span.end);
                }
            }
        }
        tracing::debug!(line = %rewritten, "Substituted line");
        Ok(rewritten)
    }

    /// `exec` ends the session after running; with `> file` every line read
    /// afterwards is written to the file instead of being run.
    async fn exec(&mut self, capture: Option<ExecCapture>, rest: &str) -> ShellResult<bool> {
        match capture {
            Some(ExecCapture { path, append }) => {
                let path = self.resolve_path(&path);
                let scope = self.io.open_file(&path, append)?;
                let written = loop {
                    let prompt = self.prompt();
                    match self.io.read_line(&prompt).await {
                        Ok(line) => {
                            if let Err(e) = self.io.writeln(&line) {
                                break Err(e);
                            }
                        }
                        Err(ShellError::EndOfInput | ShellError::Exit(_)) => break Ok(()),
                        Err(e) => break Err(e),
                    }
                };
                let _ = self.io.close_output(scope);
                written?;
            }
            None => {
                self.run_line(rest).await?;
            }
        }
        Err(ShellError::Exit(0))
    }
}

fn into_tokens(rewrite: Rewrite) -> Vec<Token> {
    match rewrite {
        Rewrite::Untouched(tokens) | Rewrite::Tokens(tokens) | Rewrite::Flag(tokens) => tokens,
        Rewrite::Assign { rest, .. }
        | Rewrite::Operand { rest, .. }
        | Rewrite::Exec { rest, .. } => rest,
        Rewrite::Pieces(pieces) => pieces.into_iter().flatten().collect(),
        Rewrite::Substitute(_) => Vec::new(),
    }
}

fn missing(op: &str) -> ShellError {
    ShellError::MissingOperand(op.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redirect::{ScriptedSource, Sink};

    fn session(lines: &[&str]) -> (Session, Sink, Sink) {
        let out = Sink::memory();
        let err = Sink::memory();
        let session = Session::builder()
            .input(ScriptedSource::new(lines.iter().copied()))
            .output(out.clone())
            .errors(err.clone())
            .home("/home/me")
            .cwd(std::env::temp_dir())
            .build()
            .unwrap();
        (session, out, err)
    }

    #[test]
    fn test_raw_slice_and_flatten() {
        let raw = "echo a ; echo  b";
        let tokens = tokenize(raw).unwrap();
        assert_eq!(raw_slice(raw, &tokens[3..]), "echo  b");
        assert_eq!(raw_slice(raw, &[]), "");
        assert_eq!(flatten_output("a\nb\n\n"), "a b");
    }

    #[tokio::test]
    async fn test_assignment_rules() {
        let (mut s, out, _) = session(&[]);
        assert!(s.execute("a=1 b=2").await.unwrap());
        assert_eq!(s.vars.get("a"), Some("1"));
        assert_eq!(s.vars.get("b"), Some("2"));

        s.execute("c=1 d=2 echo x").await.unwrap();
        assert!(s.vars.get("c").is_none());
        assert!(s.vars.get("d").is_none());
        assert_eq!(out.contents().as_deref(), Some("x\n"));
    }

    #[tokio::test]
    async fn test_expansion_order() {
        let (mut s, out, _) = session(&[]);
        s.execute("who=world").await.unwrap();
        s.execute("echo $who ~ '$who' pre'$who'").await.unwrap();
        assert_eq!(out.contents().as_deref(), Some("world /home/me $who pre$who\n"));
    }

    #[tokio::test]
    async fn test_lex_error_is_reported() {
        let (mut s, _, err) = session(&[]);
        assert!(!s.execute("echo 'open").await.unwrap());
        assert!(err.contents().unwrap().starts_with("jsh: Lex error"));
        assert!(!s.execute("echo `open").await.unwrap());
    }

    #[tokio::test]
    async fn test_heredoc_reads_up_to_tag() {
        let (mut s, out, _) = session(&["echo one", "echo two", "END", "echo after"]);
        assert!(s.execute("jsh << END").await.unwrap());
        assert_eq!(out.contents().as_deref(), Some("one\ntwo\n"));
        assert_eq!(s.io.read_line("").await.unwrap(), "echo after");
    }

    #[tokio::test]
    async fn test_substitution_runs_inside_redirection() {
        let (mut s, out, _) = session(&[]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub.txt");
        let line = format!("echo `echo inner`-x > {} &&echo done", path.display());
        assert!(s.execute(&line).await.unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "inner-x\n");
        assert_eq!(out.contents().as_deref(), Some("done\n"));
        assert_eq!(s.io.depth(), (0, 0));
    }

    #[tokio::test]
    async fn test_substitution_keeps_background_flags() {
        let (mut s, out, err) = session(&[]);
        assert!(s.execute("echo `echo later` & --join").await.unwrap());
        assert_eq!(out.contents().as_deref(), Some("later\n"));
        assert_eq!(err.contents().as_deref(), Some("[1] echo\n"));
        assert!(s.jobs.is_empty());
    }

    #[test]
    fn test_flag_markers() {
        let flags = Flags {
            background: true,
            daemon: true,
            join: false,
        };
        assert_eq!(flags.markers(), " & --daemon");
        assert_eq!(Flags::default().markers(), "");
    }

    #[tokio::test]
    async fn test_missing_operand() {
        let (mut s, _, err) = session(&[]);
        assert!(!s.execute("echo hi >").await.unwrap());
        assert!(err.contents().unwrap().contains("missing target after `>`"));
        assert_eq!(s.io.depth(), (0, 0));
    }

    #[tokio::test]
    async fn test_exec_runs_once_then_exits() {
        let (mut s, out, _) = session(&[]);
        let err = s.execute("exec echo bye").await.unwrap_err();
        assert!(matches!(err, ShellError::Exit(0)));
        assert_eq!(out.contents().as_deref(), Some("bye\n"));
    }

    #[tokio::test]
    async fn test_recursion_limit() {
        let (mut s, _, err) = session(&[]);
        s.depth = MAX_DEPTH;
        assert!(!s.run_line("true").await.unwrap());
        assert!(err.contents().unwrap().contains("nesting depth"));
    }
}
