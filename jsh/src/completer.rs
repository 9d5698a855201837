use jsh::History;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// Completes builtin names and previously dispatched commands
pub struct JshHelper {
    builtins: Vec<&'static str>,
    history: Arc<Mutex<History>>,
}

impl JshHelper {
    pub fn new(builtins: Vec<&'static str>, history: Arc<Mutex<History>>) -> Self {
        Self { builtins, history }
    }

    fn candidates(&self, word: &str) -> BTreeSet<String> {
        let mut found: BTreeSet<String> = self
            .builtins
            .iter()
            .filter(|name| name.starts_with(word))
            .map(|name| (*name).to_string())
            .collect();
        if let Ok(history) = self.history.lock() {
            found.extend(
                history
                    .iter()
                    .filter(|entry| entry.starts_with(word))
                    .map(str::to_string),
            );
        }
        found
    }
}

impl Completer for JshHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line_to_cursor = line.get(..pos).unwrap_or(line);
        let (start, word) = find_word_start(line_to_cursor);
        if word.is_empty() {
            return Ok((pos, vec![]));
        }

        let completions = self
            .candidates(word)
            .into_iter()
            .map(|name| Pair {
                display: name.clone(),
                replacement: name,
            })
            .collect();
        Ok((start, completions))
    }
}

fn find_word_start(line: &str) -> (usize, &str) {
    let mut start = line.len();
    for (i, c) in line.char_indices().rev() {
        if c.is_whitespace() || matches!(c, ';' | '&' | '>' | '<' | '`') {
            break;
        }
        start = i;
    }
    (start, &line[start..])
}

impl Hinter for JshHelper {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &Context<'_>) -> Option<String> {
        None
    }
}

impl Highlighter for JshHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Borrowed(hint)
    }
}

impl Validator for JshHelper {}

impl Helper for JshHelper {}
