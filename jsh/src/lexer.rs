//! Lexer for jsh statements
//!
//! Splits one raw line into tokens. Quoted segments lose their quotes,
//! adjacent segments glue into one token, and every token remembers the
//! byte range it came from so a statement can be cut back into raw text.

use crate::error::{ShellError, ShellResult};
use chumsky::prelude::*;
use std::ops::Range;

/// Quoting of the first segment of a token
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quote {
    Bare,
    Single,
    Double,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub quote: Quote,
    /// Some segment was single-quoted; the token is never expanded
    pub verbatim: bool,
    /// Byte range in the raw line
    pub span: Range<usize>,
}

impl Token {
    pub fn bare(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quote: Quote::Bare,
            verbatim: false,
            span: 0..0,
        }
    }

    /// Operators only count when they were typed unquoted.
    pub fn is(&self, op: &str) -> bool {
        self.quote == Quote::Bare && self.text == op
    }

    pub fn is_quoted(&self) -> bool {
        self.quote != Quote::Bare
    }

    /// `$` forms inside the token may be expanded.
    pub fn expandable(&self) -> bool {
        !self.verbatim
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
        || matches!(
            c,
            '_' | '-'
                | '.'
                | '/'
                | '\\'
                | '~'
                | '*'
                | '?'
                | '='
                | '$'
                | ':'
                | '+'
                | ','
                | '@'
                | '%'
                | '^'
                | '!'
        )
}

/// Token parser over chars. Spans are char offsets.
pub fn lexer() -> impl Parser<char, Vec<(Quote, bool, String, Range<usize>)>, Error = Simple<char>> {
    let ws = filter(|c: &char| c.is_whitespace()).repeated();

    let bare_seg = filter(|c: &char| is_word_char(*c))
        .repeated()
        .at_least(1)
        .collect::<String>()
        .map(|s| (Quote::Bare, s));

    let sq_seg = just('\'')
        .ignore_then(filter(|c| *c != '\'').repeated())
        .then_ignore(just('\''))
        .collect::<String>()
        .map(|s| (Quote::Single, s));

    let dq_seg = just('"')
        .ignore_then(
            just('\\')
                .ignore_then(any())
                .map(|c: char| match c {
                    '"' | '\\' => c.to_string(),
                    _ => format!("\\{c}"),
                })
                .or(filter(|c: &char| *c != '"' && *c != '\\').map(|c: char| c.to_string()))
                .repeated(),
        )
        .then_ignore(just('"'))
        .map(|parts: Vec<String>| (Quote::Double, parts.concat()));

    let word = choice((bare_seg, sq_seg, dq_seg))
        .repeated()
        .at_least(1)
        .map(|segments: Vec<(Quote, String)>| {
            let quote = segments.first().map_or(Quote::Bare, |(q, _)| *q);
            let verbatim = segments.iter().any(|(q, _)| *q == Quote::Single);
            let text = segments.into_iter().map(|(_, s)| s).collect::<String>();
            (quote, verbatim, text)
        });

    // Multi-character operators must be tried before their single-char prefixes
    let multi_op = choice((just("&&"), just(">>"), just("<<")))
        .map(|op: &str| (Quote::Bare, false, op.to_string()));

    let single_op = filter(|c: &char| {
        !c.is_whitespace() && !is_word_char(*c) && *c != '\'' && *c != '"'
    })
    .map(|c: char| (Quote::Bare, false, c.to_string()));

    let token = choice((multi_op, word, single_op))
        .map_with_span(|(quote, verbatim, text), span: Range<usize>| {
            (quote, verbatim, text, span)
        });

    ws.clone()
        .ignore_then(token.then_ignore(ws).repeated())
        .then_ignore(end())
}

/// Lex a raw line into tokens with byte spans.
pub fn tokenize(line: &str) -> ShellResult<Vec<Token>> {
    let parsed = lexer().parse(line).map_err(|errors| {
        let message = errors.first().map_or_else(
            || "malformed input".to_string(),
            |e| match e.found() {
                Some(c) => format!("unexpected `{c}` at column {}", e.span().start + 1),
                None => "unterminated quote".to_string(),
            },
        );
        ShellError::Lex(message)
    })?;

    // chumsky reports char offsets; statements are cut on byte offsets
    let mut offsets: Vec<usize> = line.char_indices().map(|(i, _)| i).collect();
    offsets.push(line.len());
    let byte = |i: usize| offsets.get(i).copied().unwrap_or(line.len());

    Ok(parsed
        .into_iter()
        .map(|(quote, verbatim, text, span)| Token {
            text,
            quote,
            verbatim,
            span: byte(span.start)..byte(span.end),
        })
        .collect())
}

/// Texts of a token slice, for logging and rejoining.
pub fn texts(tokens: &[Token]) -> Vec<&str> {
    tokens.iter().map(|t| t.text.as_str()).collect()
}
