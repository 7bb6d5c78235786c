// src/core/tokenizer.rs

use crate::models::{Token, TokenKind};

/// A lazy, forward-only scanner over a raw command string.
///
/// # Rules:
/// - Whitespace outside quotes separates tokens and is discarded.
/// - A token opening with `"` is a single `Value` running to the closing quote,
///   or to the end of input when the quote is never closed. The closing quote
///   always ends the token, so `"a"b` scans as `a` then `b`.
/// - `--name[=value]` is a `LongName`, `-n[=value]` is a `ShortName`.
/// - A bare `-` or `--`, and everything else, is a `Value`.
///
/// The scanner cannot be rewound; create a new one for every input.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    position: usize,
}

impl<'a> Tokenizer<'a> {
    /// Starts scanning `input` from its first byte.
    pub fn new(input: &'a str) -> Self {
        Self { input, position: 0 }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.input.get(self.position..)?;
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            self.position = self.input.len();
            return None;
        }
        let start = self.input.len() - trimmed.len();

        if let Some(body) = trimmed.strip_prefix('"') {
            return match body.find('"') {
                Some(end) => {
                    // Opening quote + content + closing quote.
                    self.position = start + end + 2;
                    body.get(..end).map(Token::value)
                }
                None => {
                    self.position = self.input.len();
                    Some(Token::value(body))
                }
            };
        }

        let len = word_length(trimmed);
        self.position = start + len;
        trimmed.get(..len).map(classify)
    }
}

/// Tokenizes the whole input eagerly.
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    Tokenizer::new(input).collect()
}

/// Byte length of the unquoted word at the start of `text`. Whitespace inside
/// an embedded quoted run (e.g. `--name="a b"`) does not end the word.
fn word_length(text: &str) -> usize {
    let mut in_quotes = false;
    for (i, c) in text.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => return i,
            _ => {}
        }
    }
    text.len()
}

fn classify(word: &str) -> Token<'_> {
    if word == "-" || word == "--" {
        return Token::value(word);
    }

    let (kind, body) = if let Some(body) = word.strip_prefix("--") {
        (TokenKind::LongName, body)
    } else if let Some(body) = word.strip_prefix('-') {
        (TokenKind::ShortName, body)
    } else {
        return Token::value(word);
    };

    match body.split_once('=') {
        Some((name, value)) => Token {
            kind,
            text: name,
            inline_value: Some(unquote(value)),
        },
        None => Token {
            kind,
            text: body,
            inline_value: None,
        },
    }
}

fn unquote(value: &str) -> &str {
    match value.strip_prefix('"') {
        Some(inner) => inner.strip_suffix('"').unwrap_or(inner),
        None => value,
    }
}
