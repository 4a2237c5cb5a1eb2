//! Tokenizer: a rewindable cursor over raw command text.
//!
//! `StringView` splits on runs of whitespace outside quotes. A token
//! beginning with `"` runs until the next unescaped `"`; inside a quoted
//! token `\"` is a literal quote and `\\` a literal backslash. The view
//! also exposes the raw remainder (everything after the cursor) for
//! rest-consuming parameters, and checkpoint/rewind so Optional
//! parameters can back off exactly one token.
use crate::errors::CommandError;

pub const QUOTE: char = '"';

/// One lexeme plus how it was delimited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub was_quoted: bool,
}

#[derive(Debug, Clone)]
pub struct StringView {
    buffer: Vec<char>,
    index: usize,
}

impl StringView {
    pub fn new(raw: &str) -> Self {
        Self { buffer: raw.chars().collect(), index: 0 }
    }

    pub fn eof(&self) -> bool {
        self.index >= self.buffer.len()
    }

    /// Opaque position usable with `rewind`.
    pub fn checkpoint(&self) -> usize {
        self.index
    }

    pub fn rewind(&mut self, checkpoint: usize) {
        self.index = checkpoint.min(self.buffer.len());
    }

    /// Everything after the cursor, verbatim. Does not advance.
    pub fn remainder(&self) -> String {
        self.buffer[self.index..].iter().collect()
    }

    /// Consume and return everything after the cursor, verbatim.
    pub fn read_rest(&mut self) -> String {
        let rest = self.remainder();
        self.index = self.buffer.len();
        rest
    }

    pub fn skip_ws(&mut self) {
        while let Some(c) = self.buffer.get(self.index) {
            if !c.is_whitespace() {
                break;
            }
            self.index += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.buffer.get(self.index).copied()
    }

    /// Next token, or `None` at end of input. Skips leading whitespace.
    pub fn get_quoted_word(&mut self) -> Result<Option<Token>, CommandError> {
        self.skip_ws();
        let Some(first) = self.peek() else {
            return Ok(None);
        };

        if first == QUOTE {
            let open = self.index;
            self.index += 1;
            let mut text = String::new();
            loop {
                match self.peek() {
                    None => {
                        let fragment: String =
                            self.buffer[open..].iter().take(32).collect();
                        self.index = open;
                        return Err(CommandError::UnexpectedQuote { fragment });
                    }
                    Some('\\')
                        if matches!(
                            self.buffer.get(self.index + 1),
                            Some(&QUOTE) | Some(&'\\')
                        ) =>
                    {
                        text.push(self.buffer[self.index + 1]);
                        self.index += 2;
                    }
                    Some(c) if c == QUOTE => {
                        self.index += 1;
                        return Ok(Some(Token { text, was_quoted: true }));
                    }
                    Some(c) => {
                        text.push(c);
                        self.index += 1;
                    }
                }
            }
        }

        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                break;
            }
            text.push(c);
            self.index += 1;
        }
        Ok(Some(Token { text, was_quoted: false }))
    }

    /// Tokenize the whole view. Leaves the cursor at end of input.
    pub fn collect_words(&mut self) -> Result<Vec<Token>, CommandError> {
        let mut out = Vec::new();
        while let Some(token) = self.get_quoted_word()? {
            out.push(token);
        }
        Ok(out)
    }
}

/// Quote `raw` so it tokenizes back to a single token equal to `raw`.
/// Leaves simple words untouched.
pub fn quote(raw: &str) -> String {
    let needs_quoting =
        raw.is_empty() || raw.contains(char::is_whitespace) || raw.contains(QUOTE);
    if !needs_quoting {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len() + 2);
    out.push(QUOTE);
    for c in raw.chars() {
        if c == QUOTE || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push(QUOTE);
    out
}
