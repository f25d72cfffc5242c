//! Splitting raw argument text into tokens.
//!
//! Tokens keep byte offsets into the raw text so parse errors can point at
//! the exact spot that failed.

use crate::error::ArgumentParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    /// Byte offset of the first character (quotes included).
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
}

impl Token {
    pub fn new(value: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            value: value.into(),
            start,
            end,
        }
    }
}

pub trait Tokenizer {
    fn tokenize(&self, text: &str, preserve_quotes: bool) -> Result<Vec<Token>, ArgumentParseError>;
}

/// Whitespace separated tokens with `'`/`"` quoting and backslash escapes.
///
/// Quotes only open at the start of a token. An unterminated quote is a
/// parse error pointing at the opening quote.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotedStrings;

impl Tokenizer for QuotedStrings {
    fn tokenize(&self, text: &str, preserve_quotes: bool) -> Result<Vec<Token>, ArgumentParseError> {
        let mut tokens = Vec::new();
        let mut chars = text.char_indices().peekable();

        while let Some(&(start, first)) = chars.peek() {
            if first.is_whitespace() {
                chars.next();
                continue;
            }

            let mut value = String::new();
            if first == '"' || first == '\'' {
                chars.next();
                if preserve_quotes {
                    value.push(first);
                }
                let mut closed = false;
                while let Some((_, ch)) = chars.next() {
                    if ch == '\\' {
                        match chars.next() {
                            Some((_, escaped)) => {
                                if preserve_quotes {
                                    value.push('\\');
                                }
                                value.push(escaped);
                            }
                            None => value.push('\\'),
                        }
                        continue;
                    }
                    if ch == first {
                        closed = true;
                        if preserve_quotes {
                            value.push(ch);
                        }
                        break;
                    }
                    value.push(ch);
                }
                if !closed {
                    return Err(ArgumentParseError::new("Unterminated quoted string", text, start)
                        .with_expected(format!("closing {first}")));
                }
            }

            while let Some(&(_, ch)) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                chars.next();
                if ch == '\\' {
                    match chars.next() {
                        Some((_, escaped)) => value.push(escaped),
                        None => value.push('\\'),
                    }
                    continue;
                }
                value.push(ch);
            }

            let end = chars.peek().map_or(text.len(), |&(index, _)| index);
            tokens.push(Token::new(value, start, end));
        }

        Ok(tokens)
    }
}

/// Plain whitespace splitting, no quoting.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpaceSplit;

impl Tokenizer for SpaceSplit {
    fn tokenize(&self, text: &str, _preserve_quotes: bool) -> Result<Vec<Token>, ArgumentParseError> {
        let mut tokens = Vec::new();
        let mut start: Option<usize> = None;
        for (index, ch) in text.char_indices() {
            match (ch.is_whitespace(), start) {
                (true, Some(begin)) => {
                    tokens.push(Token::new(&text[begin..index], begin, index));
                    start = None;
                }
                (false, None) => start = Some(index),
                _ => {}
            }
        }
        if let Some(begin) = start {
            tokens.push(Token::new(&text[begin..], begin, text.len()));
        }
        Ok(tokens)
    }
}

/// The whole text as a single token. Blank text yields no tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawInput;

impl Tokenizer for RawInput {
    fn tokenize(&self, text: &str, _preserve_quotes: bool) -> Result<Vec<Token>, ArgumentParseError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Token::new(text, 0, text.len())])
    }
}
