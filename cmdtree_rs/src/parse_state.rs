//! Token cursor for one invocation.

use crate::error::ArgumentParseError;
use crate::tokenizer::{Token, Tokenizer};

/// Cursor over the tokens of a raw argument string.
///
/// The token list never changes after construction; only the cursor moves.
/// That makes [`ParseSnapshot`] a plain copy of the cursor, and restoring it
/// undoes every read made since the snapshot.
#[derive(Debug, Clone)]
pub struct ParseState {
    raw: String,
    tokens: Vec<Token>,
    index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseSnapshot {
    index: usize,
}

impl ParseSnapshot {
    pub fn cursor(&self) -> usize {
        self.index
    }
}

impl ParseState {
    pub fn new(raw: impl Into<String>, tokens: Vec<Token>) -> Self {
        Self {
            raw: raw.into(),
            tokens,
            index: 0,
        }
    }

    pub fn tokenize(tokenizer: &dyn Tokenizer, raw: &str) -> Result<Self, ArgumentParseError> {
        let tokens = tokenizer.tokenize(raw, false)?;
        Ok(Self::new(raw, tokens))
    }

    /// Like [`ParseState::tokenize`], but when the text is blank or ends in
    /// whitespace an empty token is appended: the word being completed.
    pub fn for_completion(tokenizer: &dyn Tokenizer, raw: &str) -> Result<Self, ArgumentParseError> {
        let mut tokens = tokenizer.tokenize(raw, false)?;
        if raw.trim().is_empty() || raw.ends_with(char::is_whitespace) {
            tokens.push(Token::new("", raw.len(), raw.len()));
        }
        Ok(Self::new(raw, tokens))
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn has_next(&self) -> bool {
        self.index < self.tokens.len()
    }

    /// Tokens not consumed yet.
    pub fn remaining(&self) -> usize {
        self.tokens.len().saturating_sub(self.index)
    }

    /// Index of the next token.
    pub fn cursor(&self) -> usize {
        self.index
    }

    pub fn peek(&self) -> Result<&str, ArgumentParseError> {
        self.tokens
            .get(self.index)
            .map(|token| token.value.as_str())
            .ok_or_else(|| self.error("Not enough arguments!"))
    }

    pub fn next(&mut self) -> Result<String, ArgumentParseError> {
        if !self.has_next() {
            return Err(self.error("Not enough arguments!"));
        }
        self.index += 1;
        Ok(self.tokens[self.index - 1].value.clone())
    }

    /// Consume the next token if there is one.
    pub fn next_if_present(&mut self) -> Option<String> {
        self.next().ok()
    }

    /// Byte offset of the next token, or the end of the input.
    pub fn position(&self) -> usize {
        self.tokens
            .get(self.index)
            .map_or(self.raw.len(), |token| token.start)
    }

    /// Byte offset of the most recently consumed token.
    pub fn previous_position(&self) -> usize {
        self.index
            .checked_sub(1)
            .and_then(|index| self.tokens.get(index))
            .map_or(0, |token| token.start)
    }

    /// Raw text from the next token onwards, quoting intact.
    pub fn raw_remaining(&self) -> &str {
        &self.raw[self.position()..]
    }

    /// Move the cursor past every token.
    pub fn skip_all(&mut self) {
        self.index = self.tokens.len();
    }

    /// Parse error at the next token.
    pub fn error(&self, message: impl Into<String>) -> ArgumentParseError {
        ArgumentParseError::new(message, self.raw.clone(), self.position())
    }

    /// Parse error at the token that was just consumed.
    pub fn error_at_previous(&self, message: impl Into<String>) -> ArgumentParseError {
        ArgumentParseError::new(message, self.raw.clone(), self.previous_position())
    }

    pub fn snapshot(&self) -> ParseSnapshot {
        ParseSnapshot { index: self.index }
    }

    pub fn restore(&mut self, snapshot: &ParseSnapshot) {
        self.index = snapshot.index.min(self.tokens.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::QuotedStrings;

    fn state(raw: &str) -> ParseState {
        ParseState::tokenize(&QuotedStrings, raw).expect("tokenize")
    }

    #[test]
    fn next_walks_tokens_and_fails_at_end() {
        let mut state = state("10 20");
        assert_eq!(state.next().expect("first"), "10");
        assert_eq!(state.next().expect("second"), "20");
        let error = state.next().expect_err("exhausted");
        assert_eq!(error.position(), 5);
    }

    #[test]
    fn restore_rewinds_cursor_after_later_reads() {
        let mut state = state("a b c");
        state.next().expect("a");
        let snapshot = state.snapshot();
        state.next().expect("b");
        state.next().expect("c");
        assert!(!state.has_next());

        state.restore(&snapshot);
        assert_eq!(state.cursor(), 1);
        assert_eq!(state.peek().expect("peek"), "b");
        assert_eq!(state.raw_remaining(), "b c");
    }

    #[test]
    fn completion_state_appends_empty_word() {
        let completion = ParseState::for_completion(&QuotedStrings, "tp 10 ").expect("tokenize");
        assert_eq!(completion.remaining(), 3);
        assert_eq!(completion.tokens()[2].value, "");

        let mid_word = ParseState::for_completion(&QuotedStrings, "tp 1").expect("tokenize");
        assert_eq!(mid_word.remaining(), 2);

        let blank = ParseState::for_completion(&QuotedStrings, "").expect("tokenize");
        assert_eq!(blank.remaining(), 1);
    }

    #[test]
    fn previous_position_points_at_consumed_token() {
        let mut state = state("x  abc");
        state.next().expect("x");
        state.next().expect("abc");
        assert_eq!(state.previous_position(), 3);
        assert_eq!(state.error_at_previous("bad").position(), 3);
    }

    #[test]
    fn raw_remaining_keeps_quotes() {
        let mut state = state(r#"set "my home""#);
        state.next().expect("set");
        assert_eq!(state.raw_remaining(), r#""my home""#);
        state.skip_all();
        assert_eq!(state.raw_remaining(), "");
    }
}
