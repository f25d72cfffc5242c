//! Positional parameters and the built-in value parsers.
//!
//! A [`Parameter`] consumes zero or more tokens and records what it parsed
//! in the [`ExecutionContext`]. The catalog here covers the common shapes;
//! hosts plug in their own parsers through [`ValueParser`] or implement
//! [`Parameter`] directly.

use std::sync::Arc;

use crate::cause::Cause;
use crate::context::{ArgValue, ExecutionContext};
use crate::error::{ArgumentParseError, CommandError};
use crate::parse_state::ParseState;

pub trait Parameter {
    /// Context key the parameter writes to, if it writes at all.
    fn key(&self) -> Option<&str>;

    fn parse(
        &self,
        cause: &Cause,
        state: &mut ParseState,
        ctx: &mut ExecutionContext,
    ) -> Result<(), CommandError>;

    /// Candidates for the token under the cursor. Never fails.
    fn complete(&self, cause: &Cause, state: &mut ParseState, ctx: &ExecutionContext)
    -> Vec<String>;

    fn usage(&self) -> String;
}

/// Turns tokens into a single value.
pub trait ValueParser {
    fn parse_value(&self, state: &mut ParseState) -> Result<ArgValue, ArgumentParseError>;

    /// Human description used as the "expected" part of parse errors.
    fn expected(&self) -> String;

    fn candidates(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A keyed parameter backed by a [`ValueParser`].
#[derive(Clone)]
pub struct ValueParameter {
    key: String,
    parser: Arc<dyn ValueParser>,
}

impl ValueParameter {
    pub fn new(key: impl Into<String>, parser: impl ValueParser + 'static) -> Self {
        Self {
            key: key.into(),
            parser: Arc::new(parser),
        }
    }

    pub fn parser(&self) -> &Arc<dyn ValueParser> {
        &self.parser
    }
}

impl Parameter for ValueParameter {
    fn key(&self) -> Option<&str> {
        Some(&self.key)
    }

    fn parse(
        &self,
        _cause: &Cause,
        state: &mut ParseState,
        ctx: &mut ExecutionContext,
    ) -> Result<(), CommandError> {
        let value = self.parser.parse_value(state).map_err(|error| {
            if error.expected().is_some() {
                error
            } else {
                error.with_expected(self.parser.expected())
            }
        })?;
        ctx.put_entry(self.key.as_str(), value)
    }

    fn complete(
        &self,
        _cause: &Cause,
        state: &mut ParseState,
        _ctx: &ExecutionContext,
    ) -> Vec<String> {
        let prefix = state.peek().unwrap_or("").to_lowercase();
        self.parser
            .candidates()
            .into_iter()
            .filter(|candidate| candidate.to_lowercase().starts_with(&prefix))
            .collect()
    }

    fn usage(&self) -> String {
        format!("<{}>", self.key)
    }
}

/// Makes a parameter optional.
///
/// Strong: skipped only when no tokens are left; a present but invalid
/// token still fails. Weak: any parse failure is rolled back and the
/// parameter is skipped, leaving the tokens for the next parameter.
pub struct Optional {
    inner: Box<dyn Parameter>,
    weak: bool,
}

impl Parameter for Optional {
    fn key(&self) -> Option<&str> {
        self.inner.key()
    }

    fn parse(
        &self,
        cause: &Cause,
        state: &mut ParseState,
        ctx: &mut ExecutionContext,
    ) -> Result<(), CommandError> {
        if !state.has_next() {
            return Ok(());
        }
        if !self.weak {
            return self.inner.parse(cause, state, ctx);
        }
        let parse_snapshot = state.snapshot();
        let context_snapshot = ctx.snapshot();
        if self.inner.parse(cause, state, ctx).is_err() {
            state.restore(&parse_snapshot);
            ctx.restore(&context_snapshot);
        }
        Ok(())
    }

    fn complete(
        &self,
        cause: &Cause,
        state: &mut ParseState,
        ctx: &ExecutionContext,
    ) -> Vec<String> {
        self.inner.complete(cause, state, ctx)
    }

    fn usage(&self) -> String {
        format!("[{}]", self.inner.usage())
    }
}

pub fn optional(parameter: impl Parameter + 'static) -> Optional {
    Optional {
        inner: Box::new(parameter),
        weak: false,
    }
}

pub fn optional_weak(parameter: impl Parameter + 'static) -> Optional {
    Optional {
        inner: Box::new(parameter),
        weak: true,
    }
}

pub fn string(key: impl Into<String>) -> ValueParameter {
    ValueParameter::new(key, StringParser)
}

pub fn integer(key: impl Into<String>) -> ValueParameter {
    ValueParameter::new(key, IntegerParser)
}

pub fn double(key: impl Into<String>) -> ValueParameter {
    ValueParameter::new(key, DoubleParser)
}

pub fn boolean(key: impl Into<String>) -> ValueParameter {
    ValueParameter::new(key, BooleanParser)
}

/// One of a fixed set of words, matched case-insensitively.
pub fn choices<I, S>(key: impl Into<String>, choices: I) -> ValueParameter
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ValueParameter::new(
        key,
        ChoicesParser {
            choices: choices.into_iter().map(Into::into).collect(),
        },
    )
}

/// Everything left on the line, as typed.
pub fn remaining_joined(key: impl Into<String>) -> ValueParameter {
    ValueParameter::new(key, RemainingJoinedParser)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StringParser;

impl ValueParser for StringParser {
    fn parse_value(&self, state: &mut ParseState) -> Result<ArgValue, ArgumentParseError> {
        state.next().map(ArgValue::Str)
    }

    fn expected(&self) -> String {
        "a string".to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerParser;

impl ValueParser for IntegerParser {
    fn parse_value(&self, state: &mut ParseState) -> Result<ArgValue, ArgumentParseError> {
        let token = state.next()?;
        token.parse::<i64>().map(ArgValue::Int).map_err(|_| {
            state
                .error_at_previous(format!("Expected an integer, but input '{token}' was not"))
                .with_expected(self.expected())
        })
    }

    fn expected(&self) -> String {
        "an integer".to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleParser;

impl ValueParser for DoubleParser {
    fn parse_value(&self, state: &mut ParseState) -> Result<ArgValue, ArgumentParseError> {
        let token = state.next()?;
        match token.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(ArgValue::Float(value)),
            _ => Err(state
                .error_at_previous(format!("Expected a number, but input '{token}' was not"))
                .with_expected(self.expected())),
        }
    }

    fn expected(&self) -> String {
        "a number".to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanParser;

impl ValueParser for BooleanParser {
    fn parse_value(&self, state: &mut ParseState) -> Result<ArgValue, ArgumentParseError> {
        let token = state.next()?;
        match token.to_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "on" => Ok(ArgValue::Bool(true)),
            "false" | "f" | "no" | "n" | "off" => Ok(ArgValue::Bool(false)),
            _ => Err(state
                .error_at_previous(format!("Invalid boolean '{token}'"))
                .with_expected(self.expected())),
        }
    }

    fn expected(&self) -> String {
        "true or false".to_string()
    }

    fn candidates(&self) -> Vec<String> {
        vec!["true".to_string(), "false".to_string()]
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChoicesParser {
    choices: Vec<String>,
}

impl ValueParser for ChoicesParser {
    fn parse_value(&self, state: &mut ParseState) -> Result<ArgValue, ArgumentParseError> {
        let token = state.next()?;
        self.choices
            .iter()
            .find(|choice| choice.eq_ignore_ascii_case(&token))
            .map(|choice| ArgValue::Str(choice.clone()))
            .ok_or_else(|| {
                state
                    .error_at_previous(format!("'{token}' is not a valid choice"))
                    .with_expected(self.expected())
            })
    }

    fn expected(&self) -> String {
        format!("one of: {}", self.choices.join(", "))
    }

    fn candidates(&self) -> Vec<String> {
        self.choices.clone()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RemainingJoinedParser;

impl ValueParser for RemainingJoinedParser {
    fn parse_value(&self, state: &mut ParseState) -> Result<ArgValue, ArgumentParseError> {
        if !state.has_next() {
            return Err(state.error("Not enough arguments!"));
        }
        let joined = state.raw_remaining().trim_end().to_string();
        state.skip_all();
        Ok(ArgValue::Str(joined))
    }

    fn expected(&self) -> String {
        "some text".to_string()
    }
}
