//! Flag definitions: `-f`, `--force`, `--radius 5`, `--radius=5`, `-abc`.
//!
//! Flags are parsed before positional parameters. Parsing stops at the first
//! token that is not a flag, at `--`, or at a negative number.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cause::Cause;
use crate::context::{ArgValue, ExecutionContext};
use crate::error::{ArgumentParseError, CommandError};
use crate::parameter::ValueParser;
use crate::parse_state::ParseState;
use crate::tokenizer::Token;

/// What to do with a flag nobody declared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownFlagBehavior {
    #[default]
    Error,
    /// Consume and forget it.
    Ignore,
    /// Record it as a boolean flag under its own name.
    AcceptNonValue,
}

#[derive(Clone)]
struct FlagSpec {
    names: Vec<String>,
    value: Option<Arc<dyn ValueParser>>,
    permission: Option<String>,
}

impl FlagSpec {
    /// Context key: the first declared name.
    fn key(&self) -> &str {
        &self.names[0]
    }

    fn forms(&self) -> impl Iterator<Item = String> + '_ {
        self.names.iter().map(|name| dashed(name))
    }
}

fn dashed(name: &str) -> String {
    if name.chars().count() == 1 {
        format!("-{name}")
    } else {
        format!("--{name}")
    }
}

fn is_negative_number(token: &str) -> bool {
    token
        .strip_prefix('-')
        .is_some_and(|rest| !rest.is_empty() && rest.parse::<f64>().is_ok())
}

fn looks_like_flag(token: &str) -> bool {
    token.starts_with('-') && token.len() > 1 && !is_negative_number(token)
}

#[derive(Clone, Default)]
pub struct Flags {
    specs: Vec<FlagSpec>,
    by_name: HashMap<String, usize>,
    unknown_short: UnknownFlagBehavior,
    unknown_long: UnknownFlagBehavior,
}

impl Flags {
    pub fn builder() -> FlagsBuilder {
        FlagsBuilder::default()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Consume leading flags from `state` into `ctx`.
    pub fn parse(
        &self,
        _cause: &Cause,
        state: &mut ParseState,
        ctx: &mut ExecutionContext,
    ) -> Result<(), CommandError> {
        while let Ok(token) = state.peek().map(str::to_owned) {
            if token == "--" {
                state.next()?;
                break;
            }
            if !looks_like_flag(&token) {
                break;
            }
            self.parse_one(state, ctx)?;
        }
        Ok(())
    }

    /// Parse the flag token under the cursor.
    fn parse_one(&self, state: &mut ParseState, ctx: &mut ExecutionContext) -> Result<(), CommandError> {
        let start = state.position();
        let end = state
            .tokens()
            .get(state.cursor())
            .map_or(start, |token| token.end);
        let token = state.next()?;

        if let Some(long) = token.strip_prefix("--") {
            let (name, inline) = match long.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (long, None),
            };
            let name = name.to_lowercase();
            let Some(spec) = self.lookup(&name) else {
                return self.unknown(&name, self.unknown_long, start, state, ctx);
            };
            self.check_permission(spec, ctx)?;
            let value = match (&spec.value, inline) {
                (None, None) => ArgValue::Bool(true),
                (None, Some(_)) => {
                    return Err(ArgumentParseError::new(
                        format!("Flag --{name} does not take a value"),
                        state.raw(),
                        start,
                    )
                    .into());
                }
                (Some(parser), Some(inline)) => {
                    // offset of the value as typed, past any quote or escape
                    let offset = state
                        .raw()
                        .get(start..end)
                        .and_then(|typed| typed.find('='))
                        .map_or(start, |equals| start + equals + 1);
                    let mut inline_state = ParseState::new(
                        state.raw(),
                        vec![Token::new(inline, offset, offset + inline.len())],
                    );
                    parse_flag_value(parser, &mut inline_state)?
                }
                (Some(parser), None) => parse_flag_value(parser, state)?,
            };
            return ctx.put_entry(spec.key().to_string(), value);
        }

        let cluster: Vec<char> = token[1..].chars().collect();
        for (index, short) in cluster.iter().enumerate() {
            let name = short.to_lowercase().to_string();
            let Some(spec) = self.lookup(&name) else {
                self.unknown(&name, self.unknown_short, start, state, ctx)?;
                continue;
            };
            self.check_permission(spec, ctx)?;
            let value = match &spec.value {
                None => ArgValue::Bool(true),
                Some(_) if index + 1 < cluster.len() => {
                    return Err(ArgumentParseError::new(
                        format!("Flag -{name} needs a value and must come last in '{token}'"),
                        state.raw(),
                        start,
                    )
                    .into());
                }
                Some(parser) => parse_flag_value(parser, state)?,
            };
            ctx.put_entry(spec.key().to_string(), value)?;
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<&FlagSpec> {
        self.by_name.get(name).map(|&index| &self.specs[index])
    }

    fn check_permission(&self, spec: &FlagSpec, ctx: &ExecutionContext) -> Result<(), CommandError> {
        match &spec.permission {
            Some(permission) => ctx.check_permission(permission),
            None => Ok(()),
        }
    }

    fn unknown(
        &self,
        name: &str,
        behavior: UnknownFlagBehavior,
        start: usize,
        state: &ParseState,
        ctx: &mut ExecutionContext,
    ) -> Result<(), CommandError> {
        match behavior {
            UnknownFlagBehavior::Error => Err(ArgumentParseError::new(
                format!("Unknown flag {}", dashed(name)),
                state.raw(),
                start,
            )
            .with_expected(self.usage())
            .into()),
            UnknownFlagBehavior::Ignore => Ok(()),
            UnknownFlagBehavior::AcceptNonValue => ctx.put_entry(name, true),
        }
    }

    /// Completion inside the flag section.
    ///
    /// Returns `Some` when the word under the cursor belongs to a flag (its
    /// name or its value) and `None` when completion should continue with
    /// the positional parameters.
    pub fn complete(
        &self,
        _cause: &Cause,
        state: &mut ParseState,
        ctx: &mut ExecutionContext,
    ) -> Option<Vec<String>> {
        loop {
            let token = state.peek().ok()?.to_string();
            if state.remaining() == 1 {
                if !token.starts_with('-') || is_negative_number(&token) {
                    return None;
                }
                let prefix = token.to_lowercase();
                let mut candidates: Vec<String> = self
                    .specs
                    .iter()
                    .filter(|spec| spec.permission.as_deref().is_none_or(|p| ctx.has_permission(p)))
                    .flat_map(FlagSpec::forms)
                    .filter(|form| form.starts_with(&prefix))
                    .collect();
                candidates.sort();
                return Some(candidates);
            }
            if token == "--" || !looks_like_flag(&token) {
                return None;
            }
            if state.remaining() == 2
                && let Some(parser) = self.value_parser_expected_after(&token)
            {
                state.next().ok()?;
                let prefix = state.peek().unwrap_or("").to_lowercase();
                return Some(
                    parser
                        .candidates()
                        .into_iter()
                        .filter(|candidate| candidate.to_lowercase().starts_with(&prefix))
                        .collect(),
                );
            }
            let snapshot = state.snapshot();
            if self.parse_one(state, ctx).is_err() {
                state.restore(&snapshot);
                return None;
            }
        }
    }

    /// The value parser a flag token will read its value from the *next*
    /// token with, if any.
    fn value_parser_expected_after(&self, token: &str) -> Option<&Arc<dyn ValueParser>> {
        let name = match token.strip_prefix("--") {
            Some(long) if !long.contains('=') => long.to_lowercase(),
            Some(_) => return None,
            None => token[1..].chars().last()?.to_lowercase().to_string(),
        };
        self.lookup(&name)?.value.as_ref()
    }

    pub fn usage(&self) -> String {
        self.specs
            .iter()
            .map(|spec| {
                let forms: Vec<String> = spec.forms().collect();
                match &spec.value {
                    Some(parser) => format!("[{} <{}>]", forms.join("|"), parser.expected()),
                    None => format!("[{}]", forms.join("|")),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn parse_flag_value(
    parser: &Arc<dyn ValueParser>,
    state: &mut ParseState,
) -> Result<ArgValue, ArgumentParseError> {
    parser.parse_value(state).map_err(|error| {
        if error.expected().is_some() {
            error
        } else {
            error.with_expected(parser.expected())
        }
    })
}

#[derive(Default)]
pub struct FlagsBuilder {
    flags: Flags,
}

impl FlagsBuilder {
    /// A boolean flag. The first name is the context key.
    pub fn flag<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.push(names, None, None)
    }

    /// A flag that reads one value with `parser`.
    pub fn value_flag<I, S>(self, parser: impl ValueParser + 'static, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.push(names, Some(Arc::new(parser)), None)
    }

    /// A boolean flag only subjects holding `permission` may pass.
    pub fn permission_flag<I, S>(self, permission: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.push(names, None, Some(permission.into()))
    }

    pub fn on_unknown_short(mut self, behavior: UnknownFlagBehavior) -> Self {
        self.flags.unknown_short = behavior;
        self
    }

    pub fn on_unknown_long(mut self, behavior: UnknownFlagBehavior) -> Self {
        self.flags.unknown_long = behavior;
        self
    }

    fn push<I, S>(
        mut self,
        names: I,
        value: Option<Arc<dyn ValueParser>>,
        permission: Option<String>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|name| name.as_ref().trim_start_matches('-').to_lowercase())
            .filter(|name| !name.is_empty())
            .collect();
        if names.is_empty() {
            return self;
        }
        let index = self.flags.specs.len();
        for name in &names {
            self.flags.by_name.entry(name.clone()).or_insert(index);
        }
        self.flags.specs.push(FlagSpec {
            names,
            value,
            permission,
        });
        self
    }

    pub fn build(self) -> Flags {
        self.flags
    }
}
