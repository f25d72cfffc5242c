//! Error taxonomy for registration, routing, parsing and dispatch.
//!
//! Vibecrafted with AI Agents by VetCoders (c)2025 The Loctree Team
//!
//! Every failure a caller can observe is a [`CommandError`]. The variants
//! split into user-facing outcomes (unknown command, permission, parse
//! errors, executor failures) and the unclassified [`CommandError::Internal`]
//! bucket, which is always logged with full context and never shown verbatim
//! to an invoker without the debug permission.

use thiserror::Error;

/// Failure while turning tokens into argument values.
///
/// `position` is a byte offset into `input`, which is the raw argument text
/// the command saw (the command token itself is not included).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ArgumentParseError {
    message: String,
    input: String,
    position: usize,
    expected: Option<String>,
}

impl ArgumentParseError {
    pub fn new(message: impl Into<String>, input: impl Into<String>, position: usize) -> Self {
        let input = input.into();
        let mut position = position.min(input.len());
        while !input.is_char_boundary(position) {
            position -= 1;
        }
        Self {
            message: message.into(),
            input,
            position,
            expected: None,
        }
    }

    /// Attach a description of what the parser expected at `position`.
    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn expected(&self) -> Option<&str> {
        self.expected.as_deref()
    }

    /// The raw input with a `^` marker under the failing position.
    pub fn annotated_position(&self) -> String {
        let column = self
            .input
            .get(..self.position)
            .map_or(0, |prefix| prefix.chars().count());
        format!("{}\n{}^", self.input, " ".repeat(column))
    }
}

/// A subcommand failed and the local fallback failed too.
///
/// `local` is the fallback failure; `child` is the failure of the subcommand
/// that was tried first. The chain is exposed through `source()`, so
/// iterating sources walks from the fallback to the original child failure.
#[derive(Debug, Error)]
#[error("{local}")]
pub struct ChildCommandError {
    subcommand: String,
    local: CommandError,
    #[source]
    child: Option<CommandError>,
}

impl ChildCommandError {
    pub fn new(
        subcommand: impl Into<String>,
        local: CommandError,
        child: Option<CommandError>,
    ) -> Self {
        Self {
            subcommand: subcommand.into(),
            local,
            child,
        }
    }

    /// Alias of the subcommand that was attempted.
    pub fn subcommand(&self) -> &str {
        &self.subcommand
    }

    pub fn local(&self) -> &CommandError {
        &self.local
    }

    pub fn child(&self) -> Option<&CommandError> {
        self.child.as_ref()
    }
}

/// Everything that can go wrong between raw input and an executor result.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Registration produced no alias this owner could claim.
    #[error("none of the aliases [{}] could be registered for '{owner}'", .aliases.join(", "))]
    AliasConflict { owner: String, aliases: Vec<String> },

    /// No mapping is registered under the command token.
    #[error("unknown command '{command}'")]
    UnknownCommand {
        command: String,
        /// A registered alias close to `command`. Only a hint for the message.
        suggestion: Option<String>,
    },

    #[error("missing permission '{permission}'")]
    PermissionDenied { permission: String },

    #[error(transparent)]
    ArgumentParse(#[from] ArgumentParseError),

    #[error(transparent)]
    Child(Box<ChildCommandError>),

    /// A null value was supplied where a single argument value was required.
    #[error("null value supplied for argument '{key}'")]
    NullArgument { key: String },

    /// User-facing failure raised by an executor.
    #[error("{message}")]
    Failed { message: String },

    /// Dispatch was attempted while the alias registry was being reset.
    #[error("commands are unavailable while the registry is being reset")]
    Resetting,

    /// Unclassified failure (a programming error somewhere below the router).
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ChildCommandError> for CommandError {
    fn from(error: ChildCommandError) -> Self {
        CommandError::Child(Box::new(error))
    }
}

impl CommandError {
    /// User-facing executor failure.
    pub fn failed(message: impl Into<String>) -> Self {
        CommandError::Failed {
            message: message.into(),
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, CommandError::Internal(_))
    }

    /// True when this error, or any failure chained inside it, is unclassified.
    pub fn contains_internal(&self) -> bool {
        match self {
            CommandError::Internal(_) => true,
            CommandError::Child(child) => {
                child.local().contains_internal()
                    || child.child().is_some_and(CommandError::contains_internal)
            }
            _ => false,
        }
    }

    /// Message suitable for the invoking source.
    ///
    /// Internal details are only included when `reveal_internals` is set,
    /// which the router does for subjects holding the debug permission.
    pub fn user_message(&self, reveal_internals: bool) -> String {
        match self {
            CommandError::UnknownCommand {
                command,
                suggestion,
            } => match suggestion {
                Some(hint) => format!("Unknown command '{command}'. Did you mean '{hint}'?"),
                None => format!("Unknown command '{command}'."),
            },
            CommandError::PermissionDenied { .. } => {
                "You do not have permission to use this command.".to_string()
            }
            CommandError::ArgumentParse(error) => {
                let mut message = error.message().to_string();
                if let Some(expected) = error.expected() {
                    message.push_str(&format!(" (expected {expected})"));
                }
                message.push('\n');
                message.push_str(&error.annotated_position());
                message
            }
            CommandError::Child(error) => {
                let mut message = error.local().user_message(reveal_internals);
                if let Some(child) = error.child() {
                    message.push_str(&format!(
                        "\nSubcommand '{}' failed: {}",
                        error.subcommand(),
                        child.user_message(reveal_internals)
                    ));
                }
                message
            }
            CommandError::Internal(error) if reveal_internals => {
                format!("An internal error occurred: {error:#}")
            }
            CommandError::Internal(_) => {
                "An internal error occurred while attempting to perform this command.".to_string()
            }
            other => capitalize(&other.to_string()),
        }
    }
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Node construction failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("a command node needs an executor or at least one child")]
    NoExecutorOrChildren,

    #[error("child alias '{0}' is registered more than once")]
    DuplicateChildAlias(String),

    #[error("a child command needs at least one non-empty alias")]
    EmptyChildAlias,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn annotated_position_points_at_offset() {
        let error = ArgumentParseError::new("bad", "10 abc 30", 3);
        assert_eq!(error.annotated_position(), "10 abc 30\n   ^");
    }

    #[test]
    fn position_is_clamped_to_input() {
        let error = ArgumentParseError::new("bad", "ab", 99);
        assert_eq!(error.position(), 2);
    }

    #[test]
    fn position_inside_a_character_moves_to_its_start() {
        // 'K' (Kelvin sign) occupies bytes 2..5
        let error = ArgumentParseError::new("bad", "--\u{212A}=x", 4);
        assert_eq!(error.position(), 2);
        assert_eq!(error.annotated_position(), "--\u{212A}=x\n  ^");
    }

    #[test]
    fn child_error_chains_through_source() {
        let child = CommandError::PermissionDenied {
            permission: "cmd.home.set".into(),
        };
        let local = CommandError::failed("fallback broke");
        let error: CommandError = ChildCommandError::new("set", local, Some(child)).into();

        assert_eq!(error.to_string(), "fallback broke");
        let CommandError::Child(inner) = &error else {
            panic!("expected child error");
        };
        let source = inner.source().expect("child source");
        assert_eq!(source.to_string(), "missing permission 'cmd.home.set'");
    }

    #[test]
    fn internal_details_hidden_without_debug() {
        let error = CommandError::from(anyhow::anyhow!("index out of range"));
        assert!(!error.user_message(false).contains("index out of range"));
        assert!(error.user_message(true).contains("index out of range"));
    }

    #[test]
    fn nested_internal_is_detected() {
        let error: CommandError = ChildCommandError::new(
            "set",
            CommandError::failed("fallback"),
            Some(CommandError::from(anyhow::anyhow!("boom"))),
        )
        .into();
        assert!(error.contains_internal());
        assert!(!error.is_internal());
    }

    #[test]
    fn unknown_command_message_carries_hint() {
        let error = CommandError::UnknownCommand {
            command: "hme".into(),
            suggestion: Some("home".into()),
        };
        assert_eq!(
            error.user_message(false),
            "Unknown command 'hme'. Did you mean 'home'?"
        );
    }
}
