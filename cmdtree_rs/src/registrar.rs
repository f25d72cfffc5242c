//! Backing implementations behind registered aliases.
//!
//! The router never looks inside a mapping's command; it hands the call to
//! the mapping's [`Registrar`]. Node trees and raw callables are the two
//! kinds shipped here, and both can sit behind the same registry.

use std::sync::Arc;

use crate::cause::{Cause, Location};
use crate::error::CommandError;
use crate::node::{CommandCallable, CommandNode};
use crate::registry::Mapping;
use crate::result::CommandResult;

pub trait Registrar {
    /// Short tag used in diagnostics, e.g. `"managed"`.
    fn kind(&self) -> &'static str;

    fn process(
        &self,
        cause: &Cause,
        mapping: &Mapping,
        command: &str,
        arguments: &str,
    ) -> Result<CommandResult, CommandError>;

    fn suggestions(
        &self,
        cause: &Cause,
        mapping: &Mapping,
        command: &str,
        arguments: &str,
        target: Option<&Location>,
    ) -> Result<Vec<String>, CommandError>;

    fn can_execute(&self, _cause: &Cause) -> bool {
        true
    }

    fn short_description(&self, _cause: &Cause) -> Option<String> {
        None
    }

    fn usage(&self, _cause: &Cause) -> String {
        String::new()
    }
}

/// Serves a mapping from a [`CommandNode`] tree.
#[derive(Debug, Clone)]
pub struct NodeRegistrar {
    root: Arc<CommandNode>,
}

impl NodeRegistrar {
    pub fn new(root: CommandNode) -> Self {
        Self {
            root: Arc::new(root),
        }
    }

    pub fn root(&self) -> &CommandNode {
        &self.root
    }
}

impl Registrar for NodeRegistrar {
    fn kind(&self) -> &'static str {
        "managed"
    }

    fn process(
        &self,
        cause: &Cause,
        _mapping: &Mapping,
        _command: &str,
        arguments: &str,
    ) -> Result<CommandResult, CommandError> {
        self.root.process(cause, arguments)
    }

    fn suggestions(
        &self,
        cause: &Cause,
        _mapping: &Mapping,
        _command: &str,
        arguments: &str,
        target: Option<&Location>,
    ) -> Result<Vec<String>, CommandError> {
        self.root.suggestions(cause, arguments, target)
    }

    fn can_execute(&self, cause: &Cause) -> bool {
        self.root.can_execute(cause)
    }

    fn short_description(&self, cause: &Cause) -> Option<String> {
        self.root.short_description(cause)
    }

    fn usage(&self, cause: &Cause) -> String {
        self.root.usage(cause)
    }
}

/// Serves a mapping from any [`CommandCallable`].
pub struct CallableRegistrar {
    callable: Arc<dyn CommandCallable>,
}

impl CallableRegistrar {
    pub fn new(callable: Arc<dyn CommandCallable>) -> Self {
        Self { callable }
    }
}

impl Registrar for CallableRegistrar {
    fn kind(&self) -> &'static str {
        "callable"
    }

    fn process(
        &self,
        cause: &Cause,
        mapping: &Mapping,
        _command: &str,
        arguments: &str,
    ) -> Result<CommandResult, CommandError> {
        // callables carry no permission string of their own
        if !self.callable.test_permission(cause) {
            return Err(CommandError::PermissionDenied {
                permission: mapping.primary_alias().to_string(),
            });
        }
        self.callable.process(cause, arguments)
    }

    fn suggestions(
        &self,
        cause: &Cause,
        _mapping: &Mapping,
        _command: &str,
        arguments: &str,
        target: Option<&Location>,
    ) -> Result<Vec<String>, CommandError> {
        if !self.callable.test_permission(cause) {
            return Ok(Vec::new());
        }
        self.callable.suggestions(cause, arguments, target)
    }

    fn can_execute(&self, cause: &Cause) -> bool {
        self.callable.test_permission(cause)
    }

    fn usage(&self, cause: &Cause) -> String {
        self.callable.usage(cause)
    }
}
