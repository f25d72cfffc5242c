//! Managed command nodes and the recursive dispatch algorithm.
//!
//! Vibecrafted with AI Agents by VetCoders (c)2025 The Loctree Team
//!
//! # Dispatch
//!
//! ```text
//! process(cause, raw)
//!   │ tokenize, fresh ExecutionContext
//!   ▼
//! dispatch ──► permission (if gating children) ──► child attempt
//!                                                   │ snapshot
//!                                                   │ next token → child alias?
//!                                                   │   yes + gate ok → child.dispatch / callable.process
//!                                                   │     ok   → return child result
//!                                                   │     err  → policy: store | rethrow
//!                                                   │ restore snapshot
//!                                                   ▼
//!          permission (if not checked yet) ──► flags + parameters ──► executor
//! ```
//!
//! A matching child always wins over the local executor; the executor is a
//! fallback. When both the child and the fallback fail, the caller gets a
//! [`ChildCommandError`] holding both, local first.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error};

use crate::cause::{Cause, Location};
use crate::context::ExecutionContext;
use crate::diagnostics::error_chain;
use crate::error::{BuildError, ChildCommandError, CommandError};
use crate::flags::Flags;
use crate::parameter::Parameter;
use crate::parse_state::ParseState;
use crate::result::CommandResult;
use crate::tokenizer::{QuotedStrings, Tokenizer};

pub type Executor = Arc<dyn Fn(&Cause, &ExecutionContext) -> Result<CommandResult, CommandError>>;

pub type DescriptionProvider = Arc<dyn Fn(&Cause) -> Option<String>>;

/// A command implemented outside the node tree.
///
/// Gets the remaining raw text instead of a shared parse state.
pub trait CommandCallable {
    fn process(&self, cause: &Cause, arguments: &str) -> Result<CommandResult, CommandError>;

    fn suggestions(
        &self,
        cause: &Cause,
        arguments: &str,
        target: Option<&Location>,
    ) -> Result<Vec<String>, CommandError>;

    fn test_permission(&self, _cause: &Cause) -> bool {
        true
    }

    fn usage(&self, _cause: &Cause) -> String {
        String::new()
    }
}

#[derive(Clone)]
pub enum ChildCommand {
    Node(Arc<CommandNode>),
    Callable(Arc<dyn CommandCallable>),
}

impl ChildCommand {
    fn permits(&self, cause: &Cause, ctx: &ExecutionContext) -> bool {
        match self {
            ChildCommand::Node(node) => node.permits(ctx),
            ChildCommand::Callable(callable) => callable.test_permission(cause),
        }
    }

    fn permission(&self) -> Option<&str> {
        match self {
            ChildCommand::Node(node) => node.permission(),
            ChildCommand::Callable(_) => None,
        }
    }
}

/// What a node does with a failed child attempt.
#[derive(Clone, Default)]
pub enum ExceptionPolicy {
    /// Keep the failure pending and try the local fallback.
    #[default]
    Suppress,
    /// Abort the whole call with the child's failure.
    Rethrow,
    /// Transform the failure, then decide.
    Custom(Arc<dyn Fn(CommandError) -> ChildFailure>),
}

impl ExceptionPolicy {
    pub fn custom(transform: impl Fn(CommandError) -> ChildFailure + 'static) -> Self {
        ExceptionPolicy::Custom(Arc::new(transform))
    }

    fn classify(&self, failure: CommandError) -> ChildFailure {
        match self {
            ExceptionPolicy::Suppress => ChildFailure::Store(failure),
            ExceptionPolicy::Rethrow => ChildFailure::Rethrow(failure),
            ExceptionPolicy::Custom(transform) => transform(failure),
        }
    }
}

impl fmt::Debug for ExceptionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExceptionPolicy::Suppress => write!(f, "Suppress"),
            ExceptionPolicy::Rethrow => write!(f, "Rethrow"),
            ExceptionPolicy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Decision of an [`ExceptionPolicy`] for one child failure.
#[derive(Debug)]
pub enum ChildFailure {
    Store(CommandError),
    Rethrow(CommandError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub has_children: bool,
    pub has_executor: bool,
    pub has_permission: bool,
}

/// Outcome of the speculative child step.
enum ChildAttempt {
    NoMatch,
    Handled(CommandResult),
    Failed { subcommand: String, error: CommandError },
}

/// One immutable node of a command tree.
///
/// Build with [`CommandNode::builder`]; derive variants with
/// [`CommandNode::to_builder`]. A node without children always has an
/// executor.
#[derive(Clone)]
pub struct CommandNode {
    parameters: Vec<Arc<dyn Parameter>>,
    flags: Option<Arc<Flags>>,
    children: BTreeMap<String, ChildCommand>,
    permission: Option<String>,
    permission_gates_children: bool,
    exception_policy: ExceptionPolicy,
    executor: Option<Executor>,
    short_description: Option<DescriptionProvider>,
    extended_description: Option<DescriptionProvider>,
    tokenizer: Arc<dyn Tokenizer>,
}

impl CommandNode {
    pub fn builder() -> CommandNodeBuilder {
        CommandNodeBuilder::default()
    }

    /// A builder pre-filled with this node's configuration.
    pub fn to_builder(&self) -> CommandNodeBuilder {
        CommandNodeBuilder {
            parameters: self.parameters.clone(),
            flags: self.flags.clone(),
            children: self
                .children
                .iter()
                .map(|(alias, child)| (alias.clone(), child.clone()))
                .collect(),
            permission: self.permission.clone(),
            permission_gates_children: self.permission_gates_children,
            exception_policy: self.exception_policy.clone(),
            executor: self.executor.clone(),
            short_description: self.short_description.clone(),
            extended_description: self.extended_description.clone(),
            tokenizer: Some(Arc::clone(&self.tokenizer)),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            has_children: !self.children.is_empty(),
            has_executor: self.executor.is_some(),
            has_permission: self.permission.is_some(),
        }
    }

    pub fn permission(&self) -> Option<&str> {
        self.permission.as_deref()
    }

    pub fn exception_policy(&self) -> &ExceptionPolicy {
        &self.exception_policy
    }

    pub fn child(&self, alias: &str) -> Option<&ChildCommand> {
        self.children.get(&alias.to_lowercase())
    }

    pub fn child_aliases(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    pub fn parameters(&self) -> &[Arc<dyn Parameter>] {
        &self.parameters
    }

    pub fn short_description(&self, cause: &Cause) -> Option<String> {
        self.short_description.as_ref().and_then(|provider| provider(cause))
    }

    pub fn extended_description(&self, cause: &Cause) -> Option<String> {
        self.extended_description.as_ref().and_then(|provider| provider(cause))
    }

    /// Whether `cause` passes this node's permission gate.
    pub fn can_execute(&self, cause: &Cause) -> bool {
        self.permission
            .as_deref()
            .is_none_or(|permission| cause.has_permission(permission))
    }

    fn permits(&self, ctx: &ExecutionContext) -> bool {
        self.permission
            .as_deref()
            .is_none_or(|permission| ctx.has_permission(permission))
    }

    fn check_permission(&self, ctx: &ExecutionContext) -> Result<(), CommandError> {
        match self.permission.as_deref() {
            Some(permission) => ctx.check_permission(permission),
            None => Ok(()),
        }
    }

    /// Tokenize `arguments` and dispatch against a fresh context.
    pub fn process(&self, cause: &Cause, arguments: &str) -> Result<CommandResult, CommandError> {
        let mut state = ParseState::tokenize(self.tokenizer.as_ref(), arguments)?;
        let mut ctx = ExecutionContext::new(cause);
        self.dispatch(cause, &mut state, &mut ctx)
    }

    /// Run this node against an existing parse state and context.
    ///
    /// Child nodes are dispatched through here with the parent's state, so
    /// the whole tree shares one context per top-level call.
    pub fn dispatch(
        &self,
        cause: &Cause,
        state: &mut ParseState,
        ctx: &mut ExecutionContext,
    ) -> Result<CommandResult, CommandError> {
        if self.permission_gates_children {
            self.check_permission(ctx)?;
        }

        let pending = match self.attempt_child(cause, state, ctx)? {
            ChildAttempt::Handled(result) => return Ok(result),
            ChildAttempt::NoMatch => None,
            ChildAttempt::Failed { subcommand, error } => Some((subcommand, error)),
        };

        if !self.permission_gates_children {
            self.check_permission(ctx)?;
        }

        let Some(executor) = &self.executor else {
            return Err(match pending {
                Some((_, child_error)) => child_error,
                None => self.missing_subcommand(cause, state, ctx).into(),
            });
        };

        let local = self
            .parse_local(cause, state, ctx)
            .and_then(|()| executor(cause, ctx));

        match (local, pending) {
            (Ok(result), None) => Ok(result),
            (Ok(result), Some((subcommand, child_error))) => {
                debug!(
                    subcommand = %subcommand,
                    error = %child_error,
                    "fallback executor absorbed subcommand failure"
                );
                Ok(result)
            }
            (Err(local_error), None) => Err(local_error),
            (Err(local_error), Some((subcommand, child_error))) => {
                Err(ChildCommandError::new(subcommand, local_error, Some(child_error)).into())
            }
        }
    }

    fn attempt_child(
        &self,
        cause: &Cause,
        state: &mut ParseState,
        ctx: &mut ExecutionContext,
    ) -> Result<ChildAttempt, CommandError> {
        if self.children.is_empty() || !state.has_next() {
            return Ok(ChildAttempt::NoMatch);
        }

        let parse_snapshot = state.snapshot();
        let context_snapshot = ctx.snapshot();
        let alias = state.next()?.to_lowercase();

        let Some(child) = self.children.get(&alias) else {
            state.restore(&parse_snapshot);
            return Ok(ChildAttempt::NoMatch);
        };

        let outcome = if child.permits(cause, ctx) {
            debug!(subcommand = %alias, "dispatching to subcommand");
            ctx.set_current_command(Some(alias.clone()));
            match child {
                ChildCommand::Node(node) => node.dispatch(cause, state, ctx),
                ChildCommand::Callable(callable) => {
                    let arguments = state.raw_remaining().to_string();
                    state.skip_all();
                    callable.process(cause, &arguments)
                }
            }
        } else {
            Err(CommandError::PermissionDenied {
                permission: child.permission().map_or_else(|| alias.clone(), str::to_string),
            })
        };

        let failure = match outcome {
            Ok(result) => return Ok(ChildAttempt::Handled(result)),
            Err(failure) => failure,
        };

        if failure.contains_internal() {
            error!(
                subcommand = %alias,
                policy = ?self.exception_policy,
                causes = ?error_chain(&failure),
                "subcommand failed with an unclassified error"
            );
        }

        state.restore(&parse_snapshot);
        ctx.restore(&context_snapshot);

        match self.exception_policy.classify(failure) {
            ChildFailure::Store(error) => Ok(ChildAttempt::Failed {
                subcommand: alias,
                error,
            }),
            ChildFailure::Rethrow(error) => Err(error),
        }
    }

    fn parse_local(
        &self,
        cause: &Cause,
        state: &mut ParseState,
        ctx: &mut ExecutionContext,
    ) -> Result<(), CommandError> {
        if let Some(flags) = &self.flags {
            flags.parse(cause, state, ctx)?;
        }
        for parameter in &self.parameters {
            parameter.parse(cause, state, ctx)?;
        }
        if state.has_next() {
            return Err(state
                .error("Too many arguments!")
                .with_expected(self.usage(cause))
                .into());
        }
        Ok(())
    }

    fn missing_subcommand(
        &self,
        cause: &Cause,
        state: &ParseState,
        ctx: &ExecutionContext,
    ) -> crate::error::ArgumentParseError {
        let available: Vec<&str> = self
            .children
            .iter()
            .filter(|(_, child)| child.permits(cause, ctx))
            .map(|(alias, _)| alias.as_str())
            .collect();
        let message = match state.peek() {
            Ok(token) => format!("Input command '{token}' was not a valid subcommand!"),
            Err(_) => "A subcommand is required!".to_string(),
        };
        state
            .error(message)
            .with_expected(format!("one of: {}", available.join(", ")))
    }

    /// Completion candidates for `arguments`. Parse failures are tolerated.
    pub fn suggestions(
        &self,
        cause: &Cause,
        arguments: &str,
        target: Option<&Location>,
    ) -> Result<Vec<String>, CommandError> {
        let mut state = ParseState::for_completion(self.tokenizer.as_ref(), arguments)?;
        let mut ctx = ExecutionContext::for_completion(cause, target.cloned());
        Ok(self.complete(cause, &mut state, &mut ctx))
    }

    /// Same structural walk as [`CommandNode::dispatch`], gathering
    /// candidates for the last token instead of executing.
    pub fn complete(
        &self,
        cause: &Cause,
        state: &mut ParseState,
        ctx: &mut ExecutionContext,
    ) -> Vec<String> {
        if !self.permits(ctx) {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        if !self.children.is_empty() && state.has_next() {
            if state.remaining() == 1 {
                let prefix = state.peek().unwrap_or("").to_lowercase();
                candidates.extend(
                    self.children
                        .iter()
                        .filter(|(alias, child)| alias.starts_with(&prefix) && child.permits(cause, ctx))
                        .map(|(alias, _)| alias.clone()),
                );
            } else {
                let parse_snapshot = state.snapshot();
                let context_snapshot = ctx.snapshot();
                if let Ok(token) = state.next() {
                    let alias = token.to_lowercase();
                    if let Some(child) = self.children.get(&alias)
                        && child.permits(cause, ctx)
                    {
                        ctx.set_current_command(Some(alias));
                        return match child {
                            ChildCommand::Node(node) => node.complete(cause, state, ctx),
                            ChildCommand::Callable(callable) => callable
                                .suggestions(cause, state.raw_remaining(), ctx.target_position())
                                .unwrap_or_default(),
                        };
                    }
                }
                state.restore(&parse_snapshot);
                ctx.restore(&context_snapshot);
            }
        }

        if self.executor.is_some() {
            candidates.extend(self.complete_local(cause, state, ctx));
        }
        candidates.sort();
        candidates.dedup();
        candidates
    }

    fn complete_local(
        &self,
        cause: &Cause,
        state: &mut ParseState,
        ctx: &mut ExecutionContext,
    ) -> Vec<String> {
        if let Some(flags) = &self.flags
            && let Some(candidates) = flags.complete(cause, state, ctx)
        {
            return candidates;
        }
        for parameter in &self.parameters {
            let parse_snapshot = state.snapshot();
            let context_snapshot = ctx.snapshot();
            match parameter.parse(cause, state, ctx) {
                Ok(()) if state.has_next() => continue,
                _ => {
                    state.restore(&parse_snapshot);
                    ctx.restore(&context_snapshot);
                    return parameter.complete(cause, state, ctx);
                }
            }
        }
        Vec::new()
    }

    /// One-line usage: flags, parameters, then the visible subcommands.
    pub fn usage(&self, cause: &Cause) -> String {
        let mut parts = Vec::new();
        if let Some(flags) = self.flags.as_deref().filter(|flags| !flags.is_empty()) {
            parts.push(flags.usage());
        }
        parts.extend(self.parameters.iter().map(|parameter| parameter.usage()));
        let children: Vec<&str> = self
            .children
            .iter()
            .filter(|(_, child)| match child {
                ChildCommand::Node(node) => node.can_execute(cause),
                ChildCommand::Callable(callable) => callable.test_permission(cause),
            })
            .map(|(alias, _)| alias.as_str())
            .collect();
        if !children.is_empty() {
            let joined = children.join("|");
            if self.executor.is_some() {
                parts.push(format!("[{joined}]"));
            } else {
                parts.push(format!("<{joined}>"));
            }
        }
        parts.join(" ")
    }
}

impl fmt::Debug for CommandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandNode")
            .field("parameters", &self.parameters.len())
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .field("permission", &self.permission)
            .field("permission_gates_children", &self.permission_gates_children)
            .field("exception_policy", &self.exception_policy)
            .field("has_executor", &self.executor.is_some())
            .finish_non_exhaustive()
    }
}

/// Immutable-output builder for [`CommandNode`].
#[derive(Clone)]
pub struct CommandNodeBuilder {
    parameters: Vec<Arc<dyn Parameter>>,
    flags: Option<Arc<Flags>>,
    children: Vec<(String, ChildCommand)>,
    permission: Option<String>,
    permission_gates_children: bool,
    exception_policy: ExceptionPolicy,
    executor: Option<Executor>,
    short_description: Option<DescriptionProvider>,
    extended_description: Option<DescriptionProvider>,
    tokenizer: Option<Arc<dyn Tokenizer>>,
}

impl Default for CommandNodeBuilder {
    fn default() -> Self {
        Self {
            parameters: Vec::new(),
            flags: None,
            children: Vec::new(),
            permission: None,
            permission_gates_children: true,
            exception_policy: ExceptionPolicy::default(),
            executor: None,
            short_description: None,
            extended_description: None,
            tokenizer: None,
        }
    }
}

impl CommandNodeBuilder {
    pub fn parameter(mut self, parameter: impl Parameter + 'static) -> Self {
        self.parameters.push(Arc::new(parameter));
        self
    }

    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = Some(Arc::new(flags));
        self
    }

    pub fn child<I, S>(self, node: CommandNode, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.push_child(ChildCommand::Node(Arc::new(node)), aliases)
    }

    pub fn child_callable<I, S>(self, callable: Arc<dyn CommandCallable>, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.push_child(ChildCommand::Callable(callable), aliases)
    }

    fn push_child<I, S>(mut self, child: ChildCommand, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let before = self.children.len();
        for alias in aliases {
            self.children
                .push((alias.as_ref().trim().to_lowercase(), child.clone()));
        }
        if self.children.len() == before {
            // remembered so build() can reject the alias-less child
            self.children.push((String::new(), child));
        }
        self
    }

    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }

    /// Check the permission before trying children (default) or only
    /// before the local executor.
    pub fn permission_gates_children(mut self, gates: bool) -> Self {
        self.permission_gates_children = gates;
        self
    }

    pub fn exception_policy(mut self, policy: ExceptionPolicy) -> Self {
        self.exception_policy = policy;
        self
    }

    pub fn executor<F>(mut self, executor: F) -> Self
    where
        F: Fn(&Cause, &ExecutionContext) -> Result<CommandResult, CommandError> + 'static,
    {
        self.executor = Some(Arc::new(executor));
        self
    }

    pub fn short_description<F>(mut self, provider: F) -> Self
    where
        F: Fn(&Cause) -> Option<String> + 'static,
    {
        self.short_description = Some(Arc::new(provider));
        self
    }

    pub fn extended_description<F>(mut self, provider: F) -> Self
    where
        F: Fn(&Cause) -> Option<String> + 'static,
    {
        self.extended_description = Some(Arc::new(provider));
        self
    }

    pub fn tokenizer(mut self, tokenizer: impl Tokenizer + 'static) -> Self {
        self.tokenizer = Some(Arc::new(tokenizer));
        self
    }

    pub fn build(self) -> Result<CommandNode, BuildError> {
        let mut children = BTreeMap::new();
        for (alias, child) in self.children {
            if alias.is_empty() {
                return Err(BuildError::EmptyChildAlias);
            }
            if children.insert(alias.clone(), child).is_some() {
                return Err(BuildError::DuplicateChildAlias(alias));
            }
        }
        if children.is_empty() && self.executor.is_none() {
            return Err(BuildError::NoExecutorOrChildren);
        }
        Ok(CommandNode {
            parameters: self.parameters,
            flags: self.flags,
            children,
            permission: self.permission,
            permission_gates_children: self.permission_gates_children,
            exception_policy: self.exception_policy,
            executor: self.executor,
            short_description: self.short_description,
            extended_description: self.extended_description,
            tokenizer: self.tokenizer.unwrap_or_else(|| Arc::new(QuotedStrings)),
        })
    }
}
