//! Top-level entry point: raw command line in, result out.
//!
//! Vibecrafted with AI Agents by VetCoders (c)2025 The Loctree Team
//!
//! ```text
//! "home set base"
//!   │ split on first whitespace → ("home", "set base")
//!   ▼
//! pre-dispatch listeners (rewrite / veto)
//!   ▼
//! AliasRegistry::lookup("home") → Mapping → Registrar::process
//!   ▼
//! post-dispatch listeners, diagnostics, message back to the source
//! ```
//!
//! The router is single-threaded and re-entrant: an executor may call
//! [`CommandRouter::process`] again, or register new commands, while its own
//! invocation is still on the stack. The registry is never borrowed across
//! a registrar call.

use std::cell::RefCell;
use std::sync::Arc;

use strsim::levenshtein;
use tracing::{debug, error};

use crate::cause::{Cause, Location};
use crate::config::RouterConfig;
use crate::diagnostics::DiagnosticReport;
use crate::error::CommandError;
use crate::events::{CommandListener, EventBus, PostDispatchEvent, PreDispatchEvent};
use crate::node::{CommandCallable, CommandNode};
use crate::registrar::{CallableRegistrar, NodeRegistrar, Registrar};
use crate::registry::{AliasRegistry, Mapping};
use crate::result::CommandResult;

/// Split `raw` into the command token and the untouched remainder.
///
/// Leading whitespace is ignored; the remainder keeps everything after the
/// first whitespace character, including further whitespace.
pub fn split_command(raw: &str) -> (&str, &str) {
    let raw = raw.trim_start();
    match raw.char_indices().find(|(_, c)| c.is_whitespace()) {
        Some((index, c)) => (&raw[..index], &raw[index + c.len_utf8()..]),
        None => (raw, ""),
    }
}

/// Closest registered alias within edit distance 2.
fn closest_alias<'a>(input: &str, aliases: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let input_lower = input.to_lowercase();
    let mut best_match: Option<(&str, usize)> = None;

    for alias in aliases {
        let distance = levenshtein(&input_lower, alias);
        if distance > 2 {
            continue;
        }
        if best_match.is_none_or(|(_, best)| distance < best) {
            best_match = Some((alias, distance));
        }
    }

    best_match.map(|(alias, _)| alias.to_string())
}

pub struct CommandRouter {
    registry: RefCell<AliasRegistry>,
    events: RefCell<EventBus>,
    config: RouterConfig,
}

impl Default for CommandRouter {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

impl CommandRouter {
    pub fn new(config: RouterConfig) -> Self {
        let registry = AliasRegistry::with_overrides(
            config
                .aliases
                .iter()
                .map(|(alias, owner)| (alias.as_str(), owner.clone())),
        );
        Self {
            registry: RefCell::new(registry),
            events: RefCell::new(EventBus::new()),
            config,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn subscribe(&self, listener: Arc<dyn CommandListener>) {
        self.events.borrow_mut().subscribe(listener);
    }

    // ============================================================================
    // Registration
    // ============================================================================

    pub fn register<I, S>(
        &self,
        primary: &str,
        secondaries: I,
        owner: &str,
        registrar: Arc<dyn Registrar>,
    ) -> Result<Arc<Mapping>, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.registry
            .borrow_mut()
            .register(primary, secondaries, owner, registrar)
    }

    pub fn register_node<I, S>(
        &self,
        node: CommandNode,
        primary: &str,
        secondaries: I,
        owner: &str,
    ) -> Result<Arc<Mapping>, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.register(primary, secondaries, owner, Arc::new(NodeRegistrar::new(node)))
    }

    pub fn register_callable<I, S>(
        &self,
        callable: Arc<dyn CommandCallable>,
        primary: &str,
        secondaries: I,
        owner: &str,
    ) -> Result<Arc<Mapping>, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.register(
            primary,
            secondaries,
            owner,
            Arc::new(CallableRegistrar::new(callable)),
        )
    }

    pub fn lookup(&self, alias: &str) -> Option<Arc<Mapping>> {
        self.registry.borrow().lookup(alias)
    }

    pub fn aliases(&self) -> Vec<String> {
        self.registry
            .borrow()
            .aliases()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn begin_reset(&self) {
        self.registry.borrow_mut().begin_reset();
    }

    pub fn finish_reset(&self) {
        self.registry.borrow_mut().finish_reset();
    }

    pub fn reset(&self) {
        self.registry.borrow_mut().reset();
    }

    pub fn is_resetting(&self) -> bool {
        self.registry.borrow().is_resetting()
    }

    // ============================================================================
    // Dispatch
    // ============================================================================

    /// Resolve and run one command line.
    pub fn process(&self, cause: &Cause, raw: &str) -> Result<CommandResult, CommandError> {
        if self.is_resetting() {
            return Err(CommandError::Resetting);
        }

        let (command, arguments) = split_command(raw);
        let events = self.events.borrow().clone();
        let mut pre = PreDispatchEvent::new(cause, command, arguments);
        events.fire_pre(&mut pre);
        let (command, arguments, cancelled, vetoed) = pre.into_parts();
        if cancelled {
            debug!(command = %command, "dispatch cancelled by listener");
            return Ok(vetoed.unwrap_or_else(CommandResult::empty));
        }

        let mapping = self.registry.borrow().lookup(&command);
        let outcome = match &mapping {
            Some(mapping) => {
                debug!(
                    command = %command,
                    owner = mapping.owner(),
                    kind = mapping.registrar().kind(),
                    "dispatching"
                );
                mapping
                    .registrar()
                    .process(cause, mapping, &command, &arguments)
            }
            None => Err(CommandError::UnknownCommand {
                suggestion: closest_alias(&command, self.registry.borrow().aliases()),
                command: command.clone(),
            }),
        };

        match outcome {
            Ok(result) => {
                events.fire_post(&PostDispatchEvent {
                    cause,
                    command: &command,
                    arguments: &arguments,
                    result: &result,
                    failed: false,
                });
                if let Some(message) = result.error_message() {
                    cause.send_message(message);
                }
                Ok(result)
            }
            Err(failure) => {
                let result = CommandResult::error(failure.user_message(self.reveals_internals(cause)));
                events.fire_post(&PostDispatchEvent {
                    cause,
                    command: &command,
                    arguments: &arguments,
                    result: &result,
                    failed: true,
                });
                if self.config.debug || failure.contains_internal() {
                    self.report(&command, &arguments, mapping.as_deref(), &failure);
                }
                Err(failure)
            }
        }
    }

    /// Like [`CommandRouter::process`], but failures are sent to the source
    /// as a message and returned as an error result.
    pub fn process_and_report(&self, cause: &Cause, raw: &str) -> CommandResult {
        match self.process(cause, raw) {
            Ok(result) => result,
            Err(failure) => {
                let message = failure.user_message(self.reveals_internals(cause));
                cause.send_message(&message);
                CommandResult::error(message)
            }
        }
    }

    /// Completions for `raw`. Never fails; problems yield an empty list.
    pub fn suggest(&self, cause: &Cause, raw: &str, target: Option<&Location>) -> Vec<String> {
        if self.is_resetting() {
            return Vec::new();
        }

        let trimmed = raw.trim_start();
        if !trimmed.contains(char::is_whitespace) {
            let prefix = trimmed.to_lowercase();
            let matching: Vec<(String, Arc<Mapping>)> = {
                let registry = self.registry.borrow();
                registry
                    .aliases()
                    .into_iter()
                    .filter(|alias| alias.starts_with(&prefix))
                    .filter_map(|alias| Some((alias.to_string(), registry.lookup(alias)?)))
                    .collect()
            };
            let mut candidates: Vec<String> = matching
                .into_iter()
                .filter(|(_, mapping)| mapping.registrar().can_execute(cause))
                .map(|(alias, _)| alias)
                .collect();
            candidates.sort();
            return candidates;
        }

        let (command, arguments) = split_command(raw);
        let Some(mapping) = self.registry.borrow().lookup(command) else {
            return Vec::new();
        };
        match mapping
            .registrar()
            .suggestions(cause, &mapping, command, arguments, target)
        {
            Ok(mut candidates) => {
                candidates.sort();
                candidates.dedup();
                candidates
            }
            Err(failure) => {
                debug!(command, error = %failure, "suggestions failed");
                Vec::new()
            }
        }
    }

    fn reveals_internals(&self, cause: &Cause) -> bool {
        cause.has_permission(&self.config.debug_permission)
    }

    fn report(&self, command: &str, arguments: &str, mapping: Option<&Mapping>, failure: &CommandError) {
        let command_line = if arguments.is_empty() {
            command.to_string()
        } else {
            format!("{command} {arguments}")
        };
        let report = DiagnosticReport::new(
            command_line,
            mapping.map(Mapping::owner),
            mapping.map(|mapping| mapping.registrar().kind()),
            failure,
        );
        error!(
            id = %report.id,
            internal = failure.contains_internal(),
            "{}",
            report.render()
        );
    }
}

impl std::fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRouter")
            .field("registry", &self.registry)
            .field("listeners", &self.events.borrow().len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_keeps_remainder_untrimmed() {
        assert_eq!(split_command("tp 10 20 30"), ("tp", "10 20 30"));
        assert_eq!(split_command("  home"), ("home", ""));
        assert_eq!(split_command("echo  two  spaces "), ("echo", " two  spaces "));
        assert_eq!(split_command(""), ("", ""));
    }

    #[test]
    fn closest_alias_prefers_smallest_distance() {
        let aliases = ["home", "help", "tp"];
        assert_eq!(closest_alias("hom", aliases), Some("home".into()));
        assert_eq!(closest_alias("TPP", aliases), Some("tp".into()));
        assert_eq!(closest_alias("teleportation", aliases), None);
    }
}
