//! Parsed argument bag plus the cause-derived fields of one invocation.
//!
//! Vibecrafted with AI Agents by VetCoders (c)2025 The Loctree Team

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::cause::{BlockRef, Cause, CommandSource, EntityRef, Location, PermissionSubject};
use crate::error::CommandError;

/// A single parsed argument value.
///
/// `Null` and `List` only exist on the way *into* the bag: `put_entry`
/// rejects a top-level `Null` and flattens a `List`, so the bag itself only
/// ever stores scalar values (or lists nested inside a list).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Entity(EntityRef),
    Location(Location),
    List(Vec<ArgValue>),
}

impl ArgValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ArgValue::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Integers widen to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ArgValue::Float(value) => Some(*value),
            ArgValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            ArgValue::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_location(&self) -> Option<&Location> {
        match self {
            ArgValue::Location(location) => Some(location),
            _ => None,
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Null => write!(f, "null"),
            ArgValue::Bool(value) => write!(f, "{value}"),
            ArgValue::Int(value) => write!(f, "{value}"),
            ArgValue::Float(value) => write!(f, "{value}"),
            ArgValue::Str(value) => write!(f, "{value}"),
            ArgValue::Entity(entity) => write!(f, "{}", entity.name),
            ArgValue::Location(l) => write!(f, "{} {} {} @ {}", l.x, l.y, l.z, l.world),
            ArgValue::List(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Bool(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Int(value)
    }
}

impl From<i32> for ArgValue {
    fn from(value: i32) -> Self {
        ArgValue::Int(i64::from(value))
    }
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        ArgValue::Float(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Str(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Str(value)
    }
}

impl From<EntityRef> for ArgValue {
    fn from(value: EntityRef) -> Self {
        ArgValue::Entity(value)
    }
}

impl From<Location> for ArgValue {
    fn from(value: Location) -> Self {
        ArgValue::Location(value)
    }
}

impl<T: Into<ArgValue>> From<Option<T>> for ArgValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ArgValue::Null, Into::into)
    }
}

impl<T: Into<ArgValue>> From<Vec<T>> for ArgValue {
    fn from(values: Vec<T>) -> Self {
        ArgValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Copy of the bag and the current-subcommand pointer.
///
/// Owns its data, so later writes to the live context are never visible
/// through a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSnapshot {
    entries: HashMap<String, Vec<ArgValue>>,
    current_command: Option<String>,
}

/// Mutable key → ordered values bag for one invocation.
///
/// The cause-derived fields are resolved once in [`ExecutionContext::new`]
/// and never change afterwards; only the bag and the current-subcommand
/// pointer move, and only `restore` can move them backwards.
pub struct ExecutionContext {
    entries: HashMap<String, Vec<ArgValue>>,
    current_command: Option<String>,
    completing: bool,
    target_position: Option<Location>,
    source: Option<Arc<dyn CommandSource>>,
    subject: Option<PermissionSubject>,
    target_entity: Option<EntityRef>,
    location: Option<Location>,
    target_block: Option<BlockRef>,
}

impl ExecutionContext {
    pub fn new(cause: &Cause) -> Self {
        Self {
            entries: HashMap::new(),
            current_command: None,
            completing: false,
            target_position: None,
            source: cause.source().cloned(),
            subject: cause.subject(),
            target_entity: cause.target_entity(),
            location: cause.location(),
            target_block: cause.target_block(),
        }
    }

    /// A context for suggestion walks. Nothing gets executed with it.
    pub fn for_completion(cause: &Cause, target_position: Option<Location>) -> Self {
        Self {
            completing: true,
            target_position,
            ..Self::new(cause)
        }
    }

    /// Append `value` to the values recorded for `key`.
    ///
    /// A `List` is flattened element by element and `Null` elements inside
    /// it are silently dropped, while a top-level `Null` fails with
    /// [`CommandError::NullArgument`]. The asymmetry is kept on purpose for
    /// compatibility with existing parameter implementations.
    pub fn put_entry(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ArgValue>,
    ) -> Result<(), CommandError> {
        let key = key.into();
        match value.into() {
            ArgValue::Null => Err(CommandError::NullArgument { key }),
            ArgValue::List(values) => {
                let slot = self.entries.entry(key).or_default();
                slot.extend(values.into_iter().filter(|value| !value.is_null()));
                Ok(())
            }
            value => {
                self.entries.entry(key).or_default().push(value);
                Ok(())
            }
        }
    }

    /// The value for `key` if **exactly one** is recorded.
    ///
    /// Absent and "more than one" both return `None`. Callers that need to
    /// tell those apart must use [`ExecutionContext::get_all`]; this contract
    /// is kept as is for compatibility and is easy to misuse.
    pub fn get_one(&self, key: &str) -> Option<&ArgValue> {
        match self.entries.get(key).map(Vec::as_slice) {
            Some([value]) => Some(value),
            _ => None,
        }
    }

    /// All values for `key`, in insertion order.
    pub fn get_all(&self, key: &str) -> &[ArgValue] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_any(&self, key: &str) -> bool {
        !self.get_all(key).is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_completing(&self) -> bool {
        self.completing
    }

    /// The position a completion was requested for.
    pub fn target_position(&self) -> Option<&Location> {
        self.target_position.as_ref()
    }

    /// Alias of the subcommand currently being dispatched.
    pub fn current_command(&self) -> Option<&str> {
        self.current_command.as_deref()
    }

    pub fn set_current_command(&mut self, alias: Option<String>) {
        self.current_command = alias;
    }

    pub fn source(&self) -> Option<&Arc<dyn CommandSource>> {
        self.source.as_ref()
    }

    pub fn subject(&self) -> Option<&PermissionSubject> {
        self.subject.as_ref()
    }

    pub fn target_entity(&self) -> Option<&EntityRef> {
        self.target_entity.as_ref()
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    pub fn target_block(&self) -> Option<&BlockRef> {
        self.target_block.as_ref()
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.subject
            .as_ref()
            .is_some_and(|subject| subject.has_permission(permission))
    }

    pub fn check_permission(&self, permission: &str) -> Result<(), CommandError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(CommandError::PermissionDenied {
                permission: permission.to_string(),
            })
        }
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            entries: self.entries.clone(),
            current_command: self.current_command.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: &ContextSnapshot) {
        self.entries = snapshot.entries.clone();
        self.current_command = snapshot.current_command.clone();
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("entries", &self.entries)
            .field("current_command", &self.current_command)
            .field("completing", &self.completing)
            .field("source", &self.source.as_ref().map(|s| s.name()))
            .field("subject", &self.subject)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}
