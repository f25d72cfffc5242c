//! Invocation context: who runs a command, as whom, and where.
//!
//! A [`Cause`] bundles the optional command source, permission subject,
//! entity target, location and target block for one call. Explicitly set
//! fields always win over values derived from the source (an explicit
//! location beats the source's own position).

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A position in a named world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// The block containing this location.
    pub fn block(&self) -> BlockRef {
        BlockRef {
            world: self.world.clone(),
            x: self.x.floor() as i64,
            y: self.y.floor() as i64,
            z: self.z.floor() as i64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    pub world: String,
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: Uuid,
    pub name: String,
}

impl EntityRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

/// Something permissions are evaluated against.
pub trait Subject {
    fn identifier(&self) -> &str;

    fn has_permission(&self, permission: &str) -> bool;
}

/// Whoever typed the command. Also a permission subject.
pub trait CommandSource: Subject {
    fn name(&self) -> &str;

    fn send_message(&self, message: &str);

    fn location(&self) -> Option<Location> {
        None
    }

    fn target_block(&self) -> Option<BlockRef> {
        None
    }

    /// The entity this source *is*, if any.
    fn as_entity(&self) -> Option<EntityRef> {
        None
    }
}

/// The subject a permission check runs against, resolved once per call.
#[derive(Clone)]
pub enum PermissionSubject {
    Explicit(Arc<dyn Subject>),
    Source(Arc<dyn CommandSource>),
}

impl PermissionSubject {
    pub fn identifier(&self) -> &str {
        match self {
            PermissionSubject::Explicit(subject) => subject.identifier(),
            PermissionSubject::Source(source) => source.identifier(),
        }
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        match self {
            PermissionSubject::Explicit(subject) => subject.has_permission(permission),
            PermissionSubject::Source(source) => source.has_permission(permission),
        }
    }
}

impl fmt::Debug for PermissionSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PermissionSubject")
            .field(&self.identifier())
            .finish()
    }
}

/// Opaque invocation context for one command call.
#[derive(Clone, Default)]
pub struct Cause {
    source: Option<Arc<dyn CommandSource>>,
    subject: Option<Arc<dyn Subject>>,
    target_entity: Option<EntityRef>,
    location: Option<Location>,
    target_block: Option<BlockRef>,
}

impl Cause {
    pub fn builder() -> CauseBuilder {
        CauseBuilder::default()
    }

    /// A cause whose every field derives from `source`.
    pub fn of_source(source: Arc<dyn CommandSource>) -> Self {
        Self {
            source: Some(source),
            ..Self::default()
        }
    }

    pub fn source(&self) -> Option<&Arc<dyn CommandSource>> {
        self.source.as_ref()
    }

    pub fn subject(&self) -> Option<PermissionSubject> {
        match (&self.subject, &self.source) {
            (Some(subject), _) => Some(PermissionSubject::Explicit(Arc::clone(subject))),
            (None, Some(source)) => Some(PermissionSubject::Source(Arc::clone(source))),
            (None, None) => None,
        }
    }

    pub fn target_entity(&self) -> Option<EntityRef> {
        self.target_entity
            .clone()
            .or_else(|| self.source.as_ref().and_then(|s| s.as_entity()))
    }

    pub fn location(&self) -> Option<Location> {
        self.location
            .clone()
            .or_else(|| self.source.as_ref().and_then(|s| s.location()))
    }

    pub fn target_block(&self) -> Option<BlockRef> {
        self.target_block
            .clone()
            .or_else(|| self.source.as_ref().and_then(|s| s.target_block()))
    }

    /// False when there is no subject at all.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.subject()
            .is_some_and(|subject| subject.has_permission(permission))
    }

    /// Forward a message to the source, if there is one.
    pub fn send_message(&self, message: &str) {
        if let Some(source) = &self.source {
            source.send_message(message);
        }
    }

    /// Display name of the source for logs.
    pub fn source_name(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.name())
    }
}

impl fmt::Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cause")
            .field("source", &self.source_name())
            .field("subject", &self.subject.as_ref().map(|s| s.identifier()))
            .field("target_entity", &self.target_entity)
            .field("location", &self.location)
            .field("target_block", &self.target_block)
            .finish()
    }
}

#[derive(Default)]
pub struct CauseBuilder {
    cause: Cause,
}

impl CauseBuilder {
    pub fn source(mut self, source: Arc<dyn CommandSource>) -> Self {
        self.cause.source = Some(source);
        self
    }

    pub fn subject(mut self, subject: Arc<dyn Subject>) -> Self {
        self.cause.subject = Some(subject);
        self
    }

    pub fn target_entity(mut self, entity: EntityRef) -> Self {
        self.cause.target_entity = Some(entity);
        self
    }

    pub fn location(mut self, location: Location) -> Self {
        self.cause.location = Some(location);
        self
    }

    pub fn target_block(mut self, block: BlockRef) -> Self {
        self.cause.target_block = Some(block);
        self
    }

    pub fn build(self) -> Cause {
        self.cause
    }
}

/// In-memory source with a fixed permission set that records messages.
///
/// Grants are exact permission strings, `*`, or a `prefix.*` wildcard that
/// covers every permission below `prefix.`.
#[derive(Debug, Default)]
pub struct SimpleSource {
    name: String,
    permissions: BTreeSet<String>,
    location: Option<Location>,
    messages: Mutex<Vec<String>>,
}

impl SimpleSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Messages sent to this source, oldest first.
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }
}

impl Subject for SimpleSource {
    fn identifier(&self) -> &str {
        &self.name
    }

    fn has_permission(&self, permission: &str) -> bool {
        permission_granted(&self.permissions, permission)
    }
}

impl CommandSource for SimpleSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn send_message(&self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }

    fn location(&self) -> Option<Location> {
        self.location.clone()
    }
}

/// Wildcard-aware membership test shared by the in-memory subjects.
pub fn permission_granted(granted: &BTreeSet<String>, permission: &str) -> bool {
    if granted.contains("*") || granted.contains(permission) {
        return true;
    }
    granted.iter().any(|grant| {
        grant
            .strip_suffix('*')
            .is_some_and(|prefix| prefix.ends_with('.') && permission.starts_with(prefix))
    })
}
