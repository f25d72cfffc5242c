//! Alias namespace shared by every registered command.
//!
//! An alias maps to at most one [`Mapping`]. Registration drops aliases that
//! are already taken or reserved for another owner, and only fails when no
//! alias survives. Lookups are exact after case folding;
//! there is no prefix or fuzzy resolution here.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::CommandError;
use crate::registrar::Registrar;

/// Aliases, owner and backing registrar of one registered command.
pub struct Mapping {
    primary_alias: String,
    aliases: Vec<String>,
    owner: String,
    registrar: Arc<dyn Registrar>,
}

impl Mapping {
    pub fn primary_alias(&self) -> &str {
        &self.primary_alias
    }

    /// Every alias of this mapping, primary first.
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn registrar(&self) -> &Arc<dyn Registrar> {
        &self.registrar
    }
}

impl fmt::Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapping")
            .field("primary_alias", &self.primary_alias)
            .field("aliases", &self.aliases)
            .field("owner", &self.owner)
            .field("registrar", &self.registrar.kind())
            .finish()
    }
}

fn normalize(alias: &str) -> String {
    alias.trim().to_lowercase()
}

#[derive(Default)]
pub struct AliasRegistry {
    by_alias: HashMap<String, Arc<Mapping>>,
    by_owner: BTreeMap<String, Vec<Arc<Mapping>>>,
    /// alias -> owner that alias is reserved for
    overrides: HashMap<String, String>,
    resetting: bool,
}

impl AliasRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that reserves the given aliases for their owners.
    pub fn with_overrides<I, A, O>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (A, O)>,
        A: AsRef<str>,
        O: Into<String>,
    {
        let mut registry = Self::new();
        for (alias, owner) in overrides {
            registry.set_override(alias.as_ref(), owner);
        }
        registry
    }

    pub fn set_override(&mut self, alias: &str, owner: impl Into<String>) {
        self.overrides.insert(normalize(alias), owner.into());
    }

    pub fn override_for(&self, alias: &str) -> Option<&str> {
        self.overrides.get(&normalize(alias)).map(String::as_str)
    }

    /// Claim `primary` and `secondaries` for `owner`.
    ///
    /// Aliases reserved for a different owner or already mapped are dropped
    /// with a warning. The first surviving alias becomes the primary one.
    pub fn register<I, S>(
        &mut self,
        primary: &str,
        secondaries: I,
        owner: &str,
        registrar: Arc<dyn Registrar>,
    ) -> Result<Arc<Mapping>, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut requested: Vec<String> = Vec::new();
        for alias in std::iter::once(normalize(primary))
            .chain(secondaries.into_iter().map(|alias| normalize(alias.as_ref())))
        {
            if !alias.is_empty() && !requested.contains(&alias) {
                requested.push(alias);
            }
        }

        let aliases: Vec<String> = requested
            .iter()
            .filter(|alias| self.claimable(alias, owner))
            .cloned()
            .collect();

        let Some(primary_alias) = aliases.first().cloned() else {
            return Err(CommandError::AliasConflict {
                owner: owner.to_string(),
                aliases: requested,
            });
        };

        let mapping = Arc::new(Mapping {
            primary_alias,
            aliases,
            owner: owner.to_string(),
            registrar,
        });
        for alias in &mapping.aliases {
            self.by_alias.insert(alias.clone(), Arc::clone(&mapping));
        }
        self.by_owner
            .entry(owner.to_string())
            .or_default()
            .push(Arc::clone(&mapping));
        debug!(
            owner,
            primary = %mapping.primary_alias,
            aliases = ?mapping.aliases,
            kind = mapping.registrar.kind(),
            "registered command"
        );
        Ok(mapping)
    }

    fn claimable(&self, alias: &str, owner: &str) -> bool {
        if let Some(reserved) = self.overrides.get(alias)
            && reserved != owner
        {
            warn!(alias, owner, reserved_for = %reserved, "alias reserved for another owner, dropping");
            return false;
        }
        if let Some(existing) = self.by_alias.get(alias) {
            warn!(alias, owner, taken_by = %existing.owner, "alias already registered, dropping");
            return false;
        }
        true
    }

    /// Exact, case-insensitive alias lookup.
    pub fn lookup(&self, alias: &str) -> Option<Arc<Mapping>> {
        self.by_alias.get(&normalize(alias)).cloned()
    }

    pub fn mappings_for(&self, owner: &str) -> &[Arc<Mapping>] {
        self.by_owner.get(owner).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every registered alias, sorted.
    pub fn aliases(&self) -> Vec<&str> {
        let mut aliases: Vec<&str> = self.by_alias.keys().map(String::as_str).collect();
        aliases.sort_unstable();
        aliases
    }

    pub fn mappings(&self) -> impl Iterator<Item = &Arc<Mapping>> {
        self.by_owner.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_owner.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_alias.is_empty()
    }

    /// Open a reset window: drops every mapping and flags the registry as
    /// resetting until [`AliasRegistry::finish_reset`].
    pub fn begin_reset(&mut self) {
        self.resetting = true;
        self.clear();
    }

    pub fn finish_reset(&mut self) {
        self.resetting = false;
    }

    /// Drop every mapping in one step. Overrides survive.
    pub fn reset(&mut self) {
        self.begin_reset();
        self.finish_reset();
    }

    pub fn is_resetting(&self) -> bool {
        self.resetting
    }

    fn clear(&mut self) {
        let dropped = self.len();
        self.by_alias.clear();
        self.by_owner.clear();
        debug!(dropped, "cleared command registry");
    }
}

impl fmt::Debug for AliasRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AliasRegistry")
            .field("aliases", &self.aliases())
            .field("overrides", &self.overrides)
            .field("resetting", &self.resetting)
            .finish()
    }
}
