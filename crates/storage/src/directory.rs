//! Static reference catalog and group directory
//!
//! In-memory providers for the two lookup ports. Both are built up front
//! (from a dataset file or in tests) and are read-only afterwards.

use std::collections::BTreeMap;

use nomen_core::{
    DirectReference, EntityType, GroupDirectory, PolymorphicReference, ReferenceCatalog, Result,
};

/// Reference catalog backed by explicit lists
///
/// Direct references are stored with their target type; polymorphic pairs
/// are global.
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    direct: Vec<(EntityType, DirectReference)>,
    polymorphic: Vec<PolymorphicReference>,
}

impl StaticCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a direct reference to `target`
    pub fn with_direct(mut self, target: impl Into<EntityType>, reference: DirectReference) -> Self {
        self.direct.push((target.into(), reference));
        self
    }

    /// Register a polymorphic reference pair
    pub fn with_polymorphic(mut self, reference: PolymorphicReference) -> Self {
        self.polymorphic.push(reference);
        self
    }

    /// All direct references with their targets
    pub fn direct_entries(&self) -> &[(EntityType, DirectReference)] {
        &self.direct
    }

    /// All polymorphic references
    pub fn polymorphic_entries(&self) -> &[PolymorphicReference] {
        &self.polymorphic
    }
}

impl ReferenceCatalog for StaticCatalog {
    fn list_direct_references(&self, target: &EntityType) -> Result<Vec<DirectReference>> {
        Ok(self
            .direct
            .iter()
            .filter(|(t, _)| t == target)
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn list_polymorphic_references(&self) -> Result<Vec<PolymorphicReference>> {
        Ok(self.polymorphic.clone())
    }
}

/// Group directory backed by a map of group id → abbreviation
#[derive(Debug, Default, Clone)]
pub struct StaticGroupDirectory {
    abbreviations: BTreeMap<String, String>,
    default_group: Option<String>,
}

impl StaticGroupDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a group
    pub fn with_group(mut self, group_id: impl Into<String>, abbr: impl Into<String>) -> Self {
        self.abbreviations.insert(group_id.into(), abbr.into());
        self
    }

    /// Set the default group
    pub fn with_default(mut self, group_id: impl Into<String>) -> Self {
        self.default_group = Some(group_id.into());
        self
    }

    /// Registered groups in id order
    pub fn groups(&self) -> Vec<(String, String)> {
        self.abbreviations
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl GroupDirectory for StaticGroupDirectory {
    fn default_group(&self) -> Option<String> {
        self.default_group.clone()
    }

    fn abbreviation(&self, group_id: &str) -> Result<Option<String>> {
        Ok(self.abbreviations.get(group_id).cloned())
    }
}
