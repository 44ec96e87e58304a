//! VF profile table port (C3): maps a parent GPU's model to the set of
//! SR-IOV virtual-function profiles it can carve, each describing the
//! memory/millicore share one VF instance of that profile consumes.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One carvable VF shape: e.g. "1g.1c" on a GPU supporting 4 such slices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfProfile {
    pub name: String,
    /// Memory granted to one VF of this profile, in MiB.
    pub memory: u64,
    /// Millicores granted to one VF of this profile.
    pub millicores: u32,
    /// How many VFs of this profile a single parent device can carve.
    pub max_instances: u32,
}

#[async_trait]
pub trait VfProfileTable: Send + Sync {
    /// All profiles a device of the given model supports, in the table's
    /// preferred trial order (smallest-first is typical, spec §4.5).
    async fn profiles_for_model(&self, model: &str) -> Result<Vec<VfProfile>>;
}

pub type VfProfileTableRef = Arc<dyn VfProfileTable>;

/// Static per-model profile table, backing the reference deployment where
/// profile shapes are pinned by vendor documentation rather than queried
/// from firmware.
#[derive(Default)]
pub struct StaticVfProfileTable {
    table: BTreeMap<String, Vec<VfProfile>>,
}

impl StaticVfProfileTable {
    pub fn new(table: BTreeMap<String, Vec<VfProfile>>) -> Self {
        Self { table }
    }
}

#[async_trait]
impl VfProfileTable for StaticVfProfileTable {
    async fn profiles_for_model(&self, model: &str) -> Result<Vec<VfProfile>> {
        Ok(self.table.get(model).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_model_has_no_profiles() {
        let table = StaticVfProfileTable::default();
        assert!(table.profiles_for_model("unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn known_model_returns_its_profiles() {
        let profile = VfProfile {
            name: "1g.1c".into(),
            memory: 1024,
            millicores: 100,
            max_instances: 8,
        };
        let mut map = BTreeMap::new();
        map.insert("model-a".to_string(), vec![profile.clone()]);
        let table = StaticVfProfileTable::new(map);
        let profiles = table.profiles_for_model("model-a").await.unwrap();
        assert_eq!(profiles, vec![profile]);
    }
}
