//! Pending claims cache (spec component C7)
//!
//! Between deciding an allocation and the ASR write actually landing
//! (or being observed via the watch), a second reconcile of the same
//! node must not double-count the devices just committed. `PendingClaims`
//! holds a short-lived, in-memory record of "claims this process just
//! decided to commit to this node" so admission checks can account for
//! them even before they are visible in the node's own ASR snapshot.

use crate::domain::claim::AllocatedClaim;
use dashmap::DashMap;
use std::time::{Duration, Instant};

struct PendingEntry {
    claim: AllocatedClaim,
    recorded_at: Instant,
}

/// How long a pending entry is trusted before it's assumed stale and
/// should be superseded by the ASR's own state (spec §4.4: bounds the
/// window where a crashed controller leaves a claim double-counted).
pub const PENDING_TTL: Duration = Duration::from_secs(30);

#[derive(Default)]
pub struct PendingClaims {
    // keyed by (node_name, claim_uid)
    entries: DashMap<(String, String), PendingEntry>,
}

impl PendingClaims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, node_name: &str, claim_uid: &str, claim: AllocatedClaim) {
        self.entries.insert(
            (node_name.to_string(), claim_uid.to_string()),
            PendingEntry {
                claim,
                recorded_at: Instant::now(),
            },
        );
    }

    pub fn clear(&self, node_name: &str, claim_uid: &str) {
        self.entries.remove(&(node_name.to_string(), claim_uid.to_string()));
    }

    /// Claims pending for `node_name` that haven't expired, already
    /// confirmed into the ASR (`known_claims`) excluded.
    pub fn live_for_node(
        &self,
        node_name: &str,
        known_claims: &std::collections::BTreeMap<String, AllocatedClaim>,
    ) -> Vec<AllocatedClaim> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| {
                let (n, uid) = entry.key();
                n == node_name
                    && !known_claims.contains_key(uid)
                    && now.duration_since(entry.value().recorded_at) < PENDING_TTL
            })
            .map(|entry| entry.value().claim.clone())
            .collect()
    }

    /// Drop every entry older than `PENDING_TTL`, regardless of node.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        self.entries
            .retain(|_, entry| now.duration_since(entry.recorded_at) < PENDING_TTL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn pending_claim_is_visible_until_confirmed() {
        let pending = PendingClaims::new();
        pending.record("node-1", "claim-a", AllocatedClaim::default());

        let known = BTreeMap::new();
        assert_eq!(pending.live_for_node("node-1", &known).len(), 1);

        let mut known = BTreeMap::new();
        known.insert("claim-a".to_string(), AllocatedClaim::default());
        assert_eq!(pending.live_for_node("node-1", &known).len(), 0);
    }

    #[test]
    fn clear_removes_entry() {
        let pending = PendingClaims::new();
        pending.record("node-1", "claim-a", AllocatedClaim::default());
        pending.clear("node-1", "claim-a");
        let known = BTreeMap::new();
        assert_eq!(pending.live_for_node("node-1", &known).len(), 0);
    }

    #[test]
    fn different_nodes_are_isolated() {
        let pending = PendingClaims::new();
        pending.record("node-1", "claim-a", AllocatedClaim::default());
        let known = BTreeMap::new();
        assert_eq!(pending.live_for_node("node-2", &known).len(), 0);
    }
}
