//! Placement policy (spec component C8)
//!
//! Chooses which of a node's eligible devices satisfy a claim's `count`,
//! once C9 has already filtered down to devices that are untainted, of
//! the right kind, and have enough free capacity. Selection must be
//! deterministic: ties are always broken by ascending UID so that two
//! controller replicas racing the same claim converge on the same pick.

use std::cmp::Ordering;

/// One device eligible for a claim, carrying just the fields placement
/// needs to order candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementCandidate {
    pub uid: String,
    /// Millicores already committed to other claims on this device.
    pub used_millicores: u32,
    pub capacity_millicores: u32,
}

impl PlacementCandidate {
    fn free_millicores(&self) -> u32 {
        self.capacity_millicores.saturating_sub(self.used_millicores)
    }
}

/// Ordering strategy across eligible devices on a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementPolicy {
    /// No preference beyond the UID tie-break; fastest to compute.
    #[default]
    None,
    /// Prefer the least-loaded devices, spreading claims out.
    Balanced,
    /// Prefer the most-loaded (but still fitting) devices, consolidating
    /// claims so other devices stay free for larger requests.
    Packed,
}

pub struct PlacementEngine;

impl PlacementEngine {
    /// Order `candidates` per `policy` and take the first `count`. Returns
    /// fewer than `count` if there aren't enough eligible candidates; the
    /// caller (C9) turns a short result into `Error::InsufficientResources`.
    pub fn select(
        candidates: &[PlacementCandidate],
        count: usize,
        policy: PlacementPolicy,
    ) -> Vec<PlacementCandidate> {
        let mut sorted: Vec<&PlacementCandidate> = candidates.iter().collect();
        sorted.sort_by(|a, b| Self::compare(a, b, policy));
        sorted.into_iter().take(count).cloned().collect()
    }

    fn compare(a: &PlacementCandidate, b: &PlacementCandidate, policy: PlacementPolicy) -> Ordering {
        let primary = match policy {
            PlacementPolicy::None => Ordering::Equal,
            PlacementPolicy::Balanced => a.used_millicores.cmp(&b.used_millicores),
            PlacementPolicy::Packed => b.free_millicores().cmp(&a.free_millicores()),
        };
        primary.then_with(|| a.uid.cmp(&b.uid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(uid: &str, used: u32, capacity: u32) -> PlacementCandidate {
        PlacementCandidate {
            uid: uid.to_string(),
            used_millicores: used,
            capacity_millicores: capacity,
        }
    }

    #[test]
    fn none_policy_ties_break_on_uid() {
        let candidates = vec![candidate("gpu-2", 0, 1000), candidate("gpu-1", 500, 1000)];
        let selected = PlacementEngine::select(&candidates, 1, PlacementPolicy::None);
        assert_eq!(selected[0].uid, "gpu-1");
    }

    #[test]
    fn balanced_prefers_least_loaded() {
        let candidates = vec![candidate("gpu-1", 800, 1000), candidate("gpu-2", 200, 1000)];
        let selected = PlacementEngine::select(&candidates, 1, PlacementPolicy::Balanced);
        assert_eq!(selected[0].uid, "gpu-2");
    }

    #[test]
    fn packed_prefers_most_loaded_that_still_fits() {
        let candidates = vec![candidate("gpu-1", 800, 1000), candidate("gpu-2", 200, 1000)];
        let selected = PlacementEngine::select(&candidates, 1, PlacementPolicy::Packed);
        assert_eq!(selected[0].uid, "gpu-1");
    }

    #[test]
    fn short_result_when_not_enough_candidates() {
        let candidates = vec![candidate("gpu-1", 0, 1000)];
        let selected = PlacementEngine::select(&candidates, 3, PlacementPolicy::Balanced);
        assert_eq!(selected.len(), 1);
    }
}
