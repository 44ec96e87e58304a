//! Per-node mutex table (spec component C6)
//!
//! Every read-modify-write against a node's ASR — allocate, deallocate,
//! VF materialization, health tainting — must hold that node's lock for
//! the duration of the read-validate-write cycle so two controller
//! replicas (or a replica racing the node plugin) never interleave
//! updates. One lock per node, created lazily; keyed the same way the
//! teacher's sharded node registry keys drives, but without sharding
//! since node counts here are orders of magnitude smaller than drives.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct NodeMutexTable {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl NodeMutexTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, node_name: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(node_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the lock for `node_name`, blocking until available. The
    /// returned guard owns its `Arc`, so callers can hold it across
    /// `.await` points without borrowing the table.
    pub async fn lock(&self, node_name: &str) -> OwnedMutexGuard<()> {
        let arc = self.lock_for(node_name);
        arc.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_node_locks_are_mutually_exclusive() {
        let table = Arc::new(NodeMutexTable::new());
        let counter = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let table = table.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let _guard = table.lock("node-1").await;
                let before = counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
                assert_eq!(counter.load(Ordering::SeqCst), before + 1);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn different_nodes_do_not_contend() {
        let table = NodeMutexTable::new();
        let g1 = table.lock("node-1").await;
        let g2 = table.lock("node-2").await;
        drop(g1);
        drop(g2);
    }
}
