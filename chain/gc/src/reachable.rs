use arbor_chain_core::VisitAction;
use arbor_hashes::Hash;
use parking_lot::RwLock;
use std::collections::{hash_map::Entry, HashMap};
use std::sync::Arc;

/// The union, over a window of state roots, of all account-state nodes
/// reachable by trie traversal.
///
/// Born in the background full scan, grown by delta scans, consumed exactly
/// once when the set is staged for a swap. Exclusively owned by the scan
/// worker until it is handed off to the controller, and by the controller
/// thereafter.
#[derive(Debug, Default)]
pub struct ReachableSet {
    map: RwLock<HashMap<Hash, Arc<Vec<u8>>>>,
}

impl ReachableSet {
    pub fn new() -> Self {
        Default::default()
    }

    /// Inserts the node under its hash. Returns false if the hash was already
    /// present, in which case the previously stored node is left untouched.
    pub fn insert_new(&self, hash: Hash, node: &[u8]) -> bool {
        match self.map.write().entry(hash) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(node.to_vec()));
                true
            }
        }
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.map.read().contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Visitor callback for full scans: capture every visited node and keep walking
    pub fn store_hash(&self, hash: Hash, node: &[u8]) -> VisitAction {
        self.insert_new(hash, node);
        VisitAction::Continue
    }

    /// Visitor callback for delta scans: a subtree whose root is already
    /// captured is pruned entirely, so delta work is proportional to the
    /// difference between consecutive tries rather than to the trie size
    pub fn store_unseen_hash(&self, hash: Hash, node: &[u8]) -> VisitAction {
        if self.insert_new(hash, node) {
            VisitAction::Continue
        } else {
            VisitAction::Stop
        }
    }

    /// Iterates all captured nodes
    pub fn for_each(&self, mut op: impl FnMut(Hash, &Arc<Vec<u8>>)) {
        for (hash, node) in self.map.read().iter() {
            op(*hash, node)
        }
    }

    /// Clones the captured rows out for persistence
    pub(crate) fn snapshot(&self) -> Vec<(Hash, Arc<Vec<u8>>)> {
        self.map.read().iter().map(|(hash, node)| (*hash, node.clone())).collect()
    }
}
