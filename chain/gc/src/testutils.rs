//! Mock implementations of the chain-facing seams, for tests only

use crate::reachable::ReachableSet;
use arbor_chain_core::{
    errors::StateAccessResult, AccountsTrie, BlockType, ChainStateAccess, ConductorCtl, Height, StateAccessError, TipInfo, VisitAction,
};
use arbor_hashes::Hash;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const BLOCK_HASH_BASE: u64 = 0xb10c_0000_0000;

/// An in-memory account-state trie snapshot: nodes keyed by hash, each with an
/// opaque body and child hashes. Shared subtrees across tries are expressed by
/// reusing node ids.
pub(crate) struct MockTrie {
    root: Hash,
    nodes: HashMap<Hash, (Vec<u8>, Vec<Hash>)>,
    visits: Mutex<Vec<Hash>>,
}

impl MockTrie {
    pub fn new(root: u64, edges: &[(u64, &[u64])]) -> Arc<Self> {
        let nodes = edges
            .iter()
            .map(|(id, children)| {
                (Hash::from(*id), (format!("node-{}", id).into_bytes(), children.iter().copied().map(Hash::from).collect()))
            })
            .collect();
        Arc::new(Self { root: Hash::from(root), nodes, visits: Default::default() })
    }

    /// The visitor invocations of the most recent traversal
    pub fn visits(&self) -> Vec<Hash> {
        self.visits.lock().clone()
    }

    fn walk(
        &self,
        hash: Hash,
        visitor: &mut dyn FnMut(Hash, &[u8]) -> VisitAction,
        seen: &mut HashSet<Hash>,
    ) -> StateAccessResult<()> {
        if !seen.insert(hash) {
            return Ok(());
        }
        let (body, children) = self.nodes.get(&hash).ok_or(StateAccessError::TrieUnavailable(hash))?;
        self.visits.lock().push(hash);
        if visitor(hash, body) == VisitAction::Continue {
            for child in children.clone() {
                self.walk(child, visitor, seen)?;
            }
        }
        Ok(())
    }
}

impl AccountsTrie for MockTrie {
    fn root(&self) -> Hash {
        self.root
    }

    fn visit_reachable(&self, visitor: &mut dyn FnMut(Hash, &[u8]) -> VisitAction) -> StateAccessResult<()> {
        self.visits.lock().clear();
        let mut seen = HashSet::new();
        self.walk(self.root, visitor, &mut seen)
    }
}

#[derive(Default)]
struct MockChainInner {
    tries: HashMap<Hash, Arc<MockTrie>>,
    heights: HashMap<Height, Hash>,
    tip: Option<TipInfo>,
    resolved: Vec<Height>,
}

/// A chain store stub mapping heights to canonical block hashes and block
/// hashes to account-state tries
#[derive(Default)]
pub(crate) struct MockChain {
    inner: Mutex<MockChainInner>,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Default::default()
    }

    pub fn set_trie(&self, height: Height, trie: Arc<MockTrie>) {
        let block_hash = Hash::from(BLOCK_HASH_BASE + height);
        let mut inner = self.inner.lock();
        inner.heights.insert(height, block_hash);
        inner.tries.insert(block_hash, trie);
    }

    pub fn remove_trie(&self, height: Height) {
        let mut inner = self.inner.lock();
        if let Some(block_hash) = inner.heights.remove(&height) {
            inner.tries.remove(&block_hash);
        }
    }

    pub fn set_tip(&self, block_type: BlockType, height: Height) {
        self.inner.lock().tip = Some(TipInfo::new(Hash::from(BLOCK_HASH_BASE + height), block_type, height));
    }

    pub fn trie_at(&self, height: Height) -> Arc<MockTrie> {
        let inner = self.inner.lock();
        inner.tries[&inner.heights[&height]].clone()
    }

    /// The heights resolved through `key_block_hash_at`, in call order
    pub fn resolved_heights(&self) -> Vec<Height> {
        self.inner.lock().resolved.clone()
    }
}

impl ChainStateAccess for MockChain {
    fn key_block_hash_at(&self, height: Height) -> StateAccessResult<Hash> {
        let mut inner = self.inner.lock();
        inner.resolved.push(height);
        inner.heights.get(&height).copied().ok_or(StateAccessError::HeightNotFound(height))
    }

    fn accounts_trie(&self, block_hash: Hash) -> StateAccessResult<Arc<dyn AccountsTrie>> {
        let inner = self.inner.lock();
        inner.tries.get(&block_hash).cloned().map(|trie| trie as Arc<dyn AccountsTrie>).ok_or(StateAccessError::TrieUnavailable(block_hash))
    }

    fn tip_info(&self) -> StateAccessResult<TipInfo> {
        self.inner.lock().tip.ok_or(StateAccessError::HeightNotFound(0))
    }
}

/// Records conductor control calls issued by the collector
#[derive(Default)]
pub(crate) struct MockConductor {
    terminated: AtomicBool,
    restarted: AtomicBool,
}

impl MockConductor {
    pub fn new() -> Arc<Self> {
        Default::default()
    }

    pub fn terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn restarted(&self) -> bool {
        self.restarted.load(Ordering::SeqCst)
    }
}

impl ConductorCtl for MockConductor {
    fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    fn restart_process(&self) {
        self.restarted.store(true, Ordering::SeqCst);
    }
}

/// The hashes currently captured by the set, in stable order
pub(crate) fn set_contents(set: &ReachableSet) -> BTreeSet<Hash> {
    let mut contents = BTreeSet::new();
    set.for_each(|hash, _| {
        contents.insert(hash);
    });
    contents
}
