use crate::{
    block::{Height, TipInfo},
    errors::StateAccessResult,
};
use arbor_hashes::Hash;
use std::sync::Arc;

/// Flow control returned by a reachability visitor per visited trie node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitAction {
    /// Keep traversing into the subtree below the visited node
    Continue,
    /// Prune the traversal at the visited node, skipping its entire subtree
    Stop,
}

/// Read-only chain view required by the state GC. Implemented by the chain
/// store / block indexer which the node wires in.
pub trait ChainStateAccess: Send + Sync {
    /// Resolves a height to its canonical key-block hash
    fn key_block_hash_at(&self, height: Height) -> StateAccessResult<Hash>;

    /// Fetches the account-state trie of the block's world state
    fn accounts_trie(&self, block_hash: Hash) -> StateAccessResult<Arc<dyn AccountsTrie>>;

    /// The current top header
    fn tip_info(&self) -> StateAccessResult<TipInfo>;
}

pub type DynChainStateAccess = Arc<dyn ChainStateAccess>;

/// A read-only snapshot of one account-state MPT.
///
/// `visit_reachable` must invoke the visitor exactly once per node reachable
/// from the root and honor [`VisitAction::Stop`] by pruning the subtree rooted
/// at the visited node.
pub trait AccountsTrie: Send + Sync {
    fn root(&self) -> Hash;

    fn visit_reachable(&self, visitor: &mut dyn FnMut(Hash, &[u8]) -> VisitAction) -> StateAccessResult<()>;
}

/// Control handle over the node's conductor loop, used when a state swap
/// requires a controlled restart
pub trait ConductorCtl: Send + Sync {
    /// Cooperatively stop the conductor so no further blocks are produced or applied
    fn terminate(&self);

    /// Trigger the controlled process restart which completes a staged swap
    fn restart_process(&self);
}
