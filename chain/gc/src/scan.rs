use crate::reachable::ReachableSet;
use arbor_chain_core::{errors::StateAccessResult, AccountsTrie, DynChainStateAccess, Height};
use arbor_core::debug;
use std::sync::Arc;

/// Reachability scans over the account-state tries of a window of heights.
///
/// A full scan walks one entire trie; delta scans merge successor tries into
/// an existing set while pruning every subtree whose root is already captured.
#[derive(Clone)]
pub struct StateScanner {
    chain: DynChainStateAccess,
}

impl StateScanner {
    pub fn new(chain: DynChainStateAccess) -> Self {
        Self { chain }
    }

    /// Captures every node reachable from the account-state root at `height`
    /// into a fresh set
    pub fn full_scan(&self, height: Height) -> StateAccessResult<ReachableSet> {
        let reachable = ReachableSet::new();
        let trie = self.trie_at(height)?;
        debug!("state GC: full scan of trie {} at height {}", trie.root(), height);
        trie.visit_reachable(&mut |hash, node| reachable.store_hash(hash, node))?;
        Ok(reachable)
    }

    /// Merges the nodes of the trie at `height` into `reachable`. Subtrees
    /// whose root hash is already captured are skipped entirely.
    pub fn delta_scan(&self, height: Height, reachable: &ReachableSet) -> StateAccessResult<()> {
        let trie = self.trie_at(height)?;
        trie.visit_reachable(&mut |hash, node| reachable.store_unseen_hash(hash, node))
    }

    /// Applies a delta scan at each height in `(lo, hi]` in ascending order
    /// (earlier deltas reduce later work; the resulting union is order
    /// independent). A no-op when `hi <= lo`.
    pub fn range_scan(&self, lo: Height, hi: Height, reachable: &ReachableSet) -> StateAccessResult<()> {
        if hi <= lo {
            return Ok(());
        }
        for height in lo + 1..=hi {
            self.delta_scan(height, reachable)?;
        }
        Ok(())
    }

    fn trie_at(&self, height: Height) -> StateAccessResult<Arc<dyn AccountsTrie>> {
        let block_hash = self.chain.key_block_hash_at(height)?;
        self.chain.accounts_trie(block_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{set_contents, MockChain, MockTrie};
    use arbor_chain_core::StateAccessError;
    use arbor_hashes::Hash;

    #[test]
    fn test_full_scan_captures_whole_trie() {
        let chain = MockChain::new();
        // Diamond sharing: both 11 and 12 point at 13; it must be captured once
        chain.set_trie(7, MockTrie::new(10, &[(10, &[11, 12]), (11, &[13]), (12, &[13])]));
        let scanner = StateScanner::new(chain.clone());

        let reachable = scanner.full_scan(7).unwrap();
        assert_eq!(set_contents(&reachable), vec![10, 11, 12, 13].into_iter().map(Hash::from).collect());
        assert_eq!(chain.trie_at(7).visits(), vec![10.into(), 11.into(), 13.into(), 12.into()]);
    }

    #[test]
    fn test_delta_scan_prunes_captured_subtrees() {
        let chain = MockChain::new();
        chain.set_trie(7, MockTrie::new(10, &[(10, &[11, 12]), (11, &[13]), (12, &[])]));
        // Height 8 keeps the subtree under 11 and introduces 20 and 14
        chain.set_trie(8, MockTrie::new(20, &[(20, &[11, 14]), (11, &[13]), (14, &[])]));
        let scanner = StateScanner::new(chain.clone());

        let reachable = scanner.full_scan(7).unwrap();
        scanner.delta_scan(8, &reachable).unwrap();

        assert_eq!(set_contents(&reachable), vec![10, 11, 12, 13, 14, 20].into_iter().map(Hash::from).collect());
        // 11 is visited once more (and pruned there); its child 13 is never re-walked
        assert_eq!(chain.trie_at(8).visits(), vec![20.into(), 11.into(), 14.into()]);
    }

    #[test]
    fn test_delta_scan_is_idempotent() {
        let chain = MockChain::new();
        chain.set_trie(8, MockTrie::new(20, &[(20, &[21]), (21, &[])]));
        let scanner = StateScanner::new(chain.clone());

        let reachable = ReachableSet::new();
        scanner.delta_scan(8, &reachable).unwrap();
        let first = set_contents(&reachable);
        scanner.delta_scan(8, &reachable).unwrap();
        assert_eq!(set_contents(&reachable), first);
    }

    #[test]
    fn test_range_scan_union_is_order_independent() {
        let chain = MockChain::new();
        chain.set_trie(8, MockTrie::new(20, &[(20, &[11]), (11, &[])]));
        chain.set_trie(9, MockTrie::new(30, &[(30, &[11, 31]), (31, &[])]));
        let scanner = StateScanner::new(chain.clone());

        let ascending = ReachableSet::new();
        scanner.range_scan(7, 9, &ascending).unwrap();

        let descending = ReachableSet::new();
        scanner.delta_scan(9, &descending).unwrap();
        scanner.delta_scan(8, &descending).unwrap();

        assert_eq!(set_contents(&ascending), set_contents(&descending));
    }

    #[test]
    fn test_range_scan_walks_ascending() {
        let chain = MockChain::new();
        for height in 8..=10 {
            chain.set_trie(height, MockTrie::new(height * 10, &[(height * 10, &[])]));
        }
        let scanner = StateScanner::new(chain.clone());

        let reachable = ReachableSet::new();
        scanner.range_scan(7, 10, &reachable).unwrap();
        assert_eq!(chain.resolved_heights(), vec![8, 9, 10]);
    }

    #[test]
    fn test_empty_range_is_a_noop() {
        // No tries registered at all, so any attempted height would fail
        let scanner = StateScanner::new(MockChain::new());
        let reachable = ReachableSet::new();
        scanner.range_scan(5, 5, &reachable).unwrap();
        scanner.range_scan(9, 3, &reachable).unwrap();
        assert!(reachable.is_empty());
    }

    #[test]
    fn test_unavailable_height_fails_the_scan() {
        let chain = MockChain::new();
        chain.set_trie(8, MockTrie::new(20, &[(20, &[])]));
        let scanner = StateScanner::new(chain.clone());

        assert_eq!(scanner.full_scan(7).unwrap_err(), StateAccessError::HeightNotFound(7));

        // A failing height inside a range leaves the set with only the heights merged before it
        let reachable = ReachableSet::new();
        assert!(scanner.range_scan(7, 9, &reachable).is_err());
        assert_eq!(set_contents(&reachable), vec![20.into()].into_iter().collect());
    }
}
