use crate::{
    config::StateGcConfig,
    errors::{GcError, GcResult},
    reachable::ReachableSet,
    scan::StateScanner,
    swap::SwapExecutor,
};
use arbor_chain_core::{errors::StateAccessResult, BlockType, ChainEvent, ConductorCtl, DynChainStateAccess, Height};
use arbor_core::{core::Core, debug, info, service::Service, warn};
use arbor_database::prelude::DB;
use crossbeam_channel::{unbounded, Receiver as CrossbeamReceiver, Sender as CrossbeamSender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

const STATE_GC: &str = "state-gc";

pub enum StateGcMessage {
    ChainSynced,
    TopChanged { block_type: BlockType, height: Height },
    ScanDone { reachable: ReachableSet, base: Height, top: Height },
    ScanFailed,
    Exit,
}

/// Outcome of the conductor's quiescence call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcDecision {
    /// A swap was staged; the conductor is terminated and a restart is under way
    Restarting,
    /// Nothing was collected and the chain may keep progressing
    Nop,
}

enum GcState {
    /// Waiting for sync completion and then for the next interval boundary
    Idle { synced: bool },
    /// A background worker is scanning the window `[base, top]`
    Scanning { base: Height, top: Height },
    /// The reachable set is live and maintained incrementally
    Ready { last_height: Height, reachable: ReachableSet },
    /// The set has been staged; terminal until the process restarts
    Swapping,
}

impl Default for GcState {
    fn default() -> Self {
        GcState::Idle { synced: false }
    }
}

/// The account-state GC controller.
///
/// A single worker thread drains the mailbox one event at a time; delta scans
/// run inline on that thread so they are serialized with `TopChanged`
/// ordering. The one long operation, the initial full scan over the history
/// window, is delegated to a one-shot background thread which hands the owned
/// set back through a `ScanDone` message and exits. The controller state lock
/// also serializes event dispatch with the conductor's synchronous
/// [`maybe_garbage_collect`](Self::maybe_garbage_collect) call.
pub struct StateGcProcessor {
    // Channels
    sender: CrossbeamSender<StateGcMessage>,
    receiver: CrossbeamReceiver<StateGcMessage>,

    // Services
    chain: DynChainStateAccess,
    conductor: Arc<dyn ConductorCtl>,
    scanner: StateScanner,
    swap: SwapExecutor,

    // Config
    config: StateGcConfig,

    // Controller state
    state: Mutex<GcState>,
}

impl StateGcProcessor {
    pub fn new(db: Arc<DB>, chain: DynChainStateAccess, conductor: Arc<dyn ConductorCtl>, config: StateGcConfig) -> Arc<Self> {
        let (sender, receiver) = unbounded();
        Arc::new(Self {
            sender,
            receiver,
            scanner: StateScanner::new(chain.clone()),
            swap: SwapExecutor::new(db),
            chain,
            conductor,
            config,
            state: Mutex::new(GcState::default()),
        })
    }

    /// Entry point for the node's event fan-out
    pub fn notify(&self, event: ChainEvent) {
        let msg = match event {
            ChainEvent::Synced => StateGcMessage::ChainSynced,
            ChainEvent::TopChanged { block_type, height } => StateGcMessage::TopChanged { block_type, height },
        };
        let _ = self.sender.send(msg);
    }

    pub fn signal_exit(&self) {
        let _ = self.sender.send(StateGcMessage::Exit);
    }

    pub fn worker(self: &Arc<Self>) {
        while let Ok(msg) = self.receiver.recv() {
            match msg {
                StateGcMessage::Exit => break,
                msg => self.dispatch(msg),
            }
        }
    }

    /// The conductor's quiescence call, linearized with event dispatch through
    /// the state lock. Returns [`GcDecision::Restarting`] only after the
    /// reachable set was staged durably and the restart was triggered.
    pub fn maybe_garbage_collect(&self) -> GcDecision {
        if !self.config.enabled {
            return GcDecision::Nop;
        }
        let mut state = self.state.lock();
        match self.try_garbage_collect(&mut state) {
            Ok(decision) => decision,
            Err(GcError::UnexpectedQuiesce) => {
                debug!("state GC: quiescence call ignored, the collector is not ready");
                GcDecision::Nop
            }
            Err(err) => {
                warn!("state GC: collection aborted, the chain resumes untouched: {}", err);
                GcDecision::Nop
            }
        }
    }

    fn try_garbage_collect(&self, state: &mut GcState) -> GcResult<GcDecision> {
        let GcState::Ready { last_height, reachable } = state else {
            return Err(GcError::UnexpectedQuiesce);
        };
        let tip = self.chain.tip_info()?;
        if tip.block_type != BlockType::Key {
            return Ok(GcDecision::Nop);
        }

        // Close the window up to the quiescent tip before persisting
        self.scanner.range_scan(*last_height, tip.height, reachable)?;
        *last_height = tip.height;

        let count = self.swap.stage(reachable)?;
        info!("state GC: staged {} account-state nodes at height {}, restarting to swap", count, tip.height);
        *state = GcState::Swapping;
        self.conductor.terminate();
        self.conductor.restart_process();
        Ok(GcDecision::Restarting)
    }

    fn dispatch(&self, msg: StateGcMessage) {
        if !self.config.enabled {
            return;
        }
        let mut state = self.state.lock();
        match msg {
            StateGcMessage::ChainSynced => self.handle_chain_synced(&mut state),
            StateGcMessage::TopChanged { block_type, height } => self.handle_top_changed(&mut state, block_type, height),
            StateGcMessage::ScanDone { reachable, base, top } => self.handle_scan_done(&mut state, reachable, base, top),
            StateGcMessage::ScanFailed => self.handle_scan_failed(&mut state),
            StateGcMessage::Exit => {}
        }
    }

    fn handle_chain_synced(&self, state: &mut GcState) {
        if let GcState::Idle { synced } = state {
            if !*synced {
                debug!("state GC: armed, chain sync completed");
            }
            *synced = true;
        }
    }

    fn handle_top_changed(&self, state: &mut GcState, block_type: BlockType, height: Height) {
        match state {
            GcState::Idle { synced: true } if height % self.config.interval == 0 => {
                let base = height.saturating_sub(self.config.history);
                *state = GcState::Scanning { base, top: height };
                self.spawn_scan_worker(base, height);
            }
            GcState::Ready { last_height, reachable } => {
                if block_type == BlockType::Micro {
                    return;
                }
                if height > *last_height {
                    match self.scanner.range_scan(*last_height, height, reachable) {
                        Ok(()) => *last_height = height,
                        Err(err) => {
                            warn!("state GC: incremental scan up to height {} failed, retrying on the next top change: {}", height, err)
                        }
                    }
                } else {
                    // A fork re-emitted the top at the same or a lower height.
                    // The set is a union over the whole window, so merging the
                    // branch without removing anything keeps every retained
                    // root covered even if the reorg is later reverted.
                    if *last_height - height > self.config.history {
                        warn!("state GC: reorg to height {} is deeper than the history window ending at {}", height, *last_height);
                    }
                    if let Err(err) = self.scanner.delta_scan(height, reachable) {
                        warn!("state GC: fork delta scan at height {} failed: {}", height, err);
                    }
                }
            }
            _ => {}
        }
    }

    fn handle_scan_done(&self, state: &mut GcState, reachable: ReachableSet, base: Height, top: Height) {
        // Only adopt the set the currently pending scan produced
        if let GcState::Scanning { base: pending_base, top: pending_top } = state {
            if (*pending_base, *pending_top) == (base, top) {
                info!("state GC: captured {} reachable account-state nodes over heights {}..={}", reachable.len(), base, top);
                *state = GcState::Ready { last_height: top, reachable };
            }
        }
    }

    fn handle_scan_failed(&self, state: &mut GcState) {
        if let GcState::Scanning { .. } = state {
            // The next interval boundary retries from scratch
            *state = GcState::Idle { synced: true };
        }
    }

    fn spawn_scan_worker(&self, base: Height, top: Height) {
        info!("state GC: starting background account-state scan over heights {}..={}", base, top);
        let scanner = self.scanner.clone();
        let sender = self.sender.clone();
        thread::Builder::new()
            .name("state-gc-scan".to_string())
            .spawn(move || {
                let msg = match scan_window(&scanner, base, top) {
                    Ok(reachable) => StateGcMessage::ScanDone { reachable, base, top },
                    Err(err) => {
                        warn!("state GC: background scan failed: {}", err);
                        StateGcMessage::ScanFailed
                    }
                };
                let _ = sender.send(msg);
            })
            .unwrap();
    }
}

fn scan_window(scanner: &StateScanner, base: Height, top: Height) -> StateAccessResult<ReachableSet> {
    let reachable = scanner.full_scan(base)?;
    scanner.range_scan(base, top, &reachable)?;
    Ok(reachable)
}

impl Service for StateGcProcessor {
    fn ident(self: Arc<Self>) -> &'static str {
        STATE_GC
    }

    fn start(self: Arc<Self>, _core: Arc<Core>) -> Vec<JoinHandle<()>> {
        let processor = self.clone();
        vec![thread::Builder::new().name(STATE_GC.to_string()).spawn(move || processor.worker()).unwrap()]
    }

    fn stop(self: Arc<Self>) {
        self.signal_exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::AccountStateStoreReader;
    use crate::testutils::{set_contents, MockChain, MockConductor, MockTrie};
    use arbor_database::create_temp_db;
    use arbor_database::prelude::ConnBuilder;
    use arbor_database::utils::DbLifetime;
    use arbor_hashes::Hash;
    use std::collections::BTreeSet;
    use std::time::Duration;

    struct Harness {
        processor: Arc<StateGcProcessor>,
        chain: Arc<MockChain>,
        conductor: Arc<MockConductor>,
        db: Arc<DB>,
        _lifetime: DbLifetime,
    }

    fn setup(enabled: bool, interval: u64, history: u64) -> Harness {
        arbor_core::log::try_init_logger(arbor_core::log::LevelFilter::Info);
        let (_lifetime, db) = create_temp_db!(ConnBuilder::default().with_files_limit(10)).unwrap();
        let chain = MockChain::new();
        let conductor = MockConductor::new();
        let processor =
            StateGcProcessor::new(db.clone(), chain.clone(), conductor.clone(), StateGcConfig::new(enabled, interval, history));
        Harness { processor, chain, conductor, db, _lifetime }
    }

    /// Installs distinct single-node tries for each height in the window
    fn install_window_tries(chain: &MockChain, heights: impl Iterator<Item = u64>) {
        for height in heights {
            chain.set_trie(height, MockTrie::new(height * 10, &[(height * 10, &[])]));
        }
    }

    fn window_hashes(heights: impl Iterator<Item = u64>) -> BTreeSet<Hash> {
        heights.map(|height| Hash::from(height * 10)).collect()
    }

    /// Forwards the scan worker's completion message to the controller
    fn pump_scan_result(harness: &Harness) {
        let msg = harness.processor.receiver.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(matches!(msg, StateGcMessage::ScanDone { .. } | StateGcMessage::ScanFailed));
        harness.processor.dispatch(msg);
    }

    fn assert_ready_at(harness: &Harness, expected_height: Height, expected_contents: &BTreeSet<Hash>) {
        let state = harness.processor.state.lock();
        match &*state {
            GcState::Ready { last_height, reachable } => {
                assert_eq!(*last_height, expected_height);
                assert_eq!(&set_contents(reachable), expected_contents);
            }
            _ => panic!("controller is expected to be in Ready"),
        }
    }

    /// Drives a fresh harness to `Ready` at height 10 with `interval=10, history=3`
    fn ready_harness() -> Harness {
        let harness = setup(true, 10, 3);
        install_window_tries(&harness.chain, 7..=10);
        harness.processor.dispatch(StateGcMessage::ChainSynced);
        harness.processor.dispatch(StateGcMessage::TopChanged { block_type: BlockType::Key, height: 10 });
        pump_scan_result(&harness);
        harness
    }

    #[test]
    fn test_happy_path_scan_window() {
        let harness = ready_harness();
        assert_ready_at(&harness, 10, &window_hashes(7..=10));
        // Full scan at base 7, then deltas strictly ascending through the window
        assert_eq!(harness.chain.resolved_heights(), vec![7, 8, 9, 10]);
    }

    #[test]
    fn test_scan_requires_sync() {
        let harness = setup(true, 10, 3);
        install_window_tries(&harness.chain, 7..=10);
        harness.processor.dispatch(StateGcMessage::TopChanged { block_type: BlockType::Key, height: 10 });
        assert!(matches!(&*harness.processor.state.lock(), GcState::Idle { synced: false }));
    }

    #[test]
    fn test_scan_requires_interval_boundary() {
        let harness = setup(true, 10, 3);
        install_window_tries(&harness.chain, 6..=9);
        harness.processor.dispatch(StateGcMessage::ChainSynced);
        harness.processor.dispatch(StateGcMessage::TopChanged { block_type: BlockType::Key, height: 9 });
        assert!(matches!(&*harness.processor.state.lock(), GcState::Idle { synced: true }));
    }

    #[test]
    fn test_disabled_config_ignores_everything() {
        let harness = setup(false, 10, 3);
        install_window_tries(&harness.chain, 7..=10);
        harness.chain.set_tip(BlockType::Key, 10);
        harness.processor.dispatch(StateGcMessage::ChainSynced);
        harness.processor.dispatch(StateGcMessage::TopChanged { block_type: BlockType::Key, height: 10 });
        assert!(matches!(&*harness.processor.state.lock(), GcState::Idle { synced: false }));
        assert_eq!(harness.processor.maybe_garbage_collect(), GcDecision::Nop);
    }

    #[test]
    fn test_micro_blocks_are_ignored_in_ready() {
        let harness = ready_harness();
        harness.processor.dispatch(StateGcMessage::TopChanged { block_type: BlockType::Micro, height: 11 });
        assert_ready_at(&harness, 10, &window_hashes(7..=10));
    }

    #[test]
    fn test_key_blocks_extend_the_window() {
        let harness = ready_harness();
        install_window_tries(&harness.chain, 11..=12);
        harness.processor.dispatch(StateGcMessage::TopChanged { block_type: BlockType::Key, height: 12 });
        assert_ready_at(&harness, 12, &window_hashes(7..=12));
    }

    #[test]
    fn test_fork_reemit_runs_single_delta() {
        let harness = ready_harness();
        // The fork branch re-commits height 10 with an additional node
        harness.chain.set_trie(10, MockTrie::new(100, &[(100, &[555]), (555, &[])]));
        harness.processor.dispatch(StateGcMessage::TopChanged { block_type: BlockType::Key, height: 10 });

        let mut expected = window_hashes(7..=10);
        expected.insert(555.into());
        // last_height is unchanged and nothing was removed from the union
        assert_ready_at(&harness, 10, &expected);
        assert_eq!(harness.chain.resolved_heights(), vec![7, 8, 9, 10, 10]);
    }

    #[test]
    fn test_failed_incremental_scan_retries_on_next_top() {
        let harness = ready_harness();
        harness.processor.dispatch(StateGcMessage::TopChanged { block_type: BlockType::Key, height: 11 });
        // Height 11 has no trie yet: last_height must stay at 10 so the gap is retried
        assert_ready_at(&harness, 10, &window_hashes(7..=10));

        install_window_tries(&harness.chain, 11..=11);
        harness.processor.dispatch(StateGcMessage::TopChanged { block_type: BlockType::Key, height: 11 });
        assert_ready_at(&harness, 11, &window_hashes(7..=11));
    }

    #[test]
    fn test_failed_background_scan_returns_to_idle_and_retries() {
        let harness = setup(true, 10, 3);
        // Base height 7 is missing, so the background scan must fail
        install_window_tries(&harness.chain, 8..=10);
        harness.processor.dispatch(StateGcMessage::ChainSynced);
        harness.processor.dispatch(StateGcMessage::TopChanged { block_type: BlockType::Key, height: 10 });
        pump_scan_result(&harness);
        assert!(matches!(&*harness.processor.state.lock(), GcState::Idle { synced: true }));

        // The next interval boundary retries from scratch
        install_window_tries(&harness.chain, 17..=20);
        harness.processor.dispatch(StateGcMessage::TopChanged { block_type: BlockType::Key, height: 20 });
        pump_scan_result(&harness);
        assert_ready_at(&harness, 20, &window_hashes(17..=20));
    }

    #[test]
    fn test_quiesce_on_key_top_stages_and_restarts() {
        let harness = ready_harness();
        harness.chain.set_tip(BlockType::Key, 10);

        assert_eq!(harness.processor.maybe_garbage_collect(), GcDecision::Restarting);
        assert!(harness.conductor.terminated());
        assert!(harness.conductor.restarted());
        assert!(matches!(&*harness.processor.state.lock(), GcState::Swapping));

        let staged: BTreeSet<Hash> =
            harness.processor.swap.staging_store().iterator().map(|row| row.unwrap().0).collect();
        assert_eq!(staged, window_hashes(7..=10));

        // The controller is terminal until restart: a second call is a nop
        assert_eq!(harness.processor.maybe_garbage_collect(), GcDecision::Nop);
    }

    #[test]
    fn test_quiesce_closes_the_window_to_the_tip() {
        let harness = ready_harness();
        install_window_tries(&harness.chain, 11..=12);
        harness.chain.set_tip(BlockType::Key, 12);

        assert_eq!(harness.processor.maybe_garbage_collect(), GcDecision::Restarting);
        let staged: BTreeSet<Hash> =
            harness.processor.swap.staging_store().iterator().map(|row| row.unwrap().0).collect();
        assert_eq!(staged, window_hashes(7..=12));
    }

    #[test]
    fn test_quiesce_on_micro_top_is_a_nop() {
        let harness = ready_harness();
        harness.chain.set_tip(BlockType::Micro, 11);

        assert_eq!(harness.processor.maybe_garbage_collect(), GcDecision::Nop);
        assert!(!harness.conductor.terminated());
        assert!(harness.processor.swap.staging_store().is_empty().unwrap());
        assert_ready_at(&harness, 10, &window_hashes(7..=10));
    }

    #[test]
    fn test_quiesce_before_ready_is_a_nop() {
        let harness = setup(true, 10, 3);
        harness.chain.set_tip(BlockType::Key, 10);
        assert_eq!(harness.processor.maybe_garbage_collect(), GcDecision::Nop);
        assert!(matches!(&*harness.processor.state.lock(), GcState::Idle { synced: false }));
        assert!(!harness.conductor.terminated());
    }

    #[test]
    fn test_reachable_set_growth_is_monotone() {
        let harness = ready_harness();
        let mut previous = set_contents(match &*harness.processor.state.lock() {
            GcState::Ready { reachable, .. } => reachable,
            _ => panic!("controller is expected to be in Ready"),
        });

        install_window_tries(&harness.chain, 11..=14);
        for height in 11..=14 {
            harness.processor.dispatch(StateGcMessage::TopChanged { block_type: BlockType::Key, height });
            let state = harness.processor.state.lock();
            let GcState::Ready { reachable, .. } = &*state else { panic!("controller is expected to be in Ready") };
            let current = set_contents(reachable);
            assert!(current.is_superset(&previous));
            previous = current;
        }
    }

    #[test]
    fn test_staged_swap_promotes_on_next_boot() {
        let harness = ready_harness();
        harness.chain.set_tip(BlockType::Key, 10);
        assert_eq!(harness.processor.maybe_garbage_collect(), GcDecision::Restarting);

        // Simulated restart: the startup hook promotes staging into the live table
        assert_eq!(crate::swap::maybe_swap_nodes(&harness.db).unwrap(), Some(4));
        let executor = SwapExecutor::new(harness.db.clone());
        assert!(executor.staging_store().is_empty().unwrap());
        let live: BTreeSet<Hash> = executor.live_store().iterator().map(|row| row.unwrap().0).collect();
        assert_eq!(live, window_hashes(7..=10));
    }

    #[test]
    fn test_worker_thread_end_to_end() {
        use arbor_core::signals::Shutdown;

        let harness = ready_harness();
        // Hand the mailbox over to a real worker thread owned by the service core
        let core = Arc::new(Core::new());
        core.bind(harness.processor.clone());
        let workers = core.start();

        install_window_tries(&harness.chain, 11..=11);
        harness.processor.notify(ChainEvent::TopChanged { block_type: BlockType::Key, height: 11 });

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        loop {
            {
                let state = harness.processor.state.lock();
                if matches!(&*state, GcState::Ready { last_height: 11, .. }) {
                    break;
                }
            }
            assert!(std::time::Instant::now() < deadline, "worker did not process the event in time");
            std::thread::sleep(Duration::from_millis(10));
        }

        core.shutdown();
        core.join(workers);
    }
}
