use crate::{
    errors::{GcError, GcResult},
    reachable::ReachableSet,
    stores::{AccountStateStoreReader, DbAccountStateStore},
};
use arbor_core::info;
use arbor_database::prelude::{BatchDbWriter, StoreResult, DB};
use arbor_database::registry::DatabaseStorePrefixes;
use rocksdb::{WriteBatch, WriteOptions};
use std::sync::Arc;

/// Persists a reachable set through the two-phase account-state swap.
///
/// Phase A (`stage`) runs on the live node at a quiescent point and writes the
/// set into the staging table. The controlled restart separates the phases.
/// Phase B (`promote`) runs on the next boot, before anything reads account
/// state, and replaces the live table with the staged rows.
pub struct SwapExecutor {
    db: Arc<DB>,
    live: DbAccountStateStore,
    staging: DbAccountStateStore,
}

impl SwapExecutor {
    pub fn new(db: Arc<DB>) -> Self {
        Self {
            live: DbAccountStateStore::new(db.clone(), 0, DatabaseStorePrefixes::AccountState),
            staging: DbAccountStateStore::new(db.clone(), 0, DatabaseStorePrefixes::AccountStateStaging),
            db,
        }
    }

    /// Phase A: writes every captured node into the staging table in one
    /// durable transaction and returns the row count. The live table is not
    /// touched; on failure staging carries no partial rows.
    pub fn stage(&self, reachable: &ReachableSet) -> GcResult<u64> {
        let rows = reachable.snapshot();
        let count = rows.len() as u64;
        let mut batch = WriteBatch::default();
        // Rebuilding from scratch keeps leftovers of an interrupted earlier
        // stage out of the table
        self.staging.clear_batch(&mut batch).map_err(GcError::StageFailed)?;
        self.staging.write_rows(BatchDbWriter::new(&mut batch), &mut rows.into_iter()).map_err(GcError::StageFailed)?;
        self.db.write_opt(batch, &sync_write_options()).map_err(|err| GcError::StageFailed(err.into()))?;
        Ok(count)
    }

    /// Phase B: replaces the live table with the staged rows, then drops the
    /// staging table. Returns `None` when there is nothing staged.
    ///
    /// The clear-and-refill is a single transaction, and staging is dropped
    /// only after that transaction commits, so a crash at any point is
    /// recovered by re-running promotion on the next boot.
    pub fn promote(&self) -> GcResult<Option<u64>> {
        self.promote_impl().map_err(GcError::PromoteFailed)
    }

    fn promote_impl(&self) -> StoreResult<Option<u64>> {
        if self.staging.is_empty()? {
            return Ok(None);
        }

        let rows = self.staging.iterator().collect::<StoreResult<Vec<_>>>()?;
        let count = rows.len() as u64;
        let mut batch = WriteBatch::default();
        self.live.clear_batch(&mut batch)?;
        self.live.write_rows(BatchDbWriter::new(&mut batch), &mut rows.into_iter())?;
        self.db.write_opt(batch, &sync_write_options())?;

        let mut drop_batch = WriteBatch::default();
        self.staging.clear_batch(&mut drop_batch)?;
        self.db.write_opt(drop_batch, &sync_write_options())?;
        Ok(Some(count))
    }

    pub fn live_store(&self) -> &DbAccountStateStore {
        &self.live
    }

    pub fn staging_store(&self) -> &DbAccountStateStore {
        &self.staging
    }
}

fn sync_write_options() -> WriteOptions {
    let mut opts = WriteOptions::default();
    opts.set_sync(true);
    opts
}

/// Startup hook: completes an in-progress account-state swap if the staging
/// table is present. Must run before any component reads account state.
pub fn maybe_swap_nodes(db: &Arc<DB>) -> GcResult<Option<u64>> {
    let promoted = SwapExecutor::new(db.clone()).promote()?;
    match promoted {
        Some(count) => info!("account-state swap completed: promoted {} nodes from staging", count),
        None => info!("no staged account state found, keeping the live table"),
    }
    Ok(promoted)
}
