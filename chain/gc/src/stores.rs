use arbor_database::prelude::{BatchDbWriter, CachedDbAccess, DbWriter, StoreResult, DB};
use arbor_database::registry::DatabaseStorePrefixes;
use arbor_hashes::Hash;
use rocksdb::WriteBatch;
use std::sync::Arc;

/// Reader API for an account-state node table
pub trait AccountStateStoreReader {
    fn get(&self, hash: Hash) -> StoreResult<Arc<Vec<u8>>>;
    fn has(&self, hash: Hash) -> StoreResult<bool>;
    fn first_key(&self) -> StoreResult<Option<Hash>>;
    fn is_empty(&self) -> StoreResult<bool>;
}

/// A DB store holding serialized account-state trie nodes keyed by hash.
///
/// The live table and the staging side table are two instances of this store
/// over different prefixes of the same DB, which keeps the row shape and the
/// backend flags of both tables identical by construction.
#[derive(Clone)]
pub struct DbAccountStateStore {
    access: CachedDbAccess<Hash, Arc<Vec<u8>>>,
}

impl DbAccountStateStore {
    pub fn new(db: Arc<DB>, cache_size: u64, prefix: DatabaseStorePrefixes) -> Self {
        Self { access: CachedDbAccess::new(db, cache_size, prefix.into()) }
    }

    pub fn iterator(&self) -> impl Iterator<Item = StoreResult<(Hash, Arc<Vec<u8>>)>> + '_ {
        self.access.iterator()
    }

    pub fn write_node(&self, writer: impl DbWriter, hash: Hash, node: Arc<Vec<u8>>) -> StoreResult<()> {
        self.access.write(writer, hash, node)
    }

    /// Bulk-writes rows without populating the cache
    pub fn write_rows(&self, writer: impl DbWriter, rows: &mut impl Iterator<Item = (Hash, Arc<Vec<u8>>)>) -> StoreResult<()> {
        self.access.write_many_without_cache(writer, rows)
    }

    /// Schedules a full table clear on the batch
    pub fn clear_batch(&self, batch: &mut WriteBatch) -> StoreResult<()> {
        self.access.delete_all(BatchDbWriter::new(batch))
    }
}

impl AccountStateStoreReader for DbAccountStateStore {
    fn get(&self, hash: Hash) -> StoreResult<Arc<Vec<u8>>> {
        self.access.read(hash)
    }

    fn has(&self, hash: Hash) -> StoreResult<bool> {
        self.access.has(hash)
    }

    fn first_key(&self) -> StoreResult<Option<Hash>> {
        Ok(self.iterator().next().transpose()?.map(|(hash, _)| hash))
    }

    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.first_key()?.is_none())
    }
}
