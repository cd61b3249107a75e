use rocksdb::{DBWithThreadMode, MultiThreaded};
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;

pub use conn_builder::ConnBuilder;

mod conn_builder;

/// The DB type used for Arbor stores
pub struct DB {
    inner: DBWithThreadMode<MultiThreaded>,
}

impl DB {
    pub fn new(inner: DBWithThreadMode<MultiThreaded>) -> Self {
        Self { inner }
    }
}

impl DerefMut for DB {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl Deref for DB {
    type Target = DBWithThreadMode<MultiThreaded>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Deletes an existing DB if it exists
pub fn delete_db(db_dir: PathBuf) -> Result<(), rocksdb::Error> {
    if !db_dir.exists() {
        return Ok(());
    }
    let options = rocksdb::Options::default();
    <DBWithThreadMode<MultiThreaded>>::destroy(&options, db_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::get_arbor_tempdir;

    #[test]
    fn test_delete_db() {
        let tempdir = get_arbor_tempdir().unwrap();
        let path = tempdir.path().join("db");
        {
            let _db = ConnBuilder::default().with_files_limit(10).with_db_path(path.clone()).build().unwrap();
        }
        assert!(path.exists());
        delete_db(path.clone()).unwrap();
        // Deleting a non-existing DB is also fine
        delete_db(path).unwrap();
    }
}
