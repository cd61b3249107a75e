use crate::db::DB;
use rocksdb::{DBWithThreadMode, MultiThreaded};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ConnBuilder {
    db_path: PathBuf,
    create_if_missing: bool,
    parallelism: usize,
    files_limit: i32,
    mem_budget: usize,
}

impl Default for ConnBuilder {
    fn default() -> Self {
        ConnBuilder {
            db_path: PathBuf::default(),
            create_if_missing: true,
            parallelism: 1,
            files_limit: 500,
            mem_budget: 64 * 1024 * 1024,
        }
    }
}

impl ConnBuilder {
    pub fn with_db_path(mut self, db_path: PathBuf) -> Self {
        self.db_path = db_path;
        self
    }

    pub fn with_create_if_missing(mut self, create_if_missing: bool) -> Self {
        self.create_if_missing = create_if_missing;
        self
    }

    pub fn with_parallelism(mut self, parallelism: impl Into<usize>) -> Self {
        self.parallelism = parallelism.into();
        self
    }

    pub fn with_files_limit(mut self, files_limit: impl Into<i32>) -> Self {
        self.files_limit = files_limit.into();
        self
    }

    pub fn with_mem_budget(mut self, mem_budget: impl Into<usize>) -> Self {
        self.mem_budget = mem_budget.into();
        self
    }

    pub fn build(self) -> Result<Arc<DB>, rocksdb::Error> {
        let mut opts = rocksdb::Options::default();
        if self.parallelism > 1 {
            opts.increase_parallelism(self.parallelism as i32);
        }
        opts.optimize_level_style_compaction(self.mem_budget);
        opts.set_max_open_files(self.files_limit);
        opts.create_if_missing(self.create_if_missing);
        let db = <DBWithThreadMode<MultiThreaded>>::open(&opts, &self.db_path)?;
        Ok(Arc::new(DB::new(db)))
    }
}
