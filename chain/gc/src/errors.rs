use arbor_chain_core::StateAccessError;
use arbor_database::prelude::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GcError {
    #[error("state access failed: {0}")]
    TrieUnavailable(#[from] StateAccessError),

    #[error("staging the reachable set failed: {0}")]
    StageFailed(StoreError),

    #[error("promoting the staged account state failed: {0}")]
    PromoteFailed(StoreError),

    #[error("garbage collection cannot run in the current controller state")]
    UnexpectedQuiesce,
}

pub type GcResult<T> = std::result::Result<T, GcError>;
