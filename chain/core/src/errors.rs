use crate::block::Height;
use arbor_hashes::Hash;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateAccessError {
    #[error("no key block is indexed at height {0}")]
    HeightNotFound(Height),

    #[error("account-state trie for block {0} is unavailable")]
    TrieUnavailable(Hash),
}

pub type StateAccessResult<T> = std::result::Result<T, StateAccessError>;
