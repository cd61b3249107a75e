use arbor_hashes::Hash;

/// Chain height. Monotone along the main chain but may step sideways or down
/// across a short fork.
pub type Height = u64;

/// Key blocks advance consensus height; micro blocks only bundle transactions
/// and leave the account-state root of interest unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Key,
    Micro,
}

/// The chain's current top header, as far as the GC is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TipInfo {
    pub hash: Hash,
    pub block_type: BlockType,
    pub height: Height,
}

impl TipInfo {
    pub fn new(hash: Hash, block_type: BlockType, height: Height) -> Self {
        Self { hash, block_type, height }
    }
}
