use crate::block::{BlockType, Height};

/// Chain lifecycle events consumed by background services such as the state GC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainEvent {
    /// Fires once when initial sync completes
    Synced,
    /// Fires on every top update, including fork re-emits at the same or a lower height
    TopChanged { block_type: BlockType, height: Height },
}
