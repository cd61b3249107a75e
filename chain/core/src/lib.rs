pub mod api;
pub mod block;
pub mod errors;
pub mod events;

pub use api::{AccountsTrie, ChainStateAccess, ConductorCtl, DynChainStateAccess, VisitAction};
pub use block::{BlockType, Height, TipInfo};
pub use errors::StateAccessError;
pub use events::ChainEvent;
