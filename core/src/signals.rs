use std::sync::Arc;

/// Implemented by components which can be cooperatively shut down from another thread
pub trait Shutdown {
    fn shutdown(self: &Arc<Self>);
}
