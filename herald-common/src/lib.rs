pub mod list;
pub mod logging;
pub mod message;
pub mod metadata;

pub use tracing;

/// Control signal broadcast to every long-running task.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
}
