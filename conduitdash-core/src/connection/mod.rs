//! Session management and remote command execution
//!
//! [`ConnectionRegistry`] keeps at most one live session per host and
//! reconnects on demand. [`CommandExecutor`] runs commands through it with a
//! timeout and evicts the session on any failure.

mod executor;
mod registry;

pub use executor::{CommandExecutor, DEFAULT_EXEC_TIMEOUT_SECS};
pub use registry::ConnectionRegistry;
