//! Kernel error types.

use agentlink_types::error::LinkError;
use thiserror::Error;

/// Errors raised while assembling or running the kernel.
#[derive(Error, Debug)]
pub enum KernelError {
    /// Propagated from the wire or types layer.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// The configuration cannot produce a working node.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The heartbeat identity key could not be loaded.
    #[error("Identity error: {0}")]
    Identity(String),

    /// The kernel failed to boot.
    #[error("Boot failed: {0}")]
    BootFailed(String),
}

/// Alias for kernel results.
pub type KernelResult<T> = Result<T, KernelError>;
