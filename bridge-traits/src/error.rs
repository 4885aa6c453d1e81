//! Errors reported by host-side bridge implementations.
//!
//! The engine converts every `BridgeError` surfacing from a store or
//! transport call into its own fatal taxonomy; the variants here only need
//! to say which side of the bridge gave up.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// The host did not wire up the capability this call needs.
    #[error("host capability not available: {0}")]
    NotAvailable(String),

    /// The bridge call itself failed (socket closed, transfer aborted).
    #[error("bridge operation failed: {0}")]
    OperationFailed(String),

    /// The local replica rejected or could not complete a transaction.
    #[error("local store error: {0}")]
    StoreError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
