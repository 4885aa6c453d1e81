//! Runtime setup errors.
//!
//! Everything here fails before a sync run starts: a config value that
//! cannot be validated or a bridge implementation the host forgot to
//! inject. Runtime failures during a run use the sync-engine taxonomy
//! instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A setting failed validation (bad filter string, empty delay table,
    /// non-positive user id).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A required bridge implementation was not provided to the builder.
    #[error("missing {capability}: {message}")]
    CapabilityMissing { capability: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
