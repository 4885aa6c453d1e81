//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the sync engine:
//! - Logging and tracing infrastructure
//! - Configuration management and tuning constants
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the engine crates depend on. It
//! establishes the logging conventions, the event broadcasting mechanism and
//! the configuration surface through which hosts inject their bridge
//! implementations.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, SyncTuning};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream, SyncEvent};
