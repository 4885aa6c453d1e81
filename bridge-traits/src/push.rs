//! Push Transport Abstraction
//!
//! A duplex text-message channel to the backend's notification service.
//! Every frame is a JSON object with an `event` field; the push channel in
//! the engine layers its connect/subscribe state machine on top of this
//! transport.

use crate::error::Result;
use async_trait::async_trait;

/// An open duplex connection.
#[async_trait]
pub trait PushSocket: Send {
    /// Send one text frame.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Receive the next text frame.
    ///
    /// Returns `None` when the connection is closed, cleanly or not.
    async fn next(&mut self) -> Option<String>;

    /// Close the connection.
    async fn close(&mut self);
}

/// Factory for push connections.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open a new connection to the notification endpoint.
    async fn connect(&self) -> Result<Box<dyn PushSocket>>;
}
