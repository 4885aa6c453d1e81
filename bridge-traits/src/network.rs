//! Network Monitoring Abstraction
//!
//! Connectivity signal used to short-circuit sync runs with a no-network
//! failure instead of burning a request.

use crate::error::Result;
use async_trait::async_trait;

/// Network connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Connected,
    Disconnected,
    /// Status unknown or indeterminate; treated as connected.
    Indeterminate,
}

/// Network monitor trait
///
/// Lets the engine defer or fail sync operations when offline. Hosts back
/// this with their platform connectivity APIs.
#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    /// Get the current network status.
    async fn network_status(&self) -> Result<NetworkStatus>;

    /// Check if currently connected to any network. Indeterminate status
    /// counts as connected; the request itself will tell.
    async fn is_connected(&self) -> bool {
        !matches!(
            self.network_status().await,
            Ok(NetworkStatus::Disconnected)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedMonitor(NetworkStatus);

    #[async_trait]
    impl NetworkMonitor for FixedMonitor {
        async fn network_status(&self) -> Result<NetworkStatus> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn test_is_connected_default() {
        assert!(FixedMonitor(NetworkStatus::Connected).is_connected().await);
        assert!(
            FixedMonitor(NetworkStatus::Indeterminate)
                .is_connected()
                .await
        );
        assert!(
            !FixedMonitor(NetworkStatus::Disconnected)
                .is_connected()
                .await
        );
    }
}
