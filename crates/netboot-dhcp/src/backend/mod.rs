//! The interface between the DHCP handlers and a host-record store.

pub mod file;
pub mod noop;

use async_trait::async_trait;
use dhcp_proto::MacAddress;
use thiserror::Error;

use crate::data::{Dhcp, Netboot};

/// Errors a backend read can produce.
#[derive(Debug, Error)]
pub enum BackendError {
    /// No record exists for this MAC. Handlers drop the packet silently.
    #[error("no record found for mac {mac}")]
    NotFound { mac: MacAddress },

    /// Temporary failure; the DHCP client will retry on its own.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// A read-only host-record lookup, keyed by MAC address.
///
/// Backends are pure lookups: safe for concurrent callers, no writes, no
/// subscriptions. Dropping the returned future cancels the read.
#[async_trait]
pub trait BackendReader: Send + Sync {
    /// Read the DHCP and netboot records for a MAC address.
    async fn read(&self, mac: MacAddress) -> Result<(Dhcp, Netboot), BackendError>;

    /// The name of the backend, for logging.
    fn name(&self) -> &'static str;
}
