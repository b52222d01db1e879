//! A backend that refuses every read. Used when no backend is wired up.

use async_trait::async_trait;
use dhcp_proto::MacAddress;

use crate::backend::{BackendError, BackendReader};
use crate::data::{Dhcp, Netboot};

#[derive(Debug, Default, Clone, Copy)]
pub struct Noop;

#[async_trait]
impl BackendReader for Noop {
    async fn read(&self, _mac: MacAddress) -> Result<(Dhcp, Netboot), BackendError> {
        Err(BackendError::Unavailable(
            "no backend specified, please specify a backend".to_string(),
        ))
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_always_errors() {
        let mac: MacAddress = "01:02:03:04:05:06".parse().unwrap();
        let err = Noop.read(mac).await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)));
    }
}
