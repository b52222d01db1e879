//! A backend that serves host records from a YAML file, loaded once at
//! startup. File watching and live reload stay out of this library.
//!
//! The document is a map of MAC address to host record:
//!
//! ```yaml
//! 01:02:03:04:05:06:
//!   ipAddress: 192.168.2.150
//!   subnetMask: 255.255.255.0
//!   defaultGateway: 192.168.2.1
//!   nameServers: [1.1.1.1, 8.8.8.8]
//!   hostname: sled-42
//!   leaseTime: 86400
//!   netboot:
//!     allowPxe: true
//!     ipxeScriptUrl: http://boot.example.org/auto.ipxe
//!     vlan: "100"
//! ```

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::Path;

use async_trait::async_trait;
use dhcp_proto::MacAddress;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::backend::{BackendError, BackendReader};
use crate::data::{Dhcp, Netboot};

/// Errors loading the record file.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("failed to read record file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid record file format: {0}")]
    Format(#[from] serde_yaml::Error),
    #[error("invalid MAC address key: {0:?}")]
    InvalidMac(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HostEntry {
    ip_address: Ipv4Addr,
    subnet_mask: Ipv4Addr,
    #[serde(default)]
    default_gateway: Option<Ipv4Addr>,
    #[serde(default)]
    name_servers: Vec<Ipv4Addr>,
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    domain_name: Option<String>,
    #[serde(default)]
    broadcast_address: Option<Ipv4Addr>,
    #[serde(default)]
    ntp_servers: Vec<Ipv4Addr>,
    #[serde(default)]
    lease_time: u32,
    #[serde(default)]
    domain_search: Vec<String>,
    #[serde(default)]
    netboot: NetbootEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetbootEntry {
    #[serde(default)]
    allow_pxe: bool,
    #[serde(default)]
    ipxe_script_url: Option<Url>,
    #[serde(default)]
    vlan: Option<String>,
}

/// An immutable, in-memory view of a host-record file.
#[derive(Debug)]
pub struct File {
    records: HashMap<MacAddress, (Dhcp, Netboot)>,
}

impl File {
    /// Load and parse the record file.
    pub fn load(path: &Path) -> Result<Self, FileError> {
        let contents = std::fs::read_to_string(path)?;
        let file = Self::from_yaml(&contents)?;
        info!(records = file.records.len(), path = %path.display(), "loaded host records");
        Ok(file)
    }

    /// Parse a record document.
    pub fn from_yaml(contents: &str) -> Result<Self, FileError> {
        let raw: HashMap<String, HostEntry> = serde_yaml::from_str(contents)?;
        let mut records = HashMap::with_capacity(raw.len());
        for (key, entry) in raw {
            let mac: MacAddress = key.parse().map_err(|_| FileError::InvalidMac(key))?;
            let dhcp = Dhcp {
                mac,
                ip_address: entry.ip_address,
                subnet_mask: entry.subnet_mask,
                default_gateway: entry.default_gateway,
                name_servers: entry.name_servers,
                hostname: entry.hostname,
                domain_name: entry.domain_name,
                broadcast_address: entry.broadcast_address,
                ntp_servers: entry.ntp_servers,
                lease_time: entry.lease_time,
                domain_search: entry.domain_search,
            };
            let netboot = Netboot {
                allow_netboot: entry.netboot.allow_pxe,
                ipxe_script_url: entry.netboot.ipxe_script_url,
                vlan: entry.netboot.vlan,
            };
            records.insert(mac, (dhcp, netboot));
        }
        Ok(Self { records })
    }
}

#[async_trait]
impl BackendReader for File {
    async fn read(&self, mac: MacAddress) -> Result<(Dhcp, Netboot), BackendError> {
        self.records
            .get(&mac)
            .cloned()
            .ok_or(BackendError::NotFound { mac })
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
