use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use async_trait::async_trait;
use dhcp_proto::{ClientArch, DhcpOption, DhcpPacket, MacAddress, MessageType};
use url::Url;

use crate::backend::{BackendError, BackendReader};
use crate::config::{NetbootConfig, ServerConfig};
use crate::data::{Dhcp, Netboot};

/// A fixed traceparent shared by tests that need deterministic ids.
pub const TP: &str = "00-23b1e307bb35484f535a1f772c06910e-d887dc3912240434-01";

pub fn test_config() -> ServerConfig {
    ServerConfig {
        server_ip: Ipv4Addr::new(192, 168, 2, 225),
        dhcp_enabled: true,
        otel_enabled: false,
        netboot: NetbootConfig {
            enabled: true,
            tftp_addr: SocketAddrV4::new(Ipv4Addr::new(192, 168, 2, 225), 69),
            http_url: Url::parse("http://192.168.2.225:8080").unwrap(),
            script_url: None,
            user_class: None,
        },
    }
}

pub fn test_record(mac: &str) -> (Dhcp, Netboot) {
    let dhcp = Dhcp {
        mac: mac.parse().unwrap(),
        ip_address: Ipv4Addr::new(192, 168, 2, 150),
        subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
        default_gateway: Some(Ipv4Addr::new(192, 168, 2, 1)),
        name_servers: vec![Ipv4Addr::new(1, 1, 1, 1)],
        hostname: Some("pxe-client".to_string()),
        domain_name: None,
        broadcast_address: None,
        ntp_servers: vec![],
        lease_time: 86400,
        domain_search: vec![],
    };
    (dhcp, Netboot::default())
}

/// A backend over a fixed in-memory record set.
pub struct StaticBackend {
    records: HashMap<MacAddress, (Dhcp, Netboot)>,
}

impl StaticBackend {
    pub fn with(mac: &str, dhcp: Dhcp, netboot: Netboot) -> Self {
        let mut records = HashMap::new();
        records.insert(mac.parse().unwrap(), (dhcp, netboot));
        Self { records }
    }
}

#[async_trait]
impl BackendReader for StaticBackend {
    async fn read(&self, mac: MacAddress) -> Result<(Dhcp, Netboot), BackendError> {
        self.records
            .get(&mac)
            .cloned()
            .ok_or(BackendError::NotFound { mac })
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// A backend whose reads always fail transiently.
pub struct FailingBackend;

#[async_trait]
impl BackendReader for FailingBackend {
    async fn read(&self, _mac: MacAddress) -> Result<(Dhcp, Netboot), BackendError> {
        Err(BackendError::Unavailable("backend offline".to_string()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

pub fn failing_backend() -> Arc<dyn BackendReader> {
    Arc::new(FailingBackend)
}

/// A DHCP DISCOVER without any netboot options.
pub fn plain_discover(mac: &str) -> DhcpPacket {
    let mut pkt = DhcpPacket::new();
    pkt.xid = 0x12345678;
    pkt.chaddr = mac.parse().unwrap();
    pkt.options
        .push(DhcpOption::MessageType(MessageType::Discover));
    pkt
}

/// A netboot-eligible DISCOVER from PXE firmware.
pub fn netboot_discover(mac: &str, arch: ClientArch) -> DhcpPacket {
    let mut pkt = plain_discover(mac);
    pkt.options.push(DhcpOption::ClassIdentifier(
        "PXEClient:Arch:00007:UNDI:003016".to_string(),
    ));
    pkt.options.push(DhcpOption::ClientArch(vec![arch]));
    pkt.options.push(DhcpOption::ClientNdi(vec![1, 3, 16]));
    pkt
}

/// A netboot-eligible DISCOVER from HTTP-boot firmware.
pub fn http_discover(mac: &str, arch: ClientArch) -> DhcpPacket {
    let mut pkt = netboot_discover(mac, arch);
    pkt.set_option(DhcpOption::ClassIdentifier(
        "HTTPClient:Arch:00016:UNDI:003016".to_string(),
    ));
    pkt
}
