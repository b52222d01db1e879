//! The proxyDHCP personality: coexists with a foreign authoritative DHCP
//! server on the same LAN. It answers only netboot-eligible DISCOVER and
//! REQUEST packets, never assigns an address, and points the PXE ROM at
//! the boot server via `siaddr` and the bootfile header.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use dhcp_proto::{DhcpOption, DhcpPacket, MessageType};
use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendError, BackendReader};
use crate::config::ServerConfig;
use crate::data::Netboot;
use crate::netboot::{
    arch_bootfile, bootfile_and_next_server, client_arch, is_netboot_client, vendor_options,
    ClientType,
};
use crate::otel::{packet_attributes, Traceparent};

pub struct Handler {
    config: ServerConfig,
    backend: Arc<dyn BackendReader>,
}

impl Handler {
    pub fn new(config: ServerConfig, backend: Arc<dyn BackendReader>) -> Self {
        Self { config, backend }
    }

    /// Decide on a reply for one received packet. `None` means drop, which
    /// is the common case: anything that is not an eligible netboot
    /// request belongs to the authoritative DHCP server on the LAN.
    pub(crate) async fn build_reply(&self, pkt: &DhcpPacket) -> Option<DhcpPacket> {
        let reply_type = match pkt.message_type() {
            Some(MessageType::Discover) => MessageType::Offer,
            Some(MessageType::Request) => MessageType::Ack,
            Some(MessageType::Release) => {
                debug!(mac = %pkt.chaddr, "received release, no response required");
                return None;
            }
            other => {
                debug!(mac = %pkt.chaddr, msg_type = ?other, "unsupported message type");
                return None;
            }
        };

        if !self.config.netboot.enabled {
            debug!(mac = %pkt.chaddr, "serving netboot clients is not enabled");
            return None;
        }

        let netboot = match self.read_backend(pkt.chaddr).await {
            Ok(n) => n,
            Err(BackendError::NotFound { mac }) => {
                debug!(%mac, "no record for client");
                return None;
            }
            Err(err) => {
                error!(mac = %pkt.chaddr, error = %err, "error reading from backend");
                return None;
            }
        };

        if !netboot.allow_netboot {
            debug!(mac = %pkt.chaddr, "client is not allowed to netboot");
            return None;
        }
        if let Err(err) = is_netboot_client(pkt) {
            debug!(mac = %pkt.chaddr, reason = %err, "not a netboot client");
            return None;
        }

        let traceparent = self.config.otel_enabled.then(Traceparent::generate);
        Some(self.update_msg(pkt, &netboot, reply_type, traceparent.as_ref()))
    }

    async fn read_backend(&self, mac: dhcp_proto::MacAddress) -> Result<Netboot, BackendError> {
        let (_, netboot) = self.backend.read(mac).await?;
        debug!(
            backend = self.backend.name(),
            netboot = ?netboot.to_attributes(),
            "read host record"
        );
        Ok(netboot)
    }

    fn update_msg(
        &self,
        pkt: &DhcpPacket,
        netboot: &Netboot,
        reply_type: MessageType,
        traceparent: Option<&Traceparent>,
    ) -> DhcpPacket {
        let mut reply = DhcpPacket::reply_to(pkt);
        reply.set_option(DhcpOption::MessageType(reply_type));
        reply.set_option(DhcpOption::ServerIdentifier(self.config.server_ip));

        // The PXE spec wants the machine identifier mirrored back.
        let guid = pkt.machine_id();
        if !guid.is_empty() {
            reply.set_option(DhcpOption::ClientMachineId(guid.to_vec()));
        }

        let client_type = ClientType::from_class_identifier(pkt.class_identifier());
        reply.set_option(DhcpOption::ClassIdentifier(client_type.as_str().to_string()));

        // sname points at the boot artifact server for the transport in use.
        reply.sname = match client_type {
            ClientType::Pxe => self.config.netboot.tftp_addr.ip().to_string(),
            ClientType::Http => self
                .config
                .netboot
                .http_url
                .host_str()
                .unwrap_or_default()
                .to_string(),
        };

        reply.file = "/netboot-not-allowed".to_string();
        reply.siaddr = Ipv4Addr::UNSPECIFIED;

        if let Some(bin) = arch_bootfile(client_arch(pkt)) {
            let script_url = netboot
                .ipxe_script_url
                .as_ref()
                .or(self.config.netboot.script_url.as_ref());
            let (bootfile, next_server) = bootfile_and_next_server(
                pkt.user_class(),
                self.config.netboot.user_class.as_deref(),
                client_type,
                bin,
                self.config.netboot.tftp_addr,
                &self.config.netboot.http_url,
                script_url,
                traceparent,
            );
            reply.file = bootfile;
            reply.siaddr = next_server;
            reply.set_option(DhcpOption::VendorSpecific(vendor_options(
                pkt.chaddr,
                netboot.vlan.as_deref(),
                traceparent,
            )));
        } else {
            warn!(
                mac = %pkt.chaddr,
                arch = %client_arch(pkt),
                "no bootfile for arch, network boot not allowed"
            );
        }

        reply
    }
}

#[async_trait]
impl crate::handler::Handler for Handler {
    async fn handle(&self, conn: &UdpSocket, peer: SocketAddr, pkt: &DhcpPacket) {
        info!(
            mac = %pkt.chaddr,
            msg_type = ?pkt.message_type(),
            attrs = ?packet_attributes(pkt, "request"),
            "received DHCP packet"
        );

        let Some(reply) = self.build_reply(pkt).await else {
            return;
        };

        if let Err(err) = conn.send_to(&reply.to_bytes(), peer).await {
            error!(mac = %pkt.chaddr, %peer, error = %err, "failed to send proxyDHCP reply");
            return;
        }
        info!(
            mac = %pkt.chaddr,
            msg_type = ?reply.message_type(),
            bootfile = %reply.file,
            attrs = ?packet_attributes(&reply, "reply"),
            "sent proxyDHCP reply"
        );
    }

    fn name(&self) -> &'static str {
        "proxy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        http_discover, netboot_discover, plain_discover, test_config, test_record, StaticBackend,
    };
    use dhcp_proto::{decode_suboptions, ClientArch};

    fn handler(config: ServerConfig, record_allow: bool) -> Handler {
        let (dhcp, mut netboot) = test_record("01:02:03:04:05:06");
        netboot.allow_netboot = record_allow;
        Handler::new(
            config,
            Arc::new(StaticBackend::with("01:02:03:04:05:06", dhcp, netboot)),
        )
    }

    #[tokio::test]
    async fn test_discover_builds_offer_without_address() {
        let h = handler(test_config(), true);
        let pkt = netboot_discover("01:02:03:04:05:06", ClientArch::EfiX8664);

        let reply = h.build_reply(&pkt).await.unwrap();
        assert_eq!(reply.message_type(), Some(MessageType::Offer));
        assert_eq!(reply.chaddr, pkt.chaddr);
        // never assigns an address
        assert_eq!(reply.yiaddr, Ipv4Addr::UNSPECIFIED);
        assert!(!reply.has_option(1));
        assert!(!reply.has_option(51));
        // netboot fields are there
        assert_eq!(reply.class_identifier(), "PXEClient");
        assert_eq!(reply.file, "ipxe.efi");
        assert_eq!(reply.siaddr, Ipv4Addr::new(192, 168, 2, 225));
        assert!(reply.has_option(43));
    }

    #[tokio::test]
    async fn test_machine_id_mirrored() {
        let h = handler(test_config(), true);
        let mut guid = vec![0u8];
        guid.extend_from_slice(&[0xAB; 16]);
        let mut pkt = netboot_discover("01:02:03:04:05:06", ClientArch::EfiX8664);
        pkt.set_option(DhcpOption::ClientMachineId(guid.clone()));

        let reply = h.build_reply(&pkt).await.unwrap();
        assert_eq!(reply.machine_id(), guid.as_slice());
    }

    #[tokio::test]
    async fn test_http_client_echo_and_bootfile() {
        let h = handler(test_config(), true);
        let mut pkt = http_discover("01:02:03:04:05:06", ClientArch::EfiX8664Http);
        pkt.set_option(DhcpOption::MessageType(MessageType::Request));

        let reply = h.build_reply(&pkt).await.unwrap();
        assert_eq!(reply.message_type(), Some(MessageType::Ack));
        assert_eq!(reply.class_identifier(), "HTTPClient");
        assert_eq!(reply.file, "http://192.168.2.225:8080/ipxe.efi");
        assert_eq!(reply.siaddr, Ipv4Addr::new(192, 168, 2, 225));
        assert_eq!(reply.sname, "192.168.2.225");
    }

    #[tokio::test]
    async fn test_release_is_silent() {
        let h = handler(test_config(), true);
        let mut pkt = netboot_discover("01:02:03:04:05:06", ClientArch::EfiX8664);
        pkt.set_option(DhcpOption::MessageType(MessageType::Release));
        assert!(h.build_reply(&pkt).await.is_none());
    }

    #[tokio::test]
    async fn test_non_netboot_client_dropped() {
        // a plain DHCP discover without PXE options is not ours to answer
        let h = handler(test_config(), true);
        let pkt = plain_discover("01:02:03:04:05:06");
        assert!(h.build_reply(&pkt).await.is_none());
    }

    #[tokio::test]
    async fn test_opt97_invalid_length_dropped() {
        let h = handler(test_config(), true);
        let mut pkt = netboot_discover("01:02:03:04:05:06", ClientArch::EfiX8664);
        pkt.set_option(DhcpOption::ClientMachineId(vec![0, 1, 2, 3, 4]));
        assert!(h.build_reply(&pkt).await.is_none());
    }

    #[tokio::test]
    async fn test_disallowed_record_dropped() {
        let h = handler(test_config(), false);
        let pkt = netboot_discover("01:02:03:04:05:06", ClientArch::EfiX8664);
        assert!(h.build_reply(&pkt).await.is_none());
    }

    #[tokio::test]
    async fn test_netboot_disabled_dropped() {
        let mut config = test_config();
        config.netboot.enabled = false;
        let h = handler(config, true);
        let pkt = netboot_discover("01:02:03:04:05:06", ClientArch::EfiX8664);
        assert!(h.build_reply(&pkt).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_mac_dropped() {
        let h = handler(test_config(), true);
        let pkt = netboot_discover("aa:bb:cc:dd:ee:ff", ClientArch::EfiX8664);
        assert!(h.build_reply(&pkt).await.is_none());
    }

    #[tokio::test]
    async fn test_raspberry_pi_discover() {
        let h = {
            let (dhcp, mut netboot) = test_record("dc:a6:32:01:02:03");
            netboot.allow_netboot = true;
            Handler::new(
                test_config(),
                Arc::new(StaticBackend::with("dc:a6:32:01:02:03", dhcp, netboot)),
            )
        };
        // the Pi ROM advertises an ARM arch, but the OUI decides
        let pkt = netboot_discover("dc:a6:32:01:02:03", ClientArch::EfiArm64);

        let reply = h.build_reply(&pkt).await.unwrap();
        assert_eq!(reply.file, "snp.efi");
        let blob = reply
            .options
            .iter()
            .find_map(|o| match o {
                DhcpOption::VendorSpecific(b) => Some(b.clone()),
                _ => None,
            })
            .unwrap();
        let subs = decode_suboptions(&blob);
        assert!(subs.contains(&(9, b"\x00\x00\x11Raspberry Pi Boot".to_vec())));
        assert!(subs.contains(&(10, vec![0x00, 0x50, 0x58, 0x45])));
    }

    #[tokio::test]
    async fn test_unknown_arch_keeps_sentinel() {
        let h = handler(test_config(), true);
        let pkt = netboot_discover("01:02:03:04:05:06", ClientArch::Unknown(200));

        let reply = h.build_reply(&pkt).await.unwrap();
        assert_eq!(reply.file, "/netboot-not-allowed");
        assert_eq!(reply.siaddr, Ipv4Addr::UNSPECIFIED);
        assert!(!reply.has_option(43));
    }
}
