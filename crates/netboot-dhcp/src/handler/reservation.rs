//! The reservation personality: an authoritative DHCP server whose
//! address assignments are all static host reservations supplied by the
//! backend. There is no dynamic pool and nothing to age out, so RELEASE,
//! DECLINE and NAK need no reply.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use dhcp_proto::{DhcpOption, DhcpPacket, MessageType};
use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendError, BackendReader};
use crate::config::ServerConfig;
use crate::data::{Dhcp, Netboot};
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

    /// Decide on a reply for one received packet. `None` means drop.
    pub(crate) async fn build_reply(&self, pkt: &DhcpPacket) -> Option<DhcpPacket> {
        let reply_type = match pkt.message_type() {
            Some(MessageType::Discover) => MessageType::Offer,
            Some(MessageType::Request) => MessageType::Ack,
            Some(
                mt @ (MessageType::Release
                | MessageType::Decline
                | MessageType::Nak
                | MessageType::Inform),
            ) => {
                // All addresses are host reservations; nothing to reclaim.
                debug!(mac = %pkt.chaddr, msg_type = %mt, "no response required");
                return None;
            }
            _ => {
                debug!(mac = %pkt.chaddr, "received unknown message type");
                return None;
            }
        };

        let (dhcp, netboot) = match self.read_backend(pkt.chaddr).await {
            Ok(v) => v,
            Err(BackendError::NotFound { mac }) => {
                debug!(%mac, "no reservation for client");
                return None;
            }
            Err(err) => {
                error!(mac = %pkt.chaddr, error = %err, "error reading from backend");
                return None;
            }
        };

        let traceparent = self.config.otel_enabled.then(Traceparent::generate);
        Some(self.update_msg(pkt, &dhcp, &netboot, reply_type, traceparent.as_ref()))
    }

    async fn read_backend(
        &self,
        mac: dhcp_proto::MacAddress,
    ) -> Result<(Dhcp, Netboot), BackendError> {
        let (dhcp, netboot) = self.backend.read(mac).await?;
        debug!(
            backend = self.backend.name(),
            attrs = ?dhcp.to_attributes(),
            netboot = ?netboot.to_attributes(),
            "read host record"
        );
        Ok((dhcp, netboot))
    }

    fn update_msg(
        &self,
        pkt: &DhcpPacket,
        dhcp: &Dhcp,
        netboot: &Netboot,
        reply_type: MessageType,
        traceparent: Option<&Traceparent>,
    ) -> DhcpPacket {
        let mut reply = DhcpPacket::reply_to(pkt);
        reply.set_option(DhcpOption::MessageType(reply_type));
        reply.set_option(DhcpOption::ServerIdentifier(self.config.server_ip));

        if self.config.dhcp_enabled {
            set_dhcp_options(&mut reply, dhcp);
        }

        if self.config.netboot.enabled {
            match is_netboot_client(pkt) {
                Ok(()) => self.set_network_boot_options(pkt, &mut reply, netboot, traceparent),
                Err(err) => {
                    debug!(mac = %pkt.chaddr, reason = %err, "not a netboot client");
                }
            }
        }

        reply
    }

    /// Set the netboot headers and options on a reply: echo option 60, and
    /// when the record allows netboot and the arch is known, the bootfile,
    /// next-server and option 43 from the decision engine. Clients that
    /// may not netboot get a sentinel bootfile so their firmware moves on
    /// to the next boot device without waiting out a DHCP timeout.
    fn set_network_boot_options(
        &self,
        pkt: &DhcpPacket,
        reply: &mut DhcpPacket,
        netboot: &Netboot,
        traceparent: Option<&Traceparent>,
    ) {
        let client_type = ClientType::from_class_identifier(pkt.class_identifier());
        reply.set_option(DhcpOption::ClassIdentifier(client_type.as_str().to_string()));
        reply.file = "/netboot-not-allowed".to_string();
        reply.siaddr = Ipv4Addr::UNSPECIFIED;

        if !netboot.allow_netboot {
            debug!(mac = %pkt.chaddr, "client is not allowed to netboot");
            return;
        }

        let arch = client_arch(pkt);
        let Some(bin) = arch_bootfile(arch) else {
            warn!(mac = %pkt.chaddr, %arch, "no bootfile for arch, network boot not allowed");
            return;
        };

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
    }
}

/// Append every non-empty DHCP option from the host record to the reply.
fn set_dhcp_options(reply: &mut DhcpPacket, dhcp: &Dhcp) {
    reply.yiaddr = dhcp.ip_address;
    reply.set_option(DhcpOption::LeaseTime(dhcp.lease_time));
    reply.set_option(DhcpOption::SubnetMask(dhcp.subnet_mask));
    if let Some(gw) = dhcp.default_gateway {
        reply.set_option(DhcpOption::Router(vec![gw]));
    }
    if !dhcp.name_servers.is_empty() {
        reply.set_option(DhcpOption::DnsServer(dhcp.name_servers.clone()));
    }
    if !dhcp.domain_search.is_empty() {
        reply.set_option(DhcpOption::DomainSearch(dhcp.domain_search.clone()));
    }
    if !dhcp.ntp_servers.is_empty() {
        reply.set_option(DhcpOption::NtpServers(dhcp.ntp_servers.clone()));
    }
    if let Some(broadcast) = dhcp.broadcast_address {
        reply.set_option(DhcpOption::BroadcastAddress(broadcast));
    }
    if let Some(domain) = &dhcp.domain_name {
        reply.set_option(DhcpOption::DomainName(domain.clone()));
    }
    if let Some(hostname) = &dhcp.hostname {
        reply.set_option(DhcpOption::Hostname(hostname.clone()));
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
            error!(mac = %pkt.chaddr, %peer, error = %err, "failed to send DHCP reply");
            return;
        }
        info!(
            mac = %pkt.chaddr,
            msg_type = ?reply.message_type(),
            attrs = ?packet_attributes(&reply, "reply"),
            "sent DHCP reply"
        );
    }

    fn name(&self) -> &'static str {
        "reservation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        http_discover, netboot_discover, plain_discover, test_config, test_record, StaticBackend,
    };
    use dhcp_proto::ClientArch;
    use url::Url;

    fn handler(config: ServerConfig, record_allow: bool) -> Handler {
        let (dhcp, mut netboot) = test_record("01:02:03:04:05:06");
        netboot.allow_netboot = record_allow;
        Handler::new(
            config,
            Arc::new(StaticBackend::with("01:02:03:04:05:06", dhcp, netboot)),
        )
    }

    #[tokio::test]
    async fn test_discover_http_client_efi_x86_64() {
        // HTTPClient EFI x86-64 discover gets an OFFER with the full HTTP
        // bootfile URL and the HTTP host as next-server.
        let h = handler(test_config(), true);
        let pkt = http_discover("01:02:03:04:05:06", ClientArch::EfiX8664Http);

        let reply = h.build_reply(&pkt).await.unwrap();
        assert_eq!(reply.message_type(), Some(MessageType::Offer));
        assert_eq!(reply.chaddr, pkt.chaddr);
        assert_eq!(reply.xid, pkt.xid);
        assert_eq!(reply.yiaddr, Ipv4Addr::new(192, 168, 2, 150));
        assert_eq!(reply.class_identifier(), "HTTPClient");
        assert_eq!(reply.file, "http://192.168.2.225:8080/ipxe.efi");
        assert_eq!(reply.siaddr, Ipv4Addr::new(192, 168, 2, 225));
        assert!(reply
            .options
            .iter()
            .any(|o| matches!(o, DhcpOption::ServerIdentifier(ip) if *ip == Ipv4Addr::new(192, 168, 2, 225))));
        assert!(reply
            .options
            .iter()
            .any(|o| matches!(o, DhcpOption::SubnetMask(m) if *m == Ipv4Addr::new(255, 255, 255, 0))));
        assert!(reply
            .options
            .iter()
            .any(|o| matches!(o, DhcpOption::Router(r) if r == &vec![Ipv4Addr::new(192, 168, 2, 1)])));
        assert!(reply
            .options
            .iter()
            .any(|o| matches!(o, DhcpOption::LeaseTime(86400))));
    }

    #[tokio::test]
    async fn test_request_gets_ack() {
        let h = handler(test_config(), true);
        let mut pkt = http_discover("01:02:03:04:05:06", ClientArch::EfiX8664Http);
        pkt.set_option(DhcpOption::MessageType(MessageType::Request));

        let reply = h.build_reply(&pkt).await.unwrap();
        assert_eq!(reply.message_type(), Some(MessageType::Ack));
    }

    #[tokio::test]
    async fn test_tinkerbell_user_class_gets_per_host_script() {
        let h = {
            let (dhcp, mut netboot) = test_record("01:02:03:04:05:06");
            netboot.allow_netboot = true;
            netboot.ipxe_script_url =
                Some(Url::parse("http://localhost:8181/01:02:03:04:05:06/auto.ipxe").unwrap());
            Handler::new(
                test_config(),
                Arc::new(StaticBackend::with("01:02:03:04:05:06", dhcp, netboot)),
            )
        };
        let mut pkt = http_discover("01:02:03:04:05:06", ClientArch::EfiX8664Http);
        pkt.set_option(DhcpOption::UserClass("Tinkerbell".to_string()));

        let reply = h.build_reply(&pkt).await.unwrap();
        assert_eq!(reply.file, "http://localhost:8181/01:02:03:04:05:06/auto.ipxe");
        // tftp address is specified, so next-server stays on it
        assert_eq!(reply.siaddr, Ipv4Addr::new(192, 168, 2, 225));
    }

    #[tokio::test]
    async fn test_netboot_not_allowed_gets_sentinel() {
        let h = handler(test_config(), false);
        let pkt = http_discover("01:02:03:04:05:06", ClientArch::EfiX8664Http);

        let reply = h.build_reply(&pkt).await.unwrap();
        assert_eq!(reply.file, "/netboot-not-allowed");
        assert_eq!(reply.siaddr, Ipv4Addr::UNSPECIFIED);
        // DHCP options still present
        assert_eq!(reply.yiaddr, Ipv4Addr::new(192, 168, 2, 150));
        // no option 43
        assert!(!reply.has_option(43));
    }

    #[tokio::test]
    async fn test_classification_failure_still_serves_dhcp() {
        // opt 97 with length 5 fails netboot classification; the reply is
        // DHCP-only.
        let h = handler(test_config(), true);
        let mut pkt = netboot_discover("01:02:03:04:05:06", ClientArch::EfiX8664);
        pkt.set_option(DhcpOption::ClientMachineId(vec![0, 1, 2, 3, 4]));

        let reply = h.build_reply(&pkt).await.unwrap();
        assert_eq!(reply.yiaddr, Ipv4Addr::new(192, 168, 2, 150));
        assert!(reply.file.is_empty());
        assert!(!reply.has_option(43));
        assert!(!reply.has_option(60));
    }

    #[tokio::test]
    async fn test_dhcp_disabled_suppresses_address_options() {
        let mut config = test_config();
        config.dhcp_enabled = false;
        let h = handler(config, true);
        let pkt = http_discover("01:02:03:04:05:06", ClientArch::EfiX8664Http);

        let reply = h.build_reply(&pkt).await.unwrap();
        assert_eq!(reply.yiaddr, Ipv4Addr::UNSPECIFIED);
        assert!(!reply.has_option(1));
        assert!(!reply.has_option(51));
        // netboot fields still served
        assert_eq!(reply.file, "http://192.168.2.225:8080/ipxe.efi");
    }

    #[tokio::test]
    async fn test_unknown_arch_keeps_dhcp_reply() {
        let h = handler(test_config(), true);
        let pkt = netboot_discover("01:02:03:04:05:06", ClientArch::Unknown(200));

        let reply = h.build_reply(&pkt).await.unwrap();
        assert_eq!(reply.yiaddr, Ipv4Addr::new(192, 168, 2, 150));
        assert_eq!(reply.file, "/netboot-not-allowed");
        assert!(!reply.has_option(43));
    }

    #[tokio::test]
    async fn test_silent_message_types() {
        let h = handler(test_config(), true);
        for mt in [
            MessageType::Release,
            MessageType::Decline,
            MessageType::Nak,
            MessageType::Inform,
        ] {
            let mut pkt = plain_discover("01:02:03:04:05:06");
            pkt.set_option(DhcpOption::MessageType(mt));
            assert!(h.build_reply(&pkt).await.is_none(), "{mt} must be silent");
        }
    }

    #[tokio::test]
    async fn test_unknown_mac_drops() {
        let h = handler(test_config(), true);
        let pkt = http_discover("aa:bb:cc:dd:ee:ff", ClientArch::EfiX8664Http);
        assert!(h.build_reply(&pkt).await.is_none());
    }

    #[tokio::test]
    async fn test_backend_failure_drops() {
        let h = Handler::new(test_config(), crate::test_helpers::failing_backend());
        let pkt = http_discover("01:02:03:04:05:06", ClientArch::EfiX8664Http);
        assert!(h.build_reply(&pkt).await.is_none());
    }

    #[tokio::test]
    async fn test_otel_enabled_appends_traceparent() {
        let mut config = test_config();
        config.otel_enabled = true;
        let h = handler(config, true);
        let pkt = netboot_discover("01:02:03:04:05:06", ClientArch::IntelX86Pc);

        let reply = h.build_reply(&pkt).await.unwrap();
        // default branch: bare filename with a traceparent suffix
        assert!(
            reply.file.starts_with("undionly.kpxe-00-"),
            "unexpected bootfile {}",
            reply.file
        );
        // suboption 69 carries 26 bytes
        let blob = reply
            .options
            .iter()
            .find_map(|o| match o {
                DhcpOption::VendorSpecific(b) => Some(b.clone()),
                _ => None,
            })
            .unwrap();
        let subs = dhcp_proto::decode_suboptions(&blob);
        let tp = subs.iter().find(|(code, _)| *code == 69).unwrap();
        assert_eq!(tp.1.len(), 26);
        // and the suffix round-trips to the same ids
        let suffix = reply.file.trim_start_matches("undionly.kpxe-");
        let parsed: Traceparent = suffix.parse().unwrap();
        assert_eq!(parsed.encode().to_vec(), tp.1);
    }
}
