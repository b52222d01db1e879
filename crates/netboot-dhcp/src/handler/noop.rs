//! The fallback handler: logs the packet and drops it.

use std::net::SocketAddr;

use async_trait::async_trait;
use dhcp_proto::DhcpPacket;
use tokio::net::UdpSocket;
use tracing::info;

use crate::handler::Handler;

#[derive(Debug, Default, Clone, Copy)]
pub struct Noop;

#[async_trait]
impl Handler for Noop {
    async fn handle(&self, _conn: &UdpSocket, peer: SocketAddr, pkt: &DhcpPacket) {
        info!(
            mac = %pkt.chaddr,
            %peer,
            msg_type = ?pkt.message_type(),
            "no handler registered, dropping packet"
        );
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
