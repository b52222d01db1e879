//! Packet handlers. Each registered handler sees every received packet
//! and decides on its own whether to reply.

pub mod noop;
pub mod proxy;
pub mod reservation;

use std::net::SocketAddr;

use async_trait::async_trait;
use dhcp_proto::DhcpPacket;
use tokio::net::UdpSocket;

/// Responds (or not) to decoded DHCP packets.
///
/// Handlers share the listener's socket for writes and run concurrently
/// for the same packet; a handler that wants to mutate the packet works on
/// its own copy.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle one received packet. Write failures are handler-local and
    /// must not panic.
    async fn handle(&self, conn: &UdpSocket, peer: SocketAddr, pkt: &DhcpPacket);

    /// The name of the handler, for logging.
    fn name(&self) -> &'static str;
}
