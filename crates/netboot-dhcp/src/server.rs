//! The UDP listener and packet dispatcher.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use dhcp_proto::DhcpPacket;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::handler::{noop, Handler};

pub const DHCP_SERVER_PORT: u16 = 67;
pub const DHCP_CLIENT_PORT: u16 = 68;

/// Largest datagram the listener will accept.
const MAX_DATAGRAM: usize = 1500;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("socket I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The shutdown signal fired. Cancellation is always reported as an
    /// error so callers can tell it apart from a clean (impossible) exit.
    #[error("listener cancelled")]
    Cancelled,
}

/// A DHCPv4 listener that fans every decoded packet out to its registered
/// handlers.
///
/// Handlers are invoked in registration order, each in its own task, all
/// with the same packet and the shared socket. Replies from different
/// handlers may race; DHCP clients resolve that by design. If no handler
/// is registered, a noop handler that logs and drops is used.
pub struct Listener {
    addr: SocketAddr,
    handlers: Vec<Arc<dyn Handler>>,
}

impl Listener {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            handlers: Vec::new(),
        }
    }

    /// Append a handler. Registration order is invocation order.
    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.push(handler);
    }

    /// Bind the configured address and serve until shutdown or a fatal
    /// socket error.
    pub async fn listen_and_serve(&self, shutdown: watch::Receiver<bool>) -> Result<(), Error> {
        let socket = UdpSocket::bind(self.addr)
            .await
            .map_err(|source| Error::Bind {
                addr: self.addr,
                source,
            })?;
        socket.set_broadcast(true)?;
        self.serve(shutdown, socket).await
    }

    /// Serve on a pre-opened socket. Useful for tests and for callers
    /// that set their own socket options before handing the socket over.
    ///
    /// Returns `Error::Cancelled` when `shutdown` fires (or its sender is
    /// dropped), `Error::Io` when the socket fails underneath us.
    pub async fn serve(
        &self,
        mut shutdown: watch::Receiver<bool>,
        socket: UdpSocket,
    ) -> Result<(), Error> {
        let socket = Arc::new(socket);
        let handlers: Vec<Arc<dyn Handler>> = if self.handlers.is_empty() {
            vec![Arc::new(noop::Noop)]
        } else {
            self.handlers.clone()
        };

        info!(addr = %socket.local_addr()?, "DHCP server listening");

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("shutdown requested, stopping listener");
                    return Err(Error::Cancelled);
                }
                received = socket.recv_from(&mut buf) => {
                    let (len, peer) = received?;
                    let pkt = match DhcpPacket::parse(&buf[..len]) {
                        Ok(pkt) => pkt,
                        Err(err) => {
                            debug!(%peer, error = %err, "dropping malformed datagram");
                            continue;
                        }
                    };

                    for handler in &handlers {
                        let handler = Arc::clone(handler);
                        let socket = Arc::clone(&socket);
                        let pkt = pkt.clone();
                        tokio::spawn(async move {
                            handler.handle(&socket, peer, &pkt).await;
                        });
                    }
                }
            }
        }
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self::new(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::UNSPECIFIED,
            DHCP_SERVER_PORT,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::reservation;
    use crate::test_helpers::{
        http_discover, plain_discover, test_config, test_record, StaticBackend,
    };
    use async_trait::async_trait;
    use dhcp_proto::ClientArch;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl Handler for Counting {
        async fn handle(&self, _conn: &UdpSocket, _peer: SocketAddr, _pkt: &DhcpPacket) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    async fn localhost_socket() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    async fn wait_for(counter: &Arc<AtomicUsize>, want: usize) {
        for _ in 0..100 {
            if counter.load(Ordering::SeqCst) == want {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "handler count never reached {want}, got {}",
            counter.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn test_every_handler_sees_every_packet_once() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let mut listener = Listener::new("127.0.0.1:0".parse().unwrap());
        listener.register(Arc::new(Counting(Arc::clone(&first))));
        listener.register(Arc::new(Counting(Arc::clone(&second))));

        let socket = localhost_socket().await;
        let server_addr = socket.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);
        let serve = tokio::spawn(async move { listener.serve(rx, socket).await });

        let client = localhost_socket().await;
        client
            .send_to(&plain_discover("01:02:03:04:05:06").to_bytes(), server_addr)
            .await
            .unwrap();
        wait_for(&first, 1).await;
        wait_for(&second, 1).await;

        // malformed datagrams are dropped without killing the loop
        client.send_to(b"bogus", server_addr).await.unwrap();
        client
            .send_to(&plain_discover("01:02:03:04:05:06").to_bytes(), server_addr)
            .await
            .unwrap();
        wait_for(&first, 2).await;
        wait_for(&second, 2).await;

        tx.send(true).unwrap();
        let result = serve.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_no_handlers_uses_noop() {
        let listener = Listener::new("127.0.0.1:0".parse().unwrap());
        let socket = localhost_socket().await;
        let server_addr = socket.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);
        let serve = tokio::spawn(async move { listener.serve(rx, socket).await });

        let client = localhost_socket().await;
        client
            .send_to(&plain_discover("01:02:03:04:05:06").to_bytes(), server_addr)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        tx.send(true).unwrap();
        assert!(matches!(serve.await.unwrap(), Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_dropped_sender_cancels() {
        let listener = Listener::new("127.0.0.1:0".parse().unwrap());
        let socket = localhost_socket().await;
        let (tx, rx) = watch::channel(false);
        let serve = tokio::spawn(async move { listener.serve(rx, socket).await });
        drop(tx);
        assert!(matches!(serve.await.unwrap(), Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_end_to_end_reservation_reply() {
        let (dhcp, mut netboot) = test_record("01:02:03:04:05:06");
        netboot.allow_netboot = true;
        let backend = Arc::new(StaticBackend::with("01:02:03:04:05:06", dhcp, netboot));

        let mut listener = Listener::new("127.0.0.1:0".parse().unwrap());
        listener.register(Arc::new(reservation::Handler::new(test_config(), backend)));

        let socket = localhost_socket().await;
        let server_addr = socket.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);
        let serve = tokio::spawn(async move { listener.serve(rx, socket).await });

        let client = localhost_socket().await;
        let request = http_discover("01:02:03:04:05:06", ClientArch::EfiX8664Http);
        client
            .send_to(&request.to_bytes(), server_addr)
            .await
            .unwrap();

        let mut buf = vec![0u8; 1500];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .expect("no reply within deadline")
            .unwrap();
        let reply = DhcpPacket::parse(&buf[..len]).unwrap();
        assert_eq!(reply.chaddr, request.chaddr);
        assert_eq!(reply.xid, request.xid);
        assert_eq!(reply.yiaddr, Ipv4Addr::new(192, 168, 2, 150));
        assert_eq!(reply.class_identifier(), "HTTPClient");
        assert_eq!(reply.file, "http://192.168.2.225:8080/ipxe.efi");

        tx.send(true).unwrap();
        assert!(matches!(serve.await.unwrap(), Err(Error::Cancelled)));
    }
}
