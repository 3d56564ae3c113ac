//! UDP transport implementation

use std::io::ErrorKind;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

use ptcs_core::{GossipError, GossipResult};

use crate::Transport;

/// UDP transport for ptcs
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind to a local address
    pub async fn bind(addr: SocketAddr) -> GossipResult<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| GossipError::InitFailed(format!("bind {}: {}", addr, e)))?;

        let local_addr = socket
            .local_addr()
            .map_err(|e| GossipError::InitFailed(e.to_string()))?;

        tracing::debug!(%local_addr, "UDP transport bound");

        Ok(UdpTransport {
            socket,
            local_addr,
        })
    }
}

impl Transport for UdpTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn try_send_to(&self, datagram: &[u8], dest: SocketAddr) -> GossipResult<()> {
        let sent = self
            .socket
            .try_send_to(datagram, dest)
            .map_err(|e| GossipError::TransportError(format!("send to {}: {}", dest, e)))?;

        if sent != datagram.len() {
            return Err(GossipError::TransportError(format!(
                "short send to {}: {} of {} bytes",
                dest,
                sent,
                datagram.len()
            )));
        }
        Ok(())
    }

    fn try_recv_from(&self, buf: &mut [u8]) -> GossipResult<Option<(usize, SocketAddr)>> {
        match self.socket.try_recv_from(buf) {
            Ok(received) => Ok(Some(received)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(GossipError::TransportError(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_udp_transport_bind() {
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        assert_ne!(transport.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_failure_is_init_failed() {
        let first = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        let result = UdpTransport::bind(first.local_addr()).await;
        assert!(matches!(result, Err(GossipError::InitFailed(_))));
    }

    #[tokio::test]
    async fn test_empty_socket_yields_none() {
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        let mut buf = [0u8; 64];
        assert!(transport.try_recv_from(&mut buf).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let a = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let b = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        a.try_send_to(b"ptcs", b.local_addr()).unwrap();

        let mut buf = [0u8; 64];
        let mut received = None;
        for _ in 0..100 {
            received = b.try_recv_from(&mut buf).unwrap();
            if received.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let received = received.expect("datagram never arrived");

        assert_eq!(received, (4, a.local_addr()));
        assert_eq!(&buf[..4], b"ptcs");
    }
}
