//! Datagram transport seam

use std::net::SocketAddr;

use ptcs_core::GossipResult;

/// Non-blocking datagram socket as seen by the protocol engine.
///
/// Neither call may block: the engine runs inside a single tick and must
/// return to its loop when nothing is ready.
pub trait Transport {
    /// Address the transport is bound to
    fn local_addr(&self) -> SocketAddr;

    /// Send one datagram. A full socket buffer is reported as an error, not
    /// waited out.
    fn try_send_to(&self, datagram: &[u8], dest: SocketAddr) -> GossipResult<()>;

    /// Receive one datagram into `buf`, or `None` if nothing is pending.
    fn try_recv_from(&self, buf: &mut [u8]) -> GossipResult<Option<(usize, SocketAddr)>>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn local_addr(&self) -> SocketAddr {
        (**self).local_addr()
    }

    fn try_send_to(&self, datagram: &[u8], dest: SocketAddr) -> GossipResult<()> {
        (**self).try_send_to(datagram, dest)
    }

    fn try_recv_from(&self, buf: &mut [u8]) -> GossipResult<Option<(usize, SocketAddr)>> {
        (**self).try_recv_from(buf)
    }
}
