//! Cluster member descriptor

use std::fmt;
use std::net::SocketAddr;

use crate::MemberId;

/// A cluster member: identity plus transport endpoint.
///
/// Immutable after construction. A changed endpoint is a new descriptor
/// with the same identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Member {
    id: MemberId,
    endpoint: SocketAddr,
}

impl Member {
    /// Create a member with a freshly generated identifier
    pub fn new(endpoint: SocketAddr) -> Self {
        Member {
            id: MemberId::generate(),
            endpoint,
        }
    }

    /// Rebuild a member from a known identifier (e.g. decoded from the wire)
    pub fn with_id(id: MemberId, endpoint: SocketAddr) -> Self {
        Member { id, endpoint }
    }

    /// A peer reachable at `endpoint` whose identifier is not known yet
    pub fn unidentified(endpoint: SocketAddr) -> Self {
        Member {
            id: MemberId::UNKNOWN,
            endpoint,
        }
    }

    #[inline]
    pub fn id(&self) -> MemberId {
        self.id
    }

    #[inline]
    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// Replace an unspecified advertised IP (`0.0.0.0`, `::`) with the
    /// address the datagram actually came from.
    pub fn reachable_via(self, source: SocketAddr) -> Self {
        if self.endpoint.ip().is_unspecified() {
            Member {
                id: self.id,
                endpoint: SocketAddr::new(source.ip(), self.endpoint.port()),
            }
        } else {
            self
        }
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}@{}", self.id, self.endpoint)
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.endpoint)
    }
}
