//! Message header for the ptcs wire protocol
//!
//! Header layout (all integers LE):
//! - Bytes 0-4: Protocol magic `"ptcs\0"`
//! - Byte 5: Message type
//! - Bytes 6-7: Reserved
//! - Bytes 8-9: Remaining attempts
//! - Bytes 10-13: Sequence number
//! - Bytes 14..: Destination member descriptor
//!
//! Member descriptor:
//! - 16 bytes: Member identifier
//! - 1 byte: Address family (4 or 6)
//! - 4 or 16 bytes: IP address
//! - 2 bytes: Port

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{Buf, BufMut};
use ptcs_core::{GossipError, GossipResult, Member, MemberId, Sequence};

/// Protocol family magic
pub const PROTOCOL_MAGIC: [u8; 5] = *b"ptcs\0";

/// Header bytes before the destination descriptor
pub const FIXED_HEADER_SIZE: usize = 14;

/// Descriptor size for an IPv4 member
pub const MEMBER_V4_SIZE: usize = 16 + 1 + 4 + 2;

/// Descriptor size for an IPv6 member
pub const MEMBER_V6_SIZE: usize = 16 + 1 + 16 + 2;

const FAMILY_V4: u8 = 4;
const FAMILY_V6: u8 = 6;

/// Message type discriminant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Hello = 0x01,
    Welcome = 0x02,
    MembershipSnapshot = 0x03,
    Ack = 0x04,
    Data = 0x05,
    Status = 0x06,
}

impl MessageType {
    /// Parse from wire byte
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(MessageType::Hello),
            0x02 => Some(MessageType::Welcome),
            0x03 => Some(MessageType::MembershipSnapshot),
            0x04 => Some(MessageType::Ack),
            0x05 => Some(MessageType::Data),
            0x06 => Some(MessageType::Status),
            _ => None,
        }
    }

    /// Convert to wire byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Header fields common to every message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// Reserved, written as zero
    pub reserved: u16,
    /// Delivery attempts left for this queued entry
    pub remaining_attempts: u16,
    /// Sender-scoped sequence number
    pub sequence: Sequence,
    /// Destination, resolved when the message is enqueued
    pub destination: Member,
}

impl Header {
    pub fn new(sequence: Sequence, destination: Member) -> Self {
        Header {
            reserved: 0,
            remaining_attempts: 0,
            sequence,
            destination,
        }
    }

    /// Encoded size of this header
    pub fn encoded_len(&self) -> usize {
        FIXED_HEADER_SIZE + member_encoded_len(&self.destination)
    }

    /// Write header (type byte supplied by the message body)
    pub fn encode(&self, message_type: MessageType, buf: &mut impl BufMut) {
        buf.put_slice(&PROTOCOL_MAGIC);
        buf.put_u8(message_type.to_byte());
        buf.put_u16_le(self.reserved);
        buf.put_u16_le(self.remaining_attempts);
        buf.put_slice(&self.sequence.to_bytes());
        put_member(&self.destination, buf);
    }

    /// Parse header, returning it with its message type
    pub fn decode(buf: &mut impl Buf) -> GossipResult<(MessageType, Header)> {
        ensure(buf, FIXED_HEADER_SIZE)?;

        let mut magic = [0u8; 5];
        buf.copy_to_slice(&mut magic);
        if magic != PROTOCOL_MAGIC {
            return Err(GossipError::InvalidMessage("Bad protocol magic".into()));
        }

        let type_byte = buf.get_u8();
        let message_type =
            MessageType::from_byte(type_byte).ok_or(GossipError::UnknownMessageType(type_byte))?;

        let reserved = buf.get_u16_le();
        let remaining_attempts = buf.get_u16_le();
        let sequence = Sequence(buf.get_u32_le());
        let destination = get_member(buf)?;

        Ok((
            message_type,
            Header {
                reserved,
                remaining_attempts,
                sequence,
                destination,
            },
        ))
    }
}

impl Default for Header {
    fn default() -> Self {
        Header::new(
            Sequence::ZERO,
            Member::unidentified(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))),
        )
    }
}

/// Encoded size of a member descriptor
pub fn member_encoded_len(member: &Member) -> usize {
    match member.endpoint().ip() {
        IpAddr::V4(_) => MEMBER_V4_SIZE,
        IpAddr::V6(_) => MEMBER_V6_SIZE,
    }
}

/// Write a member descriptor
pub fn put_member(member: &Member, buf: &mut impl BufMut) {
    buf.put_slice(&member.id().to_bytes());
    match member.endpoint().ip() {
        IpAddr::V4(ip) => {
            buf.put_u8(FAMILY_V4);
            buf.put_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            buf.put_u8(FAMILY_V6);
            buf.put_slice(&ip.octets());
        }
    }
    buf.put_u16_le(member.endpoint().port());
}

/// Read a member descriptor
pub fn get_member(buf: &mut impl Buf) -> GossipResult<Member> {
    ensure(buf, 16 + 1)?;
    let mut id = [0u8; 16];
    buf.copy_to_slice(&mut id);

    let ip = match buf.get_u8() {
        FAMILY_V4 => {
            ensure(buf, 4)?;
            let mut octets = [0u8; 4];
            buf.copy_to_slice(&mut octets);
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        FAMILY_V6 => {
            ensure(buf, 16)?;
            let mut octets = [0u8; 16];
            buf.copy_to_slice(&mut octets);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        other => {
            return Err(GossipError::InvalidMessage(format!(
                "Unknown address family {}",
                other
            )))
        }
    };

    ensure(buf, 2)?;
    let port = buf.get_u16_le();

    Ok(Member::with_id(
        MemberId::from_bytes(id),
        SocketAddr::new(ip, port),
    ))
}

/// Fail with `BufferTooShort` unless `needed` bytes remain
pub(crate) fn ensure(buf: &impl Buf, needed: usize) -> GossipResult<()> {
    if buf.remaining() < needed {
        return Err(GossipError::BufferTooShort {
            expected: needed,
            actual: buf.remaining(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = Header {
            reserved: 0,
            remaining_attempts: 3,
            sequence: Sequence(0xDEADBEEF),
            destination: Member::new("10.1.2.3:9002".parse().unwrap()),
        };

        let mut bytes = Vec::new();
        header.encode(MessageType::Ack, &mut bytes);
        assert_eq!(bytes.len(), header.encoded_len());
        assert_eq!(&bytes[..5], &PROTOCOL_MAGIC);
        assert_eq!(bytes[5], 0x04);

        let (message_type, parsed) = Header::decode(&mut bytes.as_slice()).unwrap();
        assert_eq!(message_type, MessageType::Ack);
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_ipv6_member_roundtrip() {
        let member = Member::new("[fe80::1]:7000".parse().unwrap());
        let mut bytes = Vec::new();
        put_member(&member, &mut bytes);
        assert_eq!(bytes.len(), MEMBER_V6_SIZE);

        let parsed = get_member(&mut bytes.as_slice()).unwrap();
        assert_eq!(parsed, member);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = Vec::new();
        Header::default().encode(MessageType::Hello, &mut bytes);
        bytes[0] = b'x';

        let result = Header::decode(&mut bytes.as_slice());
        assert!(matches!(result, Err(GossipError::InvalidMessage(_))));
    }

    #[test]
    fn test_unknown_message_type() {
        let mut bytes = Vec::new();
        Header::default().encode(MessageType::Hello, &mut bytes);
        bytes[5] = 0x7F;

        let result = Header::decode(&mut bytes.as_slice());
        assert!(matches!(result, Err(GossipError::UnknownMessageType(0x7F))));
    }

    #[test]
    fn test_header_too_short() {
        let buf = [0u8; 10];
        let result = Header::decode(&mut &buf[..]);
        assert!(matches!(result, Err(GossipError::BufferTooShort { .. })));
    }

    #[test]
    fn test_truncated_descriptor() {
        let mut bytes = Vec::new();
        Header::default().encode(MessageType::Hello, &mut bytes);
        bytes.truncate(bytes.len() - 3);

        let result = Header::decode(&mut bytes.as_slice());
        assert!(matches!(result, Err(GossipError::BufferTooShort { .. })));
    }

    #[test]
    fn test_message_type_bytes() {
        for b in 0x01..=0x06 {
            assert_eq!(MessageType::from_byte(b).unwrap().to_byte(), b);
        }
        assert!(MessageType::from_byte(0x00).is_none());
        assert!(MessageType::from_byte(0x07).is_none());
    }
}
