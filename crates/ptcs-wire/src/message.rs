//! Complete message for the ptcs wire protocol
//!
//! Message = Header + variant body. One message per datagram.
//!
//! Body layouts:
//! - Hello: sender descriptor
//! - Welcome: hello sequence (4) + sender descriptor
//! - MembershipSnapshot: count (2) + descriptors
//! - Ack: acknowledged sequence (4)
//! - Data: length (4) + opaque bytes
//! - Status: current index (2) + count (2) + records (4 + 8 each)

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ptcs_core::{GossipError, GossipResult, Member, Sequence, VectorClock, VectorRecord};

use crate::header::{ensure, get_member, member_encoded_len, put_member, MEMBER_V4_SIZE};
use crate::{Header, MessageType};

const STATUS_RECORD_SIZE: usize = 4 + 8;

/// Message variants
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Body {
    /// Join request from a new member
    Hello { sender: Member },
    /// Reply to a Hello, echoing its sequence
    Welcome {
        sender: Member,
        hello_sequence: Sequence,
    },
    /// Full membership view of the sender
    MembershipSnapshot { members: Vec<Member> },
    /// Acknowledges a queued entry by sequence
    Ack { sequence: Sequence },
    /// Opaque application payload
    Data { payload: Bytes },
    /// Version vector, reserved for anti-entropy
    Status { clock: VectorClock },
}

impl Body {
    pub fn message_type(&self) -> MessageType {
        match self {
            Body::Hello { .. } => MessageType::Hello,
            Body::Welcome { .. } => MessageType::Welcome,
            Body::MembershipSnapshot { .. } => MessageType::MembershipSnapshot,
            Body::Ack { .. } => MessageType::Ack,
            Body::Data { .. } => MessageType::Data,
            Body::Status { .. } => MessageType::Status,
        }
    }

    /// Does the receiver answer this body with a correlated reply?
    pub fn expects_reply(&self) -> bool {
        matches!(self, Body::Hello { .. } | Body::MembershipSnapshot { .. })
    }

    fn encoded_len(&self) -> usize {
        match self {
            Body::Hello { sender } => member_encoded_len(sender),
            Body::Welcome { sender, .. } => 4 + member_encoded_len(sender),
            Body::MembershipSnapshot { members } => {
                2 + members.iter().map(member_encoded_len).sum::<usize>()
            }
            Body::Ack { .. } => 4,
            Body::Data { payload } => 4 + payload.len(),
            Body::Status { clock } => 4 + clock.records.len() * STATUS_RECORD_SIZE,
        }
    }

    fn encode(&self, buf: &mut impl BufMut) -> GossipResult<()> {
        match self {
            Body::Hello { sender } => put_member(sender, buf),
            Body::Welcome {
                sender,
                hello_sequence,
            } => {
                buf.put_slice(&hello_sequence.to_bytes());
                put_member(sender, buf);
            }
            Body::MembershipSnapshot { members } => {
                let count = u16::try_from(members.len()).map_err(|_| {
                    GossipError::InvalidMessage(format!("Too many members: {}", members.len()))
                })?;
                buf.put_u16_le(count);
                for member in members {
                    put_member(member, buf);
                }
            }
            Body::Ack { sequence } => buf.put_slice(&sequence.to_bytes()),
            Body::Data { payload } => {
                let len = u32::try_from(payload.len()).map_err(|_| GossipError::BufferNotEnough {
                    size: payload.len(),
                    max: u32::MAX as usize,
                })?;
                buf.put_u32_le(len);
                buf.put_slice(payload);
            }
            Body::Status { clock } => {
                let count = u16::try_from(clock.records.len()).map_err(|_| {
                    GossipError::InvalidMessage(format!(
                        "Too many clock records: {}",
                        clock.records.len()
                    ))
                })?;
                buf.put_u16_le(clock.current_idx);
                buf.put_u16_le(count);
                for record in &clock.records {
                    buf.put_u32_le(record.sequence_number);
                    buf.put_u64_le(record.member_id);
                }
            }
        }
        Ok(())
    }

    fn decode(message_type: MessageType, buf: &mut impl Buf) -> GossipResult<Self> {
        let body = match message_type {
            MessageType::Hello => Body::Hello {
                sender: get_member(buf)?,
            },
            MessageType::Welcome => {
                ensure(buf, 4)?;
                let hello_sequence = Sequence(buf.get_u32_le());
                Body::Welcome {
                    sender: get_member(buf)?,
                    hello_sequence,
                }
            }
            MessageType::MembershipSnapshot => {
                ensure(buf, 2)?;
                let count = buf.get_u16_le() as usize;
                let mut members = Vec::with_capacity(count.min(buf.remaining() / MEMBER_V4_SIZE));
                for _ in 0..count {
                    members.push(get_member(buf)?);
                }
                Body::MembershipSnapshot { members }
            }
            MessageType::Ack => {
                ensure(buf, 4)?;
                Body::Ack {
                    sequence: Sequence(buf.get_u32_le()),
                }
            }
            MessageType::Data => {
                ensure(buf, 4)?;
                let len = buf.get_u32_le() as usize;
                ensure(buf, len)?;
                Body::Data {
                    payload: buf.copy_to_bytes(len),
                }
            }
            MessageType::Status => {
                ensure(buf, 4)?;
                let current_idx = buf.get_u16_le();
                let count = buf.get_u16_le() as usize;
                ensure(buf, count * STATUS_RECORD_SIZE)?;
                let records = (0..count)
                    .map(|_| {
                        let sequence_number = buf.get_u32_le();
                        let member_id = buf.get_u64_le();
                        VectorRecord {
                            sequence_number,
                            member_id,
                        }
                    })
                    .collect();
                Body::Status {
                    clock: VectorClock {
                        current_idx,
                        records,
                    },
                }
            }
        };
        Ok(body)
    }
}

/// Complete ptcs message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub body: Body,
}

impl Message {
    /// Message with a default header; the disseminator fills it in
    pub fn new(body: Body) -> Self {
        Message {
            header: Header::default(),
            body,
        }
    }

    #[inline]
    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    /// Total encoded size
    pub fn encoded_len(&self) -> usize {
        self.header.encoded_len() + self.body.encoded_len()
    }

    /// Serialize, refusing messages larger than `max_size`
    pub fn encode(&self, max_size: usize) -> GossipResult<Bytes> {
        let size = self.encoded_len();
        if size > max_size {
            return Err(GossipError::BufferNotEnough {
                size,
                max: max_size,
            });
        }

        let mut buf = BytesMut::with_capacity(size);
        self.header.encode(self.message_type(), &mut buf);
        self.body.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Parse a datagram. Trailing bytes are rejected.
    pub fn decode(datagram: &[u8]) -> GossipResult<Self> {
        let mut buf = datagram;
        let (message_type, header) = Header::decode(&mut buf)?;
        let body = Body::decode(message_type, &mut buf)?;

        if buf.has_remaining() {
            return Err(GossipError::InvalidMessage(format!(
                "{} trailing bytes after {:?}",
                buf.remaining(),
                message_type
            )));
        }

        Ok(Message { header, body })
    }
}
