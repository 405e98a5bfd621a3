//! Canonical on-wire layout for one transported message (C1).
//!
//! A frame is a fixed 17-byte header followed by the raw payload. The header
//! has no length field of its own -- variable-length framing on the wire is
//! the transport layer's job (`Connection::send_prefix_size`).

use crate::error::GraybatError;
use std::convert::TryInto;

/// Size in bytes of the fixed header: 1 (msg_type) + 4*4 (msg_id, context_id,
/// src_vaddr, tag).
pub const HEADER_SIZE: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MsgType {
    /// A user payload.
    Peer = 0,
    /// Delivery acknowledgement for a `Peer` frame, carried on the control channel.
    Confirm = 1,
    /// Split-context control traffic, carried on the data channel.
    Split = 2,
    /// Shutdown sentinel, understood by both receiver tasks.
    Destruct = 3,
}

impl MsgType {
    fn from_u8(byte: u8) -> Result<Self, GraybatError> {
        match byte {
            0 => Ok(MsgType::Peer),
            1 => Ok(MsgType::Confirm),
            2 => Ok(MsgType::Split),
            3 => Ok(MsgType::Destruct),
            other => Err(GraybatError::MalformedMessage(other as usize)),
        }
    }
}

/// The fixed fields every frame carries, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Header {
    pub msg_type: MsgType,
    pub msg_id: u32,
    pub context_id: u32,
    pub src_vaddr: u32,
    pub tag: u32,
}

/// A complete, owned frame: header plus payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(header: Header, payload: Vec<u8>) -> Self {
        Frame { header, payload }
    }

    /// Total wire size of this frame, header included. Used to account
    /// message-box occupancy against the configured high-water mark.
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    pub fn encode(
        msg_type: MsgType,
        msg_id: u32,
        context_id: u32,
        src_vaddr: u32,
        tag: u32,
        payload: Vec<u8>,
    ) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
        buf.push(msg_type as u8);
        buf.extend_from_slice(&msg_id.to_le_bytes());
        buf.extend_from_slice(&context_id.to_le_bytes());
        buf.extend_from_slice(&src_vaddr.to_le_bytes());
        buf.extend_from_slice(&tag.to_le_bytes());
        buf.extend_from_slice(&payload);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Frame, GraybatError> {
        if bytes.len() < HEADER_SIZE {
            return Err(GraybatError::MalformedMessage(bytes.len()));
        }

        let msg_type = MsgType::from_u8(bytes[0])?;
        let msg_id = u32::from_le_bytes(bytes[1..5].try_into().unwrap());
        let context_id = u32::from_le_bytes(bytes[5..9].try_into().unwrap());
        let src_vaddr = u32::from_le_bytes(bytes[9..13].try_into().unwrap());
        let tag = u32::from_le_bytes(bytes[13..17].try_into().unwrap());
        let payload = bytes[HEADER_SIZE..].to_vec();

        Ok(Frame {
            header: Header {
                msg_type,
                msg_id,
                context_id,
                src_vaddr,
                tag,
            },
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_header_and_payload() {
        let encoded = Frame::encode(MsgType::Peer, 7, 2, 3, 99, vec![1, 2, 3]);
        assert_eq!(encoded.len(), HEADER_SIZE + 3);

        let frame = Frame::decode(&encoded).unwrap();
        assert_eq!(frame.header.msg_type, MsgType::Peer);
        assert_eq!(frame.header.msg_id, 7);
        assert_eq!(frame.header.context_id, 2);
        assert_eq!(frame.header.src_vaddr, 3);
        assert_eq!(frame.header.tag, 99);
        assert_eq!(frame.payload, vec![1, 2, 3]);
    }

    #[test]
    fn empty_payload_round_trips() {
        let encoded = Frame::encode(MsgType::Destruct, 0, 0, 0, 0, Vec::new());
        assert_eq!(encoded.len(), HEADER_SIZE);
        let frame = Frame::decode(&encoded).unwrap();
        assert_eq!(frame.header.msg_type, MsgType::Destruct);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn short_buffer_is_malformed() {
        let err = Frame::decode(&[0u8; HEADER_SIZE - 1]).unwrap_err();
        assert!(matches!(err, GraybatError::MalformedMessage(_)));
    }

    #[test]
    fn unknown_msg_type_is_malformed() {
        let mut encoded = Frame::encode(MsgType::Peer, 0, 0, 0, 0, Vec::new());
        encoded[0] = 200;
        let err = Frame::decode(&encoded).unwrap_err();
        assert!(matches!(err, GraybatError::MalformedMessage(_)));
    }
}
