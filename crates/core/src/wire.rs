//! Fixed-layout frame codec. Every frame starts with a one-byte type tag;
//! multi-byte fields are little-endian. A frame whose length does not match
//! its declared type fails to decode and is dropped by the caller — the
//! channel is noisy and short frames are expected.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::sample::SamplePair;
use crate::types::NodeId;

/// Beacon flag: sender is in its acknowledgment window.
pub const FLAG_ACK: u8 = 0x01;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("frame too short for type")]
    Truncated,

    #[error("unknown frame type 0x{0:02x}")]
    UnknownType(u8),

    #[error("frame length does not match type")]
    BadLength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Beacon = 0x01,
    Request = 0x02,
    Data = 0x03,
    Ack = 0x04,
    RequestAck = 0x05,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Beacon {
        sender: NodeId,
        phase: u8,
        flags: u8,
    },
    Request {
        sender: NodeId,
    },
    Data {
        sender: NodeId,
        seq: u8,
        payload: Vec<SamplePair>,
    },
    Ack {
        sender: NodeId,
        seq: u8,
    },
    RequestAck {
        sender: NodeId,
        seq: u8,
    },
}

impl Frame {
    pub fn kind(&self) -> FrameType {
        match self {
            Frame::Beacon { .. } => FrameType::Beacon,
            Frame::Request { .. } => FrameType::Request,
            Frame::Data { .. } => FrameType::Data,
            Frame::Ack { .. } => FrameType::Ack,
            Frame::RequestAck { .. } => FrameType::RequestAck,
        }
    }

    pub fn sender(&self) -> NodeId {
        match self {
            Frame::Beacon { sender, .. }
            | Frame::Request { sender }
            | Frame::Data { sender, .. }
            | Frame::Ack { sender, .. }
            | Frame::RequestAck { sender, .. } => *sender,
        }
    }

    /// Encoded length in bytes; data frames dominate and bound chunk size
    /// against the link MTU.
    pub fn encoded_len(&self) -> usize {
        match self {
            Frame::Beacon { .. } => 5,
            Frame::Request { .. } => 3,
            Frame::Data { payload, .. } => 4 + payload.len() * 4,
            Frame::Ack { .. } | Frame::RequestAck { .. } => 4,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.kind() as u8);
        buf.put_u16_le(self.sender());
        match self {
            Frame::Beacon { phase, flags, .. } => {
                buf.put_u8(*phase);
                buf.put_u8(*flags);
            }
            Frame::Request { .. } => {}
            Frame::Data { seq, payload, .. } => {
                buf.put_u8(*seq);
                for pair in payload {
                    buf.put_i16_le(pair.light);
                    buf.put_i16_le(pair.motion);
                }
            }
            Frame::Ack { seq, .. } | Frame::RequestAck { seq, .. } => {
                buf.put_u8(*seq);
            }
        }
        buf.freeze()
    }

    pub fn decode(mut bytes: &[u8]) -> Result<Frame, WireError> {
        if bytes.len() < 3 {
            return Err(WireError::Truncated);
        }
        let tag = bytes.get_u8();
        let sender = bytes.get_u16_le();
        match tag {
            0x01 => {
                if bytes.len() != 2 {
                    return Err(WireError::BadLength);
                }
                let phase = bytes.get_u8();
                let flags = bytes.get_u8();
                Ok(Frame::Beacon { sender, phase, flags })
            }
            0x02 => {
                if !bytes.is_empty() {
                    return Err(WireError::BadLength);
                }
                Ok(Frame::Request { sender })
            }
            0x03 => {
                if bytes.is_empty() || (bytes.len() - 1) % 4 != 0 {
                    return Err(WireError::BadLength);
                }
                let seq = bytes.get_u8();
                let mut payload = Vec::with_capacity(bytes.len() / 4);
                while bytes.has_remaining() {
                    let light = bytes.get_i16_le();
                    let motion = bytes.get_i16_le();
                    payload.push(SamplePair { light, motion });
                }
                Ok(Frame::Data { sender, seq, payload })
            }
            0x04 => {
                if bytes.len() != 1 {
                    return Err(WireError::BadLength);
                }
                Ok(Frame::Ack { sender, seq: bytes.get_u8() })
            }
            0x05 => {
                if bytes.len() != 1 {
                    return Err(WireError::BadLength);
                }
                Ok(Frame::RequestAck { sender, seq: bytes.get_u8() })
            }
            other => Err(WireError::UnknownType(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LINK_MTU;

    #[test]
    fn beacon_layout() {
        let frame = Frame::Beacon { sender: 0x0102, phase: 1, flags: FLAG_ACK };
        let bytes = frame.encode();
        assert_eq!(&bytes[..], &[0x01, 0x02, 0x01, 0x01, 0x01]);
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn data_frame_round_trips() {
        let payload: Vec<SamplePair> =
            (0..20).map(|i| SamplePair::new(100 + i, -i)).collect();
        let frame = Frame::Data { sender: 7, seq: 2, payload };
        let bytes = frame.encode();
        assert_eq!(bytes.len(), 4 + 20 * 4);
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn data_frame_of_twenty_pairs_fits_mtu() {
        let payload = vec![SamplePair::default(); 20];
        let frame = Frame::Data { sender: 1, seq: 0, payload };
        assert!(frame.encoded_len() <= LINK_MTU);
    }

    #[test]
    fn ack_and_request_ack_layouts() {
        let ack = Frame::Ack { sender: 3, seq: 9 };
        assert_eq!(&ack.encode()[..], &[0x04, 0x03, 0x00, 0x09]);
        let ra = Frame::RequestAck { sender: 3, seq: 0 };
        assert_eq!(&ra.encode()[..], &[0x05, 0x03, 0x00, 0x00]);
        assert_eq!(Frame::decode(&ack.encode()).unwrap(), ack);
        assert_eq!(Frame::decode(&ra.encode()).unwrap(), ra);
    }

    #[test]
    fn short_and_malformed_frames_are_rejected() {
        assert_eq!(Frame::decode(&[]), Err(WireError::Truncated));
        assert_eq!(Frame::decode(&[0x04, 0x01]), Err(WireError::Truncated));
        // ack missing its sequence byte
        assert_eq!(Frame::decode(&[0x04, 0x01, 0x00]), Err(WireError::BadLength));
        // data payload not a whole number of pairs
        assert_eq!(
            Frame::decode(&[0x03, 0x01, 0x00, 0x00, 0xaa, 0xbb, 0xcc]),
            Err(WireError::BadLength)
        );
        assert_eq!(
            Frame::decode(&[0x7f, 0x01, 0x00]),
            Err(WireError::UnknownType(0x7f))
        );
    }
}
