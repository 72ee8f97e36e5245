//! # Wire Codec
//!
//! Fixed 7-byte packet header plus the two small payload structures
//! (START's file size, ACK's cumulative+SACK fields). All multi-byte
//! fields are big-endian. Modeled as value types with explicit
//! encode/decode into `bytes::Buf`/`BufMut`, never as a reinterpreted
//! raw struct.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Header size in bytes: `type(1) + seq(4) + len(2)`.
pub const HEADER_LEN: usize = 7;

/// ACK payload size in bytes: `cum_ack(4) + sack_mask(8)`.
pub const ACK_LEN: usize = 12;

/// START payload size in bytes: `file_size(8)`.
pub const START_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Data = 0x01,
    Start = 0x02,
    End = 0x03,
    Ack = 0x10,
}

impl PacketType {
    /// Unknown type bytes are dropped silently per the wire codec contract.
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(PacketType::Data),
            0x02 => Some(PacketType::Start),
            0x03 => Some(PacketType::End),
            0x10 => Some(PacketType::Ack),
            _ => None,
        }
    }
}

/// The 7-byte fixed header shared by every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub packet_type: PacketType,
    pub seq: u32,
    pub len: u16,
}

impl Header {
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.packet_type as u8);
        buf.put_u32(self.seq);
        buf.put_u16(self.len);
    }

    /// Rejects any buffer shorter than [`HEADER_LEN`] and any unknown type byte.
    pub fn decode(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < HEADER_LEN {
            return None;
        }
        let packet_type = PacketType::from_byte(buf.get_u8())?;
        let seq = buf.get_u32();
        let len = buf.get_u16();
        Some(Header {
            packet_type,
            seq,
            len,
        })
    }
}

/// A fully decoded frame, header and payload together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Start {
        file_size: u64,
    },
    Data {
        seq: u32,
        payload: Bytes,
    },
    End {
        seq: u32,
    },
    Ack {
        cum_ack: u32,
        sack_mask: u64,
    },
}

impl Packet {
    pub fn encode(&self) -> Bytes {
        match self {
            Packet::Start { file_size } => {
                let mut buf = BytesMut::with_capacity(HEADER_LEN + START_LEN);
                Header {
                    packet_type: PacketType::Start,
                    seq: 0,
                    len: START_LEN as u16,
                }
                .encode(&mut buf);
                buf.put_u64(*file_size);
                buf.freeze()
            }
            Packet::Data { seq, payload } => {
                let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
                Header {
                    packet_type: PacketType::Data,
                    seq: *seq,
                    len: payload.len() as u16,
                }
                .encode(&mut buf);
                buf.extend_from_slice(payload);
                buf.freeze()
            }
            Packet::End { seq } => {
                let mut buf = BytesMut::with_capacity(HEADER_LEN);
                Header {
                    packet_type: PacketType::End,
                    seq: *seq,
                    len: 0,
                }
                .encode(&mut buf);
                buf.freeze()
            }
            Packet::Ack {
                cum_ack,
                sack_mask,
            } => {
                let mut buf = BytesMut::with_capacity(HEADER_LEN + ACK_LEN);
                Header {
                    packet_type: PacketType::Ack,
                    seq: 0,
                    len: ACK_LEN as u16,
                }
                .encode(&mut buf);
                buf.put_u32(*cum_ack);
                buf.put_u64(*sack_mask);
                buf.freeze()
            }
        }
    }

    /// Decodes a frame from a raw datagram. Returns `None` for anything
    /// shorter than the header, a declared `len` that overruns the
    /// buffer, an unknown type byte, or a payload length that disagrees
    /// with the frame's fixed shape (e.g. an ACK whose `len != 12`).
    /// The caller treats `None` as "drop silently, never fatal".
    pub fn decode(raw: &[u8]) -> Option<Self> {
        let mut buf = raw;
        let header = Header::decode(&mut buf)?;
        if buf.remaining() < header.len as usize {
            return None;
        }
        match header.packet_type {
            PacketType::Start => {
                if header.seq != 0 || header.len as usize != START_LEN {
                    return None;
                }
                let file_size = buf.get_u64();
                Some(Packet::Start { file_size })
            }
            PacketType::Data => {
                if header.seq == 0 {
                    return None;
                }
                let payload = Bytes::copy_from_slice(&buf[..header.len as usize]);
                Some(Packet::Data {
                    seq: header.seq,
                    payload,
                })
            }
            PacketType::End => {
                if header.len != 0 {
                    return None;
                }
                Some(Packet::End { seq: header.seq })
            }
            PacketType::Ack => {
                if header.seq != 0 || header.len as usize != ACK_LEN {
                    return None;
                }
                let cum_ack = buf.get_u32();
                let sack_mask = buf.get_u64();
                Some(Packet::Ack {
                    cum_ack,
                    sack_mask,
                })
            }
        }
    }
}
