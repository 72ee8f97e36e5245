//! # Receiver Engine
//!
//! Decodes incoming datagrams and drives the receiver side of the session:
//! accepting START, writing DATA payloads in place at their computed
//! offset, tracking the gap bitmap, and replying with ACK/SACK. Unlike the
//! sender, the receiver never blocks on a timer of its own — every reply
//! is produced synchronously in response to an arriving datagram, so
//! [`ReceiverEngine::handle_datagram`] takes the raw bytes directly rather
//! than owning a [`DatagramSocket`](crate::io::DatagramSocket); the binary's
//! event loop owns the socket and feeds datagrams in.

use std::net::SocketAddr;

use bytes::Bytes;
use tracing::{info, warn};

use crate::error::FrftpError;
use crate::io::ByteSink;
use crate::pool::ReceiverSegments;
use crate::session::{total_segs, ReceiverConfig};
use crate::stats::ReceiverStats;
use crate::wire::Packet;

enum ReceiverState {
    AwaitingStart,
    Active {
        peer: SocketAddr,
        segments: ReceiverSegments,
        payload_max: u32,
    },
}

pub struct ReceiverEngine<Sink> {
    config: ReceiverConfig,
    sink: Sink,
    state: ReceiverState,
    pub stats: ReceiverStats,
}

impl<Sink: ByteSink> ReceiverEngine<Sink> {
    pub fn new(config: ReceiverConfig, sink: Sink) -> Self {
        ReceiverEngine {
            config,
            sink,
            state: ReceiverState::AwaitingStart,
            stats: ReceiverStats::default(),
        }
    }

    pub fn is_complete(&self) -> bool {
        match &self.state {
            ReceiverState::Active { segments, .. } => segments.is_complete(),
            ReceiverState::AwaitingStart => false,
        }
    }

    /// Verifies the transfer delivered exactly `expected_total` bytes
    /// (spec §7 `SizeMismatch`), to be called once [`is_complete`] is true.
    pub fn verify_size(&self) -> Result<(), FrftpError> {
        if let ReceiverState::Active { segments, .. } = &self.state {
            if segments.received != segments.expected_total {
                return Err(FrftpError::SizeMismatch {
                    expected: segments.expected_total,
                    received: segments.received,
                });
            }
        }
        Ok(())
    }

    pub fn into_sink(self) -> Sink {
        self.sink
    }

    /// Handles one raw datagram. Returns `Ok(Some(ack_bytes))` when a
    /// reply should be sent back to `from`, `Ok(None)` when the datagram
    /// is silently dropped (malformed, wrong peer, pre-handshake garbage,
    /// or an oversize DATA per spec §9's open-question resolution).
    pub fn handle_datagram(
        &mut self,
        raw: &[u8],
        from: SocketAddr,
    ) -> Result<Option<Bytes>, FrftpError> {
        let Some(packet) = Packet::decode(raw) else {
            self.stats.malformed_frames_dropped += 1;
            return Ok(None);
        };

        match &self.state {
            ReceiverState::AwaitingStart => self.handle_pre_start(packet, from),
            ReceiverState::Active { peer, .. } => {
                if from != *peer {
                    self.stats.foreign_datagrams_ignored += 1;
                    return Ok(None);
                }
                self.handle_active(packet)
            }
        }
    }

    fn handle_pre_start(
        &mut self,
        packet: Packet,
        from: SocketAddr,
    ) -> Result<Option<Bytes>, FrftpError> {
        let Packet::Start { file_size } = packet else {
            // Anything other than a valid START is ignored before handshake.
            return Ok(None);
        };
        let payload_max = self.config.payload_max();
        let segs = total_segs(file_size, payload_max);
        self.sink.set_len(file_size).map_err(FrftpError::IoError)?;
        let segments = ReceiverSegments::new(segs, file_size);
        info!(file_size, total_segs = segs, peer = %from, "START accepted, peer locked");
        self.state = ReceiverState::Active {
            peer: from,
            segments,
            payload_max,
        };
        self.stats.acks_sent += 1;
        Ok(Some(self.current_ack()))
    }

    fn handle_active(&mut self, packet: Packet) -> Result<Option<Bytes>, FrftpError> {
        match packet {
            Packet::Start { .. } => {
                // Idempotent repeat: acknowledge current state, never reset.
                self.stats.acks_sent += 1;
                Ok(Some(self.current_ack()))
            }
            Packet::Data { seq, payload } => self.handle_data(seq, payload),
            Packet::End { .. } => self.handle_end(),
            Packet::Ack { .. } => Ok(None), // the receiver is never sent an ACK
        }
    }

    fn handle_data(&mut self, seq: u32, payload: Bytes) -> Result<Option<Bytes>, FrftpError> {
        let ReceiverState::Active {
            segments,
            payload_max,
            ..
        } = &mut self.state
        else {
            unreachable!("handle_data only called while Active")
        };

        if seq == 0 || seq > segments.total_segs() || payload.len() as u32 > *payload_max {
            // Oversize or out-of-range DATA: drop, do not ACK (spec §9).
            self.stats.malformed_frames_dropped += 1;
            warn!(seq, len = payload.len(), "dropped oversize/out-of-range DATA");
            return Ok(None);
        }

        let offset = (seq as u64 - 1) * *payload_max as u64;
        if segments.mark_received(seq, payload.len() as u64) {
            self.sink
                .write_at(offset, &payload)
                .map_err(FrftpError::IoError)?;
            self.stats.segments_received += 1;
            self.stats.bytes_received += payload.len() as u64;
        } else {
            self.stats.duplicate_segments += 1;
        }
        self.stats.acks_sent += 1;
        Ok(Some(self.current_ack()))
    }

    fn handle_end(&mut self) -> Result<Option<Bytes>, FrftpError> {
        let ack = self.current_ack();
        self.stats.acks_sent += 1;
        if self.is_complete() {
            self.sink.flush().map_err(FrftpError::IoError)?;
            info!("session complete, sink flushed");
        }
        Ok(Some(ack))
    }

    fn current_ack(&self) -> Bytes {
        let (cum_ack, sack_mask) = match &self.state {
            ReceiverState::Active { segments, .. } => (segments.cum_ack(), segments.sack_mask()),
            ReceiverState::AwaitingStart => (0, 0),
        };
        Packet::Ack {
            cum_ack,
            sack_mask,
        }
        .encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::mem::MemorySink;

    fn cfg() -> ReceiverConfig {
        ReceiverConfig {
            bind_port: 9000,
            mtu: 1500,
            rto_ms: 100,
            zerocopy: false,
        }
    }

    fn addr(n: u16) -> SocketAddr {
        format!("127.0.0.1:{n}").parse().unwrap()
    }

    #[test]
    fn start_is_accepted_and_locks_peer() {
        let mut rx = ReceiverEngine::new(cfg(), MemorySink::default());
        let frame = Packet::Start { file_size: 10 }.encode();
        let ack = rx.handle_datagram(&frame, addr(1)).unwrap().unwrap();
        assert_eq!(Packet::decode(&ack), Some(Packet::Ack { cum_ack: 0, sack_mask: 0 }));
    }

    #[test]
    fn datagrams_from_a_different_peer_are_ignored_after_lock() {
        let mut rx = ReceiverEngine::new(cfg(), MemorySink::default());
        rx.handle_datagram(&Packet::Start { file_size: 10 }.encode(), addr(1))
            .unwrap();
        let data = Packet::Data { seq: 1, payload: Bytes::from_static(b"0123456789") }.encode();
        let result = rx.handle_datagram(&data, addr(2)).unwrap();
        assert!(result.is_none());
        assert_eq!(rx.stats.foreign_datagrams_ignored, 1);
    }

    #[test]
    fn duplicate_start_is_idempotent_and_does_not_reset() {
        let mut rx = ReceiverEngine::new(cfg(), MemorySink::default());
        rx.handle_datagram(&Packet::Start { file_size: 10 }.encode(), addr(1))
            .unwrap();
        let data = Packet::Data { seq: 1, payload: Bytes::from_static(b"0123456789") }.encode();
        rx.handle_datagram(&data, addr(1)).unwrap();

        let ack = rx
            .handle_datagram(&Packet::Start { file_size: 10 }.encode(), addr(1))
            .unwrap()
            .unwrap();
        assert_eq!(Packet::decode(&ack), Some(Packet::Ack { cum_ack: 1, sack_mask: 0 }));
    }

    #[test]
    fn data_is_written_in_place_and_duplicate_leaves_sink_unchanged() {
        let mut rx = ReceiverEngine::new(cfg(), MemorySink::default());
        rx.handle_datagram(&Packet::Start { file_size: 10 }.encode(), addr(1))
            .unwrap();
        let data = Packet::Data { seq: 1, payload: Bytes::from_static(b"0123456789") }.encode();
        let ack1 = rx.handle_datagram(&data, addr(1)).unwrap().unwrap();
        let ack2 = rx.handle_datagram(&data, addr(1)).unwrap().unwrap();
        assert_eq!(ack1, ack2);
        assert_eq!(rx.stats.duplicate_segments, 1);
        assert_eq!(rx.into_sink().into_inner(), b"0123456789".to_vec());
    }

    #[test]
    fn oversize_data_is_dropped_not_acked() {
        let mut rx = ReceiverEngine::new(cfg(), MemorySink::default());
        rx.handle_datagram(&Packet::Start { file_size: 10_000 }.encode(), addr(1))
            .unwrap();
        let oversize_payload = Bytes::from(vec![0u8; 2000]);
        let data = Packet::Data { seq: 1, payload: oversize_payload }.encode();
        let result = rx.handle_datagram(&data, addr(1)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn end_marks_complete_only_when_cum_ack_matches_total_segs() {
        let mut rx = ReceiverEngine::new(cfg(), MemorySink::default());
        rx.handle_datagram(&Packet::Start { file_size: 10 }.encode(), addr(1))
            .unwrap();
        assert!(!rx.is_complete());
        rx.handle_datagram(
            &Packet::End { seq: 2 }.encode(),
            addr(1),
        )
        .unwrap();
        assert!(!rx.is_complete(), "no DATA delivered yet");

        let data = Packet::Data { seq: 1, payload: Bytes::from_static(b"0123456789") }.encode();
        rx.handle_datagram(&data, addr(1)).unwrap();
        rx.handle_datagram(&Packet::End { seq: 2 }.encode(), addr(1))
            .unwrap();
        assert!(rx.is_complete());
        assert!(rx.verify_size().is_ok());
    }

    #[test]
    fn reordered_segments_still_converge() {
        let mut rx = ReceiverEngine::new(cfg(), MemorySink::default());
        rx.handle_datagram(&Packet::Start { file_size: 30 }.encode(), addr(1))
            .unwrap();
        let seg = |seq: u32, byte: u8| Packet::Data { seq, payload: Bytes::from(vec![byte; 10]) }.encode();

        let ack = rx.handle_datagram(&seg(3, b'c'), addr(1)).unwrap().unwrap();
        assert_eq!(Packet::decode(&ack), Some(Packet::Ack { cum_ack: 0, sack_mask: 0b100 }));

        let ack = rx.handle_datagram(&seg(1, b'a'), addr(1)).unwrap().unwrap();
        assert_eq!(Packet::decode(&ack), Some(Packet::Ack { cum_ack: 1, sack_mask: 0b010 }));

        let ack = rx.handle_datagram(&seg(2, b'b'), addr(1)).unwrap().unwrap();
        assert_eq!(Packet::decode(&ack), Some(Packet::Ack { cum_ack: 3, sack_mask: 0 }));
        assert!(rx.is_complete());
    }
}
