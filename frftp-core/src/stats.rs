//! # Session Statistics
//!
//! A small per-session counter block, serializable so a binary can dump it
//! as the final `--stats-json` report. Trimmed from the teacher lineage's
//! `SenderStats`/`ReceiverStats` down to what a single-flow, no-FEC,
//! no-congestion-control file transfer actually produces.

use serde::Serialize;

#[derive(Debug, Default, Serialize)]
pub struct SenderStats {
    pub segments_sent: u64,
    pub segments_retransmitted: u64,
    pub bytes_sent: u64,
    pub handshake_retries: u32,
    pub acks_received: u64,
    pub duplicate_acks: u64,
    pub malformed_frames_dropped: u64,
}

impl SenderStats {
    pub fn retransmit_ratio(&self) -> f64 {
        if self.segments_sent == 0 {
            0.0
        } else {
            self.segments_retransmitted as f64 / self.segments_sent as f64
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct ReceiverStats {
    pub segments_received: u64,
    pub duplicate_segments: u64,
    pub bytes_received: u64,
    pub acks_sent: u64,
    pub malformed_frames_dropped: u64,
    pub foreign_datagrams_ignored: u64,
}

impl ReceiverStats {
    pub fn duplicate_ratio(&self) -> f64 {
        let total = self.segments_received + self.duplicate_segments;
        if total == 0 {
            0.0
        } else {
            self.duplicate_segments as f64 / total as f64
        }
    }
}
