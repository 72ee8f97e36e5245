//! # Session Control
//!
//! Configuration, derived parameters (`payload_max`, `total_segs`), and the
//! coarse session phase each engine moves through. The teacher lineage's
//! `Session` state machine (`Idle -> Connecting -> Established -> Closing
//! -> Closed`) is the model for [`SessionPhase`]; link bonding
//! (`LinkInfo`/`links`) and the adaptive-RTO `RttTracker` it also carried
//! have no counterpart here — FRFTP is single-peer and RTO is a static
//! config value, never estimated (spec Non-goals).

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::FrftpError;

/// IPv4/UDP + header overhead subtracted from the MTU to get `payload_max`.
const OVERHEAD_BYTES: u32 = 28 + crate::wire::HEADER_LEN as u32;
const MIN_PAYLOAD_MAX: u32 = 512;
const MIN_MTU: u32 = 576;

fn payload_max_for_mtu(mtu: u32) -> u32 {
    mtu.saturating_sub(OVERHEAD_BYTES).max(MIN_PAYLOAD_MAX)
}

/// Sender-side configuration (spec §6).
#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub peer_addr: SocketAddr,
    pub mtu: u32,
    pub rto_ms: u64,
    pub retries: u32,
    pub win: u32,
    pub zerocopy: bool,
}

impl SenderConfig {
    pub fn validate(&self) -> Result<(), FrftpError> {
        if self.mtu < MIN_MTU {
            return Err(FrftpError::InvalidConfig(format!(
                "mtu {} below minimum {}",
                self.mtu, MIN_MTU
            )));
        }
        if self.win == 0 || self.win > 256 {
            return Err(FrftpError::InvalidConfig(format!(
                "win {} outside recommended range 1..=256",
                self.win
            )));
        }
        if self.retries == 0 {
            return Err(FrftpError::InvalidConfig("retries must be >= 1".into()));
        }
        Ok(())
    }

    pub fn payload_max(&self) -> u32 {
        payload_max_for_mtu(self.mtu)
    }

    pub fn rto(&self) -> Duration {
        Duration::from_millis(self.rto_ms)
    }
}

/// Receiver-side configuration. `win` and `retries` have no meaning for the
/// receiver (it never schedules transmissions or retransmissions), so both
/// are omitted; `rto_ms` instead bounds the idle-poll timeout used to check
/// for shutdown between datagrams.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub bind_port: u16,
    pub mtu: u32,
    pub rto_ms: u64,
    pub zerocopy: bool,
}

impl ReceiverConfig {
    pub fn validate(&self) -> Result<(), FrftpError> {
        if self.mtu < MIN_MTU {
            return Err(FrftpError::InvalidConfig(format!(
                "mtu {} below minimum {}",
                self.mtu, MIN_MTU
            )));
        }
        Ok(())
    }

    pub fn payload_max(&self) -> u32 {
        payload_max_for_mtu(self.mtu)
    }

    pub fn rto(&self) -> Duration {
        Duration::from_millis(self.rto_ms)
    }
}

/// `total_segs = ceil(file_size / payload_max)`. A zero-byte file yields
/// `total_segs = 0`: invariant 4 requires every transmitted DATA segment
/// to carry `len > 0`, which a zero-byte file cannot satisfy, so the
/// session has no segments to send and is complete immediately after
/// the START handshake.
pub fn total_segs(file_size: u64, payload_max: u32) -> u32 {
    let payload_max = payload_max as u64;
    file_size.div_ceil(payload_max) as u32
}

/// Coarse lifecycle phase, mirrored on both endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Sender: START not yet acknowledged. Receiver: no valid START seen.
    Handshaking,
    /// Segments are flowing (sender) or being accepted (receiver).
    Transferring,
    /// Sender: draining the END handshake. Receiver: cum_ack == total_segs
    /// but still answering retransmitted ENDs/DATA.
    Closing,
    /// Session fully confirmed complete on both sides.
    Done,
}
