//! # frftp-core
//!
//! The FRFTP reliable-transport engine: sliding-window selective-repeat
//! ARQ with cumulative + 64-bit SACK acknowledgment over a fixed 7-byte
//! wire header, plus the START/DATA/END session lifecycle for both
//! endpoints. No congestion control and no adaptive RTO — the window and
//! retransmission timeout are static configuration values.
//!
//! ## Crate structure
//!
//! - [`wire`] — Fixed-layout packet header and payload encode/decode
//! - [`pool`] — Per-segment state tables (sender acked/tx_cnt/sent_ts, receiver gap bitmap)
//! - [`arq`] — ACK/SACK application and timeout-driven retransmission
//! - [`session`] — Configuration, derived parameters, session phase
//! - [`io`] — Byte source/sink and datagram socket capability traits
//! - [`stats`] — Per-session counters
//! - [`sender`] — Sender engine: handshake, transmit/ack/retransmit cycle, END
//! - [`receiver`] — Receiver engine: datagram handling, write-in-place assembly
//! - [`error`] — Typed error taxonomy

pub mod arq;
pub mod error;
pub mod io;
pub mod pool;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod stats;
pub mod wire;

pub use error::FrftpError;
