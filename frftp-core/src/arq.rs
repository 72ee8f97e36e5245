//! # ARQ — sender-side ACK application and timeout retransmission
//!
//! FRFTP has no NACK wire type: the receiver only ever sends ACKs, and the
//! sender's retransmission trigger is a pure per-segment timeout scan. This
//! module plays the role the teacher lineage's `LossDetector` +
//! `RetransmitTracker` played for a NACK-driven scheme, reshaped around a
//! timeout-driven one: applying a received ACK's cumulative+SACK fields
//! onto [`SenderSegments`], then scanning the in-flight window for segments
//! whose retransmission timer has fired.

use std::time::{Duration, Instant};

use crate::error::FrftpError;
use crate::pool::SenderSegments;

/// Applies an incoming ACK to the sender's segment table (spec §4.3 step 2).
///
/// Returns the (possibly advanced) `base` after the cumulative ack has been
/// applied, `base` re-walked, each set SACK bit applied, and `base`
/// re-walked a second time — the open question in the spec (§9) about a
/// SACK bit letting `base` jump past `cum_ack` within the same tick is
/// resolved here by doing exactly that second walk.
pub fn apply_ack(segments: &mut SenderSegments, cum_ack: u32, sack_mask: u64) -> u32 {
    let total_segs = segments.total_segs();
    let cum_ack = cum_ack.min(total_segs);

    let mut seq = segments.base();
    while seq <= cum_ack {
        segments.mark_acked(seq);
        seq += 1;
    }

    for i in 0..64u32 {
        let s = cum_ack as u64 + 1 + i as u64;
        if s > total_segs as u64 {
            break;
        }
        if sack_mask & (1u64 << i) != 0 {
            segments.mark_acked(s as u32);
        }
    }

    segments.base()
}

/// Scans `[base, next_to_send)` for segments whose retransmission timer has
/// fired, returning the list (in ascending seq order) of segments that need
/// to go back out this tick. Bumps `tx_cnt`/`sent_ts` for each one scheduled.
///
/// Fails with [`FrftpError::RetriesExhausted`] the instant any unacked
/// segment's `tx_cnt` has already reached `retries` — retry exhaustion is
/// checked before the timeout test, matching spec §4.3 step 3's ordering.
pub fn scan_timeouts(
    segments: &mut SenderSegments,
    base: u32,
    next_to_send: u32,
    rto: Duration,
    retries: u32,
    now: Instant,
) -> Result<Vec<u32>, FrftpError> {
    let mut due = Vec::new();
    for seq in base..next_to_send {
        if segments.is_acked(seq) {
            continue;
        }
        if segments.tx_count(seq) >= retries {
            return Err(FrftpError::RetriesExhausted(seq));
        }
        let elapsed_due = match segments.sent_at(seq) {
            Some(sent) => now.saturating_duration_since(sent) >= rto,
            None => true,
        };
        if elapsed_due {
            segments.record_send(seq, now);
            due.push(seq);
        }
    }
    Ok(due)
}
