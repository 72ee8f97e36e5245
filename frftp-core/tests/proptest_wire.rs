//! Property-based tests for the FRFTP wire codec and ARQ ACK application.
//!
//! Covers the round-trip and idempotence invariants named in the spec's
//! testable-invariants section: every packet variant survives
//! encode/decode for arbitrary field values, and repeated ACK application
//! never un-acks or double-advances `base`.

use bytes::Bytes;
use proptest::prelude::*;

use frftp_core::arq::apply_ack;
use frftp_core::pool::SenderSegments;
use frftp_core::wire::{Packet, ACK_LEN, HEADER_LEN, START_LEN};

fn payload_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..1400)
}

fn packet() -> impl Strategy<Value = Packet> {
    prop_oneof![
        any::<u64>().prop_map(|file_size| Packet::Start { file_size }),
        (1u32.., payload_bytes())
            .prop_map(|(seq, payload)| Packet::Data { seq, payload: Bytes::from(payload) }),
        (1u32..).prop_map(|seq| Packet::End { seq }),
        (any::<u32>(), any::<u64>())
            .prop_map(|(cum_ack, sack_mask)| Packet::Ack { cum_ack, sack_mask }),
    ]
}

proptest! {
    #[test]
    fn packet_roundtrip(pkt in packet()) {
        let encoded = pkt.encode();
        let expected_len = match &pkt {
            Packet::Start { .. } => HEADER_LEN + START_LEN,
            Packet::Data { payload, .. } => HEADER_LEN + payload.len(),
            Packet::End { .. } => HEADER_LEN,
            Packet::Ack { .. } => HEADER_LEN + ACK_LEN,
        };
        prop_assert_eq!(encoded.len(), expected_len);
        prop_assert_eq!(Packet::decode(&encoded), Some(pkt));
    }

    #[test]
    fn decode_never_panics_on_arbitrary_bytes(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        // Garbage input must decode to None, never panic — the receiver
        // feeds every arriving datagram through this path unconditionally.
        let _ = Packet::decode(&bytes);
    }

    #[test]
    fn apply_ack_is_idempotent(
        total_segs in 1u32..200,
        cum_ack in 0u32..200,
        sack_mask in any::<u64>(),
    ) {
        let mut s = SenderSegments::new(total_segs);
        let base_first = apply_ack(&mut s, cum_ack, sack_mask);
        let acked_snapshot: Vec<bool> = (0..=total_segs).map(|seq| s.is_acked(seq)).collect();

        let base_second = apply_ack(&mut s, cum_ack, sack_mask);
        prop_assert_eq!(base_second, base_first);
        let acked_again: Vec<bool> = (0..=total_segs).map(|seq| s.is_acked(seq)).collect();
        prop_assert_eq!(acked_again, acked_snapshot);
    }

    #[test]
    fn apply_ack_never_unacks_a_segment(
        total_segs in 1u32..200,
        cum_ack_a in 0u32..200,
        sack_a in any::<u64>(),
        cum_ack_b in 0u32..200,
        sack_b in any::<u64>(),
    ) {
        let mut s = SenderSegments::new(total_segs);
        apply_ack(&mut s, cum_ack_a, sack_a);
        let acked_after_a: Vec<bool> = (0..=total_segs).map(|seq| s.is_acked(seq)).collect();

        apply_ack(&mut s, cum_ack_b, sack_b);
        for seq in 0..=total_segs {
            if acked_after_a[seq as usize] {
                prop_assert!(s.is_acked(seq));
            }
        }
    }

    #[test]
    fn apply_ack_base_never_exceeds_total_segs_plus_one(
        total_segs in 1u32..200,
        cum_ack in 0u32..300,
        sack_mask in any::<u64>(),
    ) {
        let mut s = SenderSegments::new(total_segs);
        let base = apply_ack(&mut s, cum_ack, sack_mask);
        prop_assert!(base <= total_segs + 1);
    }
}

