//! Multi-fragment VDM/VDO reassembly. The
//! original's single-task model processes one sentence at a time with
//! no concurrent reassembly in flight per channel; this keeps a small
//! bounded map instead to tolerate the occasional stalled or lost
//! fragment without blocking unrelated sequence ids.

use std::collections::{HashMap, VecDeque};

use crate::nmea0183::fields::RadioChannel;

const MAX_PENDING_PER_CHANNEL: usize = 4;

struct Pending {
    total_fragments: u32,
    next_fragment: u32,
    payload: String,
    fill_bits: u32,
}

/// Per-channel reassembly state, keyed by the VDM/VDO sequential
/// message id. A bounded number of in-flight reassemblies are kept per
/// channel; the oldest is evicted on overflow (spec: "bounded; oldest
/// discarded on overflow").
#[derive(Default)]
pub struct Reassembler {
    channel_a: ChannelState,
    channel_b: ChannelState,
}

#[derive(Default)]
struct ChannelState {
    pending: HashMap<u32, Pending>,
    order: VecDeque<u32>,
}

impl ChannelState {
    fn evict_oldest_if_full(&mut self) {
        if self.pending.len() >= MAX_PENDING_PER_CHANNEL {
            if let Some(oldest) = self.order.pop_front() {
                self.pending.remove(&oldest);
            }
        }
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel_mut(&mut self, channel: Option<RadioChannel>) -> &mut ChannelState {
        match channel {
            Some(RadioChannel::B) => &mut self.channel_b,
            _ => &mut self.channel_a,
        }
    }

    /// Feed one VDM/VDO fragment. Returns the fully reassembled
    /// (payload, fill_bits) pair once the last fragment of a sequence
    /// arrives, or for single-fragment messages immediately.
    pub fn feed(
        &mut self,
        channel: Option<RadioChannel>,
        total_fragments: u32,
        fragment_number: u32,
        sequential_id: Option<u32>,
        payload: &str,
        fill_bits: u32,
    ) -> Option<(String, u32)> {
        if total_fragments <= 1 {
            return Some((payload.to_string(), fill_bits));
        }

        let sequential_id = sequential_id.unwrap_or(0);
        let state = self.channel_mut(channel);

        if fragment_number == 1 {
            state.evict_oldest_if_full();
            state.pending.insert(
                sequential_id,
                Pending { total_fragments, next_fragment: 1, payload: String::new(), fill_bits: 0 },
            );
            state.order.push_back(sequential_id);
        }

        let Some(pending) = state.pending.get_mut(&sequential_id) else {
            log::warn!("AIS fragment {fragment_number} of sequence {sequential_id} arrived with no start fragment seen; discarding");
            return None;
        };

        // Monotonic fragment index invariant: a gap discards the partial message.
        if fragment_number != pending.next_fragment {
            log::warn!(
                "AIS fragment sequence gap (expected {}, got {fragment_number}); discarding partial message",
                pending.next_fragment
            );
            state.pending.remove(&sequential_id);
            state.order.retain(|id| *id != sequential_id);
            return None;
        }

        pending.payload.push_str(payload);
        pending.fill_bits = fill_bits;
        pending.next_fragment += 1;

        if pending.next_fragment > pending.total_fragments {
            let pending = state.pending.remove(&sequential_id).unwrap();
            state.order.retain(|id| *id != sequential_id);
            Some((pending.payload, pending.fill_bits))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_fragment_decodes_immediately() {
        let mut r = Reassembler::new();
        let result = r.feed(Some(RadioChannel::A), 1, 1, None, "abc", 0);
        assert_eq!(result, Some(("abc".to_string(), 0)));
    }

    #[test]
    fn multi_fragment_reassembles_in_order() {
        let mut r = Reassembler::new();
        assert_eq!(r.feed(Some(RadioChannel::A), 2, 1, Some(5), "AB", 0), None);
        let result = r.feed(Some(RadioChannel::A), 2, 2, Some(5), "CD", 2);
        assert_eq!(result, Some(("ABCD".to_string(), 2)));
    }

    #[test]
    fn fragment_gap_discards_partial_message() {
        let mut r = Reassembler::new();
        assert_eq!(r.feed(Some(RadioChannel::A), 3, 1, Some(7), "AB", 0), None);
        // fragment 3 arrives without fragment 2: gap discards the partial.
        let result = r.feed(Some(RadioChannel::A), 3, 3, Some(7), "EF", 0);
        assert_eq!(result, None);
    }

    #[test]
    fn channels_do_not_interfere() {
        let mut r = Reassembler::new();
        assert_eq!(r.feed(Some(RadioChannel::A), 2, 1, Some(1), "A1", 0), None);
        assert_eq!(r.feed(Some(RadioChannel::B), 2, 1, Some(1), "B1", 0), None);
        let a = r.feed(Some(RadioChannel::A), 2, 2, Some(1), "A2", 0);
        let b = r.feed(Some(RadioChannel::B), 2, 2, Some(1), "B2", 0);
        assert_eq!(a, Some(("A1A2".to_string(), 0)));
        assert_eq!(b, Some(("B1B2".to_string(), 0)));
    }

    #[test]
    fn overflow_evicts_oldest_pending_sequence() {
        let mut r = Reassembler::new();
        for seq in 0..(MAX_PENDING_PER_CHANNEL as u32 + 1) {
            r.feed(Some(RadioChannel::A), 2, 1, Some(seq), "X", 0);
        }
        // Sequence 0 should have been evicted; completing it now finds no start fragment.
        let result = r.feed(Some(RadioChannel::A), 2, 2, Some(0), "Y", 0);
        assert_eq!(result, None);
    }
}
