//! Slot-order generator and order-aware triple helpers (spec §4.2, §4.5).
//!
//! "Consecutive" is always defined over the *day-index* axis of the
//! currently active order, not over raw slot ids — the same assignment can
//! have a different triple count depending on which of the orders below is
//! in play.

use crate::data::SlotId;
use std::collections::{BTreeMap, BTreeSet};

/// The base AM-only slot vector for `num_days` scheduling days: 0, 2, 4, ….
pub fn base_slots(num_days: u32) -> Vec<SlotId> {
    (0..num_days).map(|d| 2 * d).collect()
}

/// One named slot-order generator.
pub struct SlotOrder {
    pub name: &'static str,
    pub slots: Vec<SlotId>,
}

/// Emits the five diversifying orderings described in the spec, each a
/// permutation of `base`.
pub fn generate_orders(base: &[SlotId]) -> Vec<SlotOrder> {
    vec![
        SlotOrder { name: "linear", slots: base.to_vec() },
        SlotOrder { name: "split-interleave", slots: split_interleave(base) },
        SlotOrder { name: "outside-in", slots: outside_in(base) },
        SlotOrder { name: "stride-5", slots: stride_5(base) },
        SlotOrder { name: "expanding-middle", slots: expanding_middle(base) },
    ]
}

fn split_interleave(slots: &[SlotId]) -> Vec<SlotId> {
    let mid = slots.len() / 2;
    let left = &slots[..mid];
    let right = &slots[mid..];
    let mut out = Vec::with_capacity(slots.len());
    for (a, b) in left.iter().zip(right.iter()) {
        out.push(*a);
        out.push(*b);
    }
    out
}

fn outside_in(slots: &[SlotId]) -> Vec<SlotId> {
    let mut out = Vec::with_capacity(slots.len());
    let mut left = 0i64;
    let mut right = slots.len() as i64 - 1;
    while left <= right {
        out.push(slots[left as usize]);
        if left != right {
            out.push(slots[right as usize]);
        }
        left += 1;
        right -= 1;
    }
    out
}

fn stride_5(slots: &[SlotId]) -> Vec<SlotId> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(slots.len());
    for start in [0usize, 5, 2, 7, 4] {
        let mut i = start;
        while i < slots.len() {
            if seen.insert(i) {
                out.push(slots[i]);
            }
            i += 5;
        }
    }
    for (i, s) in slots.iter().enumerate() {
        if seen.insert(i) {
            out.push(*s);
        }
    }
    out
}

fn expanding_middle(slots: &[SlotId]) -> Vec<SlotId> {
    if slots.is_empty() {
        return Vec::new();
    }
    let mid = slots.len() / 2;
    let mut out = vec![slots[mid]];
    let mut offset = 1i64;
    loop {
        let left = mid as i64 - offset;
        let right = mid as i64 + offset;
        if left < 0 && right >= slots.len() as i64 {
            break;
        }
        if left >= 0 {
            out.push(slots[left as usize]);
        }
        if right < slots.len() as i64 {
            out.push(slots[right as usize]);
        }
        offset += 1;
    }
    out
}

/// slot -> day index and day index -> slot, for the given active day order.
pub fn day_maps(day_slots: &[SlotId]) -> BTreeMap<SlotId, usize> {
    day_slots
        .iter()
        .enumerate()
        .map(|(d, s)| (*s, d))
        .collect()
}

/// All (d, d+1, d+2) day-index windows fully present among `slots_set` under
/// `slot_to_day`.
pub fn triples_from_slots(
    slots_set: &BTreeSet<SlotId>,
    slot_to_day: &BTreeMap<SlotId, usize>,
    num_days: usize,
) -> Vec<(usize, usize, usize)> {
    let day_idxs: BTreeSet<usize> = slots_set.iter().filter_map(|s| slot_to_day.get(s).copied()).collect();
    let mut triples = Vec::new();
    if num_days < 3 {
        return triples;
    }
    for d in 0..(num_days - 2) {
        if day_idxs.contains(&d) && day_idxs.contains(&(d + 1)) && day_idxs.contains(&(d + 2)) {
            triples.push((d, d + 1, d + 2));
        }
    }
    triples
}

/// Whether adding `candidate_slot` (optionally replacing `old_slot`) to
/// `current_slots` would create a fresh triple.
pub fn triple_would_be_created(
    current_slots: &BTreeSet<SlotId>,
    candidate_slot: SlotId,
    slot_to_day: &BTreeMap<SlotId, usize>,
    num_days: usize,
    old_slot: Option<SlotId>,
) -> bool {
    let mut set = current_slots.clone();
    if let Some(old) = old_slot {
        set.remove(&old);
    }
    set.insert(candidate_slot);
    !triples_from_slots(&set, slot_to_day, num_days).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_are_permutations_of_base() {
        let base = base_slots(6);
        for order in generate_orders(&base) {
            let mut sorted = order.slots.clone();
            sorted.sort();
            assert_eq!(sorted, base, "order {} is not a permutation of base", order.name);
        }
    }

    #[test]
    fn deterministic_given_same_day_count() {
        let base = base_slots(10);
        let a = generate_orders(&base);
        let b = generate_orders(&base);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.slots, y.slots);
        }
    }

    #[test]
    fn triple_detection_is_order_aware() {
        let linear = base_slots(5); // 0,2,4,6,8 -> day 0..4 under linear order
        let slot_to_day = day_maps(&linear);
        let slots: BTreeSet<SlotId> = [0, 2, 4].into_iter().collect();
        assert_eq!(triples_from_slots(&slots, &slot_to_day, 5), vec![(0, 1, 2)]);

        // Same slot set, but the outside-in order assigns these slots to
        // non-consecutive day indices (0, 2, 4), so the very same exams no
        // longer form a triple under that order.
        let reordered = outside_in(&linear);
        let slot_to_day2 = day_maps(&reordered);
        assert!(triples_from_slots(&slots, &slot_to_day2, 5).is_empty());
    }
}
