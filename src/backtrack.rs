//! Bounded backtracker (spec §4.4): fallback colourer invoked when DSATUR
//! fails for the current colour budget.
//!
//! Runs over an explicit work-stack (`try_idx`/`pos`) rather than native
//! recursion, per the design note on recursive backtracking over large
//! inputs: the call-count and wall-time budgets bound the total amount of
//! work regardless of input size, and there is no native call-stack frame
//! per vertex to blow through.

use crate::data::{CourseKey, SlotId};
use crate::enrollment::ConflictGraph;
use std::collections::BTreeMap;
use std::time::Instant;

/// Orders uncoloured vertices by descending static degree, tries `slot_list`
/// in the supplied order at each position, and prunes via the
/// neighbour-slot test only. Either the wall-time budget (`max_ms`) or the
/// recursive-call budget (`max_calls`) being exceeded returns `None`.
pub fn backtrack_schedule(
    graph: &ConflictGraph,
    slot_list: &[SlotId],
    fixed: &BTreeMap<CourseKey, SlotId>,
    max_ms: u64,
    max_calls: u64,
) -> Option<BTreeMap<CourseKey, SlotId>> {
    let n = graph.vertex_count();
    let mut assigned: Vec<Option<SlotId>> = vec![None; n];
    for v in 0..n {
        if let Some(slot) = fixed.get(graph.course_at(v)) {
            assigned[v] = Some(*slot);
        }
    }

    let mut order: Vec<usize> = (0..n).filter(|&v| assigned[v].is_none()).collect();
    order.sort_by_key(|&v| std::cmp::Reverse(graph.degree(v)));

    let is_valid = |assigned: &[Option<SlotId>], v: usize, slot: SlotId| -> bool {
        graph.neighbors(v).iter().all(|&nb| assigned[nb] != Some(slot))
    };

    let mut try_idx = vec![0usize; order.len()];
    let mut pos = 0usize;
    let mut calls: u64 = 0;
    let start = Instant::now();

    let budget_exhausted = |calls: u64, start: Instant| -> bool {
        calls > max_calls || start.elapsed().as_millis() as u64 > max_ms
    };

    loop {
        if pos == order.len() {
            let mut result = fixed.clone();
            for &v in &order {
                result.insert(graph.course_at(v).clone(), assigned[v].unwrap());
            }
            return Some(result);
        }

        if budget_exhausted(calls, start) {
            return None;
        }

        let v = order[pos];
        let mut found_slot = None;
        while try_idx[pos] < slot_list.len() {
            let slot = slot_list[try_idx[pos]];
            try_idx[pos] += 1;
            calls += 1;
            if is_valid(&assigned, v, slot) {
                found_slot = Some(slot);
                break;
            }
            if budget_exhausted(calls, start) {
                return None;
            }
        }

        match found_slot {
            Some(slot) => {
                assigned[v] = Some(slot);
                pos += 1;
            }
            None => {
                try_idx[pos] = 0;
                if pos == 0 {
                    return None;
                }
                pos -= 1;
                assigned[order[pos]] = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CourseKey;
    use crate::enrollment::build_conflict;
    use crate::slot_order::base_slots;
    use std::collections::BTreeSet;

    #[test]
    fn path_graph_is_two_colourable() {
        // s1 in {A,B}, s2 in {B,C}, s3 in {C,D}: a path A-B-C-D.
        let mut c2s = BTreeMap::new();
        let mut s2c = BTreeMap::new();
        let pairs = [("s1", vec!["A", "B"]), ("s2", vec!["B", "C"]), ("s3", vec!["C", "D"])];
        for (stu, courses) in pairs {
            for c in &courses {
                c2s.entry(CourseKey::Raw(c.to_string()))
                    .or_insert_with(BTreeSet::new)
                    .insert(stu.to_string());
                s2c.entry(stu.to_string())
                    .or_insert_with(BTreeSet::new)
                    .insert(CourseKey::Raw(c.to_string()));
            }
        }
        let graph = build_conflict(&c2s, &s2c);
        let slots = base_slots(2);
        let result = backtrack_schedule(&graph, &slots, &BTreeMap::new(), 10_000, 2_000_000).unwrap();

        let a = result[&CourseKey::Raw("A".into())];
        let b = result[&CourseKey::Raw("B".into())];
        let c = result[&CourseKey::Raw("C".into())];
        let d = result[&CourseKey::Raw("D".into())];
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(c, d);
    }

    #[test]
    fn call_budget_is_honoured() {
        let mut c2s = BTreeMap::new();
        let mut s2c = BTreeMap::new();
        let courses = ["A", "B", "C"];
        for c in courses {
            c2s.entry(CourseKey::Raw(c.to_string()))
                .or_insert_with(BTreeSet::new)
                .insert("s1".to_string());
        }
        s2c.insert(
            "s1".to_string(),
            courses.iter().map(|c| CourseKey::Raw(c.to_string())).collect(),
        );
        let graph = build_conflict(&c2s, &s2c);
        let slots = base_slots(2); // infeasible: clique of 3 needs 3 colours
        let result = backtrack_schedule(&graph, &slots, &BTreeMap::new(), 10_000, 0);
        assert!(result.is_none());
    }
}
