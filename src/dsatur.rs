//! DSATUR primary colourer (spec §4.3): saturation-degree-first greedy
//! vertex colouring, confined to the first `max_colors` slots of the active
//! order, with a triple-avoidance tie-break among legal candidate slots.

use crate::data::{CourseKey, SlotId, StudentId};
use crate::enrollment::ConflictGraph;
use crate::slot_order::{day_maps, triple_would_be_created};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, BTreeSet};

/// Colours `graph` with at most `max_colors` of `preferred_slots`, honouring
/// any `fixed` assignments. Returns `None` ("needs more colours") when some
/// vertex has no legal candidate slot left.
///
/// `seed` drives only the deterministic tie-break rank among vertices of
/// equal saturation and degree; the PRNG is explicit and local to this call,
/// never a process-global source, so results are bitwise reproducible for a
/// fixed seed.
pub fn dsatur_color(
    graph: &ConflictGraph,
    max_colors: usize,
    preferred_slots: &[SlotId],
    fixed: &BTreeMap<CourseKey, SlotId>,
    course_to_students: &BTreeMap<CourseKey, BTreeSet<StudentId>>,
    seed: u64,
) -> Option<BTreeMap<CourseKey, SlotId>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = graph.vertex_count();
    let cap = max_colors.min(preferred_slots.len());
    let day_slots = &preferred_slots[..cap];
    let slot_to_day = day_maps(day_slots);
    let num_days = day_slots.len();

    let mut assignment: BTreeMap<CourseKey, SlotId> = fixed.clone();
    let mut colored: Vec<Option<SlotId>> = vec![None; n];
    for v in 0..n {
        if let Some(slot) = fixed.get(graph.course_at(v)) {
            colored[v] = Some(*slot);
        }
    }

    let mut student_slots_dyn: BTreeMap<StudentId, BTreeSet<SlotId>> = BTreeMap::new();
    for v in 0..n {
        if let Some(slot) = colored[v] {
            if slot_to_day.contains_key(&slot) {
                for stu in course_to_students.get(graph.course_at(v)).into_iter().flatten() {
                    student_slots_dyn.entry(stu.clone()).or_default().insert(slot);
                }
            }
        }
    }

    let mut uncolored: Vec<usize> = (0..n).filter(|v| colored[*v].is_none()).collect();
    let rand_rank: BTreeMap<usize, f64> = uncolored.iter().map(|v| (*v, rng.r#gen::<f64>())).collect();

    let mut neighbor_slots: Vec<BTreeSet<SlotId>> = vec![BTreeSet::new(); n];
    let mut sat_deg: Vec<usize> = vec![0; n];
    for &v in &uncolored {
        for &nb in graph.neighbors(v) {
            if let Some(slot) = colored[nb] {
                neighbor_slots[v].insert(slot);
            }
        }
        sat_deg[v] = neighbor_slots[v].len();
    }

    while let Some(pos) = pick_next(&uncolored, &sat_deg, graph, &rand_rank) {
        let v = uncolored.remove(pos);
        let forbidden = &neighbor_slots[v];

        let candidates: Vec<SlotId> = day_slots
            .iter()
            .filter(|s| !forbidden.contains(s))
            .copied()
            .collect();

        if candidates.is_empty() {
            return None;
        }

        let enrolled = course_to_students.get(graph.course_at(v));
        let triple_penalty = |slot: SlotId| -> u8 {
            match enrolled {
                None => 0,
                Some(students) => {
                    for stu in students {
                        let current = student_slots_dyn.get(stu).cloned().unwrap_or_default();
                        if triple_would_be_created(&current, slot, &slot_to_day, num_days, None) {
                            return 1;
                        }
                    }
                    0
                }
            }
        };

        let order_position = |slot: SlotId| -> usize { day_slots.iter().position(|s| *s == slot).unwrap() };

        let chosen = *candidates
            .iter()
            .min_by_key(|s| (triple_penalty(**s), order_position(**s)))
            .unwrap();

        colored[v] = Some(chosen);
        assignment.insert(graph.course_at(v).clone(), chosen);

        for &nb in graph.neighbors(v) {
            if colored[nb].is_none() && neighbor_slots[nb].insert(chosen) {
                sat_deg[nb] = neighbor_slots[nb].len();
            }
        }

        if let Some(students) = enrolled {
            for stu in students {
                student_slots_dyn.entry(stu.clone()).or_default().insert(chosen);
            }
        }
    }

    Some(assignment)
}

/// Vertex with greatest saturation; ties broken by greater static degree,
/// then by the seeded random rank. Returns the index *within* `uncolored`.
fn pick_next(
    uncolored: &[usize],
    sat_deg: &[usize],
    graph: &ConflictGraph,
    rand_rank: &BTreeMap<usize, f64>,
) -> Option<usize> {
    uncolored
        .iter()
        .enumerate()
        .max_by(|&(_, &a), &(_, &b)| {
            let key = |v: usize| (sat_deg[v], graph.degree(v), ordered_rank(rand_rank[&v]));
            key(a).cmp(&key(b))
        })
        .map(|(pos, _)| pos)
}

/// `f64` has no total order; ranks are drawn from `[0, 1)` so quantising to
/// a fixed-point integer gives a deterministic, totally-ordered surrogate.
fn ordered_rank(x: f64) -> u64 {
    (x * 1e9) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrollment::build_conflict;
    use crate::slot_order::base_slots;

    fn clique(courses: &[&str], student: &str) -> (BTreeMap<CourseKey, BTreeSet<StudentId>>, BTreeMap<StudentId, BTreeSet<CourseKey>>) {
        let mut c2s = BTreeMap::new();
        let mut s2c = BTreeMap::new();
        let mut set = BTreeSet::new();
        set.insert(student.to_string());
        for c in courses {
            c2s.insert(CourseKey::Raw(c.to_string()), set.clone());
            s2c.entry(student.to_string())
                .or_insert_with(BTreeSet::new)
                .insert(CourseKey::Raw(c.to_string()));
        }
        (c2s, s2c)
    }

    #[test]
    fn colours_a_clique_with_enough_slots() {
        let (c2s, s2c) = clique(&["A", "B", "C"], "s1");
        let graph = build_conflict(&c2s, &s2c);
        let slots = base_slots(3);
        let result = dsatur_color(&graph, 3, &slots, &BTreeMap::new(), &c2s, 0).unwrap();
        let mut used: Vec<SlotId> = result.values().copied().collect();
        used.sort();
        used.dedup();
        assert_eq!(used.len(), 3, "clique of 3 needs 3 distinct slots");
    }

    #[test]
    fn fails_when_colours_insufficient() {
        let (c2s, s2c) = clique(&["A", "B", "C"], "s1");
        let graph = build_conflict(&c2s, &s2c);
        let slots = base_slots(2);
        let result = dsatur_color(&graph, 2, &slots, &BTreeMap::new(), &c2s, 0);
        assert!(result.is_none());
    }

    #[test]
    fn same_seed_is_deterministic() {
        let (c2s, s2c) = clique(&["A", "B", "C", "D", "E"], "s1");
        let graph = build_conflict(&c2s, &s2c);
        let slots = base_slots(5);
        let r1 = dsatur_color(&graph, 5, &slots, &BTreeMap::new(), &c2s, 7).unwrap();
        let r2 = dsatur_color(&graph, 5, &slots, &BTreeMap::new(), &c2s, 7).unwrap();
        assert_eq!(r1, r2);
    }
}
