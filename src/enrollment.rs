//! Enrolment normaliser and conflict-graph builder (spec §4.1).
//!
//! Course codes are assumed already normalised by the ingestion boundary
//! (whitespace stripped, truncated at the first `(` on feeds that do that).
//! Whether that truncation is semantically intended (sections merging) or
//! an artifact of the original XML visitor is unclear upstream; this crate
//! preserves the behaviour without re-litigating it, since ingestion itself
//! is out of scope here.

use crate::data::{CourseCode, CourseKey, EnrollmentRecord, GroupId, MergeGroup, StudentId};
use std::collections::{BTreeMap, BTreeSet};

/// Course→students and student→courses after collapsing merge groups, plus
/// the bookkeeping needed to expand merged assignments back out at the end
/// of a run.
pub struct NormalizedEnrollment {
    pub course_to_students: BTreeMap<CourseKey, BTreeSet<StudentId>>,
    pub student_to_courses: BTreeMap<StudentId, BTreeSet<CourseKey>>,
    /// raw course code -> group id, for callers that need to rewrite a raw
    /// code (e.g. a fixed-slot table entry) into its live [`CourseKey`].
    pub course_to_group: BTreeMap<CourseCode, GroupId>,
    /// raw course code -> display name, for expansion at the end.
    pub course_names: BTreeMap<CourseCode, String>,
}

impl NormalizedEnrollment {
    /// Rewrites a raw course code to the [`CourseKey`] it currently lives
    /// under (merged or raw), the same rewrite `normalise` applied to every
    /// enrolment row.
    pub fn key_for_code(&self, code: &CourseCode) -> CourseKey {
        match self.course_to_group.get(code) {
            Some(group) => CourseKey::Merged(group.clone()),
            None => CourseKey::Raw(code.clone()),
        }
    }
}

/// Rewrites each course code to its group id where one exists and unions
/// enrolment sets across group members.
pub fn normalise(
    enrollments: &[EnrollmentRecord],
    ignore_list: &BTreeSet<CourseCode>,
    merges: &[MergeGroup],
) -> NormalizedEnrollment {
    let mut course_to_group: BTreeMap<CourseCode, GroupId> = BTreeMap::new();
    for group in merges {
        for member in &group.members {
            course_to_group.insert(member.clone(), group.group_id.clone());
        }
    }

    let key_of = |code: &CourseCode| -> CourseKey {
        match course_to_group.get(code) {
            Some(group) => CourseKey::Merged(group.clone()),
            None => CourseKey::Raw(code.clone()),
        }
    };

    let mut course_to_students: BTreeMap<CourseKey, BTreeSet<StudentId>> = BTreeMap::new();
    let mut student_to_courses: BTreeMap<StudentId, BTreeSet<CourseKey>> = BTreeMap::new();
    let mut course_names: BTreeMap<CourseCode, String> = BTreeMap::new();

    for record in enrollments {
        if ignore_list.contains(&record.course_code) {
            continue;
        }
        course_names
            .entry(record.course_code.clone())
            .or_insert_with(|| record.course_name.clone());

        let key = key_of(&record.course_code);
        course_to_students
            .entry(key.clone())
            .or_default()
            .insert(record.student_id.clone());
        student_to_courses
            .entry(record.student_id.clone())
            .or_default()
            .insert(key);
    }

    NormalizedEnrollment {
        course_to_students,
        student_to_courses,
        course_to_group,
        course_names,
    }
}

/// Undirected conflict graph on (possibly merged) courses, represented as
/// CSR-style adjacency: vertex index -> slice of neighbour indices. Edges
/// mark "shares at least one student", derived once and read-only for the
/// rest of the run.
pub struct ConflictGraph {
    vertices: Vec<CourseKey>,
    index_of: BTreeMap<CourseKey, usize>,
    offsets: Vec<usize>,
    neighbors: Vec<usize>,
}

impl ConflictGraph {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn course_at(&self, v: usize) -> &CourseKey {
        &self.vertices[v]
    }

    pub fn index_of(&self, key: &CourseKey) -> Option<usize> {
        self.index_of.get(key).copied()
    }

    pub fn neighbors(&self, v: usize) -> &[usize] {
        &self.neighbors[self.offsets[v]..self.offsets[v + 1]]
    }

    pub fn degree(&self, v: usize) -> usize {
        self.neighbors(v).len()
    }

    pub fn max_degree(&self) -> usize {
        (0..self.vertex_count()).map(|v| self.degree(v)).max().unwrap_or(0)
    }
}

/// For every student enrolled in ≥2 courses, adds the complete clique among
/// those courses. Self-loops are forbidden by construction (a course never
/// conflicts with itself). The adjacency relation produced is symmetric and
/// irreflexive; edge count equals |{(u,v): u<v, some student is enrolled in
/// both}|.
pub fn build_conflict(
    course_to_students: &BTreeMap<CourseKey, BTreeSet<StudentId>>,
    student_to_courses: &BTreeMap<StudentId, BTreeSet<CourseKey>>,
) -> ConflictGraph {
    let vertices: Vec<CourseKey> = course_to_students.keys().cloned().collect();
    let index_of: BTreeMap<CourseKey, usize> = vertices
        .iter()
        .enumerate()
        .map(|(i, k)| (k.clone(), i))
        .collect();

    let mut adjacency: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); vertices.len()];
    for courses in student_to_courses.values() {
        let course_list: Vec<&CourseKey> = courses.iter().collect();
        for i in 0..course_list.len() {
            for j in (i + 1)..course_list.len() {
                let a = index_of[course_list[i]];
                let b = index_of[course_list[j]];
                if a != b {
                    adjacency[a].insert(b);
                    adjacency[b].insert(a);
                }
            }
        }
    }

    let mut offsets = Vec::with_capacity(vertices.len() + 1);
    let mut neighbors = Vec::new();
    offsets.push(0);
    for neigh in &adjacency {
        neighbors.extend(neigh.iter().copied());
        offsets.push(neighbors.len());
    }

    ConflictGraph {
        vertices,
        index_of,
        offsets,
        neighbors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(course: &str, name: &str, student: &str) -> EnrollmentRecord {
        EnrollmentRecord {
            course_code: course.to_string(),
            course_name: name.to_string(),
            section: "1".to_string(),
            student_id: student.to_string(),
            student_name: format!("Student {student}"),
            major: "CS".to_string(),
        }
    }

    #[test]
    fn conflict_graph_is_symmetric_and_irreflexive() {
        let records = vec![
            rec("A", "Algebra", "s1"),
            rec("B", "Biology", "s1"),
            rec("B", "Biology", "s2"),
            rec("C", "Chemistry", "s2"),
        ];
        let norm = normalise(&records, &BTreeSet::new(), &[]);
        let graph = build_conflict(&norm.course_to_students, &norm.student_to_courses);

        let a = graph.index_of(&CourseKey::Raw("A".into())).unwrap();
        let b = graph.index_of(&CourseKey::Raw("B".into())).unwrap();
        let c = graph.index_of(&CourseKey::Raw("C".into())).unwrap();

        assert!(graph.neighbors(a).contains(&b));
        assert!(graph.neighbors(b).contains(&a));
        assert!(graph.neighbors(b).contains(&c));
        assert!(!graph.neighbors(a).contains(&c));
        assert!(!graph.neighbors(a).contains(&a));
    }

    #[test]
    fn merge_groups_union_enrolment() {
        let records = vec![rec("A", "Algebra", "s1"), rec("B", "Biology", "s2")];
        let groups = vec![MergeGroup {
            group_id: "G1".to_string(),
            members: vec!["A".to_string(), "B".to_string()],
        }];
        let norm = normalise(&records, &BTreeSet::new(), &groups);
        assert_eq!(norm.course_to_students.len(), 1);
        let key = CourseKey::Merged("G1".to_string());
        let students = &norm.course_to_students[&key];
        assert!(students.contains("s1"));
        assert!(students.contains("s2"));
    }

    #[test]
    fn ignore_list_drops_courses() {
        let records = vec![rec("A", "Algebra", "s1"), rec("B", "Biology", "s1")];
        let mut ignore = BTreeSet::new();
        ignore.insert("B".to_string());
        let norm = normalise(&records, &ignore, &[]);
        assert_eq!(norm.course_to_students.len(), 1);
        assert!(norm.course_to_students.contains_key(&CourseKey::Raw("A".into())));
    }
}
