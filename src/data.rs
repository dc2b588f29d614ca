//! Domain types for the exam-scheduling engine: courses, students, slots,
//! merge groups and the assignment produced by a run.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub type CourseCode = String;
pub type StudentId = String;
pub type GroupId = String;

/// Non-negative integer encoding a day and session.
///
/// Day index = slot / 2. Session is AM iff the slot is even. Canonical
/// scheduling only ever populates even slots; odd slots are a forward
/// extension point for AM+PM scheduling, never produced by this crate today.
pub type SlotId = u32;

/// Course identity as it flows through the solver: either a raw course code
/// or the id of a [`MergeGroup`] that has absorbed one or more raw courses.
/// Both variants share one comparison/hash contract so the solver never has
/// to special-case which kind of key it is holding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CourseKey {
    Raw(CourseCode),
    Merged(GroupId),
}

impl CourseKey {
    pub fn as_str(&self) -> &str {
        match self {
            CourseKey::Raw(c) => c,
            CourseKey::Merged(g) => g,
        }
    }
}

/// Session label derived from a [`SlotId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Session {
    Am,
    Pm,
}

impl Session {
    pub fn of(slot: SlotId) -> Self {
        if slot % 2 == 0 { Session::Am } else { Session::Pm }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Session::Am => "AM",
            Session::Pm => "PM",
        }
    }
}

/// One row of the bipartite enrolment relation, as produced by ingestion.
/// Course codes are expected to already be normalised (whitespace removed,
/// truncated at `(` where the upstream feed does that) — see the note on
/// `normalise` in `enrollment.rs`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRecord {
    pub course_code: CourseCode,
    pub course_name: String,
    pub section: String,
    pub student_id: StudentId,
    pub student_name: String,
    pub major: String,
}

/// An equivalence class of courses that must land on a single shared slot.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeGroup {
    pub group_id: GroupId,
    pub members: Vec<CourseCode>,
}

/// Full input to one scheduling run.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingInput {
    pub enrollments: Vec<EnrollmentRecord>,
    #[serde(default)]
    pub ignore_list: BTreeSet<CourseCode>,
    #[serde(default)]
    pub merge_groups: Vec<MergeGroup>,
    #[serde(default)]
    pub fixed_slots: BTreeMap<CourseCode, SlotId>,
    pub start_date: NaiveDate,
    pub num_days: u32,
    #[serde(default)]
    pub source_ids: Vec<String>,
}

/// Per-course row of the final output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseAssignment {
    pub course_code: CourseCode,
    pub course_name: String,
    pub slot: SlotId,
    pub day_index: u32,
    pub exam_date: NaiveDate,
    pub session: &'static str,
}

/// Per-student row of the final output, joining itinerary fields with
/// student identity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentItineraryEntry {
    pub student_id: StudentId,
    pub student_name: String,
    pub course_code: CourseCode,
    pub course_name: String,
    pub slot: SlotId,
    pub day_index: u32,
    pub exam_date: NaiveDate,
    pub session: &'static str,
}

/// Record of one completed run, as persisted through the [`crate::store::ResultStore`] seam.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub id: String,
    pub start_date: NaiveDate,
    pub num_days: u32,
    pub source_ids: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// The complete output of the engine for one run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingOutput {
    pub run: RunRecord,
    pub assignments: Vec<CourseAssignment>,
    pub itinerary: Vec<StudentItineraryEntry>,
    pub days_used: u32,
    pub remaining_triples: usize,
}
