//! Persistence seam (spec §5, SPEC_FULL.md §10.6). Ingestion and persistence of parsed
//! enrolments to a relational store are out of scope as *features*; this
//! module models the boundary as a narrow trait with short, explicitly
//! scoped "sessions" (one call per logical task), plus an in-memory
//! reference implementation used by the HTTP surface and by tests. A real
//! deployment swaps in an implementation backed by the schema documented in
//! the spec without the driver knowing the difference.

use crate::data::{CourseAssignment, RunRecord, StudentItineraryEntry};
use std::sync::Mutex;

/// A persistence failure is logged and the run still returns its in-memory
/// result — never fatal, per the spec's error table.
#[derive(Debug, thiserror::Error)]
#[error("persistence failed: {0}")]
pub struct StoreError(pub String);

/// Short, explicitly-scoped transactional sessions: one call per logical
/// task (persist a run, persist its slots, persist its student itinerary).
pub trait ResultStore: Send + Sync {
    fn save_run(&self, run: &RunRecord) -> Result<(), StoreError>;
    fn save_slots(&self, run_id: &str, assignments: &[CourseAssignment]) -> Result<(), StoreError>;
    fn save_student_exams(&self, run_id: &str, itinerary: &[StudentItineraryEntry]) -> Result<(), StoreError>;
}

/// Reference implementation: keeps committed runs in memory. Stands in for
/// the `exam_schedule_runs` / `exam_slots` / `student_exams` schema from the
/// spec without pulling in a SQL driver, per the ambient-persistence
/// boundary contract.
#[derive(Default)]
pub struct InMemoryStore {
    runs: Mutex<Vec<RunRecord>>,
    slots: Mutex<Vec<(String, CourseAssignment)>>,
    student_exams: Mutex<Vec<(String, StudentItineraryEntry)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }
}

impl ResultStore for InMemoryStore {
    fn save_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        self.runs.lock().unwrap().push(run.clone());
        Ok(())
    }

    fn save_slots(&self, run_id: &str, assignments: &[CourseAssignment]) -> Result<(), StoreError> {
        let mut guard = self.slots.lock().unwrap();
        for a in assignments {
            guard.push((run_id.to_string(), a.clone()));
        }
        Ok(())
    }

    fn save_student_exams(&self, run_id: &str, itinerary: &[StudentItineraryEntry]) -> Result<(), StoreError> {
        let mut guard = self.student_exams.lock().unwrap();
        for row in itinerary {
            guard.push((run_id.to_string(), row.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn in_memory_store_accumulates_runs() {
        let store = InMemoryStore::new();
        let run = RunRecord {
            id: "run-1".to_string(),
            start_date: chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            num_days: 5,
            source_ids: String::new(),
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
        };
        store.save_run(&run).unwrap();
        assert_eq!(store.run_count(), 1);
    }
}
