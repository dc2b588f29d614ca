//! Typed failure modes for the driver, matching the table in the spec's
//! error-handling section. Everything else the pipeline can fail to improve
//! on (no triple reduction, finisher unavailable, finisher no-op,
//! persistence failure) is *not* an error and never surfaces here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// No restart (slot order × seed) produced a feasible colouring within
    /// the requested day budget, or the conflict graph's degree lower bound
    /// exceeds the number of requested days outright.
    #[error(
        "no feasible {num_days}-day schedule exists: conflict graph needs at least {lower_bound} days"
    )]
    InfeasibleSchedule { num_days: u32, lower_bound: u32 },

    /// An invariant was violated by the caller's own input (a fixed slot
    /// conflicting with the ignore list, two fixed courses sharing a
    /// student, a merge group spanning ignored courses, etc). Raised at
    /// entry, before any persistent state is touched.
    #[error("invalid scheduling input: {0}")]
    ProgrammerInput(String),
}
