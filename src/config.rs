//! Tunable constants governing the bounded search stages. Exposed rather
//! than hardcoded per the spec's open question on the shrink-days
//! tolerance: every number below was a literal in the original scheduler and
//! is now a documented, overridable field.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Number of (slot order × seed) restarts attempted per day budget, per
    /// slot order. The original tries 5 seeds per order.
    #[serde(default = "default_restart_seeds")]
    pub restart_seeds: u32,

    /// The day-shrink pass accepts a smaller day budget only when its
    /// pre-repair triple count is within this many triples of the best
    /// count found at the requested day budget. Unjustified in the
    /// original; kept as a tunable rather than a silent magic number.
    #[serde(default = "default_shrink_tolerance")]
    pub shrink_tolerance: usize,

    /// Upper bound on repair passes before the triple-repair loop gives up
    /// and returns whatever residual count remains.
    #[serde(default = "default_repair_max_passes")]
    pub repair_max_passes: u32,

    /// Upper bound on accepted moves/swaps across the whole repair run.
    #[serde(default = "default_repair_max_moves")]
    pub repair_max_moves: u32,

    /// Whether the repair loop may use the swap operator in addition to
    /// single-course moves.
    #[serde(default = "default_enable_swaps")]
    pub enable_swaps: bool,

    /// Wall-clock budget, in milliseconds, for a single backtracking
    /// attempt before it is abandoned in favour of the next restart.
    #[serde(default = "default_backtrack_max_ms")]
    pub backtrack_max_ms: u64,

    /// Recursive-call budget for a single backtracking attempt; doubles as
    /// a stack-depth cap since the backtracker runs over an explicit
    /// work-stack rather than native recursion.
    #[serde(default = "default_backtrack_max_calls")]
    pub backtrack_max_calls: u64,

    /// Time limit, in seconds, given to the exact finisher's ILP solve.
    #[serde(default = "default_finisher_time_limit_secs")]
    pub finisher_time_limit_secs: f64,
}

fn default_restart_seeds() -> u32 {
    5
}
fn default_shrink_tolerance() -> usize {
    5
}
fn default_repair_max_passes() -> u32 {
    10
}
fn default_repair_max_moves() -> u32 {
    2000
}
fn default_enable_swaps() -> bool {
    true
}
fn default_backtrack_max_ms() -> u64 {
    10_000
}
fn default_backtrack_max_calls() -> u64 {
    2_000_000
}
fn default_finisher_time_limit_secs() -> f64 {
    60.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            restart_seeds: default_restart_seeds(),
            shrink_tolerance: default_shrink_tolerance(),
            repair_max_passes: default_repair_max_passes(),
            repair_max_moves: default_repair_max_moves(),
            enable_swaps: default_enable_swaps(),
            backtrack_max_ms: default_backtrack_max_ms(),
            backtrack_max_calls: default_backtrack_max_calls(),
            finisher_time_limit_secs: default_finisher_time_limit_secs(),
        }
    }
}
