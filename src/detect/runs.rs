//! Run-length encoding of classified samples
//!
//! Consecutive samples with the same good/bad classification collapse into
//! one [`Run`] that remembers where it started.

use chrono::{DateTime, Utc};

/// A run of consecutive samples with the same classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub good: bool,
    pub count: u32,
    /// Timestamp of the first sample in the run
    pub start: DateTime<Utc>,
}

/// Encode classified samples into runs. Samples must be in ascending time order.
pub fn encode_runs(samples: &[(DateTime<Utc>, bool)]) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();

    for &(ts, good) in samples {
        match runs.last_mut() {
            Some(run) if run.good == good && run.count < u32::MAX => run.count += 1,
            _ => runs.push(Run {
                good,
                count: 1,
                start: ts,
            }),
        }
    }

    runs
}

/// Start times of bad runs longer than `max_consecutive`.
///
/// Samples may arrive in any order. A window with no good sample yields
/// nothing, and a bad run that opens the window is skipped: both are the tail
/// of an incident that started before the window.
pub fn offending_runs(samples: &[(DateTime<Utc>, bool)], max_consecutive: u32) -> Vec<DateTime<Utc>> {
    if !samples.iter().any(|(_, good)| *good) {
        return Vec::new();
    }

    let mut ordered = samples.to_vec();
    ordered.sort_by_key(|(ts, _)| *ts);

    encode_runs(&ordered)
        .into_iter()
        .skip_while(|run| !run.good)
        .filter(|run| !run.good && run.count > max_consecutive)
        .map(|run| run.start)
        .collect()
}
