//! Repro-step minimization over recorded action sequences.
//!
//! Bisection-style reduction: cheap fixed-size suffixes first, then halving,
//! then a single-deletion scan from the end. The caller supplies a
//! `reproduces` check that replays a candidate and reports whether the
//! failure still shows; any replay exception should be mapped to `true` by
//! the caller (an environment exception is itself often the defect).

use tracing::debug;

use crate::core::types::ActionRecord;

/// Bounds for the reduction search.
#[derive(Debug, Clone)]
pub struct MinimizeOptions {
    /// Maximum bisection/deletion rounds before giving up.
    pub max_attempts: u32,
}

impl Default for MinimizeOptions {
    fn default() -> Self {
        Self { max_attempts: 20 }
    }
}

/// Reduce `actions` to a shorter sequence for which `reproduces` still holds.
///
/// The result is never longer than the input. If no candidate reproduces, the
/// input is returned unchanged. Running the function again on its own output
/// yields no further reduction once the search is exhausted.
pub fn minimize<F>(
    actions: &[ActionRecord],
    mut reproduces: F,
    options: &MinimizeOptions,
) -> Vec<ActionRecord>
where
    F: FnMut(&[ActionRecord]) -> bool,
{
    let mut best: Vec<ActionRecord> = actions.to_vec();

    // Cheap candidates: fixed-size suffixes, shortest first.
    for n in [5usize, 10, 20] {
        if n >= best.len() {
            continue;
        }
        let candidate = best[best.len() - n..].to_vec();
        if reproduces(&candidate) {
            debug!(len = candidate.len(), "suffix candidate reproduces");
            best = candidate;
        }
    }

    for _ in 0..options.max_attempts {
        if best.len() <= 2 {
            break;
        }
        let mid = best.len() / 2;

        // Second half alone.
        let candidate = best[mid..].to_vec();
        if reproduces(&candidate) {
            debug!(len = candidate.len(), "second half reproduces");
            best = candidate;
            continue;
        }

        // First half alone.
        let candidate = best[..mid].to_vec();
        if reproduces(&candidate) {
            debug!(len = candidate.len(), "first half reproduces");
            best = candidate;
            continue;
        }

        // Neither half alone: drop single elements scanning from the end,
        // keeping the first deletion that still reproduces.
        let mut improved = false;
        for i in (1..best.len()).rev() {
            let mut candidate = best.clone();
            candidate.remove(i);
            if reproduces(&candidate) {
                debug!(removed = i, len = candidate.len(), "deletion reproduces");
                best = candidate;
                improved = true;
                break;
            }
        }

        if !improved {
            break;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::selector::Selector;
    use crate::core::types::Action;

    fn record(step: u32) -> ActionRecord {
        ActionRecord {
            step,
            action: Action::Click {
                selector: Selector {
                    automation_id: Some(format!("button-{step}")),
                    ..Selector::default()
                },
            },
            timestamp_ms: 0,
        }
    }

    fn records(count: u32) -> Vec<ActionRecord> {
        (1..=count).map(record).collect()
    }

    fn contains_steps(candidate: &[ActionRecord], wanted: &[u32]) -> bool {
        wanted
            .iter()
            .all(|step| candidate.iter().any(|record| record.step == *step))
    }

    /// A 20-step sequence where only steps 5 and 12 matter reduces to a
    /// sequence of at most 3 actions containing both.
    #[test]
    fn reduces_to_necessary_pair() {
        let actions = records(20);
        let minimized = minimize(
            &actions,
            |candidate| contains_steps(candidate, &[5, 12]),
            &MinimizeOptions::default(),
        );

        assert!(minimized.len() <= 3);
        assert!(contains_steps(&minimized, &[5, 12]));
    }

    #[test]
    fn output_never_longer_than_input() {
        let actions = records(7);
        let minimized = minimize(&actions, |_| false, &MinimizeOptions::default());
        assert_eq!(minimized.len(), actions.len());
        assert_eq!(minimized, actions);
    }

    #[test]
    fn output_still_reproduces() {
        let actions = records(30);
        let reproduces = |candidate: &[ActionRecord]| contains_steps(candidate, &[28]);
        let minimized = minimize(&actions, reproduces, &MinimizeOptions::default());
        assert!(reproduces(&minimized));
        assert!(minimized.len() < actions.len());
    }

    /// Minimizing the minimizer's own output changes nothing further.
    #[test]
    fn minimize_is_idempotent() {
        let actions = records(20);
        let reproduces = |candidate: &[ActionRecord]| contains_steps(candidate, &[5, 12]);

        let once = minimize(&actions, reproduces, &MinimizeOptions::default());
        let twice = minimize(&once, reproduces, &MinimizeOptions::default());
        assert_eq!(once, twice);
    }

    #[test]
    fn always_reproducing_shrinks_to_floor() {
        let actions = records(16);
        let minimized = minimize(&actions, |_| true, &MinimizeOptions::default());
        assert!(minimized.len() <= 2);
    }

    #[test]
    fn short_sequences_are_left_alone() {
        let actions = records(2);
        let minimized = minimize(&actions, |_| true, &MinimizeOptions::default());
        assert_eq!(minimized, actions);
    }
}
