//! Single-pass scan with a tail-bound breakpoint.

use std::cmp::Ordering;

use crate::calling::ScanState;
use crate::utils::{fcmp, EPSILON};

/// Like the exhaustive scan, but the inner sweep stops at a breakpoint
/// carried across outer steps. After each pair the envelope
/// `W[j] + w_s/2 * (M - i - 1) * (M + i - 2j)` bounds the largest value W[j]
/// could still attain if every remaining pair involving j were strong; once
/// it drops below zero, no pair below j can ever be emitted.
pub(crate) fn scan(state: &mut ScanState) {
    let n_markers = state.view.n_markers();
    let half_strong_weight = 0.5 * state.strong_pair_weight();

    let mut updated_breakpoint = 0usize;

    for i in 1..n_markers {
        let mut sum = 0.0;
        let breakpoint = updated_breakpoint;
        updated_breakpoint = i;

        for j in (breakpoint..i).rev() {
            state.process_pair(i, j, &mut sum);

            let envelope = state.w_values[j]
                + half_strong_weight * ((n_markers - i - 1) * (n_markers + i - 2 * j)) as f64;
            if fcmp(envelope, 0.0, EPSILON) != Ordering::Less {
                updated_breakpoint = j;
            }
        }
    }

    state.stats.n_passes = 1;
}
