//! Iteratively widened scan.
//!
//! Each pass extends the reach of every outer marker by the configured
//! window and re-applies the tail bound with per-marker state: `sums[i]`
//! carries the running weight sum of the already terminated inner sweeps of
//! marker i, `terminations[i]` the index at which its sweep last stopped and
//! `breakpoints[i]` its lower bound for the current pass. The prefix sums
//! `sums_left` and their suffix maxima `sums_max` turn the envelope of the
//! single-pass scan into the tighter bound `W[j] + sums_max[i] -
//! sums_left[i]`. The pass loop reaches a fixed point when no pair was
//! classified during a whole pass.

use std::cmp::Ordering;

use crate::calling::ScanState;
use crate::utils::{fcmp, EPSILON};

pub(crate) fn scan(state: &mut ScanState, window: usize) {
    let n_markers = state.view.n_markers();
    let strong_weight = state.strong_pair_weight();

    let mut sums = vec![0.0f64; n_markers];
    let mut sums_left = vec![0.0f64; n_markers];
    let mut sums_max = vec![0.0f64; n_markers];
    let mut terminations: Vec<usize> = (0..n_markers).collect();
    let mut breakpoints: Vec<usize> = (0..n_markers).collect();

    let mut sum_left = 0.0;
    for i in 0..n_markers {
        sum_left += strong_weight * terminations[i] as f64;
        sums_left[i] = sum_left;
    }

    sums_max[n_markers - 1] = sums_left[n_markers - 1];
    for k in (2..n_markers).rev() {
        sums_max[k - 1] = sums_max[k].max(sums_left[k]);
    }

    let mut current_window = 0usize;
    let mut calculations = usize::MAX;

    while calculations > 0 {
        current_window = current_window.saturating_add(window);
        calculations = 0;
        state.stats.n_passes += 1;

        let mut breakpoint = 0usize;
        let mut updated_breakpoint = 0usize;
        let mut sum_left = 0.0;

        for i in 1..n_markers {
            if updated_breakpoint == breakpoints[i] {
                // the sweep of marker i is already saturated
                breakpoints[i] = breakpoint;
                breakpoint = terminations[i];
                updated_breakpoint = terminations[i];

                sum_left += strong_weight * terminations[i] as f64 + sums[i];
                sums_left[i] = sum_left;
                continue;
            }

            if i - updated_breakpoint > current_window {
                breakpoints[i] = i - current_window;
                breakpoint = i - current_window;
            } else {
                breakpoints[i] = breakpoint;
                breakpoint = updated_breakpoint;
            }

            updated_breakpoint = terminations[i];

            for j in (breakpoint..terminations[i]).rev() {
                calculations += 1;

                state.process_pair(i, j, &mut sums[i]);

                let envelope = state.w_values[j] + sums_max[i] - sums_left[i];
                if fcmp(envelope, 0.0, EPSILON) != Ordering::Less {
                    updated_breakpoint = j;
                }
            }

            terminations[i] = breakpoint;

            sum_left += strong_weight * terminations[i] as f64 + sums[i];
            sums_left[i] = sum_left;
        }

        sums_max[n_markers - 1] = sums_left[n_markers - 1];
        for k in (2..n_markers).rev() {
            sums_max[k - 1] = sums_max[k].max(sums_left[k]);
        }
    }
}
