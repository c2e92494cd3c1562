//! Exhaustive pairwise scan.

use crate::calling::ScanState;

/// Visit every pair (i, j) with i > j, sweeping the inner index downwards so
/// that W[j] accumulates the weight of the full rectangle [j, i] x [j, i].
pub(crate) fn scan(state: &mut ScanState) {
    let n_markers = state.view.n_markers();

    for i in 1..n_markers {
        let mut sum = 0.0;
        for j in (0..i).rev() {
            state.process_pair(i, j, &mut sum);
        }
    }

    state.stats.n_passes = 1;
}
