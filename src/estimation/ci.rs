//! Two-sided 90% confidence intervals on D'.

use std::cmp::Ordering;
use std::fmt;
use std::mem;

use crate::estimation::{d_from_counts, pair_counts};
use crate::model::HaplotypeView;
use crate::utils::{fcmp, EPSILON};

/// One-sided 5% normal quantile; yields a two-sided 90% interval.
const Z_90: f64 = 1.644854;

/// Frequencies below the comparison tolerance are clamped to this floor
/// before taking logarithms.
const LOG_FLOOR: f64 = 1e-10;

/// Confidence interval estimation methods for D'.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiMethod {
    /// Wall & Pritchard likelihood grid with the given number of estimation
    /// points.
    WallPritchard { likelihood_density: usize },
    /// Asymptotic variance after Zapata et al.
    AsymptoticVariance,
    /// No interval computation (r^2 based scans).
    None,
}

impl fmt::Display for CiMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CiMethod::WallPritchard { .. } => f.write_str("WP"),
            CiMethod::AsymptoticVariance => f.write_str("AV"),
            CiMethod::None => f.write_str("NONE"),
        }
    }
}

/// Per-scan estimator state; the Wall-Pritchard grid buffers are allocated
/// once and reused across all pairs.
pub(crate) struct CiEstimator<'a> {
    view: &'a HaplotypeView,
    method: CiMethod,
    grid: Vec<f64>,
    log_likelihood: Vec<f64>,
    posterior: Vec<f64>,
}

impl<'a> CiEstimator<'a> {
    pub(crate) fn new(view: &'a HaplotypeView, method: CiMethod) -> Self {
        let (grid, log_likelihood, posterior) = match method {
            CiMethod::WallPritchard { likelihood_density } => {
                let grid = (0..=likelihood_density)
                    .map(|k| k as f64 / likelihood_density as f64)
                    .collect::<Vec<_>>();
                let scratch = vec![0.0; likelihood_density + 1];
                (grid, scratch.clone(), scratch)
            }
            _ => (Vec::new(), Vec::new(), Vec::new()),
        };

        CiEstimator {
            view,
            method,
            grid,
            log_likelihood,
            posterior,
        }
    }

    /// Lower and upper bound of the 90% CI on D' for the given marker pair,
    /// or (NaN, NaN) when D vanishes or no method is configured.
    pub(crate) fn dprime_ci(&mut self, marker_a: usize, marker_b: usize) -> (f64, f64) {
        match self.method {
            CiMethod::WallPritchard { .. } => self.wall_pritchard(marker_a, marker_b),
            CiMethod::AsymptoticVariance => self.asymptotic_variance(marker_a, marker_b),
            CiMethod::None => (f64::NAN, f64::NAN),
        }
    }

    fn wall_pritchard(&mut self, marker_a: usize, marker_b: usize) -> (f64, f64) {
        let mut counts = pair_counts(self.view, marker_a, marker_b);
        let major_af_a = self.view.major_allele_freqs()[marker_a];
        let mut major_af_b = self.view.major_allele_freqs()[marker_b];

        let mut d = d_from_counts(&counts, major_af_a, major_af_b);

        match fcmp(d, 0.0, EPSILON) {
            Ordering::Equal => return (f64::NAN, f64::NAN),
            Ordering::Less => {
                // reflect marker b so that the likelihood operates on D > 0
                mem::swap(&mut counts.ref_a_ref_b, &mut counts.ref_a_alt_b);
                mem::swap(&mut counts.alt_a_ref_b, &mut counts.alt_a_alt_b);
                major_af_b = 1.0 - major_af_b;
                d = d_from_counts(&counts, major_af_a, major_af_b);
            }
            Ordering::Greater => (),
        }

        let dmax = (major_af_a * (1.0 - major_af_b)).min((1.0 - major_af_a) * major_af_b);

        let clamped_log10 = |freq: f64| -> f64 {
            if fcmp(freq, 0.0, EPSILON) != Ordering::Greater {
                LOG_FLOOR.log10()
            } else {
                freq.log10()
            }
        };

        let mut max_log_likelihood = f64::NEG_INFINITY;
        for (k, &dprime) in self.grid.iter().enumerate() {
            let freq_ref_a_ref_b = dprime * dmax + major_af_a * major_af_b;
            let freq_ref_a_alt_b = major_af_a - freq_ref_a_ref_b;
            let freq_alt_a_ref_b = major_af_b - freq_ref_a_ref_b;
            let freq_alt_a_alt_b = (1.0 - major_af_a) - freq_alt_a_ref_b;

            self.log_likelihood[k] = f64::from(counts.ref_a_ref_b) * clamped_log10(freq_ref_a_ref_b)
                + f64::from(counts.ref_a_alt_b) * clamped_log10(freq_ref_a_alt_b)
                + f64::from(counts.alt_a_ref_b) * clamped_log10(freq_alt_a_ref_b)
                + f64::from(counts.alt_a_alt_b) * clamped_log10(freq_alt_a_alt_b);

            if self.log_likelihood[k] > max_log_likelihood {
                max_log_likelihood = self.log_likelihood[k];
            }
        }

        let mut total_area = 0.0;
        for (density, &log_likelihood) in self.posterior.iter_mut().zip(self.log_likelihood.iter())
        {
            *density = 10.0_f64.powf(log_likelihood - max_log_likelihood);
            total_area += *density;
        }

        let tail_area = 0.05 * total_area;
        let last = self.grid.len() - 1;

        let mut lower = self.grid[0];
        let mut covered = 0.0;
        for (k, &density) in self.posterior.iter().enumerate() {
            covered += density;
            if covered > tail_area {
                lower = if k > 0 { self.grid[k - 1] } else { self.grid[0] };
                break;
            }
        }

        let mut upper = self.grid[last];
        covered = 0.0;
        for (k, &density) in self.posterior.iter().enumerate().rev() {
            covered += density;
            if covered > tail_area {
                upper = if k < last {
                    self.grid[k + 1]
                } else {
                    self.grid[last]
                };
                break;
            }
        }

        (lower, upper)
    }

    fn asymptotic_variance(&self, marker_a: usize, marker_b: usize) -> (f64, f64) {
        let counts = pair_counts(self.view, marker_a, marker_b);
        let major_af_a = self.view.major_allele_freqs()[marker_a];
        let major_af_b = self.view.major_allele_freqs()[marker_b];
        let n = f64::from(counts.total());

        let d = d_from_counts(&counts, major_af_a, major_af_b);
        let var_d = (major_af_a * (1.0 - major_af_a) * major_af_b * (1.0 - major_af_b)
            + d * ((1.0 - major_af_a) - major_af_a) * ((1.0 - major_af_b) - major_af_b)
            - d * d)
            / n;

        // The limiting cell is the one whose frequency bound realizes D_max;
        // on ties the first candidate wins.
        let (dmax, limiting_freq, psi) = match fcmp(d, 0.0, EPSILON) {
            Ordering::Greater => {
                let dmax_first = major_af_a * (1.0 - major_af_b);
                let dmax_second = (1.0 - major_af_a) * major_af_b;
                let (dmax, limiting_freq) =
                    if fcmp(dmax_first, dmax_second, EPSILON) != Ordering::Greater {
                        (dmax_first, f64::from(counts.ref_a_alt_b) / n)
                    } else {
                        (dmax_second, f64::from(counts.alt_a_ref_b) / n)
                    };
                let psi = major_af_a * major_af_b + (1.0 - major_af_a) * (1.0 - major_af_b);
                (dmax, limiting_freq, psi)
            }
            Ordering::Less => {
                let dmax_first = major_af_a * major_af_b;
                let dmax_second = (1.0 - major_af_a) * (1.0 - major_af_b);
                let (dmax, limiting_freq) =
                    if fcmp(dmax_first, dmax_second, EPSILON) != Ordering::Greater {
                        (dmax_first, f64::from(counts.ref_a_ref_b) / n)
                    } else {
                        (dmax_second, f64::from(counts.alt_a_alt_b) / n)
                    };
                let psi = major_af_a * (1.0 - major_af_b) + (1.0 - major_af_a) * major_af_b;
                (dmax, limiting_freq, psi)
            }
            Ordering::Equal => return (f64::NAN, f64::NAN),
        };

        let dprime = d / dmax;
        let abs_dprime = dprime.abs();

        let mut var_dprime = (1.0 / (n * dmax * dmax))
            * ((1.0 - abs_dprime) * (n * var_d - abs_dprime * dmax * (psi - 2.0 * d.abs()))
                + abs_dprime * limiting_freq * (1.0 - limiting_freq));

        if fcmp(var_dprime, 0.0, EPSILON) != Ordering::Greater {
            var_dprime = 0.0;
        }

        let mut lower = dprime - Z_90 * var_dprime.sqrt();
        let mut upper = dprime + Z_90 * var_dprime.sqrt();

        if fcmp(lower, -1.0, EPSILON) == Ordering::Less {
            lower = -1.0;
        }
        if fcmp(upper, 1.0, EPSILON) == Ordering::Greater {
            upper = 1.0;
        }

        (lower, upper)
    }
}
