//! Pairwise linkage disequilibrium estimation over a haplotype view.

use std::cmp::Ordering;

use strum_macros::{Display, EnumString};

use crate::model::HaplotypeView;
use crate::utils::{fcmp, EPSILON};

pub mod ci;

/// Pairwise statistics that can be exported as a marker-pair table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum LdStatistic {
    #[strum(serialize = "D")]
    D,
    #[strum(serialize = "DPRIME")]
    Dprime,
    #[strum(serialize = "R")]
    R,
    #[strum(serialize = "RSQ")]
    Rsq,
    #[strum(serialize = "CI")]
    Ci,
}

/// 2x2 haplotype contingency table for a marker pair, oriented on the major
/// (ref) and minor (alt) alleles of both markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairCounts {
    pub ref_a_ref_b: u32,
    pub ref_a_alt_b: u32,
    pub alt_a_ref_b: u32,
    pub alt_a_alt_b: u32,
}

impl PairCounts {
    pub fn total(&self) -> u32 {
        self.ref_a_ref_b + self.ref_a_alt_b + self.alt_a_ref_b + self.alt_a_alt_b
    }
}

/// Count haplotypes into the four cells by walking the allele columns of both
/// markers.
pub fn pair_counts(view: &HaplotypeView, marker_a: usize, marker_b: usize) -> PairCounts {
    let haplotype_a = &view.haplotypes()[marker_a];
    let haplotype_b = &view.haplotypes()[marker_b];

    let ref_allele_a = view.major_alleles()[marker_a];
    let alt_allele_a = view.minor_alleles()[marker_a];
    let ref_allele_b = view.major_alleles()[marker_b];
    let alt_allele_b = view.minor_alleles()[marker_b];

    let mut counts = PairCounts {
        ref_a_ref_b: 0,
        ref_a_alt_b: 0,
        alt_a_ref_b: 0,
        alt_a_alt_b: 0,
    };

    for (&allele_a, &allele_b) in haplotype_a.iter().zip(haplotype_b.iter()) {
        if allele_a == ref_allele_a {
            if allele_b == ref_allele_b {
                counts.ref_a_ref_b += 1;
            } else if allele_b == alt_allele_b {
                counts.ref_a_alt_b += 1;
            }
        } else if allele_a == alt_allele_a {
            if allele_b == ref_allele_b {
                counts.alt_a_ref_b += 1;
            } else if allele_b == alt_allele_b {
                counts.alt_a_alt_b += 1;
            }
        }
    }

    counts
}

pub(crate) fn d_from_counts(counts: &PairCounts, major_af_a: f64, major_af_b: f64) -> f64 {
    f64::from(counts.ref_a_ref_b) / f64::from(counts.total()) - major_af_a * major_af_b
}

/// Raw coefficient of linkage disequilibrium D.
pub fn d(view: &HaplotypeView, marker_a: usize, marker_b: usize) -> f64 {
    let counts = pair_counts(view, marker_a, marker_b);
    d_from_counts(
        &counts,
        view.major_allele_freqs()[marker_a],
        view.major_allele_freqs()[marker_b],
    )
}

/// Normalized coefficient D' = D / D_max, NaN when D vanishes.
pub fn d_prime(view: &HaplotypeView, marker_a: usize, marker_b: usize) -> f64 {
    let major_af_a = view.major_allele_freqs()[marker_a];
    let major_af_b = view.major_allele_freqs()[marker_b];
    let d = d(view, marker_a, marker_b);

    match fcmp(d, 0.0, EPSILON) {
        Ordering::Greater => {
            d / (major_af_a * (1.0 - major_af_b)).min((1.0 - major_af_a) * major_af_b)
        }
        Ordering::Less => {
            d / (major_af_a * major_af_b).min((1.0 - major_af_a) * (1.0 - major_af_b))
        }
        Ordering::Equal => f64::NAN,
    }
}

/// Correlation coefficient r.
pub fn r(view: &HaplotypeView, marker_a: usize, marker_b: usize) -> f64 {
    let major_af_a = view.major_allele_freqs()[marker_a];
    let major_af_b = view.major_allele_freqs()[marker_b];
    let d = d(view, marker_a, marker_b);

    d / (major_af_a * (1.0 - major_af_a) * major_af_b * (1.0 - major_af_b)).sqrt()
}

/// Squared correlation r^2.
pub fn rsq(view: &HaplotypeView, marker_a: usize, marker_b: usize) -> f64 {
    let value = r(view, marker_a, marker_b);
    value * value
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::model::tests::{simple_view, two_phase_view};

    #[test]
    fn test_counts_sum_to_haplotypes() {
        let view = two_phase_view();
        for a in 1..view.n_markers() {
            for b in 0..a {
                assert_eq!(pair_counts(&view, a, b).total() as usize, view.n_haplotypes());
            }
        }
    }

    #[test]
    fn test_perfect_ld() {
        let view = two_phase_view();
        for a in 1..view.n_markers() {
            for b in 0..a {
                assert_relative_eq!(d(&view, a, b).abs(), 0.25);
                assert_relative_eq!(d_prime(&view, a, b).abs(), 1.0);
                assert_relative_eq!(rsq(&view, a, b), 1.0);
            }
        }
    }

    #[test]
    fn test_marker_order_symmetry() {
        let view = two_phase_view();
        assert_relative_eq!(d(&view, 1, 0), d(&view, 0, 1));
        assert_relative_eq!(d_prime(&view, 1, 0), d_prime(&view, 0, 1));
        assert_relative_eq!(r(&view, 1, 0), r(&view, 0, 1));
        assert_relative_eq!(rsq(&view, 1, 0), rsq(&view, 0, 1));
    }

    #[test]
    fn test_independent_pair_has_nan_d_prime() {
        // alleles of the two markers co-occur in all four combinations equally
        let haplotypes = vec![
            vec![b'A', b'A', b'C', b'C', b'A', b'A', b'C', b'C'],
            vec![b'G', b'T', b'G', b'T', b'G', b'T', b'G', b'T'],
        ];
        let view = simple_view(haplotypes, vec![10, 20]);
        assert_relative_eq!(d(&view, 1, 0), 0.0);
        assert!(d_prime(&view, 1, 0).is_nan());
    }

    #[test]
    fn test_label_reflection_flips_d_sign() {
        // columns: 6x (A,G), 4x (A,T), 4x (C,G), 6x (C,T); both markers at 0.5
        let phase_counts: [(&[u8; 2], usize); 4] =
            [(b"AG", 6), (b"AT", 4), (b"CG", 4), (b"CT", 6)];
        let haplotypes: Vec<Vec<u8>> = (0..2)
            .map(|i| {
                phase_counts
                    .iter()
                    .flat_map(|&(phase, n)| std::iter::repeat(phase[i]).take(n))
                    .collect()
            })
            .collect();
        let view = simple_view(haplotypes.clone(), vec![10, 20]);

        // reflect marker 1 by swapping its allele labels
        let reflected: Vec<Vec<u8>> = vec![
            haplotypes[0].clone(),
            haplotypes[1]
                .iter()
                .map(|&a| if a == b'G' { b'T' } else { b'G' })
                .collect(),
        ];
        let reflected_view = simple_view(reflected, vec![10, 20]);

        let d_orig = d(&view, 1, 0);
        let d_reflected = d(&reflected_view, 1, 0);
        assert_relative_eq!(d_orig, -d_reflected);
        assert_relative_eq!(
            d_prime(&view, 1, 0).abs(),
            d_prime(&reflected_view, 1, 0).abs()
        );
        assert_relative_eq!(rsq(&view, 1, 0), rsq(&reflected_view, 1, 0));
    }
}
