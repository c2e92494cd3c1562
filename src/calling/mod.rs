//! Haplotype block discovery: classification of marker pairs, candidate
//! enumeration under one of three pruning strategies and greedy selection of
//! the final non-overlapping partition.

use std::cmp::Ordering;
use std::fmt;

use bv::{BitVec, Bits, BitsMut};
use derive_builder::Builder;
use itertools::Itertools;

use crate::estimation;
use crate::estimation::ci::{CiEstimator, CiMethod};
use crate::model::{Block, BlockPartition, BlockRecord, HaplotypeView};
use crate::utils::{fcmp, EPSILON};

pub mod mig;
pub mod migp;
pub mod migpp;

const CANDIDATES_CAPACITY_INIT: usize = 100_000;
const CANDIDATES_CAPACITY_INCREMENT: usize = 10_000;

/// Criterion deciding whether a marker pair supports or contradicts a block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LdCriterion {
    /// Bands on the two-sided 90% CI of D': a pair is strong when the
    /// interval lies entirely in the strong-LD band on either sign, and a
    /// recombination pair when the interval sits inside the band around 0.
    DprimeCi {
        method: CiMethod,
        strong_pair_cl: f64,
        strong_pair_cu: f64,
        recomb_pair_cu: f64,
    },
    /// Plain r^2 thresholds.
    Rsq { weak_rsq: f64, strong_rsq: f64 },
}

/// Pruning strategy used to enumerate candidate blocks. All variants emit
/// the same candidate set; they differ in how many pairs they touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneMethod {
    /// Exhaustive pairwise scan.
    Mig,
    /// Single-pass scan with a tail-bound breakpoint.
    MigPlus,
    /// Iteratively widened scan; `None` selects the window
    /// `max(1, floor(M * (1 - fraction) / 2))`.
    MigPlusPlus { window: Option<usize> },
}

impl fmt::Display for PruneMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PruneMethod::Mig => f.write_str("MIG"),
            PruneMethod::MigPlus => f.write_str("MIG+"),
            PruneMethod::MigPlusPlus { .. } => f.write_str("MIG++"),
        }
    }
}

#[derive(Builder, Debug, Clone)]
#[builder(pattern = "owned")]
pub struct ScanConfig {
    pub criterion: LdCriterion,
    /// Minimum fraction of strong-LD pairs within an admissible block.
    #[builder(default = "0.95")]
    pub ld_fraction: f64,
    #[builder(default = "PruneMethod::Mig")]
    pub prune_method: PruneMethod,
}

impl ScanConfig {
    pub(crate) fn strong_pair_weight(&self) -> f64 {
        1.0 - self.ld_fraction
    }

    pub(crate) fn recomb_pair_weight(&self) -> f64 {
        self.ld_fraction
    }
}

/// Window applied by MIG++ when none is configured.
pub fn default_window(n_markers: usize, ld_fraction: f64) -> usize {
    let window = ((n_markers as f64 * (1.0 - ld_fraction)) / 2.0).floor();
    if window < 1.0 {
        1
    } else {
        window as usize
    }
}

/// Work counters of one candidate scan; the pruning variants differ in how
/// many pairs they classify and how many passes they need.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub n_pairs_classified: u64,
    pub n_passes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PairClass {
    Strong,
    Recombination,
    Uninformative,
}

pub(crate) struct PairScorer<'a> {
    view: &'a HaplotypeView,
    criterion: LdCriterion,
    ci: CiEstimator<'a>,
}

impl<'a> PairScorer<'a> {
    fn new(view: &'a HaplotypeView, criterion: LdCriterion) -> Self {
        let ci_method = match criterion {
            LdCriterion::DprimeCi { method, .. } => method,
            LdCriterion::Rsq { .. } => CiMethod::None,
        };

        PairScorer {
            view,
            criterion,
            ci: CiEstimator::new(view, ci_method),
        }
    }

    fn classify(&mut self, marker_a: usize, marker_b: usize) -> PairClass {
        match self.criterion {
            LdCriterion::DprimeCi {
                strong_pair_cl,
                strong_pair_cu,
                recomb_pair_cu,
                ..
            } => {
                let (lower, upper) = self.ci.dprime_ci(marker_a, marker_b);
                if lower.is_nan() || upper.is_nan() {
                    return PairClass::Uninformative;
                }

                let strong_positive = fcmp(lower, strong_pair_cl, EPSILON) != Ordering::Less
                    && fcmp(upper, strong_pair_cu, EPSILON) != Ordering::Less;
                let strong_negative = fcmp(lower, -strong_pair_cu, EPSILON) != Ordering::Greater
                    && fcmp(upper, -strong_pair_cl, EPSILON) != Ordering::Greater;
                if strong_positive || strong_negative {
                    PairClass::Strong
                } else if fcmp(lower, -recomb_pair_cu, EPSILON) != Ordering::Less
                    && fcmp(upper, recomb_pair_cu, EPSILON) != Ordering::Greater
                {
                    PairClass::Recombination
                } else {
                    PairClass::Uninformative
                }
            }
            LdCriterion::Rsq {
                weak_rsq,
                strong_rsq,
            } => {
                let rsq = estimation::rsq(self.view, marker_a, marker_b);
                if rsq.is_nan() {
                    PairClass::Uninformative
                } else if fcmp(rsq, strong_rsq, EPSILON) != Ordering::Less {
                    PairClass::Strong
                } else if fcmp(rsq, weak_rsq, EPSILON) == Ordering::Less {
                    PairClass::Recombination
                } else {
                    PairClass::Uninformative
                }
            }
        }
    }
}

/// Growable candidate buffer with the fixed reservation schedule of the scan.
pub(crate) struct Candidates {
    blocks: Vec<Block>,
}

impl Candidates {
    fn new() -> Self {
        Candidates {
            blocks: Vec::with_capacity(CANDIDATES_CAPACITY_INIT),
        }
    }

    fn push(&mut self, block: Block) {
        if self.blocks.len() == self.blocks.capacity() {
            self.blocks.reserve_exact(CANDIDATES_CAPACITY_INCREMENT);
        }
        self.blocks.push(block);
    }

    fn into_vec(self) -> Vec<Block> {
        self.blocks
    }
}

/// State shared by the three scan variants: the pair scorer, the weights, the
/// per-marker accumulators W and the emitted candidates.
pub(crate) struct ScanState<'a> {
    pub(crate) view: &'a HaplotypeView,
    scorer: PairScorer<'a>,
    strong_pair_weight: f64,
    recomb_pair_weight: f64,
    pub(crate) w_values: Vec<f64>,
    candidates: Candidates,
    pub(crate) stats: ScanStats,
}

impl<'a> ScanState<'a> {
    fn new(view: &'a HaplotypeView, config: &ScanConfig) -> Self {
        ScanState {
            view,
            scorer: PairScorer::new(view, config.criterion),
            strong_pair_weight: config.strong_pair_weight(),
            recomb_pair_weight: config.recomb_pair_weight(),
            w_values: vec![0.0; view.n_markers()],
            candidates: Candidates::new(),
            stats: ScanStats::default(),
        }
    }

    pub(crate) fn strong_pair_weight(&self) -> f64 {
        self.strong_pair_weight
    }

    /// Classify pair (i, j), fold its weight into the running sum for the
    /// outer marker and into W[j], and emit the candidate (j, i) when W[j]
    /// comes back up to zero after a strong pair.
    pub(crate) fn process_pair(&mut self, i: usize, j: usize, sum: &mut f64) {
        self.stats.n_pairs_classified += 1;
        match self.scorer.classify(i, j) {
            PairClass::Strong => {
                *sum += self.strong_pair_weight;
                self.w_values[j] += *sum;
                if fcmp(self.w_values[j], 0.0, EPSILON) != Ordering::Less {
                    self.candidates.push(Block {
                        start: j,
                        end: i,
                        span_bp: self.view.positions()[i] - self.view.positions()[j],
                    });
                }
            }
            PairClass::Recombination => {
                *sum -= self.recomb_pair_weight;
                self.w_values[j] += *sum;
            }
            PairClass::Uninformative => {
                self.w_values[j] += *sum;
            }
        }
    }
}

/// Enumerate all Gabriel-admissible candidate blocks with the configured
/// pruning strategy. The emitted set is independent of the strategy.
pub fn scan_candidates(view: &HaplotypeView, config: &ScanConfig) -> Vec<Block> {
    scan_candidates_with_stats(view, config).0
}

/// Like [`scan_candidates`], additionally reporting the work counters of the
/// scan.
pub fn scan_candidates_with_stats(
    view: &HaplotypeView,
    config: &ScanConfig,
) -> (Vec<Block>, ScanStats) {
    if view.n_markers() < 2 {
        return (Vec::new(), ScanStats::default());
    }

    let mut state = ScanState::new(view, config);

    match config.prune_method {
        PruneMethod::Mig => mig::scan(&mut state),
        PruneMethod::MigPlus => migp::scan(&mut state),
        PruneMethod::MigPlusPlus { window } => {
            let window =
                window.unwrap_or_else(|| default_window(view.n_markers(), config.ld_fraction));
            migpp::scan(&mut state, window);
        }
    }

    let stats = state.stats;
    (state.candidates.into_vec(), stats)
}

/// Convert candidates into the final partition: sort by descending genomic
/// span (ties by ascending start) and greedily accept blocks whose endpoint
/// markers are still unused.
pub fn select_blocks(view: &HaplotypeView, candidates: Vec<Block>) -> BlockPartition {
    let candidates = candidates
        .into_iter()
        .sorted_by(|a, b| b.span_bp.cmp(&a.span_bp).then(a.start.cmp(&b.start)))
        .collect_vec();

    let mut partition = BlockPartition::default();
    let mut used_markers: BitVec = BitVec::new_fill(false, view.n_markers() as u64);

    for block in &candidates {
        if used_markers.get_bit(block.start as u64) || used_markers.get_bit(block.end as u64) {
            continue;
        }

        for marker in block.start..=block.end {
            used_markers.set_bit(marker as u64, true);
        }

        partition.push(BlockRecord {
            block: *block,
            diversity: view.block_diversity(block),
        });
    }

    partition
}

/// Full block discovery pipeline over one view.
pub fn find_blocks(view: &HaplotypeView, config: &ScanConfig) -> BlockPartition {
    select_blocks(view, scan_candidates(view, config))
}

#[cfg(test)]
pub(crate) mod tests {
    use itertools::Itertools;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::model::tests::{simple_view, two_phase_view};

    pub(crate) fn dprime_config(prune_method: PruneMethod) -> ScanConfig {
        ScanConfigBuilder::default()
            .criterion(LdCriterion::DprimeCi {
                method: CiMethod::WallPritchard {
                    likelihood_density: 100,
                },
                strong_pair_cl: 0.7,
                strong_pair_cu: 0.98,
                recomb_pair_cu: 0.9,
            })
            .prune_method(prune_method)
            .build()
            .unwrap()
    }

    fn random_view(rng: &mut StdRng, n_markers: usize, n_haplotypes: usize) -> HaplotypeView {
        // correlated columns with occasional breakdown, so that both strong
        // and recombination pairs occur
        let mut haplotypes: Vec<Vec<u8>> = Vec::with_capacity(n_markers);
        let mut phase: Vec<bool> = (0..n_haplotypes).map(|_| rng.gen()).collect();
        for _ in 0..n_markers {
            if rng.gen_bool(0.3) {
                phase = (0..n_haplotypes).map(|_| rng.gen()).collect();
            }
            let noise = rng.gen_bool(0.2);
            let alleles = phase
                .iter()
                .map(|&p| {
                    let flipped = noise && rng.gen_bool(0.1);
                    if p != flipped {
                        b'A'
                    } else {
                        b'C'
                    }
                })
                .collect::<Vec<u8>>();
            haplotypes.push(alleles);
        }

        // drop monomorphic markers, the view contract requires two alleles
        let haplotypes = haplotypes
            .into_iter()
            .filter(|alleles| alleles.iter().unique().count() == 2)
            .collect::<Vec<_>>();
        let positions = (0..haplotypes.len() as u64).map(|i| 100 + i * 10).collect();
        simple_view(haplotypes, positions)
    }

    fn sorted(mut blocks: Vec<Block>) -> Vec<Block> {
        blocks.sort_by_key(|b| (b.start, b.end));
        blocks
    }

    #[test]
    fn test_perfect_block_all_methods() {
        let view = two_phase_view();
        for prune_method in &[
            PruneMethod::Mig,
            PruneMethod::MigPlus,
            PruneMethod::MigPlusPlus { window: None },
            PruneMethod::MigPlusPlus { window: Some(1) },
        ] {
            let partition = find_blocks(&view, &dprime_config(*prune_method));
            assert_eq!(partition.len(), 1, "method {:?}", prune_method);
            let record = &partition.records()[0];
            assert_eq!(record.block.start, 0);
            assert_eq!(record.block.end, 4);
            assert_eq!(record.diversity.n_haps, 20);
            assert_eq!(record.diversity.n_unique_haps, 2);
            assert_eq!(record.diversity.n_common_haps, 2);
            assert!((record.diversity.haps_diversity - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_recombination_breaks_block() {
        // markers 0 and 1 in perfect LD, marker 2 independent of both:
        // four equal quartets of haplotypes
        let quartets: [(u8, u8, u8); 4] = [
            (b'A', b'G', b'C'),
            (b'A', b'G', b'T'),
            (b'C', b'T', b'C'),
            (b'C', b'T', b'T'),
        ];
        let haplotypes: Vec<Vec<u8>> = (0..3)
            .map(|i| {
                quartets
                    .iter()
                    .flat_map(|q| {
                        let allele = match i {
                            0 => q.0,
                            1 => q.1,
                            _ => q.2,
                        };
                        std::iter::repeat(allele).take(10)
                    })
                    .collect()
            })
            .collect();
        let view = simple_view(haplotypes, vec![100, 200, 300]);

        let candidates = scan_candidates(&view, &dprime_config(PruneMethod::Mig));
        assert!(candidates.iter().any(|b| b.start == 0 && b.end == 1));
        assert!(!candidates.iter().any(|b| b.start == 1 && b.end == 2));

        let partition = find_blocks(&view, &dprime_config(PruneMethod::Mig));
        assert_eq!(partition.len(), 1);
        assert_eq!(partition.records()[0].block.start, 0);
        assert_eq!(partition.records()[0].block.end, 1);
    }

    #[test]
    fn test_pruned_scans_match_exhaustive_scan() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..5 {
            let view = random_view(&mut rng, 40, 30);
            if view.n_markers() < 2 {
                continue;
            }

            let exhaustive =
                sorted(scan_candidates(&view, &dprime_config(PruneMethod::Mig)));
            let pruned = sorted(scan_candidates(&view, &dprime_config(PruneMethod::MigPlus)));
            assert_eq!(exhaustive, pruned);

            for window in &[1usize, 3, 100] {
                let windowed = sorted(scan_candidates(
                    &view,
                    &dprime_config(PruneMethod::MigPlusPlus {
                        window: Some(*window),
                    }),
                ));
                assert_eq!(exhaustive, windowed, "window {}", window);
            }
        }
    }

    #[test]
    fn test_rsq_criterion_matches_dprime_on_perfect_data() {
        let view = two_phase_view();
        let config = ScanConfigBuilder::default()
            .criterion(LdCriterion::Rsq {
                weak_rsq: 0.5,
                strong_rsq: 0.9,
            })
            .prune_method(PruneMethod::Mig)
            .build()
            .unwrap();
        let partition = find_blocks(&view, &config);
        assert_eq!(partition.len(), 1);
        assert_eq!(partition.records()[0].block.start, 0);
        assert_eq!(partition.records()[0].block.end, 4);
    }

    #[test]
    fn test_selected_blocks_are_disjoint_and_candidates() {
        let mut rng = StdRng::seed_from_u64(7);
        let view = random_view(&mut rng, 60, 40);
        let config = dprime_config(PruneMethod::Mig);
        let candidates = scan_candidates(&view, &config);
        let partition = select_blocks(&view, candidates.clone());

        let mut covered = vec![false; view.n_markers()];
        let mut total = 0usize;
        for record in partition.records() {
            let block = &record.block;
            assert!(candidates.contains(block));
            for marker in block.start..=block.end {
                assert!(!covered[marker], "blocks overlap at marker {}", marker);
                covered[marker] = true;
                total += 1;
            }
        }
        assert!(total <= view.n_markers());
    }

    #[test]
    fn test_full_fraction_requires_all_pairs_strong() {
        // with ld_fraction = 1.0 strong pairs carry zero weight, so a
        // candidate survives only if no interior pair pulls W below zero
        let view = two_phase_view();
        let config = ScanConfigBuilder::default()
            .criterion(LdCriterion::DprimeCi {
                method: CiMethod::WallPritchard {
                    likelihood_density: 100,
                },
                strong_pair_cl: 0.7,
                strong_pair_cu: 0.98,
                recomb_pair_cu: 0.9,
            })
            .ld_fraction(1.0)
            .prune_method(PruneMethod::Mig)
            .build()
            .unwrap();
        let partition = find_blocks(&view, &config);
        // every pair of the two-phase panel is strong, so the full block is kept
        assert_eq!(partition.len(), 1);
        assert_eq!(partition.records()[0].block.end, 4);
    }

    #[test]
    fn test_empty_view_yields_no_blocks() {
        let haplotypes = vec![vec![b'A', b'C', b'A', b'C']];
        let view = simple_view(haplotypes, vec![100]);
        assert!(scan_candidates(&view, &dprime_config(PruneMethod::Mig)).is_empty());
        assert!(find_blocks(&view, &dprime_config(PruneMethod::Mig)).is_empty());
    }

    #[test]
    fn test_saturating_window_needs_at_most_two_passes() {
        let mut rng = StdRng::seed_from_u64(11);
        let view = random_view(&mut rng, 30, 20);

        let (exhaustive, mig_stats) =
            scan_candidates_with_stats(&view, &dprime_config(PruneMethod::Mig));
        let (pruned, migp_stats) =
            scan_candidates_with_stats(&view, &dprime_config(PruneMethod::MigPlus));
        let (windowed, migpp_stats) = scan_candidates_with_stats(
            &view,
            &dprime_config(PruneMethod::MigPlusPlus {
                window: Some(view.n_markers()),
            }),
        );

        assert_eq!(mig_stats.n_passes, 1);
        assert_eq!(migp_stats.n_passes, 1);
        // a window covering all markers degenerates to the single-pass scan
        // plus one empty fixed-point check
        assert!(migpp_stats.n_passes <= 2);

        assert!(migp_stats.n_pairs_classified <= mig_stats.n_pairs_classified);
        assert!(migpp_stats.n_pairs_classified <= mig_stats.n_pairs_classified);

        assert_eq!(sorted(pruned), sorted(exhaustive.clone()));
        assert_eq!(sorted(windowed), sorted(exhaustive));
    }

    #[test]
    fn test_default_window() {
        assert_eq!(default_window(1000, 0.95), 25);
        assert_eq!(default_window(10, 0.95), 1);
        assert_eq!(default_window(0, 0.95), 1);
    }
}
