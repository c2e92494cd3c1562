//! Identification of haplotype blocks in phased genotype data.
//!
//! Blocks follow the D' confidence interval definition of Gabriel et al.
//! (2002): a candidate block is a pair of markers whose enclosed region
//! contains at least a given fraction of strong-LD pairs, and the final
//! partition greedily keeps the candidates with the largest genomic span.
//! Candidate enumeration avoids touching all marker pairs through a family
//! of pruning scans (MIG, MIG+, MIG++) that bound the attainable score of
//! every pair from above.

pub mod calling;
pub mod cli;
pub mod errors;
pub mod estimation;
pub mod model;
pub mod output;
pub mod preprocessing;
pub(crate) mod utils;

pub use crate::calling::{
    find_blocks, scan_candidates, scan_candidates_with_stats, select_blocks, LdCriterion,
    PruneMethod, ScanConfig, ScanConfigBuilder, ScanStats,
};
pub use crate::estimation::ci::CiMethod;
pub use crate::estimation::LdStatistic;
pub use crate::model::{Block, BlockPartition, HaplotypeView, HaplotypeViewBuilder, Region};
