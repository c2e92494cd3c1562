use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use derive_builder::Builder;
use getset::{CopyGetters, Getters};

use crate::errors;

/// Closed genomic interval restricting the markers a view is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: u64,
    pub end: u64,
}

impl FromStr for Region {
    type Err = errors::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, '-');
        let start = parts.next().and_then(|v| v.trim().parse::<u64>().ok());
        let end = parts.next().and_then(|v| v.trim().parse::<u64>().ok());
        match (start, end) {
            (Some(start), Some(end)) => {
                if start >= end {
                    Err(errors::Error::InvalidRegion)
                } else {
                    Ok(Region { start, end })
                }
            }
            _ => Err(errors::Error::InvalidRegionSpec { spec: s.to_owned() }),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Read-only projection of a phased haplotype panel, restricted to one region
/// and filtered by minor allele frequency.
///
/// All per-marker vectors have the same length; `haplotypes[i]` holds one
/// allele call per haplotype column, each equal to either the major or the
/// minor allele of marker `i`.
#[derive(Builder, Getters, CopyGetters, Debug, Clone)]
#[builder(pattern = "owned", build_fn(validate = "Self::validate"))]
pub struct HaplotypeView {
    /// Number of haplotype columns (twice the sample count).
    #[getset(get_copy = "pub")]
    n_haplotypes: usize,
    /// Marker count before the MAF filter was applied.
    #[getset(get_copy = "pub")]
    n_markers_unfiltered: usize,
    #[getset(get = "pub")]
    markers: Vec<String>,
    #[getset(get = "pub")]
    positions: Vec<u64>,
    #[getset(get = "pub")]
    major_alleles: Vec<u8>,
    #[getset(get = "pub")]
    minor_alleles: Vec<u8>,
    #[getset(get = "pub")]
    major_allele_freqs: Vec<f64>,
    #[getset(get = "pub")]
    haplotypes: Vec<Vec<u8>>,
    #[builder(default)]
    #[getset(get = "pub")]
    phase_file: Option<PathBuf>,
    #[builder(default)]
    #[getset(get = "pub")]
    legend_file: Option<PathBuf>,
    #[builder(default)]
    #[getset(get_copy = "pub")]
    region: Option<Region>,
    #[builder(default)]
    #[getset(get_copy = "pub")]
    maf_threshold: f64,
}

impl HaplotypeView {
    pub fn n_markers(&self) -> usize {
        self.markers.len()
    }

    /// Haplotype string of column `k` over the closed marker range
    /// `[start, end]`.
    pub(crate) fn haplotype_string(&self, start: usize, end: usize, k: usize) -> Vec<u8> {
        (start..=end).map(|i| self.haplotypes[i][k]).collect()
    }

    /// Diversity statistics of the haplotypes enclosed by a block.
    ///
    /// Haplotype strings are tallied, reduced to the unambiguous subset and
    /// grouped by compatibility, walking strings in lexicographic order so
    /// that the grouping is deterministic.
    pub fn block_diversity(&self, block: &Block) -> BlockDiversity {
        let mut haps: BTreeMap<Vec<u8>, u32> = BTreeMap::new();
        for k in 0..self.n_haplotypes {
            *haps
                .entry(self.haplotype_string(block.start, block.end, k))
                .or_insert(0) += 1;
        }

        let mut unambiguous: BTreeMap<&[u8], u32> =
            haps.iter().map(|(h, &count)| (h.as_slice(), count)).collect();

        for hap in haps.keys() {
            let compatible: Vec<&[u8]> = unambiguous
                .keys()
                .copied()
                .filter(|other| is_compatible_haplotype(hap, other))
                .collect();

            'pairs: for j in 1..compatible.len() {
                for i in 0..j {
                    if !is_compatible_haplotype(compatible[i], compatible[j]) {
                        unambiguous.remove(hap.as_slice());
                        break 'pairs;
                    }
                }
            }
        }

        let mut groups: Vec<(&[u8], u32)> = Vec::new();
        for (&hap, &count) in &unambiguous {
            match groups
                .iter_mut()
                .find(|(repr, _)| is_compatible_haplotype(hap, repr))
            {
                Some(group) => group.1 += count,
                None => groups.push((hap, count)),
            }
        }

        let mut n_haps = 0u32;
        let mut n_common_haps = 0u32;
        let mut n_all_common_haps = 0u32;
        for &(_, count) in &groups {
            n_haps += count;
            if count > 1 {
                n_common_haps += 1;
                n_all_common_haps += count;
            }
        }

        BlockDiversity {
            n_haps,
            n_unique_haps: groups.len() as u32,
            n_common_haps,
            haps_diversity: f64::from(n_all_common_haps) / f64::from(n_haps),
        }
    }
}

impl HaplotypeViewBuilder {
    fn validate(&self) -> Result<(), String> {
        let markers = self.markers.as_ref().ok_or("markers not set")?;
        let n_markers = markers.len();

        for (name, len) in &[
            ("positions", self.positions.as_ref().map(|v| v.len())),
            ("major alleles", self.major_alleles.as_ref().map(|v| v.len())),
            ("minor alleles", self.minor_alleles.as_ref().map(|v| v.len())),
            (
                "major allele frequencies",
                self.major_allele_freqs.as_ref().map(|v| v.len()),
            ),
            ("haplotypes", self.haplotypes.as_ref().map(|v| v.len())),
        ] {
            match len {
                Some(len) if *len == n_markers => (),
                Some(_) => return Err(format!("{} do not match the marker count", name)),
                None => return Err(format!("{} not set", name)),
            }
        }

        if let Some(&n_haplotypes) = self.n_haplotypes.as_ref() {
            if n_haplotypes == 0 || n_haplotypes % 2 != 0 {
                return Err("the haplotype count must be a positive even integer".to_owned());
            }
            if let Some(haplotypes) = self.haplotypes.as_ref() {
                if haplotypes.iter().any(|alleles| alleles.len() != n_haplotypes) {
                    return Err("allele vectors do not match the haplotype count".to_owned());
                }
            }
        }

        if let Some(positions) = self.positions.as_ref() {
            if positions.windows(2).any(|w| w[0] >= w[1]) {
                return Err("marker positions must be strictly increasing".to_owned());
            }
        }

        if let Some(freqs) = self.major_allele_freqs.as_ref() {
            if freqs.iter().any(|&p| !(0.5..=1.0).contains(&p)) {
                return Err("major allele frequencies must be in [0.5, 1.0]".to_owned());
            }
        }

        Ok(())
    }
}

/// Candidate haplotype block over the closed marker index range
/// `[start, end]`; `span_bp` is the genomic distance between the endpoint
/// markers and serves as the selection sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub start: usize,
    pub end: usize,
    pub span_bp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockDiversity {
    pub n_haps: u32,
    pub n_unique_haps: u32,
    pub n_common_haps: u32,
    pub haps_diversity: f64,
}

#[derive(Debug, Clone)]
pub struct BlockRecord {
    pub block: Block,
    pub diversity: BlockDiversity,
}

/// Final non-overlapping partition, in block acceptance order.
#[derive(Debug, Clone, Default)]
pub struct BlockPartition {
    records: Vec<BlockRecord>,
}

impl BlockPartition {
    pub(crate) fn push(&mut self, record: BlockRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[BlockRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn is_canonical_base(c: u8) -> bool {
    matches!(c.to_ascii_lowercase(), b'a' | b'c' | b'g' | b't')
}

/// Two haplotype strings are compatible if they agree at every position where
/// both carry a canonical base; other positions are ignored.
fn is_compatible_haplotype(first: &[u8], second: &[u8]) -> bool {
    if first.len() != second.len() {
        return false;
    }

    first.iter().zip(second.iter()).all(|(&a, &b)| {
        !is_canonical_base(a) || !is_canonical_base(b) || a.eq_ignore_ascii_case(&b)
    })
}
