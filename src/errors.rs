use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("the minor allele frequency threshold, specified in 'maf', must be in the [0, 0.5] interval")]
    InvalidMafThreshold,
    #[error("the lower bound of the D' confidence interval, specified in 'ld-ci-lower', must be in the [0, 1] interval")]
    InvalidStrongLowerBound,
    #[error("the upper bound of the D' confidence interval, specified in 'ld-ci-upper', must be in the [0, 1] interval")]
    InvalidStrongUpperBound,
    #[error("the upper bound of the D' confidence interval for strong LD, specified in 'ld-ci-upper', must be greater than the lower bound")]
    InvertedStrongBounds,
    #[error("the upper bound of the D' confidence interval for recombination, specified in 'ehr-ci', must be in the [0, 1] interval")]
    InvalidRecombUpperBound,
    #[error("the fraction of strong LD SNP pairs within a haplotype block, specified in 'ld-fraction', must be in the (0, 1] interval")]
    InvalidLdFraction,
    #[error("the number of likelihood estimation points, specified in 'ci-precision', is required with the WP method and must be strictly greater than 0")]
    InvalidLikelihoodDensity,
    #[error("the r^2 threshold specified in '{name}' must be in the (0, 1] interval")]
    InvalidRsqThreshold { name: String },
    #[error("the r^2 threshold specified in 'weak-rsq' must be less than the one specified in 'strong-rsq'")]
    InvertedRsqThresholds,
    #[error("the window size, specified in 'window', must be strictly greater than 0")]
    InvalidWindow,
    #[error("the region end position must be strictly greater than the region start position")]
    InvalidRegion,
    #[error("invalid region '{spec}'; use the START-END syntax")]
    InvalidRegionSpec { spec: String },
    #[error("the number of threads, specified in 'threads', must be strictly greater than 0")]
    InvalidThreads,
    #[error("a legend file must be given via 'legend-file' with the HAPMAP2 input format")]
    MissingLegendFile,
    #[error("{path:?}: the mandatory VCF file format information line is missing or incorrect")]
    VcfMissingFileFormat { path: PathBuf },
    #[error("{path:?}: line {line}: column '{column}' is missing on position {position}")]
    MissingColumn {
        path: PathBuf,
        line: u64,
        column: String,
        position: usize,
    },
    #[error("{path:?}: no sample columns were found")]
    NoSamples { path: PathBuf },
    #[error("{path:?}: line {line}: expected {expected} columns but found {found}")]
    ColumnCountMismatch {
        path: PathBuf,
        line: u64,
        expected: usize,
        found: usize,
    },
    #[error("{path:?}: line {line}: unexpected chromosome '{found}' (expected '{expected}'); the input must contain one chromosome per file")]
    UnexpectedChromosome {
        path: PathBuf,
        line: u64,
        expected: String,
        found: String,
    },
    #[error("{path:?}: line {line}: the chromosomal position '{value}' could not be parsed to an unsigned integer")]
    InvalidPosition {
        path: PathBuf,
        line: u64,
        value: String,
    },
    #[error("{path:?}: line {line}: the allele value '{value}' is incorrect")]
    InvalidAllele {
        path: PathBuf,
        line: u64,
        value: String,
    },
    #[error("{path:?}: line {line}: sample {sample} has an incorrect genotype value '{value}'")]
    InvalidGenotype {
        path: PathBuf,
        line: u64,
        sample: usize,
        value: String,
    },
    #[error("{path:?}: line {line}: sample {sample} has UNPHASED genotype '{value}'")]
    UnphasedGenotype {
        path: PathBuf,
        line: u64,
        sample: usize,
        value: String,
    },
    #[error("{path:?}: line {line} is empty")]
    EmptyLine { path: PathBuf, line: u64 },
    #[error("{path:?}: the mandatory VCF header line was not found")]
    VcfMissingHeader { path: PathBuf },
    #[error("{path:?}: the haplotype matrix contains no rows")]
    NoHaplotypes { path: PathBuf },
    #[error("error while reading {path:?}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path:?}: markers are not sorted by position (line {line})")]
    UnsortedPositions { path: PathBuf, line: u64 },
}

impl Error {
    pub(crate) fn invalid_rsq_threshold(name: &str) -> Self {
        Error::InvalidRsqThreshold {
            name: name.to_owned(),
        }
    }
}
