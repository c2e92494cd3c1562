//! Tab-delimited block tables, optionally gzip-compressed.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::calling::{LdCriterion, PruneMethod, ScanConfig};
use crate::estimation::ci::{CiEstimator, CiMethod};
use crate::estimation::{self, LdStatistic};
use crate::model::{BlockPartition, HaplotypeView};

const TABLE_COLUMNS: [&str; 12] = [
    "BLOCK_NAME",
    "FIRST_SNP",
    "LAST_SNP",
    "FIRST_SNP_ID",
    "LAST_SNP_ID",
    "START_BP",
    "END_BP",
    "N_SNPS",
    "N_HAPS",
    "N_UNIQUE_HAPS",
    "N_COMMON_HAPS",
    "HAPS_DIVERSITY",
];

/// Sink selected by the output file name; `.gz` enables compression.
enum BlockWriter {
    Text(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl BlockWriter {
    fn create(path: &Path) -> Result<Self> {
        let file = BufWriter::new(
            File::create(path).with_context(|| format!("error while creating {:?}", path))?,
        );

        if path.extension().map(|ext| ext == "gz").unwrap_or(false) {
            Ok(BlockWriter::Gzip(GzEncoder::new(
                file,
                Compression::default(),
            )))
        } else {
            Ok(BlockWriter::Text(file))
        }
    }

    fn finish(self) -> io::Result<()> {
        match self {
            BlockWriter::Text(mut writer) => writer.flush(),
            BlockWriter::Gzip(encoder) => encoder.finish()?.flush(),
        }
    }
}

impl Write for BlockWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            BlockWriter::Text(writer) => writer.write(buf),
            BlockWriter::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            BlockWriter::Text(writer) => writer.flush(),
            BlockWriter::Gzip(encoder) => encoder.flush(),
        }
    }
}

/// Write the final partition: comment lines echoing the run configuration,
/// a header row and one record per block, in partition iteration order.
pub fn write_blocks(
    path: &Path,
    view: &HaplotypeView,
    partition: &BlockPartition,
    config: &ScanConfig,
) -> Result<()> {
    let mut out = BlockWriter::create(path)?;

    write_run_header(&mut out, view, config)?;

    let mut table = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(out);

    table.write_record(&TABLE_COLUMNS)?;

    for (index, record) in partition.records().iter().enumerate() {
        let block = &record.block;
        let diversity = &record.diversity;
        table.write_record(&[
            format!("BLOCK_{:07}", index + 1),
            view.markers()[block.start].clone(),
            view.markers()[block.end].clone(),
            block.start.to_string(),
            block.end.to_string(),
            view.positions()[block.start].to_string(),
            view.positions()[block.end].to_string(),
            (block.end - block.start + 1).to_string(),
            diversity.n_haps.to_string(),
            diversity.n_unique_haps.to_string(),
            diversity.n_common_haps.to_string(),
            diversity.haps_diversity.to_string(),
        ])?;
    }

    table.flush()?;
    table
        .into_inner()
        .map_err(|e| anyhow::anyhow!("error while flushing {:?}: {}", path, e))?
        .finish()
        .with_context(|| format!("error while closing {:?}", path))?;

    Ok(())
}

/// Write one pairwise statistic for every marker pair (i, j), i > j, of the
/// view as a space-delimited table. `ci_method` is consulted only for the CI
/// statistic.
pub fn write_ld_table(
    path: &Path,
    view: &HaplotypeView,
    statistic: LdStatistic,
    ci_method: CiMethod,
) -> Result<u64> {
    let mut out = BlockWriter::create(path)?;
    let mut n_pairs = 0u64;

    match statistic {
        LdStatistic::Ci => {
            writeln!(out, "ID1 ID2 POS1 POS2 MARKER1 MARKER2 LOWER_CI UPPER_CI")?;
            let mut estimator = CiEstimator::new(view, ci_method);
            for i in 1..view.n_markers() {
                for j in 0..i {
                    let (lower, upper) = estimator.dprime_ci(i, j);
                    writeln!(out, "{} {} {}", pair_prefix(view, i, j), lower, upper)?;
                    n_pairs += 1;
                }
            }
        }
        statistic => {
            writeln!(out, "ID1 ID2 POS1 POS2 MARKER1 MARKER2 {}", statistic)?;
            for i in 1..view.n_markers() {
                for j in 0..i {
                    let value = match statistic {
                        LdStatistic::D => estimation::d(view, i, j),
                        LdStatistic::Dprime => estimation::d_prime(view, i, j),
                        LdStatistic::R => estimation::r(view, i, j),
                        LdStatistic::Rsq => estimation::rsq(view, i, j),
                        LdStatistic::Ci => unreachable!(),
                    };
                    writeln!(out, "{} {}", pair_prefix(view, i, j), value)?;
                    n_pairs += 1;
                }
            }
        }
    }

    out.finish()
        .with_context(|| format!("error while closing {:?}", path))?;

    Ok(n_pairs)
}

fn pair_prefix(view: &HaplotypeView, i: usize, j: usize) -> String {
    format!(
        "{} {} {} {} {} {}",
        i,
        j,
        view.positions()[i],
        view.positions()[j],
        view.markers()[i],
        view.markers()[j]
    )
}

fn write_run_header(out: &mut impl Write, view: &HaplotypeView, config: &ScanConfig) -> Result<()> {
    writeln!(
        out,
        "# PHASE FILE: {}",
        view.phase_file()
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "NA".to_owned())
    )?;
    writeln!(
        out,
        "# MAP FILE: {}",
        view.legend_file()
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "NA".to_owned())
    )?;
    match view.region() {
        Some(region) => writeln!(out, "# REGION: {}", region)?,
        None => writeln!(out, "# REGION: NA")?,
    }
    writeln!(out, "# MAF FILTER: > {}", view.maf_threshold())?;
    writeln!(out, "# ALL SNPs: {}", view.n_markers_unfiltered())?;
    writeln!(out, "# FILTERED SNPs: {}", view.n_markers())?;
    writeln!(out, "# HAPLOTYPES: {}", view.n_haplotypes())?;

    match config.criterion {
        LdCriterion::DprimeCi {
            method,
            strong_pair_cl,
            strong_pair_cu,
            recomb_pair_cu,
        } => {
            writeln!(out, "# D' CI COMPUTATION METHOD: {}", method)?;
            match method {
                CiMethod::WallPritchard { likelihood_density } => {
                    writeln!(out, "# D' LIKELIHOOD DENSITY: {}", likelihood_density)?
                }
                _ => writeln!(out, "# D' LIKELIHOOD DENSITY: NA")?,
            }
            writeln!(
                out,
                "# D' CI LOWER BOUND FOR STRONG LD: >= {}",
                strong_pair_cl
            )?;
            writeln!(
                out,
                "# D' CI UPPER BOUND FOR STRONG LD: >= {}",
                strong_pair_cu
            )?;
            writeln!(
                out,
                "# D' CI UPPER BOUND FOR RECOMBINATION: <= {}",
                recomb_pair_cu
            )?;
        }
        LdCriterion::Rsq {
            weak_rsq,
            strong_rsq,
        } => {
            writeln!(out, "# STRONG PAIR RSQ: >= {}", strong_rsq)?;
            writeln!(out, "# WEAK PAIR RSQ: < {}", weak_rsq)?;
        }
    }

    writeln!(
        out,
        "# FRACTION OF STRONG LD SNP PAIRS: >= {}",
        config.ld_fraction
    )?;
    writeln!(out, "# PRUNING METHOD: {}", config.prune_method)?;
    match config.prune_method {
        PruneMethod::MigPlusPlus {
            window: Some(window),
        } => writeln!(out, "# WINDOW: {}", window)?,
        _ => writeln!(out, "# WINDOW: NA")?,
    }

    Ok(())
}
