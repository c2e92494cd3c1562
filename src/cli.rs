use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use log::{debug, info};
use rayon::prelude::*;
use structopt::StructOpt;
use strum_macros::{Display, EnumString};

use crate::calling::{self, LdCriterion, PruneMethod, ScanConfigBuilder};
use crate::errors;
use crate::estimation::ci::CiMethod;
use crate::estimation::LdStatistic;
use crate::model::{BlockPartition, HaplotypeView, Region};
use crate::output;
use crate::preprocessing::{self, FileFormat};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "haploblocks",
    about = "Identification of haplotype blocks in phased genotype data."
)]
pub enum Haploblocks {
    #[structopt(
        name = "dprime",
        about = "Find blocks whose marker pairs satisfy the D' confidence interval criterion of Gabriel et al."
    )]
    Dprime {
        #[structopt(flatten)]
        input: InputOptions,
        #[structopt(
            long = "ci-method",
            default_value = "WP",
            possible_values = &["WP", "AV"],
            help = "D' confidence interval estimation method."
        )]
        ci_method: CiMethodName,
        #[structopt(
            long = "ci-precision",
            help = "Number of likelihood estimation points for the WP method."
        )]
        ci_precision: Option<usize>,
        #[structopt(
            long = "ld-ci-lower",
            default_value = "0.7",
            help = "Lower bound of the D' CI required for a strong LD pair."
        )]
        ld_ci_lower: f64,
        #[structopt(
            long = "ld-ci-upper",
            default_value = "0.98",
            help = "Upper bound of the D' CI required for a strong LD pair."
        )]
        ld_ci_upper: f64,
        #[structopt(
            long = "ehr-ci",
            default_value = "0.9",
            help = "Upper bound of the D' CI below which a pair counts as evidence of recombination."
        )]
        ehr_ci: f64,
        #[structopt(flatten)]
        scan: ScanOptions,
    },
    #[structopt(name = "rsq", about = "Find blocks with plain r^2 thresholds.")]
    Rsq {
        #[structopt(flatten)]
        input: InputOptions,
        #[structopt(
            long = "weak-rsq",
            help = "r^2 below which a pair counts as evidence of recombination."
        )]
        weak_rsq: f64,
        #[structopt(long = "strong-rsq", help = "r^2 from which a pair counts as strong LD.")]
        strong_rsq: f64,
        #[structopt(flatten)]
        scan: ScanOptions,
    },
    #[structopt(
        name = "ld-table",
        about = "Export a pairwise LD statistic over all filtered markers instead of calling blocks."
    )]
    LdTable {
        #[structopt(flatten)]
        input: InputOptions,
        #[structopt(
            long = "statistic",
            default_value = "DPRIME",
            possible_values = &["D", "DPRIME", "R", "RSQ", "CI"]
        )]
        statistic: LdStatistic,
        #[structopt(
            long = "ci-method",
            default_value = "WP",
            possible_values = &["WP", "AV"],
            help = "D' confidence interval estimation method (CI statistic only)."
        )]
        ci_method: CiMethodName,
        #[structopt(
            long = "ci-precision",
            help = "Number of likelihood estimation points for the WP method."
        )]
        ci_precision: Option<usize>,
    },
}

#[derive(Debug, StructOpt)]
pub struct InputOptions {
    /// Phased input file (VCF or HAPMAP2 haplotype matrix), optionally
    /// gzipped.
    #[structopt(long = "phase-file", short = "p", parse(from_os_str))]
    pub phase_file: PathBuf,
    /// HAPMAP2 legend file (required with --file-format HAPMAP2).
    #[structopt(long = "legend-file", parse(from_os_str))]
    pub legend_file: Option<PathBuf>,
    #[structopt(
        long = "file-format",
        default_value = "VCF",
        possible_values = &["VCF", "HAPMAP2"]
    )]
    pub file_format: FileFormat,
    /// Regions START-END to process; passing more than one runs them in
    /// parallel, each into its own output file.
    #[structopt(long = "region")]
    pub regions: Vec<Region>,
    /// Minor allele frequency threshold; markers with MAF <= threshold are
    /// dropped.
    #[structopt(long = "maf", default_value = "0.0")]
    pub maf: f64,
    /// Output file; a .gz suffix enables compression.
    #[structopt(long = "output", short = "o", parse(from_os_str))]
    pub output: PathBuf,
    /// Number of worker threads for multi-region runs.
    #[structopt(long = "threads", default_value = "1")]
    pub threads: usize,
}

#[derive(Debug, StructOpt)]
pub struct ScanOptions {
    /// Minimum fraction of strong LD pairs within a haplotype block.
    #[structopt(long = "ld-fraction", default_value = "0.95")]
    pub ld_fraction: f64,
    #[structopt(
        long = "pruning-method",
        default_value = "MIG++",
        possible_values = &["MIG", "MIG+", "MIG++"]
    )]
    pub pruning_method: PruneMethodName,
    /// MIG++ window size; defaults to max(1, floor(M * (1 - fraction) / 2)).
    #[structopt(long = "window")]
    pub window: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum CiMethodName {
    #[strum(serialize = "WP", serialize = "wp")]
    WallPritchard,
    #[strum(serialize = "AV", serialize = "av")]
    AsymptoticVariance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum PruneMethodName {
    #[strum(serialize = "MIG")]
    Mig,
    #[strum(serialize = "MIG+")]
    MigPlus,
    #[strum(serialize = "MIG++")]
    MigPlusPlus,
}

pub fn run(opt: Haploblocks) -> Result<()> {
    match opt {
        Haploblocks::Dprime {
            input,
            ci_method,
            ci_precision,
            ld_ci_lower,
            ld_ci_upper,
            ehr_ci,
            scan,
        } => {
            validate_common(&input, &scan)?;
            if !(0.0..=1.0).contains(&ld_ci_lower) {
                return Err(errors::Error::InvalidStrongLowerBound.into());
            }
            if !(0.0..=1.0).contains(&ld_ci_upper) {
                return Err(errors::Error::InvalidStrongUpperBound.into());
            }
            if ld_ci_lower >= ld_ci_upper {
                return Err(errors::Error::InvertedStrongBounds.into());
            }
            if !(0.0..=1.0).contains(&ehr_ci) {
                return Err(errors::Error::InvalidRecombUpperBound.into());
            }

            let method = match ci_method {
                CiMethodName::WallPritchard => CiMethod::WallPritchard {
                    likelihood_density: ci_precision
                        .filter(|&density| density > 0)
                        .ok_or(errors::Error::InvalidLikelihoodDensity)?,
                },
                CiMethodName::AsymptoticVariance => CiMethod::AsymptoticVariance,
            };

            run_regions(
                &input,
                &scan,
                LdCriterion::DprimeCi {
                    method,
                    strong_pair_cl: ld_ci_lower,
                    strong_pair_cu: ld_ci_upper,
                    recomb_pair_cu: ehr_ci,
                },
            )
        }
        Haploblocks::Rsq {
            input,
            weak_rsq,
            strong_rsq,
            scan,
        } => {
            validate_common(&input, &scan)?;
            if weak_rsq <= 0.0 || weak_rsq > 1.0 {
                return Err(errors::Error::invalid_rsq_threshold("weak-rsq").into());
            }
            if strong_rsq <= 0.0 || strong_rsq > 1.0 {
                return Err(errors::Error::invalid_rsq_threshold("strong-rsq").into());
            }
            if weak_rsq >= strong_rsq {
                return Err(errors::Error::InvertedRsqThresholds.into());
            }

            run_regions(
                &input,
                &scan,
                LdCriterion::Rsq {
                    weak_rsq,
                    strong_rsq,
                },
            )
        }
        Haploblocks::LdTable {
            input,
            statistic,
            ci_method,
            ci_precision,
        } => {
            validate_input(&input)?;

            let method = match (statistic, ci_method) {
                (LdStatistic::Ci, CiMethodName::WallPritchard) => CiMethod::WallPritchard {
                    likelihood_density: ci_precision
                        .filter(|&density| density > 0)
                        .ok_or(errors::Error::InvalidLikelihoodDensity)?,
                },
                (LdStatistic::Ci, CiMethodName::AsymptoticVariance) => {
                    CiMethod::AsymptoticVariance
                }
                _ => CiMethod::None,
            };

            for_each_region(&input, |region, output_path| {
                let view = load_view(&input, region)?;
                let n_pairs = output::write_ld_table(output_path, &view, statistic, method)?;
                info!(
                    "{} marker pairs written to {}",
                    n_pairs,
                    output_path.display()
                );
                Ok(())
            })
        }
    }
}

fn validate_input(input: &InputOptions) -> Result<()> {
    if !(0.0..=0.5).contains(&input.maf) {
        return Err(errors::Error::InvalidMafThreshold.into());
    }
    if input.threads == 0 {
        return Err(errors::Error::InvalidThreads.into());
    }
    if input.file_format == FileFormat::Hapmap2 && input.legend_file.is_none() {
        return Err(errors::Error::MissingLegendFile.into());
    }

    Ok(())
}

fn validate_common(input: &InputOptions, scan: &ScanOptions) -> Result<()> {
    validate_input(input)?;
    if scan.ld_fraction <= 0.0 || scan.ld_fraction > 1.0 {
        return Err(errors::Error::InvalidLdFraction.into());
    }
    if scan.window == Some(0) {
        return Err(errors::Error::InvalidWindow.into());
    }

    Ok(())
}

/// Run one task per region: inline for zero or one region, over a thread
/// pool with per-region output files otherwise.
fn for_each_region(
    input: &InputOptions,
    task: impl Fn(Option<Region>, &Path) -> Result<()> + Sync,
) -> Result<()> {
    match input.regions.as_slice() {
        [] => task(None, &input.output),
        [region] => task(Some(*region), &input.output),
        regions => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(input.threads)
                .build()?;
            pool.install(|| {
                regions
                    .par_iter()
                    .map(|region| task(Some(*region), &region_output_path(&input.output, region)))
                    .collect::<Result<Vec<()>>>()
            })?;
            Ok(())
        }
    }
}

fn run_regions(input: &InputOptions, scan: &ScanOptions, criterion: LdCriterion) -> Result<()> {
    for_each_region(input, |region, output_path| {
        run_region(input, scan, criterion, region, output_path)
    })
}

fn load_view(input: &InputOptions, region: Option<Region>) -> Result<HaplotypeView> {
    info!("loading {}", input.phase_file.display());
    let view = preprocessing::load(
        input.file_format,
        &input.phase_file,
        input.legend_file.as_deref(),
        region,
        input.maf,
    )?;
    info!(
        "{} of {} markers kept after filtering",
        view.n_markers(),
        view.n_markers_unfiltered()
    );
    Ok(view)
}

fn run_region(
    input: &InputOptions,
    scan: &ScanOptions,
    criterion: LdCriterion,
    region: Option<Region>,
    output_path: &Path,
) -> Result<()> {
    let view = load_view(input, region)?;

    let prune_method = match scan.pruning_method {
        PruneMethodName::Mig => PruneMethod::Mig,
        PruneMethodName::MigPlus => PruneMethod::MigPlus,
        PruneMethodName::MigPlusPlus => PruneMethod::MigPlusPlus {
            window: Some(scan.window.unwrap_or_else(|| {
                calling::default_window(view.n_markers(), scan.ld_fraction)
            })),
        },
    };

    let config = ScanConfigBuilder::default()
        .criterion(criterion)
        .ld_fraction(scan.ld_fraction)
        .prune_method(prune_method)
        .build()
        .map_err(|e| anyhow!(e))?;

    let partition = if view.n_markers() < 2 {
        info!("not enough SNPs, writing an empty block table");
        BlockPartition::default()
    } else {
        let (candidates, stats) = calling::scan_candidates_with_stats(&view, &config);
        debug!(
            "{} marker pairs classified in {} passes, {} candidate blocks",
            stats.n_pairs_classified,
            stats.n_passes,
            candidates.len()
        );
        calling::select_blocks(&view, candidates)
    };

    info!(
        "{} blocks found, writing {}",
        partition.len(),
        output_path.display()
    );
    output::write_blocks(output_path, &view, &partition, &config)
}

/// Output path for one region of a multi-region run: the region is infixed
/// before the file extension (and before a trailing .gz).
fn region_output_path(output: &Path, region: &Region) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (base, gz) = match name.strip_suffix(".gz") {
        Some(base) => (base.to_owned(), ".gz"),
        None => (name.clone(), ""),
    };

    let infixed = match base.rfind('.') {
        Some(dot) => format!(
            "{}.{}-{}{}{}",
            &base[..dot],
            region.start,
            region.end,
            &base[dot..],
            gz
        ),
        None => format!("{}.{}-{}{}", base, region.start, region.end, gz),
    };

    output.with_file_name(infixed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input_options(maf: f64) -> InputOptions {
        InputOptions {
            phase_file: PathBuf::from("test.vcf"),
            legend_file: None,
            file_format: FileFormat::Vcf,
            regions: Vec::new(),
            maf,
            output: PathBuf::from("out.txt"),
            threads: 1,
        }
    }

    fn scan_options() -> ScanOptions {
        ScanOptions {
            ld_fraction: 0.95,
            pruning_method: PruneMethodName::MigPlusPlus,
            window: None,
        }
    }

    #[test]
    fn test_maf_validation() {
        assert!(validate_common(&input_options(0.0), &scan_options()).is_ok());
        assert!(validate_common(&input_options(0.5), &scan_options()).is_ok());
        assert!(validate_common(&input_options(0.6), &scan_options()).is_err());
        assert!(validate_common(&input_options(-0.1), &scan_options()).is_err());
    }

    #[test]
    fn test_fraction_and_window_validation() {
        let input = input_options(0.0);

        let mut scan = scan_options();
        scan.ld_fraction = 0.0;
        assert!(validate_common(&input, &scan).is_err());

        let mut scan = scan_options();
        scan.window = Some(0);
        assert!(validate_common(&input, &scan).is_err());

        let mut scan = scan_options();
        scan.ld_fraction = 1.0;
        scan.window = Some(5);
        assert!(validate_common(&input, &scan).is_ok());
    }

    #[test]
    fn test_hapmap_requires_legend() {
        let mut input = input_options(0.0);
        input.file_format = FileFormat::Hapmap2;
        assert!(validate_common(&input, &scan_options()).is_err());
        input.legend_file = Some(PathBuf::from("test.legend"));
        assert!(validate_common(&input, &scan_options()).is_ok());
    }

    #[test]
    fn test_dprime_requires_likelihood_density_for_wp() {
        let opt = Haploblocks::Dprime {
            input: input_options(0.0),
            ci_method: CiMethodName::WallPritchard,
            ci_precision: None,
            ld_ci_lower: 0.7,
            ld_ci_upper: 0.98,
            ehr_ci: 0.9,
            scan: scan_options(),
        };
        let err = run(opt).unwrap_err();
        assert!(err.to_string().contains("ci-precision"));
    }

    #[test]
    fn test_method_name_parsing() {
        assert_eq!("WP".parse::<CiMethodName>().unwrap(), CiMethodName::WallPritchard);
        assert_eq!("av".parse::<CiMethodName>().unwrap(), CiMethodName::AsymptoticVariance);
        assert_eq!("MIG".parse::<PruneMethodName>().unwrap(), PruneMethodName::Mig);
        assert_eq!("MIG+".parse::<PruneMethodName>().unwrap(), PruneMethodName::MigPlus);
        assert_eq!(
            "MIG++".parse::<PruneMethodName>().unwrap(),
            PruneMethodName::MigPlusPlus
        );
        assert!("MIG+++".parse::<PruneMethodName>().is_err());
    }

    #[test]
    fn test_region_output_path() {
        let region = Region {
            start: 100,
            end: 200,
        };
        assert_eq!(
            region_output_path(&PathBuf::from("out/blocks.txt"), &region),
            PathBuf::from("out/blocks.100-200.txt")
        );
        assert_eq!(
            region_output_path(&PathBuf::from("blocks.txt.gz"), &region),
            PathBuf::from("blocks.100-200.txt.gz")
        );
        assert_eq!(
            region_output_path(&PathBuf::from("blocks"), &region),
            PathBuf::from("blocks.100-200")
        );
    }
}
