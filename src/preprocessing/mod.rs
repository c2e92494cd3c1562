//! Loading of phased haplotype panels from VCF or HAPMAP2 files into a
//! filtered view.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use flate2::read::MultiGzDecoder;
use strum_macros::{Display, EnumString};

use crate::errors;
use crate::model::{HaplotypeView, HaplotypeViewBuilder, Region};
use crate::utils::{fcmp, EPSILON};

pub mod hapmap;
pub mod vcf;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum FileFormat {
    #[strum(serialize = "VCF", serialize = "vcf")]
    Vcf,
    #[strum(serialize = "HAPMAP2", serialize = "hapmap2")]
    Hapmap2,
}

/// Unfiltered panel as parsed from disk; reduced to a [`HaplotypeView`] by
/// the MAF mask.
#[derive(Debug, Default)]
pub(crate) struct RawPanel {
    pub(crate) n_haplotypes: usize,
    pub(crate) markers: Vec<String>,
    pub(crate) positions: Vec<u64>,
    pub(crate) major_alleles: Vec<u8>,
    pub(crate) minor_alleles: Vec<u8>,
    pub(crate) major_allele_freqs: Vec<f64>,
    pub(crate) haplotypes: Vec<Vec<u8>>,
}

impl RawPanel {
    pub(crate) fn n_markers(&self) -> usize {
        self.markers.len()
    }
}

/// Open a panel file, transparently decompressing when the gzip magic is
/// present.
pub(crate) fn open_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let mut file =
        File::open(path).with_context(|| format!("error while opening {:?}", path))?;

    let mut magic = [0u8; 2];
    let mut n_read = 0usize;
    while n_read < magic.len() {
        match file
            .read(&mut magic[n_read..])
            .with_context(|| format!("error while reading {:?}", path))?
        {
            0 => break,
            n => n_read += n,
        }
    }

    let file = File::open(path).with_context(|| format!("error while opening {:?}", path))?;
    if n_read == magic.len() && magic == GZIP_MAGIC {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Line source shared by the parsers; tracks line numbers for diagnostics
/// and rejects empty lines.
pub(crate) struct LineReader<R: BufRead> {
    path: PathBuf,
    lines: Lines<R>,
    line_number: u64,
}

impl<R: BufRead> LineReader<R> {
    pub(crate) fn new(reader: R, path: &Path) -> Self {
        LineReader {
            path: path.to_owned(),
            lines: reader.lines(),
            line_number: 0,
        }
    }

    pub(crate) fn line_number(&self) -> u64 {
        self.line_number
    }

    pub(crate) fn next_line(&mut self) -> Result<Option<String>, errors::Error> {
        match self.lines.next() {
            None => Ok(None),
            Some(Err(source)) => Err(errors::Error::Read {
                path: self.path.clone(),
                source,
            }),
            Some(Ok(line)) => {
                self.line_number += 1;
                if line.is_empty() {
                    Err(errors::Error::EmptyLine {
                        path: self.path.clone(),
                        line: self.line_number,
                    })
                } else {
                    Ok(Some(line))
                }
            }
        }
    }
}

/// Load a phased panel and reduce it to the view the block scan operates on:
/// markers within the region whose minor allele frequency strictly exceeds
/// the threshold.
pub fn load(
    format: FileFormat,
    phase_file: &Path,
    legend_file: Option<&Path>,
    region: Option<Region>,
    maf_threshold: f64,
) -> Result<HaplotypeView> {
    let panel = match format {
        FileFormat::Vcf => {
            let reader = open_reader(phase_file)?;
            vcf::read_panel(reader, phase_file, region)?
        }
        FileFormat::Hapmap2 => {
            let legend = legend_file.ok_or(errors::Error::MissingLegendFile)?;
            let legend_reader = open_reader(legend)?;
            let haplotype_reader = open_reader(phase_file)?;
            hapmap::read_panel(legend_reader, legend, haplotype_reader, phase_file, region)?
        }
    };

    mask(panel, phase_file, legend_file, region, maf_threshold)
}

/// Apply the MAF filter and attach the provenance the output header echoes.
fn mask(
    panel: RawPanel,
    phase_file: &Path,
    legend_file: Option<&Path>,
    region: Option<Region>,
    maf_threshold: f64,
) -> Result<HaplotypeView> {
    let keep: Vec<bool> = panel
        .major_allele_freqs
        .iter()
        .map(|&p| fcmp(1.0 - p, maf_threshold, EPSILON) == Ordering::Greater)
        .collect();

    let filter = |n: usize| keep[n];
    let n_markers_unfiltered = panel.n_markers();

    macro_rules! masked {
        ($field:expr) => {
            $field
                .into_iter()
                .enumerate()
                .filter(|(n, _)| filter(*n))
                .map(|(_, value)| value)
                .collect::<Vec<_>>()
        };
    }

    HaplotypeViewBuilder::default()
        .n_haplotypes(panel.n_haplotypes)
        .n_markers_unfiltered(n_markers_unfiltered)
        .markers(masked!(panel.markers))
        .positions(masked!(panel.positions))
        .major_alleles(masked!(panel.major_alleles))
        .minor_alleles(masked!(panel.minor_alleles))
        .major_allele_freqs(masked!(panel.major_allele_freqs))
        .haplotypes(masked!(panel.haplotypes))
        .phase_file(Some(phase_file.to_owned()))
        .legend_file(legend_file.map(|p| p.to_owned()))
        .region(region)
        .maf_threshold(maf_threshold)
        .build()
        .map_err(|e| anyhow!("inconsistent haplotype panel: {}", e))
}

pub(crate) fn is_valid_base(c: u8) -> bool {
    matches!(c, b'A' | b'C' | b'G' | b'T')
}
