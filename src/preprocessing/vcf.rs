//! Parser for phased, single-chromosome VCF files.

use std::io::BufRead;
use std::path::Path;

use crate::errors::Error;
use crate::model::Region;
use crate::preprocessing::{is_valid_base, LineReader, RawPanel};

const MANDATORY_COLUMNS: [&str; 9] = [
    "#CHROM", "POS", "ID", "REF", "ALT", "QUAL", "FILTER", "INFO", "FORMAT",
];
const FILE_FORMAT_MAGIC: &str = "##fileformat";
const VARIANT_TYPE_KEY: &str = "VT";
const SNP_TYPE: &str = "SNP";

pub(crate) fn read_panel(
    reader: impl BufRead,
    path: &Path,
    region: Option<Region>,
) -> Result<RawPanel, Error> {
    let mut lines = LineReader::new(reader, path);
    let mut panel = RawPanel::default();

    // the file format information line is mandatory and comes first
    match lines.next_line()? {
        Some(line)
            if line
                .splitn(2, '=')
                .next()
                .map(|token| token.trim_end().eq_ignore_ascii_case(FILE_FORMAT_MAGIC))
                .unwrap_or(false) => {}
        _ => {
            return Err(Error::VcfMissingFileFormat {
                path: path.to_owned(),
            })
        }
    }

    // skip meta-information lines until the header row
    let total_columns = loop {
        let line = match lines.next_line()? {
            Some(line) => line,
            None => {
                return Err(Error::VcfMissingHeader {
                    path: path.to_owned(),
                })
            }
        };

        if line.starts_with("##") {
            continue;
        }
        if !line.starts_with('#') {
            return Err(Error::VcfMissingHeader {
                path: path.to_owned(),
            });
        }

        let columns: Vec<&str> = line.split('\t').collect();
        for (position, expected) in MANDATORY_COLUMNS.iter().enumerate() {
            if columns
                .get(position)
                .map(|found| !found.eq_ignore_ascii_case(expected))
                .unwrap_or(true)
            {
                return Err(Error::MissingColumn {
                    path: path.to_owned(),
                    line: lines.line_number(),
                    column: (*expected).to_owned(),
                    position: position + 1,
                });
            }
        }
        break columns.len();
    };

    let n_samples = total_columns - MANDATORY_COLUMNS.len();
    if n_samples == 0 {
        return Err(Error::NoSamples {
            path: path.to_owned(),
        });
    }
    panel.n_haplotypes = 2 * n_samples;

    let mut chromosome: Option<String> = None;

    while let Some(line) = lines.next_line()? {
        let line_number = lines.line_number();
        let tokens: Vec<&str> = line.split('\t').collect();

        if tokens.len() != total_columns {
            return Err(Error::ColumnCountMismatch {
                path: path.to_owned(),
                line: line_number,
                expected: total_columns,
                found: tokens.len(),
            });
        }

        // one chromosome per file
        match &chromosome {
            None => chromosome = Some(tokens[0].to_owned()),
            Some(expected) if expected.as_str() != tokens[0] => {
                return Err(Error::UnexpectedChromosome {
                    path: path.to_owned(),
                    line: line_number,
                    expected: expected.clone(),
                    found: tokens[0].to_owned(),
                });
            }
            Some(_) => (),
        }

        let position: u64 = tokens[1].parse().map_err(|_| Error::InvalidPosition {
            path: path.to_owned(),
            line: line_number,
            value: tokens[1].to_owned(),
        })?;

        // when the variant type is annotated it must be a SNP
        let variant_type = tokens[7].split(';').find_map(|entry| {
            let mut parts = entry.splitn(2, '=');
            let key = parts.next().map(str::trim)?;
            if key.eq_ignore_ascii_case(VARIANT_TYPE_KEY) {
                parts.next().map(str::trim)
            } else {
                None
            }
        });
        if let Some(variant_type) = variant_type {
            if !variant_type.eq_ignore_ascii_case(SNP_TYPE) {
                continue;
            }
        }

        if let Some(region) = region {
            if position < region.start || position > region.end {
                continue;
            }
        }

        let alt = tokens[4];
        if alt.is_empty() {
            return Err(Error::InvalidAllele {
                path: path.to_owned(),
                line: line_number,
                value: alt.to_owned(),
            });
        }
        if alt.len() > 1 {
            // multi-allelic SNP or indel
            continue;
        }
        let minor_allele = alt.as_bytes()[0].to_ascii_uppercase();
        if minor_allele == b'.' {
            // monomorphic
            continue;
        }
        if !is_valid_base(minor_allele) {
            return Err(Error::InvalidAllele {
                path: path.to_owned(),
                line: line_number,
                value: alt.to_owned(),
            });
        }

        let reference = tokens[3];
        if reference.is_empty() {
            return Err(Error::InvalidAllele {
                path: path.to_owned(),
                line: line_number,
                value: reference.to_owned(),
            });
        }
        if reference.len() > 1 {
            // indel
            continue;
        }
        let major_allele = reference.as_bytes()[0].to_ascii_uppercase();
        if !is_valid_base(major_allele) {
            return Err(Error::InvalidAllele {
                path: path.to_owned(),
                line: line_number,
                value: reference.to_owned(),
            });
        }

        let mut alleles = Vec::with_capacity(panel.n_haplotypes);
        let mut n_ref_allele = 0usize;
        let mut n_alt_allele = 0usize;
        let mut missing = false;

        for (sample, field) in tokens[MANDATORY_COLUMNS.len()..].iter().enumerate() {
            let genotype = field.split(':').next().unwrap_or("");
            let genotype_bytes = genotype.as_bytes();

            if genotype_bytes.len() != 3 {
                return Err(Error::InvalidGenotype {
                    path: path.to_owned(),
                    line: line_number,
                    sample,
                    value: genotype.to_owned(),
                });
            }
            if genotype_bytes[1] != b'|' {
                return Err(Error::UnphasedGenotype {
                    path: path.to_owned(),
                    line: line_number,
                    sample,
                    value: genotype.to_owned(),
                });
            }
            if genotype_bytes[0] == b'.' && genotype_bytes[2] == b'.' {
                missing = true;
                break;
            }

            for &allele_index in &[genotype_bytes[0], genotype_bytes[2]] {
                match allele_index {
                    b'0' => {
                        alleles.push(major_allele);
                        n_ref_allele += 1;
                    }
                    b'1' => {
                        alleles.push(minor_allele);
                        n_alt_allele += 1;
                    }
                    _ => {
                        return Err(Error::InvalidGenotype {
                            path: path.to_owned(),
                            line: line_number,
                            sample,
                            value: genotype.to_owned(),
                        });
                    }
                }
            }
        }

        if missing {
            continue;
        }

        if let Some(&last) = panel.positions.last() {
            if position <= last {
                return Err(Error::UnsortedPositions {
                    path: path.to_owned(),
                    line: line_number,
                });
            }
        }

        // orient on the observed counts; ties stay with the reference allele
        let (major_allele, minor_allele, major_allele_freq) = if n_ref_allele < n_alt_allele {
            (
                minor_allele,
                major_allele,
                n_alt_allele as f64 / (n_ref_allele + n_alt_allele) as f64,
            )
        } else {
            (
                major_allele,
                minor_allele,
                n_ref_allele as f64 / (n_ref_allele + n_alt_allele) as f64,
            )
        };

        panel.markers.push(tokens[2].to_owned());
        panel.positions.push(position);
        panel.major_alleles.push(major_allele);
        panel.minor_alleles.push(minor_allele);
        panel.major_allele_freqs.push(major_allele_freq);
        panel.haplotypes.push(alleles);
    }

    Ok(panel)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::path::PathBuf;

    use super::*;
    use crate::errors::Error;

    fn parse(content: &str) -> Result<RawPanel, Error> {
        read_panel(Cursor::new(content.to_owned()), &PathBuf::from("test.vcf"), None)
    }

    const HEADER: &str = "##fileformat=VCFv4.1\n\
        #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\n";

    #[test]
    fn test_basic_panel() {
        let panel = parse(&format!(
            "{}20\t100\trs1\tA\tC\t.\tPASS\t.\tGT\t0|0\t0|1\n\
             20\t200\trs2\tG\tT\t.\tPASS\tVT=SNP\tGT\t1|0\t0|0\n",
            HEADER
        ))
        .unwrap();

        assert_eq!(panel.n_haplotypes, 4);
        assert_eq!(panel.n_markers(), 2);
        assert_eq!(panel.markers, vec!["rs1", "rs2"]);
        assert_eq!(panel.positions, vec![100, 200]);
        assert_eq!(panel.major_alleles, vec![b'A', b'G']);
        assert_eq!(panel.minor_alleles, vec![b'C', b'T']);
        assert_eq!(panel.major_allele_freqs, vec![0.75, 0.75]);
        assert_eq!(panel.haplotypes[0], b"AAAC".to_vec());
        assert_eq!(panel.haplotypes[1], b"TGGG".to_vec());
    }

    #[test]
    fn test_minor_allele_majority_swaps_orientation() {
        let panel = parse(&format!(
            "{}20\t100\trs1\tA\tC\t.\tPASS\t.\tGT\t1|1\t0|1\n",
            HEADER
        ))
        .unwrap();
        assert_eq!(panel.major_alleles, vec![b'C']);
        assert_eq!(panel.minor_alleles, vec![b'A']);
        assert_eq!(panel.major_allele_freqs, vec![0.75]);
    }

    #[test]
    fn test_non_snp_rows_are_skipped() {
        let panel = parse(&format!(
            "{}20\t100\trs1\tA\tC\t.\tPASS\t.\tGT\t0|0\t0|1\n\
             20\t150\trs2\tA\t.\t.\tPASS\t.\tGT\t0|0\t0|0\n\
             20\t200\trs3\tAT\tA\t.\tPASS\t.\tGT\t0|0\t0|1\n\
             20\t250\trs4\tA\tAC\t.\tPASS\t.\tGT\t0|0\t0|1\n\
             20\t300\trs5\tG\tT\t.\tPASS\tVT=INDEL\tGT\t0|0\t0|1\n\
             20\t350\trs6\tG\tT\t.\tPASS\t.\tGT\t.|.\t0|1\n",
            HEADER
        ))
        .unwrap();
        assert_eq!(panel.n_markers(), 1);
        assert_eq!(panel.markers, vec!["rs1"]);
    }

    #[test]
    fn test_unphased_genotype_is_rejected() {
        let result = parse(&format!(
            "{}20\t100\trs1\tA\tC\t.\tPASS\t.\tGT\t0/1\t0|1\n",
            HEADER
        ));
        assert!(matches!(result, Err(Error::UnphasedGenotype { sample: 0, .. })));
    }

    #[test]
    fn test_missing_file_format_is_rejected() {
        let result = parse("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\n");
        assert!(matches!(result, Err(Error::VcfMissingFileFormat { .. })));
    }

    #[test]
    fn test_chromosome_mixture_is_rejected() {
        let result = parse(&format!(
            "{}20\t100\trs1\tA\tC\t.\tPASS\t.\tGT\t0|0\t0|1\n\
             21\t200\trs2\tG\tT\t.\tPASS\t.\tGT\t0|0\t0|1\n",
            HEADER
        ));
        assert!(matches!(result, Err(Error::UnexpectedChromosome { line: 4, .. })));
    }

    #[test]
    fn test_column_count_mismatch_is_rejected() {
        let result = parse(&format!("{}20\t100\trs1\tA\tC\t.\tPASS\t.\tGT\t0|0\n", HEADER));
        assert!(matches!(
            result,
            Err(Error::ColumnCountMismatch {
                expected: 11,
                found: 10,
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_alt_allele_is_rejected() {
        let result = parse(&format!(
            "{}20\t100\trs1\tA\tZ\t.\tPASS\t.\tGT\t0|0\t0|1\n",
            HEADER
        ));
        assert!(matches!(result, Err(Error::InvalidAllele { .. })));
    }

    #[test]
    fn test_region_restricts_markers() {
        let content = format!(
            "{}20\t100\trs1\tA\tC\t.\tPASS\t.\tGT\t0|0\t0|1\n\
             20\t200\trs2\tG\tT\t.\tPASS\t.\tGT\t0|0\t0|1\n\
             20\t300\trs3\tA\tG\t.\tPASS\t.\tGT\t0|0\t0|1\n",
            HEADER
        );
        let panel = read_panel(
            Cursor::new(content),
            &PathBuf::from("test.vcf"),
            Some(Region {
                start: 150,
                end: 250,
            }),
        )
        .unwrap();
        assert_eq!(panel.markers, vec!["rs2"]);
    }

    #[test]
    fn test_unsorted_positions_are_rejected() {
        let result = parse(&format!(
            "{}20\t200\trs1\tA\tC\t.\tPASS\t.\tGT\t0|0\t0|1\n\
             20\t100\trs2\tG\tT\t.\tPASS\t.\tGT\t0|0\t0|1\n",
            HEADER
        ));
        assert!(matches!(result, Err(Error::UnsortedPositions { .. })));
    }
}
