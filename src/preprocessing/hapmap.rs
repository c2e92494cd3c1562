//! Parser for HAPMAP2 legend + haplotype matrix files.

use std::io::BufRead;
use std::path::Path;

use crate::errors::Error;
use crate::model::Region;
use crate::preprocessing::{is_valid_base, LineReader, RawPanel};

const LEGEND_COLUMNS: [&str; 4] = ["rs", "position", "0", "1"];
const MATRIX_SEPARATOR: char = ' ';

pub(crate) fn read_panel(
    legend_reader: impl BufRead,
    legend_path: &Path,
    haplotype_reader: impl BufRead,
    haplotype_path: &Path,
    region: Option<Region>,
) -> Result<RawPanel, Error> {
    let mut panel = RawPanel::default();

    // legend: marker ids, positions and the two allele labels
    let mut legend = LineReader::new(legend_reader, legend_path);

    let total_columns = match legend.next_line()? {
        Some(line) => {
            let columns: Vec<&str> = line.split('\t').collect();
            for (position, expected) in LEGEND_COLUMNS.iter().enumerate() {
                if columns
                    .get(position)
                    .map(|found| !found.eq_ignore_ascii_case(expected))
                    .unwrap_or(true)
                {
                    return Err(Error::MissingColumn {
                        path: legend_path.to_owned(),
                        line: legend.line_number(),
                        column: (*expected).to_owned(),
                        position: position + 1,
                    });
                }
            }
            columns.len()
        }
        None => {
            return Err(Error::MissingColumn {
                path: legend_path.to_owned(),
                line: 1,
                column: LEGEND_COLUMNS[0].to_owned(),
                position: 1,
            })
        }
    };

    // per legend row: whether the marker lies inside the region
    let mut in_region: Vec<bool> = Vec::new();

    while let Some(line) = legend.next_line()? {
        let line_number = legend.line_number();
        let tokens: Vec<&str> = line.split('\t').collect();

        if tokens.len() != total_columns {
            return Err(Error::ColumnCountMismatch {
                path: legend_path.to_owned(),
                line: line_number,
                expected: total_columns,
                found: tokens.len(),
            });
        }

        let position: u64 = tokens[1].parse().map_err(|_| Error::InvalidPosition {
            path: legend_path.to_owned(),
            line: line_number,
            value: tokens[1].to_owned(),
        })?;

        let allele = |token: &str| -> Result<u8, Error> {
            let bytes = token.as_bytes();
            if bytes.len() == 1 && is_valid_base(bytes[0].to_ascii_uppercase()) {
                Ok(bytes[0].to_ascii_uppercase())
            } else {
                Err(Error::InvalidAllele {
                    path: legend_path.to_owned(),
                    line: line_number,
                    value: token.to_owned(),
                })
            }
        };
        let first_allele = allele(tokens[2])?;
        let second_allele = allele(tokens[3])?;

        let keep = region
            .map(|r| position >= r.start && position <= r.end)
            .unwrap_or(true);
        in_region.push(keep);

        if keep {
            if let Some(&last) = panel.positions.last() {
                if position <= last {
                    return Err(Error::UnsortedPositions {
                        path: legend_path.to_owned(),
                        line: line_number,
                    });
                }
            }

            panel.markers.push(tokens[0].to_owned());
            panel.positions.push(position);
            panel.major_alleles.push(first_allele);
            panel.minor_alleles.push(second_allele);
            panel.haplotypes.push(Vec::new());
        }
    }

    // haplotype matrix: one row per haplotype, one 0/1 column per legend row
    let mut matrix = LineReader::new(haplotype_reader, haplotype_path);

    let mut n_first_alleles = vec![0usize; panel.n_markers()];
    let mut n_second_alleles = vec![0usize; panel.n_markers()];

    while let Some(line) = matrix.next_line()? {
        let line_number = matrix.line_number();
        let line = line.strip_suffix(MATRIX_SEPARATOR).unwrap_or(&line);
        let cells: Vec<&str> = line.split(MATRIX_SEPARATOR).collect();

        if cells.len() != in_region.len() {
            return Err(Error::ColumnCountMismatch {
                path: haplotype_path.to_owned(),
                line: line_number,
                expected: in_region.len(),
                found: cells.len(),
            });
        }

        let mut marker = 0usize;
        for (cell, &keep) in cells.iter().zip(in_region.iter()) {
            let value = match cell.as_bytes() {
                [b'0'] => false,
                [b'1'] => true,
                _ => {
                    return Err(Error::InvalidAllele {
                        path: haplotype_path.to_owned(),
                        line: line_number,
                        value: (*cell).to_owned(),
                    });
                }
            };

            if keep {
                if value {
                    n_second_alleles[marker] += 1;
                    panel.haplotypes[marker].push(panel.minor_alleles[marker]);
                } else {
                    n_first_alleles[marker] += 1;
                    panel.haplotypes[marker].push(panel.major_alleles[marker]);
                }
                marker += 1;
            }
        }

        panel.n_haplotypes += 1;
    }

    if panel.n_haplotypes == 0 {
        return Err(Error::NoHaplotypes {
            path: haplotype_path.to_owned(),
        });
    }

    // orient on the observed counts; ties stay with the legend's 0 allele
    panel.major_allele_freqs = Vec::with_capacity(panel.n_markers());
    for marker in 0..panel.n_markers() {
        let (n_first, n_second) = (n_first_alleles[marker], n_second_alleles[marker]);
        if n_first < n_second {
            std::mem::swap(
                &mut panel.major_alleles[marker],
                &mut panel.minor_alleles[marker],
            );
            panel
                .major_allele_freqs
                .push(n_second as f64 / (n_first + n_second) as f64);
        } else {
            panel
                .major_allele_freqs
                .push(n_first as f64 / (n_first + n_second) as f64);
        }
    }

    Ok(panel)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::path::PathBuf;

    use super::*;
    use crate::errors::Error;

    fn parse(legend: &str, matrix: &str, region: Option<Region>) -> Result<RawPanel, Error> {
        read_panel(
            Cursor::new(legend.to_owned()),
            &PathBuf::from("test.legend"),
            Cursor::new(matrix.to_owned()),
            &PathBuf::from("test.hap"),
            region,
        )
    }

    const LEGEND: &str = "rs\tposition\t0\t1\n\
        rs1\t100\tA\tC\n\
        rs2\t200\tG\tT\n";

    #[test]
    fn test_basic_panel() {
        let panel = parse(LEGEND, "0 0\n0 1\n1 0\n0 0\n", None).unwrap();

        assert_eq!(panel.n_haplotypes, 4);
        assert_eq!(panel.n_markers(), 2);
        assert_eq!(panel.positions, vec![100, 200]);
        assert_eq!(panel.major_alleles, vec![b'A', b'G']);
        assert_eq!(panel.minor_alleles, vec![b'C', b'T']);
        assert_eq!(panel.major_allele_freqs, vec![0.75, 0.75]);
        assert_eq!(panel.haplotypes[0], b"AACA".to_vec());
        assert_eq!(panel.haplotypes[1], b"GTGG".to_vec());
    }

    #[test]
    fn test_trailing_separator_is_tolerated() {
        let panel = parse(LEGEND, "0 0 \n0 1 \n", None).unwrap();
        assert_eq!(panel.n_haplotypes, 2);
    }

    #[test]
    fn test_second_allele_majority_swaps_orientation() {
        let panel = parse(LEGEND, "1 0\n1 0\n1 0\n0 0\n", None).unwrap();
        assert_eq!(panel.major_alleles, vec![b'C', b'G']);
        assert_eq!(panel.minor_alleles, vec![b'A', b'T']);
        assert_eq!(panel.major_allele_freqs, vec![0.75, 1.0]);
    }

    #[test]
    fn test_region_restricts_markers() {
        let panel = parse(
            LEGEND,
            "0 0\n0 1\n",
            Some(Region {
                start: 150,
                end: 250,
            }),
        )
        .unwrap();
        assert_eq!(panel.n_markers(), 1);
        assert_eq!(panel.markers, vec!["rs2"]);
        assert_eq!(panel.haplotypes[0], b"GT".to_vec());
    }

    #[test]
    fn test_missing_legend_column_is_rejected() {
        let result = parse("rs\tposition\t0\n", "0\n", None);
        assert!(matches!(
            result,
            Err(Error::MissingColumn { position: 4, .. })
        ));
    }

    #[test]
    fn test_matrix_width_mismatch_is_rejected() {
        let result = parse(LEGEND, "0 0 1\n", None);
        assert!(matches!(
            result,
            Err(Error::ColumnCountMismatch {
                expected: 2,
                found: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_matrix_cell_is_rejected() {
        let result = parse(LEGEND, "0 2\n", None);
        assert!(matches!(result, Err(Error::InvalidAllele { .. })));
    }

    #[test]
    fn test_empty_matrix_is_rejected() {
        let result = parse(LEGEND, "", None);
        assert!(matches!(result, Err(Error::NoHaplotypes { .. })));
    }
}
