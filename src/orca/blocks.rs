//! Parses the `LOEWDIN REDUCED ORBITAL POPULATIONS PER MO` section of an ORCA output file.
//!
//! The section is a series of blocks separated by single blank lines. Each block packs several
//! orbitals side by side: three header rows (orbital numbers, energies, occupations), then one
//! row per (atom, AO) pair with one contribution column per orbital. Example:
//!
//! ```text
//!                       0         1         2
//!                  -20.55317  -1.33591  -0.69803
//!                    2.00000   2.00000   2.00000
//!                   --------  --------  --------
//!  0 O  s              99.9      84.6       0.0
//!  0 O  pz              0.0       2.9       0.0
//!  1 H  s               0.1       6.2      22.2
//! ```
//!
//! Two consecutive blank lines end the section. For spin-unrestricted calculations, a
//! `SPIN DOWN` line separates alpha from beta blocks.

use std::{
    collections::HashMap,
    io::{self, ErrorKind},
};

use log::{debug, warn};

use crate::orca::population::{AoFamily, ContributionRecord, Spin};

pub const SECTION_HEADER: &str = "LOEWDIN REDUCED ORBITAL POPULATIONS PER MO";

const SPIN_DOWN_MARKER: &str = "SPIN DOWN";
/// Lines containing any of these are ignored entirely: dashed separators, the `SPIN UP` /
/// `SPIN DOWN` dividers, and the `THRESHOLD FOR PRINTING` notice.
const SKIP_MARKERS: [&str; 3] = ["--", "SPIN", "THRESHOLD"];

/// Orbital numbers, energies, occupations.
const NUM_HEADER_ROWS: usize = 3;
/// Atom index, element, AO label.
const NUM_LEADING_COLS: usize = 3;

#[derive(Clone, Copy, PartialEq, Debug)]
enum ScanState {
    SearchingHeader,
    InBlock,
    BetweenBlocks,
    Done,
}

/// Line-by-line state machine over the section.
struct BlockScanner<'a> {
    state: ScanState,
    current_spin: Spin,
    blank_run: u8,
    rows: Vec<Vec<&'a str>>,
    builder: RecordBuilder,
}

impl<'a> BlockScanner<'a> {
    fn new() -> Self {
        Self {
            state: ScanState::SearchingHeader,
            current_spin: Spin::Alpha,
            blank_run: 0,
            rows: Vec::new(),
            builder: RecordBuilder::default(),
        }
    }

    fn feed(&mut self, line: &'a str) -> io::Result<()> {
        match self.state {
            ScanState::Done => return Ok(()),
            ScanState::SearchingHeader => {
                if line.contains(SECTION_HEADER) {
                    self.state = ScanState::BetweenBlocks;
                }
                return Ok(());
            }
            ScanState::InBlock | ScanState::BetweenBlocks => (),
        }

        // Once beta, always beta.
        if line.contains(SPIN_DOWN_MARKER) {
            self.current_spin = Spin::Beta;
        }

        // Skipped lines don't reset the blank line count.
        if SKIP_MARKERS.iter().any(|m| line.contains(m)) {
            return Ok(());
        }

        if line.trim().is_empty() {
            self.finish_block()?;
            self.blank_run += 1;

            self.state = if self.blank_run >= 2 {
                ScanState::Done
            } else {
                ScanState::BetweenBlocks
            };
        } else {
            self.blank_run = 0;
            self.rows.push(line.split_whitespace().collect());
            self.state = ScanState::InBlock;
        }

        Ok(())
    }

    fn finish_block(&mut self) -> io::Result<()> {
        if self.rows.is_empty() {
            return Ok(());
        }

        self.builder.push_block(&self.rows, self.current_spin)?;
        self.rows.clear();
        Ok(())
    }

    fn finish(mut self) -> io::Result<Vec<ContributionRecord>> {
        if self.state == ScanState::SearchingHeader {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("{SECTION_HEADER} not found"),
            ));
        }

        // Input ending without the double blank line.
        if self.state == ScanState::InBlock {
            self.finish_block()?;
        }

        Ok(self.builder.records)
    }
}

/// Expands raw blocks into records, and holds the atom -> element association.
#[derive(Default)]
struct RecordBuilder {
    records: Vec<ContributionRecord>,
    elements: HashMap<usize, String>,
}

impl RecordBuilder {
    fn push_block(&mut self, rows: &[Vec<&str>], spin: Spin) -> io::Result<()> {
        if rows.len() < NUM_HEADER_ROWS {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!(
                    "Orbital block has {} rows; expected at least {NUM_HEADER_ROWS} header rows",
                    rows.len()
                ),
            ));
        }

        let (header, body) = rows.split_at(NUM_HEADER_ROWS);
        let num_orbitals = header[0].len();

        if header.iter().any(|r| r.len() != num_orbitals) {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("Orbital block header rows differ in length: {header:?}"),
            ));
        }

        if body.is_empty() || num_orbitals == 0 {
            return Ok(());
        }

        let parse_usize = |s: &str| -> io::Result<usize> {
            s.parse::<usize>().map_err(|_| {
                io::Error::new(ErrorKind::InvalidData, format!("Invalid integer: {s}"))
            })
        };

        let parse_f64 = |s: &str| -> io::Result<f64> {
            s.parse::<f64>().map_err(|_| {
                io::Error::new(ErrorKind::InvalidData, format!("Invalid number: {s}"))
            })
        };

        let mut orbitals = Vec::with_capacity(num_orbitals);
        for i in 0..num_orbitals {
            orbitals.push((
                parse_usize(header[0][i])?,
                parse_f64(header[1][i])?,
                parse_f64(header[2][i])?,
            ));
        }

        // Validate and type the data rows once, before expanding them per orbital.
        let mut ao_rows = Vec::with_capacity(body.len());
        for row in body {
            if row.len() != NUM_LEADING_COLS + num_orbitals {
                return Err(io::Error::new(
                    ErrorKind::InvalidData,
                    format!(
                        "Population row has {} columns; expected {}: {}",
                        row.len(),
                        NUM_LEADING_COLS + num_orbitals,
                        row.join(" ")
                    ),
                ));
            }

            let atom_index = parse_usize(row[0])?;

            let Ok(ao_family) = AoFamily::from_label(row[2]) else {
                warn!("Skipping atom {atom_index} AO {}: unsupported shell", row[2]);
                continue;
            };
            let element = self.register_element(atom_index, row[1]);

            let mut contributions = Vec::with_capacity(num_orbitals);
            for col in &row[NUM_LEADING_COLS..] {
                contributions.push(parse_f64(col)?);
            }

            ao_rows.push((atom_index, element, ao_family, row[2], contributions));
        }

        self.records.reserve(num_orbitals * ao_rows.len());

        for (i, &(orbital_number, orbital_energy, occupation)) in orbitals.iter().enumerate() {
            for (atom_index, element, ao_family, ao_label, contributions) in &ao_rows {
                self.records.push(ContributionRecord {
                    orbital_number,
                    spin,
                    orbital_energy,
                    occupation,
                    atom_index: *atom_index,
                    element_symbol: element.clone(),
                    ao_family: *ao_family,
                    ao_label: ao_label.to_string(),
                    contribution_percent: contributions[i],
                });
            }
        }

        debug!(
            "Parsed {spin} block: orbitals {}..{}, {} AO rows",
            orbitals[0].0,
            orbitals[num_orbitals - 1].0,
            ao_rows.len()
        );

        Ok(())
    }

    /// The first element seen for an atom wins.
    fn register_element(&mut self, atom_index: usize, symbol: &str) -> String {
        let known = self
            .elements
            .entry(atom_index)
            .or_insert_with(|| symbol.to_owned());

        if known.as_str() != symbol {
            warn!("Atom {atom_index} listed as {symbol}, but previously as {known}. Keeping {known}.");
        }

        known.clone()
    }
}

/// Parse the last `LOEWDIN REDUCED ORBITAL POPULATIONS PER MO` section of an ORCA output into
/// records, in file order.
pub fn parse_section(text: &str) -> io::Result<Vec<ContributionRecord>> {
    let lines: Vec<&str> = text.lines().collect();

    let start = lines
        .iter()
        .rposition(|l| l.contains(SECTION_HEADER))
        .unwrap_or(lines.len());

    let mut scanner = BlockScanner::new();
    for line in &lines[start..] {
        scanner.feed(line)?;
        if scanner.state == ScanState::Done {
            break;
        }
    }

    scanner.finish()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    const CLOSED_SHELL: &str = include_str!("../../tests/data/closed_shell.out");
    const OPEN_SHELL: &str = include_str!("../../tests/data/open_shell.out");

    #[test]
    fn closed_shell() {
        let records = parse_section(CLOSED_SHELL).unwrap();

        // 7 orbitals, 6 AO rows each.
        assert_eq!(records.len(), 42);
        assert!(records.iter().all(|r| r.spin == Spin::Alpha));

        let first = &records[0];
        assert_eq!(first.orbital_number, 0);
        assert_relative_eq!(first.orbital_energy, -20.55317);
        assert_relative_eq!(first.occupation, 2.0);
        assert_eq!(first.atom_index, 0);
        assert_eq!(first.element_symbol, "O");
        assert_eq!(first.ao_label, "s");
        assert_relative_eq!(first.contribution_percent, 99.9);

        let py_4 = records
            .iter()
            .find(|r| r.orbital_number == 4 && r.ao_label == "py")
            .unwrap();
        assert_eq!(py_4.ao_family, AoFamily::P);
        assert_relative_eq!(py_4.contribution_percent, 100.0);

        // The second block, with a single orbital.
        let last = records.last().unwrap();
        assert_eq!(last.orbital_number, 6);
        assert_eq!(last.atom_index, 2);
        assert_relative_eq!(last.contribution_percent, 30.8);
    }

    #[test]
    fn contributions_sum_to_100() {
        let records = parse_section(CLOSED_SHELL).unwrap();

        for orbital in 0..=6 {
            let total: f64 = records
                .iter()
                .filter(|r| r.orbital_number == orbital)
                .map(|r| r.contribution_percent)
                .sum();
            assert_relative_eq!(total, 100.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn open_shell() {
        let records = parse_section(OPEN_SHELL).unwrap();

        let alpha = records.iter().filter(|r| r.spin == Spin::Alpha).count();
        let beta = records.iter().filter(|r| r.spin == Spin::Beta).count();
        assert_eq!(alpha, 30);
        assert_eq!(beta, 30);

        let beta_4 = records
            .iter()
            .find(|r| r.spin == Spin::Beta && r.orbital_number == 4)
            .unwrap();
        assert_relative_eq!(beta_4.occupation, 0.0);
        assert_relative_eq!(beta_4.orbital_energy, 0.05524);
    }

    #[test]
    fn missing_header() {
        let err = parse_section("Nothing to see here\n\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn last_section_wins() {
        let text = format!(
            "{SECTION_HEADER}\n          0\n     -1.0\n      2.0\n 0 C  s   100.0\n\n\n\
             {SECTION_HEADER}\n          0\n     -2.0\n      2.0\n 0 N  s   100.0\n\n\n"
        );
        let records = parse_section(&text).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].element_symbol, "N");
        assert_relative_eq!(records[0].orbital_energy, -2.0);
    }

    #[test]
    fn stops_at_double_blank() {
        let text = format!(
            "{SECTION_HEADER}\n          0\n     -1.0\n      2.0\n 0 C  s   100.0\n\n\n\
             not a block\n"
        );
        assert_eq!(parse_section(&text).unwrap().len(), 1);
    }

    #[test]
    fn finalizes_at_end_of_input() {
        let text = format!("{SECTION_HEADER}\n          0\n     -1.0\n      2.0\n 0 C  s   100.0");
        assert_eq!(parse_section(&text).unwrap().len(), 1);
    }

    #[test]
    fn header_only_block_has_no_records() {
        let text = format!("{SECTION_HEADER}\n          0\n     -1.0\n      2.0\n\n\n");
        assert!(parse_section(&text).unwrap().is_empty());
    }

    #[test]
    fn column_mismatch() {
        let text = format!(
            "{SECTION_HEADER}\n          0     1\n     -1.0  -0.5\n      2.0   2.0\n 0 C  s   100.0\n\n\n"
        );
        let err = parse_section(&text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn g_shells() {
        let text = format!(
            "{SECTION_HEADER}\n          0\n     -1.0\n      2.0\n\
             0 Kr s    85.0\n 0 Kr g0   10.0\n 0 Kr h1    5.0\n\n\n"
        );
        let records = parse_section(&text).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].ao_label, "g0");
        assert_eq!(records[1].ao_family, AoFamily::G);
        assert_relative_eq!(records[1].contribution_percent, 10.0);
    }

    #[test]
    fn skip_line_between_blanks_ends_section() {
        let text = format!(
            "{SECTION_HEADER}\n          0\n     -1.0\n      2.0\n 0 C  s   100.0\n\n\
             --------\n\n          1\n     -0.5\n      0.0\n 0 C  s   100.0\n\n\n"
        );
        let records = parse_section(&text).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].orbital_number, 0);
    }

    #[test]
    fn marker_lines_inside_block() {
        let text = format!(
            "{SECTION_HEADER}\n          0     1\n     -1.0  -0.5\n      2.0   2.0\n\
             THRESHOLD FOR PRINTING IS 0.1%\n 0 C  s   60.0  50.0\nSPIN UP\n\
             1 N  pz   40.0  50.0\n\n\n"
        );
        let records = parse_section(&text).unwrap();

        // One block: both rows expanded over both orbitals.
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.spin == Spin::Alpha));
        assert_eq!(
            records.iter().filter(|r| r.element_symbol == "N").count(),
            2
        );
    }

    #[test]
    fn first_element_kept() {
        let text = format!(
            "{SECTION_HEADER}\n          0     1\n     -1.0  -0.5\n      2.0   2.0\n\
             0 C  s   60.0  50.0\n 0 N  pz   40.0  50.0\n\n\n"
        );
        let records = parse_section(&text).unwrap();

        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.element_symbol == "C"));
    }
}
