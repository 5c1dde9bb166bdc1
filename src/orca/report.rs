//! The plain-text analysis report, `o-analysis.txt`.

use std::{
    fs::File,
    io::{self, Write},
    path::Path,
};

use crate::orca::{
    aggregate::{AoFamilySum, AoSum, AtomSum, Pivot, SpinViews},
    blocks::SECTION_HEADER,
    population::Spin,
    selection::{Constraint, OrbitalRange},
};

pub const REPORT_FILE: &str = "o-analysis.txt";

const RULE: &str = "==================================================================";

/// Run-level facts listed at the top of the report.
#[derive(Clone, Debug)]
pub struct ReportHeader<'a> {
    pub file_name: &'a str,
    pub orbitals: OrbitalRange,
    pub max_alpha: usize,
    /// `None` for closed-shell calculations.
    pub max_beta: Option<usize>,
    pub homo: Option<usize>,
    pub threshold: f64,
    pub constraint: &'a Constraint,
}

impl ReportHeader<'_> {
    fn make(&self) -> String {
        let mut r = format!("{RULE}\n{SECTION_HEADER} analysis of {}\n", self.file_name);

        if self.orbitals.is_single() {
            r.push_str(&format!("Analyzed orbital          : {}\n", self.orbitals));
        } else {
            r.push_str(&format!("Analyzed orbitals         : {}\n", self.orbitals));
        }

        match self.max_beta {
            Some(max_beta) => {
                r.push_str(&format!("Last alpha orbital no.    : {}\n", self.max_alpha));
                r.push_str(&format!("Last beta orbital no.     : {max_beta}\n"));
            }
            None => r.push_str(&format!("Last orbital no.          : {}\n", self.max_alpha)),
        }

        let homo = match self.homo {
            Some(h) => h.to_string(),
            None => "n/a".to_owned(),
        };
        r.push_str(&format!("Orbital no. of the HOMO   : {homo}\n"));
        r.push_str(&format!("Threshold for printing (%): {}\n", self.threshold));
        r.push_str(&format!("Applied constraints       : {}\n", self.constraint));
        r.push_str(RULE);
        r.push('\n');

        r
    }
}

fn push_row<'a>(r: &mut String, cells: impl Iterator<Item = &'a str>, widths: &[usize]) {
    for (cell, &width) in cells.zip(widths) {
        r.push_str(&format!("  {cell:>width$}"));
    }
    r.push('\n');
}

/// Right-aligned columns, sized to fit header and contents.
fn make_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return "(no contributions)\n".to_owned();
    }

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .map(|row| row[i].len())
                .chain([h.len()])
                .max()
                .unwrap_or_default()
        })
        .collect();

    let mut r = String::new();

    push_row(&mut r, headers.iter().copied(), &widths);
    for row in rows {
        push_row(&mut r, row.iter().map(String::as_str), &widths);
    }

    r
}

fn fmt_energy(v: f64) -> String {
    format!("{v:.5}")
}

fn fmt_occ(v: f64) -> String {
    format!("{v:.5}")
}

fn fmt_cntrb(v: f64) -> String {
    format!("{v:.1}")
}

fn element_table(views: &SpinViews) -> String {
    let pivot = Pivot::new(&views.by_element, |el| el.clone());

    let mut headers = vec!["OrbNo", "OrbitalEnergy", "Occupation"];
    headers.extend(pivot.columns.iter().map(String::as_str));

    let rows: Vec<Vec<String>> = pivot
        .rows
        .iter()
        .map(|row| {
            let mut cells = vec![
                row.orbital.number.to_string(),
                fmt_energy(row.orbital.energy),
                fmt_occ(row.orbital.occupation),
            ];
            cells.extend(row.values.iter().map(|v| fmt_cntrb(*v)));
            cells
        })
        .collect();

    make_table(&headers, &rows)
}

fn atom_table(sums: &[AtomSum]) -> String {
    let rows: Vec<Vec<String>> = sums
        .iter()
        .map(|s| {
            vec![
                s.orbital.number.to_string(),
                fmt_energy(s.orbital.energy),
                fmt_occ(s.orbital.occupation),
                s.key.element.clone(),
                s.key.atom.to_string(),
                fmt_cntrb(s.contribution),
            ]
        })
        .collect();

    make_table(
        &["OrbNo", "OrbitalEnergy", "Occupation", "Element", "AtomNo", "Cntrb"],
        &rows,
    )
}

fn ao_family_table(sums: &[AoFamilySum]) -> String {
    let rows: Vec<Vec<String>> = sums
        .iter()
        .map(|s| {
            vec![
                s.orbital.number.to_string(),
                fmt_energy(s.orbital.energy),
                fmt_occ(s.orbital.occupation),
                s.key.element.clone(),
                s.key.atom.to_string(),
                s.key.family.to_string(),
                fmt_cntrb(s.contribution),
            ]
        })
        .collect();

    make_table(
        &["OrbNo", "OrbitalEnergy", "Occupation", "Element", "AtomNo", "Orb", "Cntrb"],
        &rows,
    )
}

fn ao_table(sums: &[AoSum]) -> String {
    let rows: Vec<Vec<String>> = sums
        .iter()
        .map(|s| {
            vec![
                s.orbital.number.to_string(),
                fmt_energy(s.orbital.energy),
                fmt_occ(s.orbital.occupation),
                s.key.element.clone(),
                s.key.atom.to_string(),
                s.key.family.to_string(),
                s.key.label.clone(),
                fmt_cntrb(s.contribution),
            ]
        })
        .collect();

    make_table(
        &[
            "OrbNo",
            "OrbitalEnergy",
            "Occupation",
            "Element",
            "AtomNo",
            "Orb",
            "OrbOr",
            "Cntrb",
        ],
        &rows,
    )
}

fn aos_in_orbitals_table(sums: &[AoSum]) -> String {
    let rows: Vec<Vec<String>> = sums
        .iter()
        .map(|s| {
            vec![
                s.key.atom.to_string(),
                s.key.element.clone(),
                s.key.family.to_string(),
                s.key.label.clone(),
                s.orbital.number.to_string(),
                fmt_occ(s.orbital.occupation),
                fmt_cntrb(s.contribution),
            ]
        })
        .collect();

    make_table(
        &["AtomNo", "Element", "Orb", "OrbOr", "OrbNo", "Occ", "Cntrb"],
        &rows,
    )
}

/// Build the full report text. `views` holds one entry per spin channel, alpha first.
pub fn make_report(header: &ReportHeader, views: &[SpinViews]) -> String {
    let open_shell = views.iter().any(|v| v.spin == Spin::Beta);
    let suffix = |spin: Spin| {
        if open_shell {
            format!(" ({spin})")
        } else {
            String::new()
        }
    };

    let t = header.threshold;
    let mut r = header.make();

    let mut section = |title: String, table: String| {
        r.push_str(&format!("\n{title}:\n{RULE}\n"));
        r.push_str(&table);
    };

    for v in views {
        section(
            format!("Summary of element contributions (>= 0%) to orbitals{}", suffix(v.spin)),
            element_table(v),
        );
    }
    for v in views {
        section(
            format!("Summary of atom contributions (>= {t}%) to orbitals{}", suffix(v.spin)),
            atom_table(&v.by_atom),
        );
    }
    for v in views {
        section(
            format!("Summary of red. AO contributions (>= {t}%) to orbitals{}", suffix(v.spin)),
            ao_family_table(&v.by_ao_family),
        );
    }
    for v in views {
        section(
            format!("Summary of AO contributions (>= {t}%) to orbitals{}", suffix(v.spin)),
            ao_table(&v.by_ao),
        );
    }
    for v in views {
        section(
            format!("AOs (contribution >= {t}%) in orbitals{}", suffix(v.spin)),
            aos_in_orbitals_table(&v.aos_in_orbitals()),
        );
    }

    r
}

pub fn save_report(path: &Path, text: &str) -> io::Result<()> {
    let mut file = File::create(path)?;
    write!(file, "{text}")
}
