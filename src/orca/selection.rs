//! Resolves the user's orbital, constraint, and focus-atom expressions against a population
//! table.
//!
//! Orbital expressions: `all`, `h` or `homo` (case-insensitive), `5`, `0-10` or `0:10`, and
//! `h4` for HOMO-4 to HOMO+4.
//!
//! Constraint expressions: `none`, a comma-separated list of element symbols (`C,N`), or of
//! atom indices (`1,4,5`). Elements and atoms can't be mixed; whichever kind the expression
//! starts with wins, and the rest is ignored.

use std::{
    collections::BTreeSet,
    fmt,
    fmt::{Display, Formatter},
    io::{self, ErrorKind},
    str::FromStr,
};

use log::warn;
use regex::Regex;

use crate::orca::{
    population::{ContributionRecord, Spin},
    table::PopulationTable,
};

pub const ALL: &str = "all";
pub const NONE: &str = "none";

fn regex(pattern: &str) -> io::Result<Regex> {
    Regex::new(pattern).map_err(io::Error::other)
}

fn parse_index(s: &str) -> io::Result<usize> {
    s.parse::<usize>()
        .map_err(|_| io::Error::new(ErrorKind::InvalidInput, format!("Invalid index: {s}")))
}

/// An inclusive range of orbital numbers.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct OrbitalRange {
    pub start: usize,
    pub end: usize,
}

impl OrbitalRange {
    pub fn contains(&self, orbital_number: usize) -> bool {
        (self.start..=self.end).contains(&orbital_number)
    }

    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn is_single(&self) -> bool {
        self.start == self.end
    }
}

impl Display for OrbitalRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}...{}", self.start, self.end)
        }
    }
}

/// A parsed orbital expression, before it's resolved against a table.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OrbitalSelection {
    All,
    Homo,
    Single(usize),
    Range(usize, usize),
    /// HOMO-k to HOMO+k.
    HomoWindow(usize),
}

impl FromStr for OrbitalSelection {
    type Err = io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if s == ALL {
            return Ok(Self::All);
        }

        if s.eq_ignore_ascii_case("h") || s.eq_ignore_ascii_case("homo") {
            return Ok(Self::Homo);
        }

        if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
            return Ok(Self::Single(parse_index(s)?));
        }

        if let Some(caps) = regex(r"^(\d+)\s*[-:]\s*(\d+)$")?.captures(s) {
            let start = parse_index(&caps[1])?;
            let end = parse_index(&caps[2])?;

            if start > end {
                return Err(io::Error::new(
                    ErrorKind::InvalidInput,
                    format!("Start orbital {start} > last orbital {end}"),
                ));
            }
            return Ok(Self::Range(start, end));
        }

        if let Some(caps) = regex(r"^[hH](\d+)$")?.captures(s) {
            return Ok(Self::HomoWindow(parse_index(&caps[1])?));
        }

        Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("Malformed orbital selection: {s}"),
        ))
    }
}

impl OrbitalSelection {
    /// Turn this into a concrete range, checked against the alpha orbitals of the table.
    pub fn resolve(self, table: &PopulationTable) -> io::Result<OrbitalRange> {
        let max = table.max_orbital(Spin::Alpha).ok_or_else(|| {
            io::Error::new(ErrorKind::InvalidData, "No alpha orbitals in the population table")
        })?;

        let homo = || {
            table.homo().ok_or_else(|| {
                io::Error::new(
                    ErrorKind::InvalidData,
                    "No occupied orbitals; unable to locate the HOMO",
                )
            })
        };

        let out_of_range = || {
            io::Error::new(
                ErrorKind::InvalidInput,
                format!("Value exceeds range of orbitals: 0...{max}"),
            )
        };

        let (start, end) = match self {
            Self::All => (0, max),
            Self::Homo => {
                let h = homo()?;
                (h, h)
            }
            Self::Single(n) => (n, n),
            Self::Range(start, end) => (start, end),
            Self::HomoWindow(k) => {
                let h = homo()?;
                (h.checked_sub(k).ok_or_else(out_of_range)?, h + k)
            }
        };

        if end > max {
            return Err(out_of_range());
        }

        Ok(OrbitalRange { start, end })
    }
}

/// Restricts the atom-level and finer views to some elements, or to some atoms.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Constraint {
    #[default]
    None,
    Elements(BTreeSet<String>),
    Atoms(BTreeSet<usize>),
}

impl Constraint {
    /// Candidates not present in the table are dropped. If nothing is left, this falls back
    /// to no constraint, with a warning.
    pub fn resolve(expr: &str, table: &PopulationTable) -> io::Result<Self> {
        let expr = expr.trim();

        if expr == NONE {
            return Ok(Self::None);
        }

        if regex(r"^[A-Z][a-z]?")?.is_match(expr) {
            let present = table.elements();

            let elements: BTreeSet<String> = regex(r"[A-Z][a-z]?")?
                .find_iter(expr)
                .map(|m| m.as_str())
                .filter(|el| present.contains(el))
                .map(str::to_owned)
                .collect();

            if elements.is_empty() {
                warn!(
                    "None of the specified elements have been found. \
                     Continuing with all available elements."
                );
                return Ok(Self::None);
            }
            return Ok(Self::Elements(elements));
        }

        if regex(r"^\d+")?.is_match(expr) {
            let present = table.atoms();

            let mut atoms = BTreeSet::new();
            // Indices too large for `usize` can't be present either.
            for m in regex(r"\d+")?.find_iter(expr) {
                if let Ok(atom) = m.as_str().parse::<usize>() {
                    if present.contains(&atom) {
                        atoms.insert(atom);
                    }
                }
            }

            if atoms.is_empty() {
                warn!(
                    "None of the specified atoms have been found. \
                     Continuing with all available atoms."
                );
                return Ok(Self::None);
            }
            return Ok(Self::Atoms(atoms));
        }

        warn!(
            "None of the specified elements or atoms have been found. \
             Continuing with all available elements and atoms."
        );
        Ok(Self::None)
    }

    pub fn admits_atom(&self, atom: usize, element: &str) -> bool {
        match self {
            Self::None => true,
            Self::Elements(els) => els.contains(element),
            Self::Atoms(atoms) => atoms.contains(&atom),
        }
    }

    pub fn admits(&self, record: &ContributionRecord) -> bool {
        self.admits_atom(record.atom_index, &record.element_symbol)
    }
}

impl Display for Constraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Elements(els) => {
                let els: Vec<&str> = els.iter().map(String::as_str).collect();
                write!(f, "Elements {}", els.join(" "))
            }
            Self::Atoms(atoms) => {
                let atoms: Vec<String> = atoms.iter().map(|a| a.to_string()).collect();
                write!(f, "Atoms {}", atoms.join(" "))
            }
        }
    }
}

/// Atoms to draw AO heat maps for. Empty for `none`. Atoms outside the active constraint are
/// dropped; if nothing is left, a warning is logged and no AO plots are made.
pub fn resolve_focus_atoms(
    expr: &str,
    table: &PopulationTable,
    constraint: &Constraint,
) -> io::Result<Vec<usize>> {
    let expr = expr.trim();

    if expr == NONE {
        return Ok(Vec::new());
    }

    let present = table.atoms();

    let mut atoms = BTreeSet::new();
    for m in regex(r"\d+")?.find_iter(expr) {
        let Ok(atom) = m.as_str().parse::<usize>() else {
            continue;
        };
        if !present.contains(&atom) {
            continue;
        }

        if let Some(element) = table.element_of(atom) {
            if constraint.admits_atom(atom, element) {
                atoms.insert(atom);
            }
        }
    }

    if atoms.is_empty() {
        warn!(
            "None of the atoms specified for AO plots have been found, or they are excluded by \
             the constraints. No AO plots will be created."
        );
    }

    Ok(atoms.into_iter().collect())
}

/// Everything the aggregation needs to know about what to include.
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    pub orbitals: OrbitalRange,
    pub constraint: Constraint,
    pub focus_atoms: Vec<usize>,
}

impl Selection {
    pub fn resolve(
        table: &PopulationTable,
        orbitals: &str,
        constraints: &str,
        focus_atoms: &str,
    ) -> io::Result<Self> {
        let orbitals = orbitals.parse::<OrbitalSelection>()?.resolve(table)?;
        let constraint = Constraint::resolve(constraints, table)?;
        let focus_atoms = resolve_focus_atoms(focus_atoms, table, &constraint)?;

        Ok(Self {
            orbitals,
            constraint,
            focus_atoms,
        })
    }
}
