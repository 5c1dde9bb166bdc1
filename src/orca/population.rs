//! Row types for the `LOEWDIN REDUCED ORBITAL POPULATIONS PER MO` table. One record describes
//! the contribution of a single atomic orbital on a single atom to one molecular orbital.

use std::{
    fmt,
    fmt::{Display, Formatter},
    io::{self, ErrorKind},
    str::FromStr,
};

#[cfg(feature = "encode")]
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

#[cfg_attr(feature = "encode", derive(Encode, Decode))]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Spin {
    /// Also used for closed-shell (restricted) calculations.
    #[default]
    Alpha,
    /// Only present for spin-unrestricted calculations.
    Beta,
}

impl Spin {
    /// Suffix used in file names, e.g. `el-cntrb-a.png`.
    pub fn file_suffix(self) -> &'static str {
        match self {
            Self::Alpha => "a",
            Self::Beta => "b",
        }
    }
}

impl Display for Spin {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let val = match self {
            Self::Alpha => "alpha",
            Self::Beta => "beta",
        };
        write!(f, "{val}")
    }
}

/// The reduced AO description: the angular momentum letter only.
#[cfg_attr(feature = "encode", derive(Encode, Decode))]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AoFamily {
    S,
    P,
    D,
    F,
    G,
}

impl AoFamily {
    /// Derive the family from a label as printed by ORCA, e.g. `pz` or `dxy`.
    pub fn from_label(label: &str) -> io::Result<Self> {
        match label.chars().next() {
            Some('s') => Ok(Self::S),
            Some('p') => Ok(Self::P),
            Some('d') => Ok(Self::D),
            Some('f') => Ok(Self::F),
            Some('g') => Ok(Self::G),
            _ => Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("Unsupported atomic orbital label: {label}"),
            )),
        }
    }
}

impl Display for AoFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let val = match self {
            Self::S => "s",
            Self::P => "p",
            Self::D => "d",
            Self::F => "f",
            Self::G => "g",
        };
        write!(f, "{val}")
    }
}

impl FromStr for AoFamily {
    type Err = io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s)
    }
}

/// One row of the population table. Field names double as the cache CSV header.
#[cfg_attr(feature = "encode", derive(Encode, Decode))]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContributionRecord {
    /// As numbered by ORCA. Unique per spin channel only.
    pub orbital_number: usize,
    pub spin: Spin,
    /// Hartree.
    pub orbital_energy: f64,
    pub occupation: f64,
    /// 0-based, in input order.
    pub atom_index: usize,
    pub element_symbol: String,
    pub ao_family: AoFamily,
    pub ao_label: String,
    /// In %. Not clamped.
    pub contribution_percent: f64,
}

/// The attributes shared by all records of one orbital. Used as the leading part of every
/// aggregation key.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrbitalInfo {
    pub number: usize,
    pub energy: f64,
    pub occupation: f64,
}

impl ContributionRecord {
    pub fn orbital(&self) -> OrbitalInfo {
        OrbitalInfo {
            number: self.orbital_number,
            energy: self.orbital_energy,
            occupation: self.occupation,
        }
    }
}
