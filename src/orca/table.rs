//! The full population table for one ORCA output file, and its CSV side-cache.

use std::{
    collections::BTreeSet,
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use log::{info, warn};

use crate::orca::{
    blocks::parse_section,
    population::{ContributionRecord, Spin},
};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PopulationTable {
    /// In file order. Immutable once built.
    records: Vec<ContributionRecord>,
}

impl PopulationTable {
    /// From the text of an ORCA output file.
    pub fn new(text: &str) -> io::Result<Self> {
        Ok(Self {
            records: parse_section(text)?,
        })
    }

    pub fn from_records(records: Vec<ContributionRecord>) -> Self {
        Self { records }
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let data_str = fs::read_to_string(path)?;
        Self::new(&data_str)
    }

    /// The cache lives next to the output file: `job.out` -> `job.out.csv`.
    pub fn cache_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".csv");
        PathBuf::from(name)
    }

    /// Restore the table from its cache if possible; otherwise parse the output file and write
    /// the cache. The cache is keyed by file name only; use `force_rebuild` when the output
    /// file has changed.
    pub fn load_or_build(path: &Path, force_rebuild: bool) -> io::Result<Self> {
        let cache = Self::cache_path(path);

        if cache.is_file() {
            info!("Found {} in folder.", cache.display());

            if force_rebuild {
                info!("Rebuild requested. Building a new {}.", cache.display());
            } else {
                match Self::load_csv(&cache) {
                    Ok(table) if !table.records.is_empty() => return Ok(table),
                    Ok(_) => warn!("{} is empty. Rebuilding it.", cache.display()),
                    Err(e) => warn!("Unable to read {}: {e}. Rebuilding it.", cache.display()),
                }
            }
        }

        info!("Reading orbitals from {}. Please be patient.", path.display());
        let table = Self::load(path)?;

        table.save_csv(&cache)?;
        info!("Population table saved to {}", cache.display());

        Ok(table)
    }

    pub fn save_csv(&self, path: &Path) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path).map_err(io::Error::other)?;

        for record in &self.records {
            writer.serialize(record).map_err(io::Error::other)?;
        }

        writer.flush()
    }

    pub fn load_csv(path: &Path) -> io::Result<Self> {
        let mut reader = csv::Reader::from_path(path).map_err(io::Error::other)?;

        let mut records = Vec::new();
        for row in reader.deserialize() {
            let record: ContributionRecord =
                row.map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
            records.push(record);
        }

        Ok(Self { records })
    }

    pub fn records(&self) -> &[ContributionRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records of one spin channel, in file order.
    pub fn records_for(&self, spin: Spin) -> impl Iterator<Item = &ContributionRecord> {
        self.records.iter().filter(move |r| r.spin == spin)
    }

    /// True for spin-unrestricted calculations.
    pub fn has_beta(&self) -> bool {
        self.records.iter().any(|r| r.spin == Spin::Beta)
    }

    /// The spin channels present, alpha first.
    pub fn spins(&self) -> Vec<Spin> {
        if self.has_beta() {
            vec![Spin::Alpha, Spin::Beta]
        } else {
            vec![Spin::Alpha]
        }
    }

    /// The highest orbital number of a spin channel, or `None` if it's absent.
    pub fn max_orbital(&self, spin: Spin) -> Option<usize> {
        self.records_for(spin).map(|r| r.orbital_number).max()
    }

    /// The orbital number of the HOMO: the highest-numbered alpha orbital with a non-zero
    /// occupation. `None` if no alpha orbital is occupied.
    pub fn homo(&self) -> Option<usize> {
        let mut occupations: Vec<f64> = Vec::new();
        for r in self.records_for(Spin::Alpha) {
            if !occupations.contains(&r.occupation) {
                occupations.push(r.occupation);
            }
        }

        if occupations.len() > 2 {
            occupations.sort_by(f64::total_cmp);
            warn!(
                "Found {} distinct occupations ({occupations:?}). Taking the HOMO as the highest \
                 orbital with occupation > 0.",
                occupations.len()
            );
        }

        self.records_for(Spin::Alpha)
            .filter(|r| r.occupation > 0.)
            .map(|r| r.orbital_number)
            .max()
    }

    /// Element symbols present, sorted.
    pub fn elements(&self) -> BTreeSet<&str> {
        self.records
            .iter()
            .map(|r| r.element_symbol.as_str())
            .collect()
    }

    /// Atom indices present, sorted.
    pub fn atoms(&self) -> BTreeSet<usize> {
        self.records.iter().map(|r| r.atom_index).collect()
    }

    pub fn element_of(&self, atom: usize) -> Option<&str> {
        self.records
            .iter()
            .find(|r| r.atom_index == atom)
            .map(|r| r.element_symbol.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use approx::assert_relative_eq;

    use super::*;

    const CLOSED_SHELL: &str = include_str!("../../tests/data/closed_shell.out");
    const OPEN_SHELL: &str = include_str!("../../tests/data/open_shell.out");

    fn record(orbital_number: usize, occupation: f64) -> ContributionRecord {
        ContributionRecord {
            orbital_number,
            spin: Spin::Alpha,
            orbital_energy: -0.1 * orbital_number as f64,
            occupation,
            atom_index: 0,
            element_symbol: "C".to_owned(),
            ao_family: crate::orca::population::AoFamily::S,
            ao_label: "s".to_owned(),
            contribution_percent: 100.,
        }
    }

    #[test]
    fn derived_scalars() {
        let table = PopulationTable::new(CLOSED_SHELL).unwrap();

        assert!(!table.has_beta());
        assert_eq!(table.spins(), vec![Spin::Alpha]);
        assert_eq!(table.max_orbital(Spin::Alpha), Some(6));
        assert_eq!(table.max_orbital(Spin::Beta), None);
        assert_eq!(table.homo(), Some(4));
        assert_eq!(table.elements().into_iter().collect::<Vec<_>>(), vec!["H", "O"]);
        assert_eq!(table.atoms().into_iter().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(table.element_of(2), Some("H"));
        assert_eq!(table.element_of(7), None);
    }

    #[test]
    fn open_shell_homo_is_alpha() {
        let table = PopulationTable::new(OPEN_SHELL).unwrap();

        assert!(table.has_beta());
        assert_eq!(table.max_orbital(Spin::Beta), Some(5));
        assert_eq!(table.homo(), Some(4));
    }

    #[test]
    fn homo_with_fractional_occupations() {
        let table = PopulationTable::from_records(vec![
            record(0, 2.),
            record(1, 2.),
            record(2, 1.),
            record(3, 0.),
        ]);
        assert_eq!(table.homo(), Some(2));

        let empty = PopulationTable::from_records(vec![record(0, 0.)]);
        assert_eq!(empty.homo(), None);
    }

    #[test]
    fn cache_round_trip() {
        let table = PopulationTable::new(OPEN_SHELL).unwrap();

        let path = env::temp_dir().join(format!("orca_orb_table_{}.csv", std::process::id()));
        table.save_csv(&path).unwrap();
        let restored = PopulationTable::load_csv(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(restored, table);
        assert_relative_eq!(restored.records()[7].orbital_energy, -1.30117);
    }

    #[test]
    fn cache_path() {
        assert_eq!(
            PopulationTable::cache_path(Path::new("dir/job.out")),
            PathBuf::from("dir/job.out.csv")
        );
    }
}
