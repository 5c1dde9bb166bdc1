//! Sums of contributions to orbitals, at four granularities: element, atom, atom + AO family
//! (s, p, d, f), and atom + specific AO (e.g. `dxy`).
//!
//! The element view ignores the constraint and threshold. The others apply both; rows below
//! the threshold are dropped one by one, so an orbital may vanish from them entirely while
//! still being listed in the element view.

use std::collections::{BTreeMap, BTreeSet};

use crate::orca::{
    population::{AoFamily, ContributionRecord, OrbitalInfo, Spin},
    selection::{Constraint, OrbitalRange},
    table::PopulationTable,
};

/// One grouped row: the orbital, the rest of the grouping key, and the summed contribution.
#[derive(Clone, Debug, PartialEq)]
pub struct ContributionSum<K> {
    pub orbital: OrbitalInfo,
    pub key: K,
    /// In %.
    pub contribution: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AtomKey {
    pub element: String,
    pub atom: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AoFamilyKey {
    pub element: String,
    pub atom: usize,
    pub family: AoFamily,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AoKey {
    pub element: String,
    pub atom: usize,
    pub family: AoFamily,
    pub label: String,
}

pub type ElementSum = ContributionSum<String>;
pub type AtomSum = ContributionSum<AtomKey>;
pub type AoFamilySum = ContributionSum<AoFamilyKey>;
pub type AoSum = ContributionSum<AoKey>;

/// Group by (orbital number, key) and sum. Output is sorted by orbital number, then key.
/// Energy and occupation are constant per orbital within a spin channel, so they ride along.
fn group_sum<'a, K, F>(
    records: impl Iterator<Item = &'a ContributionRecord>,
    key_fn: F,
) -> Vec<ContributionSum<K>>
where
    K: Ord + Clone,
    F: Fn(&ContributionRecord) -> K,
{
    let mut groups: BTreeMap<(usize, K), ContributionSum<K>> = BTreeMap::new();

    for record in records {
        let key = key_fn(record);

        groups
            .entry((record.orbital_number, key.clone()))
            .or_insert_with(|| ContributionSum {
                orbital: record.orbital(),
                key,
                contribution: 0.,
            })
            .contribution += record.contribution_percent;
    }

    groups.into_values().collect()
}

/// The four views for one spin channel.
#[derive(Clone, Debug, PartialEq)]
pub struct SpinViews {
    pub spin: Spin,
    pub by_element: Vec<ElementSum>,
    pub by_atom: Vec<AtomSum>,
    pub by_ao_family: Vec<AoFamilySum>,
    pub by_ao: Vec<AoSum>,
}

impl SpinViews {
    pub fn new(
        table: &PopulationTable,
        spin: Spin,
        orbitals: OrbitalRange,
        constraint: &Constraint,
        threshold: f64,
    ) -> Self {
        let in_range: Vec<&ContributionRecord> = table
            .records_for(spin)
            .filter(|r| orbitals.contains(r.orbital_number))
            .collect();

        let constrained: Vec<&ContributionRecord> = in_range
            .iter()
            .copied()
            .filter(|r| constraint.admits(r))
            .collect();

        let by_element = group_sum(in_range.iter().copied(), |r| r.element_symbol.clone());

        let mut by_atom = group_sum(constrained.iter().copied(), |r| AtomKey {
            element: r.element_symbol.clone(),
            atom: r.atom_index,
        });

        let mut by_ao_family = group_sum(constrained.iter().copied(), |r| AoFamilyKey {
            element: r.element_symbol.clone(),
            atom: r.atom_index,
            family: r.ao_family,
        });

        let mut by_ao = group_sum(constrained.iter().copied(), |r| AoKey {
            element: r.element_symbol.clone(),
            atom: r.atom_index,
            family: r.ao_family,
            label: r.ao_label.clone(),
        });

        by_atom.retain(|r| r.contribution >= threshold);
        by_ao_family.retain(|r| r.contribution >= threshold);
        by_ao.retain(|r| r.contribution >= threshold);

        Self {
            spin,
            by_element,
            by_atom,
            by_ao_family,
            by_ao,
        }
    }

    /// The specific-AO view, listed per AO instead of per orbital: sorted by atom, element,
    /// family, label, orbital number, then occupation.
    pub fn aos_in_orbitals(&self) -> Vec<AoSum> {
        let mut result = self.by_ao.clone();

        result.sort_by(|a, b| {
            (a.key.atom, &a.key.element, a.key.family, &a.key.label, a.orbital.number)
                .cmp(&(b.key.atom, &b.key.element, b.key.family, &b.key.label, b.orbital.number))
                .then_with(|| a.orbital.occupation.total_cmp(&b.orbital.occupation))
        });

        result
    }

    /// Specific-AO rows of a single atom.
    pub fn aos_of_atom(&self, atom: usize) -> impl Iterator<Item = &AoSum> {
        self.by_ao.iter().filter(move |r| r.key.atom == atom)
    }
}

/// Compute the views for every spin channel present, alpha first.
pub fn aggregate(
    table: &PopulationTable,
    orbitals: OrbitalRange,
    constraint: &Constraint,
    threshold: f64,
) -> Vec<SpinViews> {
    table
        .spins()
        .into_iter()
        .map(|spin| SpinViews::new(table, spin, orbitals, constraint, threshold))
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct PivotRow {
    pub orbital: OrbitalInfo,
    /// One per column. Missing cells are 0.
    pub values: Vec<f64>,
}

/// A wide table: one row per orbital, one column per key.
#[derive(Clone, Debug, PartialEq)]
pub struct Pivot<C> {
    pub columns: Vec<C>,
    pub rows: Vec<PivotRow>,
}

impl<C: Ord + Clone> Pivot<C> {
    /// Columns and rows are sorted; rows by orbital number.
    pub fn new<K>(sums: &[ContributionSum<K>], column: impl Fn(&K) -> C) -> Self {
        let columns: Vec<C> = sums
            .iter()
            .map(|s| column(&s.key))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut rows: BTreeMap<usize, PivotRow> = BTreeMap::new();

        for sum in sums {
            let col = column(&sum.key);
            let Ok(i) = columns.binary_search(&col) else {
                continue;
            };

            rows.entry(sum.orbital.number)
                .or_insert_with(|| PivotRow {
                    orbital: sum.orbital,
                    values: vec![0.; columns.len()],
                })
                .values[i] += sum.contribution;
        }

        Self {
            columns,
            rows: rows.into_values().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
