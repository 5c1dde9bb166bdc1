//! For analyzing the `LOEWDIN REDUCED ORBITAL POPULATIONS PER MO` section of ORCA `out` files.
//! Parses the section into a table of per-AO contributions to each orbital, sums these by
//! element, atom, AO family and specific AO, and writes a text report and plots.
//!
//! To get this section from ORCA, add `! LargePrint` or `%output print[P_OrbPopMO_L] 1 end`
//! to the input.

pub mod aggregate;
pub mod blocks;
pub mod plots;
pub mod population;
pub mod report;
pub mod selection;
pub mod table;

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use log::info;

use crate::orca::{
    aggregate::{SpinViews, aggregate},
    plots::{PlotSink, clear_artifacts, render_plots},
    population::Spin,
    report::{REPORT_FILE, ReportHeader, make_report, save_report},
    selection::{ALL, NONE, Selection},
    table::PopulationTable,
};

/// Settings for one analysis run. Expressions are as accepted by
/// [`selection::OrbitalSelection`], [`selection::Constraint`] and
/// [`selection::resolve_focus_atoms`].
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisParams {
    pub filename: PathBuf,
    pub orbitals: String,
    /// Percent. Rows of the atom and AO views below this are dropped.
    pub threshold: f64,
    pub constraints: String,
    /// Atoms to make AO heat maps for.
    pub aorbitals: String,
    /// Ignore an existing CSV cache.
    pub new_csv: bool,
}

impl AnalysisParams {
    pub fn new(filename: &Path) -> Self {
        Self {
            filename: filename.to_owned(),
            orbitals: ALL.to_owned(),
            threshold: 0.,
            constraints: NONE.to_owned(),
            aorbitals: NONE.to_owned(),
            new_csv: false,
        }
    }
}

/// What a successful run computed. The report and plots are already written.
#[derive(Clone, Debug)]
pub struct Analysis {
    pub table: PopulationTable,
    pub selection: Selection,
    pub homo: Option<usize>,
    /// Alpha first.
    pub views: Vec<SpinViews>,
}

/// Run the full analysis: parse (or restore from cache), resolve the selection, aggregate,
/// then write the report into `out_dir` and draw the plots with `sink`. Plots from earlier
/// runs in `out_dir` are removed first.
///
/// If the selection is invalid, or no atom contribution reaches the threshold, the report and
/// plots aren't written. The CSV cache may be.
pub fn analyze(
    params: &AnalysisParams,
    out_dir: &Path,
    sink: &mut dyn PlotSink,
) -> io::Result<Analysis> {
    if !(0. ..=100.).contains(&params.threshold) {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("Threshold must be between 0 and 100; got {}", params.threshold),
        ));
    }

    let removed = clear_artifacts(out_dir)?;
    if removed > 0 {
        info!("Removed {removed} plots from a previous run.");
    }

    let table = PopulationTable::load_or_build(&params.filename, params.new_csv)?;
    if table.is_empty() {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            "No orbital populations found in the file",
        ));
    }

    let selection = Selection::resolve(
        &table,
        &params.orbitals,
        &params.constraints,
        &params.aorbitals,
    )?;
    info!(
        "Analyzing orbitals {} with constraints: {}",
        selection.orbitals, selection.constraint
    );

    let homo = table.homo();
    let views = aggregate(
        &table,
        selection.orbitals,
        &selection.constraint,
        params.threshold,
    );

    for v in &views {
        if v.by_atom.is_empty() {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "No atom contributes >= {}% to the selected {} orbitals. Try a lower \
                     threshold.",
                    params.threshold, v.spin
                ),
            ));
        }
    }

    let file_name = params.filename.display().to_string();
    let header = ReportHeader {
        file_name: &file_name,
        orbitals: selection.orbitals,
        max_alpha: table.max_orbital(Spin::Alpha).unwrap_or_default(),
        max_beta: table.max_orbital(Spin::Beta),
        homo,
        threshold: params.threshold,
        constraint: &selection.constraint,
    };

    let report_path = out_dir.join(REPORT_FILE);
    save_report(&report_path, &make_report(&header, &views))?;
    info!("Report saved to {}", report_path.display());

    render_plots(
        sink,
        &views,
        &selection.focus_atoms,
        homo,
        params.threshold,
    )?;

    Ok(Analysis {
        table,
        selection,
        homo,
        views,
    })
}
