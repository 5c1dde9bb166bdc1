//! Plots of the aggregated views: a stacked bar chart of element contributions, a heat map of
//! atom contributions, and optional per-atom heat maps of AO contributions. One of each per
//! spin channel.
//!
//! Plot contents and layout are prepared here as plain data; a [`PlotSink`] does the drawing.
//! [`BitmapPlotter`] writes PNGs with `plotters`.

use std::{
    fmt::Display,
    fs,
    io,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use plotters::{
    prelude::*,
    style::text_anchor::{HPos, Pos, VPos},
};

use crate::orca::{
    aggregate::{Pivot, SpinViews},
    population::Spin,
};

/// File name prefixes of every image we generate. Used to clear stale plots.
pub const ARTIFACT_PREFIXES: [&str; 3] = ["el-cntrb-", "a-cntrb-", "ao-cntrb-"];
const ARTIFACT_EXT: &str = ".png";

/// Heat map values aren't printed in the cells above this many orbitals.
const MAX_ANNOTATED_ROWS: usize = 50;
/// Figures grow with the row count above this.
const LARGE_PLOT_ROWS: usize = 100;

const DEFAULT_SIZE: (u32, u32) = (1_920, 1_440);
const MAX_WIDTH: u32 = 4_000;
/// Bounds the RGB buffer of the largest plots to about 100 MB.
const MAX_HEIGHT: u32 = 8_000;
const FONT: &str = "sans-serif";

/// Sizing and labelling decisions, made once per plot from its row count.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Layout {
    /// Print values in heat map cells.
    pub annotate: bool,
    /// Show every n-th row label.
    pub label_stride: usize,
    /// Pixels.
    pub size: (u32, u32),
    pub font_scale: f64,
}

impl Layout {
    pub fn new(num_rows: usize, annotate: bool) -> Self {
        let label_stride = if num_rows > MAX_ANNOTATED_ROWS {
            4
        } else if num_rows > 30 {
            2
        } else {
            1
        };

        let (size, font_scale) = if num_rows > LARGE_PLOT_ROWS {
            let wanted = (num_rows / 10 + 1) as u32 * 150;
            let height = wanted.min(MAX_HEIGHT);
            if height < wanted {
                warn!(
                    "{num_rows} rows are too many to label legibly. Plot height capped at \
                     {height} px."
                );
            }
            ((MAX_WIDTH.min(height * 3 / 2), height), 2.)
        } else {
            (DEFAULT_SIZE, 1.)
        };

        Self {
            annotate,
            label_stride,
            size,
            font_scale,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlotRow {
    pub label: String,
    pub values: Vec<f64>,
}

/// Horizontal bars, one per row, stacked over the series.
#[derive(Clone, Debug, PartialEq)]
pub struct BarChart {
    pub file_name: String,
    pub title: String,
    pub x_desc: String,
    pub y_desc: String,
    pub series: Vec<String>,
    pub rows: Vec<PlotRow>,
    pub layout: Layout,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HeatMap {
    pub file_name: String,
    pub title: String,
    pub x_desc: String,
    pub y_desc: String,
    pub columns: Vec<String>,
    pub rows: Vec<PlotRow>,
    pub layout: Layout,
}

/// Something that can draw our plots.
pub trait PlotSink {
    fn bar_chart(&mut self, chart: &BarChart) -> io::Result<()>;
    fn heat_map(&mut self, map: &HeatMap) -> io::Result<()>;
}

fn spin_suffix(spin: Spin, open_shell: bool) -> String {
    if open_shell {
        format!(" ({spin})")
    } else {
        String::new()
    }
}

fn homo_note(spin: Spin, homo: Option<usize>) -> String {
    let Some(homo) = homo else {
        return String::new();
    };

    if spin == Spin::Beta {
        format!(" The orbital number of the HOMO (alpha) is {homo}.")
    } else {
        format!(" The orbital number of the HOMO is {homo}.")
    }
}

/// E.g. `07 C`. Padded so columns sort in atom order.
pub fn atom_label(atom: usize, element: &str, width: usize) -> String {
    format!("{atom:0width$} {element}")
}

fn pivot_rows<C>(pivot: &Pivot<C>, label: impl Fn(usize, f64) -> String) -> Vec<PlotRow> {
    pivot
        .rows
        .iter()
        .map(|r| PlotRow {
            label: label(r.orbital.number, r.orbital.occupation),
            values: r.values.clone(),
        })
        .collect()
}

/// Whether heat maps get cell annotations. Decided from the alpha element table, so all plots
/// of a run agree.
pub fn annotate_heat_maps(views: &[SpinViews]) -> bool {
    let num_rows = views
        .first()
        .map(|v| Pivot::new(&v.by_element, |el| el.clone()).rows.len())
        .unwrap_or_default();

    if num_rows > MAX_ANNOTATED_ROWS {
        warn!(
            "A large number of orbitals may reduce the readability of the diagrams. \
             Heat map annotations are turned off."
        );
        return false;
    }
    true
}

/// Element contributions per orbital. Not thresholded.
pub fn element_chart(views: &SpinViews, homo: Option<usize>, open_shell: bool) -> BarChart {
    let pivot = Pivot::new(&views.by_element, |el| el.clone());
    let rows = pivot_rows(&pivot, |n, occ| format!("({n}, {occ:.1})"));

    BarChart {
        file_name: format!("el-cntrb-{}{ARTIFACT_EXT}", views.spin.file_suffix()),
        title: format!(
            "Element contributions (>= 0%) to orbitals{}.{}",
            spin_suffix(views.spin, open_shell),
            homo_note(views.spin, homo)
        ),
        x_desc: "Element contribution (%)".to_owned(),
        y_desc: "(Orbital No., Occupation)".to_owned(),
        layout: Layout::new(rows.len(), false),
        series: pivot.columns,
        rows,
    }
}

/// Atom contributions at or above the threshold. Cells below it are 0.
pub fn atom_heat_map(
    views: &SpinViews,
    homo: Option<usize>,
    threshold: f64,
    open_shell: bool,
    annotate: bool,
) -> HeatMap {
    let max_atom = views.by_atom.iter().map(|r| r.key.atom).max().unwrap_or_default();
    let width = max_atom.to_string().len().max(2);

    let pivot = Pivot::new(&views.by_atom, |k| atom_label(k.atom, &k.element, width));
    let rows = pivot_rows(&pivot, |n, occ| format!("{n}-{occ:.1}"));

    HeatMap {
        file_name: format!("a-cntrb-{}{ARTIFACT_EXT}", views.spin.file_suffix()),
        title: format!(
            "Atom contributions (>= {threshold}%) to orbitals{}.{}\n\
             Contributions < {threshold}% are \"0\" or \"black\" in the heat map.",
            spin_suffix(views.spin, open_shell),
            homo_note(views.spin, homo)
        ),
        x_desc: "Atom No.".to_owned(),
        y_desc: "Orbital No.-Occupation".to_owned(),
        layout: Layout::new(rows.len(), annotate),
        columns: pivot.columns,
        rows,
    }
}

/// Specific-AO contributions of one atom. `None` if nothing of this atom reaches the
/// threshold.
pub fn ao_heat_map(
    views: &SpinViews,
    atom: usize,
    homo: Option<usize>,
    threshold: f64,
    open_shell: bool,
    annotate: bool,
) -> Option<HeatMap> {
    let sums: Vec<_> = views.aos_of_atom(atom).cloned().collect();
    let element = sums.first()?.key.element.clone();

    // s, p, d, f, then by label.
    let pivot = Pivot::new(&sums, |k| (k.family, k.label.clone()));
    let rows = pivot_rows(&pivot, |n, occ| format!("{n}-{occ:.1}"));
    let width = atom.to_string().len().max(2);

    Some(HeatMap {
        file_name: format!(
            "ao-cntrb-{}-{element}-{}{ARTIFACT_EXT}",
            atom_label(atom, "", width).trim_end(),
            views.spin.file_suffix()
        ),
        title: format!(
            "AO contributions (>= {threshold}%) of atom {atom} {element} to orbitals{}.{}",
            spin_suffix(views.spin, open_shell),
            homo_note(views.spin, homo)
        ),
        x_desc: "AO".to_owned(),
        y_desc: "Orbital No.-Occupation".to_owned(),
        layout: Layout::new(rows.len(), annotate),
        columns: pivot.columns.into_iter().map(|(_, label)| label).collect(),
        rows,
    })
}

/// Draw every plot for the run.
pub fn render_plots(
    sink: &mut dyn PlotSink,
    views: &[SpinViews],
    focus_atoms: &[usize],
    homo: Option<usize>,
    threshold: f64,
) -> io::Result<()> {
    let open_shell = views.iter().any(|v| v.spin == Spin::Beta);
    let annotate = annotate_heat_maps(views);

    for v in views {
        sink.bar_chart(&element_chart(v, homo, open_shell))?;
        sink.heat_map(&atom_heat_map(v, homo, threshold, open_shell, annotate))?;

        for &atom in focus_atoms {
            match ao_heat_map(v, atom, homo, threshold, open_shell, annotate) {
                Some(map) => sink.heat_map(&map)?,
                None => info!("No AO contributions of atom {atom} above threshold ({} orbitals).", v.spin),
            }
        }
    }

    Ok(())
}

/// Delete images left by earlier runs, so they're never mixed with new ones. Returns the
/// number of files removed.
pub fn clear_artifacts(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };

        if name.ends_with(ARTIFACT_EXT) && ARTIFACT_PREFIXES.iter().any(|p| name.starts_with(p))
        {
            fs::remove_file(entry.path())?;
            debug!("Removed {name}");
            removed += 1;
        }
    }

    Ok(removed)
}

fn plot_err(e: impl Display) -> io::Error {
    io::Error::other(e.to_string())
}

/// Black -> red -> yellow -> white, as `t` goes from 0 to 1.
fn hot(t: f64) -> RGBColor {
    let t = t.clamp(0., 1.);
    let c = |v: f64| (v.clamp(0., 1.) * 255.).round() as u8;
    RGBColor(c(3. * t), c(3. * t - 1.), c(3. * t - 2.))
}

/// The label for the row or column at `pos`, if `pos` is on a shown tick.
fn tick_label(labels: &[String], pos: f64, stride: usize) -> String {
    let i = pos.round();
    if (pos - i).abs() > 1e-6 || i < 0. {
        return String::new();
    }

    let i = i as usize;
    if i % stride != 0 {
        return String::new();
    }
    labels.get(i).cloned().unwrap_or_default()
}

/// Writes PNG files into a directory.
#[derive(Clone, Debug)]
pub struct BitmapPlotter {
    pub dir: PathBuf,
}

impl BitmapPlotter {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_owned(),
        }
    }
}

impl PlotSink for BitmapPlotter {
    fn bar_chart(&mut self, chart: &BarChart) -> io::Result<()> {
        let path = self.dir.join(&chart.file_name);
        let scale = chart.layout.font_scale;
        let n = chart.rows.len();

        let labels: Vec<String> = chart.rows.iter().map(|r| r.label.clone()).collect();

        let root = BitMapBackend::new(&path, chart.layout.size).into_drawing_area();
        root.fill(&WHITE).map_err(plot_err)?;

        let mut ctx = ChartBuilder::on(&root)
            .caption(&chart.title, (FONT, 24. * scale))
            .margin(20)
            .x_label_area_size((60. * scale) as i32)
            .y_label_area_size((160. * scale) as i32)
            .build_cartesian_2d(0f64..100f64, -0.5f64..(n as f64 - 0.5))
            .map_err(plot_err)?;

        ctx.configure_mesh()
            .disable_mesh()
            .x_desc(chart.x_desc.as_str())
            .y_desc(chart.y_desc.as_str())
            .y_labels(n)
            .y_label_formatter(&|y: &f64| tick_label(&labels, *y, chart.layout.label_stride))
            .label_style((FONT, 16. * scale))
            .draw()
            .map_err(plot_err)?;

        for (j, series) in chart.series.iter().enumerate() {
            let color = Palette99::pick(j).to_rgba();

            let bars = chart.rows.iter().enumerate().map(|(i, row)| {
                let left: f64 = row.values[..j].iter().sum();
                let y = i as f64;
                Rectangle::new(
                    [(left, y - 0.4), (left + row.values[j], y + 0.4)],
                    color.filled(),
                )
            });

            ctx.draw_series(bars)
                .map_err(plot_err)?
                .label(series.as_str())
                .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
        }

        ctx.configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .label_font((FONT, 16. * scale))
            .draw()
            .map_err(plot_err)?;

        root.present().map_err(plot_err)?;
        info!("Saved {}", path.display());

        Ok(())
    }

    fn heat_map(&mut self, map: &HeatMap) -> io::Result<()> {
        let path = self.dir.join(&map.file_name);
        let scale = map.layout.font_scale;
        let (n_cols, n_rows) = (map.columns.len(), map.rows.len());

        let row_labels: Vec<String> = map.rows.iter().map(|r| r.label.clone()).collect();
        let max = map
            .rows
            .iter()
            .flat_map(|r| r.values.iter().copied())
            .fold(0., f64::max);

        let root = BitMapBackend::new(&path, map.layout.size).into_drawing_area();
        root.fill(&WHITE).map_err(plot_err)?;

        let mut ctx = ChartBuilder::on(&root)
            .caption(&map.title, (FONT, 20. * scale))
            .margin(20)
            .x_label_area_size((80. * scale) as i32)
            .y_label_area_size((120. * scale) as i32)
            .build_cartesian_2d(
                -0.5f64..(n_cols as f64 - 0.5),
                -0.5f64..(n_rows as f64 - 0.5),
            )
            .map_err(plot_err)?;

        ctx.configure_mesh()
            .disable_mesh()
            .x_desc(map.x_desc.as_str())
            .y_desc(map.y_desc.as_str())
            .x_labels(n_cols)
            .y_labels(n_rows)
            .x_label_formatter(&|x: &f64| tick_label(&map.columns, *x, 1))
            .y_label_formatter(&|y: &f64| tick_label(&row_labels, *y, map.layout.label_stride))
            .label_style((FONT, 14. * scale))
            .draw()
            .map_err(plot_err)?;

        let cells = map.rows.iter().enumerate().flat_map(|(i, row)| {
            row.values.iter().enumerate().map(move |(j, v)| {
                let (x, y) = (j as f64, i as f64);
                let t = if max > 0. { v / max } else { 0. };
                Rectangle::new([(x - 0.5, y - 0.5), (x + 0.5, y + 0.5)], hot(t).filled())
            })
        });
        ctx.draw_series(cells).map_err(plot_err)?;

        if map.layout.annotate {
            let style = (FONT, 10. * scale)
                .into_font()
                .color(&BLUE)
                .pos(Pos::new(HPos::Center, VPos::Center));

            let texts = map.rows.iter().enumerate().flat_map(|(i, row)| {
                let style = style.clone();
                row.values.iter().enumerate().map(move |(j, v)| {
                    Text::new(format!("{v:.1}"), (j as f64, i as f64), style.clone())
                })
            });
            ctx.draw_series(texts).map_err(plot_err)?;
        }

        root.present().map_err(plot_err)?;
        info!("Saved {}", path.display());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use super::*;
    use crate::orca::{
        aggregate::aggregate,
        selection::{Constraint, OrbitalRange},
        table::PopulationTable,
    };

    const CLOSED_SHELL: &str = include_str!("../../tests/data/closed_shell.out");
    const OPEN_SHELL: &str = include_str!("../../tests/data/open_shell.out");

    /// Keeps what it's asked to draw.
    #[derive(Default)]
    struct Recorder {
        bar_charts: Vec<BarChart>,
        heat_maps: Vec<HeatMap>,
    }

    impl PlotSink for Recorder {
        fn bar_chart(&mut self, chart: &BarChart) -> io::Result<()> {
            self.bar_charts.push(chart.clone());
            Ok(())
        }

        fn heat_map(&mut self, map: &HeatMap) -> io::Result<()> {
            self.heat_maps.push(map.clone());
            Ok(())
        }
    }

    #[test]
    fn layout_rules() {
        let small = Layout::new(10, true);
        assert_eq!(small.label_stride, 1);
        assert_eq!(small.size, DEFAULT_SIZE);
        assert!(small.annotate);

        assert_eq!(Layout::new(31, true).label_stride, 2);
        assert_eq!(Layout::new(51, false).label_stride, 4);

        let large = Layout::new(200, false);
        assert_eq!(large.size, (MAX_WIDTH, 21 * 150));
        assert_eq!(large.font_scale, 2.);

        let huge = Layout::new(2_000, false);
        assert_eq!(huge.size, (MAX_WIDTH, MAX_HEIGHT));
    }

    #[test]
    fn tick_labels() {
        let labels: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();

        assert_eq!(tick_label(&labels, 1., 1), "b");
        assert_eq!(tick_label(&labels, 1.5, 1), "");
        assert_eq!(tick_label(&labels, 1., 2), "");
        assert_eq!(tick_label(&labels, 2., 2), "c");
        assert_eq!(tick_label(&labels, -1., 1), "");
        assert_eq!(tick_label(&labels, 3., 1), "");
    }

    #[test]
    fn hot_colormap() {
        assert_eq!(hot(0.), RGBColor(0, 0, 0));
        assert_eq!(hot(1.), RGBColor(255, 255, 255));
        assert_eq!(hot(1. / 3.), RGBColor(255, 0, 0));
    }

    #[test]
    fn closed_shell_plots() {
        let table = PopulationTable::new(CLOSED_SHELL).unwrap();
        let views = aggregate(&table, OrbitalRange { start: 0, end: 6 }, &Constraint::None, 10.);

        let mut sink = Recorder::default();
        render_plots(&mut sink, &views, &[0], table.homo(), 10.).unwrap();

        assert_eq!(sink.bar_charts.len(), 1);
        let bars = &sink.bar_charts[0];
        assert_eq!(bars.file_name, "el-cntrb-a.png");
        assert_eq!(bars.series, vec!["H".to_owned(), "O".to_owned()]);
        assert_eq!(bars.rows.len(), 7);
        assert_eq!(bars.rows[0].label, "(0, 2.0)");
        assert!(bars.title.contains("The orbital number of the HOMO is 4."));
        assert!(!bars.title.contains("(alpha)"));

        assert_eq!(sink.heat_maps.len(), 2);
        let atoms = &sink.heat_maps[0];
        assert_eq!(atoms.file_name, "a-cntrb-a.png");
        assert_eq!(atoms.columns, vec!["00 O", "01 H", "02 H"]);
        assert_eq!(atoms.rows[4].label, "4-2.0");
        assert!(atoms.layout.annotate);

        let aos = &sink.heat_maps[1];
        assert_eq!(aos.file_name, "ao-cntrb-00-O-a.png");
        assert_eq!(aos.columns, vec!["s", "px", "py", "pz"]);
    }

    #[test]
    fn open_shell_plots() {
        let table = PopulationTable::new(OPEN_SHELL).unwrap();
        let views = aggregate(&table, OrbitalRange { start: 0, end: 5 }, &Constraint::None, 0.);

        let mut sink = Recorder::default();
        render_plots(&mut sink, &views, &[], table.homo(), 0.).unwrap();

        let names: Vec<&str> = sink
            .bar_charts
            .iter()
            .map(|c| c.file_name.as_str())
            .chain(sink.heat_maps.iter().map(|m| m.file_name.as_str()))
            .collect();
        assert_eq!(
            names,
            vec!["el-cntrb-a.png", "el-cntrb-b.png", "a-cntrb-a.png", "a-cntrb-b.png"]
        );
        assert!(sink.bar_charts[1].title.contains("(beta)"));
        assert!(sink.bar_charts[1].title.contains("HOMO (alpha) is 4"));
    }

    #[test]
    fn clears_only_artifacts() {
        let dir = env::temp_dir().join(format!("orca_orb_artifacts_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        for name in ["el-cntrb-a.png", "a-cntrb-b.png", "ao-cntrb-01-H-a.png", "keep.png", "el-cntrb-a.txt"] {
            fs::write(dir.join(name), b"").unwrap();
        }

        assert_eq!(clear_artifacts(&dir).unwrap(), 3);
        assert!(dir.join("keep.png").exists());
        assert!(dir.join("el-cntrb-a.txt").exists());
        assert!(!dir.join("el-cntrb-a.png").exists());

        fs::remove_dir_all(&dir).unwrap();
    }
}
