use std::{env, error::Error, ffi::OsString, path::PathBuf};

use clap::Parser;
use log::LevelFilter;
use orca_orb::{AnalysisParams, BitmapPlotter, analyze};

/// Analyze the Loewdin reduced orbital populations per MO of an ORCA output file. Writes
/// `o-analysis.txt` and plots into the current directory.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The ORCA output file
    filename: PathBuf,
    /// Orbitals to analyze: `all`, `homo`, `h<k>` (HOMO-k...HOMO+k), `<n>`, or `<a>-<b>`
    #[arg(long, short, default_value = "all")]
    orbitals: String,
    /// Contributions (%) below this are left out of the atom and AO summaries
    #[arg(long, short, default_value_t = 0., value_parser = parse_threshold)]
    threshold: f64,
    /// Restrict the atom and AO summaries to elements (e.g. `C N`) or atom numbers (e.g. `0 3`)
    #[arg(long, short, default_value = "none")]
    constraints: String,
    /// Atom numbers to make AO heat maps for, e.g. `0 3`
    #[arg(long, short, default_value = "none")]
    aorbitals: String,
    /// Build a new CSV cache even if one exists. `-ncsv` also works.
    #[arg(long)]
    newcsv: bool,
}

fn parse_threshold(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("`{s}` isn't a number"))?;

    if !(0. ..=100.).contains(&v) {
        return Err(format!("{v} is outside 0 to 100"));
    }
    Ok(v)
}

/// Clap's short options are single characters, so `-ncsv` becomes `--newcsv`.
fn normalize_args(args: impl Iterator<Item = OsString>) -> Vec<OsString> {
    args.map(|a| if a == "-ncsv" { OsString::from("--newcsv") } else { a })
        .collect()
}

fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::formatted_builder()
        .filter_level(LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();

    let args = Args::parse_from(normalize_args(env::args_os()));

    let params = AnalysisParams {
        filename: args.filename,
        orbitals: args.orbitals,
        threshold: args.threshold,
        constraints: args.constraints,
        aorbitals: args.aorbitals,
        new_csv: args.newcsv,
    };

    let out_dir = env::current_dir()?;
    let mut plotter = BitmapPlotter::new(&out_dir);

    analyze(&params, &out_dir, &mut plotter)?;

    Ok(())
}
