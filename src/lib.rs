//! Analysis of Loewdin reduced orbital populations per MO, from ORCA output files.
//!
//! The main entry point is [`analyze`]. The individual steps (parsing, caching, selection,
//! aggregation, and rendering) are available from the [`orca`] module for use on their own.

pub mod orca;

pub use orca::{
    Analysis, AnalysisParams, analyze,
    plots::{BitmapPlotter, PlotSink},
    population::{AoFamily, ContributionRecord, Spin},
    table::PopulationTable,
};
