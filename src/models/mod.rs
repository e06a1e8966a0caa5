//! Shared data models spanning the pipeline layers.

pub mod bar;
pub mod indicators;
pub mod run;

pub use bar::Bar;
pub use indicators::{BollingerBands, IndicatorRow, IndicatorValues, MacdPoint};
pub use run::{
    DateSpan, FailureKind, InstrumentFailure, InstrumentReport, RunMode, RunSummary, Stage,
};
