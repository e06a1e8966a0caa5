//! Buy/sell signal rules over computed indicator rows.

pub mod classifier;

pub use classifier::*;
