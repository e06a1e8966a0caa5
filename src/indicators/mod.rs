//! Rolling-window indicators and the per-instrument engine.

pub mod engine;
pub mod momentum;
pub mod trend;
pub mod volatility;

pub use engine::{EngineState, IndicatorEngine};
