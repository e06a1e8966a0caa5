//! Market data sources.

pub mod market_data;
pub mod yahoo;

pub use market_data::{BarSource, FetchError, StaticBarSource};
pub use yahoo::YahooBarSource;
