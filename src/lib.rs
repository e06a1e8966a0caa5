//! TickerLens: daily technical-indicator pipeline.
//!
//! Fetches daily bars per instrument, computes rolling indicators and buy/sell
//! signals, and upserts one row per (instrument, trading date) into a keyed
//! time-series store that dashboards read from.

pub mod calendar;
pub mod common;
pub mod config;
pub mod core;
pub mod db;
pub mod export;
pub mod indicators;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod signals;
