//! Numeric helpers shared by the indicator state machines.

pub mod math;
