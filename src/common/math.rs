//! Full-precision arithmetic for rolling windows.

/// Running sum with Neumaier compensation.
///
/// Rolling windows add and remove thousands of values over an instrument's
/// history; the compensation term keeps the sum from drifting away from the
/// exact window total.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompensatedSum {
    sum: f64,
    compensation: f64,
}

impl CompensatedSum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        let t = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - t) + value;
        } else {
            self.compensation += (value - t) + self.sum;
        }
        self.sum = t;
    }

    pub fn subtract(&mut self, value: f64) {
        self.add(-value);
    }

    pub fn value(&self) -> f64 {
        self.sum + self.compensation
    }
}

/// Standard deviation around a known mean.
///
/// Population divides by `n`, sample by `n - 1`. Two-pass over the window, so
/// it never suffers the cancellation of the sum-of-squares shortcut.
pub fn standard_deviation<'a, I>(values: I, mean: f64, sample: bool) -> Option<f64>
where
    I: IntoIterator<Item = &'a f64>,
{
    let mut squares = CompensatedSum::new();
    let mut n = 0usize;
    for &v in values {
        let d = v - mean;
        squares.add(d * d);
        n += 1;
    }
    let divisor = if sample { n.checked_sub(1)? } else { n };
    if divisor == 0 {
        return None;
    }
    Some((squares.value() / divisor as f64).max(0.0).sqrt())
}

/// EMA smoothing factor `2 / (period + 1)`.
pub fn ema_multiplier(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

/// One EMA recurrence step.
pub fn ema_from_previous(value: f64, previous: f64, period: usize) -> f64 {
    let k = ema_multiplier(period);
    value * k + previous * (1.0 - k)
}

/// Wilder's running average: `(previous * (period - 1) + value) / period`.
pub fn wilder_from_previous(value: f64, previous: f64, period: usize) -> f64 {
    let p = period as f64;
    (previous * (p - 1.0) + value) / p
}
