//! Technical indicators
//!
//! Plain `f64` math over price and volume slices ordered oldest-first.
//! Every function returns `None` (or an empty series) when the input is too
//! short, so callers can report insufficient data instead of panicking.

/// How an exponential moving average picks its first value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmaSeed {
    /// Start from the first observation
    First,
    /// Start from the simple average of the first `period` observations
    Sma,
}

/// Smoothing factor for a `period`-bar EMA
fn alpha(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Simple moving average of the last `period` values
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    Some(mean(&values[values.len() - period..]))
}

/// EMA over the last `period` values, seeded with the first of them
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    let k = alpha(period);
    let seed = window[0];
    Some(window[1..].iter().fold(seed, |acc, v| k * v + (1.0 - k) * acc))
}

/// EMA over the whole series
///
/// With [`EmaSeed::First`] the output has one value per input. With
/// [`EmaSeed::Sma`] the output starts at index `period - 1` of the input.
pub fn ema_series(values: &[f64], period: usize, seed: EmaSeed) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let k = alpha(period);
    let (start, rest) = match seed {
        EmaSeed::First => (values[0], &values[1..]),
        EmaSeed::Sma => (mean(&values[..period]), &values[period..]),
    };

    let mut out = Vec::with_capacity(rest.len() + 1);
    out.push(start);
    let mut current = start;
    for v in rest {
        current = k * v + (1.0 - k) * current;
        out.push(current);
    }
    out
}

/// Weighted moving average of the last `period` values, weights 1..=period
pub fn wma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    let weighted: f64 = window
        .iter()
        .enumerate()
        .map(|(i, v)| v * (i + 1) as f64)
        .sum();
    let total = (period * (period + 1)) as f64 / 2.0;
    Some(weighted / total)
}

/// RSI from the simple average of the last `period` price changes
///
/// Returns 100 when there were no losing bars in the window.
pub fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period + 1 {
        return None;
    }
    let window = &values[values.len() - period - 1..];
    let (gains, losses) = window
        .windows(2)
        .map(|w| w[1] - w[0])
        .fold((0.0, 0.0), |(g, l), change| {
            if change > 0.0 {
                (g + change, l)
            } else {
                (g, l - change)
            }
        });

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// MACD line, signal and histogram series, aligned at the end
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacdSeries {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

impl MacdSeries {
    pub fn last(&self) -> Option<(f64, f64, f64)> {
        Some((
            *self.line.last()?,
            *self.signal.last()?,
            *self.histogram.last()?,
        ))
    }

    /// Values one bar back
    pub fn previous(&self) -> Option<(f64, f64, f64)> {
        let back = |s: &[f64]| s.len().checked_sub(2).map(|i| s[i]);
        Some((
            back(&self.line)?,
            back(&self.signal)?,
            back(&self.histogram)?,
        ))
    }
}

/// MACD over the whole series
///
/// The line starts once the slow EMA is defined. The signal line is an EMA
/// of the line with the same seeding.
pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize, seed: EmaSeed) -> Option<MacdSeries> {
    if fast == 0 || fast >= slow || values.len() < slow {
        return None;
    }
    let fast_ema = ema_series(values, fast, seed);
    let slow_ema = ema_series(values, slow, seed);

    let points = values.len() - slow + 1;
    let fast_tail = &fast_ema[fast_ema.len() - points..];
    let slow_tail = &slow_ema[slow_ema.len() - points..];
    let line: Vec<f64> = fast_tail.iter().zip(slow_tail).map(|(f, s)| f - s).collect();

    let signal_series = ema_series(&line, signal, seed);
    if signal_series.is_empty() {
        return None;
    }
    let line_tail = &line[line.len() - signal_series.len()..];
    let histogram = line_tail
        .iter()
        .zip(&signal_series)
        .map(|(m, s)| m - s)
        .collect();

    Some(MacdSeries {
        line,
        signal: signal_series,
        histogram,
    })
}

/// Bollinger band values for the latest bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    pub std_dev: f64,
    /// (upper - lower) / middle, in percent
    pub bandwidth: f64,
    /// Position of the last value between the bands, in percent
    pub percent_b: f64,
}

/// Bollinger bands over the last `period` values (population deviation)
pub fn bollinger(values: &[f64], period: usize, width: f64) -> Option<Bands> {
    let middle = sma(values, period)?;
    let window = &values[values.len() - period..];
    let variance = window.iter().map(|v| (v - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    let upper = middle + width * std_dev;
    let lower = middle - width * std_dev;
    let last = *values.last()?;
    let bandwidth = if middle != 0.0 {
        (upper - lower) / middle * 100.0
    } else {
        0.0
    };
    let percent_b = if upper > lower {
        (last - lower) / (upper - lower) * 100.0
    } else {
        50.0
    };

    Some(Bands {
        upper,
        middle,
        lower,
        std_dev,
        bandwidth,
        percent_b,
    })
}

/// Sample standard deviation
pub fn stdev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Least-squares slope against the index 0..n
pub fn linear_slope(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values);
    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - x_mean;
            (num + dx * (y - y_mean), den + dx * dx)
        });
    Some(num / den)
}

/// Last volume divided by the mean of the last `period` volumes
pub fn volume_ratio(volumes: &[f64], period: usize) -> Option<f64> {
    let avg = sma(volumes, period)?;
    let last = *volumes.last()?;
    Some(if avg > 0.0 { last / avg } else { 1.0 })
}

/// Percent change between consecutive values
pub fn pct_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0] * 100.0)
        .collect()
}

/// Largest peak-to-trough decline, as a fraction of the peak
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0_f64;
    for &v in values {
        peak = peak.max(v);
        if peak > 0.0 {
            worst = worst.max((peak - v) / peak);
        }
    }
    worst
}
