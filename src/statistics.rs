/*!
 * Trend and correlation statistics over KPI series
 *
 * Series are ordered by period with gaps represented as `None`. Trends are
 * fitted over each observation's position in the series, so a missing month
 * keeps its slot on the x axis; correlations drop incomplete pairs.
 */

use serde::{Deserialize, Serialize};

/// Default relative slope below which a series counts as flat
pub const DEFAULT_TREND_THRESHOLD: f64 = 0.01;

/// Direction of a fitted trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

/// Least-squares line through `(index, value)` points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub n: usize,
    pub mean: f64,
    /// Position of the last observation
    pub last_x: f64,
    pub direction: TrendDirection,
}

impl TrendLine {
    /// Projected value `steps_ahead` periods after the last observation
    pub fn forecast(&self, steps_ahead: usize) -> f64 {
        self.intercept + self.slope * (self.last_x + steps_ahead as f64)
    }
}

/// Fit a linear trend with the default stability threshold
pub fn linear_trend(values: &[f64]) -> Option<TrendLine> {
    linear_trend_with_threshold(values, DEFAULT_TREND_THRESHOLD)
}

/// Fit a linear trend over consecutive values; `None` with fewer than two points
///
/// The direction is `Stable` when `|slope| <= threshold * |mean|`.
pub fn linear_trend_with_threshold(values: &[f64], threshold: f64) -> Option<TrendLine> {
    let points: Vec<(f64, f64)> = values.iter()
        .enumerate()
        .map(|(i, y)| (i as f64, *y))
        .collect();
    linear_trend_points(&points, threshold)
}

/// Fit a linear trend over a gap-filled series
///
/// Each present value keeps its index as x, so `[Some(a), None, Some(b)]`
/// spans two periods.
pub fn linear_trend_series(values: &[Option<f64>], threshold: f64) -> Option<TrendLine> {
    let points: Vec<(f64, f64)> = values.iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|y| (i as f64, y)))
        .collect();
    linear_trend_points(&points, threshold)
}

/// Ordinary least squares over `(x, y)` points ordered by x
pub fn linear_trend_points(points: &[(f64, f64)], threshold: f64) -> Option<TrendLine> {
    let n = points.len();
    if n < 2 {
        return None;
    }

    let nf = n as f64;
    let sum_x: f64 = points.iter().map(|(x, _)| x).sum();
    let sum_y: f64 = points.iter().map(|(_, y)| y).sum();
    let sum_xy: f64 = points.iter().map(|(x, y)| x * y).sum();
    let sum_xx: f64 = points.iter().map(|(x, _)| x * x).sum();

    let denominator = nf * sum_xx - sum_x * sum_x;
    if denominator == 0.0 {
        return None;
    }
    let slope = (nf * sum_xy - sum_x * sum_y) / denominator;
    let mean = sum_y / nf;
    let intercept = (sum_y - slope * sum_x) / nf;

    let ss_tot: f64 = points.iter().map(|(_, y)| (y - mean).powi(2)).sum();
    let ss_res: f64 = points.iter()
        .map(|(x, y)| (y - (intercept + slope * x)).powi(2))
        .sum();
    let r_squared = if ss_tot == 0.0 { 1.0 } else { 1.0 - ss_res / ss_tot };

    let direction = if slope.abs() <= threshold * mean.abs() {
        TrendDirection::Stable
    } else if slope > 0.0 {
        TrendDirection::Up
    } else {
        TrendDirection::Down
    };

    let last_x = points[n - 1].0;
    Some(TrendLine { slope, intercept, r_squared, n, mean, last_x, direction })
}

/// Qualitative strength band of a correlation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStrength {
    Strong,
    Moderate,
    Weak,
    Negligible,
}

impl CorrelationStrength {
    pub fn from_r(r: f64) -> Option<Self> {
        if r.is_nan() {
            return None;
        }
        let a = r.abs();
        Some(if a >= 0.7 {
            CorrelationStrength::Strong
        } else if a >= 0.4 {
            CorrelationStrength::Moderate
        } else if a >= 0.2 {
            CorrelationStrength::Weak
        } else {
            CorrelationStrength::Negligible
        })
    }
}

/// Pearson correlation between two aligned series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    /// NaN when undefined
    pub r: f64,
    /// Pairs where both sides had a value
    pub n: usize,
    pub strength: Option<CorrelationStrength>,
}

/// Pearson r over pairs where both values are present
pub fn pearson(xs: &[Option<f64>], ys: &[Option<f64>]) -> Correlation {
    let pairs: Vec<(f64, f64)> = xs.iter()
        .zip(ys.iter())
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();
    let n = pairs.len();
    let undefined = Correlation { r: f64::NAN, n, strength: None };
    if n < 2 {
        return undefined;
    }

    let nf = n as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / nf;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / nf;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return undefined;
    }

    let r = (cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0);
    Correlation { r, n, strength: CorrelationStrength::from_r(r) }
}

/// Summary of the last `window` values of a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingStats {
    pub current: Option<f64>,
    pub average: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Non-null values inside the window
    pub count: usize,
    pub trend: Option<TrendLine>,
}

/// Trailing-window summary; nulls inside the window are skipped
pub fn trailing_stats(values: &[Option<f64>], window: usize) -> TrailingStats {
    trailing_stats_with_threshold(values, window, DEFAULT_TREND_THRESHOLD)
}

pub fn trailing_stats_with_threshold(values: &[Option<f64>], window: usize, threshold: f64) -> TrailingStats {
    let start = values.len().saturating_sub(window);
    let in_window = &values[start..];
    let present: Vec<f64> = in_window.iter().flatten().copied().collect();
    let count = present.len();

    TrailingStats {
        current: in_window.last().copied().flatten(),
        average: (count > 0).then(|| present.iter().sum::<f64>() / count as f64),
        min: present.iter().copied().reduce(f64::min),
        max: present.iter().copied().reduce(f64::max),
        count,
        trend: linear_trend_series(in_window, threshold),
    }
}
