// src/signal.rs
//
// Numeric primitives shared by every analysis layer: Savitzky-Golay
// smoothing, discrete gradients, and the two flavors of standard
// deviation the metrics contract distinguishes between.

// ============================================================================
// SMOOTHING
// ============================================================================

/// Savitzky-Golay smoothing with a quadratic fit.
///
/// The window shrinks to the series length when the series is short,
/// dropping to the next odd size; anything below 3 returns the input
/// unchanged. Interior points use the closed-form quadratic kernel,
/// edge points re-fit a quadratic over the first/last full window so
/// the ends are not flattened toward zero.
pub fn savgol_smooth(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    if n < 3 {
        return values.to_vec();
    }
    let mut w = window.min(n);
    if w % 2 == 0 {
        w = w.saturating_sub(1);
    }
    if w < 3 {
        return values.to_vec();
    }

    let half = w / 2;
    let coeffs = quadratic_kernel(half);
    let mut out = vec![0.0; n];

    for i in half..n - half {
        let mut acc = 0.0;
        for (k, c) in coeffs.iter().enumerate() {
            acc += c * values[i + k - half];
        }
        out[i] = acc;
    }

    // Leading edge: quadratic over the first window, evaluated in place
    let (a, b, c) = quadratic_fit(&values[..w]);
    for i in 0..half {
        let x = i as f64;
        out[i] = a + b * x + c * x * x;
    }

    // Trailing edge: same treatment over the last window
    let (a, b, c) = quadratic_fit(&values[n - w..]);
    for i in 0..half {
        let x = (w - half + i) as f64;
        out[n - half + i] = a + b * x + c * x * x;
    }

    out
}

/// Closed-form quadratic Savitzky-Golay kernel for half-width `m`:
/// c_i = (3(3m² + 3m − 1) − 15 i²) / ((2m+3)(2m+1)(2m−1)), i in [−m, m].
/// For m = 2 this is the familiar (−3, 12, 17, 12, −3) / 35.
fn quadratic_kernel(m: usize) -> Vec<f64> {
    let mf = m as f64;
    let denom = (2.0 * mf + 3.0) * (2.0 * mf + 1.0) * (2.0 * mf - 1.0);
    let base = 3.0 * (3.0 * mf * mf + 3.0 * mf - 1.0);
    (0..=2 * m)
        .map(|k| {
            let i = k as f64 - mf;
            (base - 15.0 * i * i) / denom
        })
        .collect()
}

/// Least-squares fit of a + b·x + c·x² over y sampled at x = 0..n−1.
fn quadratic_fit(y: &[f64]) -> (f64, f64, f64) {
    let n = y.len();
    if n < 3 {
        let m = mean(y);
        return (m, 0.0, 0.0);
    }

    let (mut s1, mut s2, mut s3, mut s4) = (0.0, 0.0, 0.0, 0.0);
    let (mut t0, mut t1, mut t2) = (0.0, 0.0, 0.0);
    for (i, &yi) in y.iter().enumerate() {
        let x = i as f64;
        let xx = x * x;
        s1 += x;
        s2 += xx;
        s3 += xx * x;
        s4 += xx * xx;
        t0 += yi;
        t1 += x * yi;
        t2 += xx * yi;
    }
    let s0 = n as f64;

    // Cramer's rule on the 3x3 normal equations; distinct integer
    // abscissae keep the determinant away from zero.
    let det = s0 * (s2 * s4 - s3 * s3) - s1 * (s1 * s4 - s3 * s2) + s2 * (s1 * s3 - s2 * s2);
    let da = t0 * (s2 * s4 - s3 * s3) - s1 * (t1 * s4 - s3 * t2) + s2 * (t1 * s3 - s2 * t2);
    let db = s0 * (t1 * s4 - s3 * t2) - t0 * (s1 * s4 - s3 * s2) + s2 * (s1 * t2 - t1 * s2);
    let dc = s0 * (s2 * t2 - t1 * s3) - s1 * (s1 * t2 - t1 * s2) + t0 * (s1 * s3 - s2 * s2);

    (da / det, db / det, dc / det)
}

// ============================================================================
// GRADIENTS
// ============================================================================

/// Discrete gradient with unit spacing: one-sided differences at the
/// ends, central differences in the interior. Series shorter than two
/// samples have no slope and come back as zeros.
pub fn gradient(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return vec![0.0; n];
    }

    let mut out = vec![0.0; n];
    out[0] = values[1] - values[0];
    out[n - 1] = values[n - 1] - values[n - 2];
    for i in 1..n - 1 {
        out[i] = (values[i + 1] - values[i - 1]) / 2.0;
    }
    out
}

/// Smoothed series plus its first and second gradients.
#[derive(Debug, Clone)]
pub struct Derivatives {
    pub smoothed: Vec<f64>,
    pub first: Vec<f64>,
    pub second: Vec<f64>,
}

/// Derivative pipeline for a channel with gaps: missing samples become
/// 0.0, the series is smoothed, then differentiated twice.
pub fn differentiate(values: &[Option<f64>], window: usize) -> Derivatives {
    let filled = fill_missing(values);
    let smoothed = savgol_smooth(&filled, window);
    let first = gradient(&smoothed);
    let second = gradient(&first);
    Derivatives {
        smoothed,
        first,
        second,
    }
}

// ============================================================================
// MISSING-VALUE HANDLING
// ============================================================================

/// Replace missing samples with 0.0, keeping series length.
pub fn fill_missing(values: &[Option<f64>]) -> Vec<f64> {
    values.iter().map(|v| v.unwrap_or(0.0)).collect()
}

/// Drop missing samples, compacting the series.
pub fn compact(values: &[Option<f64>]) -> Vec<f64> {
    values.iter().filter_map(|v| *v).collect()
}

// ============================================================================
// STATS
// ============================================================================

/// Arithmetic mean. Empty input yields NaN, matching the comparison
/// semantics downstream gates rely on.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (ddof = 0). Used for coefficient-of-
/// variation scores and brake-gradient spread.
pub fn std_pop(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Sample standard deviation (ddof = 1). Used for classifier window
/// variability and session-summary channel spread. Fewer than two
/// samples yield NaN so threshold comparisons fail closed.
pub fn std_sample(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

/// Largest absolute value in the series; 0.0 when empty.
pub fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0f64, |acc, v| acc.max(v.abs()))
}

/// Mean of absolute values; NaN when empty.
pub fn mean_abs(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().map(|v| v.abs()).sum::<f64>() / values.len() as f64
}
