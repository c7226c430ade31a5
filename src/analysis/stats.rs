//! Rank correlation and the Student t tail probability it needs.

use statrs::distribution::{ContinuousCDF, StudentsT};

/// Ranks starting at 1, ties receiving the average of their positions
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|a, b| values[*a].total_cmp(&values[*b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // Positions i..=j share the mean rank
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for idx in &order[i..=j] {
            ranks[*idx] = rank;
        }
        i = j + 1;
    }
    ranks
}

/// Pearson coefficient; `None` when either series has no variance
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let mean_x = x[..n].iter().sum::<f64>() / n as f64;
    let mean_y = y[..n].iter().sum::<f64>() / n as f64;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x[..n].iter().zip(&y[..n]) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// Spearman's rho with its two-sided p-value.
///
/// Requires at least two pairs and variance in both series. The p-value
/// uses the t distribution with n - 2 degrees of freedom; with two pairs
/// it is 1 and a perfect correlation over more pairs gives 0.
pub fn spearman(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let rho = pearson(&average_ranks(x), &average_ranks(y))?;
    let n = x.len();
    if n == 2 {
        return Some((rho, 1.0));
    }
    if (1.0 - rho.abs()) <= f64::EPSILON {
        return Some((rho, 0.0));
    }
    let df = (n - 2) as f64;
    let t = rho * (df / ((1.0 - rho) * (1.0 + rho))).sqrt();
    Some((rho, student_t_two_sided(t, df)?))
}

/// P(|T| >= |t|) for Student's t with `df` degrees of freedom; `None`
/// for a non-positive `df`
pub fn student_t_two_sided(t: f64, df: f64) -> Option<f64> {
    let distribution = StudentsT::new(0.0, 1.0, df).ok()?;
    Some((2.0 * (1.0 - distribution.cdf(t.abs()))).clamp(0.0, 1.0))
}

/// Rounds to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
