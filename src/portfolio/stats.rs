//! Return-series statistics for the optimizer
//!
//! Aligned daily return series in, sample moments out. Series shorter than
//! two observations produce zero moments rather than errors; the optimizer
//! treats such symbols as flat.

/// Arithmetic mean; zero for an empty series
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample variance
pub fn variance(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64
}

/// Sample covariance over the overlapping prefix of two series
pub fn covariance(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let ma = mean(&a[..n]);
    let mb = mean(&b[..n]);
    a[..n]
        .iter()
        .zip(&b[..n])
        .map(|(x, y)| (x - ma) * (y - mb))
        .sum::<f64>()
        / (n - 1) as f64
}

/// Pearson correlation; zero when either series is flat
pub fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let cov = covariance(a, b);
    let sa = variance(a).sqrt();
    let sb = variance(b).sqrt();
    if sa == 0.0 || sb == 0.0 {
        return 0.0;
    }
    (cov / (sa * sb)).clamp(-1.0, 1.0)
}

/// Full covariance matrix across aligned series
pub fn covariance_matrix(series: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = series.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let cov = covariance(&series[i], &series[j]);
            matrix[i][j] = cov;
            matrix[j][i] = cov;
        }
    }
    matrix
}

/// Full correlation matrix across aligned series
pub fn correlation_matrix(series: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = series.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        matrix[i][i] = 1.0;
        for j in (i + 1)..n {
            let rho = correlation(&series[i], &series[j]);
            matrix[i][j] = rho;
            matrix[j][i] = rho;
        }
    }
    matrix
}

/// Portfolio variance `w' C w`
pub fn portfolio_variance(weights: &[f64], covariance: &[Vec<f64>]) -> f64 {
    let mut total = 0.0;
    for (i, wi) in weights.iter().enumerate() {
        for (j, wj) in weights.iter().enumerate() {
            total += wi * wj * covariance[i][j];
        }
    }
    total.max(0.0)
}
