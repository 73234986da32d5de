use crate::models::{Pattern, PatternType};

fn as_numeric_series(values: &[serde_json::Value]) -> Vec<f64> {
    values.iter().filter_map(|v| v.as_f64()).collect()
}

/// Ordinary least squares slope and R² of `series` against its index,
/// i.e. how linear the trend is over time.
fn linear_regression(series: &[f64]) -> (f64, f64) {
    let n = series.len() as f64;
    if series.len() < 2 {
        return (0.0, 0.0);
    }
    let xs: Vec<f64> = (0..series.len()).map(|i| i as f64).collect();
    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = series.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    for (x, y) in xs.iter().zip(series) {
        cov += (x - x_mean) * (y - y_mean);
        var_x += (x - x_mean).powi(2);
    }
    if var_x == 0.0 {
        return (0.0, 0.0);
    }
    let slope = cov / var_x;
    let intercept = y_mean - slope * x_mean;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (x, y) in xs.iter().zip(series) {
        let predicted = slope * x + intercept;
        ss_res += (y - predicted).powi(2);
        ss_tot += (y - y_mean).powi(2);
    }
    let r_squared = if ss_tot == 0.0 { 0.0 } else { 1.0 - ss_res / ss_tot };
    (slope, r_squared)
}

/// Autocorrelation of `series` at `lag`, used as a seasonality proxy in
/// place of a full FFT.
fn autocorrelation(series: &[f64], lag: usize) -> f64 {
    if lag == 0 || lag >= series.len() {
        return 0.0;
    }
    let n = series.len();
    let mean = series.iter().sum::<f64>() / n as f64;
    let mut num = 0.0;
    let mut denom = 0.0;
    for i in 0..n {
        denom += (series[i] - mean).powi(2);
    }
    for i in 0..(n - lag) {
        num += (series[i] - mean) * (series[i + lag] - mean);
    }
    if denom == 0.0 {
        0.0
    } else {
        num / denom
    }
}

fn mean_stddev(series: &[f64]) -> (f64, f64) {
    let n = series.len() as f64;
    if series.is_empty() {
        return (0.0, 0.0);
    }
    let mean = series.iter().sum::<f64>() / n;
    let variance = series.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Trend, seasonality, stationarity, and point-anomaly detectors over a
/// numeric series.
pub fn detect(values: &[serde_json::Value]) -> Vec<Pattern> {
    let series = as_numeric_series(values);
    if series.len() < 4 {
        return Vec::new();
    }

    let mut patterns = Vec::new();

    let (slope, r_squared) = linear_regression(&series);
    if r_squared.abs() >= 0.5 {
        patterns.push(
            Pattern::new(PatternType::Trend, r_squared.abs(), format!("linear trend, slope {slope:.4}"))
                .with_evidence("r_squared", serde_json::json!(r_squared))
                .with_evidence("slope", serde_json::json!(slope)),
        );
    }

    let candidate_periods = [7usize, 12, 24, 30];
    if let Some((best_period, strength)) = candidate_periods
        .iter()
        .filter(|&&p| p < series.len())
        .map(|&p| (p, autocorrelation(&series, p).abs()))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    {
        if strength >= 0.5 {
            patterns.push(
                Pattern::new(PatternType::Seasonality, strength, format!("periodic pattern at lag {best_period}"))
                    .with_evidence("period", serde_json::json!(best_period))
                    .with_evidence("autocorrelation", serde_json::json!(strength)),
            );
        }
    }

    let (mean, stddev) = mean_stddev(&series);
    if stddev > 0.0 {
        let cv = stddev / mean.abs().max(1e-9);
        let stationarity_confidence = (1.0 - cv.min(1.0)).max(0.0);
        if r_squared.abs() < 0.3 && stationarity_confidence >= 0.5 {
            patterns.push(
                Pattern::new(PatternType::Stationarity, stationarity_confidence, "series fluctuates around a stable mean")
                    .with_evidence("mean", serde_json::json!(mean))
                    .with_evidence("stddev", serde_json::json!(stddev)),
            );
        }

        let anomalies: Vec<(usize, f64)> = series
            .iter()
            .enumerate()
            .filter(|(_, v)| ((*v - mean) / stddev).abs() > 3.0)
            .map(|(i, v)| (i, *v))
            .collect();
        if !anomalies.is_empty() {
            let confidence = (anomalies.len() as f64 / series.len() as f64 * 10.0).min(1.0).max(0.7);
            let mut pattern = Pattern::new(
                PatternType::Anomaly,
                confidence,
                format!("{} point(s) beyond 3 sigma", anomalies.len()),
            );
            for (i, v) in &anomalies {
                pattern = pattern.with_evidence(format!("index {i}"), serde_json::json!(v));
            }
            patterns.push(pattern);
        }
    }

    patterns
}
