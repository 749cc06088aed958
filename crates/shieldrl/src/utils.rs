//! Utility functions.

use ndarray::{Array1, ArrayView1};

/// Set global random seed for the tensor backend.
pub fn set_seed(_seed: u64) {
    #[cfg(feature = "torch")]
    tch::manual_seed(_seed as i64);
}

/// Reverse discounted cumulative sum:
/// `out[t] = xs[t] + discount * out[t+1]`.
pub fn discount_cumsum(xs: &ArrayView1<f32>, discount: f32) -> Array1<f32> {
    let mut out = Array1::zeros(xs.len());
    let mut acc = 0.0f32;
    for t in (0..xs.len()).rev() {
        acc = xs[t] + discount * acc;
        out[t] = acc;
    }
    out
}

/// Mean and population standard deviation of a slice.
pub fn mean_std(xs: &ArrayView1<f32>) -> (f32, f32) {
    if xs.is_empty() {
        return (0.0, 0.0);
    }
    let n = xs.len() as f64;
    let mean = xs.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = xs.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
    (mean as f32, var.sqrt() as f32)
}

/// Format duration in human-readable form
pub fn format_duration(seconds: f64) -> String {
    if seconds < 0.0 {
        return "0s".to_string();
    }

    let secs = seconds as u64;
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;

    if h > 0 {
        format!("{}h {}m {}s", h, m, s)
    } else if m > 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{}s", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_discount_cumsum() {
        let xs = array![1.0, 1.0, 1.0];
        let out = discount_cumsum(&xs.view(), 0.5);
        assert_eq!(out, array![1.75, 1.5, 1.0]);
    }

    #[test]
    fn test_mean_std() {
        let xs = array![1.0, 2.0, 3.0, 4.0];
        let (mean, std) = mean_std(&xs.view());
        assert!((mean - 2.5).abs() < 1e-6);
        assert!((std - 1.25f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.0), "30s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m 1s");
    }
}
