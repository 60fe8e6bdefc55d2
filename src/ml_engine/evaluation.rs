//! Hold-out split and regression metrics.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use statrs::statistics::Statistics;

/// Shuffle `0..n` with a fixed seed and cut off `ceil(test_fraction × n)` rows
/// for testing. Returns `(train, test)` index sets.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let test_len = ((n as f64) * test_fraction).ceil() as usize;
    let test_len = test_len.min(n.saturating_sub(1));
    let train = indices.split_off(test_len);
    (train, indices)
}

/// Gather rows by index.
pub fn take_rows<T: Clone>(data: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| data[i].clone()).collect()
}

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / actual.len() as f64
}

/// Coefficient of determination. A target with zero variance scores 0.0.
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() < 2 {
        return 0.0;
    }
    let mean = actual.iter().mean();
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    if ss_tot <= f64::EPSILON {
        return 0.0;
    }
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    1.0 - ss_res / ss_tot
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Least-squares slope of `values` against their index `0, 1, 2, ...`.
pub fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = values.iter().mean();
    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - x_mean;
            (num + dx * (y - y_mean), den + dx * dx)
        });
    num / den
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_is_reproducible_and_disjoint() {
        let (train_a, test_a) = train_test_split(50, 0.2, 42);
        let (train_b, test_b) = train_test_split(50, 0.2, 42);
        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);
        assert_eq!(test_a.len(), 10);
        assert_eq!(train_a.len(), 40);
        assert!(test_a.iter().all(|i| !train_a.contains(i)));
    }

    #[test]
    fn test_split_rounds_test_size_up() {
        let (train, test) = train_test_split(11, 0.2, 7);
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 8);
    }

    #[test]
    fn test_metrics() {
        let actual = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(r2_score(&actual, &actual), 1.0);
        assert_eq!(mean_absolute_error(&actual, &[2.0, 2.0, 2.0, 2.0]), 1.0);
        // predicting the mean scores zero
        assert!(r2_score(&actual, &[2.5; 4]).abs() < 1e-12);
    }

    #[test]
    fn test_r2_zero_variance_target() {
        assert_eq!(r2_score(&[70.0; 5], &[70.0; 5]), 0.0);
    }

    #[test]
    fn test_linear_slope() {
        assert!((linear_slope(&[1.0, 3.0, 5.0, 7.0]) - 2.0).abs() < 1e-12);
        assert_eq!(linear_slope(&[4.0]), 0.0);
        assert!(linear_slope(&[5.0, 5.0, 5.0]).abs() < 1e-12);
    }
}
