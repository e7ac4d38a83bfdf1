use std::cmp::Ordering;
use ndarray::Array1;
/// Arithmetic mean of the non-NaN samples, `None` if there are none.
pub fn mean(samples: &Array1<f64>) -> Option<f64> {
    let finite: Array1<f64> = samples.iter().copied().filter(|v| !v.is_nan()).collect();
    finite.mean()
}
/// Most frequent non-NaN value; ties go to the smallest.
pub fn mode(samples: &Array1<f64>) -> Option<f64> {
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    let mut best: Option<(f64, usize)> = None;
    let mut run_start = 0;
    for i in 1..=sorted.len() {
        let run_ends = i == sorted.len() || sorted[i].total_cmp(&sorted[run_start]) != Ordering::Equal;
        if !run_ends {
            continue;
        }
        let count = i - run_start;
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((sorted[run_start], count));
        }
        run_start = i;
    }
    best.map(|(value, _)| value)
}
#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    #[test]
    fn mean_of_empty_series_is_none() {
        assert_eq!(mean(&Array1::zeros(0)), None);
        assert_eq!(mean(&array![1.0, 2.0, 3.0]), Some(2.0));
    }
    #[test]
    fn mean_skips_nan_samples() {
        assert_eq!(mean(&array![1.0, f64::NAN, 3.0]), Some(2.0));
        assert_eq!(mean(&array![f64::NAN]), None);
    }
    #[test]
    fn mode_picks_most_frequent_then_smallest() {
        assert_eq!(mode(&array![0.3, 0.1, 0.3, 0.2]), Some(0.3));
        assert_eq!(mode(&array![2.0, 1.0, 2.0, 1.0]), Some(1.0));
        assert_eq!(mode(&array![5.0]), Some(5.0));
        assert_eq!(mode(&array![f64::NAN, 4.0, f64::NAN]), Some(4.0));
        assert_eq!(mode(&Array1::zeros(0)), None);
    }
}
