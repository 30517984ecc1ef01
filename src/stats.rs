use crate::dataset::Dataset;
use std::collections::HashMap;

/// The three scalar aggregates shown on the landing page
///
/// Recomputed from the dataset on every request; at the data scale involved
/// (hundreds to low thousands of rows) caching these would buy nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryMetrics {
    /// Number of distinct listing categories
    pub distinct_categories: usize,

    /// Sum of the `Total_Earning` column
    pub total_earnings: f64,

    /// Mean of the `Rating` column, rounded to 2 decimals
    pub avg_rating: f64,
}

/// How grouped values are reduced to one number per group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Sum,
    Mean,
    Max,
    Count,
}

/// Compute the landing-page summary metrics
///
/// An empty dataset (or one missing the relevant columns) yields zeros rather
/// than NaN so the page always renders.
pub fn summary_metrics(dataset: &Dataset) -> SummaryMetrics {
    let distinct_categories = dataset
        .text("Category")
        .map(|col| {
            let mut seen: Vec<&String> = col.iter().collect();
            seen.sort();
            seen.dedup();
            seen.len()
        })
        .unwrap_or(0);

    let total_earnings = dataset
        .numeric("Total_Earning")
        .map(|col| col.iter().sum())
        .unwrap_or(0.0);

    let avg_rating = dataset
        .numeric("Rating")
        .filter(|col| !col.is_empty())
        .map(|col| round2(col.iter().sum::<f64>() / col.len() as f64))
        .unwrap_or(0.0);

    SummaryMetrics {
        distinct_categories,
        total_earnings,
        avg_rating,
    }
}

/// Group `values` by `keys` and reduce each group with `agg`
///
/// For `Aggregate::Count` the values slice is ignored (it may be empty).
/// Results come back sorted by group label, which keeps output deterministic
/// regardless of row order.
pub fn aggregate_by(keys: &[String], values: &[f64], agg: Aggregate) -> Vec<(String, f64)> {
    let mut sums: HashMap<&str, f64> = HashMap::new();
    let mut counts: HashMap<&str, f64> = HashMap::new();
    let mut maxima: HashMap<&str, f64> = HashMap::new();

    for (i, key) in keys.iter().enumerate() {
        let value = values.get(i).copied().unwrap_or(0.0);
        *sums.entry(key).or_insert(0.0) += value;
        *counts.entry(key).or_insert(0.0) += 1.0;
        let max = maxima.entry(key).or_insert(f64::MIN);
        if value > *max {
            *max = value;
        }
    }

    let mut result: Vec<(String, f64)> = counts
        .iter()
        .map(|(&key, &count)| {
            let value = match agg {
                Aggregate::Sum => sums[key],
                Aggregate::Mean => sums[key] / count,
                Aggregate::Max => maxima[key],
                Aggregate::Count => count,
            };
            (key.to_string(), value)
        })
        .collect();

    result.sort_by(|a, b| a.0.cmp(&b.0));
    result
}

/// Occurrence counts per distinct label, most frequent first
///
/// Ties break on the label so the order is fully deterministic.
pub fn value_counts(keys: &[String]) -> Vec<(String, f64)> {
    let mut entries = aggregate_by(keys, &[], Aggregate::Count);
    entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
    entries
}

/// Two-key grouping for grouped bar charts
///
/// Returns the sorted outer labels plus one value series per sorted inner
/// label, with every series aligned to the outer labels (missing combinations
/// are 0).
pub fn aggregate_by_two(
    outer: &[String],
    inner: &[String],
    values: &[f64],
    agg: Aggregate,
) -> (Vec<String>, Vec<(String, Vec<f64>)>) {
    let mut outer_labels: Vec<String> = outer.to_vec();
    outer_labels.sort();
    outer_labels.dedup();

    let mut inner_labels: Vec<String> = inner.to_vec();
    inner_labels.sort();
    inner_labels.dedup();

    let mut series = Vec::with_capacity(inner_labels.len());
    for inner_label in &inner_labels {
        // Group the rows belonging to this inner label by the outer key
        let mut keys = Vec::new();
        let mut vals = Vec::new();
        for i in 0..outer.len() {
            if &inner[i] == inner_label {
                keys.push(outer[i].clone());
                vals.push(values.get(i).copied().unwrap_or(0.0));
            }
        }
        let grouped: HashMap<String, f64> = aggregate_by(&keys, &vals, agg).into_iter().collect();
        let aligned = outer_labels
            .iter()
            .map(|label| grouped.get(label).copied().unwrap_or(0.0))
            .collect();
        series.push((inner_label.clone(), aligned));
    }

    (outer_labels, series)
}

/// Sum `values` within the fixed rating bins (0, 4], (4, 4.5], (4.5, 5]
///
/// Ratings outside (0, 5] fall off the ends and are dropped, matching how the
/// bins were defined over the cleaned data.
pub fn sum_by_rating_bins(ratings: &[f64], values: &[f64]) -> Vec<(String, f64)> {
    let mut bins = vec![
        ("(0.0, 4.0]".to_string(), 0.0),
        ("(4.0, 4.5]".to_string(), 0.0),
        ("(4.5, 5.0]".to_string(), 0.0),
    ];

    for (i, &rating) in ratings.iter().enumerate() {
        let value = values.get(i).copied().unwrap_or(0.0);
        let slot = if rating > 0.0 && rating <= 4.0 {
            0
        } else if rating > 4.0 && rating <= 4.5 {
            1
        } else if rating > 4.5 && rating <= 5.0 {
            2
        } else {
            continue;
        };
        bins[slot].1 += value;
    }

    bins
}

/// Pearson correlation matrix over the given columns
///
/// A zero-variance column correlates 0 with everything else; the diagonal is
/// always 1.
pub fn correlation_matrix(columns: &[&[f64]]) -> Vec<Vec<f64>> {
    let n = columns.len();
    let mut matrix = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in 0..n {
            matrix[i][j] = if i == j {
                1.0
            } else {
                pearson(columns[i], columns[j])
            };
        }
    }

    matrix
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n == 0 {
        return 0.0;
    }
    let nf = n as f64;
    let mean_x = x[..n].iter().sum::<f64>() / nf;
    let mean_y = y[..n].iter().sum::<f64>() / nf;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..n {
        let dx = x[i] - mean_x;
        let dy = y[i] - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 { 0.0 } else { cov / denom }
}

/// Gaussian kernel density estimate over `samples`
///
/// Bandwidth uses Scott's rule. The curve is evaluated on `points` evenly
/// spaced positions covering the sample range padded by three bandwidths.
pub fn gaussian_kde(samples: &[f64], points: usize) -> Vec<(f64, f64)> {
    if samples.is_empty() || points == 0 {
        return Vec::new();
    }

    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|&s| (s - mean) * (s - mean)).sum::<f64>() / n;
    let std = variance.sqrt();
    let bandwidth = if std > 0.0 { std * n.powf(-0.2) } else { 1.0 };

    let min = samples.iter().cloned().fold(f64::INFINITY, f64::min) - 3.0 * bandwidth;
    let max = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max) + 3.0 * bandwidth;
    let step = (max - min) / (points - 1).max(1) as f64;
    let norm = 1.0 / (n * bandwidth * (2.0 * std::f64::consts::PI).sqrt());

    (0..points)
        .map(|i| {
            let x = min + step * i as f64;
            let density = samples
                .iter()
                .map(|&s| {
                    let z = (x - s) / bandwidth;
                    (-0.5 * z * z).exp()
                })
                .sum::<f64>()
                * norm;
            (x, density)
        })
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Column, Dataset};

    fn scenario_dataset() -> Dataset {
        Dataset::from_columns(vec![
            (
                "Category",
                Column::Text(vec![
                    "Writing".to_string(),
                    "Writing".to_string(),
                    "Design".to_string(),
                ]),
            ),
            ("Rating", Column::Numeric(vec![4.0, 5.0, 3.5])),
            ("Total_Earning", Column::Numeric(vec![100.0, 200.0, 50.0])),
        ])
        .unwrap()
    }

    #[test]
    fn summary_metrics_match_the_known_scenario() {
        let metrics = summary_metrics(&scenario_dataset());
        assert_eq!(metrics.distinct_categories, 2);
        assert_eq!(metrics.total_earnings, 350.0);
        assert_eq!(metrics.avg_rating, 4.17);
    }

    #[test]
    fn summary_metrics_on_empty_dataset_are_zero() {
        let empty = Dataset::from_columns(vec![
            ("Category", Column::Text(vec![])),
            ("Rating", Column::Text(vec![])),
            ("Total_Earning", Column::Text(vec![])),
        ])
        .unwrap();

        let metrics = summary_metrics(&empty);
        assert_eq!(metrics.distinct_categories, 0);
        assert_eq!(metrics.total_earnings, 0.0);
        assert_eq!(metrics.avg_rating, 0.0);
    }

    #[test]
    fn summary_metrics_are_invariant_under_row_reordering() {
        let reordered = Dataset::from_columns(vec![
            (
                "Category",
                Column::Text(vec![
                    "Design".to_string(),
                    "Writing".to_string(),
                    "Writing".to_string(),
                ]),
            ),
            ("Rating", Column::Numeric(vec![3.5, 5.0, 4.0])),
            ("Total_Earning", Column::Numeric(vec![50.0, 200.0, 100.0])),
        ])
        .unwrap();

        assert_eq!(summary_metrics(&scenario_dataset()), summary_metrics(&reordered));
    }

    #[test]
    fn duplicating_every_row_doubles_sums_and_keeps_means() {
        let doubled = Dataset::from_columns(vec![
            (
                "Category",
                Column::Text(
                    ["Writing", "Writing", "Design", "Writing", "Writing", "Design"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                ),
            ),
            (
                "Rating",
                Column::Numeric(vec![4.0, 5.0, 3.5, 4.0, 5.0, 3.5]),
            ),
            (
                "Total_Earning",
                Column::Numeric(vec![100.0, 200.0, 50.0, 100.0, 200.0, 50.0]),
            ),
        ])
        .unwrap();

        let base = summary_metrics(&scenario_dataset());
        let metrics = summary_metrics(&doubled);
        assert_eq!(metrics.distinct_categories, base.distinct_categories);
        assert_eq!(metrics.total_earnings, 2.0 * base.total_earnings);
        assert_eq!(metrics.avg_rating, base.avg_rating);
    }

    #[test]
    fn aggregate_by_covers_every_reduction() {
        let keys: Vec<String> = ["a", "b", "a", "b", "a"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let values = [1.0, 10.0, 2.0, 20.0, 3.0];

        assert_eq!(
            aggregate_by(&keys, &values, Aggregate::Sum),
            vec![("a".to_string(), 6.0), ("b".to_string(), 30.0)]
        );
        assert_eq!(
            aggregate_by(&keys, &values, Aggregate::Mean),
            vec![("a".to_string(), 2.0), ("b".to_string(), 15.0)]
        );
        assert_eq!(
            aggregate_by(&keys, &values, Aggregate::Max),
            vec![("a".to_string(), 3.0), ("b".to_string(), 20.0)]
        );
        assert_eq!(
            aggregate_by(&keys, &[], Aggregate::Count),
            vec![("a".to_string(), 3.0), ("b".to_string(), 2.0)]
        );
    }

    #[test]
    fn value_counts_orders_by_frequency_then_label() {
        let keys: Vec<String> = ["x", "y", "y", "z", "x", "y"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        assert_eq!(
            value_counts(&keys),
            vec![
                ("y".to_string(), 3.0),
                ("x".to_string(), 2.0),
                ("z".to_string(), 1.0),
            ]
        );
    }

    #[test]
    fn two_key_grouping_aligns_series_and_fills_gaps() {
        let outer: Vec<String> = ["c1", "c1", "c2", "c2", "c3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let inner: Vec<String> = ["m", "f", "m", "m", "f"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let values = [10.0, 20.0, 30.0, 50.0, 5.0];

        let (labels, series) = aggregate_by_two(&outer, &inner, &values, Aggregate::Mean);
        assert_eq!(labels, vec!["c1", "c2", "c3"]);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].0, "f");
        assert_eq!(series[0].1, vec![20.0, 0.0, 5.0]);
        assert_eq!(series[1].0, "m");
        assert_eq!(series[1].1, vec![10.0, 40.0, 0.0]);
    }

    #[test]
    fn rating_bins_split_on_their_edges() {
        let ratings = [3.9, 4.0, 4.1, 4.5, 4.6, 5.0];
        let earnings = [1.0, 2.0, 4.0, 8.0, 16.0, 32.0];

        let bins = sum_by_rating_bins(&ratings, &earnings);
        assert_eq!(bins[0], ("(0.0, 4.0]".to_string(), 3.0));
        assert_eq!(bins[1], ("(4.0, 4.5]".to_string(), 12.0));
        assert_eq!(bins[2], ("(4.5, 5.0]".to_string(), 48.0));
    }

    #[test]
    fn correlation_of_a_column_with_itself_is_one() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        let c = [4.0, 3.0, 2.0, 1.0];

        let m = correlation_matrix(&[&a, &b, &c]);
        assert!((m[0][0] - 1.0).abs() < 1e-12);
        assert!((m[0][1] - 1.0).abs() < 1e-12);
        assert!((m[0][2] + 1.0).abs() < 1e-12);
        assert!((m[1][2] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_variance_column_correlates_zero() {
        let flat = [5.0, 5.0, 5.0];
        let rising = [1.0, 2.0, 3.0];

        let m = correlation_matrix(&[&flat, &rising]);
        assert_eq!(m[0][1], 0.0);
        assert_eq!(m[0][0], 1.0);
    }

    #[test]
    fn kde_produces_a_finite_positive_curve() {
        let samples = [1.0, 2.0, 2.0, 3.0, 10.0];
        let curve = gaussian_kde(&samples, 100);

        assert_eq!(curve.len(), 100);
        assert!(curve.iter().all(|&(x, y)| x.is_finite() && y.is_finite() && y >= 0.0));
        // The curve should peak near the cluster at 2, not near the outlier
        let peak = curve
            .iter()
            .cloned()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            .unwrap();
        assert!(peak.0 < 5.0);
    }

    #[test]
    fn kde_of_empty_input_is_empty() {
        assert!(gaussian_kde(&[], 100).is_empty());
    }
}
