use freelytix::dataset::{Column, Dataset};
use freelytix::stats::{
    Aggregate, aggregate_by, aggregate_by_two, correlation_matrix, gaussian_kde, summary_metrics,
    sum_by_rating_bins, value_counts,
};

// Helper function to compare floats with a small tolerance
fn assert_close(actual: f64, expected: f64, what: &str) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "{}: expected {}, got {}",
        what,
        expected,
        actual
    );
    println!("✓ {} = {}", what, expected);
}

fn sample_dataset() -> Dataset {
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

fn test_summary_metrics() {
    println!("\n====== Testing summary_metrics ======");

    let metrics = summary_metrics(&sample_dataset());
    assert_eq!(metrics.distinct_categories, 2);
    println!("✓ 2 distinct categories counted");
    assert_close(metrics.total_earnings, 350.0, "total earnings");
    assert_close(metrics.avg_rating, 4.17, "average rating (rounded)");

    let empty = Dataset::from_columns(vec![]).unwrap();
    let metrics = summary_metrics(&empty);
    assert_eq!(metrics.distinct_categories, 0);
    assert_close(metrics.total_earnings, 0.0, "empty dataset earnings");
    assert_close(metrics.avg_rating, 0.0, "empty dataset rating");
}

fn test_aggregations() {
    println!("\n====== Testing aggregate_by ======");

    let ds = sample_dataset();
    let keys = ds.labels("Category").unwrap();
    let earnings = ds.numeric("Total_Earning").unwrap();

    let sums = aggregate_by(&keys, earnings, Aggregate::Sum);
    assert_eq!(sums.len(), 2);
    assert_eq!(sums[0].0, "Design");
    assert_close(sums[0].1, 50.0, "Design earnings sum");
    assert_close(sums[1].1, 300.0, "Writing earnings sum");

    let means = aggregate_by(&keys, earnings, Aggregate::Mean);
    assert_close(means[1].1, 150.0, "Writing earnings mean");

    let maxes = aggregate_by(&keys, earnings, Aggregate::Max);
    assert_close(maxes[1].1, 200.0, "Writing earnings max");

    let counts = value_counts(&keys);
    assert_eq!(counts[0].0, "Writing");
    assert_close(counts[0].1, 2.0, "Writing count (most frequent first)");
}

fn test_grouped_aggregation() {
    println!("\n====== Testing aggregate_by_two ======");

    let outer = vec![
        "A".to_string(),
        "A".to_string(),
        "B".to_string(),
        "B".to_string(),
    ];
    let inner = vec![
        "x".to_string(),
        "y".to_string(),
        "x".to_string(),
        "x".to_string(),
    ];
    let values = vec![1.0, 2.0, 3.0, 5.0];

    let (labels, series) = aggregate_by_two(&outer, &inner, &values, Aggregate::Sum);
    assert_eq!(labels, vec!["A".to_string(), "B".to_string()]);
    assert_eq!(series.len(), 2);
    println!("✓ Two inner series aligned over {} outer labels", labels.len());

    let x_series = series.iter().find(|(name, _)| name == "x").unwrap();
    assert_close(x_series.1[0], 1.0, "x sum under A");
    assert_close(x_series.1[1], 8.0, "x sum under B");

    let y_series = series.iter().find(|(name, _)| name == "y").unwrap();
    assert_close(y_series.1[1], 0.0, "missing y/B combination filled with 0");
}

fn test_rating_bins() {
    println!("\n====== Testing sum_by_rating_bins ======");

    let ratings = vec![3.8, 4.0, 4.2, 4.5, 4.9];
    let values = vec![10.0, 20.0, 30.0, 40.0, 50.0];

    let bins = sum_by_rating_bins(&ratings, &values);
    assert_eq!(bins.len(), 3);
    assert_eq!(bins[0].0, "(0.0, 4.0]");
    // 4.0 lands in the closed upper edge of the first bin
    assert_close(bins[0].1, 30.0, "low-rating bin sum");
    assert_close(bins[1].1, 70.0, "mid-rating bin sum");
    assert_close(bins[2].1, 50.0, "top-rating bin sum");
}

fn test_correlation() {
    println!("\n====== Testing correlation_matrix ======");

    let a = vec![1.0, 2.0, 3.0, 4.0];
    let b = vec![2.0, 4.0, 6.0, 8.0];
    let c = vec![4.0, 3.0, 2.0, 1.0];

    let matrix = correlation_matrix(&[&a, &b, &c]);
    assert_close(matrix[0][0], 1.0, "self correlation");
    assert_close(matrix[0][1], 1.0, "perfect positive correlation");
    assert_close(matrix[0][2], -1.0, "perfect negative correlation");
}

fn test_kde() {
    println!("\n====== Testing gaussian_kde ======");

    let samples = vec![1.0, 2.0, 2.0, 3.0, 10.0];
    let curve = gaussian_kde(&samples, 100);

    assert_eq!(curve.len(), 100);
    assert!(curve.iter().all(|&(_, d)| d >= 0.0));
    println!("✓ Density is non-negative over all {} points", curve.len());

    assert!(curve.windows(2).all(|w| w[0].0 < w[1].0));
    println!("✓ Evaluation grid is strictly increasing");

    let peak = curve
        .iter()
        .cloned()
        .fold((0.0, f64::MIN), |best, p| if p.1 > best.1 { p } else { best });
    assert!(
        peak.0 > 0.0 && peak.0 < 5.0,
        "density should peak near the sample cluster, peaked at {}",
        peak.0
    );
    println!("✓ Density peaks near the sample cluster (x = {:.2})", peak.0);
}

fn main() {
    println!("Running statistics tests...");

    test_summary_metrics();
    test_aggregations();
    test_grouped_aggregation();
    test_rating_bins();
    test_correlation();
    test_kde();

    println!("\nAll statistics tests passed!");
}
