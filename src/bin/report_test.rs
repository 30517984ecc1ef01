use freelytix::dataset::{Column, Dataset};
use freelytix::report::{CATALOG, MANIFEST_FILE, ReportGenerator, catalog_filenames};
use image::GenericImageView;
use std::collections::HashMap;
use std::time::SystemTime;

// Helper to collect artifact modification times
fn artifact_mtimes(dir: &std::path::Path) -> HashMap<String, SystemTime> {
    let mut times = HashMap::new();
    for name in catalog_filenames() {
        let path = dir.join(&name);
        if let Ok(meta) = std::fs::metadata(&path) {
            times.insert(name, meta.modified().unwrap());
        }
    }
    times
}

// A copy of the dataset with the Level column removed, as if an externally
// supplied file lacked it
fn dataset_without_level(full: &Dataset) -> Dataset {
    let mut columns = Vec::new();
    for header in full.headers() {
        if header == "Level" {
            continue;
        }
        if let Some(values) = full.text(header) {
            columns.push((header.as_str(), Column::Text(values.to_vec())));
        } else if let Some(values) = full.numeric(header) {
            columns.push((header.as_str(), Column::Numeric(values.to_vec())));
        }
    }
    Dataset::from_columns(columns).unwrap()
}

fn test_full_generation(dataset: &Dataset) {
    println!("\n====== Testing full chart generation ======");

    let dir = tempfile::tempdir().unwrap();
    let generator = ReportGenerator::new(dir.path());

    let outcome = generator.ensure_generated(dataset).unwrap();
    assert!(!outcome.cache_hit);
    assert_eq!(outcome.rendered, CATALOG.len());
    assert!(outcome.failures.is_empty(), "failures: {:?}", outcome.failures);
    println!("✓ All {} charts rendered with no failures", outcome.rendered);

    for name in catalog_filenames() {
        assert!(dir.path().join(&name).exists(), "missing artifact {}", name);
    }
    println!("✓ Every catalog artifact exists on disk");

    assert!(dir.path().join(MANIFEST_FILE).exists());
    println!("✓ Manifest written alongside the artifacts");

    // Decode a couple of artifacts to prove they are real PNGs
    let bar = image::open(dir.path().join("avg_price_category.png")).unwrap();
    assert_eq!(bar.dimensions(), (900, 600));
    println!("✓ avg_price_category.png decodes as a 900x600 PNG");

    let pairplot = image::open(dir.path().join("pairplot.png")).unwrap();
    assert_eq!(pairplot.dimensions(), (1000, 1000));
    println!("✓ pairplot.png decodes as a 1000x1000 PNG");

    // Second call must be a cache hit that rewrites nothing
    let before = artifact_mtimes(dir.path());
    let cached = generator.ensure_generated(dataset).unwrap();
    assert!(cached.cache_hit);
    assert_eq!(cached.rendered, 0);
    assert_eq!(cached.artifacts.len(), CATALOG.len());
    println!("✓ Second call reports a cache hit with 0 renders");

    let after = artifact_mtimes(dir.path());
    assert_eq!(before, after, "cache hit must not touch artifact files");
    println!("✓ No artifact file was rewritten on the cache hit");
}

fn test_determinism(dataset: &Dataset) {
    println!("\n====== Testing generation determinism ======");

    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    ReportGenerator::new(dir_a.path()).ensure_generated(dataset).unwrap();
    ReportGenerator::new(dir_b.path()).ensure_generated(dataset).unwrap();

    // Aggregation-only recipes must be byte-stable for the same dataset
    for name in ["avg_price_category.png", "total_earnings_gender.png"] {
        let left = std::fs::read(dir_a.path().join(name)).unwrap();
        let right = std::fs::read(dir_b.path().join(name)).unwrap();
        assert_eq!(left, right, "{} differs between identical runs", name);
        println!("✓ {} is byte-identical across runs", name);
    }
}

fn test_invalidation(dataset: &Dataset) {
    println!("\n====== Testing cache invalidation ======");

    let dir = tempfile::tempdir().unwrap();
    let generator = ReportGenerator::new(dir.path());
    generator.ensure_generated(dataset).unwrap();

    // Deleting one artifact must trigger a full regeneration
    std::fs::remove_file(dir.path().join("level_distribution.png")).unwrap();
    let outcome = generator.ensure_generated(dataset).unwrap();
    assert!(!outcome.cache_hit);
    assert_eq!(outcome.rendered, CATALOG.len());
    assert!(dir.path().join("level_distribution.png").exists());
    println!("✓ Deleting an artifact invalidates the cache");

    // A garbled manifest must also trigger regeneration instead of a panic
    std::fs::write(dir.path().join(MANIFEST_FILE), "not json at all").unwrap();
    let outcome = generator.ensure_generated(dataset).unwrap();
    assert!(!outcome.cache_hit);
    println!("✓ A garbled manifest forces regeneration");
}

fn test_failure_isolation(dataset: &Dataset) {
    println!("\n====== Testing per-chart failure isolation ======");

    let partial = dataset_without_level(dataset);
    let dir = tempfile::tempdir().unwrap();
    let generator = ReportGenerator::new(dir.path());

    let outcome = generator.ensure_generated(&partial).unwrap();
    assert!(!outcome.cache_hit);
    assert_eq!(outcome.failures.len(), 5, "failures: {:?}", outcome.failures);
    assert_eq!(outcome.rendered, CATALOG.len() - 5);
    println!("✓ Exactly the 5 Level charts failed, 20 rendered");

    for (output, error) in &outcome.failures {
        assert!(
            error.contains("Level"),
            "{} failed for an unexpected reason: {}",
            output,
            error
        );
        assert!(
            !dir.path().join(output).exists(),
            "failed recipe {} left a file behind",
            output
        );
    }
    println!("✓ Every failure names the missing Level column");

    // With failures recorded in the manifest, a second call is still a cache hit
    let cached = generator.ensure_generated(&partial).unwrap();
    assert!(cached.cache_hit);
    assert_eq!(cached.failures.len(), 5);
    println!("✓ Recorded failures count toward cache coverage");
}

fn main() {
    println!("Running report generation tests...");

    // A modest row count keeps the run quick while exercising every recipe
    let dataset = Dataset::synthetic(150, 7);

    test_full_generation(&dataset);
    test_determinism(&dataset);
    test_invalidation(&dataset);
    test_failure_isolation(&dataset);

    println!("\nAll report generation tests passed!");
}
