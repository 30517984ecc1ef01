use crate::charts::{self, ChartStyle, FIVERR_GREEN, SLATE_BLUE};
use crate::dataset::Dataset;
use crate::stats::{self, Aggregate};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Name of the cache-state file kept next to the artifacts
pub const MANIFEST_FILE: &str = "manifest.json";

/// Errors raised while generating a single recipe or the batch bookkeeping
#[derive(Debug, Error)]
pub enum ReportError {
    /// The recipe references a column the dataset does not have
    #[error("column `{0}` is missing from the dataset")]
    MissingColumn(String),

    /// Matrix recipes need at least two numeric columns to say anything
    #[error("need at least two numeric columns, found {0}")]
    NotEnoughNumeric(usize),

    /// The plotting backend failed to render or write the image
    #[error("failed to render chart: {0}")]
    Render(String),

    /// Output directory or manifest I/O failed
    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The manifest could not be serialized
    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// How a recipe reduces its grouped values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Mean,
    Max,
    /// Row counts per group; needs no value column
    Count,
    /// Kernel density estimate over the value-count frequencies
    KernelDensity,
}

/// How a recipe's aggregate is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Bar,
    GroupedBar,
    BoxVertical,
    BoxHorizontal,
    DensityCurve,
    CorrelationMatrix,
    ScatterMatrix,
    /// Bar over the fixed rating bins (0, 4], (4, 4.5], (4.5, 5]
    RatingBins,
}

/// Ordering applied to a bar recipe's groups before rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    ByKey,
    ValueAscending,
    ValueDescending,
}

/// Alternating accent color for a recipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accent {
    Green,
    Slate,
}

/// One chart definition: a data record, not bespoke code
///
/// The whole gallery is the fixed catalog of these descriptors, consumed by
/// one dispatcher. Filenames fully determine artifact identity and recipes
/// are independent, so generation order does not matter.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub output: &'static str,
    pub title: &'static str,
    pub x_label: &'static str,
    pub y_label: &'static str,
    pub group_keys: &'static [&'static str],
    pub value_column: Option<&'static str>,
    pub aggregation: Aggregation,
    pub chart: ChartKind,
    pub sort: SortOrder,
    pub accent: Accent,
}

impl Recipe {
    /// Columns this recipe cannot run without
    ///
    /// The matrix recipes return an empty list here; they operate on whatever
    /// numeric columns are present and check their own minimum instead.
    pub fn required_columns(&self) -> Vec<&'static str> {
        let mut cols: Vec<&'static str> = self.group_keys.to_vec();
        if let Some(value) = self.value_column {
            cols.push(value);
        }
        cols
    }
}

macro_rules! recipe {
    ($output:expr, $title:expr, $x:expr, $y:expr, $keys:expr, $value:expr,
     $agg:ident, $chart:ident, $sort:ident, $accent:ident) => {
        Recipe {
            output: $output,
            title: $title,
            x_label: $x,
            y_label: $y,
            group_keys: $keys,
            value_column: $value,
            aggregation: Aggregation::$agg,
            chart: ChartKind::$chart,
            sort: SortOrder::$sort,
            accent: Accent::$accent,
        }
    };
}

/// The fixed chart catalog driving the gallery
#[rustfmt::skip]
pub const CATALOG: [Recipe; 25] = [
    recipe!("pairplot.png", "Pairwise Relationships", "", "",
            &[], None, Count, ScatterMatrix, ByKey, Green),
    recipe!("correlation_heatmap.png", "Correlation Heatmap", "", "",
            &[], None, Count, CorrelationMatrix, ByKey, Green),
    recipe!("earnings_by_rating.png", "Total Earnings by Rating Groups", "Rating Range", "Total Earnings ($)",
            &["Rating"], Some("Total_Earning"), Sum, RatingBins, ByKey, Green),
    recipe!("avg_price_gender.png", "Average Price by Gender", "Gender", "Avg Price ($)",
            &["Gender"], Some("Price"), Mean, Bar, ByKey, Slate),
    recipe!("avg_reviews_gender.png", "Average Review Count by Gender", "Gender", "Avg Reviews",
            &["Gender"], Some("Review_Count"), Mean, Bar, ValueAscending, Green),
    recipe!("total_earnings_gender.png", "Total Earnings by Gender", "Gender", "Total Earnings ($)",
            &["Gender"], Some("Total_Earning"), Sum, Bar, ValueAscending, Slate),
    recipe!("avg_rating_level.png", "Average Rating by Level", "Level", "Avg Rating",
            &["Level"], Some("Rating"), Mean, Bar, ValueAscending, Green),
    recipe!("avg_reviews_level.png", "Average Review Count by Level", "Level", "Avg Reviews",
            &["Level"], Some("Review_Count"), Mean, Bar, ValueAscending, Slate),
    recipe!("reviews_by_rating.png", "Total Reviews by Rating", "Rating", "Total Reviews",
            &["Rating"], Some("Review_Count"), Sum, Bar, ValueAscending, Green),
    recipe!("price_boxplot_level.png", "Price Distribution by Level", "Level", "Price ($)",
            &["Level"], Some("Price"), Count, BoxVertical, ByKey, Green),
    recipe!("earnings_boxplot_gender.png", "Earnings Distribution by Gender", "Total Earnings ($)", "Gender",
            &["Gender"], Some("Total_Earning"), Count, BoxHorizontal, ByKey, Green),
    recipe!("reviews_boxplot_gender.png", "Review Count Distribution by Gender", "Review Count", "Gender",
            &["Gender"], Some("Review_Count"), Count, BoxHorizontal, ByKey, Green),
    recipe!("price_boxplot_gender.png", "Price Distribution by Gender", "Price ($)", "Gender",
            &["Gender"], Some("Price"), Count, BoxHorizontal, ByKey, Green),
    recipe!("ratings_by_category.png", "Total Ratings by Category", "Category", "Total Rating",
            &["Category"], Some("Rating"), Sum, Bar, ByKey, Green),
    recipe!("avg_rating_category.png", "Average Rating by Category", "Category", "Avg Rating",
            &["Category"], Some("Rating"), Mean, Bar, ByKey, Slate),
    recipe!("avg_earnings_category.png", "Average Earnings by Category", "Category", "Avg Earnings ($)",
            &["Category"], Some("Total_Earning"), Mean, Bar, ValueAscending, Green),
    recipe!("max_earnings_category.png", "Max Earnings by Category", "Category", "Max Earnings ($)",
            &["Category"], Some("Total_Earning"), Max, Bar, ValueAscending, Slate),
    recipe!("total_earnings_category.png", "Total Earnings by Category", "Category", "Total Earnings ($)",
            &["Category"], Some("Total_Earning"), Sum, Bar, ValueAscending, Green),
    recipe!("total_reviews_category.png", "Total Reviews by Category", "Category", "Total Reviews",
            &["Category"], Some("Review_Count"), Sum, Bar, ValueAscending, Slate),
    recipe!("avg_price_category.png", "Average Price by Category", "Category", "Avg Price ($)",
            &["Category"], Some("Price"), Mean, Bar, ValueAscending, Green),
    recipe!("category_gender_count.png", "Category Distribution by Gender", "Category", "Count",
            &["Category", "Gender"], None, Count, GroupedBar, ByKey, Green),
    recipe!("price_category_gender.png", "Price by Category & Gender", "Category", "Avg Price ($)",
            &["Category", "Gender"], Some("Price"), Mean, GroupedBar, ByKey, Green),
    recipe!("price_level_gender.png", "Price by Level & Gender", "Level", "Avg Price ($)",
            &["Level", "Gender"], Some("Price"), Mean, GroupedBar, ByKey, Green),
    recipe!("review_count_kde.png", "KDE Distribution of Review Counts", "Review Count Frequency", "Density",
            &[], Some("Review_Count"), KernelDensity, DensityCurve, ByKey, Green),
    recipe!("level_distribution.png", "Distribution of Levels", "Level", "Count",
            &["Level"], None, Count, Bar, ValueDescending, Slate),
];

/// Filenames of every artifact the catalog produces, sorted
pub fn catalog_filenames() -> Vec<String> {
    let mut names: Vec<String> = CATALOG.iter().map(|r| r.output.to_string()).collect();
    names.sort();
    names
}

/// Cache-state record written next to the artifacts
///
/// This replaces "directory contains any png" as the generation-skip signal:
/// the cache is valid only when the manifest covers the current catalog and
/// every artifact it claims actually exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactManifest {
    /// Artifact filenames successfully rendered
    pub generated: Vec<String>,

    /// Recipes that failed, with the error text
    pub failed: Vec<FailedRecipe>,
}

/// One failed recipe as recorded in the manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedRecipe {
    pub output: String,
    pub error: String,
}

/// Result of one `ensure_generated` call
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    /// Sorted artifact filenames present after the call
    pub artifacts: Vec<String>,

    /// Number of files actually rendered by this call (0 on a cache hit)
    pub rendered: usize,

    /// Per-recipe failures, as (output filename, error text)
    pub failures: Vec<(String, String)>,

    /// True when the existing artifacts were reused untouched
    pub cache_hit: bool,
}

/// Lazily generates the chart catalog into an output directory
///
/// The check-then-generate sequence is guarded by a mutex so two concurrent
/// first requests cannot double-render the batch. The dataset itself is
/// immutable and needs no locking.
pub struct ReportGenerator {
    out_dir: PathBuf,
    guard: Mutex<()>,
}

impl ReportGenerator {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        ReportGenerator {
            out_dir: out_dir.into(),
            guard: Mutex::new(()),
        }
    }

    /// Directory the artifacts are written to
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Ensure the artifact set exists, generating it on first call
    ///
    /// On a cache hit no artifact file is rewritten. Failed recipes are
    /// isolated: they are logged, recorded in the outcome and the manifest,
    /// and the rest of the batch still renders.
    pub fn ensure_generated(&self, dataset: &Dataset) -> Result<GenerationOutcome, ReportError> {
        let _lock = self.guard.lock().unwrap();

        fs::create_dir_all(&self.out_dir)?;

        if let Some(outcome) = self.cached_outcome() {
            log::debug!("artifact cache hit, {} charts present", outcome.artifacts.len());
            return Ok(outcome);
        }

        self.generate(dataset)
    }

    // Validate the manifest against the current catalog and the filesystem
    fn cached_outcome(&self) -> Option<GenerationOutcome> {
        let raw = fs::read_to_string(self.out_dir.join(MANIFEST_FILE)).ok()?;
        let manifest: ArtifactManifest = match serde_json::from_str(&raw) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("ignoring unreadable artifact manifest: {}", e);
                return None;
            }
        };

        let mut covered: Vec<String> = manifest
            .generated
            .iter()
            .cloned()
            .chain(manifest.failed.iter().map(|f| f.output.clone()))
            .collect();
        covered.sort();
        covered.dedup();

        if covered != catalog_filenames() {
            log::info!("artifact manifest does not match the catalog, regenerating");
            return None;
        }

        if !manifest
            .generated
            .iter()
            .all(|name| self.out_dir.join(name).exists())
        {
            log::info!("artifact files are missing, regenerating");
            return None;
        }

        let mut artifacts = manifest.generated.clone();
        artifacts.sort();

        Some(GenerationOutcome {
            artifacts,
            rendered: 0,
            failures: manifest
                .failed
                .iter()
                .map(|f| (f.output.clone(), f.error.clone()))
                .collect(),
            cache_hit: true,
        })
    }

    // Run every recipe, isolating per-recipe failures
    fn generate(&self, dataset: &Dataset) -> Result<GenerationOutcome, ReportError> {
        let mut generated = Vec::new();
        let mut failed = Vec::new();

        for recipe in CATALOG.iter() {
            match render_recipe(dataset, recipe, &self.out_dir.join(recipe.output)) {
                Ok(()) => generated.push(recipe.output.to_string()),
                Err(e) => {
                    log::warn!("chart {} failed: {}", recipe.output, e);
                    failed.push(FailedRecipe {
                        output: recipe.output.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let manifest = ArtifactManifest {
            generated: generated.clone(),
            failed: failed.clone(),
        };
        fs::write(
            self.out_dir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest)?,
        )?;

        log::info!(
            "generated {} charts, {} failed",
            generated.len(),
            failed.len()
        );

        let mut artifacts = generated;
        artifacts.sort();

        Ok(GenerationOutcome {
            rendered: artifacts.len(),
            failures: failed.into_iter().map(|f| (f.output, f.error)).collect(),
            artifacts,
            cache_hit: false,
        })
    }
}

/// Render one recipe to `path`
///
/// Missing required columns fail here, before any drawing happens, so a
/// partial dataset degrades to a partial gallery instead of a dead page.
pub fn render_recipe(dataset: &Dataset, recipe: &Recipe, path: &Path) -> Result<(), ReportError> {
    for column in recipe.required_columns() {
        if !dataset.has_column(column) {
            return Err(ReportError::MissingColumn(column.to_string()));
        }
    }

    let style = recipe_style(recipe);

    match recipe.chart {
        ChartKind::Bar => {
            let keys = group_labels(dataset, recipe.group_keys[0])?;
            let mut entries = match recipe.value_column {
                Some(column) => {
                    let values = numeric_column(dataset, column)?;
                    stats::aggregate_by(&keys, values, base_aggregate(recipe.aggregation))
                }
                None => stats::value_counts(&keys),
            };
            apply_sort(&mut entries, recipe.sort);
            charts::save_bar_chart(&entries, &style, path).map_err(render_err)
        }
        ChartKind::RatingBins => {
            let ratings = numeric_column(dataset, recipe.group_keys[0])?;
            let values = numeric_column(dataset, recipe.value_column.unwrap_or_default())?;
            let entries = stats::sum_by_rating_bins(ratings, values);
            charts::save_bar_chart(&entries, &style, path).map_err(render_err)
        }
        ChartKind::GroupedBar => {
            let outer = group_labels(dataset, recipe.group_keys[0])?;
            let inner = group_labels(dataset, recipe.group_keys[1])?;
            let values = match recipe.value_column {
                Some(column) => numeric_column(dataset, column)?.to_vec(),
                None => vec![0.0; outer.len()],
            };
            let (labels, series) = stats::aggregate_by_two(
                &outer,
                &inner,
                &values,
                base_aggregate(recipe.aggregation),
            );
            charts::save_grouped_bar_chart(&labels, &series, &style, path).map_err(render_err)
        }
        ChartKind::BoxVertical | ChartKind::BoxHorizontal => {
            let keys = group_labels(dataset, recipe.group_keys[0])?;
            let values = numeric_column(dataset, recipe.value_column.unwrap_or_default())?;
            let groups = split_groups(&keys, values);
            if recipe.chart == ChartKind::BoxVertical {
                charts::save_box_plot(&groups, &style, path).map_err(render_err)
            } else {
                charts::save_box_plot_horizontal(&groups, &style, path).map_err(render_err)
            }
        }
        ChartKind::DensityCurve => {
            let values = numeric_column(dataset, recipe.value_column.unwrap_or_default())?;
            let labels: Vec<String> = values.iter().map(|v| format!("{}", v)).collect();
            // Density of the frequency values, not of the raw samples
            let frequencies: Vec<f64> = stats::value_counts(&labels)
                .into_iter()
                .map(|(_, count)| count)
                .collect();
            let curve = stats::gaussian_kde(&frequencies, 200);
            charts::save_density_curve(&curve, &style, path).map_err(render_err)
        }
        ChartKind::CorrelationMatrix => {
            let (names, columns) = numeric_matrix(dataset)?;
            let refs: Vec<&[f64]> = columns.iter().map(|c| c.as_slice()).collect();
            let matrix = stats::correlation_matrix(&refs);
            charts::save_correlation_heatmap(&names, &matrix, &style, path).map_err(render_err)
        }
        ChartKind::ScatterMatrix => {
            let (names, columns) = numeric_matrix(dataset)?;
            charts::save_scatter_matrix(&names, &columns, &style, path).map_err(render_err)
        }
    }
}

fn recipe_style(recipe: &Recipe) -> ChartStyle {
    let color = match recipe.accent {
        Accent::Green => FIVERR_GREEN,
        Accent::Slate => SLATE_BLUE,
    };
    let (width, height) = match recipe.chart {
        ChartKind::ScatterMatrix => (1000, 1000),
        ChartKind::CorrelationMatrix => (800, 640),
        ChartKind::GroupedBar => (1000, 600),
        _ => (900, 600),
    };

    ChartStyle {
        title: recipe.title.to_string(),
        x_label: recipe.x_label.to_string(),
        y_label: recipe.y_label.to_string(),
        width,
        height,
        color,
    }
}

fn base_aggregate(agg: Aggregation) -> Aggregate {
    match agg {
        Aggregation::Sum => Aggregate::Sum,
        Aggregation::Mean => Aggregate::Mean,
        Aggregation::Max => Aggregate::Max,
        Aggregation::Count | Aggregation::KernelDensity => Aggregate::Count,
    }
}

// total_cmp keeps a NaN aggregate (possible in a degraded user-supplied
// file) from panicking out of the per-recipe isolation
fn apply_sort(entries: &mut [(String, f64)], sort: SortOrder) {
    match sort {
        SortOrder::ByKey => entries.sort_by(|a, b| a.0.cmp(&b.0)),
        SortOrder::ValueAscending => {
            entries.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
        }
        SortOrder::ValueDescending => {
            entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        }
    }
}

fn split_groups(keys: &[String], values: &[f64]) -> Vec<(String, Vec<f64>)> {
    let mut labels: Vec<String> = keys.to_vec();
    labels.sort();
    labels.dedup();

    labels
        .into_iter()
        .map(|label| {
            let members = keys
                .iter()
                .zip(values.iter())
                .filter(|(k, _)| **k == label)
                .map(|(_, v)| *v)
                .collect();
            (label, members)
        })
        .collect()
}

fn group_labels(dataset: &Dataset, column: &str) -> Result<Vec<String>, ReportError> {
    dataset
        .labels(column)
        .ok_or_else(|| ReportError::MissingColumn(column.to_string()))
}

fn numeric_column<'a>(dataset: &'a Dataset, column: &str) -> Result<&'a [f64], ReportError> {
    dataset
        .numeric(column)
        .ok_or_else(|| ReportError::MissingColumn(column.to_string()))
}

fn numeric_matrix(dataset: &Dataset) -> Result<(Vec<String>, Vec<Vec<f64>>), ReportError> {
    let names = dataset.numeric_column_names();
    if names.len() < 2 {
        return Err(ReportError::NotEnoughNumeric(names.len()));
    }
    let columns = names
        .iter()
        .map(|name| dataset.numeric(name).unwrap_or(&[]).to_vec())
        .collect();
    Ok((names.into_iter().map(String::from).collect(), columns))
}

fn render_err(e: Box<dyn std::error::Error>) -> ReportError {
    ReportError::Render(e.to_string())
}
