use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use thiserror::Error;

/// Random seed used for the synthetic dataset so repeated runs are stable
pub const SYNTHETIC_SEED: u64 = 42;

/// Closed set of listing categories
pub const CATEGORIES: [&str; 5] = [
    "Graphic Design",
    "Digital Marketing",
    "Writing",
    "Video Editing",
    "Programming",
];

/// Closed set of seller genders
pub const GENDERS: [&str; 2] = ["Male", "Female"];

/// Languages offered by sellers in the synthetic dataset
pub const LANGUAGES: [&str; 5] = ["English", "Spanish", "French", "German", "Hindi"];

/// Closed set of seller levels
pub const LEVELS: [&str; 4] = ["New Seller", "Level 1", "Level 2", "Top Rated"];

/// Errors raised while loading or writing the dataset file
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The dataset file could not be read or written
    #[error("dataset file error: {0}")]
    Io(#[from] std::io::Error),

    /// The dataset file exists but contains no rows at all
    #[error("dataset file is empty")]
    Empty,

    /// A data row does not line up with the header
    #[error("row {row} has {found} fields, expected {expected}")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },

    /// Columns handed to the in-memory constructor have unequal lengths
    #[error("column `{column}` has {found} values, expected {expected}")]
    UnevenColumn {
        column: String,
        found: usize,
        expected: usize,
    },
}

/// A single typed column of the dataset
#[derive(Debug, Clone)]
pub enum Column {
    /// Categorical / free-text values
    Text(Vec<String>),

    /// Numeric values (integers are widened to f64)
    Numeric(Vec<f64>),
}

impl Column {
    fn len(&self) -> usize {
        match self {
            Column::Text(v) => v.len(),
            Column::Numeric(v) => v.len(),
        }
    }
}

/// The immutable in-memory table of freelancer listings
///
/// Loaded once at process start and never mutated afterwards, so it can be
/// shared across request handlers without locking. Column accessors return
/// `Option` so a recipe referencing a column that an externally supplied file
/// lacks can fail on its own instead of panicking.
#[derive(Debug, Clone)]
pub struct Dataset {
    headers: Vec<String>,
    columns: HashMap<String, Column>,
    len: usize,
}

impl Dataset {
    /// Build a dataset directly from named columns
    ///
    /// Mostly useful for tests and for the synthetic generator. All columns
    /// must have the same length.
    ///
    /// # Returns
    /// * `Result<Dataset, DatasetError>` - The dataset or a length mismatch error
    pub fn from_columns(columns: Vec<(&str, Column)>) -> Result<Self, DatasetError> {
        let len = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
        let mut headers = Vec::with_capacity(columns.len());
        let mut map = HashMap::with_capacity(columns.len());

        for (name, column) in columns {
            if column.len() != len {
                return Err(DatasetError::UnevenColumn {
                    column: name.to_string(),
                    found: column.len(),
                    expected: len,
                });
            }
            headers.push(name.to_string());
            map.insert(name.to_string(), column);
        }

        Ok(Dataset {
            headers,
            columns: map,
            len,
        })
    }

    /// Load a dataset from a delimited text file
    ///
    /// The first line is the header. Quoted fields with embedded commas,
    /// doubled quotes and newlines-in-values are not split naively; parsing
    /// follows the usual CSV quoting rules. A column is typed numeric when
    /// every one of its values parses as a float.
    ///
    /// # Arguments
    /// * `path` - Path of the CSV file
    ///
    /// # Returns
    /// * `Result<Dataset, DatasetError>` - The loaded dataset or an error
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let lines: Vec<String> = reader.lines().collect::<Result<_, _>>()?;

        if lines.is_empty() {
            return Err(DatasetError::Empty);
        }

        let headers = parse_csv_row(&lines[0]);
        let expected = headers.len();
        let mut raw: Vec<Vec<String>> = vec![Vec::with_capacity(lines.len() - 1); expected];

        for (i, line) in lines.iter().enumerate().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            let fields = parse_csv_row(line);
            if fields.len() != expected {
                return Err(DatasetError::RaggedRow {
                    row: i + 1,
                    found: fields.len(),
                    expected,
                });
            }
            for (c, field) in fields.into_iter().enumerate() {
                raw[c].push(field);
            }
        }

        let len = raw.first().map(|c| c.len()).unwrap_or(0);
        let mut columns = HashMap::with_capacity(expected);

        for (header, values) in headers.iter().zip(raw.into_iter()) {
            columns.insert(header.clone(), type_column(values));
        }

        Ok(Dataset {
            headers,
            columns,
            len,
        })
    }

    /// Load the dataset from `path`, synthesizing and persisting it if absent
    ///
    /// This is the self-healing entry point used at startup: a missing file is
    /// not an error, it just means a deterministic synthetic dataset of
    /// `sample_size` rows is generated (fixed seed) and written to `path` so
    /// subsequent runs see the same data.
    pub fn load_or_create(path: impl AsRef<Path>, sample_size: usize) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        if path.exists() {
            log::info!("loading dataset from {}", path.display());
            Self::from_csv(path)
        } else {
            log::info!(
                "dataset file {} missing, generating {} synthetic rows",
                path.display(),
                sample_size
            );
            let dataset = Self::synthetic(sample_size, SYNTHETIC_SEED);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            dataset.write_csv(path)?;
            Ok(dataset)
        }
    }

    /// Generate a deterministic synthetic dataset
    ///
    /// Distribution shapes follow the real data: uniform ratings in
    /// [3.5, 5.0], exponential earnings and response times, uniform prices,
    /// Poisson review and order counts, uniform draws over the categorical
    /// sets. A fixed `seed` makes the output reproducible.
    pub fn synthetic(rows: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let mut category = Vec::with_capacity(rows);
        let mut rating = Vec::with_capacity(rows);
        let mut earning = Vec::with_capacity(rows);
        let mut gender = Vec::with_capacity(rows);
        let mut language = Vec::with_capacity(rows);
        let mut price = Vec::with_capacity(rows);
        let mut reviews = Vec::with_capacity(rows);
        let mut orders = Vec::with_capacity(rows);
        let mut level = Vec::with_capacity(rows);
        let mut response = Vec::with_capacity(rows);

        for _ in 0..rows {
            category.push(choose(&mut rng, &CATEGORIES));
            rating.push(round_to(rng.gen_range(3.5..5.0), 1));
            earning.push(round_to(exponential(&mut rng, 500.0), 2));
            gender.push(choose(&mut rng, &GENDERS));
            language.push(choose(&mut rng, &LANGUAGES));
            price.push(round_to(rng.gen_range(5.0..500.0), 2));
            reviews.push(poisson(&mut rng, 25.0));
            orders.push(poisson(&mut rng, 25.0));
            level.push(choose(&mut rng, &LEVELS));
            response.push(round_to(exponential(&mut rng, 5.0), 1));
        }

        // The column set covers everything the chart catalog references
        Dataset::from_columns(vec![
            ("Category", Column::Text(category)),
            ("Rating", Column::Numeric(rating)),
            ("Total_Earning", Column::Numeric(earning)),
            ("Gender", Column::Text(gender)),
            ("Language", Column::Text(language)),
            ("Price", Column::Numeric(price)),
            ("Review_Count", Column::Numeric(reviews)),
            ("Orders_Completed", Column::Numeric(orders)),
            ("Level", Column::Text(level)),
            ("Response_Time", Column::Numeric(response)),
        ])
        .expect("synthetic columns have equal lengths")
    }

    /// Write the dataset out as CSV
    ///
    /// Fields containing commas, quotes or newlines are quoted and escaped so
    /// the file round-trips through `from_csv`.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), DatasetError> {
        let mut out = String::new();

        for (i, header) in self.headers.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&escape_csv_field(header));
        }
        out.push('\n');

        for row in 0..self.len {
            for (i, header) in self.headers.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let field = match &self.columns[header] {
                    Column::Text(v) => escape_csv_field(&v[row]),
                    Column::Numeric(v) => format!("{}", v[row]),
                };
                out.push_str(&field);
            }
            out.push('\n');
        }

        let mut file = File::create(path)?;
        file.write_all(out.as_bytes())?;
        Ok(())
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the dataset holds no rows
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Header names in file order
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// True when a column of this name exists (of either type)
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Numeric column values, or `None` when absent or non-numeric
    pub fn numeric(&self, name: &str) -> Option<&[f64]> {
        match self.columns.get(name) {
            Some(Column::Numeric(v)) => Some(v),
            _ => None,
        }
    }

    /// Text column values, or `None` when absent or numeric
    pub fn text(&self, name: &str) -> Option<&[String]> {
        match self.columns.get(name) {
            Some(Column::Text(v)) => Some(v),
            _ => None,
        }
    }

    /// Column values as group labels
    ///
    /// Text columns are returned as-is; numeric columns are formatted, which
    /// lets a numeric column such as `Rating` act as a group key.
    pub fn labels(&self, name: &str) -> Option<Vec<String>> {
        match self.columns.get(name)? {
            Column::Text(v) => Some(v.clone()),
            Column::Numeric(v) => Some(v.iter().map(|x| format!("{}", x)).collect()),
        }
    }

    /// Names of all numeric columns, in header order
    pub fn numeric_column_names(&self) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|h| matches!(self.columns.get(h.as_str()), Some(Column::Numeric(_))))
            .map(|h| h.as_str())
            .collect()
    }
}

fn choose(rng: &mut StdRng, set: &[&str]) -> String {
    set[rng.gen_range(0..set.len())].to_string()
}

// Inverse-CDF draw from an exponential distribution with the given mean
fn exponential(rng: &mut StdRng, mean: f64) -> f64 {
    let u: f64 = rng.gen_range(0.0..1.0);
    -mean * (1.0 - u).ln()
}

// Knuth's method; fine for the small means used here
fn poisson(rng: &mut StdRng, lambda: f64) -> f64 {
    let limit = (-lambda).exp();
    let mut k = 0u64;
    let mut p = 1.0;
    loop {
        p *= rng.gen_range(0.0..1.0f64);
        if p <= limit {
            return k as f64;
        }
        k += 1;
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

fn type_column(values: Vec<String>) -> Column {
    let numeric = !values.is_empty()
        && values
            .iter()
            .all(|v| !v.trim().is_empty() && v.trim().parse::<f64>().is_ok());

    if numeric {
        Column::Numeric(
            values
                .iter()
                .map(|v| v.trim().parse::<f64>().unwrap_or(0.0))
                .collect(),
        )
    } else {
        Column::Text(values)
    }
}

// Parse a CSV row into fields, honoring quoting and doubled quotes
fn parse_csv_row(line: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current_field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if let Some(&next) = chars.peek() {
                    if next == '"' && in_quotes {
                        current_field.push('"');
                        chars.next();
                    } else {
                        in_quotes = !in_quotes;
                    }
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => {
                result.push(current_field);
                current_field = String::new();
            }
            _ => {
                current_field.push(c);
            }
        }
    }

    result.push(current_field);
    result
}

fn escape_csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_row_dataset() -> Dataset {
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
    fn from_columns_rejects_uneven_lengths() {
        let err = Dataset::from_columns(vec![
            ("A", Column::Numeric(vec![1.0, 2.0])),
            ("B", Column::Numeric(vec![1.0])),
        ])
        .unwrap_err();
        assert!(matches!(err, DatasetError::UnevenColumn { .. }));
    }

    #[test]
    fn missing_column_accessors_return_none() {
        let ds = three_row_dataset();
        assert!(ds.numeric("Review_Count").is_none());
        assert!(ds.text("Level").is_none());
        assert!(ds.labels("Level").is_none());
        assert!(!ds.has_column("Level"));
    }

    #[test]
    fn numeric_column_can_act_as_labels() {
        let ds = three_row_dataset();
        assert_eq!(
            ds.labels("Rating").unwrap(),
            vec!["4".to_string(), "5".to_string(), "3.5".to_string()]
        );
    }

    #[test]
    fn csv_round_trip_preserves_quoted_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quoted.csv");

        let ds = Dataset::from_columns(vec![
            (
                "Category",
                Column::Text(vec![
                    "Writing, Editing".to_string(),
                    "Say \"hi\"".to_string(),
                ]),
            ),
            ("Price", Column::Numeric(vec![19.99, 5.0])),
        ])
        .unwrap();

        ds.write_csv(&path).unwrap();
        let reloaded = Dataset::from_csv(&path).unwrap();

        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.text("Category").unwrap()[0], "Writing, Editing");
        assert_eq!(reloaded.text("Category").unwrap()[1], "Say \"hi\"");
        assert_eq!(reloaded.numeric("Price").unwrap(), &[19.99, 5.0]);
    }

    #[test]
    fn synthetic_generation_is_deterministic() {
        let a = Dataset::synthetic(50, SYNTHETIC_SEED);
        let b = Dataset::synthetic(50, SYNTHETIC_SEED);

        assert_eq!(a.len(), 50);
        assert_eq!(a.text("Category").unwrap(), b.text("Category").unwrap());
        assert_eq!(a.numeric("Rating").unwrap(), b.numeric("Rating").unwrap());
        assert_eq!(
            a.numeric("Total_Earning").unwrap(),
            b.numeric("Total_Earning").unwrap()
        );
    }

    #[test]
    fn synthetic_values_stay_in_range() {
        let ds = Dataset::synthetic(200, SYNTHETIC_SEED);

        assert!(ds
            .numeric("Rating")
            .unwrap()
            .iter()
            .all(|&r| (3.5..=5.0).contains(&r)));
        assert!(ds.numeric("Price").unwrap().iter().all(|&p| p >= 5.0));
        assert!(ds.numeric("Total_Earning").unwrap().iter().all(|&e| e >= 0.0));
        assert!(ds
            .text("Level")
            .unwrap()
            .iter()
            .all(|l| LEVELS.contains(&l.as_str())));
    }

    #[test]
    fn load_or_create_persists_the_synthetic_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("listings.csv");

        let first = Dataset::load_or_create(&path, 30).unwrap();
        assert!(path.exists());

        let second = Dataset::load_or_create(&path, 9999).unwrap();
        // Second run must read the persisted file, not regenerate
        assert_eq!(second.len(), 30);
        assert_eq!(
            first.text("Category").unwrap(),
            second.text("Category").unwrap()
        );
    }

    #[test]
    fn blank_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gaps.csv");
        std::fs::write(&path, "A,B\n1,x\n\n2,y\n").unwrap();

        let ds = Dataset::from_csv(&path).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.numeric("A").unwrap(), &[1.0, 2.0]);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ragged.csv");
        std::fs::write(&path, "A,B\n1,x,extra\n").unwrap();

        let err = Dataset::from_csv(&path).unwrap_err();
        assert!(matches!(err, DatasetError::RaggedRow { row: 2, .. }));
    }
}
