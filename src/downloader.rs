use crate::dataset::Dataset;
use rust_xlsxwriter::Workbook;
use std::error::Error;
use std::path::Path;

/// Raw bytes of the backing dataset file
///
/// The CSV download serves the source file untouched, so formatting in
/// externally supplied files (trailing zeros like `4.10`, quoting choices)
/// survives the trip instead of going through a parse/re-serialize cycle.
///
/// # Arguments
/// * `path` - Path of the dataset file
///
/// # Returns
/// * `std::io::Result<Vec<u8>>` - The file contents or an I/O error
pub fn source_csv(path: impl AsRef<Path>) -> std::io::Result<Vec<u8>> {
    std::fs::read(path)
}

/// Convert the dataset to CSV format
///
/// This function exports the listings table to CSV (Comma-Separated Values)
/// format. It creates a string with the dataset contents where:
/// - The first line holds the column headers
/// - Values are comma-separated
/// - Special characters (commas, quotes, newlines) are properly escaped
///
/// # Arguments
/// * `dataset` - Reference to the dataset to convert
///
/// # Returns
/// * `Result<String, Box<dyn Error>>` - CSV content as a string or an error
pub fn to_csv(dataset: &Dataset) -> Result<String, Box<dyn Error>> {
    let mut csv_content = String::new();

    for (i, header) in dataset.headers().iter().enumerate() {
        if i > 0 {
            csv_content.push(',');
        }
        csv_content.push_str(&escape_field(header));
    }
    csv_content.push('\n');

    for row in 0..dataset.len() {
        for (i, header) in dataset.headers().iter().enumerate() {
            if i > 0 {
                csv_content.push(',');
            }
            if let Some(values) = dataset.text(header) {
                csv_content.push_str(&escape_field(&values[row]));
            } else if let Some(values) = dataset.numeric(header) {
                csv_content.push_str(&format!("{}", values[row]));
            }
        }
        csv_content.push('\n');
    }

    Ok(csv_content)
}

/// Convert the dataset to XLSX format
///
/// This function exports the listings table to XLSX (Excel) format using the
/// rust_xlsxwriter library, with headers in the first row and numeric columns
/// written as numbers so spreadsheet applications can aggregate them.
///
/// # Arguments
/// * `dataset` - Reference to the dataset to convert
///
/// # Returns
/// * `Result<Vec<u8>, Box<dyn Error>>` - XLSX file content as bytes or an error
pub fn to_xlsx(dataset: &Dataset) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col, header) in dataset.headers().iter().enumerate() {
        worksheet.write_string(0, col as u16, header)?;
    }

    for (col, header) in dataset.headers().iter().enumerate() {
        if let Some(values) = dataset.text(header) {
            for (row, value) in values.iter().enumerate() {
                worksheet.write_string(row as u32 + 1, col as u16, value)?;
            }
        } else if let Some(values) = dataset.numeric(header) {
            for (row, value) in values.iter().enumerate() {
                worksheet.write_number(row as u32 + 1, col as u16, *value)?;
            }
        }
    }

    let buffer = workbook.save_to_buffer()?;
    Ok(buffer)
}

fn escape_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Column;

    fn sample() -> Dataset {
        Dataset::from_columns(vec![
            (
                "Category",
                Column::Text(vec!["Writing, Editing".to_string(), "Design".to_string()]),
            ),
            ("Price", Column::Numeric(vec![19.99, 5.0])),
        ])
        .unwrap()
    }

    #[test]
    fn csv_escapes_embedded_commas() {
        let csv = to_csv(&sample()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "Category,Price");
        assert_eq!(lines[1], "\"Writing, Editing\",19.99");
        assert_eq!(lines[2], "Design,5");
    }

    #[test]
    fn csv_doubles_embedded_quotes() {
        let ds = Dataset::from_columns(vec![(
            "Note",
            Column::Text(vec!["Say \"hi\"".to_string()]),
        )])
        .unwrap();

        let csv = to_csv(&ds).unwrap();
        assert_eq!(csv.lines().nth(1).unwrap(), "\"Say \"\"hi\"\"\"");
    }

    #[test]
    fn source_csv_preserves_the_file_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listings.csv");
        let original = "Category,Price\n\"Writing, Editing\",4.10\nDesign,5.00\n";
        std::fs::write(&path, original).unwrap();

        let raw = source_csv(&path).unwrap();
        assert_eq!(raw, original.as_bytes());

        // A parse/re-serialize cycle drops the trailing zeros; the download
        // endpoint must not take that path for the source file
        let reparsed = to_csv(&Dataset::from_csv(&path).unwrap()).unwrap();
        assert!(reparsed.contains("4.1\n"));
        assert_ne!(reparsed.as_bytes(), raw);
    }

    #[test]
    fn xlsx_export_produces_a_workbook() {
        let bytes = to_xlsx(&sample()).unwrap();

        // XLSX files are ZIP archives, which start with "PK"
        assert!(bytes.len() > 4);
        assert_eq!(&bytes[0..2], b"PK");
    }
}
