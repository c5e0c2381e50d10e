//! Dataset loading.
//!
//! Turns uploaded CSV bytes into an in-memory table with a literal, ordered
//! list of column names. Headers are normalised only as far as needed to
//! make them unique; messy wording is left for the column resolver.

use crate::error::DatasetError;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// A loaded, immutable tabular dataset. Cells are kept as text; an empty
/// cell is a missing value.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// File name the dataset was loaded from.
    pub name: String,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Dataset {
    /// Build a dataset from already-split values. Rows are padded or
    /// truncated to the header width.
    pub fn from_rows(
        name: &str,
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    ) -> Result<Self, DatasetError> {
        let columns = normalize_headers(headers);
        if columns.is_empty() {
            return Err(DatasetError::Empty);
        }

        let width = columns.len();
        let rows: Vec<Vec<String>> = rows
            .into_iter()
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();

        if rows.is_empty() {
            return Err(DatasetError::Empty);
        }

        Ok(Self {
            name: name.to_string(),
            columns,
            rows,
        })
    }

    /// Parse CSV content. Invalid UTF-8 is decoded lossily.
    pub fn from_csv_bytes(name: &str, bytes: &[u8]) -> Result<Self, DatasetError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(bytes);

        let headers: Vec<String> = reader
            .byte_headers()
            .map_err(|e| DatasetError::Unparsable(e.to_string()))?
            .iter()
            .map(|h| String::from_utf8_lossy(h).into_owned())
            .collect();

        let mut rows = Vec::new();
        for record in reader.byte_records() {
            let record = record.map_err(|e| DatasetError::Unparsable(e.to_string()))?;
            rows.push(
                record
                    .iter()
                    .map(|cell| String::from_utf8_lossy(cell).trim().to_string())
                    .collect(),
            );
        }

        let dataset = Self::from_rows(name, headers, rows)?;
        debug!(
            "Parsed {}: {} rows x {} columns",
            name,
            dataset.row_count(),
            dataset.columns.len()
        );
        Ok(dataset)
    }

    /// Load a dataset file from disk.
    pub fn load(path: &Path, max_file_size_mb: u64) -> Result<Self, DatasetError> {
        let display = path.display().to_string();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        if ext != "csv" {
            return Err(DatasetError::UnsupportedFormat(ext));
        }

        let metadata = std::fs::metadata(path).map_err(|source| DatasetError::Io {
            path: display.clone(),
            source,
        })?;
        let size_mb = metadata.len() as f64 / (1024.0 * 1024.0);
        if size_mb > max_file_size_mb as f64 {
            return Err(DatasetError::TooLarge {
                size_mb,
                limit_mb: max_file_size_mb,
            });
        }

        let bytes = std::fs::read(path).map_err(|source| DatasetError::Io {
            path: display.clone(),
            source,
        })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or(display);
        let dataset = Self::from_csv_bytes(&name, &bytes)?;
        info!(
            "Loaded dataset {} ({} rows, {} columns)",
            dataset.name,
            dataset.row_count(),
            dataset.columns.len()
        );
        Ok(dataset)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All cells of a column, missing values included as empty strings.
    pub fn column_values(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx].as_str()).collect())
    }

    /// Row-wise pairs of two columns, dropping rows where either is missing.
    pub fn paired_values(&self, a: &str, b: &str) -> Option<Vec<(&str, &str)>> {
        let ia = self.column_index(a)?;
        let ib = self.column_index(b)?;
        Some(
            self.rows
                .iter()
                .map(|row| (row[ia].as_str(), row[ib].as_str()))
                .filter(|(x, y)| !x.is_empty() && !y.is_empty())
                .collect(),
        )
    }

    /// Columns whose non-missing cells all parse as numbers.
    pub fn numeric_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(idx, _)| {
                let mut seen = false;
                let all_numeric = self.rows.iter().all(|row| {
                    let cell = row[*idx].as_str();
                    if cell.is_empty() {
                        return true;
                    }
                    seen = true;
                    cell.parse::<f64>().is_ok()
                });
                seen && all_numeric
            })
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }
}

/// Make headers unique the way spreadsheet tooling does: blank headers
/// become `Unnamed: <i>`, repeats get `.1`, `.2` suffixes. A suffix that
/// collides with a header already taken is skipped.
pub fn normalize_headers(headers: Vec<String>) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut next_suffix: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(headers.len());

    for (i, header) in headers.into_iter().enumerate() {
        let base = if header.trim().is_empty() {
            format!("Unnamed: {}", i)
        } else {
            header
        };

        let mut name = base.clone();
        if taken.contains(&name) {
            let suffix = next_suffix.entry(base.clone()).or_insert(1);
            loop {
                name = format!("{}.{}", base, suffix);
                *suffix += 1;
                if !taken.contains(&name) {
                    break;
                }
            }
        }
        taken.insert(name.clone());
        out.push(name);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_csv_keeps_messy_headers() {
        let csv = "\"Gender \",\"How many people\nwork here?\",Age\nF,3,30\nM,1,41\n";
        let ds = Dataset::from_csv_bytes("survey.csv", csv.as_bytes()).unwrap();
        assert_eq!(
            ds.columns(),
            &["Gender ", "How many people\nwork here?", "Age"]
        );
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.column_values("Age").unwrap(), vec!["30", "41"]);
    }

    #[test]
    fn test_normalize_headers() {
        let headers = vec!["a".into(), "".into(), "a".into(), "a".into()];
        assert_eq!(
            normalize_headers(headers),
            vec!["a", "Unnamed: 1", "a.1", "a.2"]
        );
    }

    #[test]
    fn test_normalize_headers_skips_taken_suffixes() {
        let headers = vec!["a".into(), "a".into(), "a.1".into()];
        let names = normalize_headers(headers);
        assert_eq!(names, vec!["a", "a.1", "a.1.1"]);

        let headers = vec!["a".into(), "a.1".into(), "a".into()];
        assert_eq!(normalize_headers(headers), vec!["a", "a.1", "a.2"]);

        let csv = "a,a,a.1\n1,2,3\n";
        let ds = Dataset::from_csv_bytes("dup.csv", csv.as_bytes()).unwrap();
        assert_eq!(ds.column_values("a.1.1").unwrap(), vec!["3"]);
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let err = Dataset::from_csv_bytes("e.csv", b"a,b\n").unwrap_err();
        assert!(matches!(err, DatasetError::Empty));
        let err = Dataset::from_csv_bytes("e.csv", b"").unwrap_err();
        assert!(matches!(err, DatasetError::Empty));
    }

    #[test]
    fn test_short_rows_are_padded() {
        let ds = Dataset::from_csv_bytes("p.csv", b"a,b,c\n1,2\n").unwrap();
        assert_eq!(ds.column_values("c").unwrap(), vec![""]);
    }

    #[test]
    fn test_numeric_columns() {
        let csv = "q1,q2,name\n1,5,x\n2,,y\n3,4,z\n";
        let ds = Dataset::from_csv_bytes("n.csv", csv.as_bytes()).unwrap();
        assert_eq!(ds.numeric_columns(), vec!["q1", "q2"]);
    }

    #[test]
    fn test_paired_values_drop_missing() {
        let csv = "a,b\nx,1\n,2\ny,\nz,3\n";
        let ds = Dataset::from_csv_bytes("p.csv", csv.as_bytes()).unwrap();
        assert_eq!(
            ds.paired_values("a", "b").unwrap(),
            vec![("x", "1"), ("z", "3")]
        );
    }

    #[test]
    fn test_load_rejects_non_csv() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.xlsx");
        std::fs::write(&path, b"PK").unwrap();
        let err = Dataset::load(&path, 50).unwrap_err();
        assert!(matches!(err, DatasetError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_load_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.csv");
        std::fs::write(&path, "a,b\n1,2\n3,4\n").unwrap();
        let ds = Dataset::load(&path, 50).unwrap();
        assert_eq!(ds.name, "data.csv");
        assert_eq!(ds.row_count(), 2);
    }
}
