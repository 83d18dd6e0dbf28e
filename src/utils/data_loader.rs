//! Table ingestion and prediction output

use crate::data::Table;
use crate::error::{Result, VelotuneError};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use std::time::Instant;

/// CSV loader producing observation tables
#[derive(Debug, Clone)]
pub struct DataLoader {
    /// Rows scanned for schema inference
    infer_schema_length: Option<usize>,
    /// Columns forced to nominal kind
    nominal_columns: Vec<String>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self {
            infer_schema_length: Some(1000),
            nominal_columns: Vec::new(),
        }
    }

    /// Columns to treat as categorical even when their values look numeric
    pub fn with_nominal_columns(mut self, columns: Vec<String>) -> Self {
        self.nominal_columns = columns;
        self
    }

    /// Load a comma-separated file with a header row as a polars DataFrame
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            VelotuneError::DataError(format!("cannot open {}: {}", path.display(), e))
        })?;

        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(self.infer_schema_length)
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| VelotuneError::DataError(e.to_string()))
    }

    /// Load a CSV file and convert it to a typed table
    pub fn load_table(&self, path: impl AsRef<Path>) -> Result<Table> {
        let start = Instant::now();
        let path = path.as_ref();
        let df = self.load_csv(path)?;
        let table = Table::from_dataframe(&df, &self.nominal_columns)?;

        tracing::info!(
            path = %path.display(),
            rows = table.n_rows(),
            columns = table.n_cols(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded table"
        );
        Ok(table)
    }
}

/// Writes prediction columns to disk
pub struct DataSaver;

impl DataSaver {
    /// Save named numeric columns as CSV
    pub fn save_columns_csv(columns: Vec<(&str, Vec<f64>)>, path: impl AsRef<Path>) -> Result<()> {
        let cols: Vec<polars::prelude::Column> = columns
            .into_iter()
            .map(|(name, values)| polars::prelude::Column::new(name.into(), values))
            .collect();
        let mut df = DataFrame::new(cols)?;

        let mut file = File::create(path.as_ref())?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)
            .map_err(|e| VelotuneError::DataError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ColumnKind;
    use std::io::Write;

    #[test]
    fn test_load_table_with_nominal_override() {
        let mut tmp = tempfile::NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(tmp, "season,temp,cnt").unwrap();
        writeln!(tmp, "1,0.34,985").unwrap();
        writeln!(tmp, "2,0.36,801").unwrap();
        writeln!(tmp, "1,0.19,1349").unwrap();
        tmp.flush().unwrap();

        let table = DataLoader::new()
            .with_nominal_columns(vec!["season".to_string()])
            .load_table(tmp.path())
            .unwrap();

        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.column("season").unwrap().kind(), ColumnKind::Nominal);
        assert_eq!(table.numeric("cnt").unwrap(), &[985.0, 801.0, 1349.0]);
    }

    #[test]
    fn test_missing_file() {
        let result = DataLoader::new().load_table("/definitely/not/here.csv");
        assert!(matches!(result, Err(VelotuneError::DataError(_))));
    }

    #[test]
    fn test_save_columns_csv() {
        let tmp = tempfile::NamedTempFile::with_suffix(".csv").unwrap();
        DataSaver::save_columns_csv(vec![("prediction", vec![1.5, 2.5])], tmp.path()).unwrap();
        let text = std::fs::read_to_string(tmp.path()).unwrap();
        assert!(text.starts_with("prediction"));
        assert!(text.contains("2.5"));
    }
}
