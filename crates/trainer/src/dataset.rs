//! Dataset loading
//!
//! Fetches the CSV object from storage and types every cell as a
//! [`Scalar`]. The header row is required; column names must be unique and
//! non-empty, and every record must have as many fields as the header.

use readiness_forest::Scalar;
use std::collections::HashSet;
use tracing::{info, instrument};

use crate::errors::{PipelineError, Result};
use crate::retry::RetryPolicy;
use crate::storage::{ObjectLocation, ObjectStore, StoreError};

/// Tabular data as read from storage; immutable once loaded
#[derive(Debug, Clone, PartialEq)]
pub struct RawDataset {
    header: Vec<String>,
    rows: Vec<Vec<Scalar>>,
}

impl RawDataset {
    /// Build from an explicit header and rows, checking row widths
    pub fn new(header: Vec<String>, rows: Vec<Vec<Scalar>>) -> Result<Self> {
        check_header(&header)?;
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != header.len())
        {
            return Err(PipelineError::DataUnavailable(format!(
                "row {} has {} fields, header has {}",
                idx + 1,
                row.len(),
                header.len()
            )));
        }
        Ok(Self { header, rows })
    }

    /// Parse UTF-8 CSV with a header row
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| PipelineError::DataUnavailable(format!("dataset is not UTF-8: {}", e)))?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let header: Vec<String> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(str::to_string)
            .collect();
        check_header(&header)?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            rows.push(record.iter().map(Scalar::parse).collect());
        }

        Ok(Self { header, rows })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<Scalar>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.header.len()
    }

    /// Position of a column by exact (case-sensitive) name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }
}

fn check_header(header: &[String]) -> Result<()> {
    if header.is_empty() || header.iter().all(|h| h.is_empty()) {
        return Err(PipelineError::DataUnavailable(
            "dataset has no header row".into(),
        ));
    }
    let mut seen = HashSet::new();
    for (idx, name) in header.iter().enumerate() {
        if name.is_empty() {
            return Err(PipelineError::DataUnavailable(format!(
                "header column {} has an empty name",
                idx + 1
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(PipelineError::DataUnavailable(format!(
                "duplicate header column {}",
                name
            )));
        }
    }
    Ok(())
}

fn csv_error(err: csv::Error) -> PipelineError {
    let position = err
        .position()
        .map(|p| format!(" (line {})", p.line()))
        .unwrap_or_default();
    PipelineError::DataUnavailable(format!("malformed CSV{}: {}", position, err))
}

/// Reads the training dataset from an object store
pub struct DatasetLoader<'a> {
    store: &'a dyn ObjectStore,
    retry: RetryPolicy,
}

impl<'a> DatasetLoader<'a> {
    pub fn new(store: &'a dyn ObjectStore, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Fetch and parse the object at `location`.
    ///
    /// Transient storage failures are retried per the policy; a missing
    /// object or malformed CSV fails immediately.
    #[instrument(skip(self), fields(store = self.store.name(), location = %location))]
    pub fn load(&self, location: &ObjectLocation) -> Result<RawDataset> {
        let bytes = self
            .retry
            .run("fetch_dataset", StoreError::is_transient, || {
                self.store.get(location)
            })
            .map_err(|e| PipelineError::DataUnavailable(e.to_string()))?;

        let dataset = RawDataset::from_csv_bytes(&bytes)?;
        info!(
            rows = dataset.n_rows(),
            columns = dataset.n_columns(),
            bytes = bytes.len(),
            "Dataset loaded"
        );
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::Duration;

    struct FlakyStore {
        failures: Cell<u32>,
        body: Vec<u8>,
        calls: Cell<u32>,
    }

    impl ObjectStore for FlakyStore {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn get(&self, location: &ObjectLocation) -> std::result::Result<Vec<u8>, StoreError> {
            self.calls.set(self.calls.get() + 1);
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(StoreError::Transient(format!("{} timed out", location)));
            }
            Ok(self.body.clone())
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::ZERO,
            multiplier: 1.0,
            max_backoff: Duration::ZERO,
        }
    }

    #[test]
    fn test_cells_are_typed() {
        let csv = b"age,has_chronic_disease,city,debt_amount\n45, true ,Penang,\n30,False,Ipoh,1200.5\n";
        let dataset = RawDataset::from_csv_bytes(csv).unwrap();

        assert_eq!(dataset.header(), ["age", "has_chronic_disease", "city", "debt_amount"]);
        assert_eq!(dataset.n_rows(), 2);
        assert_eq!(dataset.rows()[0][0], Scalar::Number(45.0));
        assert_eq!(dataset.rows()[0][1], Scalar::Bool(true));
        assert_eq!(dataset.rows()[0][2], Scalar::Text("Penang".into()));
        assert_eq!(dataset.rows()[0][3], Scalar::Missing);
        assert_eq!(dataset.rows()[1][3], Scalar::Number(1200.5));
        assert_eq!(dataset.column_index("city"), Some(2));
        assert_eq!(dataset.column_index("City"), None);
    }

    #[test]
    fn test_malformed_input_is_data_unavailable() {
        let cases: [&[u8]; 5] = [
            b"",
            b"age,age\n1,2\n",
            b"age,,income\n1,2,3\n",
            b"age,income\n1,2\n3\n",
            &[0xff, 0xfe, b'a', b'\n'],
        ];
        for bytes in cases {
            assert!(
                matches!(
                    RawDataset::from_csv_bytes(bytes),
                    Err(PipelineError::DataUnavailable(_))
                ),
                "accepted {:?}",
                bytes
            );
        }
    }

    #[test]
    fn test_header_only_dataset_has_no_rows() {
        let dataset = RawDataset::from_csv_bytes(b"age,income\n").unwrap();
        assert_eq!(dataset.n_rows(), 0);
        assert_eq!(dataset.n_columns(), 2);
    }

    #[test]
    fn test_loader_retries_transient_failures() {
        let store = FlakyStore {
            failures: Cell::new(2),
            body: b"age\n30\n".to_vec(),
            calls: Cell::new(0),
        };
        let loader = DatasetLoader::new(&store, fast_retry(3));
        let dataset = loader.load(&ObjectLocation::new("b", "k.csv")).unwrap();
        assert_eq!(dataset.n_rows(), 1);
        assert_eq!(store.calls.get(), 3);
    }

    #[test]
    fn test_loader_gives_up_after_max_attempts() {
        let store = FlakyStore {
            failures: Cell::new(5),
            body: Vec::new(),
            calls: Cell::new(0),
        };
        let loader = DatasetLoader::new(&store, fast_retry(2));
        let err = loader.load(&ObjectLocation::new("b", "k.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::DataUnavailable(_)));
        assert_eq!(store.calls.get(), 2);
    }
}
