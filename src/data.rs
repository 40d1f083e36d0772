//! Raw dataset loading, one CSV file per dataset.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use csv::ReaderBuilder;
use encoding_rs::Encoding;
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::table::{Table, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Circuits,
    Constructors,
    ConstructorResults,
    ConstructorStandings,
    Drivers,
    DriverStandings,
    LapTimes,
    Qualifying,
    Races,
    Results,
    SprintResults,
}

impl Dataset {
    pub const ALL: [Dataset; 11] = [
        Dataset::Circuits,
        Dataset::Constructors,
        Dataset::ConstructorResults,
        Dataset::ConstructorStandings,
        Dataset::Drivers,
        Dataset::DriverStandings,
        Dataset::LapTimes,
        Dataset::Qualifying,
        Dataset::Races,
        Dataset::Results,
        Dataset::SprintResults,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Dataset::Circuits => "circuits.csv",
            Dataset::Constructors => "constructors.csv",
            Dataset::ConstructorResults => "constructor_results.csv",
            Dataset::ConstructorStandings => "constructor_standings.csv",
            Dataset::Drivers => "drivers.csv",
            Dataset::DriverStandings => "driver_standings.csv",
            Dataset::LapTimes => "lap_times.csv",
            Dataset::Qualifying => "qualifying.csv",
            Dataset::Races => "races.csv",
            Dataset::Results => "results.csv",
            Dataset::SprintResults => "sprint_results.csv",
        }
    }

    /// Columns the pipeline relies on. A file without them is rejected at
    /// load time instead of failing halfway through a join.
    pub fn required_columns(self) -> &'static [&'static str] {
        match self {
            Dataset::Circuits => &["circuitId", "name"],
            Dataset::Constructors => &["constructorId", "name"],
            Dataset::ConstructorResults => &["raceId", "constructorId", "points"],
            Dataset::ConstructorStandings => &["raceId", "constructorId", "points", "position"],
            Dataset::Drivers => &["driverId", "driverRef", "forename", "surname"],
            Dataset::DriverStandings => &["raceId", "driverId", "points", "position"],
            Dataset::LapTimes => &["raceId", "driverId", "lap", "position", "milliseconds"],
            Dataset::Qualifying => &["raceId", "driverId", "position"],
            Dataset::Races => &["raceId", "year", "name", "date"],
            Dataset::Results => &["raceId", "driverId", "points"],
            Dataset::SprintResults => &["raceId", "driverId", "points"],
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name().trim_end_matches(".csv"))
    }
}

/// Backing storage for raw dataset bytes.
pub trait DataSource: Send + Sync {
    fn read(&self, dataset: Dataset) -> io::Result<Vec<u8>>;
}

/// Reads `<root>/<dataset file name>`.
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path_of(&self, dataset: Dataset) -> PathBuf {
        self.root.join(dataset.file_name())
    }
}

impl DataSource for FileSource {
    fn read(&self, dataset: Dataset) -> io::Result<Vec<u8>> {
        fs::read(self.path_of(dataset))
    }
}

/// In-memory files, keyed by dataset.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<Dataset, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, dataset: Dataset, contents: impl Into<Vec<u8>>) -> Self {
        self.files.insert(dataset, contents.into());
        self
    }
}

impl DataSource for MemorySource {
    fn read(&self, dataset: Dataset) -> io::Result<Vec<u8>> {
        self.files.get(&dataset).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} not provided", dataset.file_name()))
        })
    }
}

/// Memoizing loader: one slot per dataset, filled on first access.
pub struct DatasetStore {
    source: Box<dyn DataSource>,
    encoding: &'static Encoding,
    tables: HashMap<Dataset, OnceCell<Arc<Table>>>,
}

impl DatasetStore {
    pub fn new(source: impl DataSource + 'static, encoding: &'static Encoding) -> Self {
        Self {
            source: Box::new(source),
            encoding,
            tables: Dataset::ALL.iter().map(|d| (*d, OnceCell::new())).collect(),
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Self> {
        let encoding = config.resolve_encoding()?;
        Ok(Self::new(FileSource::new(&config.data_dir), encoding))
    }

    /// Returns the dataset's table, reading it on the first call only.
    /// A failed read leaves the slot empty, so a later call tries again.
    pub fn load(&self, dataset: Dataset) -> Result<Arc<Table>> {
        let slot = self
            .tables
            .get(&dataset)
            .ok_or_else(|| AnalysisError::data_source(dataset.to_string(), "unknown dataset"))?;
        slot.get_or_try_init(|| self.read_table(dataset).map(Arc::new))
            .map(Arc::clone)
    }

    pub fn is_loaded(&self, dataset: Dataset) -> bool {
        self.tables.get(&dataset).is_some_and(|slot| slot.get().is_some())
    }

    fn read_table(&self, dataset: Dataset) -> Result<Table> {
        let name = dataset.to_string();
        let bytes = self
            .source
            .read(dataset)
            .map_err(|e| AnalysisError::data_source(&name, e))?;
        let text = self
            .encoding
            .decode_without_bom_handling_and_without_replacement(&bytes)
            .ok_or_else(|| {
                AnalysisError::data_source(&name, format!("not valid {}", self.encoding.name()))
            })?;
        let table = parse_csv(&text).map_err(|e| AnalysisError::data_source(&name, e))?;
        if let Some(missing) = dataset
            .required_columns()
            .iter()
            .find(|c| !table.has_column(c))
        {
            return Err(AnalysisError::data_source(
                &name,
                format!("missing expected column '{missing}'"),
            ));
        }
        debug!(
            dataset = %name,
            rows = table.row_count(),
            columns = table.column_count(),
            "loaded dataset"
        );
        Ok(table)
    }
}

impl fmt::Debug for DatasetStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loaded: Vec<_> = Dataset::ALL.iter().filter(|d| self.is_loaded(**d)).collect();
        f.debug_struct("DatasetStore")
            .field("encoding", &self.encoding.name())
            .field("loaded", &loaded)
            .finish()
    }
}

/// Parses CSV text with a header row into a table of inferred cells.
pub fn parse_csv(text: &str) -> std::result::Result<Table, String> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| e.to_string())?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for res in reader.records() {
        let record = res.map_err(|e| e.to_string())?;
        rows.push(record.iter().map(Value::infer).collect());
    }
    Table::new(headers, rows).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DRIVERS: &str = "driverId,driverRef,forename,surname\n1,hamilton,Lewis,Hamilton\n";

    struct CountingSource {
        inner: MemorySource,
        reads: Arc<AtomicUsize>,
    }

    impl DataSource for CountingSource {
        fn read(&self, dataset: Dataset) -> io::Result<Vec<u8>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read(dataset)
        }
    }

    #[test]
    fn loads_each_dataset_once() {
        let reads = Arc::new(AtomicUsize::new(0));
        let store = DatasetStore::new(
            CountingSource {
                inner: MemorySource::new().with(Dataset::Drivers, DRIVERS),
                reads: Arc::clone(&reads),
            },
            encoding_rs::WINDOWS_1252,
        );
        assert!(!store.is_loaded(Dataset::Drivers));
        let first = store.load(Dataset::Drivers).unwrap();
        let second = store.load(Dataset::Drivers).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert!(store.is_loaded(Dataset::Drivers));
    }

    #[test]
    fn failed_reads_are_not_memoized() {
        let reads = Arc::new(AtomicUsize::new(0));
        let store = DatasetStore::new(
            CountingSource {
                inner: MemorySource::new(),
                reads: Arc::clone(&reads),
            },
            encoding_rs::WINDOWS_1252,
        );
        assert!(matches!(
            store.load(Dataset::Races),
            Err(AnalysisError::DataSource { .. })
        ));
        assert!(store.load(Dataset::Races).is_err());
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn decodes_latin1_names() {
        let mut bytes = b"driverId,driverRef,forename,surname\n11,perez,Sergio,P".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b"rez\n");
        let store = DatasetStore::new(
            MemorySource::new().with(Dataset::Drivers, bytes),
            encoding_rs::WINDOWS_1252,
        );
        let drivers = store.load(Dataset::Drivers).unwrap();
        assert_eq!(drivers.get(0, "surname").unwrap(), &Value::text("Pérez"));
    }

    #[test]
    fn rejects_bytes_invalid_in_the_configured_encoding() {
        let bytes = vec![b'a', b'\n', 0xFF, b'\n'];
        let store = DatasetStore::new(
            MemorySource::new().with(Dataset::Drivers, bytes),
            encoding_rs::UTF_8,
        );
        let err = store.load(Dataset::Drivers).unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn rejects_missing_required_column() {
        let store = DatasetStore::new(
            MemorySource::new().with(Dataset::Races, "raceId,year,name\n1,2009,Australian Grand Prix\n"),
            encoding_rs::WINDOWS_1252,
        );
        let err = store.load(Dataset::Races).unwrap_err();
        assert!(err.to_string().contains("'date'"));
    }

    #[test]
    fn rejects_malformed_csv() {
        let store = DatasetStore::new(
            MemorySource::new().with(Dataset::Drivers, "driverId,driverRef,forename,surname\n1,a\n"),
            encoding_rs::WINDOWS_1252,
        );
        assert!(matches!(
            store.load(Dataset::Drivers),
            Err(AnalysisError::DataSource { .. })
        ));
    }
}
