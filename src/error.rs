use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Backing file missing, unreadable, undecodable, malformed, or lacking a
    /// required column.
    #[error("data source '{dataset}' failed: {reason}")]
    DataSource { dataset: String, reason: String },

    #[error("column '{column}' not found")]
    MissingColumn { column: String },

    /// A foreign key on the "many" side has no row on the "one" side.
    #[error("{table}.{key} = {value} has no match in {lookup}")]
    JoinIntegrity {
        table: String,
        key: String,
        value: String,
        lookup: String,
    },

    /// A lookup table holds the same key twice, so a join would duplicate rows.
    #[error("{table}.{key} = {value} is not unique")]
    DuplicateKey {
        table: String,
        key: String,
        value: String,
    },

    #[error("lap {lap} has no entry in position 1")]
    MissingLeader { lap: i64 },

    #[error("no lap times for the {race} in {season}")]
    NotFound { race: String, season: i32 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AnalysisError {
    pub(crate) fn data_source(dataset: impl Into<String>, reason: impl ToString) -> Self {
        AnalysisError::DataSource {
            dataset: dataset.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn missing_column(column: &str) -> Self {
        AnalysisError::MissingColumn {
            column: column.to_string(),
        }
    }

    /// True for the "nothing matched this selection" case, which callers show
    /// to users as an empty result rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AnalysisError::NotFound { .. })
    }
}
