//! Historical Formula 1 analysis.
//!
//! Raw CSV datasets are loaded once by a [`DatasetStore`], cleaned of sparse
//! sentinel columns, joined into standings views, and then analysed:
//! [`SeasonAnalyzer`] finds the race at which a championship was decided and
//! the replay functions turn reference lap times into a per-lap series.
//!
//! ```no_run
//! use f1_history::{AnalysisConfig, DatasetStore, JoinEngine, SeasonAnalyzer};
//!
//! # fn main() -> f1_history::Result<()> {
//! let config = AnalysisConfig::load(None)?;
//! let store = DatasetStore::from_config(&config)?;
//! let joins = JoinEngine::from_config(&store, &config);
//! let standings = joins.build_driver_standings()?;
//! let race = SeasonAnalyzer::new(&joins).find_deciding_race(&standings, 2021)?;
//! println!("{race:?}");
//! # Ok(())
//! # }
//! ```

pub mod clean;
pub mod config;
pub mod data;
pub mod error;
pub mod join;
pub mod model;
pub mod replay;
pub mod season;
pub mod table;

pub use clean::{clean, CleanOptions};
pub use config::AnalysisConfig;
pub use data::{DataSource, Dataset, DatasetStore, FileSource, MemorySource};
pub use error::{AnalysisError, Result};
pub use join::{JoinEngine, JoinPolicy, Lookup};
pub use model::{PlottingVariable, RaceName, StandingsKind};
pub use replay::{build_replay_series, compute_gaps, ReplayEngine, ReplaySeries};
pub use season::{season_progression, SeasonAnalyzer};
pub use table::{SortOrder, Table, Value};
