use std::collections::HashMap;

use serde::Deserialize;
use tracing::{info, warn};

use crate::clean::CleanOptions;
use crate::config::AnalysisConfig;
use crate::data::{Dataset, DatasetStore};
use crate::error::{AnalysisError, Result};
use crate::model::Driver;
use crate::table::{SortOrder, Table, Value};

pub const RACE_ID: &str = "raceId";
pub const DRIVER_ID: &str = "driverId";
pub const CONSTRUCTOR_ID: &str = "constructorId";

/// What to do with a left row whose key has no match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinPolicy {
    /// Stop with [`AnalysisError::JoinIntegrity`].
    #[default]
    FailFast,
    /// Drop the row and log how many were dropped.
    DropUnmatched,
}

/// The "one" side of a join, indexed by its key column.
#[derive(Debug)]
pub struct Lookup<'a> {
    name: &'a str,
    table: &'a Table,
    key: &'a str,
    index: HashMap<&'a Value, usize>,
}

impl<'a> Lookup<'a> {
    /// Fails with [`AnalysisError::DuplicateKey`] if a key repeats, since that
    /// would turn the join into many-to-many.
    pub fn new(name: &'a str, table: &'a Table, key: &'a str) -> Result<Self> {
        let mut index = HashMap::with_capacity(table.row_count());
        for (i, value) in table.column(key)?.enumerate() {
            if value.is_null() {
                continue;
            }
            if index.insert(value, i).is_some() {
                return Err(AnalysisError::DuplicateKey {
                    table: name.to_string(),
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }
        Ok(Self {
            name,
            table,
            key,
            index,
        })
    }

    /// Appends `columns` (source name, output name) of the matching row to
    /// every row of `left`, matching on the lookup key column.
    pub fn attach(
        &self,
        left: &Table,
        left_name: &str,
        columns: &[(&str, &str)],
        policy: JoinPolicy,
    ) -> Result<Table> {
        let key_idx = left.column_index(self.key)?;
        let sources = columns
            .iter()
            .map(|(src, _)| self.table.column_index(src))
            .collect::<Result<Vec<_>>>()?;

        let mut rows = Vec::with_capacity(left.row_count());
        let mut dropped = 0usize;
        for row in left.rows() {
            let Some(&matched) = self.index.get(&row[key_idx]) else {
                match policy {
                    JoinPolicy::FailFast => {
                        return Err(AnalysisError::JoinIntegrity {
                            table: left_name.to_string(),
                            key: self.key.to_string(),
                            value: row[key_idx].to_string(),
                            lookup: self.name.to_string(),
                        })
                    }
                    JoinPolicy::DropUnmatched => {
                        dropped += 1;
                        continue;
                    }
                }
            };
            let right = &self.table.rows()[matched];
            let mut out = row.clone();
            out.extend(sources.iter().map(|&i| right[i].clone()));
            rows.push(out);
        }
        if dropped > 0 {
            warn!(
                table = left_name,
                lookup = self.name,
                key = self.key,
                dropped,
                "dropped rows with no match"
            );
        }

        let mut names = left.columns().to_vec();
        names.extend(columns.iter().map(|(_, out)| out.to_string()));
        Table::new(names, rows)
    }
}

/// Builds the joined views from a [`DatasetStore`].
#[derive(Debug)]
pub struct JoinEngine<'a> {
    store: &'a DatasetStore,
    cleaning: CleanOptions,
    policy: JoinPolicy,
}

impl<'a> JoinEngine<'a> {
    pub fn new(store: &'a DatasetStore, cleaning: CleanOptions, policy: JoinPolicy) -> Self {
        Self {
            store,
            cleaning,
            policy,
        }
    }

    pub fn from_config(store: &'a DatasetStore, config: &AnalysisConfig) -> Self {
        Self::new(store, config.clean_options(), config.join_policy)
    }

    pub fn store(&self) -> &'a DatasetStore {
        self.store
    }

    pub(crate) fn cleaned(&self, dataset: Dataset) -> Result<Table> {
        let raw = self.store.load(dataset)?;
        Ok(self.cleaning.apply(raw.as_ref()))
    }

    /// Cleaned races reduced to the columns views attach.
    pub(crate) fn races(&self) -> Result<Table> {
        self.cleaned(Dataset::Races)?
            .select(&[RACE_ID, "year", "name", "date"])
    }

    /// `driverId` and the synthesized `driver_name`.
    fn driver_names(&self) -> Result<Table> {
        let drivers: Vec<Driver> = self.cleaned(Dataset::Drivers)?.records()?;
        let rows = drivers
            .iter()
            .map(|d| vec![Value::Int(d.driver_id), Value::text(d.display_name())])
            .collect();
        Table::new(vec![DRIVER_ID.into(), "driver_name".into()], rows)
    }

    /// Adds `year`, `race_name` and `date` by `raceId`.
    pub fn attach_races(&self, table: &Table, name: &str) -> Result<Table> {
        let races = self.races()?;
        Lookup::new("races", &races, RACE_ID)?.attach(
            table,
            name,
            &[("year", "year"), ("name", "race_name"), ("date", "date")],
            self.policy,
        )
    }

    /// Adds `driver_name` by `driverId`, then drops `driverId`.
    pub fn attach_driver_names(&self, table: &Table, name: &str) -> Result<Table> {
        let drivers = self.driver_names()?;
        Lookup::new("drivers", &drivers, DRIVER_ID)?
            .attach(table, name, &[("driver_name", "driver_name")], self.policy)?
            .drop_columns(&[DRIVER_ID])
    }

    /// Constructor standings with year, race name, date and constructor name.
    pub fn build_constructor_standings(&self) -> Result<Table> {
        let standings = self.cleaned(Dataset::ConstructorStandings)?;
        let constructors = self
            .store
            .load(Dataset::Constructors)?
            .select(&[CONSTRUCTOR_ID, "name"])?;
        let named = Lookup::new("constructors", &constructors, CONSTRUCTOR_ID)?.attach(
            &standings,
            "constructor_standings",
            &[("name", "constructor_name")],
            self.policy,
        )?;
        let view = self
            .attach_races(&named, "constructor_standings")?
            .select(&["year", "race_name", "date", "constructor_name", "points", "position"])?;
        info!(rows = view.row_count(), "built constructor standings");
        Ok(view)
    }

    /// Driver standings with year, race name, date and driver name, most
    /// recent race first.
    pub fn build_driver_standings(&self) -> Result<Table> {
        let standings = self.cleaned(Dataset::DriverStandings)?;
        let named = self.attach_driver_names(&standings, "driver_standings")?;
        let view = self
            .attach_races(&named, "driver_standings")?
            .select(&["year", "race_name", "date", "driver_name", "points", "position"])?
            .sort_by(&[("date", SortOrder::Descending)])?;
        info!(rows = view.row_count(), "built driver standings");
        Ok(view)
    }

    /// Race results with driver identity columns and the race date, oldest
    /// race first.
    pub fn build_driver_results(&self) -> Result<Table> {
        let results = self.cleaned(Dataset::Results)?;
        let drivers = self.cleaned(Dataset::Drivers)?;
        let attached: Vec<(&str, &str)> = ["driverRef", "forename", "surname", "code"]
            .into_iter()
            .filter(|c| drivers.has_column(c))
            .map(|c| (c, c))
            .collect();
        let with_drivers =
            Lookup::new("drivers", &drivers, DRIVER_ID)?.attach(&results, "results", &attached, self.policy)?;

        let races = self.races()?;
        let view = Lookup::new("races", &races, RACE_ID)?
            .attach(&with_drivers, "results", &[("date", "date")], self.policy)?
            .sort_by(&[("date", SortOrder::Ascending)])?;
        info!(rows = view.row_count(), "built driver results");
        Ok(view)
    }
}
