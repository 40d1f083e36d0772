use std::collections::{HashMap, HashSet};

use ndarray::{s, Array2, ArrayView1, ArrayView2};
use rust_decimal::Decimal;
use tracing::info;

use crate::data::Dataset;
use crate::error::{AnalysisError, Result};
use crate::join::{JoinEngine, DRIVER_ID, RACE_ID};
use crate::model::{PlottingVariable, Race, RaceName};
use crate::table::{SortOrder, Table, Value};

pub const CUMULATIVE_TIME: &str = "cumulative_time";
pub const GAP_TO_FIRST: &str = "gap_to_first";

const MILLIS_PER_SECOND: i64 = 1000;

/// Column identifying a driver: the display name once attached, the raw id
/// otherwise.
fn driver_column(table: &Table) -> Result<&'static str> {
    ["driver_name", DRIVER_ID]
        .into_iter()
        .find(|c| table.has_column(c))
        .ok_or_else(|| AnalysisError::missing_column("driver_name"))
}

fn int_cell(row: &[Value], idx: usize, column: &str) -> Result<i64> {
    row[idx].as_i64().ok_or_else(|| {
        AnalysisError::InvalidInput(format!("{column} is not an integer: '{}'", row[idx]))
    })
}

/// Sorts by (lap, position) and adds `cumulative_time` (ms) and
/// `gap_to_first` (s) to every row.
///
/// Fails with [`AnalysisError::MissingLeader`] if a lap has no position-1
/// row and with [`AnalysisError::InvalidInput`] if a lap has two leaders or
/// a driver appears twice on the same lap.
pub fn compute_gaps(lap_times: &Table) -> Result<Table> {
    let sorted = lap_times.sort_by(&[("lap", SortOrder::Ascending), ("position", SortOrder::Ascending)])?;
    let lap_idx = sorted.column_index("lap")?;
    let pos_idx = sorted.column_index("position")?;
    let ms_idx = sorted.column_index("milliseconds")?;
    let driver_idx = sorted.column_index(driver_column(&sorted)?)?;
    let rows = sorted.rows();

    let mut laps = Vec::with_capacity(rows.len());
    let mut cumulative = Vec::with_capacity(rows.len());
    {
        let mut totals: HashMap<&Value, i64> = HashMap::new();
        let mut seen = HashSet::new();
        for row in rows {
            let lap = int_cell(row, lap_idx, "lap")?;
            let millis = int_cell(row, ms_idx, "milliseconds")?;
            if !seen.insert((&row[driver_idx], lap)) {
                return Err(AnalysisError::InvalidInput(format!(
                    "driver {} has two entries for lap {lap}",
                    row[driver_idx]
                )));
            }
            let total = totals.entry(&row[driver_idx]).or_insert(0);
            *total += millis;
            laps.push(lap);
            cumulative.push(*total);
        }
    }

    let mut gaps = Vec::with_capacity(rows.len());
    let mut start = 0;
    while start < rows.len() {
        let lap = laps[start];
        let end = start + laps[start..].iter().take_while(|l| **l == lap).count();
        let leaders: Vec<usize> = (start..end)
            .filter(|&i| rows[i][pos_idx].as_i64() == Some(1))
            .collect();
        let leader_time = match leaders[..] {
            [i] => cumulative[i],
            [] => return Err(AnalysisError::MissingLeader { lap }),
            _ => {
                return Err(AnalysisError::InvalidInput(format!(
                    "lap {lap} has {} entries in position 1",
                    leaders.len()
                )))
            }
        };
        gaps.extend((start..end).map(|i| {
            Value::Decimal(Decimal::from(cumulative[i] - leader_time) / Decimal::from(MILLIS_PER_SECOND))
        }));
        start = end;
    }

    sorted
        .with_column(CUMULATIVE_TIME, cumulative.into_iter().map(Value::Int).collect())?
        .with_column(GAP_TO_FIRST, gaps)
}

/// Drivers to show, by final running order when limited: latest lap
/// reached first, then position on that lap.
fn select_drivers(lap_times: &Table, driver_col: &str, limit: Option<usize>) -> Result<Vec<Value>> {
    match limit {
        Some(limit) => Ok(lap_times
            .sort_by(&[("lap", SortOrder::Descending), ("position", SortOrder::Ascending)])?
            .unique(driver_col)?
            .into_iter()
            .take(limit)
            .collect()),
        None => lap_times.unique(driver_col),
    }
}

/// One value per lap and driver for the chosen metric. Laps run from 1 to
/// the last lap in the data; a lap a driver did not complete is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySeries {
    metric: PlottingVariable,
    laps: Vec<i64>,
    drivers: Vec<String>,
    values: Array2<Option<Decimal>>,
}

impl ReplaySeries {
    pub fn metric(&self) -> PlottingVariable {
        self.metric
    }

    pub fn laps(&self) -> &[i64] {
        &self.laps
    }

    pub fn drivers(&self) -> &[String] {
        &self.drivers
    }

    /// Rows are laps, columns are drivers.
    pub fn values(&self) -> &Array2<Option<Decimal>> {
        &self.values
    }

    pub fn driver_series(&self, driver: &str) -> Option<ArrayView1<'_, Option<Decimal>>> {
        let col = self.drivers.iter().position(|d| d == driver)?;
        Some(self.values.column(col))
    }

    /// The first `laps` laps, i.e. one animation frame.
    pub fn frame(&self, laps: usize) -> ArrayView2<'_, Option<Decimal>> {
        let laps = laps.min(self.values.nrows());
        self.values.slice(s![..laps, ..])
    }

    /// Smallest and largest value across all drivers and laps.
    pub fn value_range(&self) -> Option<(Decimal, Decimal)> {
        self.values.iter().flatten().fold(None, |range, &v| match range {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    /// `lap` column followed by one column per driver.
    pub fn to_table(&self) -> Result<Table> {
        let mut columns = vec!["lap".to_string()];
        columns.extend(self.drivers.iter().cloned());
        let rows = self
            .laps
            .iter()
            .zip(self.values.rows())
            .map(|(&lap, values)| {
                std::iter::once(Value::Int(lap))
                    .chain(values.iter().map(|v| v.map_or(Value::Null, Value::Decimal)))
                    .collect()
            })
            .collect();
        Table::new(columns, rows)
    }
}

/// Computes gaps over the full field, then keeps `driver_limit` drivers (or
/// all of them) and lays `metric` out per lap.
pub fn build_replay_series(
    lap_times: &Table,
    metric: PlottingVariable,
    driver_limit: Option<usize>,
) -> Result<ReplaySeries> {
    let driver_col = driver_column(lap_times)?;
    let drivers = select_drivers(lap_times, driver_col, driver_limit)?;
    let gaps = compute_gaps(lap_times)?;

    let lap_idx = gaps.column_index("lap")?;
    let driver_idx = gaps.column_index(driver_col)?;
    let metric_idx = gaps.column_index(metric.column())?;

    let last_lap = gaps
        .column("lap")?
        .filter_map(Value::as_i64)
        .max()
        .unwrap_or(0)
        .max(0);
    let laps: Vec<i64> = (1..=last_lap).collect();
    let columns: HashMap<&Value, usize> = drivers.iter().enumerate().map(|(i, d)| (d, i)).collect();

    let mut values = Array2::from_elem((laps.len(), drivers.len()), None);
    for row in gaps.rows() {
        let (Some(&col), Some(lap)) = (columns.get(&row[driver_idx]), row[lap_idx].as_i64()) else {
            continue;
        };
        if lap >= 1 {
            values[[(lap - 1) as usize, col]] = row[metric_idx].as_decimal();
        }
    }

    Ok(ReplaySeries {
        metric,
        laps,
        drivers: drivers.iter().map(Value::to_string).collect(),
        values,
    })
}

/// Loads reference lap times through a [`JoinEngine`].
pub struct ReplayEngine<'a> {
    joins: &'a JoinEngine<'a>,
}

impl<'a> ReplayEngine<'a> {
    pub fn new(joins: &'a JoinEngine<'a>) -> Self {
        Self { joins }
    }

    /// Lap times of one race with year, race name, date and driver name
    /// attached. [`AnalysisError::NotFound`] when the race did not run that
    /// season or has no lap data.
    pub fn load_reference_lap_times(&self, race: RaceName, season: i32) -> Result<Table> {
        let race_ids: HashSet<i64> = self
            .joins
            .races()?
            .records::<Race>()?
            .into_iter()
            .filter(|r| r.year == season && r.name == race.label())
            .map(|r| r.race_id)
            .collect();

        let lap_times = self.joins.store().load(Dataset::LapTimes)?;
        let race_idx = lap_times.column_index(RACE_ID)?;
        let selected = lap_times.filter(|row| {
            row[race_idx]
                .as_i64()
                .is_some_and(|id| race_ids.contains(&id))
        });
        if selected.is_empty() {
            return Err(AnalysisError::NotFound {
                race: race.label().to_string(),
                season,
            });
        }

        let with_races = self.joins.attach_races(&selected, "lap_times")?;
        let reference = self.joins.attach_driver_names(&with_races, "lap_times")?;
        info!(
            race = %race,
            season,
            rows = reference.row_count(),
            "loaded reference lap times"
        );
        Ok(reference)
    }
}
