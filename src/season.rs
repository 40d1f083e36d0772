// A season is decided after a race when the leader's margin beats every
// point still on offer, sprints included.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::data::Dataset;
use crate::error::{AnalysisError, Result};
use crate::join::JoinEngine;
use crate::model::{Race, SessionPoints, StandingsKind, StandingsRow};
use crate::table::{SortOrder, Table};

/// First season in which a fastest-lap bonus point is awarded.
pub const FASTEST_LAP_ERA_START: i32 = 2019;

/// Highest points any single competitor scored in each race.
pub fn max_points_per_race(points: &[SessionPoints]) -> BTreeMap<i64, Decimal> {
    let mut maxima = BTreeMap::new();
    for p in points {
        maxima
            .entry(p.race_id)
            .and_modify(|m: &mut Decimal| *m = (*m).max(p.points))
            .or_insert(p.points);
    }
    maxima
}

/// From 2019 the fastest-lap point is only scored by a finisher in the
/// points, so a race's recorded maximum can sit one below the true one. When
/// the two highest distinct maxima differ by exactly one, races at the lower
/// value are raised to the higher.
pub fn apply_fastest_lap_adjustment(maxima: &mut BTreeMap<i64, Decimal>, year: i32) {
    if year < FASTEST_LAP_ERA_START {
        return;
    }
    let mut distinct: Vec<Decimal> = maxima.values().copied().collect();
    distinct.sort_unstable_by(|a, b| b.cmp(a));
    distinct.dedup();
    let [highest, second, ..] = distinct[..] else {
        return;
    };
    if highest == second + Decimal::ONE {
        for m in maxima.values_mut().filter(|m| **m == second) {
            *m += Decimal::ONE;
        }
    }
}

/// Returns the first race id (ascending) after which the lead is strictly
/// greater than the points remaining in later races and sprints.
///
/// `standings` maps each race id to the cumulative points of every
/// competitor after that race.
pub fn deciding_race_id(
    standings: &BTreeMap<i64, Vec<Decimal>>,
    race_points: &BTreeMap<i64, Decimal>,
    sprint_points: &BTreeMap<i64, Decimal>,
) -> Option<i64> {
    standings.iter().find_map(|(&race, points)| {
        let remaining: Decimal = race_points
            .range(race + 1..)
            .chain(sprint_points.range(race + 1..))
            .map(|(_, p)| *p)
            .sum();
        let mut sorted = points.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        let leader = sorted.first().copied()?;
        let rival = sorted.get(1).copied().unwrap_or(Decimal::ZERO);
        (leader - rival > remaining).then_some(race)
    })
}

pub struct SeasonAnalyzer<'a> {
    joins: &'a JoinEngine<'a>,
}

impl<'a> SeasonAnalyzer<'a> {
    pub fn new(joins: &'a JoinEngine<'a>) -> Self {
        Self { joins }
    }

    /// Name of the race at which `year` was decided, or `None` if the data
    /// never shows it decided.
    ///
    /// `standings` is a joined standings view (driver or constructor); rows
    /// of other seasons are ignored.
    pub fn find_deciding_race(&self, standings: &Table, year: i32) -> Result<Option<String>> {
        let races: Vec<Race> = self
            .joins
            .races()?
            .records::<Race>()?
            .into_iter()
            .filter(|r| r.year == year)
            .collect();
        let race_ids: HashMap<&str, i64> =
            races.iter().map(|r| (r.name.as_str(), r.race_id)).collect();

        let by_race = self.standings_by_race(standings, year, &race_ids)?;
        let season: HashSet<i64> = races.iter().map(|r| r.race_id).collect();

        let mut race_points = max_points_per_race(&self.season_points(Dataset::Results, &season)?);
        let sprint_points = max_points_per_race(&self.season_points(Dataset::SprintResults, &season)?);
        apply_fastest_lap_adjustment(&mut race_points, year);

        let decided = deciding_race_id(&by_race, &race_points, &sprint_points)
            .and_then(|id| races.iter().find(|r| r.race_id == id))
            .map(|r| r.name.clone());
        match &decided {
            Some(race) => info!(year, race = %race, "championship decided"),
            None => info!(year, "championship not decided before the final race"),
        }
        Ok(decided)
    }

    fn season_points(&self, dataset: Dataset, season: &HashSet<i64>) -> Result<Vec<SessionPoints>> {
        Ok(self
            .joins
            .cleaned(dataset)?
            .records::<SessionPoints>()?
            .into_iter()
            .filter(|p| season.contains(&p.race_id))
            .collect())
    }

    /// Groups standings points by race id, checking that each competitor
    /// appears once per race.
    fn standings_by_race(
        &self,
        standings: &Table,
        year: i32,
        race_ids: &HashMap<&str, i64>,
    ) -> Result<BTreeMap<i64, Vec<Decimal>>> {
        let rows: Vec<StandingsRow> = standings
            .records::<StandingsRow>()?
            .into_iter()
            .filter(|r| r.year == year)
            .collect();

        let mut seen = HashSet::new();
        let mut by_race: BTreeMap<i64, Vec<Decimal>> = BTreeMap::new();
        let mut by_competitor: HashMap<&str, BTreeMap<i64, Decimal>> = HashMap::new();
        for row in &rows {
            let race = *race_ids.get(row.race_name.as_str()).ok_or_else(|| {
                AnalysisError::JoinIntegrity {
                    table: "standings".into(),
                    key: "race_name".into(),
                    value: format!("{} ({year})", row.race_name),
                    lookup: "races".into(),
                }
            })?;
            if !seen.insert((row.competitor.as_str(), race)) {
                return Err(AnalysisError::InvalidInput(format!(
                    "{} appears twice in the standings after the {year} {}",
                    row.competitor, row.race_name
                )));
            }
            by_race.entry(race).or_default().push(row.points);
            by_competitor
                .entry(row.competitor.as_str())
                .or_default()
                .insert(race, row.points);
        }

        for (competitor, points) in &by_competitor {
            let decreasing = points
                .values()
                .zip(points.values().skip(1))
                .any(|(before, after)| after < before);
            if decreasing {
                warn!(year, competitor, "standings points decrease during the season");
            }
        }
        Ok(by_race)
    }
}

/// Points over the season for each competitor, ordered by race date. The
/// data behind a standings-over-time chart.
pub fn season_progression(
    standings: &Table,
    year: i32,
    kind: StandingsKind,
) -> Result<BTreeMap<String, Vec<(NaiveDate, Decimal)>>> {
    let year_idx = standings.column_index("year")?;
    let date_idx = standings.column_index("date")?;
    let points_idx = standings.column_index("points")?;
    let name_idx = standings.column_index(kind.competitor_column())?;

    let season = standings
        .filter(|row| row[year_idx].as_i64() == Some(i64::from(year)))
        .sort_by(&[("date", SortOrder::Ascending)])?;

    let mut progression: BTreeMap<String, Vec<(NaiveDate, Decimal)>> = BTreeMap::new();
    for row in season.rows() {
        let (Some(date), Some(points)) = (row[date_idx].as_date(), row[points_idx].as_decimal())
        else {
            return Err(AnalysisError::InvalidInput(format!(
                "standings row without a date or points: {row:?}"
            )));
        };
        progression
            .entry(row[name_idx].to_string())
            .or_default()
            .push((date, points));
    }
    Ok(progression)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::CleanOptions;
    use crate::data::{DatasetStore, MemorySource};
    use crate::join::JoinPolicy;

    fn dec(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn flat_maxima(ids: &[i64], points: i64) -> BTreeMap<i64, Decimal> {
        ids.iter().map(|&id| (id, dec(points))).collect()
    }

    #[test]
    fn lead_beyond_remaining_points_decides() {
        let mut standings = BTreeMap::new();
        standings.insert(1, vec![dec(85), dec(25)]);
        standings.insert(2, vec![dec(110), dec(25)]);
        standings.insert(3, vec![dec(135), dec(25)]);
        let maxima = flat_maxima(&[1, 2, 3], 25);
        assert_eq!(deciding_race_id(&standings, &maxima, &BTreeMap::new()), Some(1));
    }

    #[test]
    fn lead_equal_to_remaining_points_does_not_decide() {
        let mut standings = BTreeMap::new();
        standings.insert(1, vec![dec(75), dec(25)]);
        let maxima = flat_maxima(&[1, 2, 3], 25);
        assert_eq!(deciding_race_id(&standings, &maxima, &BTreeMap::new()), None);
    }

    #[test]
    fn sprint_points_count_as_remaining() {
        // 25 + 25 + 8 still on offer after race 1
        let maxima = flat_maxima(&[1, 2, 3], 25);
        let sprints = flat_maxima(&[3], 8);

        let mut standings = BTreeMap::new();
        standings.insert(1, vec![dec(55), dec(0)]);
        assert_eq!(deciding_race_id(&standings, &maxima, &BTreeMap::new()), Some(1));
        assert_eq!(deciding_race_id(&standings, &maxima, &sprints), None);

        standings.insert(1, vec![dec(60), dec(0)]);
        assert_eq!(deciding_race_id(&standings, &maxima, &sprints), Some(1));
    }

    #[test]
    fn fastest_lap_adjustment_only_from_2019() {
        let base: BTreeMap<i64, Decimal> = [(1, dec(25)), (2, dec(24)), (3, dec(25))].into();

        let mut modern = base.clone();
        apply_fastest_lap_adjustment(&mut modern, 2019);
        assert_eq!(modern[&2], dec(25));

        let mut older = base.clone();
        apply_fastest_lap_adjustment(&mut older, 2018);
        assert_eq!(older, base);
    }

    #[test]
    fn fastest_lap_adjustment_needs_a_gap_of_one() {
        let base: BTreeMap<i64, Decimal> = [(1, dec(26)), (2, dec(18))].into();
        let mut maxima = base.clone();
        apply_fastest_lap_adjustment(&mut maxima, 2021);
        assert_eq!(maxima, base);

        let mut single: BTreeMap<i64, Decimal> = [(1, dec(25))].into();
        apply_fastest_lap_adjustment(&mut single, 2021);
        assert_eq!(single[&1], dec(25));
    }

    #[test]
    fn maxima_use_the_best_score_per_race() {
        let points = vec![
            SessionPoints { race_id: 1, points: dec(18) },
            SessionPoints { race_id: 1, points: dec(25) },
            SessionPoints { race_id: 2, points: Decimal::new(125, 1) },
        ];
        let maxima = max_points_per_race(&points);
        assert_eq!(maxima[&1], dec(25));
        assert_eq!(maxima[&2], Decimal::new(125, 1));
    }

    const RACES: &str = "raceId,year,name,date\n\
        10,2030,Race A,2030-03-01\n\
        11,2030,Race B,2030-03-15\n\
        12,2030,Race C,2030-04-01\n";
    const RESULTS: &str = "resultId,raceId,driverId,points\n\
        1,10,1,25\n2,10,2,18\n3,11,1,25\n4,11,2,18\n5,12,1,25\n6,12,2,18\n";
    const SPRINTS: &str = "resultId,raceId,driverId,points\n";

    fn analyzer_store() -> DatasetStore {
        DatasetStore::new(
            MemorySource::new()
                .with(Dataset::Races, RACES)
                .with(Dataset::Results, RESULTS)
                .with(Dataset::SprintResults, SPRINTS),
            encoding_rs::WINDOWS_1252,
        )
    }

    fn standings(rows: &[(&str, &str, i64)]) -> Table {
        let body: String = rows
            .iter()
            .map(|(race, driver, pts)| format!("2030,{race},{driver},{pts}\n"))
            .collect();
        crate::data::parse_csv(&format!("year,race_name,driver_name,points\n{body}")).unwrap()
    }

    #[test]
    fn finds_deciding_race_by_name() {
        let store = analyzer_store();
        let joins = JoinEngine::new(&store, CleanOptions::default(), JoinPolicy::FailFast);
        let analyzer = SeasonAnalyzer::new(&joins);

        let decided = standings(&[
            ("Race A", "Alpha", 60),
            ("Race A", "Beta", 0),
            ("Race B", "Alpha", 85),
            ("Race B", "Beta", 0),
        ]);
        assert_eq!(
            analyzer.find_deciding_race(&decided, 2030).unwrap().as_deref(),
            Some("Race A")
        );

        let tied = standings(&[
            ("Race A", "Alpha", 50),
            ("Race A", "Beta", 0),
            ("Race B", "Alpha", 50),
            ("Race B", "Beta", 25),
        ]);
        assert_eq!(analyzer.find_deciding_race(&tied, 2030).unwrap(), None);
    }

    #[test]
    fn duplicate_competitor_rows_are_rejected() {
        let store = analyzer_store();
        let joins = JoinEngine::new(&store, CleanOptions::default(), JoinPolicy::FailFast);
        let dup = standings(&[("Race A", "Alpha", 10), ("Race A", "Alpha", 12)]);
        assert!(matches!(
            SeasonAnalyzer::new(&joins).find_deciding_race(&dup, 2030),
            Err(AnalysisError::InvalidInput(_))
        ));
    }

    #[test]
    fn progression_orders_points_by_date() {
        let table = crate::data::parse_csv(
            "year,race_name,date,driver_name,points\n\
             2030,Race B,2030-03-15,Alpha,50\n\
             2030,Race A,2030-03-01,Alpha,25\n\
             2029,Race Z,2029-11-01,Alpha,300\n",
        )
        .unwrap();
        let progression = season_progression(&table, 2030, StandingsKind::Driver).unwrap();
        let alpha = &progression["Alpha"];
        assert_eq!(alpha.len(), 2);
        assert_eq!(alpha[0].1, dec(25));
        assert_eq!(alpha[1].1, dec(50));
    }
}
