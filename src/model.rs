use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::AnalysisError;

// Typed views over table rows. Field names follow the raw dataset headers.

#[derive(Debug, Clone, Deserialize)]
pub struct Race {
    #[serde(rename = "raceId")]
    pub race_id: i64,
    pub year: i32,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Driver {
    #[serde(rename = "driverId")]
    pub driver_id: i64,
    pub forename: String,
    pub surname: String,
}

impl Driver {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.forename, self.surname)
    }
}

/// Points scored in one session, from results or sprint results.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionPoints {
    #[serde(rename = "raceId")]
    pub race_id: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub points: Decimal,
}

/// One row of a joined standings view.
#[derive(Debug, Clone, Deserialize)]
pub struct StandingsRow {
    pub year: i32,
    pub race_name: String,
    #[serde(alias = "driver_name", alias = "constructor_name")]
    pub competitor: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub points: Decimal,
}

/// Which standings view a table holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandingsKind {
    Driver,
    Constructor,
}

impl StandingsKind {
    pub fn competitor_column(self) -> &'static str {
        match self {
            StandingsKind::Driver => "driver_name",
            StandingsKind::Constructor => "constructor_name",
        }
    }
}

/// Races available for replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RaceName {
    Australia,
    Turkey,
}

impl RaceName {
    pub const ALL: [RaceName; 2] = [RaceName::Australia, RaceName::Turkey];

    /// The race name as stored in the races dataset.
    pub fn label(self) -> &'static str {
        match self {
            RaceName::Australia => "Australian Grand Prix",
            RaceName::Turkey => "Turkish Grand Prix",
        }
    }

    fn key(self) -> &'static str {
        match self {
            RaceName::Australia => "australia",
            RaceName::Turkey => "turkey",
        }
    }
}

impl fmt::Display for RaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RaceName {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RaceName::ALL
            .into_iter()
            .find(|r| r.key().eq_ignore_ascii_case(s) || r.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| AnalysisError::InvalidInput(format!("unknown race '{s}'")))
    }
}

/// Quantity plotted per driver in a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlottingVariable {
    Position,
    GapToFirst,
}

impl PlottingVariable {
    pub const ALL: [PlottingVariable; 2] = [PlottingVariable::Position, PlottingVariable::GapToFirst];

    pub fn label(self) -> &'static str {
        match self {
            PlottingVariable::Position => "Position",
            PlottingVariable::GapToFirst => "Gap to First",
        }
    }

    /// Column of the gap table holding this quantity.
    pub fn column(self) -> &'static str {
        match self {
            PlottingVariable::Position => "position",
            PlottingVariable::GapToFirst => "gap_to_first",
        }
    }
}

impl fmt::Display for PlottingVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PlottingVariable {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.replace('-', "_");
        PlottingVariable::ALL
            .into_iter()
            .find(|v| v.column().eq_ignore_ascii_case(&wanted) || v.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| AnalysisError::InvalidInput(format!("unknown metric '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn race_names_parse_from_key_or_label() {
        assert_eq!("australia".parse::<RaceName>().unwrap(), RaceName::Australia);
        assert_eq!("Turkish Grand Prix".parse::<RaceName>().unwrap(), RaceName::Turkey);
        assert!("monaco".parse::<RaceName>().is_err());
    }

    #[test]
    fn metrics_parse_from_cli_spelling() {
        assert_eq!(
            "gap-to-first".parse::<PlottingVariable>().unwrap(),
            PlottingVariable::GapToFirst
        );
        assert_eq!("Position".parse::<PlottingVariable>().unwrap(), PlottingVariable::Position);
    }

    #[test]
    fn driver_display_name_joins_with_single_space() {
        let d = Driver {
            driver_id: 1,
            forename: "Sergio".into(),
            surname: "Pérez".into(),
        };
        assert_eq!(d.display_name(), "Sergio Pérez");
    }
}
