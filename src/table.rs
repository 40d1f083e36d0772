use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::str::FromStr;

use chrono::NaiveDate;
use csv::{StringRecord, WriterBuilder};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;

use crate::error::{AnalysisError, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    Decimal(Decimal),
    Date(NaiveDate),
    Text(String),
}

impl Value {
    /// Infers a cell from a raw CSV field: empty is missing, then integer,
    /// plain decimal, ISO date, and text for everything else.
    pub fn infer(raw: &str) -> Self {
        if raw.is_empty() {
            return Value::Null;
        }
        if let Ok(v) = raw.parse::<i64>() {
            return Value::Int(v);
        }
        if is_plain_decimal(raw) {
            if let Ok(d) = Decimal::from_str(raw) {
                return Value::Decimal(d);
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, DATE_FORMAT) {
            return Value::Date(date);
        }
        Value::Text(raw.to_string())
    }

    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Decimal(d) if d.fract().is_zero() => i64::try_from(*d).ok(),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Int(v) => Some(Decimal::from(*v)),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Total order used for sorting. Numbers compare numerically across
    /// `Int` and `Decimal`; missing values sort after everything else.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        if let (Some(a), Some(b)) = (self.as_decimal(), other.as_decimal()) {
            return a.cmp(&b);
        }
        match (self, other) {
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Int(_) | Value::Decimal(_) => 0,
            Value::Date(_) => 1,
            Value::Text(_) => 2,
            Value::Null => 3,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(v) => write!(f, "{v}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

// Lap times such as "1:27.452" and identifiers with letters stay text.
fn is_plain_decimal(raw: &str) -> bool {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    !digits.is_empty()
        && digits.bytes().filter(|b| *b == b'.').count() == 1
        && digits.bytes().all(|b| b.is_ascii_digit() || b == b'.')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Builds a table, checking that column names are unique and that every
    /// row has one cell per column.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(AnalysisError::InvalidInput(format!(
                    "duplicate column '{name}'"
                )));
            }
        }
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(AnalysisError::InvalidInput(format!(
                "row {i} has {} cells, expected {}",
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<Value>>) {
        (self.columns, self.rows)
    }

    /// Applies `f` to every cell, keeping the shape.
    pub fn map_cells<F>(&self, mut f: F) -> Table
    where
        F: FnMut(&Value) -> Value,
    {
        Table {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .map(|row| row.iter().map(&mut f).collect())
                .collect(),
        }
    }

    /// Keeps the columns at `indices`, which must be in range and distinct.
    pub(crate) fn retain_columns(self, indices: &[usize]) -> Table {
        let columns = indices.iter().map(|&i| self.columns[i].clone()).collect();
        let rows = self
            .rows
            .into_iter()
            .map(|mut row| indices.iter().map(|&i| std::mem::take(&mut row[i])).collect())
            .collect();
        Table { columns, rows }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| AnalysisError::missing_column(name))
    }

    pub fn column(&self, name: &str) -> Result<impl Iterator<Item = &Value> + '_> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(move |row| &row[idx]))
    }

    pub fn get(&self, row: usize, column: &str) -> Result<&Value> {
        let idx = self.column_index(column)?;
        self.rows
            .get(row)
            .map(|r| &r[idx])
            .ok_or_else(|| AnalysisError::InvalidInput(format!("row {row} out of range")))
    }

    /// Distinct values of a column in order of first appearance.
    pub fn unique(&self, column: &str) -> Result<Vec<Value>> {
        let mut seen = HashSet::new();
        Ok(self
            .column(column)?
            .filter(|v| seen.insert(*v))
            .cloned()
            .collect())
    }

    /// Keeps only the named columns, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<Table> {
        let indices = names
            .iter()
            .map(|n| self.column_index(n))
            .collect::<Result<Vec<_>>>()?;
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Table::new(names.iter().map(|n| n.to_string()).collect(), rows)
    }

    pub fn drop_columns(&self, names: &[&str]) -> Result<Table> {
        for name in names {
            self.column_index(name)?;
        }
        let keep: Vec<&str> = self
            .columns
            .iter()
            .map(String::as_str)
            .filter(|c| !names.contains(c))
            .collect();
        self.select(&keep)
    }

    pub fn rename(&self, from: &str, to: &str) -> Result<Table> {
        let idx = self.column_index(from)?;
        let mut columns = self.columns.clone();
        columns[idx] = to.to_string();
        Table::new(columns, self.rows.clone())
    }

    pub fn filter<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&[Value]) -> bool,
    {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    pub fn filter_eq(&self, column: &str, value: &Value) -> Result<Table> {
        let idx = self.column_index(column)?;
        Ok(self.filter(|row| &row[idx] == value))
    }

    /// Stable multi-key sort.
    pub fn sort_by(&self, keys: &[(&str, SortOrder)]) -> Result<Table> {
        let keys = keys
            .iter()
            .map(|(name, order)| Ok((self.column_index(name)?, *order)))
            .collect::<Result<Vec<_>>>()?;
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| {
            keys.iter()
                .map(|&(i, order)| match order {
                    SortOrder::Ascending => a[i].sort_cmp(&b[i]),
                    SortOrder::Descending => b[i].sort_cmp(&a[i]),
                })
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        Ok(Table {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Appends a column; `values` must have one entry per row.
    pub fn with_column(self, name: &str, values: Vec<Value>) -> Result<Table> {
        if values.len() != self.rows.len() {
            return Err(AnalysisError::InvalidInput(format!(
                "column '{name}' has {} values for {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        let (mut columns, mut rows) = self.into_parts();
        columns.push(name.to_string());
        for (row, value) in rows.iter_mut().zip(values) {
            row.push(value);
        }
        Table::new(columns, rows)
    }

    /// Deserializes every row into `T`, matching fields by column name.
    /// Missing cells arrive as empty fields, so `Option` fields read `None`.
    pub fn records<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let headers = StringRecord::from(self.columns.clone());
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let record: StringRecord = row.iter().map(|v| v.to_string()).collect();
                record
                    .deserialize::<T>(Some(&headers))
                    .map_err(|e| AnalysisError::InvalidInput(format!("row {i}: {e}")))
            })
            .collect()
    }

    pub fn write_csv<W: io::Write>(&self, out: W) -> Result<()> {
        let mut writer = WriterBuilder::new().from_writer(out);
        let io_err = |e: csv::Error| AnalysisError::InvalidInput(format!("csv write: {e}"));
        writer.write_record(&self.columns).map_err(io_err)?;
        for row in &self.rows {
            writer
                .write_record(row.iter().map(|v| v.to_string()))
                .map_err(io_err)?;
        }
        writer
            .flush()
            .map_err(|e| AnalysisError::InvalidInput(format!("csv write: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(
            vec!["id".into(), "name".into(), "points".into()],
            vec![
                vec![Value::Int(2), "Senna".into(), Value::Decimal(Decimal::new(15, 1))],
                vec![Value::Int(1), "Prost".into(), Value::Int(9)],
                vec![Value::Int(3), "Mansell".into(), Value::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn infers_cell_types() {
        assert_eq!(Value::infer(""), Value::Null);
        assert_eq!(Value::infer("44"), Value::Int(44));
        assert_eq!(Value::infer("0.5"), Value::Decimal(Decimal::new(5, 1)));
        assert_eq!(
            Value::infer("2009-03-29"),
            Value::Date(NaiveDate::from_ymd_opt(2009, 3, 29).unwrap())
        );
        assert_eq!(Value::infer("1:27.452"), Value::text("1:27.452"));
        assert_eq!(Value::infer("\\N"), Value::text("\\N"));
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = Table::new(vec!["a".into()], vec![vec![Value::Int(1), Value::Int(2)]]);
        assert!(matches!(err, Err(AnalysisError::InvalidInput(_))));
    }

    #[test]
    fn sort_mixes_ints_and_decimals_and_puts_nulls_last() {
        let sorted = sample().sort_by(&[("points", SortOrder::Ascending)]).unwrap();
        let names: Vec<_> = sorted.column("name").unwrap().map(|v| v.to_string()).collect();
        assert_eq!(names, ["Senna", "Prost", "Mansell"]);
    }

    #[test]
    fn select_rename_and_drop() {
        let t = sample()
            .select(&["name", "id"])
            .unwrap()
            .rename("name", "driver")
            .unwrap()
            .drop_columns(&["id"])
            .unwrap();
        assert_eq!(t.columns(), ["driver"]);
        assert_eq!(t.row_count(), 3);
        assert!(matches!(
            sample().select(&["nope"]),
            Err(AnalysisError::MissingColumn { .. })
        ));
    }

    #[test]
    fn records_map_columns_by_name() {
        #[derive(serde::Deserialize)]
        struct Row {
            name: String,
            #[serde(default, with = "rust_decimal::serde::str_option")]
            points: Option<Decimal>,
        }
        let rows: Vec<Row> = sample().records().unwrap();
        assert_eq!(rows[0].name, "Senna");
        assert_eq!(rows[0].points, Some(Decimal::new(15, 1)));
        assert_eq!(rows[2].points, None);
    }

    #[test]
    fn writes_csv_with_empty_missing_cells() {
        let mut out = Vec::new();
        sample().write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().next(), Some("id,name,points"));
        assert_eq!(text.lines().last(), Some("3,Mansell,"));
    }
}
