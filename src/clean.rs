use crate::table::{Table, Value};

pub const DEFAULT_SENTINEL: &str = "\\N";
pub const DEFAULT_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone, PartialEq)]
pub struct CleanOptions {
    pub sentinel: String,
    /// Minimum non-missing fraction a column needs to survive.
    pub threshold: f64,
}

impl CleanOptions {
    pub fn new(sentinel: impl Into<String>, threshold: f64) -> Self {
        Self {
            sentinel: sentinel.into(),
            threshold,
        }
    }

    pub fn apply(&self, table: &Table) -> Table {
        clean(table, &self.sentinel, self.threshold)
    }
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self::new(DEFAULT_SENTINEL, DEFAULT_THRESHOLD)
    }
}

/// Replaces cells equal to `sentinel` with [`Value::Null`], then keeps only
/// the columns whose non-missing fraction is at least `threshold`.
///
/// Cells are typed on load, so the sentinel is inferred the same way before
/// comparing. A sentinel such as `-1` matches integer cells.
pub fn clean(table: &Table, sentinel: &str, threshold: f64) -> Table {
    let missing = Value::infer(sentinel);
    let replaced = table.map_cells(|v| if *v == missing { Value::Null } else { v.clone() });

    let rows = replaced.row_count();
    let (keep, dropped): (Vec<usize>, Vec<usize>) = (0..replaced.column_count()).partition(|&i| {
        if rows == 0 {
            return true;
        }
        let present = replaced.rows().iter().filter(|row| !row[i].is_null()).count();
        // ratio, not threshold * rows: 0.07 * 100 rounds above 7
        present as f64 / rows as f64 >= threshold
    });

    if !dropped.is_empty() {
        let names: Vec<&str> = dropped
            .iter()
            .map(|&i| replaced.columns()[i].as_str())
            .collect();
        tracing::debug!(dropped = ?names, threshold, "dropping sparse columns");
    }

    replaced.retain_columns(&keep)
}
