//! Domain data shapes shared across layers: cell values, records, tables
//! and occurrence points.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single cell value. Sources are untyped CSV, so most values arrive as
/// text; trait lookups can return numbers.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Text(String),
    Number(f64),
}

static NULL_VALUE: Value = Value::Null;

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text view of the value, `None` for nulls
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            Value::Number(n) => Some(format_number(*n)),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric view; text cells are parsed leniently
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Null => None,
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }

    /// Rendering used for CSV cells: nulls become empty cells
    pub fn to_cell(&self) -> String {
        self.as_text().unwrap_or_default()
    }

    /// Convert a JSON scalar from an external service. Arrays and objects are
    /// kept as their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Text(b.to_string()),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_cell())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Integral floats print as plain integers so large identifiers never pick up
/// a trailing `.0`.
pub fn format_number(n: f64) -> String {
    // 2^53: beyond this an f64 no longer holds every integer exactly
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_EXACT {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// One row of a source table: field name to value. Absent fields read as null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: HashMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter, handy for fixtures
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&NULL_VALUE)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).as_str()
    }

    pub fn is_null(&self, field: &str) -> bool {
        self.get(field).is_null()
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Value {
        self.fields.remove(field).unwrap_or_default()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Number of null cells among `columns`
    pub fn null_count<S: AsRef<str>>(&self, columns: &[S]) -> usize {
        columns.iter().filter(|c| self.is_null(c.as_ref())).count()
    }
}

/// An ordered set of records sharing one column list. Column order is kept
/// through every stage so written artifacts are deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Record>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        let mut table = Self::default();
        for column in columns {
            table.add_column(column);
        }
        table
    }

    pub fn from_rows<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: Vec<Record>,
    ) -> Self {
        let mut table = Self::new(columns);
        table.rows = rows;
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Record> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Append a column if it is not already present
    pub fn add_column(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.has_column(&name) {
            self.columns.push(name);
        }
    }

    pub fn push(&mut self, record: Record) {
        self.rows.push(record);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.rows.iter()
    }

    /// Rename a column in the schema and in every row. When `to` already
    /// exists the two columns merge: a row keeps its `to` value unless that
    /// is null, in which case it takes the `from` value.
    pub fn rename_column(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        if let Some(pos) = self.columns.iter().position(|c| c == from) {
            if self.has_column(to) {
                self.columns.remove(pos);
            } else {
                self.columns[pos] = to.to_string();
            }
            for row in &mut self.rows {
                if row.contains(from) {
                    let value = row.remove(from);
                    if row.is_null(to) {
                        row.set(to, value);
                    }
                }
            }
        }
    }

    /// Apply `f` to every value of `column`
    pub fn map_column(&mut self, column: &str, f: impl Fn(&Value) -> Value) {
        for row in &mut self.rows {
            let mapped = f(row.get(column));
            row.set(column, mapped);
        }
    }

    /// Add (or overwrite) `column` with a value computed from each row
    pub fn derive_column(&mut self, column: &str, f: impl Fn(&Record) -> Value) {
        self.add_column(column);
        for row in &mut self.rows {
            let derived = f(row);
            row.set(column, derived);
        }
    }

    /// Rows satisfying `predicate`, same schema
    pub fn filter(&self, predicate: impl Fn(&Record) -> bool) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| predicate(r)).cloned().collect(),
        }
    }

    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.rows.iter().map(move |r| r.get(column))
    }
}

impl<'a> IntoIterator for &'a Table {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// A geographic occurrence point for one species
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrencePoint {
    pub scientific_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub event_date: Option<NaiveDate>,
    pub dataset_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_reads_as_null() {
        let record = Record::new().with("family", "Carcharhinidae");
        assert!(record.is_null("aphia_id"));
        assert_eq!(record.text("family"), Some("Carcharhinidae"));
    }

    #[test]
    fn test_integral_numbers_render_without_fraction() {
        assert_eq!(format_number(9606.0), "9606");
        assert_eq!(format_number(123456789012.0), "123456789012");
        assert_eq!(format_number(12.5), "12.5");
        assert_eq!(Value::Number(1e10).to_cell(), "10000000000");
    }

    #[test]
    fn test_rename_column_moves_values() {
        let mut table = Table::from_rows(
            ["Species", "TempMin"],
            vec![Record::new().with("Species", "Prionace glauca").with("TempMin", 8.0)],
        );
        table.rename_column("Species", "scientific_name");
        assert_eq!(table.columns(), &["scientific_name".to_string(), "TempMin".to_string()]);
        assert_eq!(table.rows()[0].text("scientific_name"), Some("Prionace glauca"));
        assert!(table.rows()[0].is_null("Species"));
    }

    #[test]
    fn test_two_headers_renamed_onto_one_column_keep_non_null_value() {
        let mut table = Table::from_rows(
            ["sciname", "Species", "TempMin"],
            vec![
                Record::new().with("sciname", "Prionace glauca").with("Species", Value::Null).with("TempMin", 8.0),
                Record::new().with("sciname", Value::Null).with("Species", "Carcharhinus leucas"),
                Record::new().with("sciname", "Isurus oxyrinchus").with("Species", "Isurus paucus"),
            ],
        );
        table.rename_column("sciname", "scientific_name");
        table.rename_column("Species", "scientific_name");

        assert_eq!(table.columns(), &["scientific_name".to_string(), "TempMin".to_string()]);
        let names: Vec<_> = table.iter().map(|r| r.text("scientific_name")).collect();
        assert_eq!(
            names,
            vec![Some("Prionace glauca"), Some("Carcharhinus leucas"), Some("Isurus oxyrinchus")]
        );
        assert!(table.iter().all(|r| !r.contains("Species")));
    }

    #[test]
    fn test_null_count_over_subset() {
        let record = Record::new().with("temp_min", 4.0).with("temp_max", Value::Null);
        assert_eq!(record.null_count(&["temp_min", "temp_max", "depth_deep"]), 2);
    }
}
