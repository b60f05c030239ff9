use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::constants::{LEFT_SUFFIX, RIGHT_SUFFIX};
use crate::domain::{Record, Table, Value};
use crate::error::{Result, TaxaError};
use crate::observability::metrics;
use crate::pipeline::processing::normalize::join_token;

/// Key columns two tables are joined on. Composite keys match only when every
/// component matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    pub keys: Vec<String>,
}

impl JoinSpec {
    pub fn on(key: impl Into<String>) -> Self {
        Self { keys: vec![key.into()] }
    }

    pub fn on_keys<S: Into<String>>(keys: impl IntoIterator<Item = S>) -> Self {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

/// Row accounting for a full outer join
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinStats {
    pub left_rows: usize,
    pub right_rows: usize,
    /// Emitted (left, right) combinations sharing a key
    pub matched_pairs: usize,
    pub matched_left_rows: usize,
    pub matched_right_rows: usize,
    pub left_only: usize,
    pub right_only: usize,
}

impl JoinStats {
    pub fn output_rows(&self) -> usize {
        self.matched_pairs + self.left_only + self.right_only
    }

    /// Matched pairs beyond one per matched left row. Non-zero whenever a
    /// left row meets more than one right row with the same key.
    pub fn amplified_rows(&self) -> usize {
        self.matched_pairs.saturating_sub(self.matched_left_rows)
    }
}

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub table: Table,
    pub stats: JoinStats,
}

/// Full outer join of two record sets with first-non-null-wins coalescing of
/// the columns both sides carry.
///
/// Cardinality is many-to-many: two left rows and three right rows sharing a
/// key produce six output rows. Nothing is deduplicated before joining; the
/// amplification is reported in [`JoinStats`] and logged.
pub struct MultiSourceJoiner {
    spec: JoinSpec,
}

impl MultiSourceJoiner {
    pub fn new(spec: JoinSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &JoinSpec {
        &self.spec
    }

    /// Outer join followed by coalescing of the suffixed column pairs
    pub fn join(&self, left: &Table, right: &Table) -> Result<JoinOutcome> {
        let JoinOutcome { table, stats } = self.outer_join(left, right)?;
        Ok(JoinOutcome {
            table: coalesce_suffixed(&table),
            stats,
        })
    }

    /// Raw outer join. Non-key columns present on both sides come out as
    /// `<name>_left` / `<name>_right`; key columns appear once, carrying the
    /// left value when present and the right value otherwise.
    pub fn outer_join(&self, left: &Table, right: &Table) -> Result<JoinOutcome> {
        self.validate(left, right)?;

        let keys: HashSet<&str> = self.spec.keys.iter().map(String::as_str).collect();
        let overlapping: HashSet<&str> = left
            .columns()
            .iter()
            .map(String::as_str)
            .filter(|c| !keys.contains(c) && right.has_column(c))
            .collect();

        let left_name = |column: &str| -> String {
            if overlapping.contains(column) {
                format!("{}{}", column, LEFT_SUFFIX)
            } else {
                column.to_string()
            }
        };
        let right_name = |column: &str| -> String {
            if overlapping.contains(column) {
                format!("{}{}", column, RIGHT_SUFFIX)
            } else {
                column.to_string()
            }
        };

        let mut output = Table::new(left.columns().iter().map(|c| left_name(c)));
        for key in &self.spec.keys {
            output.add_column(key.clone());
        }
        for column in right.columns() {
            output.add_column(right_name(column));
        }

        let merge = |l: Option<&Record>, r: Option<&Record>| -> Record {
            let mut merged = Record::new();
            if let Some(l) = l {
                for column in left.columns() {
                    if !keys.contains(column.as_str()) {
                        merged.set(left_name(column), l.get(column).clone());
                    }
                }
            }
            if let Some(r) = r {
                for column in right.columns() {
                    if !keys.contains(column.as_str()) {
                        merged.set(right_name(column), r.get(column).clone());
                    }
                }
            }
            for key in &self.spec.keys {
                let value = coalesce(
                    l.map(|l| l.get(key)).unwrap_or(&Value::Null),
                    r.map(|r| r.get(key)).unwrap_or(&Value::Null),
                );
                merged.set(key.clone(), value);
            }
            merged
        };

        // Right-side index, preserving row order within each key
        let mut index: HashMap<Vec<String>, Vec<usize>> = HashMap::new();
        for (i, record) in right.iter().enumerate() {
            if let Some(token) = self.key_token(record) {
                index.entry(token).or_default().push(i);
            }
        }

        let mut stats = JoinStats {
            left_rows: left.len(),
            right_rows: right.len(),
            ..JoinStats::default()
        };
        let mut right_matched = vec![false; right.len()];

        for l in left {
            let matches = self
                .key_token(l)
                .and_then(|token| index.get(&token))
                .filter(|m| !m.is_empty());
            match matches {
                Some(matches) => {
                    stats.matched_left_rows += 1;
                    for &ri in matches {
                        right_matched[ri] = true;
                        output.push(merge(Some(l), Some(&right.rows()[ri])));
                        stats.matched_pairs += 1;
                    }
                }
                None => {
                    output.push(merge(Some(l), None));
                    stats.left_only += 1;
                }
            }
        }

        for (ri, r) in right.iter().enumerate() {
            if right_matched[ri] {
                stats.matched_right_rows += 1;
            } else {
                output.push(merge(None, Some(r)));
                stats.right_only += 1;
            }
        }

        if output.len() != stats.output_rows() {
            return Err(TaxaError::Config(format!(
                "outer join emitted {} rows, expected {} from its match counts",
                output.len(),
                stats.output_rows()
            )));
        }
        if stats.amplified_rows() > 0 {
            warn!(
                keys = ?self.spec.keys,
                extra_rows = stats.amplified_rows(),
                "Join keys repeat across sources; many-to-many rows emitted"
            );
        }
        debug!(
            left = stats.left_rows,
            right = stats.right_rows,
            matched_pairs = stats.matched_pairs,
            left_only = stats.left_only,
            right_only = stats.right_only,
            "Outer join complete"
        );
        metrics::join::completed(&stats);

        Ok(JoinOutcome { table: output, stats })
    }

    fn validate(&self, left: &Table, right: &Table) -> Result<()> {
        if self.spec.keys.is_empty() {
            return Err(TaxaError::Config("join requires at least one key column".to_string()));
        }
        for key in &self.spec.keys {
            match (left.has_column(key), right.has_column(key)) {
                (false, false) => {
                    return Err(TaxaError::Config(format!(
                        "join key '{}' exists in neither source",
                        key
                    )))
                }
                (true, false) | (false, true) => {
                    warn!(key = %key, "Join key present on one side only; rows from the other side stay unmatched");
                }
                (true, true) => {}
            }
        }
        Ok(())
    }

    /// Normalized composite key; `None` when any component is null
    fn key_token(&self, record: &Record) -> Option<Vec<String>> {
        self.spec
            .keys
            .iter()
            .map(|key| join_token(record.get(key)))
            .collect()
    }
}

/// First non-null of `left`, `right`
pub fn coalesce(left: &Value, right: &Value) -> Value {
    if !left.is_null() {
        left.clone()
    } else {
        right.clone()
    }
}

/// Collapse every `<name>_left` / `<name>_right` pair into `<name>`, left
/// preferred. The merged column takes the left column's position.
pub fn coalesce_suffixed(table: &Table) -> Table {
    let pairs: Vec<(String, String, String)> = table
        .columns()
        .iter()
        .filter_map(|column| {
            let base = column.strip_suffix(LEFT_SUFFIX)?;
            let right = format!("{}{}", base, RIGHT_SUFFIX);
            table
                .has_column(&right)
                .then(|| (base.to_string(), column.clone(), right))
        })
        .collect();

    let right_columns: HashSet<&str> = pairs.iter().map(|(_, _, r)| r.as_str()).collect();
    let columns: Vec<String> = table
        .columns()
        .iter()
        .filter(|c| !right_columns.contains(c.as_str()))
        .map(|c| {
            pairs
                .iter()
                .find(|(_, l, _)| l == c)
                .map(|(base, _, _)| base.clone())
                .unwrap_or_else(|| c.clone())
        })
        .collect();

    let rows = table
        .iter()
        .map(|row| {
            let mut resolved = row.clone();
            for (base, l, r) in &pairs {
                let value = coalesce(row.get(l), row.get(r));
                resolved.remove(l);
                resolved.remove(r);
                resolved.set(base.clone(), value);
            }
            resolved
        })
        .collect();

    Table::from_rows(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn species(rows: &[(&str, Option<&str>)]) -> Table {
        Table::from_rows(
            ["scientific_name", "family"],
            rows.iter()
                .map(|(name, family)| {
                    Record::new()
                        .with("scientific_name", *name)
                        .with("family", family.map(str::to_string))
                })
                .collect(),
        )
    }

    #[test]
    fn test_outer_join_keeps_unmatched_rows_from_both_sides() {
        let left = species(&[("Prionace glauca", Some("Carcharhinidae")), ("Mola mola", None)]);
        let right = species(&[("prionace  glauca", None), ("Thunnus thynnus", Some("Scombridae"))]);

        let outcome = MultiSourceJoiner::new(JoinSpec::on("scientific_name"))
            .join(&left, &right)
            .unwrap();

        assert_eq!(outcome.table.len(), 3);
        assert_eq!(outcome.stats.matched_pairs, 1);
        assert_eq!(outcome.stats.left_only, 1);
        assert_eq!(outcome.stats.right_only, 1);
        assert_eq!(outcome.table.len(), outcome.stats.output_rows());

        let names: Vec<_> = outcome
            .table
            .column_values("scientific_name")
            .map(|v| v.to_cell())
            .collect();
        assert_eq!(names, vec!["Prionace glauca", "Mola mola", "Thunnus thynnus"]);
    }

    #[test]
    fn test_many_to_many_emits_every_combination() {
        let left = species(&[("A b", Some("F1")), ("A b", Some("F2"))]);
        let right = species(&[("A b", Some("F3")), ("A b", None), ("A b", Some("F5"))]);

        let outcome = MultiSourceJoiner::new(JoinSpec::on("scientific_name"))
            .join(&left, &right)
            .unwrap();

        assert_eq!(outcome.table.len(), 6);
        assert_eq!(outcome.stats.matched_pairs, 6);
        assert_eq!(outcome.stats.amplified_rows(), 4);
    }

    #[test]
    fn test_one_left_row_fanning_out_counts_as_amplified() {
        let left = species(&[("Prionace glauca", Some("Carcharhinidae"))]);
        let right = species(&[("Prionace glauca", Some("F1")), ("Prionace glauca", Some("F2"))]);

        let outcome = MultiSourceJoiner::new(JoinSpec::on("scientific_name"))
            .join(&left, &right)
            .unwrap();

        assert_eq!(outcome.table.len(), 2);
        assert_eq!(outcome.stats.matched_left_rows, 1);
        assert_eq!(outcome.stats.matched_right_rows, 2);
        assert_eq!(outcome.stats.amplified_rows(), 1);
    }

    fn assemblies(rows: &[(&str, Option<&str>, &str)]) -> Table {
        Table::from_rows(
            ["scientific_name", "ncbi_taxon_id", "accession"],
            rows.iter()
                .map(|(name, id, accession)| {
                    Record::new()
                        .with("scientific_name", *name)
                        .with("ncbi_taxon_id", id.map(str::to_string))
                        .with("accession", *accession)
                })
                .collect(),
        )
    }

    #[test]
    fn test_composite_key_matches_only_when_every_part_matches() {
        let left = assemblies(&[
            ("Prionace glauca", Some("7815"), "L1"),
            ("Mola mola", Some("94237"), "L2"),
            ("Galeocerdo cuvier", None, "L3"),
        ]);
        let right = assemblies(&[
            ("prionace glauca", Some("7815.0"), "R1"),
            ("Mola mola", Some("1"), "R2"),
            ("Galeocerdo cuvier", None, "R3"),
        ]);

        let outcome = MultiSourceJoiner::new(JoinSpec::on_keys(["scientific_name", "ncbi_taxon_id"]))
            .outer_join(&left, &right)
            .unwrap();

        // both parts equal after normalization
        assert_eq!(outcome.stats.matched_pairs, 1);
        let first = &outcome.table.rows()[0];
        assert_eq!(first.text("accession_left"), Some("L1"));
        assert_eq!(first.text("accession_right"), Some("R1"));
        // name equal, id differs; name equal, id null on both sides
        assert_eq!(outcome.stats.left_only, 2);
        assert_eq!(outcome.stats.right_only, 2);
        assert_eq!(outcome.table.len(), 5);
    }

    #[test]
    fn test_coalesce_prefers_left_then_right_then_null() {
        let left = species(&[("A b", Some("Left")), ("C d", None), ("E f", None)]);
        let right = species(&[("A b", Some("Right")), ("C d", Some("Right")), ("E f", None)]);

        let outcome = MultiSourceJoiner::new(JoinSpec::on("scientific_name"))
            .join(&left, &right)
            .unwrap();

        let families: Vec<_> = outcome.table.column_values("family").cloned().collect();
        assert_eq!(
            families,
            vec![Value::text("Left"), Value::text("Right"), Value::Null]
        );
        assert_eq!(
            outcome.table.columns(),
            &["scientific_name".to_string(), "family".to_string()]
        );
    }

    #[test]
    fn test_raw_join_suffixes_overlapping_columns() {
        let left = species(&[("A b", Some("Left"))]);
        let right = species(&[("A b", Some("Right"))]);

        let outcome = MultiSourceJoiner::new(JoinSpec::on("scientific_name"))
            .outer_join(&left, &right)
            .unwrap();

        assert!(outcome.table.has_column("family_left"));
        assert!(outcome.table.has_column("family_right"));
        assert!(!outcome.table.has_column("family"));
    }

    #[test]
    fn test_null_keys_never_match() {
        let left = species(&[("NA", Some("F1"))]);
        let right = species(&[("-", Some("F2"))]);

        let outcome = MultiSourceJoiner::new(JoinSpec::on("scientific_name"))
            .join(&left, &right)
            .unwrap();

        assert_eq!(outcome.table.len(), 2);
        assert_eq!(outcome.stats.matched_pairs, 0);
    }

    #[test]
    fn test_key_missing_from_both_sources_is_config_error() {
        let left = species(&[("A b", None)]);
        let right = species(&[("A b", None)]);

        let result = MultiSourceJoiner::new(JoinSpec::on("aphia_id")).join(&left, &right);
        assert!(matches!(result, Err(TaxaError::Config(_))));
    }

    #[test]
    fn test_key_missing_from_one_side_leaves_rows_unmatched() {
        let left = species(&[("A b", Some("F1"))]);
        let right = Table::from_rows(["family"], vec![Record::new().with("family", "F2")]);

        let outcome = MultiSourceJoiner::new(JoinSpec::on("scientific_name"))
            .join(&left, &right)
            .unwrap();

        assert_eq!(outcome.table.len(), 2);
        assert_eq!(outcome.stats.left_only, 1);
        assert_eq!(outcome.stats.right_only, 1);
    }
}
