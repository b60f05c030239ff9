//! Ranking-based deduplication: collapse every group of records sharing a
//! taxon key into the single best-ranked record.

pub mod ranking;

use std::collections::HashMap;
use std::hash::Hash;
use tracing::{debug, info};

use crate::domain::{Record, Table};
use crate::error::{Result, TaxaError};
use crate::observability::metrics;
use crate::pipeline::processing::normalize::taxon_key;

pub use ranking::{Completeness, PresenceThenRecency, RankingPolicy, RankingStrategy};

/// Counts describing one deduplication pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupStats {
    pub input_rows: usize,
    /// Distinct keys, equal to the output row count
    pub groups: usize,
    /// Groups that held more than one record
    pub collapsed_groups: usize,
}

impl DedupStats {
    pub fn dropped_rows(&self) -> usize {
        self.input_rows - self.groups
    }
}

#[derive(Debug, Clone)]
pub struct DedupOutcome {
    pub table: Table,
    pub stats: DedupStats,
}

pub struct Deduplicator {
    policy: Box<dyn RankingPolicy>,
}

impl Deduplicator {
    pub fn new(policy: Box<dyn RankingPolicy>) -> Self {
        Self { policy }
    }

    pub fn from_strategy(strategy: &RankingStrategy) -> Self {
        Self::new(strategy.build())
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Keep exactly one record per distinct key.
    ///
    /// Groups are emitted in order of first appearance. Within a group the
    /// record ranking highest under the policy wins and ties keep the
    /// earliest row, so single-member groups pass through verbatim and a
    /// second pass over the output changes nothing.
    pub fn deduplicate<K, F>(&self, table: &Table, key_fn: F) -> Result<DedupOutcome>
    where
        K: Eq + Hash,
        F: Fn(&Record, usize) -> K,
    {
        for column in self.policy.required_columns() {
            if !table.has_column(&column) {
                return Err(TaxaError::MissingColumn {
                    column,
                    source_name: format!("{} ranking input", self.policy.name()),
                });
            }
        }

        let schema = table.columns();
        let mut group_of: HashMap<K, usize> = HashMap::new();
        let mut best: Vec<usize> = Vec::new();
        let mut sizes: Vec<usize> = Vec::new();

        for (i, record) in table.iter().enumerate() {
            let key = key_fn(record, i);
            match group_of.get(&key) {
                Some(&g) => {
                    sizes[g] += 1;
                    let current = &table.rows()[best[g]];
                    if self.policy.compare(record, current, schema).is_gt() {
                        best[g] = i;
                    }
                }
                None => {
                    group_of.insert(key, best.len());
                    best.push(i);
                    sizes.push(1);
                }
            }
        }

        let stats = DedupStats {
            input_rows: table.len(),
            groups: best.len(),
            collapsed_groups: sizes.iter().filter(|&&n| n > 1).count(),
        };
        let rows = best.iter().map(|&i| table.rows()[i].clone()).collect();
        let output = Table::from_rows(schema.iter().cloned(), rows);

        if output.len() != stats.groups {
            return Err(TaxaError::Config(format!(
                "deduplication kept {} rows for {} keys",
                output.len(),
                stats.groups
            )));
        }
        info!(
            policy = self.policy.name(),
            input_rows = stats.input_rows,
            canonical_rows = stats.groups,
            collapsed_groups = stats.collapsed_groups,
            "Deduplication complete"
        );
        if stats.collapsed_groups > 0 {
            debug!(dropped = stats.dropped_rows(), "Lower-ranked duplicates dropped");
        }
        metrics::dedup::completed(self.policy.name(), &stats);

        Ok(DedupOutcome { table: output, stats })
    }
}

/// Key function deriving the taxon key from identifier and name columns
pub fn by_taxon_key(record: &Record, row_index: usize) -> String {
    taxon_key(record, row_index).to_string()
}

/// Key function reading a precomputed key column; rows with a null key stay
/// in their own group
pub fn by_column(column: &str) -> impl Fn(&Record, usize) -> String + '_ {
    move |record, row_index| {
        record
            .get(column)
            .as_text()
            .unwrap_or_else(|| format!("row:{}", row_index))
    }
}
