use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use crate::constants::{ASSEMBLY_RELEASE_DATE, EPOCH_SENTINEL_YEAR, HAS_ASSEMBLY};
use crate::domain::{Record, Value};

/// Orders records sharing a taxon key. The deduplicator keeps the record
/// that ranks highest, the earliest one on ties.
pub trait RankingPolicy: Send + Sync {
    /// Short identifier used in logs and metric labels
    fn name(&self) -> &'static str;

    /// `Greater` when `a` outranks `b`. `schema` is the table's column list.
    fn compare(&self, a: &Record, b: &Record, schema: &[String]) -> Ordering;

    /// Columns that must exist in the table for the ranking to make sense
    fn required_columns(&self) -> Vec<String>;
}

/// Records carrying the presence flag outrank those without; among equals
/// the later release date wins. Missing or unparseable dates rank as the
/// 1900-01-01 sentinel rather than being excluded.
#[derive(Debug, Clone)]
pub struct PresenceThenRecency {
    pub flag_column: String,
    pub date_column: String,
}

impl Default for PresenceThenRecency {
    fn default() -> Self {
        Self {
            flag_column: HAS_ASSEMBLY.to_string(),
            date_column: ASSEMBLY_RELEASE_DATE.to_string(),
        }
    }
}

impl RankingPolicy for PresenceThenRecency {
    fn name(&self) -> &'static str {
        "presence_then_recency"
    }

    fn compare(&self, a: &Record, b: &Record, _schema: &[String]) -> Ordering {
        let present = |r: &Record| !r.is_null(&self.flag_column);
        present(a)
            .cmp(&present(b))
            .then_with(|| {
                parse_release_date(a.get(&self.date_column))
                    .cmp(&parse_release_date(b.get(&self.date_column)))
            })
    }

    fn required_columns(&self) -> Vec<String> {
        vec![self.flag_column.clone(), self.date_column.clone()]
    }
}

/// Fewest null cells wins, counted over `columns` or over the whole schema
#[derive(Debug, Clone, Default)]
pub struct Completeness {
    pub columns: Option<Vec<String>>,
}

impl RankingPolicy for Completeness {
    fn name(&self) -> &'static str {
        "completeness"
    }

    fn compare(&self, a: &Record, b: &Record, schema: &[String]) -> Ordering {
        let columns = self.columns.as_deref().unwrap_or(schema);
        b.null_count(columns).cmp(&a.null_count(columns))
    }

    fn required_columns(&self) -> Vec<String> {
        self.columns.clone().unwrap_or_default()
    }
}

/// Configurable ranking choice, as written in the pipeline config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RankingStrategy {
    PresenceThenRecency {
        #[serde(default = "default_flag_column")]
        flag_column: String,
        #[serde(default = "default_date_column")]
        date_column: String,
    },
    Completeness {
        #[serde(default)]
        columns: Option<Vec<String>>,
    },
}

fn default_flag_column() -> String {
    HAS_ASSEMBLY.to_string()
}

fn default_date_column() -> String {
    ASSEMBLY_RELEASE_DATE.to_string()
}

impl RankingStrategy {
    pub fn presence_then_recency() -> Self {
        RankingStrategy::PresenceThenRecency {
            flag_column: default_flag_column(),
            date_column: default_date_column(),
        }
    }

    pub fn completeness_over<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        RankingStrategy::Completeness {
            columns: Some(columns.into_iter().map(Into::into).collect()),
        }
    }

    pub fn build(&self) -> Box<dyn RankingPolicy> {
        match self {
            RankingStrategy::PresenceThenRecency { flag_column, date_column } => {
                Box::new(PresenceThenRecency {
                    flag_column: flag_column.clone(),
                    date_column: date_column.clone(),
                })
            }
            RankingStrategy::Completeness { columns } => Box::new(Completeness {
                columns: columns.clone(),
            }),
        }
    }
}

/// Fixed sentinel for missing dates
pub fn epoch_sentinel() -> NaiveDate {
    NaiveDate::from_ymd_opt(EPOCH_SENTINEL_YEAR, 1, 1).unwrap_or(NaiveDate::MIN)
}

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"];

/// Parse a release date leniently; anything unusable becomes the sentinel
pub fn parse_release_date(value: &Value) -> NaiveDate {
    let Some(raw) = value.as_text() else {
        return epoch_sentinel();
    };
    let raw = raw.trim();

    let parsed = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| {
            raw.parse::<i32>()
                .ok()
                .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
        });

    parsed.unwrap_or_else(|| {
        debug!(value = %raw, "Unparseable release date, ranking as epoch sentinel");
        epoch_sentinel()
    })
}
