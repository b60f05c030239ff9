use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeSet;

use crate::domain::{OccurrencePoint, Table};
use crate::error::Result;

/// Name-based lookup against the species trait database.
///
/// Returns one row per remote record (a species can come back several
/// times) with the requested fields as columns. Failures are fatal for the
/// run; callers do not retry.
#[async_trait]
pub trait TraitLookupPort: Send + Sync {
    async fn lookup(&self, names: &BTreeSet<String>, fields: &[String]) -> Result<Table>;
}

/// Per-species fetch of geographic occurrence points recorded on or after
/// `since`
#[async_trait]
pub trait OccurrencePort: Send + Sync {
    async fn fetch(&self, scientific_name: &str, since: NaiveDate, limit: u32) -> Result<Vec<OccurrencePoint>>;
}
