use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{info, warn};

use crate::constants::{FAMILY, SCIENTIFIC_NAME};
use crate::domain::{Record, Table};
use crate::error::{Result, TaxaError};
use crate::pipeline::processing::dedup::{by_taxon_key, DedupStats, Deduplicator, RankingStrategy};
use crate::pipeline::processing::join::{JoinSpec, JoinStats, MultiSourceJoiner};
use crate::pipeline::processing::normalize::join_token;

/// Rows of `table` whose family equals `family`, ignoring case.
/// An empty selection is an error: later stages need at least one taxon.
pub fn select_family(table: &Table, family: &str) -> Result<Table> {
    if !table.has_column(FAMILY) {
        return Err(TaxaError::missing_column(FAMILY, "canonical table"));
    }
    let wanted = family.trim();
    let selected = table.filter(|r| {
        r.get(FAMILY)
            .as_text()
            .map(|f| f.trim().eq_ignore_ascii_case(wanted))
            .unwrap_or(false)
    });
    if selected.is_empty() {
        return Err(TaxaError::EmptyResult(format!(
            "no taxa in family '{}' among {} canonical rows",
            family,
            table.len()
        )));
    }
    info!(family = %family, rows = selected.len(), "Selected target family");
    Ok(selected)
}

/// Distinct scientific names to send to the trait database
pub fn lookup_names(table: &Table) -> BTreeSet<String> {
    table
        .column_values(SCIENTIFIC_NAME)
        .filter_map(|v| v.as_text())
        .map(|name| name.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|name| !name.is_empty())
        .collect()
}

/// Result of joining trait data onto the canonical table
#[derive(Debug, Clone)]
pub struct EnrichOutcome {
    pub table: Table,
    pub join: JoinStats,
    pub dedup: DedupStats,
    /// Trait rows dropped because their name was never requested
    pub unrequested_rows: usize,
}

/// Joins trait rows fetched from the external database onto canonical taxa,
/// then keeps the most complete trait row per taxon
pub struct TraitEnricher {
    /// Remote field name to local column name
    field_map: BTreeMap<String, String>,
    ranking: RankingStrategy,
}

impl TraitEnricher {
    pub fn new(field_map: BTreeMap<String, String>, ranking: RankingStrategy) -> Self {
        Self { field_map, ranking }
    }

    /// Remote fields requested from the trait database
    pub fn remote_fields(&self) -> Vec<String> {
        self.field_map.keys().cloned().collect()
    }

    /// Local trait columns, excluding the name column
    pub fn trait_columns(&self) -> Vec<String> {
        self.field_map
            .values()
            .filter(|local| local.as_str() != SCIENTIFIC_NAME)
            .cloned()
            .collect()
    }

    /// Project the raw lookup table onto the mapped fields under local names
    pub fn prepare_traits(&self, raw: &Table) -> Result<Table> {
        let mut table = raw.clone();
        for (remote, local) in &self.field_map {
            table.rename_column(remote, local);
        }
        if !table.has_column(SCIENTIFIC_NAME) {
            return Err(TaxaError::missing_column(SCIENTIFIC_NAME, "trait lookup result"));
        }

        let mut columns = vec![SCIENTIFIC_NAME.to_string()];
        columns.extend(self.trait_columns());
        let rows = table
            .iter()
            .map(|row| {
                columns.iter().fold(Record::new(), |record, c| {
                    record.with(c.clone(), row.get(c).clone())
                })
            })
            .collect();
        Ok(Table::from_rows(columns, rows))
    }

    pub fn enrich(&self, canonical: &Table, raw_traits: &Table) -> Result<EnrichOutcome> {
        let traits = self.prepare_traits(raw_traits)?;

        let requested: HashSet<String> = canonical
            .column_values(SCIENTIFIC_NAME)
            .filter_map(join_token)
            .collect();
        let relevant = traits.filter(|r| {
            join_token(r.get(SCIENTIFIC_NAME))
                .map(|n| requested.contains(&n))
                .unwrap_or(false)
        });
        let unrequested_rows = traits.len() - relevant.len();
        if unrequested_rows > 0 {
            warn!(rows = unrequested_rows, "Trait rows for names never requested were dropped");
        }

        let joined = MultiSourceJoiner::new(JoinSpec::on(SCIENTIFIC_NAME)).join(canonical, &relevant)?;
        let deduped = Deduplicator::from_strategy(&self.ranking).deduplicate(&joined.table, by_taxon_key)?;

        Ok(EnrichOutcome {
            table: deduped.table,
            join: joined.stats,
            dedup: deduped.stats,
            unrequested_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{NCBI_TAXON_ID, TEMP_MAX, TEMP_MIN};
    use crate::domain::Value;

    fn enricher() -> TraitEnricher {
        TraitEnricher::new(
            BTreeMap::from([
                ("Species".to_string(), SCIENTIFIC_NAME.to_string()),
                ("TempMin".to_string(), TEMP_MIN.to_string()),
                ("TempMax".to_string(), TEMP_MAX.to_string()),
            ]),
            RankingStrategy::completeness_over([TEMP_MIN, TEMP_MAX]),
        )
    }

    fn canonical() -> Table {
        Table::from_rows(
            [SCIENTIFIC_NAME, NCBI_TAXON_ID, FAMILY],
            vec![
                Record::new()
                    .with(SCIENTIFIC_NAME, "Prionace glauca")
                    .with(NCBI_TAXON_ID, "7815")
                    .with(FAMILY, "Carcharhinidae"),
                Record::new()
                    .with(SCIENTIFIC_NAME, "Mola mola")
                    .with(NCBI_TAXON_ID, "94237")
                    .with(FAMILY, "Molidae"),
            ],
        )
    }

    #[test]
    fn test_select_family_case_insensitive() {
        let selected = select_family(&canonical(), "carcharhinidae").unwrap();
        assert_eq!(selected.len(), 1);
        assert!(matches!(
            select_family(&canonical(), "Lamnidae"),
            Err(TaxaError::EmptyResult(_))
        ));
    }

    #[test]
    fn test_enrich_keeps_most_complete_trait_row() {
        let raw = Table::from_rows(
            ["Species", "TempMin", "TempMax", "StockCode"],
            vec![
                Record::new().with("Species", "Prionace glauca").with("TempMin", 8.0),
                Record::new()
                    .with("Species", "Prionace glauca")
                    .with("TempMin", 7.0)
                    .with("TempMax", 25.0),
                Record::new().with("Species", "Carcharias taurus").with("TempMin", 12.0),
            ],
        );

        let outcome = enricher().enrich(&canonical(), &raw).unwrap();

        assert_eq!(outcome.unrequested_rows, 1);
        assert_eq!(outcome.table.len(), 2);
        assert!(!outcome.table.has_column("StockCode"));
        let shark = &outcome.table.rows()[0];
        assert_eq!(shark.get(TEMP_MIN), &Value::Number(7.0));
        assert_eq!(shark.get(TEMP_MAX), &Value::Number(25.0));
        let sunfish = &outcome.table.rows()[1];
        assert!(sunfish.is_null(TEMP_MIN));
    }

    #[test]
    fn test_lookup_names_are_distinct() {
        let mut table = canonical();
        table.push(Record::new().with(SCIENTIFIC_NAME, "Prionace  glauca"));
        let names: Vec<_> = lookup_names(&table).into_iter().collect();
        assert_eq!(names, vec!["Mola mola".to_string(), "Prionace glauca".to_string()]);
    }
}
