use std::path::PathBuf;
use tracing::{info, info_span, warn};

use crate::config::{PipelineConfig, SourcesConfig};
use crate::constants::{CANONICAL_TABLE_FILE, MERGED_TABLE_FILE, SCIENTIFIC_NAME, TAXON_KEY};
use crate::domain::Table;
use crate::error::Result;
use crate::infra::csv_table;
use crate::pipeline::processing::dedup::{by_column, DedupStats, Deduplicator, RankingStrategy};
use crate::pipeline::processing::join::{JoinSpec, JoinStats, MultiSourceJoiner};
use crate::pipeline::processing::normalize::resolve_taxon_keys;
use crate::pipeline::sources::{load_source, SourceKind};

/// Everything the merge stage produced
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Joined table before deduplication, annotated with `taxon_key`
    pub merged: Table,
    /// One row per taxon key
    pub canonical: Table,
    pub registry_join: JoinStats,
    pub assembly_join: JoinStats,
    pub dedup: DedupStats,
}

/// Use case merging the curated species list, the taxonomy registry and the
/// assembly metadata into one canonical taxon table
pub struct MergeUseCase {
    sources: SourcesConfig,
    joiner: MultiSourceJoiner,
    ranking: RankingStrategy,
    output_dir: PathBuf,
}

impl MergeUseCase {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            sources: config.sources.clone(),
            joiner: MultiSourceJoiner::new(JoinSpec::on_keys(config.merge.join_keys.iter().cloned())),
            ranking: config.merge.ranking.clone(),
            output_dir: config.output_dir.clone(),
        }
    }

    /// Columns every source must carry once its headers are renamed
    fn required_columns(&self, kind: SourceKind) -> Vec<String> {
        let mut required = self.joiner.spec().keys.clone();
        if kind != SourceKind::Assemblies && !required.iter().any(|k| k == SCIENTIFIC_NAME) {
            required.push(SCIENTIFIC_NAME.to_string());
        }
        required
    }

    /// Load the three source tables in fixed order
    pub fn load_sources(&self) -> Result<(Table, Table, Table)> {
        let load = |kind: SourceKind| {
            load_source(kind, kind.config(&self.sources), &self.required_columns(kind))
        };
        Ok((
            load(SourceKind::SpeciesList)?,
            load(SourceKind::Registry)?,
            load(SourceKind::Assemblies)?,
        ))
    }

    /// Join and deduplicate already loaded tables without touching disk
    pub fn merge_tables(&self, species_list: &Table, registry: &Table, assemblies: &Table) -> Result<MergeOutcome> {
        let with_registry = self.joiner.join(species_list, registry)?;
        let with_assemblies = self.joiner.join(&with_registry.table, assemblies)?;

        let merged = with_assemblies.table;
        let keys = resolve_taxon_keys(&merged);
        let mut columns = merged.columns().to_vec();
        columns.push(TAXON_KEY.to_string());
        let rows = merged
            .into_rows()
            .into_iter()
            .zip(keys)
            .map(|(row, key)| row.with(TAXON_KEY, key.to_string()))
            .collect();
        let annotated = Table::from_rows(columns, rows);

        let deduped = Deduplicator::from_strategy(&self.ranking).deduplicate(&annotated, by_column(TAXON_KEY))?;

        let amplified = with_registry.stats.amplified_rows() + with_assemblies.stats.amplified_rows();
        if amplified > 0 {
            warn!(rows = amplified, "Merged table contains rows multiplied by duplicate join keys");
        }
        info!(
            merged_rows = annotated.len(),
            canonical_rows = deduped.table.len(),
            "Merge complete"
        );

        Ok(MergeOutcome {
            merged: annotated,
            canonical: deduped.table,
            registry_join: with_registry.stats,
            assembly_join: with_assemblies.stats,
            dedup: deduped.stats,
        })
    }

    /// Load, merge and write `merged_taxa.csv` and `canonical_taxa.csv`
    pub fn run(&self) -> Result<MergeOutcome> {
        let span = info_span!("merge");
        let _enter = span.enter();

        let (species_list, registry, assemblies) = self.load_sources()?;
        let outcome = self.merge_tables(&species_list, &registry, &assemblies)?;

        csv_table::write_table(&self.output_dir.join(MERGED_TABLE_FILE), &outcome.merged)?;
        csv_table::write_table(&self.output_dir.join(CANONICAL_TABLE_FILE), &outcome.canonical)?;
        info!(output_dir = %self.output_dir.display(), "Merge outputs written");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{APHIA_ID, ASSEMBLY_ACCESSION, ASSEMBLY_RELEASE_DATE, FAMILY, HAS_ASSEMBLY, NCBI_TAXON_ID};
    use crate::domain::Record;

    fn use_case() -> MergeUseCase {
        MergeUseCase::new(&PipelineConfig::default())
    }

    fn species_list() -> Table {
        Table::from_rows(
            [SCIENTIFIC_NAME, FAMILY, NCBI_TAXON_ID],
            vec![
                Record::new()
                    .with(SCIENTIFIC_NAME, "Prionace glauca")
                    .with(FAMILY, "Carcharhinidae")
                    .with(NCBI_TAXON_ID, "7815"),
                Record::new().with(SCIENTIFIC_NAME, "Galeocerdo cuvier").with(FAMILY, "Carcharhinidae"),
            ],
        )
    }

    fn registry() -> Table {
        Table::from_rows(
            [SCIENTIFIC_NAME, "aphia_id", FAMILY],
            vec![
                Record::new()
                    .with(SCIENTIFIC_NAME, "Galeocerdo cuvier")
                    .with("aphia_id", "105799")
                    .with(FAMILY, "Galeocerdonidae"),
                Record::new()
                    .with(SCIENTIFIC_NAME, "Mola mola")
                    .with("aphia_id", "127405")
                    .with(FAMILY, "Molidae"),
            ],
        )
    }

    fn assemblies() -> Table {
        let assembly = |accession: &str, date: &str| {
            Record::new()
                .with(SCIENTIFIC_NAME, "Prionace glauca")
                .with(NCBI_TAXON_ID, "7815")
                .with(ASSEMBLY_ACCESSION, accession)
                .with(HAS_ASSEMBLY, accession)
                .with(ASSEMBLY_RELEASE_DATE, date)
        };
        Table::from_rows(
            [SCIENTIFIC_NAME, NCBI_TAXON_ID, ASSEMBLY_ACCESSION, HAS_ASSEMBLY, ASSEMBLY_RELEASE_DATE],
            vec![assembly("GCA_old", "2015-01-01"), assembly("GCA_new", "2021-06-30")],
        )
    }

    #[test]
    fn test_merge_collapses_to_one_row_per_taxon_key() {
        let outcome = use_case()
            .merge_tables(&species_list(), &registry(), &assemblies())
            .unwrap();

        // blue shark amplified by its two assemblies
        assert_eq!(outcome.merged.len(), 4);
        assert_eq!(outcome.assembly_join.matched_pairs, 2);
        assert_eq!(outcome.assembly_join.amplified_rows(), 1);
        assert_eq!(outcome.registry_join.amplified_rows(), 0);
        assert_eq!(outcome.canonical.len(), 3);
        assert_eq!(outcome.dedup.collapsed_groups, 1);

        let keys: Vec<_> = outcome
            .canonical
            .column_values(TAXON_KEY)
            .filter_map(|v| v.as_text())
            .collect();
        assert_eq!(keys, vec!["ncbi:7815", "aphia:105799", "aphia:127405"]);
    }

    #[test]
    fn test_merge_prefers_latest_assembly_and_curated_values() {
        let outcome = use_case()
            .merge_tables(&species_list(), &registry(), &assemblies())
            .unwrap();

        let shark = &outcome.canonical.rows()[0];
        assert_eq!(shark.text(ASSEMBLY_ACCESSION), Some("GCA_new"));
        let tiger = &outcome.canonical.rows()[1];
        assert_eq!(tiger.text(FAMILY), Some("Carcharhinidae"));
        assert!(!outcome.canonical.has_column("family_left"));
    }

    #[test]
    fn test_registry_synonym_collapses_onto_curated_taxon() {
        let species = Table::from_rows(
            [SCIENTIFIC_NAME, FAMILY, NCBI_TAXON_ID],
            vec![Record::new()
                .with(SCIENTIFIC_NAME, "Carcharhinus leucas")
                .with(FAMILY, "Carcharhinidae")
                .with(NCBI_TAXON_ID, "7807")],
        );
        let registry = Table::from_rows(
            [SCIENTIFIC_NAME, APHIA_ID],
            vec![
                Record::new().with(SCIENTIFIC_NAME, "Carcharhinus leucas").with(APHIA_ID, "105792"),
                Record::new().with(SCIENTIFIC_NAME, "Carcharias leucas").with(APHIA_ID, "105792"),
            ],
        );
        let no_assemblies = Table::new([SCIENTIFIC_NAME, HAS_ASSEMBLY, ASSEMBLY_RELEASE_DATE]);

        let outcome = use_case().merge_tables(&species, &registry, &no_assemblies).unwrap();

        assert_eq!(outcome.merged.len(), 2);
        let keys: Vec<_> = outcome.merged.column_values(TAXON_KEY).filter_map(|v| v.as_text()).collect();
        assert_eq!(keys, vec!["ncbi:7807", "ncbi:7807"]);
        assert_eq!(outcome.canonical.len(), 1);
        assert_eq!(outcome.canonical.rows()[0].text(SCIENTIFIC_NAME), Some("Carcharhinus leucas"));
    }
}
