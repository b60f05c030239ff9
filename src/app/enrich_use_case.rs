use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, info_span, Instrument};

use crate::app::ports::TraitLookupPort;
use crate::config::PipelineConfig;
use crate::constants::{CANONICAL_TABLE_FILE, TRAITS_TABLE_FILE, TRAIT_SERVICE};
use crate::domain::Table;
use crate::error::{Result, TaxaError};
use crate::infra::csv_table;
use crate::pipeline::processing::enrich::{lookup_names, select_family, EnrichOutcome, TraitEnricher};

/// Use case attaching trait-database fields to the canonical taxa of the
/// target family
pub struct EnrichUseCase {
    lookup: Arc<dyn TraitLookupPort>,
    enricher: TraitEnricher,
    target_family: String,
    output_dir: PathBuf,
}

impl EnrichUseCase {
    pub fn new(lookup: Arc<dyn TraitLookupPort>, config: &PipelineConfig) -> Self {
        Self {
            lookup,
            enricher: TraitEnricher::new(config.traits.fields.clone(), config.traits.ranking.clone()),
            target_family: config.target_family.clone(),
            output_dir: config.output_dir.clone(),
        }
    }

    /// Read back the canonical table written by the merge stage
    pub fn load_canonical(&self) -> Result<Table> {
        csv_table::read_table(&self.output_dir.join(CANONICAL_TABLE_FILE), None)
    }

    /// Select the family, query the trait database and join the answer
    pub async fn enrich(&self, canonical: &Table) -> Result<EnrichOutcome> {
        let family = select_family(canonical, &self.target_family)?;
        let names = lookup_names(&family);
        let fields = self.enricher.remote_fields();

        info!(names = names.len(), fields = ?fields, "Querying trait database");
        let raw = self.lookup.lookup(&names, &fields).await?;
        if raw.is_empty() {
            return Err(TaxaError::external(
                TRAIT_SERVICE,
                format!("no trait records returned for {} names", names.len()),
            ));
        }

        let outcome = self.enricher.enrich(&family, &raw)?;
        info!(
            taxa = outcome.table.len(),
            trait_rows = raw.len(),
            matched = outcome.join.matched_left_rows,
            "Trait enrichment complete"
        );
        Ok(outcome)
    }

    /// Enrich and write `taxa_traits.csv`
    pub async fn run(&self, canonical: &Table) -> Result<EnrichOutcome> {
        let outcome = self.enrich(canonical).instrument(info_span!("enrich")).await?;
        csv_table::write_table(&self.output_dir.join(TRAITS_TABLE_FILE), &outcome.table)?;
        Ok(outcome)
    }
}
