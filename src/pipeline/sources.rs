use std::fmt;
use tracing::{error, info, warn};

use crate::config::{SourceConfig, SourcesConfig};
use crate::constants::{ASSEMBLY_ACCESSION, HAS_ASSEMBLY, IDENTIFIER_COLUMNS};
use crate::domain::Table;
use crate::error::{Result, TaxaError};
use crate::infra::csv_table;
use crate::observability::metrics;
use crate::pipeline::processing::normalize::{normalize_identifier_value, normalize_value};

/// The three reference tables merged into one taxon list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Curated species list
    SpeciesList,
    /// Vertebrate taxonomy registry (Aphia ids)
    Registry,
    /// Genome assembly metadata
    Assemblies,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::SpeciesList => "species_list",
            SourceKind::Registry => "registry",
            SourceKind::Assemblies => "assemblies",
        }
    }

    pub fn config<'a>(&self, sources: &'a SourcesConfig) -> &'a SourceConfig {
        match self {
            SourceKind::SpeciesList => &sources.species_list,
            SourceKind::Registry => &sources.registry,
            SourceKind::Assemblies => &sources.assemblies,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Load one source table: read the CSV, rename headers onto canonical
/// columns, null out sentinel cells and canonicalise identifiers.
///
/// Every column named in `required` must be present after renaming.
pub fn load_source(kind: SourceKind, config: &SourceConfig, required: &[String]) -> Result<Table> {
    let mut table = csv_table::read_table(&config.path, config.comment_prefix).map_err(|e| {
        error!(source = %kind, path = %config.path.display(), "Failed to load source: {}", e);
        metrics::sources::load_failed(kind.as_str());
        e
    })?;

    for (raw, canonical) in &config.columns {
        if table.has_column(raw) {
            table.rename_column(raw, canonical);
        } else {
            warn!(source = %kind, column = %raw, "Mapped column not present in source header");
        }
    }

    for column in required {
        if !table.has_column(column) {
            metrics::sources::load_failed(kind.as_str());
            return Err(TaxaError::missing_column(column, kind.as_str()));
        }
    }

    let columns = table.columns().to_vec();
    for column in &columns {
        if IDENTIFIER_COLUMNS.contains(&column.as_str()) {
            table.map_column(column, normalize_identifier_value);
        } else {
            table.map_column(column, normalize_value);
        }
    }

    if kind == SourceKind::Assemblies {
        derive_assembly_flag(&mut table);
    }

    info!(source = %kind, rows = table.len(), columns = table.columns().len(), "Loaded source table");
    metrics::sources::rows_loaded(kind.as_str(), table.len());
    Ok(table)
}

/// `has_assembly` carries the accession when one exists and is null otherwise
fn derive_assembly_flag(table: &mut Table) {
    table.derive_column(HAS_ASSEMBLY, |row| row.get(ASSEMBLY_ACCESSION).clone());
}
