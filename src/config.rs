use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{
    APHIA_ID, ASSEMBLY_ACCESSION, ASSEMBLY_RELEASE_DATE, DEPTH_DEEP, DEPTH_SHALLOW, FAMILY,
    NCBI_TAXON_ID, SCIENTIFIC_NAME, TEMP_MAX, TEMP_MIN,
};
use crate::error::{Result, TaxaError};
use crate::pipeline::processing::dedup::RankingStrategy;

/// Config file used when neither `--config` nor `TAXA_CONFIG` is given
pub const DEFAULT_CONFIG_PATH: &str = "taxa_merge.toml";
pub const CONFIG_ENV_VAR: &str = "TAXA_CONFIG";

/// Every constant a run depends on. Every field has a default, so a config
/// file only needs to list what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Family the enrichment and occurrence stages are restricted to
    pub target_family: String,
    pub sources: SourcesConfig,
    pub merge: MergeConfig,
    pub traits: TraitsConfig,
    pub occurrences: OccurrenceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub species_list: SourceConfig,
    pub registry: SourceConfig,
    pub assemblies: SourceConfig,
}

/// One input table: where it lives and how its headers map onto canonical
/// column names. Unmapped headers are kept as they are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub comment_prefix: Option<char>,
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Key columns for both joins (species list with registry, then with assemblies)
    pub join_keys: Vec<String>,
    pub ranking: RankingStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraitsConfig {
    pub base_url: String,
    /// Remote table queried per species
    pub table: String,
    /// Query parameter carrying the scientific name
    pub name_param: String,
    pub timeout_seconds: u64,
    /// Remote field name to local column name; must map one field onto `scientific_name`
    pub fields: BTreeMap<String, String>,
    pub ranking: RankingStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OccurrenceConfig {
    pub base_url: String,
    /// Occurrences recorded before this date are not fetched
    pub min_date: NaiveDate,
    pub page_size: u32,
    pub timeout_seconds: u64,
}

fn column_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(raw, canonical)| (raw.to_string(), canonical.to_string()))
        .collect()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            log_dir: PathBuf::from("logs"),
            target_family: "Carcharhinidae".to_string(),
            sources: SourcesConfig::default(),
            merge: MergeConfig::default(),
            traits: TraitsConfig::default(),
            occurrences: OccurrenceConfig::default(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            species_list: SourceConfig {
                path: PathBuf::from("data/species_list.csv"),
                comment_prefix: None,
                columns: column_map(&[
                    ("species", SCIENTIFIC_NAME),
                    ("family", FAMILY),
                    ("ncbi_taxid", NCBI_TAXON_ID),
                ]),
            },
            registry: SourceConfig {
                path: PathBuf::from("data/worms_registry.csv"),
                comment_prefix: None,
                columns: column_map(&[
                    ("ScientificName", SCIENTIFIC_NAME),
                    ("AphiaID", APHIA_ID),
                    ("Family", FAMILY),
                ]),
            },
            assemblies: SourceConfig {
                path: PathBuf::from("data/ncbi_assemblies.csv"),
                comment_prefix: Some('#'),
                columns: column_map(&[
                    ("Organism Name", SCIENTIFIC_NAME),
                    ("Organism Taxonomic ID", NCBI_TAXON_ID),
                    ("Assembly Accession", ASSEMBLY_ACCESSION),
                    ("Assembly Release Date", ASSEMBLY_RELEASE_DATE),
                ]),
            },
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            join_keys: vec![SCIENTIFIC_NAME.to_string()],
            ranking: RankingStrategy::presence_then_recency(),
        }
    }
}

impl Default for TraitsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://fishbase.ropensci.org".to_string(),
            table: "species".to_string(),
            name_param: "sciname".to_string(),
            timeout_seconds: 30,
            fields: column_map(&[
                ("sciname", SCIENTIFIC_NAME),
                ("TempMin", TEMP_MIN),
                ("TempMax", TEMP_MAX),
                ("DepthRangeShallow", DEPTH_SHALLOW),
                ("DepthRangeDeep", DEPTH_DEEP),
            ]),
            ranking: RankingStrategy::completeness_over([TEMP_MIN, TEMP_MAX]),
        }
    }
}

impl Default for OccurrenceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.obis.org/v3".to_string(),
            min_date: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN),
            page_size: 500,
            timeout_seconds: 60,
        }
    }
}

impl PipelineConfig {
    /// Find the config file to read: `path`, else `$TAXA_CONFIG`, else
    /// `taxa_merge.toml` when it exists. `None` means built-in defaults.
    /// An explicitly named file that does not exist is an error.
    ///
    /// Nothing is logged here; lookup runs before logging is set up.
    pub fn locate(path: Option<&Path>) -> Result<Option<PathBuf>> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));

        match explicit {
            Some(p) if !p.exists() => Err(TaxaError::MissingInput { path: p }),
            Some(p) => Ok(Some(p)),
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
                Ok(default_path.exists().then_some(default_path))
            }
        }
    }

    /// Load whatever [`PipelineConfig::locate`] finds, falling back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match Self::locate(path)? {
            Some(config_path) => Self::from_file(&config_path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            TaxaError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;
        Self::from_toml(&config_content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.merge.join_keys.is_empty() {
            return Err(TaxaError::Config("merge.join_keys must not be empty".to_string()));
        }
        if self.target_family.trim().is_empty() {
            return Err(TaxaError::Config("target_family must not be empty".to_string()));
        }
        if !self.traits.fields.values().any(|local| local == SCIENTIFIC_NAME) {
            return Err(TaxaError::Config(format!(
                "traits.fields must map a remote field onto '{}'",
                SCIENTIFIC_NAME
            )));
        }
        if self.occurrences.page_size == 0 {
            return Err(TaxaError::Config("occurrences.page_size must be positive".to_string()));
        }
        Ok(())
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }
}
