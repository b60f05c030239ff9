/// Canonical column names shared by every stage of the pipeline.
/// Source headers are renamed onto these when the tables are loaded.
pub const SCIENTIFIC_NAME: &str = "scientific_name";
pub const NCBI_TAXON_ID: &str = "ncbi_taxon_id";
pub const APHIA_ID: &str = "aphia_id";
pub const FAMILY: &str = "family";
pub const ASSEMBLY_ACCESSION: &str = "assembly_accession";
pub const ASSEMBLY_RELEASE_DATE: &str = "assembly_release_date";
pub const HAS_ASSEMBLY: &str = "has_assembly";
pub const TAXON_KEY: &str = "taxon_key";

// Trait fields
pub const TEMP_MIN: &str = "temp_min";
pub const TEMP_MAX: &str = "temp_max";
pub const DEPTH_SHALLOW: &str = "depth_shallow";
pub const DEPTH_DEEP: &str = "depth_deep";

/// Identifier columns that get integer canonicalisation on load
pub const IDENTIFIER_COLUMNS: [&str; 2] = [NCBI_TAXON_ID, APHIA_ID];

/// Raw cell values that stand for "missing" in the source tables (compared case-insensitively)
pub const NULL_SENTINELS: [&str; 8] = ["", "-", "na", "n/a", "nan", "null", "none", "<na>"];

/// Suffixes given to overlapping columns in a raw outer join
pub const LEFT_SUFFIX: &str = "_left";
pub const RIGHT_SUFFIX: &str = "_right";

/// Year used in place of a missing or unparseable release date
pub const EPOCH_SENTINEL_YEAR: i32 = 1900;

// Output artifact file names
pub const MERGED_TABLE_FILE: &str = "merged_taxa.csv";
pub const CANONICAL_TABLE_FILE: &str = "canonical_taxa.csv";
pub const TRAITS_TABLE_FILE: &str = "taxa_traits.csv";
pub const OCCURRENCES_FILE: &str = "occurrences.csv";
pub const OCCURRENCE_MAP_FILE: &str = "occurrence_map.svg";
pub const THERMAL_CHART_FILE: &str = "thermal_ranges.svg";
pub const METRICS_SNAPSHOT_FILE: &str = "metrics.prom";

// Service names used in error messages and metric labels
pub const TRAIT_SERVICE: &str = "trait database";
pub const OCCURRENCE_SERVICE: &str = "occurrence database";
