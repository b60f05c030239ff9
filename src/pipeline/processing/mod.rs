// Table processing: key normalization, joining, deduplication, enrichment

pub mod normalize;
pub mod join;
pub mod dedup;
pub mod enrich;
