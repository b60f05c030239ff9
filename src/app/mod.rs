pub mod ports;
pub mod merge_use_case;
pub mod enrich_use_case;
pub mod occurrence_use_case;
