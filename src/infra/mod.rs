// Infrastructure adapters: CSV files, HTTP services, SVG rendering

pub mod csv_table;
pub mod http_client;
pub mod svg_map;

pub use http_client::{HttpOccurrenceSource, HttpTraitLookup};
