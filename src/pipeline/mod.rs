// Data pipeline: source loading and table processing

pub mod processing;
pub mod sources;
