//! Map Renderer Binary
//!
//! Re-renders the occurrence map and thermal range chart from CSV outputs of
//! an earlier run, without calling any external service.
//!
//! Usage:
//!   cargo run --bin render-maps                   # uses taxa_merge.toml / $TAXA_CONFIG
//!   cargo run --bin render-maps -- path/to.toml   # explicit config

use anyhow::Context;
use std::env;
use std::path::PathBuf;

use taxa_merge::config::PipelineConfig;
use taxa_merge::constants::{OCCURRENCES_FILE, OCCURRENCE_MAP_FILE, THERMAL_CHART_FILE, TRAITS_TABLE_FILE};
use taxa_merge::infra::{csv_table, svg_map};

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config_path = env::args().nth(1).map(PathBuf::from);
    let config = PipelineConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    let occurrences_path = config.output_path(OCCURRENCES_FILE);
    let points = csv_table::read_occurrences(&occurrences_path)
        .with_context(|| format!("Failed to read {}", occurrences_path.display()))?;
    if points.is_empty() {
        anyhow::bail!("{} holds no occurrences", occurrences_path.display());
    }

    let map_path = config.output_path(OCCURRENCE_MAP_FILE);
    csv_table::write_text(&map_path, &svg_map::render_occurrence_map(&points))?;
    eprintln!("🗺️  {} points rendered to {}", points.len(), map_path.display());

    let traits_path = config.output_path(TRAITS_TABLE_FILE);
    if traits_path.exists() {
        let traits = csv_table::read_table(&traits_path, None)?;
        match svg_map::render_thermal_ranges(&traits) {
            Some(chart) => {
                let chart_path = config.output_path(THERMAL_CHART_FILE);
                csv_table::write_text(&chart_path, &chart)?;
                eprintln!("🌡️  Thermal ranges rendered to {}", chart_path.display());
            }
            None => eprintln!("⚠️  No species with a complete thermal range"),
        }
    } else {
        eprintln!("⚠️  {} not found, thermal chart skipped", traits_path.display());
    }

    Ok(())
}
