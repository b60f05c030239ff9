use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use taxa_merge::app::enrich_use_case::EnrichUseCase;
use taxa_merge::app::merge_use_case::{MergeOutcome, MergeUseCase};
use taxa_merge::app::occurrence_use_case::{OccurrenceOutcome, OccurrenceUseCase};
use taxa_merge::config::PipelineConfig;
use taxa_merge::constants::{CANONICAL_TABLE_FILE, METRICS_SNAPSHOT_FILE, TRAITS_TABLE_FILE};
use taxa_merge::domain::Table;
use taxa_merge::infra::{csv_table, HttpOccurrenceSource, HttpTraitLookup};
use taxa_merge::logging;
use taxa_merge::observability;
use taxa_merge::pipeline::processing::enrich::{select_family, EnrichOutcome};

#[derive(Parser)]
#[command(name = "taxa_merge")]
#[command(about = "Merge marine species reference tables into one canonical taxon list")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML config (defaults to $TAXA_CONFIG, then taxa_merge.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join and deduplicate the three source tables
    Merge,
    /// Attach trait-database fields to the target family
    Enrich,
    /// Fetch occurrence points and render the maps
    Occurrences,
    /// Run merge, enrich and occurrences in sequence
    Run,
}

fn print_merge(outcome: &MergeOutcome) {
    println!("\n📊 Merge results:");
    println!("   Merged rows: {}", outcome.merged.len());
    println!("   Canonical taxa: {}", outcome.canonical.len());
    println!(
        "   Registry matches: {} pairs, assembly matches: {} pairs",
        outcome.registry_join.matched_pairs, outcome.assembly_join.matched_pairs
    );
    println!("   Duplicates dropped: {}", outcome.dedup.dropped_rows());
}

fn print_enrich(outcome: &EnrichOutcome) {
    println!("\n🧬 Trait enrichment results:");
    println!("   Taxa: {}", outcome.table.len());
    println!("   Taxa with trait data: {}", outcome.join.matched_left_rows);
    if outcome.unrequested_rows > 0 {
        println!("   Unrequested trait rows dropped: {}", outcome.unrequested_rows);
    }
}

fn print_occurrences(outcome: &OccurrenceOutcome) {
    println!("\n🗺️  Occurrence results:");
    println!("   Points: {}", outcome.points.len());
    if !outcome.species_without_points.is_empty() {
        println!("   Species without occurrences:");
        for name in &outcome.species_without_points {
            println!("   - {}", name);
        }
    }
    if outcome.thermal_chart_written {
        println!("   Thermal range chart written");
    }
}

fn run_merge(config: &PipelineConfig) -> anyhow::Result<Table> {
    let outcome = MergeUseCase::new(config).run().context("Merge stage failed")?;
    print_merge(&outcome);
    Ok(outcome.canonical)
}

async fn run_enrich(config: &PipelineConfig, canonical: Option<Table>) -> anyhow::Result<Table> {
    let lookup = Arc::new(HttpTraitLookup::new(&config.traits).context("Failed to build trait client")?);
    let use_case = EnrichUseCase::new(lookup, config);
    let canonical = match canonical {
        Some(table) => table,
        None => use_case
            .load_canonical()
            .context("Canonical table not found, run `taxa_merge merge` first")?,
    };
    let outcome = use_case.run(&canonical).await.context("Enrich stage failed")?;
    print_enrich(&outcome);
    Ok(outcome.table)
}

async fn run_occurrences(config: &PipelineConfig, traits: Option<Table>) -> anyhow::Result<()> {
    let traits = match traits {
        Some(table) => Some(table),
        None => {
            let path = config.output_path(TRAITS_TABLE_FILE);
            if path.exists() {
                Some(csv_table::read_table(&path, None)?)
            } else {
                info!("No trait table found, using the canonical table");
                None
            }
        }
    };

    let source = Arc::new(HttpOccurrenceSource::new(&config.occurrences).context("Failed to build occurrence client")?);
    let use_case = OccurrenceUseCase::new(source, config);
    let species = match &traits {
        Some(table) => table.clone(),
        None => {
            let canonical = csv_table::read_table(&config.output_path(CANONICAL_TABLE_FILE), None)
                .context("Canonical table not found, run `taxa_merge merge` first")?;
            select_family(&canonical, &config.target_family)?
        }
    };

    let outcome = use_case
        .run(&species, traits.as_ref())
        .await
        .context("Occurrence stage failed")?;
    print_occurrences(&outcome);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config_source = PipelineConfig::locate(cli.config.as_deref()).context("Failed to locate configuration")?;
    let config = match &config_source {
        Some(path) => PipelineConfig::from_file(path).context("Failed to load configuration")?,
        None => PipelineConfig::default(),
    };
    let _guard = logging::init_logging(&config.log_dir);
    match &config_source {
        Some(path) => info!(path = %path.display(), "Loaded pipeline config"),
        None => info!("No config file found, using built-in defaults"),
    }
    if let Err(e) = observability::init() {
        warn!("Metrics recorder not installed: {}", e);
    }

    let result = match cli.command {
        Commands::Merge => {
            println!("🔄 Running merge...");
            run_merge(&config).map(|_| ())
        }
        Commands::Enrich => {
            println!("🔄 Running trait enrichment...");
            run_enrich(&config, None).await.map(|_| ())
        }
        Commands::Occurrences => {
            println!("🔄 Fetching occurrences...");
            run_occurrences(&config, None).await
        }
        Commands::Run => {
            println!("🔄 Running full pipeline...");
            async {
                let canonical = run_merge(&config)?;
                let traits = run_enrich(&config, Some(canonical)).await?;
                run_occurrences(&config, Some(traits)).await
            }
            .await
        }
    };

    if let Err(e) = observability::write_snapshot(&config.output_path(METRICS_SNAPSHOT_FILE)) {
        warn!("Failed to write metrics snapshot: {}", e);
    }

    if result.is_ok() {
        println!("\n✅ Done. Outputs in {}", config.output_dir.display());
    }
    result
}
