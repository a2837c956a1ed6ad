//! Demo runner: one sample plate run against the mock cytometer.
//!
//! Exercises the full protocol path (collection validation, export
//! gathering with a retry, classification, association bookkeeping) and
//! prints the resulting report as JSON.

use std::sync::Arc;

use clap::Parser;
use log::info;

use cytorun::assoc::MemoryStore;
use cytorun::config::Settings;
use cytorun::error::AppResult;
use cytorun::instrument::build_cytometer;
use cytorun::plate::EMPTY_WELL;
use cytorun::protocol::{PlateRunRequest, ProtocolContext};
use cytorun::upload::{well_uploads, MockExportSource};

#[derive(Parser, Debug)]
#[command(name = "cytorun", about = "Flow cytometry protocol demo runner")]
struct Cli {
    /// Path to a TOML settings file.
    #[arg(long)]
    config: Option<String>,

    /// Cytometer variant to drive (overrides the settings file).
    #[arg(long)]
    cytometer: Option<String>,

    /// Organism profile for the plate run.
    #[arg(long, default_value = "E coli")]
    profile: String,
}

#[tokio::main]
async fn main() -> AppResult<()> {
    env_logger::init();
    let cli = Cli::parse();

    let settings = Settings::new(cli.config.as_deref())?;
    let key = cli.cytometer.unwrap_or_else(|| settings.cytometer.clone());
    let cytometer = build_cytometer(&key)?;
    info!("driving {} at {}", cytometer.name(), cytometer.location());

    let store = Arc::new(MemoryStore::new());
    let mut matrix = vec![vec![EMPTY_WELL; 12]; 8];
    matrix[0][0] = 301; // A1
    matrix[1][1] = 302; // B2
    let collection = store.create_collection(matrix);

    // Scripted export: the first listing comes back empty, as when the
    // technician picks the wrong directory, then the retry succeeds.
    let mut source =
        MockExportSource::scripted(vec![vec![], well_uploads(&["A01", "B02"])]);

    let ctx = ProtocolContext::new(cytometer.as_ref(), store, settings);
    let report = ctx
        .run_sample_plate(
            &mut source,
            PlateRunRequest {
                collection,
                operation: None,
                plan: None,
                profile: cli.profile,
            },
        )
        .await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
