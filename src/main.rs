//! RfmForge: Customer segmentation CLI using RFM quantile scoring
//!
//! This is the main entrypoint that orchestrates data loading, scoring,
//! segment reporting and export.

use anyhow::Result;
use clap::Parser;
use rfmforge::{create_rfm, customers_in_segment, load_transactions, report, Args};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    setup_logging(args.log_filter());

    run_pipeline(&args)
}

/// Install the global `tracing` subscriber writing to stderr
fn setup_logging(directive: &str) {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry().with(filter).with(layer).init();
}

/// Run the full segmentation pipeline
fn run_pipeline(args: &Args) -> Result<()> {
    let config = args.rfm_config()?;
    let segment_filter = args.parse_segment()?;

    println!("=== RFM Segmentation ===\n");
    let start_time = Instant::now();

    // Step 1: Load transactions
    info!(input = %args.input, "Loading transactions");
    let load_start = Instant::now();
    let rows = load_transactions(&args.input)?;
    println!("✓ Data loaded: {} rows", rows.len());
    info!(elapsed_s = load_start.elapsed().as_secs_f64(), "Load finished");

    // Step 2: Clean, aggregate, score and segment
    info!(
        analysis_date = %config.analysis_date,
        min_customers = config.min_customers,
        "Scoring customers"
    );
    let rfm = create_rfm(rows, &config)?;
    println!("✓ Segmented {} customers", rfm.customers.len());

    report::print_cleaning_stats(&rfm.cleaning);
    report::print_segment_summary(&rfm.customers);

    // Step 3: Optional segment listing
    if let Some(segment) = segment_filter {
        let ids = customers_in_segment(&rfm.customers, segment);
        println!("\n=== {} ({} customers) ===", segment, ids.len());
        for id in ids {
            println!("{}", id);
        }
    }

    // Step 4: Optional export
    if let Some(output) = &args.output {
        report::write_segments_csv(&rfm.customers, output)?;
        println!("\n✓ Segments saved to: {}", output);
    }

    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", start_time.elapsed().as_secs_f64());

    Ok(())
}
