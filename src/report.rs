//! Segment statistics, console tables and CSV export

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use anyhow::Context;
use polars::prelude::*;
use tracing::info;

use crate::data::CleaningStats;
use crate::segment::{Segment, SegmentedCustomer};

/// Mean RFM values of the customers in one segment
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentSummary {
    pub segment: Segment,
    pub count: usize,
    pub mean_recency: f64,
    pub mean_frequency: f64,
    pub mean_monetary: f64,
}

#[derive(Default)]
struct Totals {
    count: usize,
    recency: f64,
    frequency: f64,
    monetary: f64,
}

/// Per-segment means and counts, in rule-table order. Empty segments are omitted.
pub fn summarize_segments(customers: &[SegmentedCustomer]) -> Vec<SegmentSummary> {
    let mut totals: BTreeMap<Segment, Totals> = BTreeMap::new();
    for customer in customers {
        let metrics = &customer.scored.metrics;
        let t = totals.entry(customer.segment).or_default();
        t.count += 1;
        t.recency += metrics.recency as f64;
        t.frequency += metrics.frequency as f64;
        t.monetary += metrics.monetary;
    }

    totals
        .into_iter()
        .map(|(segment, t)| {
            let n = t.count as f64;
            SegmentSummary {
                segment,
                count: t.count,
                mean_recency: t.recency / n,
                mean_frequency: t.frequency / n,
                mean_monetary: t.monetary / n,
            }
        })
        .collect()
}

/// Ids of the customers assigned to `segment`
pub fn customers_in_segment(customers: &[SegmentedCustomer], segment: Segment) -> Vec<i64> {
    customers
        .iter()
        .filter(|c| c.segment == segment)
        .map(SegmentedCustomer::customer_id)
        .collect()
}

/// Print row counts from the cleaning stage
pub fn print_cleaning_stats(stats: &CleaningStats) {
    println!("\n=== Data Preparation ===");
    println!("Input rows:            {}", stats.input_rows);
    println!("Dropped (incomplete):  {}", stats.dropped_incomplete);
    println!("Dropped (cancelled):   {}", stats.dropped_cancelled);
    println!("Retained rows:         {}", stats.retained);
}

/// Print the segment table to console
pub fn print_segment_summary(customers: &[SegmentedCustomer]) {
    let total = customers.len();
    println!("\n=== Segment Statistics ===");
    println!("Total customers: {}", total);
    println!();
    println!(
        "  {:<20} | {:>6} | {:>6} | {:>8} | {:>9} | {:>10}",
        "Segment", "Count", "Share", "Recency", "Frequency", "Monetary"
    );
    println!(
        "  {:-<20}-|-{:->6}-|-{:->6}-|-{:->8}-|-{:->9}-|-{:->10}",
        "", "", "", "", "", ""
    );
    for s in summarize_segments(customers) {
        let share = s.count as f64 / total as f64 * 100.0;
        println!(
            "  {:<20} | {:>6} | {:>5.1}% | {:>8.1} | {:>9.2} | {:>10.2}",
            s.segment.as_str(),
            s.count,
            share,
            s.mean_recency,
            s.mean_frequency,
            s.mean_monetary
        );
    }
}

/// Write `Customer ID, recency, frequency, monetary, segment` rows to a CSV file
pub fn write_segments_csv(
    customers: &[SegmentedCustomer],
    output_path: impl AsRef<Path>,
) -> crate::Result<()> {
    let output_path = output_path.as_ref();
    let mut df = segments_frame(customers)?;

    let mut file = File::create(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    info!(rows = customers.len(), path = %output_path.display(), "Exported segments");
    Ok(())
}

fn segments_frame(customers: &[SegmentedCustomer]) -> crate::Result<DataFrame> {
    let ids: Vec<i64> = customers.iter().map(SegmentedCustomer::customer_id).collect();
    let recency: Vec<i64> = customers.iter().map(|c| c.scored.metrics.recency).collect();
    let frequency: Vec<i64> = customers
        .iter()
        .map(|c| c.scored.metrics.frequency as i64)
        .collect();
    let monetary: Vec<f64> = customers.iter().map(|c| c.scored.metrics.monetary).collect();
    let segment: Vec<&str> = customers.iter().map(|c| c.segment.as_str()).collect();

    let df = df!(
        "Customer ID" => ids,
        "recency" => recency,
        "frequency" => frequency,
        "monetary" => monetary,
        "segment" => segment,
    )?;
    Ok(df)
}
