//! RfmForge: customer segmentation with RFM (Recency, Frequency, Monetary) scoring
//!
//! Transaction rows are cleaned, aggregated per customer, scored into 1-5
//! quantile buckets on each metric, and mapped to a named marketing
//! segment from the recency and frequency scores.

pub mod cli;
pub mod data;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod scoring;
pub mod segment;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{clean_transactions, load_transactions, transactions_frame, CleaningStats, TransactionRow};
pub use error::{RfmError, RfmResult};
pub use metrics::{compute_metrics, CustomerMetrics, NegativeRecencyPolicy};
pub use pipeline::{create_rfm, RfmConfig, RfmReport};
pub use report::{customers_in_segment, summarize_segments, write_segments_csv, SegmentSummary};
pub use scoring::{quantile_buckets, score_customers, RfmKey, Score, ScoredCustomer, QUANTILE_BUCKETS};
pub use segment::{resolve_segment, segment_customers, Segment, SegmentRule, SegmentedCustomer, SEGMENT_RULES};

/// Result type for the I/O and CLI layers
pub type Result<T> = anyhow::Result<T>;
