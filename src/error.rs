//! Error types for the RFM scoring pipeline

use chrono::NaiveDateTime;
use polars::prelude::PolarsError;
use thiserror::Error;

/// Structural failures of an RFM run.
///
/// Incomplete rows are not represented here: the cleaner drops them and
/// only counts them in [`crate::data::CleaningStats`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RfmError {
    /// Aggregation left no customer with positive monetary value.
    #[error("No customers with positive monetary value after aggregation")]
    EmptyCustomerSet,

    /// Too few customers to cut five quantile buckets.
    #[error("Quantile scoring needs at least {required} customers, found {count}")]
    InsufficientPopulation { count: usize, required: usize },

    /// A score pair resolved to no segment rule.
    #[error("No segment rule matches RFM key {0:?}")]
    UnmatchedSegmentKey(String),

    /// The analysis date precedes a customer's latest purchase.
    #[error(
        "Analysis date {analysis_date} precedes last purchase {last_purchase} of customer {customer_id}"
    )]
    FutureTransaction {
        customer_id: i64,
        last_purchase: NaiveDateTime,
        analysis_date: NaiveDateTime,
    },

    /// A configuration value is out of range.
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    /// A Polars frame operation failed.
    #[error("Data frame error: {0}")]
    Frame(String),
}

impl From<PolarsError> for RfmError {
    fn from(err: PolarsError) -> Self {
        RfmError::Frame(err.to_string())
    }
}

pub type RfmResult<T> = std::result::Result<T, RfmError>;
