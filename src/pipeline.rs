//! End-to-end RFM pipeline: clean, aggregate, score, segment

use chrono::NaiveDateTime;
use tracing::info;

use crate::data::{clean_transactions, transactions_frame, CleaningStats, TransactionRow};
use crate::error::{RfmError, RfmResult};
use crate::metrics::{compute_metrics, NegativeRecencyPolicy};
use crate::scoring::{score_customers, QUANTILE_BUCKETS};
use crate::segment::{segment_customers, SegmentedCustomer};

/// Parameters of one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct RfmConfig {
    /// Reference point for recency, normally at or after the last invoice
    pub analysis_date: NaiveDateTime,
    /// Fewest customers accepted for quantile scoring
    pub min_customers: usize,
    pub negative_recency: NegativeRecencyPolicy,
}

impl RfmConfig {
    pub fn new(analysis_date: NaiveDateTime) -> Self {
        Self {
            analysis_date,
            min_customers: QUANTILE_BUCKETS,
            negative_recency: NegativeRecencyPolicy::default(),
        }
    }

    pub fn with_min_customers(mut self, min_customers: usize) -> Self {
        self.min_customers = min_customers;
        self
    }

    pub fn with_negative_recency(mut self, policy: NegativeRecencyPolicy) -> Self {
        self.negative_recency = policy;
        self
    }

    pub fn validate(&self) -> RfmResult<()> {
        if self.min_customers < 2 {
            return Err(RfmError::InvalidConfig(format!(
                "min_customers must be at least 2, got {}",
                self.min_customers
            )));
        }
        Ok(())
    }
}

/// Output of a pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct RfmReport {
    /// One entry per qualifying customer, ordered by customer id
    pub customers: Vec<SegmentedCustomer>,
    pub cleaning: CleaningStats,
}

/// Run the full RFM segmentation over raw transaction rows.
///
/// The run is a pure function of `rows` and `config`: the same input always
/// yields the same report.
pub fn create_rfm(rows: Vec<TransactionRow>, config: &RfmConfig) -> RfmResult<RfmReport> {
    config.validate()?;

    let (cleaned, cleaning) = clean_transactions(transactions_frame(&rows)?)?;
    let metrics = compute_metrics(&cleaned, config.analysis_date, config.negative_recency)?;
    let scored = score_customers(metrics, config.min_customers)?;
    let customers = segment_customers(scored)?;

    info!(
        customers = customers.len(),
        analysis_date = %config.analysis_date,
        "RFM segmentation complete"
    );
    Ok(RfmReport {
        customers,
        cleaning,
    })
}
