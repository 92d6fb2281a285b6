//! Quantile scoring of RFM metrics into 1-5 ordinal scores

use std::cmp::Ordering;
use std::fmt;

use tracing::info;

use crate::error::{RfmError, RfmResult};
use crate::metrics::CustomerMetrics;

/// Number of quantile buckets each metric is cut into
pub const QUANTILE_BUCKETS: usize = 5;

/// An ordinal score in `1..=5`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Score(u8);

impl Score {
    pub const MIN: Score = Score(1);
    pub const MAX: Score = Score(QUANTILE_BUCKETS as u8);

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN.0..=Self::MAX.0)
            .contains(&value)
            .then_some(Score(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// The score counted from the other end of the scale (1 ↔ 5)
    fn inverted(self) -> Self {
        Score(Self::MAX.0 + Self::MIN.0 - self.0)
    }

    /// Every valid score in ascending order
    pub fn all() -> impl Iterator<Item = Score> {
        (Self::MIN.0..=Self::MAX.0).map(Score)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Recency score followed by frequency score, rendered as e.g. `"54"`.
///
/// The monetary score is deliberately not part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RfmKey {
    pub recency: Score,
    pub frequency: Score,
}

impl RfmKey {
    pub fn new(recency: Score, frequency: Score) -> Self {
        Self { recency, frequency }
    }

    /// Parse a two-digit key such as `"35"`
    pub fn parse(key: &str) -> Option<Self> {
        let mut digits = key.chars().map(|c| c.to_digit(10));
        let (Some(Some(r)), Some(Some(f)), None) = (digits.next(), digits.next(), digits.next())
        else {
            return None;
        };
        Some(Self::new(Score::new(r as u8)?, Score::new(f as u8)?))
    }

    /// All 25 keys of the score grid
    pub fn all() -> impl Iterator<Item = RfmKey> {
        Score::all().flat_map(|r| Score::all().map(move |f| RfmKey::new(r, f)))
    }
}

impl fmt::Display for RfmKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.recency, self.frequency)
    }
}

/// Customer metrics with their quantile scores attached
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCustomer {
    pub metrics: CustomerMetrics,
    pub recency_score: Score,
    pub frequency_score: Score,
    pub monetary_score: Score,
    pub rfm_key: RfmKey,
}

/// Assign each value a quantile bucket in `1..=5` by rank.
///
/// Values are ordered by `compare` with a stable sort, so equal values keep
/// their input order. The rank `i` of `n` values lands in bucket
/// `max(1, ceil(5i / (n - 1)))`, which cuts the ranks `1..=n` into five
/// equal-width intervals: bucket sizes differ by at most one and bucket
/// membership depends only on the input order.
///
/// # Returns
/// * One bucket per input value, aligned with the input
pub fn quantile_buckets<T, F>(values: &[T], mut compare: F) -> Vec<Score>
where
    F: FnMut(&T, &T) -> Ordering,
{
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| compare(&values[a], &values[b]));

    let mut buckets = vec![Score::MIN; n];
    for (rank, &index) in order.iter().enumerate() {
        buckets[index] = rank_bucket(rank, n);
    }
    buckets
}

fn rank_bucket(rank: usize, n: usize) -> Score {
    if rank == 0 || n < 2 {
        return Score::MIN;
    }
    // ceil(5 * rank / (n - 1))
    let bucket = (QUANTILE_BUCKETS * rank + n - 2) / (n - 1);
    Score(bucket.clamp(1, QUANTILE_BUCKETS) as u8)
}

/// Score every customer on recency, frequency and monetary value.
///
/// Recency is inverted: the most recent buyers get 5. Frequency and
/// monetary give 5 to the largest values. Ties fall back to input order,
/// which is customer-id order when fed from [`crate::metrics::compute_metrics`].
///
/// # Arguments
/// * `metrics` - Aggregated customers
/// * `min_customers` - Smallest population accepted for binning
///
/// # Errors
/// * [`RfmError::EmptyCustomerSet`] for an empty table
/// * [`RfmError::InsufficientPopulation`] below `min_customers`
pub fn score_customers(
    metrics: Vec<CustomerMetrics>,
    min_customers: usize,
) -> RfmResult<Vec<ScoredCustomer>> {
    if metrics.is_empty() {
        return Err(RfmError::EmptyCustomerSet);
    }
    if metrics.len() < min_customers {
        return Err(RfmError::InsufficientPopulation {
            count: metrics.len(),
            required: min_customers,
        });
    }

    let recency = quantile_buckets(&metrics, |a, b| a.recency.cmp(&b.recency));
    let frequency = quantile_buckets(&metrics, |a, b| a.frequency.cmp(&b.frequency));
    let monetary = quantile_buckets(&metrics, |a, b| a.monetary.total_cmp(&b.monetary));

    let scored: Vec<ScoredCustomer> = metrics
        .into_iter()
        .enumerate()
        .map(|(i, metrics)| {
            let recency_score = recency[i].inverted();
            let frequency_score = frequency[i];
            ScoredCustomer {
                metrics,
                recency_score,
                frequency_score,
                monetary_score: monetary[i],
                rfm_key: RfmKey::new(recency_score, frequency_score),
            }
        })
        .collect();

    info!(customers = scored.len(), "Computed quantile scores");
    Ok(scored)
}
