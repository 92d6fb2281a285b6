//! Per-customer Recency, Frequency and Monetary aggregation

use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::data::{CUSTOMER_ID, INVOICE, INVOICE_DATE, LINE_TOTAL};
use crate::error::{RfmError, RfmResult};

const SECONDS_PER_DAY: i64 = 86_400;

/// Minor currency units per unit (pence per pound)
const MINOR_UNITS: f64 = 100.0;

const LAST_PURCHASE: &str = "LastPurchaseDate";
const FREQUENCY: &str = "Frequency";
const MONETARY: &str = "Monetary";

/// What to do when the analysis date precedes a customer's last purchase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum NegativeRecencyPolicy {
    /// Fail the run with [`RfmError::FutureTransaction`]
    #[default]
    Reject,
    /// Treat the customer as having purchased on the analysis date
    Clamp,
}

/// Raw RFM values for one customer
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerMetrics {
    pub customer_id: i64,
    /// Whole days between the last purchase and the analysis date
    pub recency: i64,
    /// Distinct invoices
    pub frequency: usize,
    /// Sum of line totals, rounded to the minor currency unit
    pub monetary: f64,
}

/// Reduce the cleaned transaction frame to one [`CustomerMetrics`] per customer.
///
/// Output is ordered by customer id. Totals are rounded to the minor
/// currency unit, and customers whose rounded spend is not positive are
/// dropped.
///
/// # Arguments
/// * `cleaned` - Frame produced by [`crate::data::clean_transactions`]
/// * `analysis_date` - Reference point for recency
/// * `policy` - Handling of purchases after `analysis_date`
///
/// # Errors
/// * [`RfmError::EmptyCustomerSet`] when no customer has positive spend
/// * [`RfmError::FutureTransaction`] under [`NegativeRecencyPolicy::Reject`]
pub fn compute_metrics(
    cleaned: &DataFrame,
    analysis_date: NaiveDateTime,
    policy: NegativeRecencyPolicy,
) -> RfmResult<Vec<CustomerMetrics>> {
    let rfm_df = cleaned
        .clone()
        .lazy()
        .group_by([col(CUSTOMER_ID)])
        .agg([
            // Recency: latest purchase
            col(INVOICE_DATE).max().alias(LAST_PURCHASE),
            // Frequency: number of unique invoices
            col(INVOICE).n_unique().alias(FREQUENCY),
            // Monetary: total spending
            col(LINE_TOTAL).sum().alias(MONETARY),
        ])
        .sort_by_exprs([col(CUSTOMER_ID)], SortMultipleOptions::default())
        .collect()?;

    let customer_ids: Vec<i64> = rfm_df.column(CUSTOMER_ID)?.i64()?.into_no_null_iter().collect();
    let last_purchases: Vec<i64> = rfm_df.column(LAST_PURCHASE)?.i64()?.into_no_null_iter().collect();
    let frequency = rfm_df.column(FREQUENCY)?.cast(&DataType::Int64)?;
    let frequency: Vec<i64> = frequency.i64()?.into_no_null_iter().collect();
    let monetary: Vec<f64> = rfm_df.column(MONETARY)?.f64()?.into_no_null_iter().collect();

    let customer_count = customer_ids.len();
    let mut metrics = Vec::with_capacity(customer_count);
    for (i, &customer_id) in customer_ids.iter().enumerate() {
        let spend = round_to_minor_unit(monetary[i]);
        if spend <= 0.0 {
            debug!(customer_id, monetary = monetary[i], "Dropping customer with non-positive spend");
            continue;
        }

        let last_purchase = DateTime::from_timestamp(last_purchases[i], 0)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| RfmError::Frame(format!("invoice date out of range: {}", last_purchases[i])))?;

        metrics.push(CustomerMetrics {
            customer_id,
            recency: recency_days(customer_id, last_purchase, analysis_date, policy)?,
            frequency: frequency[i] as usize,
            monetary: spend,
        });
    }

    if metrics.is_empty() {
        return Err(RfmError::EmptyCustomerSet);
    }

    info!(
        customers = customer_count,
        retained = metrics.len(),
        "Aggregated RFM metrics"
    );
    Ok(metrics)
}

fn round_to_minor_unit(amount: f64) -> f64 {
    (amount * MINOR_UNITS).round() / MINOR_UNITS
}

/// Floor of the elapsed time in days
fn recency_days(
    customer_id: i64,
    last_purchase: NaiveDateTime,
    analysis_date: NaiveDateTime,
    policy: NegativeRecencyPolicy,
) -> RfmResult<i64> {
    if last_purchase <= analysis_date {
        let seconds = (analysis_date - last_purchase).num_seconds();
        return Ok(seconds.div_euclid(SECONDS_PER_DAY));
    }

    match policy {
        NegativeRecencyPolicy::Reject => Err(RfmError::FutureTransaction {
            customer_id,
            last_purchase,
            analysis_date,
        }),
        NegativeRecencyPolicy::Clamp => {
            warn!(
                customer_id,
                %last_purchase,
                %analysis_date,
                "Last purchase after analysis date, clamping recency to 0"
            );
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{clean_transactions, parse_timestamp, transactions_frame, TransactionRow};

    fn line(customer_id: i64, invoice: &str, date: &str, quantity: i64, price: f64) -> TransactionRow {
        TransactionRow {
            invoice_id: Some(invoice.to_string()),
            stock_code: None,
            description: Some("WHITE METAL LANTERN".to_string()),
            quantity: Some(quantity),
            unit_price: Some(price),
            timestamp: parse_timestamp(date),
            customer_id: Some(customer_id),
            country: None,
        }
    }

    fn metrics_for(rows: &[TransactionRow], policy: NegativeRecencyPolicy) -> RfmResult<Vec<CustomerMetrics>> {
        let (cleaned, _) = clean_transactions(transactions_frame(rows).unwrap()).unwrap();
        compute_metrics(&cleaned, analysis_date(), policy)
    }

    fn analysis_date() -> NaiveDateTime {
        parse_timestamp("2011-12-11").unwrap()
    }

    #[test]
    fn test_frequency_counts_distinct_invoices() {
        let rows = vec![
            line(17850, "536365", "2011-12-01 08:26:00", 1, 10.0),
            line(17850, "536365", "2011-12-01 08:26:00", 1, 10.0),
            line(17850, "536365", "2011-12-01 08:26:00", 1, 10.0),
            line(17850, "536366", "2011-12-05 09:00:00", 1, 5.0),
            line(17850, "536366", "2011-12-05 09:00:00", 1, 5.0),
        ];

        let metrics = metrics_for(&rows, NegativeRecencyPolicy::Reject).unwrap();

        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].frequency, 2);
        assert!((metrics[0].monetary - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_recency_uses_latest_purchase_and_floors() {
        let rows = vec![
            line(1, "1", "2011-11-01 10:00:00", 1, 1.0),
            line(1, "2", "2011-12-09 18:30:00", 1, 1.0),
        ];

        let metrics = metrics_for(&rows, NegativeRecencyPolicy::Reject).unwrap();

        // 1 day 5.5 hours
        assert_eq!(metrics[0].recency, 1);
    }

    #[test]
    fn test_output_sorted_by_customer_id() {
        let rows = vec![
            line(300, "1", "2011-12-01 10:00:00", 1, 1.0),
            line(100, "2", "2011-12-01 10:00:00", 1, 1.0),
            line(200, "3", "2011-12-01 10:00:00", 1, 1.0),
        ];

        let metrics = metrics_for(&rows, NegativeRecencyPolicy::Reject).unwrap();
        let ids: Vec<i64> = metrics.iter().map(|m| m.customer_id).collect();

        assert_eq!(ids, vec![100, 200, 300]);
    }

    #[test]
    fn test_non_positive_spend_dropped() {
        let rows = vec![
            line(1, "1", "2011-12-01 10:00:00", 1, 20.0),
            line(2, "2", "2011-12-01 10:00:00", 1, 5.0),
            line(2, "3", "2011-12-02 10:00:00", -1, 5.0),
        ];

        let metrics = metrics_for(&rows, NegativeRecencyPolicy::Reject).unwrap();

        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].customer_id, 1);
    }

    #[test]
    fn test_net_zero_spend_with_float_residue_dropped() {
        let rows = vec![
            line(1, "1", "2011-12-01 10:00:00", 1, 0.1),
            line(1, "2", "2011-12-01 10:00:00", 1, 0.2),
            line(1, "3", "2011-12-01 10:00:00", -1, 0.3),
        ];

        let result = metrics_for(&rows, NegativeRecencyPolicy::Reject);
        assert_eq!(result, Err(RfmError::EmptyCustomerSet));
    }

    #[test]
    fn test_round_to_minor_unit() {
        assert_eq!(round_to_minor_unit(0.1 + 0.2 - 0.3), 0.0);
        assert_eq!(round_to_minor_unit(15.299999999), 15.3);
        assert_eq!(round_to_minor_unit(-0.004), 0.0);
    }

    #[test]
    fn test_empty_customer_set() {
        let rows = vec![line(1, "1", "2011-12-01 10:00:00", 0, 1.0)];
        let result = metrics_for(&rows, NegativeRecencyPolicy::Reject);
        assert_eq!(result, Err(RfmError::EmptyCustomerSet));

        let result = metrics_for(&[], NegativeRecencyPolicy::Reject);
        assert_eq!(result, Err(RfmError::EmptyCustomerSet));
    }

    #[test]
    fn test_future_purchase_rejected_or_clamped() {
        let rows = vec![line(7, "1", "2011-12-11 09:00:00", 1, 3.0)];

        let result = metrics_for(&rows, NegativeRecencyPolicy::Reject);
        assert!(matches!(
            result,
            Err(RfmError::FutureTransaction { customer_id: 7, .. })
        ));

        let metrics = metrics_for(&rows, NegativeRecencyPolicy::Clamp).unwrap();
        assert_eq!(metrics[0].recency, 0);
    }
}
