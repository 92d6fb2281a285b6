//! Transaction loading and row cleaning with Polars

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::{debug, info, warn};

/// Marker contained in the invoice id of cancelled or returned orders.
pub const CANCELLATION_MARKER: &str = "C";

/// Column names of the transaction frame
pub const INVOICE: &str = "Invoice";
pub const STOCK_CODE: &str = "StockCode";
pub const DESCRIPTION: &str = "Description";
pub const QUANTITY: &str = "Quantity";
/// Seconds since the Unix epoch
pub const INVOICE_DATE: &str = "InvoiceDate";
pub const PRICE: &str = "Price";
pub const CUSTOMER_ID: &str = "Customer ID";
pub const COUNTRY: &str = "Country";
pub const LINE_TOTAL: &str = "TotalPrice";

/// Accepted header spellings per field. The first name present in the file wins.
const INVOICE_COLUMNS: &[&str] = &["Invoice", "InvoiceNo"];
const STOCK_CODE_COLUMNS: &[&str] = &["StockCode"];
const DESCRIPTION_COLUMNS: &[&str] = &["Description"];
const QUANTITY_COLUMNS: &[&str] = &["Quantity"];
const INVOICE_DATE_COLUMNS: &[&str] = &["InvoiceDate"];
const PRICE_COLUMNS: &[&str] = &["Price", "UnitPrice"];
const CUSTOMER_COLUMNS: &[&str] = &["Customer ID", "CustomerID"];
const COUNTRY_COLUMNS: &[&str] = &["Country"];

/// How the text of a date cell is laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateLayout {
    Rfc3339,
    Pattern(&'static str),
    /// `YYYY-MM-DD`, read as midnight
    DateOnly,
}

/// Layouts that cannot be confused with one another
const ISO_LAYOUTS: &[DateLayout] = &[
    DateLayout::Rfc3339,
    DateLayout::Pattern("%Y-%m-%d %H:%M:%S"),
    DateLayout::Pattern("%Y-%m-%dT%H:%M:%S"),
    DateLayout::Pattern("%Y-%m-%d %H:%M"),
    DateLayout::Pattern("%Y-%m-%dT%H:%M"),
    DateLayout::DateOnly,
];

/// Slash layouts. Month-first is listed first, so a column where every
/// day is at most 12 reads month-first.
const SLASH_LAYOUTS: &[DateLayout] = &[
    DateLayout::Pattern("%m/%d/%Y %H:%M"),
    DateLayout::Pattern("%m/%d/%Y %H:%M:%S"),
    DateLayout::Pattern("%d/%m/%Y %H:%M"),
    DateLayout::Pattern("%d/%m/%Y %H:%M:%S"),
];

impl DateLayout {
    pub fn parse(self, value: &str) -> Option<NaiveDateTime> {
        let value = value.trim();
        match self {
            DateLayout::Rfc3339 => DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.naive_utc()),
            DateLayout::Pattern(format) => NaiveDateTime::parse_from_str(value, format).ok(),
            DateLayout::DateOnly => NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0)),
        }
    }
}

/// One invoice line as read from the source, before any validation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransactionRow {
    pub invoice_id: Option<String>,
    pub stock_code: Option<String>,
    pub description: Option<String>,
    /// Negative for returns
    pub quantity: Option<i64>,
    pub unit_price: Option<f64>,
    pub timestamp: Option<NaiveDateTime>,
    pub customer_id: Option<i64>,
    pub country: Option<String>,
}

/// Row counts collected while cleaning
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleaningStats {
    pub input_rows: usize,
    /// Rows missing a required field
    pub dropped_incomplete: usize,
    /// Complete rows whose invoice id carries the cancellation marker
    pub dropped_cancelled: usize,
    pub retained: usize,
}

/// Build the transaction frame, one row per [`TransactionRow`] in order.
pub fn transactions_frame(rows: &[TransactionRow]) -> PolarsResult<DataFrame> {
    let invoices: Vec<Option<String>> = rows.iter().map(|r| r.invoice_id.clone()).collect();
    let stock_codes: Vec<Option<String>> = rows.iter().map(|r| r.stock_code.clone()).collect();
    let descriptions: Vec<Option<String>> = rows.iter().map(|r| r.description.clone()).collect();
    let quantities: Vec<Option<i64>> = rows.iter().map(|r| r.quantity).collect();
    let dates: Vec<Option<i64>> = rows
        .iter()
        .map(|r| r.timestamp.map(|t| t.and_utc().timestamp()))
        .collect();
    let prices: Vec<Option<f64>> = rows.iter().map(|r| r.unit_price).collect();
    let customers: Vec<Option<i64>> = rows.iter().map(|r| r.customer_id).collect();
    let countries: Vec<Option<String>> = rows.iter().map(|r| r.country.clone()).collect();

    df!(
        INVOICE => invoices,
        STOCK_CODE => stock_codes,
        DESCRIPTION => descriptions,
        QUANTITY => quantities,
        INVOICE_DATE => dates,
        PRICE => prices,
        CUSTOMER_ID => customers,
        COUNTRY => countries,
    )
}

/// Drop incomplete and cancelled rows and attach line totals.
///
/// The `TotalPrice` column is derived for every row first. A row is then
/// dropped when any of customer id, invoice id, description, quantity,
/// unit price or invoice date is null, and after that when its invoice id
/// contains [`CANCELLATION_MARKER`]. Row order is preserved.
pub fn clean_transactions(df: DataFrame) -> PolarsResult<(DataFrame, CleaningStats)> {
    let input_rows = df.height();

    let complete = df
        .lazy()
        .with_column((col(QUANTITY).cast(DataType::Float64) * col(PRICE)).alias(LINE_TOTAL))
        .filter(
            col(CUSTOMER_ID)
                .is_not_null()
                .and(col(INVOICE).is_not_null())
                .and(col(DESCRIPTION).is_not_null())
                .and(col(QUANTITY).is_not_null())
                .and(col(PRICE).is_not_null())
                .and(col(INVOICE_DATE).is_not_null()),
        )
        .collect()?;
    let complete_rows = complete.height();

    let cleaned = complete
        .lazy()
        .filter(
            col(INVOICE)
                .str()
                .contains_literal(lit(CANCELLATION_MARKER))
                .not(),
        )
        .collect()?;

    let stats = CleaningStats {
        input_rows,
        dropped_incomplete: input_rows - complete_rows,
        dropped_cancelled: complete_rows - cleaned.height(),
        retained: cleaned.height(),
    };
    info!(
        input = stats.input_rows,
        incomplete = stats.dropped_incomplete,
        cancelled = stats.dropped_cancelled,
        retained = stats.retained,
        "Cleaned transaction rows"
    );

    Ok((cleaned, stats))
}

/// Load transaction rows from a CSV file.
///
/// Every column is read as text and parsed here, so a malformed cell turns
/// into a missing field rather than failing the whole file. The date layout
/// is chosen once for the whole `InvoiceDate` column.
///
/// # Arguments
/// * `file_path` - Path to the CSV file
///
/// # Returns
/// * Raw rows in file order
pub fn load_transactions(file_path: impl AsRef<Path>) -> crate::Result<Vec<TransactionRow>> {
    let file_path = file_path.as_ref();
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(file_path.to_path_buf()))
        .with_context(|| format!("Failed to open {}", file_path.display()))?
        .finish()
        .with_context(|| format!("Failed to parse CSV {}", file_path.display()))?;

    if df.height() == 0 {
        anyhow::bail!("No rows found in {}", file_path.display());
    }

    let invoices = text_column(&df, INVOICE_COLUMNS, true)?;
    let stock_codes = text_column(&df, STOCK_CODE_COLUMNS, false)?;
    let descriptions = text_column(&df, DESCRIPTION_COLUMNS, true)?;
    let quantities = text_column(&df, QUANTITY_COLUMNS, true)?;
    let dates = text_column(&df, INVOICE_DATE_COLUMNS, true)?;
    let prices = text_column(&df, PRICE_COLUMNS, true)?;
    let customers = text_column(&df, CUSTOMER_COLUMNS, true)?;
    let countries = text_column(&df, COUNTRY_COLUMNS, false)?;

    let date_values: Vec<&str> = dates.iter().flatten().map(String::as_str).collect();
    let layout = detect_date_layout(&date_values);
    debug!(?layout, "Detected invoice date layout");

    let mut unparsed_dates = 0usize;
    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let raw_date = cell(&dates, i);
        let timestamp = raw_date.zip(layout).and_then(|(v, l)| l.parse(v));
        if raw_date.is_some() && timestamp.is_none() {
            unparsed_dates += 1;
        }

        rows.push(TransactionRow {
            invoice_id: cell(&invoices, i).map(str::to_string),
            stock_code: cell(&stock_codes, i).map(str::to_string),
            description: cell(&descriptions, i).map(str::to_string),
            quantity: cell(&quantities, i).and_then(parse_integer),
            unit_price: cell(&prices, i).and_then(|s| s.parse::<f64>().ok()),
            timestamp,
            customer_id: cell(&customers, i).and_then(parse_integer),
            country: cell(&countries, i).map(str::to_string),
        });
    }

    if unparsed_dates > 0 {
        warn!(count = unparsed_dates, ?layout, "Invoice dates not matching the column layout");
    }
    debug!(rows = rows.len(), path = %file_path.display(), "Loaded transactions");

    Ok(rows)
}

/// Pick the single layout used for a whole date column.
///
/// The first layout that parses every value wins. When none does, the
/// layout parsing the most values is used. Returns `None` when no layout
/// parses any value.
pub fn detect_date_layout(values: &[&str]) -> Option<DateLayout> {
    let mut best: Option<(DateLayout, usize)> = None;
    for &layout in ISO_LAYOUTS.iter().chain(SLASH_LAYOUTS) {
        let parsed = values.iter().filter(|v| layout.parse(v).is_some()).count();
        if parsed == values.len() && parsed > 0 {
            return Some(layout);
        }
        if parsed > 0 && best.map_or(true, |(_, n)| parsed > n) {
            best = Some((layout, parsed));
        }
    }
    best.map(|(layout, _)| layout)
}

/// Parse a single ISO 8601 / RFC 3339 timestamp or bare date.
///
/// Slash layouts are only accepted through [`detect_date_layout`], where
/// the whole column decides between month-first and day-first.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    ISO_LAYOUTS.iter().find_map(|layout| layout.parse(value))
}

/// Integers may be exported as floats (`13085.0`); accept those when
/// integral and inside the `i64` range.
fn parse_integer(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(n) = value.parse::<i64>() {
        return Some(n);
    }
    let f = value.parse::<f64>().ok()?;
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (f.is_finite() && f.fract() == 0.0 && in_range).then(|| f as i64)
}

fn text_column(
    df: &DataFrame,
    candidates: &[&str],
    required: bool,
) -> crate::Result<Vec<Option<String>>> {
    let Some(name) = candidates.iter().find(|name| df.column(name).is_ok()) else {
        if required {
            anyhow::bail!("Missing required column: {}", candidates.join(" / "));
        }
        return Ok(vec![None; df.height()]);
    };

    let values = df
        .column(name)?
        .str()?
        .into_iter()
        .map(|v| {
            v.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .collect();
    Ok(values)
}

fn cell(column: &[Option<String>], index: usize) -> Option<&str> {
    column.get(index).and_then(|v| v.as_deref())
}
