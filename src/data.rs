//! Data loading and preparation of invoice line items using Polars

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{DashboardError, Result};
use crate::source::SourceId;

pub const INVOICE_NO: &str = "InvoiceNo";
pub const CUSTOMER_ID: &str = "CustomerID";
pub const DESCRIPTION: &str = "Description";
pub const QUANTITY: &str = "Quantity";
pub const UNIT_PRICE: &str = "UnitPrice";
pub const INVOICE_DATE: &str = "InvoiceDate";
pub const LINE_REVENUE: &str = "LineRevenue";

/// Columns every transaction source must expose (case-sensitive).
pub const REQUIRED_COLUMNS: [&str; 6] = [
    INVOICE_NO,
    CUSTOMER_ID,
    DESCRIPTION,
    QUANTITY,
    UNIT_PRICE,
    INVOICE_DATE,
];

/// Customer identifier used for rows whose `CustomerID` is missing.
pub const UNKNOWN_CUSTOMER: &str = "Unknown";

const DATETIME_FORMATS: [&str; 5] = [
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// What to do with a row whose fields cannot be coerced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MalformedRowPolicy {
    /// Reject the whole load on the first malformed row.
    #[default]
    Fail,
    /// Drop the row, log it and keep loading.
    Skip,
}

/// Options controlling how a raw source becomes a prepared table.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    pub on_malformed: MalformedRowPolicy,
}

/// One CSV record before type coercion. Extra columns are ignored.
#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "InvoiceNo")]
    invoice_no: String,
    #[serde(rename = "CustomerID")]
    customer_id: Option<String>,
    #[serde(rename = "Description")]
    description: Option<String>,
    #[serde(rename = "Quantity")]
    quantity: String,
    #[serde(rename = "UnitPrice")]
    unit_price: String,
    #[serde(rename = "InvoiceDate")]
    invoice_date: String,
}

/// A prepared, typed invoice line item.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRow {
    pub invoice_no: String,
    pub customer_id: String,
    pub description: Option<String>,
    pub quantity: i64,
    pub unit_price: f64,
    pub invoice_date: NaiveDateTime,
    pub line_revenue: f64,
}

impl TransactionRow {
    /// Build a row, deriving line revenue as `quantity * unit_price`.
    pub fn new(
        invoice_no: impl Into<String>,
        customer_id: Option<&str>,
        description: Option<&str>,
        quantity: i64,
        unit_price: f64,
        invoice_date: NaiveDateTime,
    ) -> Self {
        Self {
            invoice_no: invoice_no.into(),
            customer_id: canonical_customer_id(customer_id),
            description: description.map(str::to_string),
            quantity,
            unit_price,
            invoice_date,
            line_revenue: line_revenue(quantity, unit_price),
        }
    }
}

/// Revenue of one line item.
pub fn line_revenue(quantity: i64, unit_price: f64) -> f64 {
    quantity as f64 * unit_price
}

/// Canonical string form of a customer identifier.
///
/// Missing, blank and `nan` identifiers map to [`UNKNOWN_CUSTOMER`]; numeric
/// identifiers exported as floats (`17850.0`) collapse to their integer form.
pub fn canonical_customer_id(raw: Option<&str>) -> String {
    let trimmed = raw.map(str::trim).unwrap_or("");
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return UNKNOWN_CUSTOMER.to_string();
    }

    if let Some(integer) = trimmed.strip_suffix(".0") {
        if !integer.is_empty() && integer.bytes().all(|b| b.is_ascii_digit()) {
            return integer.to_string();
        }
    }

    trimmed.to_string()
}

/// Parse an invoice timestamp in any of the accepted layouts.
///
/// Date-only values resolve to midnight; RFC 3339 values are converted to UTC.
pub fn parse_invoice_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Inclusive calendar-day range used to restrict a prepared table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(DashboardError::InvalidRange(format!(
                "start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Build a range from a caller-supplied list of bounds, which must hold exactly two dates.
    pub fn from_bounds(bounds: &[NaiveDate]) -> Result<Self> {
        match bounds {
            [start, end] => Self::new(*start, *end),
            other => Err(DashboardError::InvalidRange(format!(
                "expected exactly 2 bounds, got {}",
                other.len()
            ))),
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Whether `ts` falls on any day from `start` through `end`.
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        let day = ts.date();
        self.start <= day && day <= self.end
    }

    fn bounds(&self) -> Result<(NaiveDateTime, NaiveDateTime)> {
        let lower = self.start.and_hms_opt(0, 0, 0);
        let upper = self.end.and_hms_nano_opt(23, 59, 59, 999_999_999);
        match (lower, upper) {
            (Some(lower), Some(upper)) => Ok((lower, upper)),
            _ => Err(DashboardError::InvalidRange(format!(
                "cannot represent {} .. {} as timestamps",
                self.start, self.end
            ))),
        }
    }
}

/// The filtered, typed transaction table every downstream computation reads.
///
/// Never mutated after construction; filters produce new tables.
#[derive(Debug, Clone)]
pub struct PreparedTable {
    frame: DataFrame,
}

impl PreparedTable {
    /// Build a table from rows that already satisfy the retention rules.
    pub fn from_rows(rows: &[TransactionRow]) -> Result<Self> {
        let invoice_nos: Vec<&str> = rows.iter().map(|r| r.invoice_no.as_str()).collect();
        let customer_ids: Vec<&str> = rows.iter().map(|r| r.customer_id.as_str()).collect();
        let descriptions: Vec<Option<&str>> =
            rows.iter().map(|r| r.description.as_deref()).collect();
        let quantities: Vec<i64> = rows.iter().map(|r| r.quantity).collect();
        let unit_prices: Vec<f64> = rows.iter().map(|r| r.unit_price).collect();
        let invoice_dates: Vec<NaiveDateTime> = rows.iter().map(|r| r.invoice_date).collect();
        let revenues: Vec<f64> = rows.iter().map(|r| r.line_revenue).collect();

        let frame = df!(
            INVOICE_NO => invoice_nos,
            CUSTOMER_ID => customer_ids,
            DESCRIPTION => descriptions,
            QUANTITY => quantities,
            UNIT_PRICE => unit_prices,
            INVOICE_DATE => invoice_dates,
            LINE_REVENUE => revenues,
        )?;

        Ok(Self { frame })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Number of retained line items.
    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// New table holding only invoices within `range`.
    pub fn restrict_to(&self, range: &DateRange) -> Result<Self> {
        let (lower, upper) = range.bounds()?;
        let frame = self
            .frame
            .clone()
            .lazy()
            .filter(
                col(INVOICE_DATE)
                    .gt_eq(lit(lower))
                    .and(col(INVOICE_DATE).lt_eq(lit(upper))),
            )
            .collect()?;

        debug!(
            before = self.height(),
            after = frame.height(),
            start = %range.start(),
            end = %range.end(),
            "Applied date range"
        );

        Ok(Self { frame })
    }

    /// Earliest and latest invoice timestamps, or `None` for an empty table.
    pub fn date_span(&self) -> Result<Option<(NaiveDateTime, NaiveDateTime)>> {
        let dates = self.frame.column(INVOICE_DATE)?.datetime()?;
        let span = dates
            .as_datetime_iter()
            .flatten()
            .fold(None, |acc: Option<(NaiveDateTime, NaiveDateTime)>, ts| match acc {
                None => Some((ts, ts)),
                Some((lo, hi)) => Some((lo.min(ts), hi.max(ts))),
            });
        Ok(span)
    }

    /// Materialize the table back into typed rows.
    pub fn rows(&self) -> Result<Vec<TransactionRow>> {
        let invoice_nos = self.frame.column(INVOICE_NO)?.str()?;
        let customer_ids = self.frame.column(CUSTOMER_ID)?.str()?;
        let descriptions = self.frame.column(DESCRIPTION)?.str()?;
        let quantities = self.frame.column(QUANTITY)?.i64()?;
        let unit_prices = self.frame.column(UNIT_PRICE)?.f64()?;
        let invoice_dates = self.frame.column(INVOICE_DATE)?.datetime()?;
        let revenues = self.frame.column(LINE_REVENUE)?.f64()?;

        let rows = invoice_nos
            .into_iter()
            .zip(customer_ids.into_iter())
            .zip(descriptions.into_iter())
            .zip(quantities.into_iter())
            .zip(unit_prices.into_iter())
            .zip(invoice_dates.as_datetime_iter())
            .zip(revenues.into_iter())
            .filter_map(
                |((((((invoice, customer), description), quantity), price), date), revenue)| {
                    Some(TransactionRow {
                        invoice_no: invoice?.to_string(),
                        customer_id: customer?.to_string(),
                        description: description.map(str::to_string),
                        quantity: quantity?,
                        unit_price: price?,
                        invoice_date: date?,
                        line_revenue: revenue?,
                    })
                },
            )
            .collect();

        Ok(rows)
    }
}

/// Read a source and prepare its transactions.
pub fn load_transactions(source: &SourceId, options: &LoadOptions) -> Result<PreparedTable> {
    let text = source.read_text()?;
    let table = prepare_transactions(&text, options)?;
    info!(source = %source, rows = table.height(), "Prepared transactions");
    Ok(table)
}

/// Parse CSV text into a prepared table.
///
/// Rows with a non-positive (or missing) quantity or unit price are dropped.
/// Coercion failures follow `options.on_malformed`.
pub fn prepare_transactions(text: &str, options: &LoadOptions) -> Result<PreparedTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(DashboardError::MissingColumn(column.to_string()));
        }
    }

    let mut rows = Vec::new();
    let mut read = 0usize;
    let mut dropped = 0usize;
    let mut skipped = 0usize;

    for (index, result) in reader.records().enumerate() {
        read += 1;
        let fallback_line = index as u64 + 2;

        let parsed = result
            .map_err(|e| DashboardError::MalformedRow {
                line: e.position().map(|p| p.line()).unwrap_or(fallback_line),
                column: "<record>".to_string(),
                value: e.to_string(),
            })
            .and_then(|record| {
                let line = record.position().map(|p| p.line()).unwrap_or(fallback_line);
                let raw: RawRow =
                    record
                        .deserialize(Some(&headers))
                        .map_err(|e| DashboardError::MalformedRow {
                            line,
                            column: "<record>".to_string(),
                            value: e.to_string(),
                        })?;
                coerce_row(raw, line)
            });

        match parsed {
            Ok(Some(row)) => rows.push(row),
            Ok(None) => dropped += 1,
            Err(err @ DashboardError::MalformedRow { .. })
                if options.on_malformed == MalformedRowPolicy::Skip =>
            {
                warn!(error = %err, "Skipping malformed row");
                skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }

    debug!(
        read,
        retained = rows.len(),
        dropped,
        skipped,
        "Filtered transaction rows"
    );

    PreparedTable::from_rows(&rows)
}

/// Coerce one raw record. `Ok(None)` means the row fails the retention filter.
///
/// Quantity and price are checked before the timestamp, so a dropped row is
/// never rejected for its date.
fn coerce_row(raw: RawRow, line: u64) -> Result<Option<TransactionRow>> {
    let quantity = parse_optional(&raw.quantity, QUANTITY, line, |s| s.parse::<i64>().ok())?;
    let unit_price = parse_optional(&raw.unit_price, UNIT_PRICE, line, |s| {
        s.parse::<f64>().ok().filter(|p| p.is_finite())
    })?;

    let (quantity, unit_price) = match (quantity, unit_price) {
        (Some(q), Some(p)) if q > 0 && p > 0.0 => (q, p),
        _ => return Ok(None),
    };

    // The frame stores nanosecond timestamps, roughly years 1677 through 2262.
    let invoice_date = parse_invoice_timestamp(&raw.invoice_date)
        .filter(|ts| ts.and_utc().timestamp_nanos_opt().is_some())
        .ok_or_else(|| DashboardError::MalformedRow {
            line,
            column: INVOICE_DATE.to_string(),
            value: raw.invoice_date.clone(),
        })?;

    Ok(Some(TransactionRow::new(
        raw.invoice_no,
        raw.customer_id.as_deref(),
        raw.description.as_deref(),
        quantity,
        unit_price,
        invoice_date,
    )))
}

/// Blank numeric fields count as missing; anything else must parse.
fn parse_optional<T>(
    raw: &str,
    column: &str,
    line: u64,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    parse(trimmed)
        .map(Some)
        .ok_or_else(|| DashboardError::MalformedRow {
            line,
            column: column.to_string(),
            value: raw.to_string(),
        })
}
