// 🗄️ Transaction Log - CSV in, typed records out
// Raw rows keep their string form until conversion so that a malformed
// timestamp or quantity can be reported with the invoice it came from.

use crate::attributes::CustomerFeatureRow;
use crate::error::{ClvError, Result};
use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Timestamp layouts seen in retail exports
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

// ============================================================================
// RAW TRANSACTION
// ============================================================================

/// RawTransaction - one CSV line, untyped
///
/// Columns not listed here (StockCode, Description, Country) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTransaction {
    #[serde(rename = "Invoice")]
    pub invoice: String,

    #[serde(rename = "Customer ID", default)]
    pub customer_id: Option<String>,

    #[serde(rename = "InvoiceDate", default)]
    pub invoice_date: Option<String>,

    #[serde(rename = "Quantity", default)]
    pub quantity: Option<String>,

    #[serde(rename = "Price", default)]
    pub price: Option<String>,

    /// Always recomputed as quantity × price by `preprocess`; an input value is discarded
    #[serde(rename = "Total Amount", default)]
    pub total_amount: Option<String>,
}

impl RawTransaction {
    /// Cancellation and credit invoices carry a leading 'C'
    pub fn is_cancellation(&self) -> bool {
        self.invoice.trim_start().starts_with('C')
    }

    pub fn has_customer(&self) -> bool {
        non_blank(&self.customer_id).is_some()
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

// ============================================================================
// TRANSACTION RECORD
// ============================================================================

/// Typed transaction line used by the feature builder
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub invoice: String,
    pub customer_id: String,
    pub timestamp: NaiveDateTime,
    pub quantity: i64,
    pub unit_price: f64,

    /// quantity × unit_price
    pub line_amount: f64,
}

impl TransactionRecord {
    pub fn new(
        invoice: impl Into<String>,
        customer_id: impl Into<String>,
        timestamp: NaiveDateTime,
        quantity: i64,
        unit_price: f64,
    ) -> Self {
        TransactionRecord {
            invoice: invoice.into(),
            customer_id: customer_id.into(),
            timestamp,
            quantity,
            unit_price,
            line_amount: quantity as f64 * unit_price,
        }
    }
}

impl TryFrom<&RawTransaction> for TransactionRecord {
    type Error = ClvError;

    fn try_from(raw: &RawTransaction) -> Result<Self> {
        let invoice = raw.invoice.trim();

        let customer_id = non_blank(&raw.customer_id)
            .ok_or_else(|| field_error(invoice, "Customer ID", "absent"))?;

        let date_str = non_blank(&raw.invoice_date)
            .ok_or_else(|| field_error(invoice, "InvoiceDate", "absent"))?;
        let timestamp = parse_timestamp(date_str)
            .ok_or_else(|| field_error(invoice, "InvoiceDate", &format!("unrecognised timestamp '{}'", date_str)))?;

        let qty_str = non_blank(&raw.quantity)
            .ok_or_else(|| field_error(invoice, "Quantity", "absent"))?;
        let quantity = parse_quantity(qty_str)
            .ok_or_else(|| field_error(invoice, "Quantity", &format!("not a whole number: '{}'", qty_str)))?;

        let price_str = non_blank(&raw.price)
            .ok_or_else(|| field_error(invoice, "Price", "absent"))?;
        let unit_price = parse_finite(price_str)
            .ok_or_else(|| field_error(invoice, "Price", &format!("not numeric: '{}'", price_str)))?;

        Ok(TransactionRecord::new(invoice, customer_id, timestamp, quantity, unit_price))
    }
}

fn field_error(invoice: &str, field: &str, problem: &str) -> ClvError {
    ClvError::Computation(format!("invoice {}: field '{}' {}", invoice, field, problem))
}

/// Parse a timestamp in any of the supported layouts; bare dates mean midnight
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();

    for fmt in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}

fn parse_quantity(s: &str) -> Option<i64> {
    if let Ok(q) = s.parse::<i64>() {
        return Some(q);
    }
    // Exports sometimes write integer columns as "6.0"
    let f = parse_finite(s)?;
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn parse_finite(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

// ============================================================================
// PREPROCESSING
// ============================================================================

/// Drop rows without a customer and cancellation invoices, then fill in
/// the line amount for every remaining row.
pub fn preprocess(rows: Vec<RawTransaction>) -> Vec<RawTransaction> {
    let total = rows.len();
    let mut without_customer = 0usize;
    let mut cancellations = 0usize;

    let kept: Vec<RawTransaction> = rows
        .into_iter()
        .filter(|row| {
            if !row.has_customer() {
                without_customer += 1;
                return false;
            }
            if row.is_cancellation() {
                cancellations += 1;
                return false;
            }
            true
        })
        .map(|mut row| {
            let qty = non_blank(&row.quantity).and_then(parse_finite);
            let price = non_blank(&row.price).and_then(parse_finite);
            row.total_amount = qty.zip(price).map(|(q, p)| (q * p).to_string());
            row
        })
        .collect();

    info!(
        total,
        kept = kept.len(),
        without_customer,
        cancellations,
        "Preprocessing completed"
    );

    kept
}

/// Convert every raw row, failing on the first malformed one
pub fn to_records(rows: &[RawTransaction]) -> Result<Vec<TransactionRecord>> {
    rows.iter().map(TransactionRecord::try_from).collect()
}

// ============================================================================
// CSV I/O
// ============================================================================

pub fn load_transactions(csv_path: &Path) -> anyhow::Result<Vec<RawTransaction>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;

    let mut rows = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let row: RawTransaction =
            result.with_context(|| format!("Failed to deserialize transaction at record {}", line + 1))?;
        rows.push(row);
    }

    info!(path = %csv_path.display(), rows = rows.len(), "Transactions loaded");
    Ok(rows)
}

pub fn write_feature_rows(csv_path: &Path, rows: &[CustomerFeatureRow]) -> anyhow::Result<()> {
    if let Some(parent) = csv_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }

    let mut wtr = csv::Writer::from_path(csv_path)
        .with_context(|| format!("Failed to create CSV file {}", csv_path.display()))?;
    for row in rows {
        wtr.serialize(row).context("Failed to write feature row")?;
    }
    wtr.flush().context("Failed to flush feature CSV")?;

    info!(path = %csv_path.display(), rows = rows.len(), "Feature rows saved");
    Ok(())
}

pub fn load_feature_rows(csv_path: &Path) -> anyhow::Result<Vec<CustomerFeatureRow>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;

    let rows = rdr
        .deserialize()
        .collect::<std::result::Result<Vec<CustomerFeatureRow>, _>>()
        .context("Failed to deserialize feature row")?;

    debug!(path = %csv_path.display(), rows = rows.len(), "Feature rows loaded");
    Ok(rows)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_raw(invoice: &str, customer: Option<&str>, date: &str, qty: &str, price: &str) -> RawTransaction {
        RawTransaction {
            invoice: invoice.to_string(),
            customer_id: customer.map(String::from),
            invoice_date: Some(date.to_string()),
            quantity: Some(qty.to_string()),
            price: Some(price.to_string()),
            total_amount: None,
        }
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2010, 12, 1)
            .unwrap()
            .and_hms_opt(8, 26, 0)
            .unwrap();

        assert_eq!(parse_timestamp("2010-12-01 08:26:00"), Some(expected));
        assert_eq!(parse_timestamp("2010-12-01T08:26:00"), Some(expected));
        assert_eq!(parse_timestamp("12/1/2010 8:26"), Some(expected));
        assert_eq!(
            parse_timestamp("2010-12-01"),
            NaiveDate::from_ymd_opt(2010, 12, 1).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_record_from_raw_computes_line_amount() {
        let raw = create_raw("536365", Some("17850.0"), "2010-12-01 08:26:00", "6", "2.55");

        let record = TransactionRecord::try_from(&raw).unwrap();

        assert_eq!(record.customer_id, "17850.0");
        assert_eq!(record.quantity, 6);
        assert!((record.line_amount - 15.3).abs() < 1e-9);
    }

    #[test]
    fn test_record_accepts_integral_float_quantity() {
        let raw = create_raw("536365", Some("1"), "2010-12-01 08:26:00", "6.0", "1");
        assert_eq!(TransactionRecord::try_from(&raw).unwrap().quantity, 6);
    }

    #[test]
    fn test_record_rejects_non_numeric_price() {
        let raw = create_raw("536365", Some("1"), "2010-12-01 08:26:00", "6", "cheap");

        let err = TransactionRecord::try_from(&raw).unwrap_err();
        assert!(matches!(err, ClvError::Computation(ref msg) if msg.contains("Price") && msg.contains("536365")));
    }

    #[test]
    fn test_record_rejects_missing_timestamp() {
        let mut raw = create_raw("536365", Some("1"), "", "6", "1.0");
        raw.invoice_date = None;

        let err = TransactionRecord::try_from(&raw).unwrap_err();
        assert!(matches!(err, ClvError::Computation(ref msg) if msg.contains("InvoiceDate")));
    }

    #[test]
    fn test_preprocess_drops_cancellations_and_anonymous_rows() {
        let rows = vec![
            create_raw("536365", Some("17850"), "2010-12-01 08:26:00", "6", "2.55"),
            create_raw("C536379", Some("17850"), "2010-12-01 09:41:00", "-1", "27.50"),
            create_raw("536366", None, "2010-12-01 08:28:00", "6", "1.85"),
            create_raw("536367", Some("  "), "2010-12-01 08:34:00", "8", "2.75"),
        ];

        let kept = preprocess(rows);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].invoice, "536365");
        let total: f64 = kept[0].total_amount.as_deref().unwrap().parse().unwrap();
        assert!((total - 15.3).abs() < 1e-9);
    }

    #[test]
    fn test_total_amount_is_always_recomputed() {
        let mut row = create_raw("536365", Some("17850"), "2010-12-01 08:26:00", "4", "2.5");
        row.total_amount = Some("999.0".to_string());

        let kept = preprocess(vec![row]);
        let total: f64 = kept[0].total_amount.as_deref().unwrap().parse().unwrap();
        assert!((total - 10.0).abs() < 1e-9);

        let record = TransactionRecord::try_from(&kept[0]).unwrap();
        assert_eq!(record.line_amount, 10.0);
    }

    #[test]
    fn test_stale_total_amount_does_not_override_line_amount() {
        let mut row = create_raw("536365", Some("17850"), "2010-12-01 08:26:00", "4", "2.5");
        row.total_amount = Some("not a number".to_string());

        let record = TransactionRecord::try_from(&row).unwrap();
        assert_eq!(record.line_amount, 10.0);
    }

    #[test]
    fn test_to_records_fails_fast() {
        let rows = vec![
            create_raw("1", Some("A"), "2010-12-01 08:26:00", "1", "1"),
            create_raw("2", Some("A"), "not a date", "1", "1"),
        ];

        assert!(to_records(&rows).is_err());
    }
}
