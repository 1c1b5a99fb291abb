// ⏰ Temporal Feature Builder
// Splits the transaction log at a fixed horizon before its latest timestamp:
// history before the cutoff becomes features, spend after it becomes the label.
//
// Two times matter here:
// 1. Cutoff: max(timestamp) - horizon, computed from the data itself
// 2. Event time: when each transaction line happened
//
// A transaction exactly at the cutoff belongs to the feature window.

use crate::attributes::CustomerFeatureRow;
use crate::dataset::{to_records, RawTransaction, TransactionRecord};
use crate::error::{ClvError, Result};
use chrono::{Duration, NaiveDateTime};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// Label horizon used by the pipeline unless configured otherwise
pub const DEFAULT_HORIZON_DAYS: i64 = 90;

// ============================================================================
// FEATURE SET
// ============================================================================

/// Builder output: one row per customer active in both windows
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub cutoff: NaiveDateTime,
    pub rows: Vec<CustomerFeatureRow>,

    /// Customers seen in the feature window with no label-window spend
    pub dropped_without_label: usize,

    /// Customers seen only in the label window
    pub dropped_without_history: usize,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// WINDOW AGGREGATES
// ============================================================================

/// Per-customer accumulator over the feature window
struct HistoryAggregate<'a> {
    first_purchase: NaiveDateTime,
    last_purchase: NaiveDateTime,
    invoices: HashSet<&'a str>,
    total_quantity: i64,
    lines: usize,
    prices: Vec<f64>,
}

impl<'a> HistoryAggregate<'a> {
    fn new(record: &'a TransactionRecord) -> Self {
        HistoryAggregate {
            first_purchase: record.timestamp,
            last_purchase: record.timestamp,
            invoices: HashSet::new(),
            total_quantity: 0,
            lines: 0,
            prices: Vec::new(),
        }
    }

    fn add(&mut self, record: &'a TransactionRecord) -> Result<()> {
        self.total_quantity = self.total_quantity.checked_add(record.quantity).ok_or_else(|| {
            ClvError::Computation(format!(
                "total quantity overflows for customer '{}' at invoice '{}'",
                record.customer_id, record.invoice
            ))
        })?;
        self.first_purchase = self.first_purchase.min(record.timestamp);
        self.last_purchase = self.last_purchase.max(record.timestamp);
        self.invoices.insert(record.invoice.as_str());
        self.lines += 1;
        self.prices.push(record.unit_price);
        Ok(())
    }

    fn avg_quantity(&self) -> f64 {
        self.total_quantity as f64 / self.lines as f64
    }

    /// Sample standard deviation (n - 1) over feature-window lines, not invoices.
    /// A single line has none, reported as 0; a one-invoice customer with
    /// several differently priced lines gets a non-zero value.
    fn unit_price_std(&self) -> f64 {
        let n = self.prices.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.prices.iter().sum::<f64>() / n as f64;
        let sum_sq: f64 = self.prices.iter().map(|p| (p - mean).powi(2)).sum();
        (sum_sq / (n - 1) as f64).sqrt()
    }

    fn into_row(self, cutoff: NaiveDateTime, label_spend: f64) -> CustomerFeatureRow {
        let unique_invoices = self.invoices.len() as i64;
        let customer_age_days = whole_days(cutoff - self.first_purchase);
        let days_since_last_purchase = whole_days(cutoff - self.last_purchase);

        CustomerFeatureRow {
            unique_invoices,
            total_quantity: self.total_quantity,
            avg_quantity_per_order: round2(self.avg_quantity()),
            unit_price_std: round2(self.unit_price_std()),
            customer_age_days,
            days_since_last_purchase,
            average_days_between_purchase: customer_age_days as f64 / unique_invoices as f64,
            is_onetime_buyer: i64::from(unique_invoices == 1),
            target_clv: label_spend.ln_1p(),
        }
    }
}

/// Whole days, rounded down
fn whole_days(span: Duration) -> i64 {
    span.num_seconds().div_euclid(86_400)
}

/// Two decimals, ties to even
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

// ============================================================================
// TEMPORAL FEATURE BUILDER
// ============================================================================

/// TemporalFeatureBuilder - transaction log → customer feature rows
///
/// Pure function of the records and the horizon. Customers need activity
/// on both sides of the cutoff to produce a row (inner join).
#[derive(Debug, Clone, Copy)]
pub struct TemporalFeatureBuilder {
    horizon: Duration,
}

impl TemporalFeatureBuilder {
    pub fn new(horizon: Duration) -> Self {
        TemporalFeatureBuilder { horizon }
    }

    pub fn with_horizon_days(days: i64) -> Self {
        Self::new(Duration::days(days))
    }

    pub fn horizon(&self) -> Duration {
        self.horizon
    }

    /// `max(timestamp) - horizon`; an empty log has no cutoff
    pub fn cutoff(&self, records: &[TransactionRecord]) -> Result<NaiveDateTime> {
        if self.horizon <= Duration::zero() {
            return Err(ClvError::Computation(format!(
                "horizon must be positive, got {} days",
                self.horizon.num_days()
            )));
        }

        let latest = records
            .iter()
            .map(|r| r.timestamp)
            .max()
            .ok_or_else(|| ClvError::Computation("transaction log is empty, no maximum timestamp".to_string()))?;

        latest
            .checked_sub_signed(self.horizon)
            .ok_or_else(|| ClvError::Computation(format!("cutoff before {} is out of range", latest)))
    }

    pub fn build(&self, records: &[TransactionRecord]) -> Result<FeatureSet> {
        let cutoff = self.cutoff(records)?;
        info!(cutoff = %cutoff.date(), records = records.len(), "Using cutoff date");

        let mut history: BTreeMap<&str, HistoryAggregate<'_>> = BTreeMap::new();
        let mut label_spend: BTreeMap<&str, f64> = BTreeMap::new();

        for record in records {
            let customer = record.customer_id.as_str();
            if record.timestamp <= cutoff {
                history
                    .entry(customer)
                    .or_insert_with(|| HistoryAggregate::new(record))
                    .add(record)?;
            } else {
                *label_spend.entry(customer).or_insert(0.0) += record.line_amount;
            }
        }

        let dropped_without_history = label_spend
            .keys()
            .filter(|customer| !history.contains_key(*customer))
            .count();

        let mut dropped_without_label = 0usize;
        let mut rows = Vec::with_capacity(history.len());

        for (customer, aggregate) in history {
            match label_spend.get(customer) {
                Some(&spend) => rows.push(aggregate.into_row(cutoff, spend)),
                None => {
                    dropped_without_label += 1;
                    debug!(customer, "No label-window activity, customer excluded");
                }
            }
        }

        info!(
            rows = rows.len(),
            dropped_without_label,
            dropped_without_history,
            "Feature engineering completed"
        );

        Ok(FeatureSet {
            cutoff,
            rows,
            dropped_without_label,
            dropped_without_history,
        })
    }

    /// Convert raw CSV rows and build; the first malformed row aborts
    pub fn build_from_raw(&self, rows: &[RawTransaction]) -> Result<FeatureSet> {
        let records = to_records(rows)?;
        self.build(&records)
    }
}

impl Default for TemporalFeatureBuilder {
    fn default() -> Self {
        Self::with_horizon_days(DEFAULT_HORIZON_DAYS)
    }
}

// ============================================================================
// TESTS
// ============================================================================
