//! RFM feature computation and standardization

use chrono::{Duration, NaiveDateTime};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use tracing::debug;

use crate::data::{PreparedTable, CUSTOMER_ID, INVOICE_DATE, INVOICE_NO, LINE_REVENUE};
use crate::error::{DashboardError, Result};

const LAST_PURCHASE: &str = "LastPurchase";
const FREQUENCY: &str = "Frequency";
const MONETARY: &str = "Monetary";

/// Recency, frequency and monetary value of one customer.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRfm {
    pub customer_id: String,
    /// Whole days between the reference instant and the last purchase.
    pub recency: i64,
    /// Distinct invoices.
    pub frequency: u64,
    /// Total line revenue.
    pub monetary: f64,
}

impl CustomerRfm {
    fn as_features(&self) -> [f64; 3] {
        [self.recency as f64, self.frequency as f64, self.monetary]
    }
}

/// Per-customer RFM records, sorted by customer identifier.
#[derive(Debug, Clone)]
pub struct RfmTable {
    /// One day after the latest invoice in the source table; `None` when it was empty.
    pub reference: Option<NaiveDateTime>,
    pub records: Vec<CustomerRfm>,
}

impl RfmTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Raw feature matrix, one row per customer: (recency, frequency, monetary).
    pub fn feature_matrix(&self) -> Result<Array2<f64>> {
        let data: Vec<f64> = self
            .records
            .iter()
            .flat_map(|record| record.as_features())
            .collect();
        Ok(Array2::from_shape_vec((self.records.len(), 3), data)?)
    }

    pub fn total_monetary(&self) -> f64 {
        self.records.iter().map(|r| r.monetary).sum()
    }
}

/// Aggregate the prepared table into one RFM record per customer.
///
/// The reference instant is the latest invoice timestamp plus one day, so
/// recency is never negative. An empty table yields an empty record set.
pub fn compute_rfm(table: &PreparedTable) -> Result<RfmTable> {
    let grouped = table
        .frame()
        .clone()
        .lazy()
        .group_by([col(CUSTOMER_ID)])
        .agg([
            col(INVOICE_DATE).max().alias(LAST_PURCHASE),
            col(INVOICE_NO)
                .n_unique()
                .cast(DataType::UInt64)
                .alias(FREQUENCY),
            col(LINE_REVENUE).sum().alias(MONETARY),
        ])
        .sort_by_exprs([col(CUSTOMER_ID)], SortMultipleOptions::default())
        .collect()?;

    let customers = grouped.column(CUSTOMER_ID)?.str()?;
    let last_purchases: Vec<Option<NaiveDateTime>> = grouped
        .column(LAST_PURCHASE)?
        .datetime()?
        .as_datetime_iter()
        .collect();
    let frequencies = grouped.column(FREQUENCY)?.u64()?;
    let monetaries = grouped.column(MONETARY)?.f64()?;

    let Some(latest) = last_purchases.iter().flatten().max().copied() else {
        return Ok(RfmTable {
            reference: None,
            records: Vec::new(),
        });
    };
    let reference = latest + Duration::days(1);

    let records: Vec<CustomerRfm> = customers
        .into_iter()
        .zip(last_purchases)
        .zip(frequencies.into_iter())
        .zip(monetaries.into_iter())
        .filter_map(|(((customer, last), frequency), monetary)| {
            Some(CustomerRfm {
                customer_id: customer?.to_string(),
                recency: (reference - last?).num_days(),
                frequency: frequency?,
                monetary: monetary.unwrap_or(0.0),
            })
        })
        .collect();

    debug!(customers = records.len(), reference = %reference, "Computed RFM features");

    Ok(RfmTable {
        reference: Some(reference),
        records,
    })
}

/// Column-wise z-score scaler using the population standard deviation
/// (ddof = 0, the same convention as scikit-learn's `StandardScaler`).
///
/// Zero-variance columns keep a unit scale, so their standardized values are 0.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    pub scale: Array1<f64>,
}

impl StandardScaler {
    /// Fit means and scales over the rows of `data`.
    pub fn fit(data: &Array2<f64>) -> Result<Self> {
        if data.nrows() == 0 {
            return Err(DashboardError::EmptyInput);
        }

        let mean = data
            .mean_axis(Axis(0))
            .ok_or(DashboardError::EmptyInput)?;
        let scale = data
            .std_axis(Axis(0), 0.0)
            .mapv(|std| if std > f64::EPSILON { std } else { 1.0 });

        Ok(Self { mean, scale })
    }

    /// Standardize every row of `data` with the fitted parameters.
    pub fn transform(&self, data: &Array2<f64>) -> Array2<f64> {
        (data - &self.mean) / &self.scale
    }

    /// Standardize a single raw (recency, frequency, monetary) triple.
    pub fn transform_one(&self, rfm: &[f64; 3]) -> Array1<f64> {
        (Array1::from(rfm.to_vec()) - &self.mean) / &self.scale
    }
}
