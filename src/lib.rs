//! RetailForge: a reporting dashboard over a retail transaction log
//!
//! Loads invoice line items, derives KPIs and sales tables, and segments
//! customers with K-Means clustering on RFM (Recency, Frequency, Monetary)
//! features.

pub mod cli;
pub mod dashboard;
pub mod data;
pub mod error;
pub mod model;
pub mod report;
pub mod rfm;
pub mod source;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use dashboard::{build_report, Dashboard, DashboardReport};
pub use data::{
    load_transactions, prepare_transactions, DateRange, LoadOptions, MalformedRowPolicy,
    PreparedTable, TransactionRow,
};
pub use error::{DashboardError, Result};
pub use model::{segment_customers, Segmentation, SegmentationConfig};
pub use report::{compute_kpis, format_currency, monthly_revenue, top_products, Kpis, Summary};
pub use rfm::{compute_rfm, CustomerRfm, RfmTable, StandardScaler};
pub use source::{SourceCache, SourceId};
