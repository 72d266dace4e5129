//! Error taxonomy for loading, preparing and segmenting transaction data.

use thiserror::Error;

/// All errors produced by the dashboard pipeline.
///
/// Every variant is terminal for the current compute cycle: callers either get
/// the full summary and segmentation or nothing.
#[derive(Error, Debug)]
pub enum DashboardError {
    /// The transaction source could not be fetched or read.
    #[error("Transaction source '{source_id}' is unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    /// A row failed type coercion (1-based line number in the source document).
    #[error("Malformed row at line {line}: column '{column}' has invalid value '{value}'")]
    MalformedRow {
        line: u64,
        column: String,
        value: String,
    },

    /// A caller-supplied date range was malformed.
    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    /// Segmentation was asked to run over zero customers.
    #[error("No customers to segment")]
    EmptyInput,

    /// Segmentation preconditions on the customer population were violated.
    #[error("Cannot form {clusters} clusters from {points} distinct customers")]
    DegenerateInput { points: usize, clusters: usize },

    /// Dataframe engine failure.
    #[error("Dataframe error: {0}")]
    Frame(#[from] polars::error::PolarsError),

    /// K-Means fitting failure.
    #[error("Clustering error: {0}")]
    Clustering(#[from] linfa_clustering::KMeansError),

    /// A feature matrix had an unexpected shape.
    #[error("Feature matrix error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Chart rendering failure.
    #[error("Chart rendering error: {0}")]
    Render(String),

    /// A required input column is absent from the header.
    #[error("Missing required column '{0}'")]
    MissingColumn(String),

    /// CSV reader or writer failure outside of row coercion.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Pass-through for raw I/O errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DashboardError>;
