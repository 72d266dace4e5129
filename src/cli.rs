//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, ValueEnum};

use crate::data::{DateRange, LoadOptions, MalformedRowPolicy};
use crate::error::Result;
use crate::model::SegmentationConfig;
use crate::source::SourceId;

/// How to treat rows that fail type coercion
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnMalformed {
    /// Abort the whole load
    Fail,
    /// Log and skip the row
    Skip,
}

impl From<OnMalformed> for MalformedRowPolicy {
    fn from(value: OnMalformed) -> Self {
        match value {
            OnMalformed::Fail => MalformedRowPolicy::Fail,
            OnMalformed::Skip => MalformedRowPolicy::Skip,
        }
    }
}

/// Retail transaction dashboard: KPIs, sales charts and RFM customer segmentation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Transaction CSV: a local path or an http(s) URL
    #[arg(short, long, env = "RETAILFORGE_SOURCE", default_value = "data.csv")]
    pub source: String,

    /// First day of the reporting range (YYYY-MM-DD); requires --end
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last day of the reporting range (YYYY-MM-DD), inclusive; requires --start
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Number of customer segments
    #[arg(short = 'k', long, default_value = "4")]
    pub clusters: usize,

    /// Seed for centroid initialization
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "300")]
    pub max_iters: u64,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Number of K-Means initializations; the best one is kept
    #[arg(long, default_value = "1")]
    pub n_runs: usize,

    /// Policy for rows that fail type coercion
    #[arg(long, value_enum, default_value = "fail")]
    pub on_malformed: OnMalformed,

    /// Directory for the rendered PNG charts
    #[arg(short, long, default_value = "charts")]
    pub output_dir: PathBuf,

    /// Skip chart rendering
    #[arg(long)]
    pub no_charts: bool,

    /// Write the segmented RFM table to this CSV file
    #[arg(long)]
    pub rfm_out: Option<PathBuf>,

    /// Prediction mode: provide R,F,M values as comma-separated string
    /// Example: --predict "30,10,500.0" for Recency=30, Frequency=10, Monetary=500.0
    #[arg(short, long)]
    pub predict: Option<String>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn source_id(&self) -> SourceId {
        SourceId::parse(&self.source)
    }

    /// The requested date range. Both bounds or neither must be given.
    pub fn date_range(&self) -> Result<Option<DateRange>> {
        let bounds: Vec<NaiveDate> = [self.start, self.end].into_iter().flatten().collect();
        if bounds.is_empty() {
            return Ok(None);
        }
        DateRange::from_bounds(&bounds).map(Some)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            on_malformed: self.on_malformed.into(),
        }
    }

    pub fn segmentation_config(&self) -> SegmentationConfig {
        SegmentationConfig {
            clusters: self.clusters,
            seed: self.seed,
            max_iters: self.max_iters,
            tolerance: self.tolerance,
            n_runs: self.n_runs,
        }
    }

    /// Parse RFM values from the predict string
    /// Expected format: "recency,frequency,monetary"
    pub fn parse_rfm_values(&self) -> anyhow::Result<Option<[f64; 3]>> {
        let Some(ref predict_str) = self.predict else {
            return Ok(None);
        };

        let parts: Vec<&str> = predict_str.split(',').map(str::trim).collect();
        let [recency, frequency, monetary] = parts.as_slice() else {
            anyhow::bail!("Predict values must be in format 'recency,frequency,monetary'");
        };

        let recency: f64 = recency
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid recency value: {}", recency))?;
        let frequency: f64 = frequency
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid frequency value: {}", frequency))?;
        let monetary: f64 = monetary
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid monetary value: {}", monetary))?;

        Ok(Some([recency, frequency, monetary]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DashboardError;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["retailforge"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = args(&[]);
        assert_eq!(args.clusters, 4);
        assert_eq!(args.seed, 42);
        assert_eq!(args.on_malformed, OnMalformed::Fail);
        assert_eq!(args.segmentation_config(), SegmentationConfig::default());
        assert_eq!(args.load_options().on_malformed, MalformedRowPolicy::Fail);
        assert!(args.date_range().unwrap().is_none());
    }

    #[test]
    fn test_parse_rfm_values() {
        let mut args = args(&["--predict", "30,10,500.0"]);
        assert_eq!(args.parse_rfm_values().unwrap(), Some([30.0, 10.0, 500.0]));

        args.predict = None;
        assert_eq!(args.parse_rfm_values().unwrap(), None);

        args.predict = Some("invalid".to_string());
        assert!(args.parse_rfm_values().is_err());

        args.predict = Some("1,2,x".to_string());
        assert!(args.parse_rfm_values().is_err());
    }

    #[test]
    fn test_date_range_needs_both_bounds() {
        let full = args(&["--start", "2011-01-01", "--end", "2011-06-30"]);
        let range = full.date_range().unwrap().unwrap();
        assert_eq!(range.start(), NaiveDate::from_ymd_opt(2011, 1, 1).unwrap());

        let half = args(&["--start", "2011-01-01"]);
        assert!(matches!(
            half.date_range(),
            Err(DashboardError::InvalidRange(_))
        ));

        let reversed = args(&["--start", "2011-06-30", "--end", "2011-01-01"]);
        assert!(matches!(
            reversed.date_range(),
            Err(DashboardError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_skip_policy_flag() {
        let args = args(&["--on-malformed", "skip", "-k", "3"]);
        assert_eq!(args.load_options().on_malformed, MalformedRowPolicy::Skip);
        assert_eq!(args.segmentation_config().clusters, 3);
    }
}
