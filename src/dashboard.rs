//! One dashboard render: load (cached) -> date filter -> summary -> segmentation.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::data::{load_transactions, DateRange, LoadOptions, PreparedTable};
use crate::error::Result;
use crate::model::{segment_customers, Segmentation, SegmentationConfig};
use crate::report::Summary;
use crate::rfm::compute_rfm;
use crate::source::{SourceCache, SourceId};

/// Everything a render produces. Either all of it exists or the render failed.
#[derive(Debug, Clone)]
pub struct DashboardReport {
    /// The table the figures were computed from, after any date restriction.
    pub table: PreparedTable,
    pub summary: Summary,
    pub segmentation: Segmentation,
}

impl DashboardReport {
    /// Write the segmented RFM table as CSV.
    pub fn write_rfm_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["CustomerID", "Recency", "Frequency", "Monetary", "Cluster"])?;
        for customer in &self.segmentation.customers {
            writer.write_record([
                customer.rfm.customer_id.clone(),
                customer.rfm.recency.to_string(),
                customer.rfm.frequency.to_string(),
                format!("{:.2}", customer.rfm.monetary),
                customer.cluster.to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Holds the prepared-load cache for the lifetime of the process.
///
/// Loads are cached per source; re-rendering with a different date range or
/// segmentation config reuses the cached table.
#[derive(Debug, Default)]
pub struct Dashboard {
    options: LoadOptions,
    cache: SourceCache<PreparedTable>,
}

impl Dashboard {
    pub fn new(options: LoadOptions) -> Self {
        Self {
            options,
            cache: SourceCache::new(),
        }
    }

    /// The prepared table of `source`, loading it on first use.
    pub fn load(&self, source: &SourceId) -> Result<Arc<PreparedTable>> {
        let options = self.options;
        self.cache
            .get_or_load(source, |id| load_transactions(id, &options))
    }

    /// Run the full pipeline over `source`.
    pub fn render(
        &self,
        source: &SourceId,
        range: Option<&DateRange>,
        config: &SegmentationConfig,
    ) -> Result<DashboardReport> {
        let loaded = self.load(source)?;
        build_report(&loaded, range, config)
    }
}

/// Compute the report over an already prepared table.
pub fn build_report(
    table: &PreparedTable,
    range: Option<&DateRange>,
    config: &SegmentationConfig,
) -> Result<DashboardReport> {
    let table = match range {
        Some(range) => table.restrict_to(range)?,
        None => table.clone(),
    };

    let summary = Summary::compute(&table)?;
    let rfm = compute_rfm(&table)?;
    let segmentation = segment_customers(&rfm, config)?;

    info!(
        rows = table.height(),
        invoices = summary.kpis.invoices,
        customers = summary.kpis.customers,
        "Dashboard computed"
    );

    Ok(DashboardReport {
        table,
        summary,
        segmentation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DashboardError;
    use chrono::NaiveDate;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const SAMPLE: &str = "\
InvoiceNo,CustomerID,Description,Quantity,UnitPrice,InvoiceDate
1,C1,PEN,5,1.0,2011-01-01
2,C2,CUP,3,2.0,2011-01-15
3,C3,BAG,9,0.5,2011-02-02
4,C4,ANT,1,40.0,2011-03-03
5,C5,PEN,12,1.0,2011-03-20
6,C1,CUP,2,2.0,2011-03-21
";

    #[test]
    fn test_render_uses_cache() {
        let file = write_csv(SAMPLE);
        let source = SourceId::Path(file.path().to_path_buf());
        let dashboard = Dashboard::new(LoadOptions::default());

        let first = dashboard.load(&source).unwrap();
        // a cached load survives the file disappearing
        let path = file.path().to_path_buf();
        drop(file);
        assert!(!path.exists());

        let second = dashboard.load(&source).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let report = dashboard
            .render(&source, None, &SegmentationConfig::default())
            .unwrap();
        assert_eq!(report.summary.kpis.customers, 5);
        assert_eq!(report.segmentation.customers.len(), 5);
    }

    #[test]
    fn test_range_restriction_applies_before_segmentation() {
        let file = write_csv(SAMPLE);
        let source = SourceId::Path(file.path().to_path_buf());
        let dashboard = Dashboard::new(LoadOptions::default());

        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2011, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2011, 2, 28).unwrap(),
        )
        .unwrap();

        // three customers remain, fewer than four clusters
        match dashboard.render(&source, Some(&range), &SegmentationConfig::default()) {
            Err(DashboardError::DegenerateInput { points, clusters }) => {
                assert_eq!(points, 3);
                assert_eq!(clusters, 4);
            }
            other => panic!("expected DegenerateInput, got {:?}", other),
        }

        let config = SegmentationConfig {
            clusters: 2,
            ..SegmentationConfig::default()
        };
        let report = dashboard.render(&source, Some(&range), &config).unwrap();
        assert_eq!(report.table.height(), 3);
        assert_eq!(report.summary.monthly_revenue.len(), 2);

        // recency is measured from the last invoice inside the range
        let rfm = compute_rfm(&report.table).unwrap();
        assert_eq!(
            rfm.reference,
            NaiveDate::from_ymd_opt(2011, 2, 3)
                .unwrap()
                .and_hms_opt(0, 0, 0)
        );
        let c1 = report
            .segmentation
            .customers
            .iter()
            .find(|c| c.rfm.customer_id == "C1")
            .unwrap();
        assert_eq!(c1.rfm.recency, 33);
        assert_eq!(c1.rfm.frequency, 1);
    }

    #[test]
    fn test_missing_source_is_not_cached() {
        let dashboard = Dashboard::new(LoadOptions::default());
        let source = SourceId::parse("/no/such/transactions.csv");
        assert!(matches!(
            dashboard.render(&source, None, &SegmentationConfig::default()),
            Err(DashboardError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn test_write_rfm_csv() {
        let table = crate::data::prepare_transactions(SAMPLE, &LoadOptions::default()).unwrap();
        let report = build_report(&table, None, &SegmentationConfig::default()).unwrap();

        let out = NamedTempFile::new().unwrap();
        report.write_rfm_csv(out.path()).unwrap();

        let written = std::fs::read_to_string(out.path()).unwrap();
        let mut lines = written.lines();
        assert_eq!(
            lines.next(),
            Some("CustomerID,Recency,Frequency,Monetary,Cluster")
        );
        let c1: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(&c1[..4], &["C1", "1", "2", "9.00"]);
        assert_eq!(written.lines().count(), 6);
    }
}
