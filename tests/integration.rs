//! Integration tests for RetailForge

use chrono::NaiveDate;
use retailforge::{
    build_report, compute_kpis, compute_rfm, prepare_transactions, segment_customers, Dashboard,
    DashboardError, DateRange, LoadOptions, SegmentationConfig, SourceId,
};
use std::io::Write;
use tempfile::NamedTempFile;

/// Create a test CSV file with sample data, including Latin-1 bytes
fn create_test_csv() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    let lines: [&[u8]; 11] = [
        b"InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country\n",
        // Customer 17850 - multiple purchases
        b"536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,12/1/2010 8:26,2.55,17850.0,United Kingdom\n",
        b"536365,71053,WHITE METAL LANTERN,6,12/1/2010 8:26,3.39,17850.0,United Kingdom\n",
        b"536366,22633,HAND WARMER UNION JACK,6,11/1/2011 8:28,1.85,17850.0,United Kingdom\n",
        // Customer 13047 - single purchase
        b"536367,84406B,CREAM CUPID HEARTS COAT HANGER,8,12/1/2010 8:34,2.75,13047.0,United Kingdom\n",
        // Customer 12345 - recent high value, non-ASCII description
        b"536368,22752,SET 7 BABUSHKA NESTING BOXES,2,12/5/2011 10:15,7.65,12345.0,France\n",
        b"536368,21730,CAF\xC9 GLASS T-LIGHT HOLDER,12,12/5/2011 10:15,1.25,12345.0,France\n",
        // Customer 98765 - old low value
        b"536369,22457,NATURAL SLATE HEART CHALKBOARD,4,1/15/2010 9:00,3.25,98765.0,United Kingdom\n",
        // cancellation and zero-price rows are filtered out
        b"C536379,D,Discount,-1,12/1/2010 9:41,27.50,14527.0,United Kingdom\n",
        b"536414,22139,,56,12/1/2010 11:52,0,,United Kingdom\n",
        // anonymous customer
        b"536370,22728,ALARM CLOCK BAKELIKE PINK,24,3/12/2011 8:45,3.75,,United Kingdom\n",
    ];
    for line in lines {
        file.write_all(line).unwrap();
    }
    file
}

#[test]
fn test_end_to_end_pipeline() {
    let test_file = create_test_csv();
    let source = SourceId::Path(test_file.path().to_path_buf());

    let dashboard = Dashboard::new(LoadOptions::default());
    let report = dashboard
        .render(&source, None, &SegmentationConfig::default())
        .unwrap();

    // Verify data loading
    assert_eq!(report.table.height(), 8);
    assert_eq!(report.summary.kpis.invoices, 6);
    assert_eq!(report.summary.kpis.customers, 5);

    // Verify segmentation
    let segmentation = &report.segmentation;
    assert_eq!(segmentation.n_clusters, 4);
    assert_eq!(segmentation.customers.len(), 5);
    assert_eq!(segmentation.centroids.shape(), &[4, 3]);
    assert!(segmentation.labels().iter().all(|&label| label < 4));
    assert_eq!(segmentation.cluster_sizes().iter().sum::<usize>(), 5);
    assert!(segmentation.inertia >= 0.0 && segmentation.inertia.is_finite());

    let ids: Vec<&str> = segmentation
        .customers
        .iter()
        .map(|c| c.rfm.customer_id.as_str())
        .collect();
    assert_eq!(ids, vec!["12345", "13047", "17850", "98765", "Unknown"]);

    // Latin-1 description decoded byte-for-byte
    assert!(report
        .summary
        .top_products
        .iter()
        .any(|p| p.description == "CAF\u{c9} GLASS T-LIGHT HOLDER"));
}

#[test]
fn test_worked_example_rows() {
    let text = "\
InvoiceNo,CustomerID,Description,Quantity,UnitPrice,InvoiceDate
A1,C1,MUG,2,5.00,2021-01-01
A2,C1,JAR,1,10.00,2021-01-10
A3,C2,BOWL,0,3.00,2021-01-05
";
    let table = prepare_transactions(text, &LoadOptions::default()).unwrap();
    let rows = table.rows().unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.invoice_no != "A3"));

    let kpis = compute_kpis(&table).unwrap();
    assert!((kpis.revenue - 20.0).abs() < 1e-9);
    assert_eq!(kpis.invoices, 2);
    assert_eq!(kpis.customers, 1);

    let rfm = compute_rfm(&table).unwrap();
    assert_eq!(
        rfm.reference,
        NaiveDate::from_ymd_opt(2021, 1, 11)
            .unwrap()
            .and_hms_opt(0, 0, 0)
    );
    let c1 = &rfm.records[0];
    assert_eq!((c1.customer_id.as_str(), c1.recency, c1.frequency), ("C1", 1, 2));
    assert!((c1.monetary - 20.0).abs() < 1e-9);

    // a single customer cannot fill four clusters
    assert!(matches!(
        segment_customers(&rfm, &SegmentationConfig::default()),
        Err(DashboardError::DegenerateInput { points: 1, clusters: 4 })
    ));
}

#[test]
fn test_empty_input_fails_segmentation() {
    let text = "InvoiceNo,CustomerID,Description,Quantity,UnitPrice,InvoiceDate\n";
    let table = prepare_transactions(text, &LoadOptions::default()).unwrap();
    assert!(table.is_empty());

    assert!(matches!(
        build_report(&table, None, &SegmentationConfig::default()),
        Err(DashboardError::EmptyInput)
    ));
}

#[test]
fn test_rfm_invariants() {
    let test_file = create_test_csv();
    let source = SourceId::Path(test_file.path().to_path_buf());
    let dashboard = Dashboard::new(LoadOptions::default());
    let table = dashboard.load(&source).unwrap();

    let rows = table.rows().unwrap();
    assert!(rows.iter().all(|r| r.quantity > 0 && r.unit_price > 0.0));
    assert!(rows
        .iter()
        .all(|r| r.line_revenue == r.quantity as f64 * r.unit_price));

    let rfm = compute_rfm(&table).unwrap();
    let total_revenue: f64 = rows.iter().map(|r| r.line_revenue).sum();
    assert!((rfm.total_monetary() - total_revenue).abs() < 1e-9);
    assert!(rfm.records.iter().all(|r| r.recency >= 0));

    // 17850 bought twice, last on 2011-11-01; the reference is 2011-12-06 10:15
    let c17850 = rfm
        .records
        .iter()
        .find(|r| r.customer_id == "17850")
        .unwrap();
    assert_eq!(c17850.frequency, 2);
    assert_eq!(c17850.recency, 35);
}

#[test]
fn test_segmentation_determinism() {
    let test_file = create_test_csv();
    let source = SourceId::Path(test_file.path().to_path_buf());
    let config = SegmentationConfig::default();

    let first = Dashboard::new(LoadOptions::default())
        .render(&source, None, &config)
        .unwrap();
    let second = Dashboard::new(LoadOptions::default())
        .render(&source, None, &config)
        .unwrap();

    assert_eq!(first.segmentation.labels(), second.segmentation.labels());
}

#[test]
fn test_invalid_range_and_malformed_rows() {
    let start = NaiveDate::from_ymd_opt(2011, 12, 31).unwrap();
    let end = NaiveDate::from_ymd_opt(2011, 1, 1).unwrap();
    assert!(matches!(
        DateRange::new(start, end),
        Err(DashboardError::InvalidRange(_))
    ));
    assert!(matches!(
        DateRange::from_bounds(&[start]),
        Err(DashboardError::InvalidRange(_))
    ));

    let text = "\
InvoiceNo,CustomerID,Description,Quantity,UnitPrice,InvoiceDate
1,C1,MUG,1,1.00,2021-01-01
2,C2,JAR,1,1.00,31/31/2021
";
    assert!(matches!(
        prepare_transactions(text, &LoadOptions::default()),
        Err(DashboardError::MalformedRow { line: 3, .. })
    ));
}

#[test]
fn test_prediction() {
    let test_file = create_test_csv();
    let source = SourceId::Path(test_file.path().to_path_buf());
    let report = Dashboard::new(LoadOptions::default())
        .render(&source, None, &SegmentationConfig::default())
        .unwrap();

    // Medium recency, frequency, monetary
    let cluster = report.segmentation.predict(&[10.0, 5.0, 250.0]);
    assert!(cluster < 4);
}
