//! RetailForge: retail transaction dashboard
//!
//! Loads the transaction log, prints the KPIs and sales tables, segments
//! customers with K-Means on RFM features and renders the charts.

use anyhow::{Context, Result};
use clap::Parser;
use retailforge::{viz, Args, Dashboard, DashboardReport};
use std::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);

    let start_time = Instant::now();

    let source = args.source_id();
    let range = args.date_range()?;
    let predict = args.parse_rfm_values()?;
    let config = args.segmentation_config();

    tracing::info!(source = %source, clusters = config.clusters, "Loading transactions");

    let dashboard = Dashboard::new(args.load_options());
    let report = dashboard
        .render(&source, range.as_ref(), &config)
        .with_context(|| format!("Failed to build dashboard from {}", source))?;

    print_summary(&report);
    print_segmentation(&report);

    if let Some(rfm_values) = predict {
        let cluster = report.segmentation.predict(&rfm_values);
        println!(
            "\n✓ Predicted Cluster for R={}, F={}, M={}: {}",
            rfm_values[0], rfm_values[1], rfm_values[2], cluster
        );
    }

    if let Some(ref path) = args.rfm_out {
        report
            .write_rfm_csv(path)
            .with_context(|| format!("Failed to write RFM table to {}", path.display()))?;
        println!("\nRFM table saved to: {}", path.display());
    }

    if !args.no_charts {
        let paths = viz::render_dashboard(&report.summary, &report.segmentation, &args.output_dir)
            .context("Failed to render charts")?;
        println!("\nCharts saved:");
        for path in paths.all() {
            println!("  {}", path.display());
        }
    }

    println!(
        "\nTotal processing time: {:.2}s",
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}

/// Logs go to stderr. `RUST_LOG` wins over `--verbose`.
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn print_summary(report: &DashboardReport) {
    let kpis = &report.summary.kpis;

    println!("=== Summary ===");
    println!("Total invoices:  {}", kpis.invoices);
    println!("Total customers: {}", kpis.customers);
    println!("Total revenue:   {}", retailforge::format_currency(kpis.revenue));
    if let Ok(Some((first, last))) = report.table.date_span() {
        println!("Invoice span:    {} .. {}", first.date(), last.date());
    }

    println!("\n=== Top 10 Products ===");
    for (rank, product) in report.summary.top_products.iter().enumerate() {
        println!("{:>2}. {:<40} {:>8}", rank + 1, product.description, product.quantity);
    }

    println!("\n=== Monthly Revenue ===");
    for month in &report.summary.monthly_revenue {
        println!("{}  {:>16}", month, retailforge::format_currency(month.revenue));
    }
}

fn print_segmentation(report: &DashboardReport) {
    let segmentation = &report.segmentation;
    let total = segmentation.customers.len();

    println!("\n=== Cluster Statistics ===");
    for (i, &size) in segmentation.cluster_sizes().iter().enumerate() {
        let percentage = (size as f64 / total as f64) * 100.0;
        println!("Cluster {}: {} customers ({:.1}%)", i, size, percentage);
    }

    println!(
        "\nSilhouette score (sample): {:.3}",
        segmentation.silhouette_sample(100)
    );
    println!("Within-cluster sum of squares: {:.2}", segmentation.inertia);

    println!("\nCluster centroids (normalized):");
    println!("  Cluster | Recency | Frequency | Monetary");
    println!("  --------|---------|-----------|----------");
    for (i, centroid) in segmentation.centroids.outer_iter().enumerate() {
        println!(
            "  {:7} | {:7.2} | {:9.2} | {:8.2}",
            i, centroid[0], centroid[1], centroid[2]
        );
    }
}
