//! Chart rendering with Plotters for the dashboard report

use std::fmt::Display;
use std::path::{Path, PathBuf};

use plotters::prelude::*;
use tracing::info;

use crate::error::{DashboardError, Result};
use crate::model::Segmentation;
use crate::report::{MonthlyRevenue, ProductSales, Summary};

const TOP_PRODUCTS_FILE: &str = "top_products.png";
const MONTHLY_REVENUE_FILE: &str = "monthly_revenue.png";
const CLUSTER_SCATTER_FILE: &str = "rfm_clusters.png";
const CLUSTER_SIZES_FILE: &str = "cluster_sizes.png";

/// Paths of the rendered charts.
#[derive(Debug, Clone)]
pub struct ChartPaths {
    pub top_products: PathBuf,
    pub monthly_revenue: PathBuf,
    pub cluster_scatter: PathBuf,
    pub cluster_sizes: PathBuf,
}

impl ChartPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            top_products: dir.join(TOP_PRODUCTS_FILE),
            monthly_revenue: dir.join(MONTHLY_REVENUE_FILE),
            cluster_scatter: dir.join(CLUSTER_SCATTER_FILE),
            cluster_sizes: dir.join(CLUSTER_SIZES_FILE),
        }
    }

    pub fn all(&self) -> [&Path; 4] {
        [
            &self.top_products,
            &self.monthly_revenue,
            &self.cluster_scatter,
            &self.cluster_sizes,
        ]
    }
}

fn render_error(err: impl Display) -> DashboardError {
    DashboardError::Render(err.to_string())
}

fn cluster_color(cluster: usize) -> PaletteColor<Palette99> {
    Palette99::pick(cluster)
}

/// Padded `[min, max]` bounds of `values`, never empty.
fn padded_bounds(values: impl Iterator<Item = f64>, pad_ratio: f64) -> (f64, f64) {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    let span = (max - min).abs().max(1.0);
    (min - span * pad_ratio, max + span * pad_ratio)
}

/// Horizontal bar chart of the best-selling products, rank 1 on top.
pub fn create_top_products_chart(products: &[ProductSales], output_path: &Path) -> Result<()> {
    let n = products.len().max(1);
    let max_quantity = products.iter().map(|p| p.quantity).max().unwrap_or(1).max(1);
    let labels: Vec<String> = products.iter().rev().map(|p| p.description.clone()).collect();

    let root = BitMapBackend::new(output_path, (900, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(render_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Top 10 Products", ("sans-serif", 28))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(280)
        .build_cartesian_2d(
            0i64..(max_quantity + max_quantity / 10 + 1),
            (0usize..n).into_segmented(),
        )
        .map_err(render_error)?;

    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(n)
        .y_label_formatter(&|value| match value {
            SegmentValue::CenterOf(i) => labels.get(*i).cloned().unwrap_or_default(),
            _ => String::new(),
        })
        .x_desc("Quantity sold")
        .axis_desc_style(("sans-serif", 15))
        .draw()
        .map_err(render_error)?;

    chart
        .draw_series(products.iter().rev().enumerate().map(|(row, product)| {
            Rectangle::new(
                [
                    (0, SegmentValue::Exact(row)),
                    (product.quantity, SegmentValue::Exact(row + 1)),
                ],
                cluster_color(row).filled(),
            )
        }))
        .map_err(render_error)?;

    root.present().map_err(render_error)?;
    info!(path = %output_path.display(), "Top products chart saved");
    Ok(())
}

/// Line chart of revenue per month with point markers.
pub fn create_monthly_revenue_chart(monthly: &[MonthlyRevenue], output_path: &Path) -> Result<()> {
    let n = monthly.len().max(1);
    let max_revenue = monthly
        .iter()
        .map(|m| m.revenue)
        .fold(0.0_f64, f64::max)
        .max(1.0);
    let labels: Vec<String> = monthly.iter().map(|m| m.to_string()).collect();

    let root = BitMapBackend::new(output_path, (900, 500)).into_drawing_area();
    root.fill(&WHITE).map_err(render_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Monthly Revenue", ("sans-serif", 28))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(90)
        .build_cartesian_2d((0usize..n).into_segmented(), 0f64..max_revenue * 1.1)
        .map_err(render_error)?;

    chart
        .configure_mesh()
        .x_labels(n)
        .x_label_formatter(&|value| match value {
            SegmentValue::CenterOf(i) => labels.get(*i).cloned().unwrap_or_default(),
            _ => String::new(),
        })
        .y_desc("Total sales (\u{a3})")
        .axis_desc_style(("sans-serif", 15))
        .draw()
        .map_err(render_error)?;

    let points: Vec<(SegmentValue<usize>, f64)> = monthly
        .iter()
        .enumerate()
        .map(|(i, m)| (SegmentValue::CenterOf(i), m.revenue))
        .collect();

    chart
        .draw_series(LineSeries::new(points.iter().cloned(), &BLUE))
        .map_err(render_error)?;
    chart
        .draw_series(
            points
                .iter()
                .cloned()
                .map(|point| Circle::new(point, 4, BLUE.filled())),
        )
        .map_err(render_error)?;

    root.present().map_err(render_error)?;
    info!(path = %output_path.display(), "Monthly revenue chart saved");
    Ok(())
}

/// Scatter plot of raw Recency against Monetary, coloured by cluster.
pub fn create_cluster_scatter(segmentation: &Segmentation, output_path: &Path) -> Result<()> {
    let (x_min, x_max) = padded_bounds(
        segmentation.customers.iter().map(|c| c.rfm.recency as f64),
        0.05,
    );
    let (y_min, y_max) =
        padded_bounds(segmentation.customers.iter().map(|c| c.rfm.monetary), 0.05);

    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(render_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Customer Clusters: Recency vs Monetary", ("sans-serif", 28))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(render_error)?;

    chart
        .configure_mesh()
        .x_desc("Recency (days)")
        .y_desc("Monetary")
        .axis_desc_style(("sans-serif", 15))
        .draw()
        .map_err(render_error)?;

    for cluster in 0..segmentation.n_clusters {
        let color = cluster_color(cluster);
        chart
            .draw_series(
                segmentation
                    .customers
                    .iter()
                    .filter(|c| c.cluster == cluster)
                    .map(|c| {
                        Circle::new((c.rfm.recency as f64, c.rfm.monetary), 4, color.filled())
                    }),
            )
            .map_err(render_error)?
            .label(format!("Cluster {}", cluster))
            .legend(move |(x, y)| Circle::new((x + 5, y), 4, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(render_error)?;

    root.present().map_err(render_error)?;
    info!(path = %output_path.display(), "Cluster scatter saved");
    Ok(())
}

/// Create a simple histogram of cluster sizes
pub fn create_cluster_size_chart(segmentation: &Segmentation, output_path: &Path) -> Result<()> {
    let cluster_sizes = segmentation.cluster_sizes();
    let max_size = *cluster_sizes.iter().max().unwrap_or(&1) as f64;

    let root = BitMapBackend::new(output_path, (600, 400)).into_drawing_area();
    root.fill(&WHITE).map_err(render_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Cluster Sizes", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(
            (0usize..segmentation.n_clusters).into_segmented(),
            0f64..(max_size.max(1.0) * 1.1),
        )
        .map_err(render_error)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Cluster ID")
        .y_desc("Number of Customers")
        .axis_desc_style(("sans-serif", 15))
        .draw()
        .map_err(render_error)?;

    chart
        .draw_series(cluster_sizes.iter().enumerate().map(|(cluster, &size)| {
            Rectangle::new(
                [
                    (SegmentValue::Exact(cluster), 0.0),
                    (SegmentValue::Exact(cluster + 1), size as f64),
                ],
                cluster_color(cluster).filled(),
            )
        }))
        .map_err(render_error)?;

    root.present().map_err(render_error)?;
    info!(path = %output_path.display(), "Cluster size chart saved");
    Ok(())
}

/// Render every dashboard chart into `output_dir`, creating it if needed.
pub fn render_dashboard(
    summary: &Summary,
    segmentation: &Segmentation,
    output_dir: &Path,
) -> Result<ChartPaths> {
    std::fs::create_dir_all(output_dir)?;
    let paths = ChartPaths::in_dir(output_dir);

    create_top_products_chart(&summary.top_products, &paths.top_products)?;
    create_monthly_revenue_chart(&summary.monthly_revenue, &paths.monthly_revenue)?;
    create_cluster_scatter(segmentation, &paths.cluster_scatter)?;
    create_cluster_size_chart(segmentation, &paths.cluster_sizes)?;

    Ok(paths)
}
