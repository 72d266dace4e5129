//! K-Means customer segmentation over standardized RFM features

use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::error::{DashboardError, Result};
use crate::rfm::{CustomerRfm, RfmTable, StandardScaler};

/// Clustering parameters. The algorithm itself is fixed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentationConfig {
    /// Number of clusters; the customer population must be at least this large.
    pub clusters: usize,
    /// Seed for centroid initialization.
    pub seed: u64,
    pub max_iters: u64,
    pub tolerance: f64,
    /// Independent initializations; the lowest-inertia run wins.
    pub n_runs: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            clusters: 4,
            seed: 42,
            max_iters: 300,
            tolerance: 1e-4,
            n_runs: 1,
        }
    }
}

/// A customer's RFM record and its cluster label.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedCustomer {
    pub rfm: CustomerRfm,
    pub cluster: usize,
}

/// Result of segmenting a customer population.
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub n_clusters: usize,
    /// Customers in the same order as the input RFM table.
    pub customers: Vec<SegmentedCustomer>,
    /// Standardized features, one row per customer.
    pub features: Array2<f64>,
    /// Scaler fitted on the raw features, for projecting new customers.
    pub scaler: StandardScaler,
    /// Centroids in standardized space, one row per cluster.
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squared distances.
    pub inertia: f64,
}

impl Segmentation {
    pub fn labels(&self) -> Vec<usize> {
        self.customers.iter().map(|c| c.cluster).collect()
    }

    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for customer in &self.customers {
            if customer.cluster < self.n_clusters {
                sizes[customer.cluster] += 1;
            }
        }
        sizes
    }

    /// Nearest centroid for an already standardized point.
    pub fn nearest_cluster(&self, point: ArrayView1<f64>) -> usize {
        let mut min_distance = f64::INFINITY;
        let mut closest = 0;

        for (cluster, centroid) in self.centroids.outer_iter().enumerate() {
            let distance = euclidean_distance(&point, &centroid);
            if distance < min_distance {
                min_distance = distance;
                closest = cluster;
            }
        }

        closest
    }

    /// Assign a new raw (recency, frequency, monetary) triple to a cluster.
    pub fn predict(&self, rfm: &[f64; 3]) -> usize {
        let scaled = self.scaler.transform_one(rfm);
        self.nearest_cluster(scaled.view())
    }

    /// Mean silhouette coefficient over the first `sample_size` customers.
    pub fn silhouette_sample(&self, sample_size: usize) -> f64 {
        let n_samples = self.features.nrows().min(sample_size);
        if n_samples < 2 {
            return 0.0;
        }

        let labels = self.labels();
        let mut silhouette_sum = 0.0;

        for i in 0..n_samples {
            let point = self.features.row(i);
            let own = labels[i];

            let mut same_cluster = Vec::new();
            let mut other_clusters: Vec<Vec<f64>> = vec![Vec::new(); self.n_clusters];

            for j in 0..n_samples {
                if i == j {
                    continue;
                }
                let distance = euclidean_distance(&point, &self.features.row(j));
                let other = labels[j];
                if other == own {
                    same_cluster.push(distance);
                } else if other < self.n_clusters {
                    other_clusters[other].push(distance);
                }
            }

            let a_i = mean(&same_cluster).unwrap_or(0.0);
            let b_i = other_clusters
                .iter()
                .filter_map(|distances| mean(distances))
                .fold(f64::INFINITY, f64::min);

            let s_i = if b_i.is_infinite() || (a_i == 0.0 && b_i == 0.0) {
                0.0
            } else {
                (b_i - a_i) / a_i.max(b_i)
            };
            silhouette_sum += s_i;
        }

        silhouette_sum / n_samples as f64
    }
}

/// Standardize the RFM features and partition customers into `config.clusters` groups.
///
/// Fails with `EmptyInput` for zero customers and `DegenerateInput` when there
/// are fewer distinct customers (or distinct standardized points) than clusters.
/// Identical input and config always yield identical labels.
pub fn segment_customers(rfm: &RfmTable, config: &SegmentationConfig) -> Result<Segmentation> {
    if rfm.is_empty() {
        return Err(DashboardError::EmptyInput);
    }
    if rfm.len() < config.clusters {
        return Err(DashboardError::DegenerateInput {
            points: rfm.len(),
            clusters: config.clusters,
        });
    }

    let raw = rfm.feature_matrix()?;
    let scaler = StandardScaler::fit(&raw)?;
    let features = scaler.transform(&raw);

    let distinct = count_distinct_rows(&features);
    if distinct < config.clusters {
        return Err(DashboardError::DegenerateInput {
            points: distinct,
            clusters: config.clusters,
        });
    }

    debug!(
        customers = rfm.len(),
        clusters = config.clusters,
        seed = config.seed,
        "Fitting K-Means"
    );

    let dataset = DatasetBase::from(features.clone());
    let rng = StdRng::seed_from_u64(config.seed);
    let model = KMeans::params_with(config.clusters, rng, L2Dist)
        .n_runs(config.n_runs)
        .max_n_iterations(config.max_iters)
        .tolerance(config.tolerance)
        .fit(&dataset)?;

    let labels: Array1<usize> = model.predict(&features);
    let centroids = model.centroids().clone();
    let inertia = compute_inertia(&features, &labels, &centroids);

    let customers: Vec<SegmentedCustomer> = rfm
        .records
        .iter()
        .cloned()
        .zip(labels.iter().copied())
        .map(|(rfm, cluster)| SegmentedCustomer { rfm, cluster })
        .collect();

    info!(
        customers = customers.len(),
        clusters = config.clusters,
        inertia,
        "Segmented customers"
    );

    Ok(Segmentation {
        n_clusters: config.clusters,
        customers,
        features,
        scaler,
        centroids,
        inertia,
    })
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    labels
        .iter()
        .enumerate()
        .filter(|(_, &cluster)| cluster < centroids.nrows())
        .map(|(i, &cluster)| {
            features
                .row(i)
                .iter()
                .zip(centroids.row(cluster).iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
        })
        .sum()
}

fn count_distinct_rows(features: &Array2<f64>) -> usize {
    let mut rows: Vec<Vec<u64>> = features
        .outer_iter()
        .map(|row| row.iter().map(|v| v.to_bits()).collect())
        .collect();
    rows.sort_unstable();
    rows.dedup();
    rows.len()
}

fn euclidean_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
