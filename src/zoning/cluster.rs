//! Clustering zoning: seeded k-means on locally projected coordinates.
//!
//! Points are projected onto the depot-centered Cartesian plane before any
//! Euclidean math. Centroid updates optionally weight each customer by
//! closeness to the depot, which pulls zone seams toward the dense core.
//! Oversize clusters are split in two until every zone fits the cap.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::dataset::{Customer, Depot};
use crate::error::{Error, Result};
use crate::geo::LocalProjection;
use crate::zoning::{
    ClusterSplit, ZoneCentroid, ZoneMetadata, ZonePolygon, ZoningOutcome, hull_ring, mint_zone_id,
};

/// Distance scale (km) of the depot-weighting falloff: a customer 20 km out
/// contributes half the weight of one at the depot.
const DEPOT_WEIGHT_SCALE_KM: f64 = 20.0;

#[derive(Debug, Clone)]
pub struct ClusterOptions {
    pub target_zones: usize,
    /// Cap on zone size; `None` disables split enforcement.
    pub max_customers_per_zone: Option<usize>,
    /// Slack over the cap before a split triggers.
    pub oversize_tolerance: f64,
    pub depot_weighting: bool,
    pub seed: u64,
    pub max_iterations: usize,
    /// Centroid-movement convergence threshold in km.
    pub epsilon_km: f64,
    pub max_split_iterations: usize,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            target_zones: 4,
            max_customers_per_zone: None,
            oversize_tolerance: 0.20,
            depot_weighting: true,
            seed: crate::config::DEFAULT_SEED,
            max_iterations: 100,
            epsilon_km: 1e-4,
            max_split_iterations: 10,
        }
    }
}

pub fn partition(customers: &[&Customer], depot: &Depot, opts: &ClusterOptions) -> Result<ZoningOutcome> {
    if opts.target_zones == 0 {
        return Err(Error::InvalidInput("target_zones must be at least 1".to_string()));
    }
    if customers.is_empty() {
        return Err(Error::InvalidInput("no customers to cluster".to_string()));
    }

    let projection = LocalProjection::new(depot.coords());
    let points: Vec<(f64, f64)> = customers.iter().map(|c| projection.project(c.coords())).collect();
    let weights: Vec<f64> = if opts.depot_weighting {
        points
            .iter()
            .map(|(x, y)| 1.0 / (1.0 + (x * x + y * y).sqrt() / DEPOT_WEIGHT_SCALE_KM))
            .collect()
    } else {
        vec![1.0; points.len()]
    };

    let mut rng = StdRng::seed_from_u64(opts.seed);

    let all: Vec<usize> = (0..points.len()).collect();
    let mut clusters = run_kmeans(&points, &weights, &all, opts.target_zones, opts, &mut rng);

    // Max-customers enforcement: split the worst offender in two until every
    // cluster fits, the split budget runs out, or a cluster stops splitting.
    let mut splits = Vec::new();
    let mut constraint_satisfied = None;
    if let Some(max) = opts.max_customers_per_zone {
        if max == 0 {
            return Err(Error::InvalidInput("max_customers_per_zone must be at least 1".to_string()));
        }
        let limit = max as f64 * (1.0 + opts.oversize_tolerance);
        for _ in 0..opts.max_split_iterations {
            let Some(worst) = clusters
                .iter()
                .enumerate()
                .filter(|(_, members)| members.len() as f64 > limit)
                .max_by_key(|(_, members)| members.len())
                .map(|(idx, _)| idx)
            else {
                break;
            };

            let halves = run_kmeans(&points, &weights, &clusters[worst], 2, opts, &mut rng);
            if halves.len() < 2 || halves.iter().any(|half| half.is_empty()) {
                // Coincident points refuse to separate; no further progress.
                break;
            }
            let size_before = clusters[worst].len();
            let mut halves = halves.into_iter();
            clusters[worst] = halves.next().unwrap_or_default();
            clusters.push(halves.next().unwrap_or_default());
            splits.push((worst, size_before, clusters.len() - 1));
        }
        constraint_satisfied = Some(clusters.iter().all(|members| members.len() as f64 <= limit));
    }

    // Every requested zone gets minted even when customers run out;
    // trailing zones stay empty.
    while clusters.len() < opts.target_zones {
        clusters.push(Vec::new());
    }

    let city3 = depot.city3();
    let mut assignments = BTreeMap::new();
    let mut counts = Vec::with_capacity(clusters.len());
    let mut polygons = Vec::new();
    let mut centroids = Vec::with_capacity(clusters.len());

    for (idx, members) in clusters.iter().enumerate() {
        let zone_id = mint_zone_id(&city3, idx + 1);
        counts.push((zone_id.clone(), members.len()));

        let coords: Vec<(f64, f64)> = members.iter().map(|&i| customers[i].coords()).collect();
        for &member in members {
            assignments.insert(customers[member].id.clone(), zone_id.clone());
        }
        if !coords.is_empty() {
            let n = coords.len() as f64;
            centroids.push(ZoneCentroid {
                zone_id: zone_id.clone(),
                lat: coords.iter().map(|c| c.0).sum::<f64>() / n,
                lon: coords.iter().map(|c| c.1).sum::<f64>() / n,
            });
        }
        if let Some(ring) = hull_ring(&coords, &projection) {
            polygons.push(ZonePolygon { zone_id, ring });
        }
    }

    let splits = splits
        .into_iter()
        .map(|(original, size_before, new)| ClusterSplit {
            zone_id: mint_zone_id(&city3, original + 1),
            size_before,
            new_zone_id: mint_zone_id(&city3, new + 1),
        })
        .collect();

    Ok(ZoningOutcome {
        assignments,
        counts,
        polygons,
        metadata: ZoneMetadata {
            centroids,
            splits,
            constraint_satisfied,
            ..ZoneMetadata::default()
        },
    })
}

/// K-means over a subset of points: k-means++ seeding, Lloyd iterations with
/// weighted centroid updates, reseed-to-farthest for emptied clusters.
///
/// Returns member-index lists (indices into `points`).
fn run_kmeans(
    points: &[(f64, f64)],
    weights: &[f64],
    subset: &[usize],
    k: usize,
    opts: &ClusterOptions,
    rng: &mut StdRng,
) -> Vec<Vec<usize>> {
    let k = k.min(subset.len()).max(1);
    let mut centroids = seed_centroids(points, subset, k, rng);
    let mut labels = vec![0usize; subset.len()];

    for _ in 0..opts.max_iterations.max(1) {
        // Assignment step.
        for (slot, &point_idx) in subset.iter().enumerate() {
            labels[slot] = nearest_centroid(points[point_idx], &centroids);
        }

        // Weighted update step.
        let mut sums = vec![(0.0f64, 0.0f64, 0.0f64); k]; // (x, y, weight)
        for (slot, &point_idx) in subset.iter().enumerate() {
            let (x, y) = points[point_idx];
            let w = weights[point_idx];
            let sum = &mut sums[labels[slot]];
            sum.0 += x * w;
            sum.1 += y * w;
            sum.2 += w;
        }

        let mut movement = 0.0f64;
        for (cluster, sum) in sums.iter().enumerate() {
            if sum.2 > 0.0 {
                let next = (sum.0 / sum.2, sum.1 / sum.2);
                movement = movement.max(euclid(centroids[cluster], next));
                centroids[cluster] = next;
            } else {
                // Emptied cluster: reseed at the point farthest from its
                // current centroid so every zone keeps members.
                if let Some(&far) = subset.iter().max_by(|&&a, &&b| {
                    euclid(points[a], centroids[cluster])
                        .partial_cmp(&euclid(points[b], centroids[cluster]))
                        .unwrap_or(std::cmp::Ordering::Equal)
                }) {
                    centroids[cluster] = points[far];
                    movement = f64::MAX;
                }
            }
        }

        if movement < opts.epsilon_km {
            break;
        }
    }

    // Final assignment into member lists.
    let mut clusters = vec![Vec::new(); k];
    for &point_idx in subset {
        clusters[nearest_centroid(points[point_idx], &centroids)].push(point_idx);
    }
    clusters
}

/// k-means++ seeding: first centroid uniform, then proportional to squared
/// distance from the nearest chosen centroid.
fn seed_centroids(
    points: &[(f64, f64)],
    subset: &[usize],
    k: usize,
    rng: &mut StdRng,
) -> Vec<(f64, f64)> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[subset[rng.gen_range(0..subset.len())]]);

    while centroids.len() < k {
        let dist_sq: Vec<f64> = subset
            .iter()
            .map(|&i| {
                centroids
                    .iter()
                    .map(|&c| {
                        let d = euclid(points[i], c);
                        d * d
                    })
                    .fold(f64::MAX, f64::min)
            })
            .collect();
        let total: f64 = dist_sq.iter().sum();
        if total <= 0.0 {
            // All remaining points coincide with a centroid.
            centroids.push(points[subset[rng.gen_range(0..subset.len())]]);
            continue;
        }

        let mut target = rng.gen_range(0.0..total);
        let mut chosen = subset[subset.len() - 1];
        for (slot, &i) in subset.iter().enumerate() {
            if target < dist_sq[slot] {
                chosen = i;
                break;
            }
            target -= dist_sq[slot];
        }
        centroids.push(points[chosen]);
    }

    centroids
}

fn nearest_centroid(point: (f64, f64), centroids: &[(f64, f64)]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::MAX;
    for (idx, &centroid) in centroids.iter().enumerate() {
        let d = euclid(point, centroid);
        if d < best_dist {
            best_dist = d;
            best = idx;
        }
    }
    best
}

fn euclid(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}
