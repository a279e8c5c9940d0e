//! Manual-polygon zoning: caller-drawn rings, ray-casting membership.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dataset::Customer;
use crate::error::{Error, Result};
use crate::geo::point_in_ring;
use crate::zoning::{ZoneMetadata, ZonePolygon, ZoningOutcome};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualPolygon {
    pub zone_id: String,
    /// (lat, lon) vertices; a duplicated closing vertex is tolerated.
    pub ring: Vec<(f64, f64)>,
}

/// Assign each customer to the first supplied ring containing it.
///
/// Later rings that also contain an assigned customer are reported as
/// overlap pairs. Customers outside every ring are listed in
/// `metadata.unassigned` and omitted from `assignments`.
pub fn partition(customers: &[&Customer], polygons: &[ManualPolygon]) -> Result<ZoningOutcome> {
    if polygons.is_empty() {
        return Err(Error::InvalidInput("no polygons supplied".to_string()));
    }

    let mut seen_ids = Vec::with_capacity(polygons.len());
    for polygon in polygons {
        let distinct = distinct_vertices(&polygon.ring);
        if distinct < 3 {
            return Err(Error::InvalidInput(format!(
                "polygon {} has {} distinct vertices, need at least 3",
                polygon.zone_id, distinct
            )));
        }
        if seen_ids.contains(&&polygon.zone_id) {
            return Err(Error::InvalidInput(format!(
                "duplicate zone id {} in polygon list",
                polygon.zone_id
            )));
        }
        seen_ids.push(&polygon.zone_id);
    }

    let mut assignments = BTreeMap::new();
    let mut counts: Vec<(String, usize)> =
        polygons.iter().map(|p| (p.zone_id.clone(), 0)).collect();
    let mut unassigned = Vec::new();
    let mut overlaps: Vec<(String, String)> = Vec::new();

    for customer in customers {
        let mut containing = polygons
            .iter()
            .enumerate()
            .filter(|(_, p)| point_in_ring(customer.coords(), &p.ring));

        match containing.next() {
            Some((first_idx, first)) => {
                assignments.insert(customer.id.clone(), first.zone_id.clone());
                counts[first_idx].1 += 1;
                for (_, other) in containing {
                    let pair = (first.zone_id.clone(), other.zone_id.clone());
                    if !overlaps.contains(&pair) {
                        overlaps.push(pair);
                    }
                }
            }
            None => unassigned.push(customer.id.clone()),
        }
    }

    Ok(ZoningOutcome {
        assignments,
        counts,
        polygons: polygons
            .iter()
            .map(|p| ZonePolygon {
                zone_id: p.zone_id.clone(),
                ring: p.ring.clone(),
            })
            .collect(),
        metadata: ZoneMetadata {
            overlaps,
            unassigned,
            ..ZoneMetadata::default()
        },
    })
}

fn distinct_vertices(ring: &[(f64, f64)]) -> usize {
    match (ring.first(), ring.last()) {
        (Some(first), Some(last)) if ring.len() > 1 && first == last => ring.len() - 1,
        _ => ring.len(),
    }
}
