//! Isochrone-ring zoning: bands of equal travel time from the depot.

use std::collections::BTreeMap;

use crate::dataset::{Customer, Depot};
use crate::error::{Error, Result};
use crate::geo::LocalProjection;
use crate::zoning::{ZoneMetadata, ZonePolygon, ZoningOutcome, hull_ring, mint_zone_id};

#[derive(Debug, Clone)]
pub struct IsochroneOptions {
    /// Ascending ring boundaries in minutes of travel time from the depot.
    pub thresholds_min: Vec<f64>,
}

/// Assign each customer to the innermost ring whose threshold covers its
/// travel time from the depot; times beyond the last threshold fall into an
/// overflow zone minted after the rings.
///
/// `minutes_from_depot` is aligned with `customers` (the depot row of the
/// travel matrix, depot column excluded).
pub fn partition(
    customers: &[&Customer],
    depot: &Depot,
    minutes_from_depot: &[f64],
    opts: &IsochroneOptions,
) -> Result<ZoningOutcome> {
    let thresholds = &opts.thresholds_min;
    if thresholds.is_empty() {
        return Err(Error::InvalidInput("isochrone thresholds are empty".to_string()));
    }
    if thresholds.iter().any(|t| !t.is_finite() || *t <= 0.0) {
        return Err(Error::InvalidInput(
            "isochrone thresholds must be positive and finite".to_string(),
        ));
    }
    if thresholds.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(Error::InvalidInput(
            "isochrone thresholds must be strictly ascending".to_string(),
        ));
    }
    if customers.len() != minutes_from_depot.len() {
        return Err(Error::Internal(
            "travel times misaligned with customer list".to_string(),
        ));
    }

    let city3 = depot.city3();
    let projection = LocalProjection::new(depot.coords());
    let ring_count = thresholds.len();
    let overflow = ring_count; // index of the beyond-last-threshold zone

    let mut assignments = BTreeMap::new();
    let mut members: Vec<Vec<(f64, f64)>> = vec![Vec::new(); ring_count + 1];

    for (customer, &minutes) in customers.iter().zip(minutes_from_depot) {
        let ring = thresholds
            .iter()
            .position(|&t| minutes <= t)
            .unwrap_or(overflow);
        assignments.insert(customer.id.clone(), mint_zone_id(&city3, ring + 1));
        members[ring].push(customer.coords());
    }

    let mut counts = Vec::with_capacity(ring_count + 1);
    let mut polygons = Vec::new();
    for (ring, ring_members) in members.iter().enumerate() {
        let zone_id = mint_zone_id(&city3, ring + 1);
        counts.push((zone_id.clone(), ring_members.len()));
        if let Some(ring) = hull_ring(ring_members, &projection) {
            polygons.push(ZonePolygon { zone_id, ring });
        }
    }

    Ok(ZoningOutcome {
        assignments,
        counts,
        polygons,
        metadata: ZoneMetadata {
            thresholds_min: Some(thresholds.clone()),
            overflow_zone: Some(mint_zone_id(&city3, overflow + 1)),
            ..ZoneMetadata::default()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn depot() -> Depot {
        Depot {
            city: "JEDDAH".into(),
            lat: 21.5433,
            lon: 39.1728,
        }
    }

    fn customer(id: &str) -> Customer {
        Customer {
            id: id.into(),
            name: String::new(),
            city: "JEDDAH".into(),
            zone: None,
            lat: 21.55,
            lon: 39.18,
            attributes: Map::new(),
        }
    }

    #[test]
    fn assigns_smallest_covering_threshold() {
        let depot = depot();
        let a = customer("A");
        let b = customer("B");
        let c = customer("C");
        let d = customer("D");

        let outcome = partition(
            &[&a, &b, &c, &d],
            &depot,
            &[5.0, 15.0, 30.0, 61.0],
            &IsochroneOptions {
                thresholds_min: vec![15.0, 30.0, 60.0],
            },
        )
        .unwrap();

        assert_eq!(outcome.assignments["A"], "JED001");
        assert_eq!(outcome.assignments["B"], "JED001");
        assert_eq!(outcome.assignments["C"], "JED002");
        // Beyond the last threshold: overflow zone.
        assert_eq!(outcome.assignments["D"], "JED004");
        assert_eq!(outcome.metadata.overflow_zone.as_deref(), Some("JED004"));
    }

    #[test]
    fn boundary_time_belongs_to_inner_ring() {
        let depot = depot();
        let a = customer("A");
        let outcome = partition(
            &[&a],
            &depot,
            &[15.0],
            &IsochroneOptions {
                thresholds_min: vec![15.0, 30.0],
            },
        )
        .unwrap();
        assert_eq!(outcome.assignments["A"], "JED001");
    }

    #[test]
    fn rejects_unsorted_thresholds() {
        let depot = depot();
        assert!(matches!(
            partition(
                &[],
                &depot,
                &[],
                &IsochroneOptions {
                    thresholds_min: vec![30.0, 15.0]
                }
            ),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_empty_thresholds() {
        let depot = depot();
        assert!(partition(&[], &depot, &[], &IsochroneOptions { thresholds_min: vec![] }).is_err());
    }
}
