//! Zoning strategy tests over the Jeddah fixture city.

mod fixtures;

use zone_planner::geo::{bearing_deg, haversine_km};
use zone_planner::orchestrator::ZoneRequest;
use zone_planner::zoning::ZoningMethod;
use zone_planner::zoning::manual::ManualPolygon;

use fixtures::{DEPOT, customer, jeddah_planner, planner_with};

fn zone_ordinal(zone_id: &str) -> usize {
    zone_id[3..].parse().expect("zone id ends in ordinal")
}

#[test]
fn polar_assignment_follows_bearing_law() {
    let planner = jeddah_planner("polar-law");
    let mut request = ZoneRequest::new("Jeddah", ZoningMethod::Polar);
    request.target_zones = 6;
    request.persist = false;

    let response = planner.generate_zones(&request).unwrap();

    // floor(theta * k / 360) names the sector when the offset is zero.
    let snapshot = planner.dataset().snapshot();
    for (customer_id, zone_id) in &response.outcome.assignments {
        let customer = snapshot.customer_by_id(customer_id).unwrap();
        let theta = bearing_deg(DEPOT.coords(), customer.coords());
        let expected = ((theta * 6.0 / 360.0) as usize).min(5) + 1;
        assert_eq!(zone_ordinal(zone_id), expected, "customer {}", customer_id);
    }

    // Everyone with valid coordinates is assigned exactly once.
    assert_eq!(response.outcome.assigned_total(), 14);
    assert_eq!(response.outcome.assignments.len(), 14);
}

#[test]
fn polar_is_idempotent() {
    let planner = jeddah_planner("polar-idem");
    let mut request = ZoneRequest::new("Jeddah", ZoningMethod::Polar);
    request.target_zones = 4;
    request.persist = false;

    let first = planner.generate_zones(&request).unwrap();
    let second = planner.generate_zones(&request).unwrap();
    assert_eq!(first.outcome.assignments, second.outcome.assignments);
    assert_eq!(first.outcome.counts, second.outcome.counts);
}

#[test]
fn isochrone_rings_respect_travel_times() {
    let planner = jeddah_planner("isochrone");
    let mut request = ZoneRequest::new("Jeddah", ZoningMethod::Isochrone);
    request.thresholds_min = vec![10.0, 20.0];
    request.persist = false;

    let response = planner.generate_zones(&request).unwrap();

    // The estimation provider gives minutes = km * 1.5 exactly.
    let snapshot = planner.dataset().snapshot();
    for (customer_id, zone_id) in &response.outcome.assignments {
        let customer = snapshot.customer_by_id(customer_id).unwrap();
        let minutes = haversine_km(DEPOT.coords(), customer.coords()) * 1.5;
        let expected = if minutes <= 10.0 {
            1
        } else if minutes <= 20.0 {
            2
        } else {
            3
        };
        assert_eq!(zone_ordinal(zone_id), expected, "customer {}", customer_id);
    }
    assert_eq!(response.outcome.metadata.overflow_zone.as_deref(), Some("JED003"));
    assert!(response.outcome.metadata.degraded_matrix.is_none());
}

#[test]
fn clustering_fixed_seed_reproduces() {
    let planner = jeddah_planner("cluster-idem");
    let mut request = ZoneRequest::new("Jeddah", ZoningMethod::Clustering);
    request.target_zones = 3;
    request.seed = Some(11);
    request.persist = false;

    let first = planner.generate_zones(&request).unwrap();
    let second = planner.generate_zones(&request).unwrap();
    assert_eq!(first.outcome.assignments, second.outcome.assignments);
    assert!(first.outcome.zone_count() >= 3);
    assert_eq!(first.outcome.metadata.centroids.len(), first.outcome.zone_count());
}

#[test]
fn manual_ring_covering_four_of_ten() {
    // Four customers in a tight block, six scattered well outside it.
    let mut customers = Vec::new();
    for i in 0..4 {
        customers.push(customer(&format!("IN{}", i), 21.54 + 0.005 * i as f64, 39.18));
    }
    for i in 0..6 {
        customers.push(customer(&format!("OUT{}", i), 21.70 + 0.01 * i as f64, 39.40));
    }
    let planner = planner_with("manual-four", customers);

    let mut request = ZoneRequest::new("Jeddah", ZoningMethod::Manual);
    request.polygons = vec![ManualPolygon {
        zone_id: "DOWNTOWN".to_string(),
        ring: vec![
            (21.53, 39.17),
            (21.53, 39.19),
            (21.57, 39.19),
            (21.57, 39.17),
        ],
    }];
    request.persist = false;

    let response = planner.generate_zones(&request).unwrap();
    assert_eq!(response.outcome.assignments.len(), 4);
    assert_eq!(response.outcome.metadata.unassigned.len(), 6);
    assert_eq!(response.outcome.counts, vec![("DOWNTOWN".to_string(), 4)]);
    // Unassigned customers never appear in the assignment map.
    for id in &response.outcome.metadata.unassigned {
        assert!(!response.outcome.assignments.contains_key(id));
    }
}

#[test]
fn assigned_never_exceeds_city_population() {
    let planner = jeddah_planner("population");
    for method in [ZoningMethod::Polar, ZoningMethod::Clustering] {
        let mut request = ZoneRequest::new("Jeddah", method);
        request.target_zones = 5;
        request.persist = false;
        let response = planner.generate_zones(&request).unwrap();
        assert!(response.outcome.assigned_total() <= 14);
        assert_eq!(response.outcome.assigned_total(), 14);
    }
}

#[test]
fn polygons_carry_zone_ids_from_counts() {
    let planner = jeddah_planner("polygons");
    let mut request = ZoneRequest::new("Jeddah", ZoningMethod::Clustering);
    request.target_zones = 3;
    request.persist = false;

    let response = planner.generate_zones(&request).unwrap();
    let zone_ids: Vec<&String> = response.outcome.counts.iter().map(|(z, _)| z).collect();
    for polygon in &response.outcome.polygons {
        assert!(zone_ids.contains(&&polygon.zone_id));
        assert!(polygon.ring.len() >= 3);
    }
}
