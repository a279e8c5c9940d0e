//! Test fixtures for zone-planner.
//!
//! Provides real Jeddah district coordinates plus builders for customers,
//! depots, and fully wired planners backed by the estimation matrix.

pub mod jeddah_locations;

#[allow(unused_imports)]
pub use jeddah_locations::*;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use zone_planner::config::Config;
use zone_planner::dataset::{Customer, DatasetSnapshot, Depot};
use zone_planner::matrix::HaversineMatrix;
use zone_planner::orchestrator::Planner;

#[allow(dead_code)]
pub fn depot() -> Depot {
    Depot {
        city: "JEDDAH".to_string(),
        lat: DEPOT.lat,
        lon: DEPOT.lon,
    }
}

#[allow(dead_code)]
pub fn customer(id: &str, lat: f64, lon: f64) -> Customer {
    Customer {
        id: id.to_string(),
        name: format!("Customer {}", id),
        city: "JEDDAH".to_string(),
        zone: None,
        lat,
        lon,
        attributes: BTreeMap::new(),
    }
}

/// Customers built from a location table, ids `P<prefix><NN>`.
#[allow(dead_code)]
pub fn customers_from(prefix: &str, locations: &[Location]) -> Vec<Customer> {
    locations
        .iter()
        .enumerate()
        .map(|(i, loc)| {
            let mut c = customer(&format!("{}{:02}", prefix, i + 1), loc.lat, loc.lon);
            c.name = format!("Customer {}", loc.name);
            c
        })
        .collect()
}

/// A writable scratch root, unique per test tag.
#[allow(dead_code)]
pub fn temp_data_root(tag: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!(
        "zone-planner-test-{}-{}",
        std::process::id(),
        tag
    ));
    std::fs::remove_dir_all(&root).ok();
    root
}

/// Planner over the Jeddah fixture city: central + north + east customers,
/// estimation matrix, scratch run store.
#[allow(dead_code)]
pub fn jeddah_planner(tag: &str) -> Planner {
    let mut customers = customers_from("C", CENTRAL);
    customers.extend(customers_from("N", NORTH));
    customers.extend(customers_from("E", EAST));
    planner_with(tag, customers)
}

#[allow(dead_code)]
pub fn planner_with(tag: &str, customers: Vec<Customer>) -> Planner {
    let config = Config {
        data_root: temp_data_root(tag),
        ..Config::default()
    };
    let snapshot = DatasetSnapshot::from_parts(customers, vec![depot()]);
    Planner::with_parts(config, snapshot, Arc::new(HaversineMatrix::default()))
}
