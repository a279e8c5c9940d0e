//! Customer master and depot catalogue loading.
//!
//! Both sources are plain CSV. Core columns are matched by header name
//! (case-insensitive); every other column rides along as a per-customer
//! filter attribute. Loaded snapshots are immutable; reloads publish a new
//! snapshot atomically so in-flight computations keep their reference.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub city: String,
    /// Pre-existing zone code from the master data, if any.
    pub zone: Option<String>,
    pub lat: f64,
    pub lon: f64,
    /// Open map of filter attributes (extra CSV columns).
    pub attributes: BTreeMap<String, String>,
}

impl Customer {
    pub fn coords(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }
}

#[derive(Debug, Clone)]
pub struct Depot {
    pub city: String,
    pub lat: f64,
    pub lon: f64,
}

impl Depot {
    pub fn coords(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }

    /// Three-letter city code used when minting zone identifiers.
    pub fn city3(&self) -> String {
        city3(&self.city)
    }
}

/// Uppercased, trimmed city key used for all lookups.
pub fn normalize_city(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Three-letter code derived from a city name, e.g. `JEDDAH` -> `JED`.
pub fn city3(city: &str) -> String {
    normalize_city(city)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(3)
        .collect()
}

fn valid_coords(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

/// One immutable load of the customer master and depot catalogue.
#[derive(Debug, Default)]
pub struct DatasetSnapshot {
    customers: Vec<Customer>,
    depots: Vec<Depot>,
    /// Rows dropped during load (bad coordinates, missing id).
    pub skipped_rows: usize,
}

impl DatasetSnapshot {
    pub fn load(customer_file: &Path, depot_file: &Path) -> Result<Self> {
        let (customers, skipped_rows) = read_customers(customer_file)?;
        let depots = read_depots(depot_file)?;
        Ok(Self {
            customers,
            depots,
            skipped_rows,
        })
    }

    /// Snapshot built from in-memory entities (tests, embedding callers).
    pub fn from_parts(customers: Vec<Customer>, depots: Vec<Depot>) -> Self {
        Self {
            customers,
            depots,
            skipped_rows: 0,
        }
    }

    pub fn customers(&self) -> &[Customer] {
        &self.customers
    }

    pub fn customers_in_city(&self, city: &str) -> Vec<&Customer> {
        let key = normalize_city(city);
        self.customers
            .iter()
            .filter(|c| normalize_city(&c.city) == key)
            .collect()
    }

    pub fn customers_in_zone(&self, city: &str, zone: &str) -> Vec<&Customer> {
        let key = normalize_city(city);
        self.customers
            .iter()
            .filter(|c| normalize_city(&c.city) == key)
            .filter(|c| c.zone.as_deref().is_some_and(|z| z.eq_ignore_ascii_case(zone)))
            .collect()
    }

    pub fn customer_by_id(&self, id: &str) -> Option<&Customer> {
        self.customers.iter().find(|c| c.id == id)
    }

    pub fn depot_for_city(&self, city: &str) -> Option<&Depot> {
        let key = normalize_city(city);
        self.depots.iter().find(|d| normalize_city(&d.city) == key)
    }
}

/// Shared handle publishing immutable snapshots.
///
/// `snapshot()` hands out an `Arc` clone; `publish()` swaps the current
/// snapshot without disturbing readers that already hold one.
#[derive(Debug)]
pub struct DatasetHandle {
    inner: RwLock<Arc<DatasetSnapshot>>,
}

impl DatasetHandle {
    pub fn new(snapshot: DatasetSnapshot) -> Self {
        Self {
            inner: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn snapshot(&self) -> Arc<DatasetSnapshot> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn publish(&self, snapshot: DatasetSnapshot) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(snapshot);
    }

    pub fn reload(&self, customer_file: &Path, depot_file: &Path) -> Result<()> {
        let snapshot = DatasetSnapshot::load(customer_file, depot_file)?;
        self.publish(snapshot);
        Ok(())
    }
}

const CUSTOMER_ID_HEADERS: [&str; 2] = ["customer_id", "id"];
const NAME_HEADERS: [&str; 2] = ["name", "customer_name"];
const CITY_HEADERS: [&str; 1] = ["city"];
const ZONE_HEADERS: [&str; 2] = ["zone", "zone_code"];
const LAT_HEADERS: [&str; 2] = ["latitude", "lat"];
const LON_HEADERS: [&str; 3] = ["longitude", "lon", "lng"];

fn find_header(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
}

fn read_customers(path: &Path) -> Result<(Vec<Customer>, usize)> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|err| Error::Internal(format!("customer master unreadable: {}", err)))?;

    let headers = reader.headers()?.clone();
    let id_col = find_header(&headers, &CUSTOMER_ID_HEADERS)
        .ok_or_else(|| Error::InvalidInput("customer master lacks a customer_id column".to_string()))?;
    let lat_col = find_header(&headers, &LAT_HEADERS)
        .ok_or_else(|| Error::InvalidInput("customer master lacks a latitude column".to_string()))?;
    let lon_col = find_header(&headers, &LON_HEADERS)
        .ok_or_else(|| Error::InvalidInput("customer master lacks a longitude column".to_string()))?;
    let city_col = find_header(&headers, &CITY_HEADERS)
        .ok_or_else(|| Error::InvalidInput("customer master lacks a city column".to_string()))?;
    let name_col = find_header(&headers, &NAME_HEADERS);
    let zone_col = find_header(&headers, &ZONE_HEADERS);

    let core_cols = [Some(id_col), Some(lat_col), Some(lon_col), Some(city_col), name_col, zone_col];

    let mut customers = Vec::new();
    let mut skipped = 0usize;

    for (row_number, record) in reader.records().enumerate() {
        let record = record?;
        let id = record.get(id_col).unwrap_or_default().trim().to_string();
        let lat = record.get(lat_col).unwrap_or_default().trim().parse::<f64>();
        let lon = record.get(lon_col).unwrap_or_default().trim().parse::<f64>();

        let (lat, lon) = match (lat, lon) {
            (Ok(lat), Ok(lon)) if valid_coords(lat, lon) && !id.is_empty() => (lat, lon),
            _ => {
                warn!(row = row_number + 2, "skipping customer row with bad id or coordinates");
                skipped += 1;
                continue;
            }
        };

        let mut attributes = BTreeMap::new();
        for (col, value) in record.iter().enumerate() {
            if core_cols.contains(&Some(col)) {
                continue;
            }
            if let Some(header) = headers.get(col) {
                attributes.insert(header.trim().to_string(), value.trim().to_string());
            }
        }

        let zone = zone_col
            .and_then(|col| record.get(col))
            .map(str::trim)
            .filter(|z| !z.is_empty())
            .map(str::to_string);

        customers.push(Customer {
            id,
            name: name_col
                .and_then(|col| record.get(col))
                .unwrap_or_default()
                .trim()
                .to_string(),
            city: normalize_city(record.get(city_col).unwrap_or_default()),
            zone,
            lat,
            lon,
            attributes,
        });
    }

    Ok((customers, skipped))
}

fn read_depots(path: &Path) -> Result<Vec<Depot>> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|err| Error::Internal(format!("depot catalogue unreadable: {}", err)))?;

    let headers = reader.headers()?.clone();
    let city_col = find_header(&headers, &CITY_HEADERS)
        .ok_or_else(|| Error::InvalidInput("depot catalogue lacks a city column".to_string()))?;
    let lat_col = find_header(&headers, &LAT_HEADERS)
        .ok_or_else(|| Error::InvalidInput("depot catalogue lacks a latitude column".to_string()))?;
    let lon_col = find_header(&headers, &LON_HEADERS)
        .ok_or_else(|| Error::InvalidInput("depot catalogue lacks a longitude column".to_string()))?;

    let mut depots = Vec::new();
    for record in reader.records() {
        let record = record?;
        let city = normalize_city(record.get(city_col).unwrap_or_default());
        let lat = record.get(lat_col).unwrap_or_default().trim().parse::<f64>();
        let lon = record.get(lon_col).unwrap_or_default().trim().parse::<f64>();
        match (lat, lon) {
            (Ok(lat), Ok(lon)) if valid_coords(lat, lon) && !city.is_empty() => {
                depots.push(Depot { city, lat, lon });
            }
            _ => {
                warn!("skipping depot row with bad city or coordinates");
            }
        }
    }

    Ok(depots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "zone-planner-dataset-{}-{}",
            std::process::id(),
            name
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_customers_with_attributes() {
        let customers = write_temp(
            "customers.csv",
            "customer_id,name,city,zone,latitude,longitude,segment\n\
             C001,Alpha Market,Jeddah,JED001,21.54,39.17,retail\n\
             C002,Beta Stores,jeddah,,21.60,39.20,wholesale\n\
             C003,Bad Row,Jeddah,,not-a-lat,39.20,retail\n",
        );
        let depots = write_temp("depots.csv", "city,latitude,longitude\nJeddah,21.50,39.19\n");

        let snapshot = DatasetSnapshot::load(&customers, &depots).unwrap();
        assert_eq!(snapshot.customers().len(), 2);
        assert_eq!(snapshot.skipped_rows, 1);

        let in_city = snapshot.customers_in_city("JEDDAH");
        assert_eq!(in_city.len(), 2);
        assert_eq!(in_city[0].attributes.get("segment").unwrap(), "retail");
        assert_eq!(in_city[0].zone.as_deref(), Some("JED001"));
        assert!(in_city[1].zone.is_none());

        let depot = snapshot.depot_for_city("jeddah").unwrap();
        assert_eq!(depot.city3(), "JED");

        std::fs::remove_file(customers).ok();
        std::fs::remove_file(depots).ok();
    }

    #[test]
    fn zone_filter_matches_case_insensitively() {
        let snapshot = DatasetSnapshot::from_parts(
            vec![Customer {
                id: "C001".into(),
                name: String::new(),
                city: "JEDDAH".into(),
                zone: Some("jed001".into()),
                lat: 21.5,
                lon: 39.2,
                attributes: BTreeMap::new(),
            }],
            vec![],
        );
        assert_eq!(snapshot.customers_in_zone("Jeddah", "JED001").len(), 1);
    }

    #[test]
    fn publish_swaps_snapshot_without_touching_old_readers() {
        let handle = DatasetHandle::new(DatasetSnapshot::from_parts(vec![], vec![]));
        let before = handle.snapshot();
        handle.publish(DatasetSnapshot::from_parts(
            vec![],
            vec![Depot {
                city: "JEDDAH".into(),
                lat: 21.5,
                lon: 39.2,
            }],
        ));
        assert!(before.depot_for_city("JEDDAH").is_none());
        assert!(handle.snapshot().depot_for_city("JEDDAH").is_some());
    }

    #[test]
    fn city3_truncates_and_uppercases() {
        assert_eq!(city3("Jeddah"), "JED");
        assert_eq!(city3("  riyadh "), "RIY");
        assert_eq!(city3("Al-Khobar"), "ALK");
    }
}
