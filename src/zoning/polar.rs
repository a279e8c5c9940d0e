//! Polar-sector zoning: equal-width bearing sectors around the depot.

use std::collections::BTreeMap;

use crate::dataset::{Customer, Depot};
use crate::error::{Error, Result};
use crate::geo::{LocalProjection, bearing_deg, haversine_km};
use crate::zoning::{ZoneMetadata, ZonePolygon, ZoningOutcome, hull_ring, mint_zone_id};

#[derive(Debug, Clone)]
pub struct PolarOptions {
    pub target_zones: usize,
    /// Rotation of the first sector boundary, degrees clockwise from north.
    pub rotation_offset_deg: f64,
}

impl Default for PolarOptions {
    fn default() -> Self {
        Self {
            target_zones: 4,
            rotation_offset_deg: 0.0,
        }
    }
}

/// Partition customers into `target_zones` equal bearing sectors.
///
/// A customer at bearing `theta` lands in sector
/// `floor(((theta - offset) mod 360) / (360 / target_zones))`. With a single
/// target zone the result degenerates to one zone bounded by the customer
/// hull.
pub fn partition(customers: &[&Customer], depot: &Depot, opts: &PolarOptions) -> Result<ZoningOutcome> {
    if opts.target_zones == 0 {
        return Err(Error::InvalidInput("target_zones must be at least 1".to_string()));
    }

    let city3 = depot.city3();
    let projection = LocalProjection::new(depot.coords());
    let k = opts.target_zones;
    let width = 360.0 / k as f64;

    let mut assignments = BTreeMap::new();
    let mut members: Vec<Vec<(f64, f64)>> = vec![Vec::new(); k];
    let mut max_radius_km = vec![0.0f64; k];

    for customer in customers {
        let sector = if k == 1 {
            0
        } else {
            let theta = bearing_deg(depot.coords(), customer.coords());
            let rotated = (theta - opts.rotation_offset_deg).rem_euclid(360.0);
            // Floating-point edge: a bearing of exactly 360 - eps can round
            // up to k, which wraps into the first sector.
            ((rotated / width) as usize).min(k - 1)
        };
        assignments.insert(customer.id.clone(), mint_zone_id(&city3, sector + 1));
        members[sector].push(customer.coords());
        max_radius_km[sector] =
            max_radius_km[sector].max(haversine_km(depot.coords(), customer.coords()));
    }

    let mut counts = Vec::with_capacity(k);
    let mut polygons = Vec::new();

    for sector in 0..k {
        let zone_id = mint_zone_id(&city3, sector + 1);
        counts.push((zone_id.clone(), members[sector].len()));

        if members[sector].is_empty() {
            continue;
        }

        let ring = if k == 1 {
            hull_ring(&members[sector], &projection)
        } else {
            sector_ring(
                &projection,
                depot,
                opts.rotation_offset_deg + sector as f64 * width,
                width,
                max_radius_km[sector],
            )
        };
        if let Some(ring) = ring {
            polygons.push(ZonePolygon { zone_id, ring });
        }
    }

    Ok(ZoningOutcome {
        assignments,
        counts,
        polygons,
        metadata: ZoneMetadata {
            sector_width_deg: Some(width),
            rotation_offset_deg: Some(opts.rotation_offset_deg),
            ..ZoneMetadata::default()
        },
    })
}

/// Wedge ring: depot apex plus the sector arc at the outermost customer
/// radius, approximated by chords.
fn sector_ring(
    projection: &LocalProjection,
    depot: &Depot,
    start_deg: f64,
    width_deg: f64,
    radius_km: f64,
) -> Option<Vec<(f64, f64)>> {
    if radius_km <= 0.0 {
        return None;
    }

    let mut ring = vec![depot.coords()];
    let chords = ((width_deg / 30.0).ceil() as usize).max(1);
    for step in 0..=chords {
        let angle = (start_deg + width_deg * step as f64 / chords as f64).to_radians();
        let x = radius_km * angle.sin();
        let y = radius_km * angle.cos();
        ring.push(projection.unproject((x, y)));
    }
    Some(ring)
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

    fn customer(id: &str, lat: f64, lon: f64) -> Customer {
        Customer {
            id: id.into(),
            name: String::new(),
            city: "JEDDAH".into(),
            zone: None,
            lat,
            lon,
            attributes: Map::new(),
        }
    }

    #[test]
    fn bearing_law_with_zero_offset() {
        // Diagonal points sit at bearings ~45/135/225/315, safely inside
        // the four sectors [0,90), [90,180), [180,270), [270,360).
        let depot = depot();
        let ne = customer("NE", depot.lat + 0.1, depot.lon + 0.1);
        let se = customer("SE", depot.lat - 0.1, depot.lon + 0.1);
        let sw = customer("SW", depot.lat - 0.1, depot.lon - 0.1);
        let nw = customer("NW", depot.lat + 0.1, depot.lon - 0.1);
        let all = [&ne, &se, &sw, &nw];

        let outcome = partition(
            &all,
            &depot,
            &PolarOptions {
                target_zones: 4,
                rotation_offset_deg: 0.0,
            },
        )
        .unwrap();

        assert_eq!(outcome.assignments["NE"], "JED001");
        assert_eq!(outcome.assignments["SE"], "JED002");
        assert_eq!(outcome.assignments["SW"], "JED003");
        assert_eq!(outcome.assignments["NW"], "JED004");
    }

    #[test]
    fn rotation_shifts_sector_membership() {
        let depot = depot();
        let east = customer("E", depot.lat, depot.lon + 0.1);
        let outcome = partition(
            &[&east],
            &depot,
            &PolarOptions {
                target_zones: 4,
                rotation_offset_deg: 45.0,
            },
        )
        .unwrap();
        // Bearing ~90, rotated to ~45: first sector.
        assert_eq!(outcome.assignments["E"], "JED001");
    }

    #[test]
    fn single_zone_degenerates_to_hull() {
        let depot = depot();
        let a = customer("A", 21.60, 39.10);
        let b = customer("B", 21.60, 39.25);
        let c = customer("C", 21.48, 39.18);
        let outcome = partition(
            &[&a, &b, &c],
            &depot,
            &PolarOptions {
                target_zones: 1,
                rotation_offset_deg: 0.0,
            },
        )
        .unwrap();

        assert_eq!(outcome.counts, vec![("JED001".to_string(), 3)]);
        assert_eq!(outcome.polygons.len(), 1);
        assert_eq!(outcome.polygons[0].ring.len(), 3);
    }

    #[test]
    fn empty_sectors_report_zero_counts() {
        let depot = depot();
        let north = customer("N", depot.lat + 0.1, depot.lon);
        let outcome = partition(
            &[&north],
            &depot,
            &PolarOptions {
                target_zones: 3,
                rotation_offset_deg: 0.0,
            },
        )
        .unwrap();
        assert_eq!(outcome.counts.len(), 3);
        assert_eq!(outcome.assigned_total(), 1);
    }

    #[test]
    fn rejects_zero_zones() {
        let depot = depot();
        assert!(matches!(
            partition(
                &[],
                &depot,
                &PolarOptions {
                    target_zones: 0,
                    rotation_offset_deg: 0.0
                }
            ),
            Err(Error::InvalidInput(_))
        ));
    }
}
