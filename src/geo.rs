//! Geographic primitives: great-circle distance, bearings, a local
//! Cartesian projection, point-in-polygon, and convex hulls.
//!
//! Everything here is pure compute. Euclidean math only ever happens on
//! projected coordinates; degrees are never treated as metric.

/// Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometers per degree of latitude (and of longitude at the equator).
pub const KM_PER_DEGREE: f64 = 111.32;

/// Great-circle distance between two (lat, lon) points in kilometers.
pub fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = from;
    let (lat2, lon2) = to;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Initial bearing from `from` to `to` in degrees clockwise from north,
/// normalized to `[0, 360)`.
pub fn bearing_deg(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = from;
    let (lat2, lon2) = to;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let y = delta_lon.sin() * lat2_rad.cos();
    let x = lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * delta_lon.cos();

    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Equirectangular projection onto a plane tangent near `origin`.
///
/// Metric-preserving for the city-scale extents this planner works at:
/// 1 degree of latitude maps to [`KM_PER_DEGREE`] km, 1 degree of longitude
/// to `KM_PER_DEGREE * cos(origin latitude)` km.
#[derive(Debug, Clone, Copy)]
pub struct LocalProjection {
    origin_lat: f64,
    origin_lon: f64,
    lon_scale: f64,
}

impl LocalProjection {
    pub fn new(origin: (f64, f64)) -> Self {
        Self {
            origin_lat: origin.0,
            origin_lon: origin.1,
            lon_scale: KM_PER_DEGREE * origin.0.to_radians().cos(),
        }
    }

    /// (lat, lon) degrees to (x, y) kilometers east/north of the origin.
    pub fn project(&self, point: (f64, f64)) -> (f64, f64) {
        let x = (point.1 - self.origin_lon) * self.lon_scale;
        let y = (point.0 - self.origin_lat) * KM_PER_DEGREE;
        (x, y)
    }

    /// (x, y) kilometers back to (lat, lon) degrees.
    pub fn unproject(&self, point: (f64, f64)) -> (f64, f64) {
        let lat = self.origin_lat + point.1 / KM_PER_DEGREE;
        let lon = self.origin_lon + point.0 / self.lon_scale;
        (lat, lon)
    }
}

/// Ray-casting point-in-polygon test on (lat, lon) vertices.
///
/// The ring is treated as cyclic; a duplicated closing vertex is harmless.
/// Points exactly on an edge may land on either side.
pub fn point_in_ring(point: (f64, f64), ring: &[(f64, f64)]) -> bool {
    if ring.len() < 3 {
        return false;
    }

    let (py, px) = point;
    let mut inside = false;
    let mut j = ring.len() - 1;

    for i in 0..ring.len() {
        let (yi, xi) = ring[i];
        let (yj, xj) = ring[j];

        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }

    inside
}

/// Convex hull of a point set via Andrew's monotone chain.
///
/// Returns indices into `points` in counter-clockwise order. Callers project
/// to the local plane first; hull membership is not meaningful in degrees.
pub fn convex_hull_indices(points: &[(f64, f64)]) -> Vec<usize> {
    let n = points.len();
    if n < 3 {
        return (0..n).collect();
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        points[a]
            .partial_cmp(&points[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let cross = |o: usize, a: usize, b: usize| -> f64 {
        let (ox, oy) = points[o];
        let (ax, ay) = points[a];
        let (bx, by) = points[b];
        (ax - ox) * (by - oy) - (ay - oy) * (bx - ox)
    };

    let mut hull: Vec<usize> = Vec::with_capacity(2 * n);
    for &idx in &order {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], idx) <= 0.0 {
            hull.pop();
        }
        hull.push(idx);
    }

    let lower_len = hull.len() + 1;
    for &idx in order.iter().rev() {
        while hull.len() >= lower_len && cross(hull[hull.len() - 2], hull[hull.len() - 1], idx) <= 0.0
        {
            hull.pop();
        }
        hull.push(idx);
    }

    hull.pop();
    hull
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_same_point_is_zero() {
        let dist = haversine_km((21.54, 39.17), (21.54, 39.17));
        assert!(dist < 1e-3);
    }

    #[test]
    fn haversine_known_distance() {
        // Jeddah (21.54, 39.17) to Makkah (21.39, 39.86): roughly 73 km.
        let dist = haversine_km((21.54, 39.17), (21.39, 39.86));
        assert!(dist > 65.0 && dist < 80.0, "got {}", dist);
    }

    #[test]
    fn bearing_cardinal_directions() {
        let origin = (21.5, 39.2);
        assert!((bearing_deg(origin, (22.5, 39.2)) - 0.0).abs() < 1.0);
        assert!((bearing_deg(origin, (21.5, 40.2)) - 90.0).abs() < 1.0);
        assert!((bearing_deg(origin, (20.5, 39.2)) - 180.0).abs() < 1.0);
        assert!((bearing_deg(origin, (21.5, 38.2)) - 270.0).abs() < 1.0);
    }

    #[test]
    fn projection_round_trips() {
        let projection = LocalProjection::new((21.54, 39.17));
        let point = (21.61, 39.25);
        let (lat, lon) = projection.unproject(projection.project(point));
        assert!((lat - point.0).abs() < 1e-9);
        assert!((lon - point.1).abs() < 1e-9);
    }

    #[test]
    fn projection_matches_haversine_locally() {
        let origin = (21.54, 39.17);
        let projection = LocalProjection::new(origin);
        let point = (21.60, 39.24);
        let (x, y) = projection.project(point);
        let planar = (x * x + y * y).sqrt();
        let great_circle = haversine_km(origin, point);
        assert!((planar - great_circle).abs() < 0.05, "{} vs {}", planar, great_circle);
    }

    #[test]
    fn point_in_ring_square() {
        let ring = vec![(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)];
        assert!(point_in_ring((5.0, 5.0), &ring));
        assert!(!point_in_ring((15.0, 5.0), &ring));
        assert!(!point_in_ring((-1.0, -1.0), &ring));
    }

    #[test]
    fn point_in_ring_accepts_closed_ring() {
        let ring = vec![(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0), (0.0, 0.0)];
        assert!(point_in_ring((5.0, 5.0), &ring));
    }

    #[test]
    fn hull_drops_interior_points() {
        let points = vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (5.0, 5.0)];
        let hull = convex_hull_indices(&points);
        assert_eq!(hull.len(), 4);
        assert!(!hull.contains(&4));
    }

    #[test]
    fn hull_of_collinear_points_keeps_extremes() {
        let points = vec![(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)];
        let hull = convex_hull_indices(&points);
        assert!(hull.contains(&0));
        assert!(hull.contains(&2));
    }
}
