//! Real Jeddah district locations for realistic test fixtures.
//!
//! Coordinates are approximate district centers; close enough to exercise
//! bearings, projections, and travel-time bands at city scale.

/// A named location with coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Location {
    pub name: &'static str,
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub const fn new(name: &'static str, lat: f64, lon: f64) -> Self {
        Self { name, lat, lon }
    }

    pub fn coords(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }
}

/// Depot: distribution hub near the port.
pub const DEPOT: Location = Location::new("Jeddah Hub", 21.5433, 39.1728);

// ============================================================================
// Central districts (short hops from the depot)
// ============================================================================

pub const CENTRAL: &[Location] = &[
    Location::new("Al-Balad", 21.4858, 39.1925),
    Location::new("Al-Hamra", 21.5292, 39.1611),
    Location::new("Bani Malik", 21.5620, 39.1980),
    Location::new("Al-Aziziyah", 21.5430, 39.2140),
    Location::new("Al-Faisaliyyah", 21.5000, 39.2000),
];

// ============================================================================
// Northern districts
// ============================================================================

pub const NORTH: &[Location] = &[
    Location::new("Ar-Rawdah", 21.5867, 39.1500),
    Location::new("As-Salamah", 21.6170, 39.1320),
    Location::new("Al-Marwah", 21.6240, 39.1870),
    Location::new("Al-Safa", 21.5810, 39.2180),
    Location::new("Obhur", 21.7090, 39.0960),
];

// ============================================================================
// Eastern districts
// ============================================================================

pub const EAST: &[Location] = &[
    Location::new("Al-Naseem", 21.5560, 39.2480),
    Location::new("Al-Rehab", 21.5680, 39.2300),
    Location::new("Al-Jamiah", 21.4930, 39.2450),
    Location::new("Bryman", 21.5290, 39.2610),
];
