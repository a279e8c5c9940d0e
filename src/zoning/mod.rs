//! Zoning strategies.
//!
//! Four pluggable partitioners share one output contract: an assignment map,
//! per-zone counts, optional boundary polygons, and strategy metadata.
//! Zone identifiers are minted as `<CITY3><NNN>`, 1-based in strategy order;
//! manual mode keeps the caller's identifiers.

pub mod cluster;
pub mod isochrone;
pub mod manual;
pub mod polar;

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::balance::BalanceReport;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoningMethod {
    Polar,
    Isochrone,
    Clustering,
    Manual,
}

impl ZoningMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoningMethod::Polar => "polar",
            ZoningMethod::Isochrone => "isochrone",
            ZoningMethod::Clustering => "clustering",
            ZoningMethod::Manual => "manual",
        }
    }
}

impl FromStr for ZoningMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "polar" => Ok(ZoningMethod::Polar),
            "isochrone" => Ok(ZoningMethod::Isochrone),
            "clustering" => Ok(ZoningMethod::Clustering),
            "manual" => Ok(ZoningMethod::Manual),
            other => Err(Error::InvalidInput(format!("unknown zoning method {:?}", other))),
        }
    }
}

/// Mint a zone identifier from the depot city code and a 1-based ordinal.
pub fn mint_zone_id(city3: &str, ordinal: usize) -> String {
    format!("{}{:03}", city3, ordinal)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZonePolygon {
    pub zone_id: String,
    /// (lat, lon) vertices forming a simple closed ring (first == last implied).
    pub ring: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneCentroid {
    pub zone_id: String,
    pub lat: f64,
    pub lon: f64,
}

/// One cluster split performed by max-customers enforcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSplit {
    pub zone_id: String,
    pub size_before: usize,
    pub new_zone_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector_width_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_offset_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds_min: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overflow_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub centroids: Vec<ZoneCentroid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub splits: Vec<ClusterSplit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint_satisfied: Option<bool>,
    /// Pairs of user polygons that both claimed at least one customer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overlaps: Vec<(String, String)>,
    /// Customers outside every manual polygon.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unassigned: Vec<String>,
    /// Set when the travel matrix behind this result was degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_matrix: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<BalanceReport>,
}

/// Common output of every zoning strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoningOutcome {
    pub assignments: BTreeMap<String, String>,
    pub counts: Vec<(String, usize)>,
    pub polygons: Vec<ZonePolygon>,
    pub metadata: ZoneMetadata,
}

impl ZoningOutcome {
    pub fn zone_count(&self) -> usize {
        self.counts.len()
    }

    pub fn assigned_total(&self) -> usize {
        self.counts.iter().map(|(_, n)| n).sum()
    }
}

/// Convex-hull ring over member coordinates, or `None` when fewer than
/// three members (a degenerate boundary is worse than no boundary).
pub(crate) fn hull_ring(
    members: &[(f64, f64)],
    projection: &crate::geo::LocalProjection,
) -> Option<Vec<(f64, f64)>> {
    if members.len() < 3 {
        return None;
    }
    let projected: Vec<(f64, f64)> = members.iter().map(|p| projection.project(*p)).collect();
    let hull = crate::geo::convex_hull_indices(&projected);
    if hull.len() < 3 {
        return None;
    }
    Some(hull.into_iter().map(|i| members[i]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mints_padded_zone_ids() {
        assert_eq!(mint_zone_id("JED", 1), "JED001");
        assert_eq!(mint_zone_id("JED", 12), "JED012");
        assert_eq!(mint_zone_id("RIY", 120), "RIY120");
    }

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("Polar".parse::<ZoningMethod>().unwrap(), ZoningMethod::Polar);
        assert!("voronoi".parse::<ZoningMethod>().is_err());
    }
}
