//! Post-pass redistribution of customers across zones.
//!
//! Moves customers out of overloaded zones into underloaded ones until every
//! count sits inside the tolerance band around the mean, or no donor/recipient
//! pair remains. Candidate moves minimize the distance to the recipient's
//! centroid, with ties broken by customer id so the loop cannot stall.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::{Customer, Depot};
use crate::geo::haversine_km;
use crate::zoning::ZoningOutcome;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub customer_id: String,
    pub from_zone: String,
    pub to_zone: String,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceReport {
    pub counts_before: Vec<(String, usize)>,
    pub counts_after: Vec<(String, usize)>,
    pub transfers: Vec<Transfer>,
    pub tolerance: f64,
    /// False when the tolerance band was unreachable within the move budget.
    pub converged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

struct ZoneState {
    zone_id: String,
    members: Vec<usize>, // indices into `customers`
    sum_lat: f64,
    sum_lon: f64,
}

impl ZoneState {
    fn centroid(&self, depot: &Depot) -> (f64, f64) {
        if self.members.is_empty() {
            depot.coords()
        } else {
            let n = self.members.len() as f64;
            (self.sum_lat / n, self.sum_lon / n)
        }
    }
}

/// Rebalance `outcome` in place and return the transfer ledger.
///
/// Performs at most one transfer per assigned customer. Polygons are left
/// untouched: balancing reports counts, not shapes.
pub fn balance_zones(
    outcome: &mut ZoningOutcome,
    customers: &[&Customer],
    depot: &Depot,
    tolerance: f64,
) -> BalanceReport {
    let counts_before = outcome.counts.clone();

    let index_by_id: BTreeMap<&str, usize> = customers
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.as_str(), i))
        .collect();

    // Zone order follows the strategy's counts so reports stay aligned.
    let mut zones: Vec<ZoneState> = outcome
        .counts
        .iter()
        .map(|(zone_id, _)| ZoneState {
            zone_id: zone_id.clone(),
            members: Vec::new(),
            sum_lat: 0.0,
            sum_lon: 0.0,
        })
        .collect();
    for (customer_id, zone_id) in &outcome.assignments {
        let Some(&member) = index_by_id.get(customer_id.as_str()) else {
            continue;
        };
        if let Some(zone) = zones.iter_mut().find(|z| &z.zone_id == zone_id) {
            zone.members.push(member);
            zone.sum_lat += customers[member].lat;
            zone.sum_lon += customers[member].lon;
        }
    }

    let total_assigned: usize = zones.iter().map(|z| z.members.len()).sum();
    let mut report = BalanceReport {
        counts_before,
        counts_after: Vec::new(),
        transfers: Vec::new(),
        tolerance,
        converged: true,
        note: None,
    };

    if zones.is_empty() || total_assigned == 0 {
        report.counts_after = outcome.counts.clone();
        report.note = Some("nothing to balance".to_string());
        return report;
    }

    let avg = total_assigned as f64 / zones.len() as f64;
    let lower = avg * (1.0 - tolerance);
    let upper = avg * (1.0 + tolerance);

    for _ in 0..total_assigned {
        let Some(source) = zones
            .iter()
            .enumerate()
            .filter(|(_, z)| z.members.len() as f64 > upper)
            .max_by(|(_, a), (_, b)| {
                a.members
                    .len()
                    .cmp(&b.members.len())
                    .then_with(|| b.zone_id.cmp(&a.zone_id))
            })
            .map(|(idx, _)| idx)
        else {
            break;
        };
        let Some(recipient) = zones
            .iter()
            .enumerate()
            .filter(|(_, z)| (z.members.len() as f64) < lower)
            .min_by(|(_, a), (_, b)| {
                a.members
                    .len()
                    .cmp(&b.members.len())
                    .then_with(|| a.zone_id.cmp(&b.zone_id))
            })
            .map(|(idx, _)| idx)
        else {
            break;
        };

        let target = zones[recipient].centroid(depot);
        let Some((slot, member, distance_km)) = zones[source]
            .members
            .iter()
            .enumerate()
            .map(|(slot, &member)| {
                (slot, member, haversine_km(customers[member].coords(), target))
            })
            .min_by(|a, b| {
                a.2.partial_cmp(&b.2)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| customers[a.1].id.cmp(&customers[b.1].id))
            })
        else {
            break;
        };

        zones[source].members.swap_remove(slot);
        zones[source].sum_lat -= customers[member].lat;
        zones[source].sum_lon -= customers[member].lon;
        zones[recipient].members.push(member);
        zones[recipient].sum_lat += customers[member].lat;
        zones[recipient].sum_lon += customers[member].lon;

        let transfer = Transfer {
            customer_id: customers[member].id.clone(),
            from_zone: zones[source].zone_id.clone(),
            to_zone: zones[recipient].zone_id.clone(),
            distance_km,
        };
        debug!(
            customer = %transfer.customer_id,
            from = %transfer.from_zone,
            to = %transfer.to_zone,
            "balance transfer"
        );
        outcome
            .assignments
            .insert(transfer.customer_id.clone(), transfer.to_zone.clone());
        report.transfers.push(transfer);
    }

    let in_band = zones.iter().all(|z| {
        let n = z.members.len() as f64;
        n >= lower.floor() && n <= upper.ceil()
    });
    if !in_band {
        report.converged = false;
        report.note = Some(format!(
            "tolerance band [{:.1}, {:.1}] unreachable: no donor/recipient pair left",
            lower, upper
        ));
    }

    for zone in &zones {
        report.counts_after.push((zone.zone_id.clone(), zone.members.len()));
    }
    outcome.counts = report.counts_after.clone();
    report
}
