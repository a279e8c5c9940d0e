//! Vehicle-routing solver.
//!
//! Converts a zone's customers into day-labeled routes that start and end at
//! the depot. Small single-vehicle instances are solved exactly; everything
//! else gets cheapest-insertion construction followed by 2-opt and relocate
//! local search under a deadline. Customer capacity, route duration, and
//! route distance are hard limits; minimum customers per route and the soft
//! distance target are reported, not enforced.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::CallContext;
use crate::error::{Error, Result};
use crate::matrix::TravelMatrix;

/// Largest single-route instance solved by exhaustive permutation.
pub const TSP_EXHAUSTIVE_MAX: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConstraints {
    pub max_customers_per_route: usize,
    /// Advisory floor; shortfalls are reported as violations.
    pub min_customers_per_route: usize,
    pub max_route_duration_minutes: f64,
    pub max_distance_per_route_km: f64,
    /// Soft target; realized distance at or past it is recorded as an
    /// overage while the hard cap above still binds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soft_distance_target_km: Option<f64>,
}

impl Default for RouteConstraints {
    fn default() -> Self {
        Self {
            max_customers_per_route: 25,
            min_customers_per_route: 0,
            max_route_duration_minutes: 480.0,
            max_distance_per_route_km: 250.0,
            soft_distance_target_km: None,
        }
    }
}

impl RouteConstraints {
    pub fn validate(&self) -> Result<()> {
        if self.max_customers_per_route == 0 {
            return Err(Error::InvalidInput(
                "max_customers_per_route must be at least 1".to_string(),
            ));
        }
        if self.min_customers_per_route > self.max_customers_per_route {
            return Err(Error::InvalidInput(format!(
                "min_customers_per_route {} exceeds max_customers_per_route {}",
                self.min_customers_per_route, self.max_customers_per_route
            )));
        }
        if !(self.max_route_duration_minutes > 0.0) || !(self.max_distance_per_route_km > 0.0) {
            return Err(Error::InvalidInput(
                "route duration and distance limits must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {
    pub customer_id: String,
    /// 1-based position within the route; the depot is implicit at 0.
    pub sequence: usize,
    /// Minutes since depot departure.
    pub arrival_min: f64,
    pub distance_from_prev_km: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePlan {
    pub route_id: String,
    pub day: String,
    pub stops: Vec<Stop>,
    /// Includes the return leg to the depot.
    pub total_distance_km: f64,
    pub total_duration_minutes: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub constraint_violations: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolveStatus {
    Optimal,
    Feasible,
    Infeasible,
    Timeout,
}

impl SolveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolveStatus::Optimal => "optimal",
            SolveStatus::Feasible => "feasible",
            SolveStatus::Infeasible => "infeasible",
            SolveStatus::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    pub vehicles: usize,
    pub plans: Vec<RoutePlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

pub struct VrpInput<'a> {
    pub zone_id: &'a str,
    /// Aligned with matrix indices `1..=n`; index 0 is the depot.
    pub customer_ids: &'a [String],
    pub matrix: &'a TravelMatrix,
    pub constraints: &'a RouteConstraints,
    pub working_days: &'a [String],
    pub seed: u64,
}

/// Solve the full vehicle-routing problem for one zone.
///
/// Returns `Ok` with an `Infeasible` status (empty plans, diagnostic) when
/// the hard limits admit no assignment; `Err` is reserved for malformed
/// inputs.
pub fn solve_vrp(input: &VrpInput<'_>, ctx: &CallContext) -> Result<SolveOutcome> {
    let n = input.customer_ids.len();
    if input.matrix.dim() != n + 1 {
        return Err(Error::Internal(format!(
            "matrix dimension {} does not cover depot plus {} customers",
            input.matrix.dim(),
            n
        )));
    }
    input.constraints.validate()?;
    if input.working_days.is_empty() {
        return Err(Error::InvalidInput("working-day list is empty".to_string()));
    }

    if n == 0 {
        return Ok(SolveOutcome {
            status: SolveStatus::Optimal,
            vehicles: 0,
            plans: Vec::new(),
            diagnostic: None,
        });
    }

    let vehicles = n.div_ceil(input.constraints.max_customers_per_route).max(1);
    debug!(zone = input.zone_id, customers = n, vehicles, "solving zone routes");

    // Exact path for small single-vehicle instances.
    if vehicles == 1 && n <= TSP_EXHAUSTIVE_MAX {
        let (order, _) = solve_tsp(input.matrix);
        if let Some(overage) = hard_violation(input.matrix, &order, input.constraints) {
            return Ok(infeasible_outcome(vehicles, overage));
        }
        let plan = build_plan(
            route_id(input.zone_id, 1),
            input.working_days[0].clone(),
            &order,
            input,
        );
        return Ok(SolveOutcome {
            status: SolveStatus::Optimal,
            vehicles: 1,
            plans: vec![plan],
            diagnostic: None,
        });
    }

    let mut rng = StdRng::seed_from_u64(input.seed);
    let mut routes = match construct(input.matrix, n, vehicles, input.constraints, &mut rng) {
        Ok(routes) => routes,
        Err(overage) => return Ok(infeasible_outcome(vehicles, overage)),
    };

    let timed_out = improve(&mut routes, input.matrix, input.constraints, ctx);

    routes.retain(|route| !route.is_empty());
    let plans = routes
        .iter()
        .enumerate()
        .map(|(idx, route)| {
            build_plan(
                route_id(input.zone_id, idx + 1),
                input.working_days[idx % input.working_days.len()].clone(),
                route,
                input,
            )
        })
        .collect();

    Ok(SolveOutcome {
        status: if timed_out {
            SolveStatus::Timeout
        } else {
            SolveStatus::Feasible
        },
        vehicles: routes.len(),
        plans,
        diagnostic: None,
    })
}

/// Optimal (or near-optimal) visiting order for a single-route matrix.
///
/// The matrix covers the depot at index 0 plus `k` customers. Up to
/// [`TSP_EXHAUSTIVE_MAX`] customers every permutation is scored; beyond
/// that, nearest-neighbor construction plus 2-opt.
pub fn solve_tsp(matrix: &TravelMatrix) -> (Vec<usize>, SolveStatus) {
    let k = matrix.dim().saturating_sub(1);
    if k == 0 {
        return (Vec::new(), SolveStatus::Optimal);
    }
    if k == 1 {
        return (vec![1], SolveStatus::Optimal);
    }

    if k <= TSP_EXHAUSTIVE_MAX {
        let mut order: Vec<usize> = (1..=k).collect();
        let mut best = (route_distance(matrix, &order), order.clone());
        permute(&mut order, k, matrix, &mut best);
        (best.1, SolveStatus::Optimal)
    } else {
        let mut order = nearest_neighbor(matrix, k);
        two_opt(&mut order, matrix);
        (order, SolveStatus::Feasible)
    }
}

/// Sequence a manual route group and price it against the constraints.
pub fn plan_route_group(
    route_id: String,
    day: String,
    customer_ids: &[String],
    matrix: &TravelMatrix,
    constraints: &RouteConstraints,
) -> Result<(RoutePlan, SolveStatus)> {
    if matrix.dim() != customer_ids.len() + 1 {
        return Err(Error::Internal(
            "route group matrix misaligned with customer list".to_string(),
        ));
    }
    let (order, status) = solve_tsp(matrix);
    let input = VrpInput {
        zone_id: "",
        customer_ids,
        matrix,
        constraints,
        working_days: &[],
        seed: 0,
    };
    let plan = build_plan(route_id, day, &order, &input);
    Ok((plan, status))
}

fn route_id(zone_id: &str, ordinal: usize) -> String {
    format!("{}_R{:02}", zone_id, ordinal)
}

fn infeasible_outcome(vehicles: usize, diagnostic: String) -> SolveOutcome {
    SolveOutcome {
        status: SolveStatus::Infeasible,
        vehicles,
        plans: Vec::new(),
        diagnostic: Some(diagnostic),
    }
}

/// Total route distance: depot, customers in order, back to depot.
fn route_distance(matrix: &TravelMatrix, route: &[usize]) -> f64 {
    let mut total = 0.0;
    let mut prev = 0;
    for &stop in route {
        total += matrix.distances_km[prev][stop];
        prev = stop;
    }
    total + matrix.distances_km[prev][0]
}

fn route_duration(matrix: &TravelMatrix, route: &[usize]) -> f64 {
    let mut total = 0.0;
    let mut prev = 0;
    for &stop in route {
        total += matrix.durations_min[prev][stop];
        prev = stop;
    }
    total + matrix.durations_min[prev][0]
}

fn within_hard_limits(matrix: &TravelMatrix, route: &[usize], constraints: &RouteConstraints) -> bool {
    route_duration(matrix, route) <= constraints.max_route_duration_minutes
        && route_distance(matrix, route) <= constraints.max_distance_per_route_km
}

/// Describe how far past the hard limits a route lands, if at all.
fn hard_violation(
    matrix: &TravelMatrix,
    route: &[usize],
    constraints: &RouteConstraints,
) -> Option<String> {
    let duration = route_duration(matrix, route);
    let distance = route_distance(matrix, route);
    let mut parts = Vec::new();
    if duration > constraints.max_route_duration_minutes {
        parts.push(format!(
            "duration exceeds limit by {:.1} min",
            duration - constraints.max_route_duration_minutes
        ));
    }
    if distance > constraints.max_distance_per_route_km {
        parts.push(format!(
            "distance exceeds limit by {:.1} km",
            distance - constraints.max_distance_per_route_km
        ));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

/// Cheapest-insertion construction over a fixed vehicle count.
///
/// Customers are seeded farthest-first; each is placed at the feasible
/// position with the smallest distance increase. Exact-cost ties are broken
/// with the seeded rng so reruns reproduce.
fn construct(
    matrix: &TravelMatrix,
    n: usize,
    vehicles: usize,
    constraints: &RouteConstraints,
    rng: &mut StdRng,
) -> std::result::Result<Vec<Vec<usize>>, String> {
    let mut order: Vec<usize> = (1..=n).collect();
    order.sort_by(|&a, &b| {
        matrix.distances_km[0][b]
            .partial_cmp(&matrix.distances_km[0][a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut routes: Vec<Vec<usize>> = vec![Vec::new(); vehicles];

    for &customer in &order {
        let mut best: Option<(usize, usize, f64)> = None;
        let mut ties = 0u32;
        let mut best_overage = f64::MAX;
        let mut best_overage_desc = String::new();

        for (route_idx, route) in routes.iter().enumerate() {
            if route.len() >= constraints.max_customers_per_route {
                continue;
            }
            let base = route_distance(matrix, route);
            for position in 0..=route.len() {
                let mut candidate = route.clone();
                candidate.insert(position, customer);

                let duration = route_duration(matrix, &candidate);
                let distance = route_distance(matrix, &candidate);
                let duration_over = duration - constraints.max_route_duration_minutes;
                let distance_over = distance - constraints.max_distance_per_route_km;

                if duration_over > 0.0 || distance_over > 0.0 {
                    let overage = duration_over.max(0.0) + distance_over.max(0.0);
                    if overage < best_overage {
                        best_overage = overage;
                        best_overage_desc = hard_violation(matrix, &candidate, constraints)
                            .unwrap_or_default();
                    }
                    continue;
                }

                let delta = distance - base;
                match best {
                    Some((_, _, best_delta)) if delta > best_delta + 1e-9 => {}
                    Some((_, _, best_delta)) if (delta - best_delta).abs() <= 1e-9 => {
                        // Reservoir-style tie break keeps a uniform choice.
                        ties += 1;
                        if rng.gen_range(0..=ties) == 0 {
                            best = Some((route_idx, position, best_delta.min(delta)));
                        }
                    }
                    _ => {
                        best = Some((route_idx, position, delta));
                        ties = 0;
                    }
                }
            }
        }

        match best {
            Some((route_idx, position, _)) => routes[route_idx].insert(position, customer),
            None => {
                return Err(if best_overage_desc.is_empty() {
                    "no route has remaining customer capacity".to_string()
                } else {
                    format!("no feasible slot for a customer: {}", best_overage_desc)
                });
            }
        }
    }

    Ok(routes)
}

/// Alternate 2-opt and relocate sweeps until a full pass yields no
/// improvement or the deadline fires. Returns true when stopped by the
/// deadline.
fn improve(
    routes: &mut [Vec<usize>],
    matrix: &TravelMatrix,
    constraints: &RouteConstraints,
    ctx: &CallContext,
) -> bool {
    loop {
        if ctx.is_cancelled() {
            return true;
        }

        let mut improved = false;
        for route in routes.iter_mut() {
            if two_opt_feasible(route, matrix, constraints) {
                improved = true;
            }
        }
        if relocate(routes, matrix, constraints) {
            improved = true;
        }

        if !improved {
            return false;
        }
    }
}

/// One first-improvement 2-opt pass keeping hard limits intact.
fn two_opt_feasible(
    route: &mut Vec<usize>,
    matrix: &TravelMatrix,
    constraints: &RouteConstraints,
) -> bool {
    if route.len() < 3 {
        return false;
    }
    let current = route_distance(matrix, route);
    let n = route.len();

    for i in 0..n - 1 {
        for j in i + 1..n {
            let mut candidate = route.clone();
            candidate[i..=j].reverse();
            if route_distance(matrix, &candidate) < current - 1e-9
                && within_hard_limits(matrix, &candidate, constraints)
            {
                *route = candidate;
                return true;
            }
        }
    }
    false
}

/// Pure 2-opt for single-route sequencing (no cross-route limits involved).
fn two_opt(route: &mut Vec<usize>, matrix: &TravelMatrix) {
    let mut improved = true;
    while improved {
        improved = false;
        let current = route_distance(matrix, route);
        let n = route.len();
        'scan: for i in 0..n - 1 {
            for j in i + 1..n {
                let mut candidate = route.clone();
                candidate[i..=j].reverse();
                if route_distance(matrix, &candidate) < current - 1e-9 {
                    *route = candidate;
                    improved = true;
                    break 'scan;
                }
            }
        }
    }
}

/// Move one customer between routes when that lowers total distance and
/// keeps every touched route inside the hard limits.
fn relocate(
    routes: &mut [Vec<usize>],
    matrix: &TravelMatrix,
    constraints: &RouteConstraints,
) -> bool {
    let total: f64 = routes.iter().map(|r| route_distance(matrix, r)).sum();

    for from_idx in 0..routes.len() {
        for slot in 0..routes[from_idx].len() {
            let customer = routes[from_idx][slot];
            let mut from_candidate = routes[from_idx].clone();
            from_candidate.remove(slot);

            for to_idx in 0..routes.len() {
                if to_idx == from_idx {
                    continue;
                }
                if routes[to_idx].len() >= constraints.max_customers_per_route {
                    continue;
                }
                for position in 0..=routes[to_idx].len() {
                    let mut to_candidate = routes[to_idx].clone();
                    to_candidate.insert(position, customer);

                    if !within_hard_limits(matrix, &to_candidate, constraints) {
                        continue;
                    }

                    let others: f64 = routes
                        .iter()
                        .enumerate()
                        .filter(|(idx, _)| *idx != from_idx && *idx != to_idx)
                        .map(|(_, r)| route_distance(matrix, r))
                        .sum();
                    let candidate_total = others
                        + route_distance(matrix, &from_candidate)
                        + route_distance(matrix, &to_candidate);

                    if candidate_total < total - 1e-9 {
                        routes[from_idx] = from_candidate;
                        routes[to_idx] = to_candidate;
                        return true;
                    }
                }
            }
        }
    }
    false
}

fn nearest_neighbor(matrix: &TravelMatrix, k: usize) -> Vec<usize> {
    let mut remaining: Vec<usize> = (1..=k).collect();
    let mut order = Vec::with_capacity(k);
    let mut prev = 0;

    while let Some((slot, &next)) = remaining.iter().enumerate().min_by(|&(_, &a), &(_, &b)| {
        matrix.distances_km[prev][a]
            .partial_cmp(&matrix.distances_km[prev][b])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    }) {
        order.push(next);
        remaining.remove(slot);
        prev = next;
    }
    order
}

fn permute(
    order: &mut Vec<usize>,
    k: usize,
    matrix: &TravelMatrix,
    best: &mut (f64, Vec<usize>),
) {
    if k == 1 {
        let cost = route_distance(matrix, order);
        if cost < best.0 {
            *best = (cost, order.clone());
        }
        return;
    }
    for i in 0..k {
        permute(order, k - 1, matrix, best);
        if k % 2 == 0 {
            order.swap(i, k - 1);
        } else {
            order.swap(0, k - 1);
        }
    }
}

fn build_plan(route_id: String, day: String, route: &[usize], input: &VrpInput<'_>) -> RoutePlan {
    let matrix = input.matrix;
    let mut stops = Vec::with_capacity(route.len());
    let mut arrival = 0.0;
    let mut distance = 0.0;
    let mut prev = 0;

    for (slot, &stop) in route.iter().enumerate() {
        let leg_km = matrix.distances_km[prev][stop];
        arrival += matrix.durations_min[prev][stop];
        distance += leg_km;
        stops.push(Stop {
            customer_id: input.customer_ids[stop - 1].clone(),
            sequence: slot + 1,
            arrival_min: arrival,
            distance_from_prev_km: leg_km,
        });
        prev = stop;
    }

    let total_distance_km = distance + matrix.distances_km[prev][0];
    let total_duration_minutes = arrival + matrix.durations_min[prev][0];

    let mut constraint_violations = BTreeMap::new();
    if input.constraints.min_customers_per_route > 0
        && route.len() < input.constraints.min_customers_per_route
    {
        constraint_violations.insert(
            "min_customers".to_string(),
            (input.constraints.min_customers_per_route - route.len()) as f64,
        );
    }
    if let Some(target) = input.constraints.soft_distance_target_km {
        if total_distance_km >= target {
            constraint_violations.insert("distance_km".to_string(), total_distance_km - target);
        }
    }

    RoutePlan {
        route_id,
        day,
        stops,
        total_distance_km,
        total_duration_minutes,
        constraint_violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Matrix over points on a line at the given km marks; index 0 is the
    /// depot at 0 km. Durations assume 60 km/h so minutes == km.
    fn line_matrix(marks: &[f64]) -> TravelMatrix {
        let n = marks.len();
        let mut distances = vec![vec![0.0; n]; n];
        let mut durations = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..n {
                distances[i][j] = (marks[i] - marks[j]).abs();
                durations[i][j] = distances[i][j];
            }
        }
        TravelMatrix {
            distances_km: distances,
            durations_min: durations,
            degraded: false,
            distance_estimated: false,
        }
    }

    #[test]
    fn tsp_exhaustive_unscrambles_a_line() {
        let matrix = line_matrix(&[0.0, 30.0, 10.0, 20.0]);
        let (order, status) = solve_tsp(&matrix);
        // Visiting in mark order is optimal: 0 -> 10 -> 20 -> 30 -> 0.
        assert_eq!(order, vec![2, 3, 1]);
        assert_eq!(status, SolveStatus::Optimal);
    }

    #[test]
    fn tsp_large_instance_is_sane() {
        let marks: Vec<f64> = (0..=12).map(|i| (((i * 7) % 13) * 5) as f64).collect();
        let matrix = line_matrix(&marks);
        let (order, status) = solve_tsp(&matrix);
        assert_eq!(status, SolveStatus::Feasible);
        assert_eq!(order.len(), 12);
        // Line TSP optimum is out-and-back: twice the farthest mark.
        let optimal = 2.0 * marks.iter().cloned().fold(0.0, f64::max);
        let got = route_distance(&matrix, &order);
        assert!(got <= optimal * 1.3, "2-opt left {} vs optimal {}", got, optimal);
    }

    #[test]
    fn route_totals_include_return_leg() {
        let matrix = line_matrix(&[0.0, 10.0]);
        assert!((route_distance(&matrix, &[1]) - 20.0).abs() < 1e-9);
        assert!((route_duration(&matrix, &[1]) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn nearest_neighbor_walks_the_line() {
        let matrix = line_matrix(&[0.0, 30.0, 10.0, 20.0]);
        assert_eq!(nearest_neighbor(&matrix, 3), vec![2, 3, 1]);
    }
}
