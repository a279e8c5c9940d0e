//! Orchestrator: the transport-agnostic operation surface.
//!
//! Owns the process-wide collaborators (dataset handle, matrix provider,
//! run store) and exposes `generate_zones`, `optimize_routes`,
//! `probe_matrix`, `list_runs`, and `fetch_export`. Calls take `&self`,
//! touch no shared mutable state, and may run concurrently from any number
//! of threads; each call carries its own deadline context.

use std::collections::BTreeSet;
use std::fs::File;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::balance::balance_zones;
use crate::config::{Config, DEFAULT_SEED};
use crate::context::CallContext;
use crate::dataset::{Customer, DatasetHandle, DatasetSnapshot, city3, normalize_city};
use crate::error::{Error, Result};
use crate::matrix::{TravelMatrixProvider, provider_for};
use crate::runstore::{RunFilter, RunManifest, RunStore};
use crate::solver::{
    RouteConstraints, RoutePlan, SolveStatus, VrpInput, plan_route_group, solve_vrp,
};
use crate::zoning::manual::ManualPolygon;
use crate::zoning::{ZoningMethod, ZoningOutcome, cluster, isochrone, manual, polar};

#[derive(Debug, Clone)]
pub struct ZoneRequest {
    pub city: String,
    pub method: ZoningMethod,
    pub target_zones: usize,
    pub rotation_offset_deg: f64,
    pub thresholds_min: Vec<f64>,
    pub max_customers_per_zone: Option<usize>,
    pub polygons: Vec<ManualPolygon>,
    pub balance: bool,
    pub balance_tolerance: Option<f64>,
    pub seed: Option<u64>,
    pub time_budget: Option<Duration>,
    pub persist: bool,
}

impl ZoneRequest {
    pub fn new(city: impl Into<String>, method: ZoningMethod) -> Self {
        Self {
            city: city.into(),
            method,
            target_zones: 4,
            rotation_offset_deg: 0.0,
            thresholds_min: vec![15.0, 30.0, 60.0],
            max_customers_per_zone: None,
            polygons: Vec::new(),
            balance: false,
            balance_tolerance: None,
            seed: None,
            time_budget: None,
            persist: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ZoneResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub city: String,
    pub method: ZoningMethod,
    #[serde(flatten)]
    pub outcome: ZoningOutcome,
}

#[derive(Debug, Clone)]
pub struct RouteAssignment {
    pub route_id: String,
    pub day: String,
    pub customer_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub city: String,
    pub zone_id: Option<String>,
    /// Explicit customer selection; empty means "the whole zone".
    pub customer_ids: Vec<String>,
    pub constraints: RouteConstraints,
    /// Non-empty selects manual mode: each group is sequenced as a TSP.
    pub route_assignments: Vec<RouteAssignment>,
    /// Overrides the configured dispatch-day rotation for this call.
    pub working_days: Option<Vec<String>>,
    pub persist: bool,
    pub time_budget: Option<Duration>,
    pub seed: Option<u64>,
}

impl RouteRequest {
    pub fn new(city: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            zone_id: None,
            customer_ids: Vec::new(),
            constraints: RouteConstraints::default(),
            route_assignments: Vec::new(),
            working_days: None,
            persist: true,
            time_budget: None,
            seed: None,
        }
    }
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteMetadata {
    pub status: SolveStatus,
    pub vehicles: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    /// True when estimated travel costs stood in for the road network.
    #[serde(skip_serializing_if = "is_false")]
    pub fallback: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub zone_id: String,
    pub metadata: RouteMetadata,
    pub plans: Vec<RoutePlan>,
}

pub struct Planner {
    config: Config,
    dataset: DatasetHandle,
    matrix: Arc<dyn TravelMatrixProvider>,
    store: RunStore,
}

impl Planner {
    /// Build a planner from config: loads the dataset and selects the
    /// matrix provider.
    pub fn new(config: Config) -> Result<Self> {
        let snapshot = DatasetSnapshot::load(&config.customer_file, &config.depot_file)?;
        let matrix = provider_for(&config)?;
        Ok(Self::with_parts(config, snapshot, matrix))
    }

    pub fn from_env() -> Result<Self> {
        Self::new(Config::from_env()?)
    }

    /// Assemble a planner from pre-built collaborators.
    pub fn with_parts(
        config: Config,
        snapshot: DatasetSnapshot,
        matrix: Arc<dyn TravelMatrixProvider>,
    ) -> Self {
        let store = RunStore::new(&config.data_root);
        Self {
            config,
            dataset: DatasetHandle::new(snapshot),
            matrix,
            store,
        }
    }

    pub fn dataset(&self) -> &DatasetHandle {
        &self.dataset
    }

    pub fn generate_zones(&self, request: &ZoneRequest) -> Result<ZoneResponse> {
        let city = normalize_city(&request.city);
        let snapshot = self.dataset.snapshot();
        let depot = snapshot
            .depot_for_city(&city)
            .ok_or_else(|| Error::InvalidInput(format!("unknown city {:?}", city)))?;
        let customers = snapshot.customers_in_city(&city);
        if customers.is_empty() {
            return Err(Error::NotFound(format!("no customers in city {:?}", city)));
        }

        let ctx = match request.time_budget {
            Some(budget) => CallContext::with_timeout(budget),
            None => CallContext::unbounded(),
        };
        let seed = request.seed.unwrap_or(DEFAULT_SEED);

        let mut outcome = match request.method {
            ZoningMethod::Polar => polar::partition(
                &customers,
                depot,
                &polar::PolarOptions {
                    target_zones: request.target_zones,
                    rotation_offset_deg: request.rotation_offset_deg,
                },
            )?,
            ZoningMethod::Isochrone => {
                let mut points = Vec::with_capacity(customers.len() + 1);
                points.push(depot.coords());
                points.extend(customers.iter().map(|c| c.coords()));
                let matrix = self.matrix.matrix(&points, &ctx)?;
                let minutes = matrix.depot_row_minutes();
                let mut outcome = isochrone::partition(
                    &customers,
                    depot,
                    &minutes,
                    &isochrone::IsochroneOptions {
                        thresholds_min: request.thresholds_min.clone(),
                    },
                )?;
                if matrix.degraded {
                    outcome.metadata.degraded_matrix = Some(true);
                }
                outcome
            }
            ZoningMethod::Clustering => cluster::partition(
                &customers,
                depot,
                &cluster::ClusterOptions {
                    target_zones: request.target_zones,
                    max_customers_per_zone: request.max_customers_per_zone,
                    seed,
                    ..cluster::ClusterOptions::default()
                },
            )?,
            ZoningMethod::Manual => manual::partition(&customers, &request.polygons)?,
        };

        if request.balance {
            let tolerance = request
                .balance_tolerance
                .unwrap_or(self.config.balance_tolerance);
            let report = balance_zones(&mut outcome, &customers, depot, tolerance);
            outcome.metadata.balance = Some(report);
        }

        let mut response = ZoneResponse {
            run_id: None,
            city: city.clone(),
            method: request.method,
            outcome,
        };

        if request.persist && !ctx.is_cancelled() {
            let summary = serde_json::to_value(&response)?;
            let (header, rows) = zoning_rows(&response.outcome, &customers);
            let run_id = self.store.write_run("zones", &summary, &header, &rows)?;
            info!(run = %run_id, city = %city, method = request.method.as_str(), "zoning run complete");
            response.run_id = Some(run_id);
        }

        Ok(response)
    }

    pub fn optimize_routes(&self, request: &RouteRequest) -> Result<RouteResponse> {
        let city = normalize_city(&request.city);
        let snapshot = self.dataset.snapshot();
        let depot = snapshot
            .depot_for_city(&city)
            .ok_or_else(|| Error::InvalidInput(format!("unknown city {:?}", city)))?;
        request.constraints.validate()?;

        let ctx = CallContext::with_timeout(
            request
                .time_budget
                .unwrap_or(Duration::from_secs(self.config.solver_time_limit_seconds)),
        );
        let zone_label = request
            .zone_id
            .clone()
            .unwrap_or_else(|| city3(&city));

        let (status, vehicles, diagnostic, plans, fallback) = if request.route_assignments.is_empty()
        {
            self.solve_automatic(&snapshot, &city, depot, request, &zone_label, &ctx)?
        } else {
            self.solve_manual(&snapshot, depot, request, &ctx)?
        };

        let mut response = RouteResponse {
            run_id: None,
            zone_id: zone_label,
            metadata: RouteMetadata {
                status,
                vehicles,
                diagnostic,
                fallback,
            },
            plans,
        };

        let persistable = match response.metadata.status {
            SolveStatus::Infeasible => false,
            SolveStatus::Timeout => !response.plans.is_empty(),
            SolveStatus::Optimal | SolveStatus::Feasible => true,
        };
        if request.persist && persistable {
            let summary = serde_json::to_value(&response)?;
            let (header, rows) = routing_rows(&response.plans);
            let run_id = self.store.write_run("routes", &summary, &header, &rows)?;
            info!(run = %run_id, zone = %response.zone_id, status = response.metadata.status.as_str(), "routing run complete");
            response.run_id = Some(run_id);
        }

        Ok(response)
    }

    fn solve_automatic(
        &self,
        snapshot: &DatasetSnapshot,
        city: &str,
        depot: &crate::dataset::Depot,
        request: &RouteRequest,
        zone_label: &str,
        ctx: &CallContext,
    ) -> Result<(SolveStatus, usize, Option<String>, Vec<RoutePlan>, bool)> {
        let customers = self.select_customers(snapshot, city, request)?;

        let mut points = Vec::with_capacity(customers.len() + 1);
        points.push(depot.coords());
        points.extend(customers.iter().map(|c| c.coords()));
        let matrix = self.matrix.matrix(&points, ctx)?;

        let working_days = match &request.working_days {
            Some(days) => crate::config::parse_working_days(&days.join(","))?,
            None => self.config.working_days.clone(),
        };
        let customer_ids: Vec<String> = customers.iter().map(|c| c.id.clone()).collect();
        let outcome = solve_vrp(
            &VrpInput {
                zone_id: zone_label,
                customer_ids: &customer_ids,
                matrix: &matrix,
                constraints: &request.constraints,
                working_days: &working_days,
                seed: request.seed.unwrap_or(DEFAULT_SEED),
            },
            ctx,
        )?;

        Ok((
            outcome.status,
            outcome.vehicles,
            outcome.diagnostic,
            outcome.plans,
            matrix.degraded,
        ))
    }

    fn solve_manual(
        &self,
        snapshot: &DatasetSnapshot,
        depot: &crate::dataset::Depot,
        request: &RouteRequest,
        ctx: &CallContext,
    ) -> Result<(SolveStatus, usize, Option<String>, Vec<RoutePlan>, bool)> {
        let mut plans = Vec::with_capacity(request.route_assignments.len());
        let mut all_optimal = true;
        let mut fallback = false;

        for group in &request.route_assignments {
            if group.customer_ids.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "route {} has no customers",
                    group.route_id
                )));
            }
            let members: Vec<&Customer> = group
                .customer_ids
                .iter()
                .map(|id| {
                    snapshot
                        .customer_by_id(id)
                        .ok_or_else(|| Error::NotFound(format!("unknown customer {:?}", id)))
                })
                .collect::<Result<_>>()?;

            let mut points = Vec::with_capacity(members.len() + 1);
            points.push(depot.coords());
            points.extend(members.iter().map(|c| c.coords()));
            let matrix = self.matrix.matrix(&points, ctx)?;
            fallback |= matrix.degraded;

            let (plan, status) = plan_route_group(
                group.route_id.clone(),
                group.day.clone(),
                &group.customer_ids,
                &matrix,
                &request.constraints,
            )?;
            all_optimal &= status == SolveStatus::Optimal;
            plans.push(plan);
        }

        let status = if all_optimal {
            SolveStatus::Optimal
        } else {
            SolveStatus::Feasible
        };
        Ok((status, plans.len(), None, plans, fallback))
    }

    fn select_customers<'a>(
        &self,
        snapshot: &'a DatasetSnapshot,
        city: &str,
        request: &RouteRequest,
    ) -> Result<Vec<&'a Customer>> {
        if !request.customer_ids.is_empty() {
            return request
                .customer_ids
                .iter()
                .map(|id| {
                    snapshot
                        .customer_by_id(id)
                        .ok_or_else(|| Error::NotFound(format!("unknown customer {:?}", id)))
                })
                .collect();
        }

        let customers = match &request.zone_id {
            Some(zone) => {
                let in_zone = snapshot.customers_in_zone(city, zone);
                if in_zone.is_empty() {
                    return Err(Error::NotFound(format!(
                        "no customers in zone {:?} of city {:?}",
                        zone, city
                    )));
                }
                in_zone
            }
            None => snapshot.customers_in_city(city),
        };
        if customers.is_empty() {
            return Err(Error::NotFound(format!("no customers in city {:?}", city)));
        }
        Ok(customers)
    }

    pub fn probe_matrix(&self) -> bool {
        self.matrix.probe()
    }

    pub fn list_runs(&self, filter: &RunFilter) -> Result<Vec<RunManifest>> {
        self.store.list_runs(filter)
    }

    pub fn fetch_export(&self, run_id: &str, file_name: &str) -> Result<File> {
        self.store.fetch(run_id, file_name)
    }
}

/// Per-customer assignment rows: core columns plus the sorted union of
/// filter-attribute columns, so downstream filters survive the export.
fn zoning_rows(outcome: &ZoningOutcome, customers: &[&Customer]) -> (Vec<String>, Vec<Vec<String>>) {
    let attribute_keys: BTreeSet<&str> = customers
        .iter()
        .filter(|c| outcome.assignments.contains_key(&c.id))
        .flat_map(|c| c.attributes.keys().map(String::as_str))
        .collect();

    let mut header: Vec<String> = ["customer_id", "name", "city", "zone_id", "latitude", "longitude"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.extend(attribute_keys.iter().map(|k| k.to_string()));

    let mut rows = Vec::new();
    for customer in customers {
        let Some(zone_id) = outcome.assignments.get(&customer.id) else {
            continue;
        };
        let mut row = vec![
            customer.id.clone(),
            customer.name.clone(),
            customer.city.clone(),
            zone_id.clone(),
            format!("{:.6}", customer.lat),
            format!("{:.6}", customer.lon),
        ];
        for key in &attribute_keys {
            row.push(customer.attributes.get(*key).cloned().unwrap_or_default());
        }
        rows.push(row);
    }
    (header, rows)
}

/// Per-stop rows in route order.
fn routing_rows(plans: &[RoutePlan]) -> (Vec<String>, Vec<Vec<String>>) {
    let header: Vec<String> = [
        "route_id",
        "day",
        "sequence",
        "customer_id",
        "arrival_min",
        "distance_from_prev_km",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let mut rows = Vec::new();
    for plan in plans {
        for stop in &plan.stops {
            rows.push(vec![
                plan.route_id.clone(),
                plan.day.clone(),
                stop.sequence.to_string(),
                stop.customer_id.clone(),
                format!("{:.2}", stop.arrival_min),
                format!("{:.3}", stop.distance_from_prev_km),
            ]);
        }
    }
    (header, rows)
}
