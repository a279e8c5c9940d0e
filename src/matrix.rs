//! Road-network distance/time matrices.
//!
//! The engine always works with a [`TravelMatrix`] pair: distances in
//! kilometers, durations in minutes, indexed by the caller's point order
//! (first point conventionally the depot). Matrices come from an external
//! table service when one is configured and from great-circle estimation
//! otherwise; a service failure degrades to estimation per block rather than
//! failing the whole computation.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rayon::prelude::*;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::context::CallContext;
use crate::error::{Error, Result};
use crate::geo::haversine_km;

/// Assumed average driving speed for estimated durations.
pub const FALLBACK_SPEED_KMH: f64 = 40.0;

/// Pairwise travel costs for an ordered point set.
#[derive(Debug, Clone)]
pub struct TravelMatrix {
    pub distances_km: Vec<Vec<f64>>,
    pub durations_min: Vec<Vec<f64>>,
    /// True when some cells were estimated because the service failed.
    pub degraded: bool,
    /// True when the service answered durations but omitted distances,
    /// leaving distance cells to great-circle estimation.
    pub distance_estimated: bool,
}

impl TravelMatrix {
    pub fn empty() -> Self {
        Self {
            distances_km: Vec::new(),
            durations_min: Vec::new(),
            degraded: false,
            distance_estimated: false,
        }
    }

    pub fn dim(&self) -> usize {
        self.distances_km.len()
    }

    /// Travel times from the first point (the depot row), excluding itself.
    pub fn depot_row_minutes(&self) -> Vec<f64> {
        match self.durations_min.first() {
            Some(row) => row.iter().skip(1).copied().collect(),
            None => Vec::new(),
        }
    }
}

/// Provides a distance/duration matrix for a set of points.
pub trait TravelMatrixProvider: Send + Sync {
    fn matrix(&self, points: &[(f64, f64)], ctx: &CallContext) -> Result<TravelMatrix>;

    /// Cheap readiness check for the orchestrator's health surface.
    fn probe(&self) -> bool;

    /// True for providers that never touch the road network.
    fn is_fallback(&self) -> bool {
        false
    }
}

/// Great-circle matrix provider: deterministic, total, always available.
///
/// Durations assume [`FALLBACK_SPEED_KMH`], so `T = D * 1.5` minutes at the
/// default speed.
#[derive(Debug, Clone)]
pub struct HaversineMatrix {
    pub speed_kmh: f64,
}

impl Default for HaversineMatrix {
    fn default() -> Self {
        Self {
            speed_kmh: FALLBACK_SPEED_KMH,
        }
    }
}

impl HaversineMatrix {
    fn minutes(&self, km: f64) -> f64 {
        km / self.speed_kmh * 60.0
    }
}

impl TravelMatrixProvider for HaversineMatrix {
    fn matrix(&self, points: &[(f64, f64)], _ctx: &CallContext) -> Result<TravelMatrix> {
        let n = points.len();
        let mut distances = vec![vec![0.0; n]; n];
        let mut durations = vec![vec![0.0; n]; n];

        for (i, from) in points.iter().enumerate() {
            for (j, to) in points.iter().enumerate() {
                if i != j {
                    let km = haversine_km(*from, *to);
                    distances[i][j] = km;
                    durations[i][j] = self.minutes(km);
                }
            }
        }

        Ok(TravelMatrix {
            distances_km: distances,
            durations_min: durations,
            degraded: false,
            distance_estimated: false,
        })
    }

    fn probe(&self) -> bool {
        true
    }

    fn is_fallback(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct TableConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_seconds: f64,
    /// Point-set size above which requests are split into blocks.
    pub chunk_size: usize,
    /// Concurrent block requests in flight.
    pub concurrency: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "driving".to_string(),
            timeout_secs: 10,
            max_retries: 3,
            backoff_seconds: 1.0,
            chunk_size: 80,
            concurrency: 4,
        }
    }
}

/// HTTP client for an OSRM-style `table` service.
///
/// Large point sets are covered by source x destination block requests
/// stitched into the full matrix; blocks fan out on a bounded pool owned by
/// the client. Each block retries with exponential backoff on transport
/// errors and 5xx; a block that exhausts its retries is estimated instead
/// and the matrix marked degraded.
pub struct TableClient {
    config: TableConfig,
    client: reqwest::blocking::Client,
    pool: rayon::ThreadPool,
    fallback: HaversineMatrix,
}

#[derive(Debug, Deserialize)]
struct TableResponse {
    code: String,
    durations: Option<Vec<Vec<f64>>>,
    distances: Option<Vec<Vec<f64>>>,
}

struct BlockData {
    durations_min: Vec<Vec<f64>>,
    distances_km: Option<Vec<Vec<f64>>>,
}

#[derive(Debug, Clone, Copy)]
struct Block {
    src: (usize, usize),
    dst: (usize, usize),
}

impl TableClient {
    pub fn new(config: TableConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.concurrency.max(1))
            .build()
            .map_err(|err| Error::Internal(format!("matrix pool init failed: {}", err)))?;

        Ok(Self {
            config,
            client,
            pool,
            fallback: HaversineMatrix::default(),
        })
    }

    fn table_url(&self, points: &[(f64, f64)], block: Block) -> String {
        let coords = (block.src.0..block.src.1)
            .chain(block.dst.0..block.dst.1)
            .map(|i| format!("{:.6},{:.6}", points[i].1, points[i].0))
            .collect::<Vec<_>>()
            .join(";");

        let src_len = block.src.1 - block.src.0;
        let dst_len = block.dst.1 - block.dst.0;
        let sources = (0..src_len)
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(";");
        let destinations = (src_len..src_len + dst_len)
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(";");

        format!(
            "{}/table/v1/{}/{}?annotations=duration,distance&sources={}&destinations={}",
            self.config.base_url, self.config.profile, coords, sources, destinations
        )
    }

    fn fetch_once(&self, url: &str, rows: usize, cols: usize) -> std::result::Result<BlockData, (Error, bool)> {
        let response = match self.client.get(url).send() {
            Ok(response) => response,
            // Transport failure: worth retrying.
            Err(err) => return Err((err.into(), true)),
        };

        let status = response.status();
        if status.is_server_error() {
            return Err((
                Error::Unavailable(format!("table service returned {}", status)),
                true,
            ));
        }
        if !status.is_success() {
            return Err((
                Error::Unavailable(format!("table service returned {}", status)),
                false,
            ));
        }

        let body: TableResponse = match response.json() {
            Ok(body) => body,
            Err(err) => {
                return Err((
                    Error::Unavailable(format!("malformed table response: {}", err)),
                    false,
                ));
            }
        };

        if body.code != "Ok" {
            return Err((
                Error::Unavailable(format!("table service rejected request: {}", body.code)),
                false,
            ));
        }

        let durations_sec = body.durations.ok_or_else(|| {
            (
                Error::Unavailable("table response lacks durations".to_string()),
                false,
            )
        })?;
        if durations_sec.len() != rows || durations_sec.iter().any(|row| row.len() != cols) {
            return Err((
                Error::Unavailable("table response has wrong dimensions".to_string()),
                false,
            ));
        }

        let durations_min = durations_sec
            .into_iter()
            .map(|row| row.into_iter().map(|sec| sec / 60.0).collect())
            .collect();
        let distances_km = body.distances.map(|meters| {
            meters
                .into_iter()
                .map(|row| row.into_iter().map(|m| m / 1000.0).collect())
                .collect()
        });

        Ok(BlockData {
            durations_min,
            distances_km,
        })
    }

    fn fetch_block(
        &self,
        points: &[(f64, f64)],
        block: Block,
        ctx: &CallContext,
    ) -> Result<BlockData> {
        let rows = block.src.1 - block.src.0;
        let cols = block.dst.1 - block.dst.0;
        let url = self.table_url(points, block);

        let mut attempt = 0u32;
        loop {
            if ctx.is_cancelled() {
                return Err(Error::Timeout("matrix request cancelled".to_string()));
            }

            match self.fetch_once(&url, rows, cols) {
                Ok(data) => return Ok(data),
                Err((err, retryable)) => {
                    attempt += 1;
                    if !retryable || attempt >= self.config.max_retries.max(1) {
                        return Err(err);
                    }
                    let backoff =
                        self.config.backoff_seconds * f64::from(2u32.saturating_pow(attempt - 1));
                    warn!(attempt, backoff_secs = backoff, error = %err, "table block failed, retrying");
                    let mut pause = Duration::from_secs_f64(backoff.max(0.0));
                    if let Some(remaining) = ctx.remaining() {
                        pause = pause.min(remaining);
                    }
                    thread::sleep(pause);
                }
            }
        }
    }

    fn blocks(&self, n: usize) -> Vec<Block> {
        let chunk = self.config.chunk_size.max(1);
        let mut ranges = Vec::new();
        let mut start = 0;
        while start < n {
            let end = (start + chunk).min(n);
            ranges.push((start, end));
            start = end;
        }

        let mut blocks = Vec::with_capacity(ranges.len() * ranges.len());
        for &src in &ranges {
            for &dst in &ranges {
                blocks.push(Block { src, dst });
            }
        }
        blocks
    }

    fn estimate_block(&self, points: &[(f64, f64)], block: Block, distances: &mut [Vec<f64>], durations: &mut [Vec<f64>]) {
        for i in block.src.0..block.src.1 {
            for j in block.dst.0..block.dst.1 {
                if i == j {
                    continue;
                }
                let km = haversine_km(points[i], points[j]);
                distances[i][j] = km;
                durations[i][j] = self.fallback.minutes(km);
            }
        }
    }
}

impl TravelMatrixProvider for TableClient {
    fn matrix(&self, points: &[(f64, f64)], ctx: &CallContext) -> Result<TravelMatrix> {
        let n = points.len();
        if n == 0 {
            return Ok(TravelMatrix::empty());
        }

        let blocks = self.blocks(n);
        debug!(points = n, blocks = blocks.len(), "fetching travel matrix");

        let results: Vec<(Block, Result<BlockData>)> = self.pool.install(|| {
            blocks
                .par_iter()
                .map(|&block| (block, self.fetch_block(points, block, ctx)))
                .collect()
        });

        if ctx.is_cancelled() {
            return Err(Error::Timeout("matrix request cancelled".to_string()));
        }

        let mut distances = vec![vec![0.0; n]; n];
        let mut durations = vec![vec![0.0; n]; n];
        let mut degraded = false;
        let mut distance_estimated = false;

        for (block, result) in results {
            match result {
                Ok(data) => {
                    for (bi, i) in (block.src.0..block.src.1).enumerate() {
                        for (bj, j) in (block.dst.0..block.dst.1).enumerate() {
                            durations[i][j] = data.durations_min[bi][bj];
                            match &data.distances_km {
                                Some(km) => distances[i][j] = km[bi][bj],
                                None => {
                                    if i != j {
                                        distances[i][j] = haversine_km(points[i], points[j]);
                                    }
                                    distance_estimated = true;
                                }
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!(error = %err, "table block exhausted retries, estimating cells");
                    self.estimate_block(points, block, &mut distances, &mut durations);
                    degraded = true;
                }
            }
        }

        Ok(TravelMatrix {
            distances_km: distances,
            durations_min: durations,
            degraded,
            distance_estimated,
        })
    }

    fn probe(&self) -> bool {
        let url = format!("{}/health", self.config.base_url);
        self.client
            .get(url)
            .timeout(Duration::from_secs(2))
            .send()
            .map(|response| response.status().is_success())
            .unwrap_or(false)
    }
}

/// Select the provider for a config: table client when a base URL is set,
/// great-circle estimation otherwise.
pub fn provider_for(config: &Config) -> Result<Arc<dyn TravelMatrixProvider>> {
    match &config.matrix_base_url {
        Some(base_url) => {
            let table = TableClient::new(TableConfig {
                base_url: base_url.clone(),
                profile: config.matrix_profile.clone(),
                timeout_secs: config.matrix_timeout_seconds,
                max_retries: config.matrix_max_retries,
                backoff_seconds: config.matrix_backoff_seconds,
                chunk_size: config.matrix_chunk_size,
                concurrency: config.matrix_concurrency,
            })?;
            Ok(Arc::new(table))
        }
        None => Ok(Arc::new(HaversineMatrix::default())),
    }
}
