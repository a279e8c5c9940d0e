//! Environment-derived configuration surface.

use std::env;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Default dispatch days: Sunday through Friday, Saturday rests.
pub const DEFAULT_WORKING_DAYS: [&str; 6] = ["SUN", "MON", "TUE", "WED", "THU", "FRI"];

/// Fixed default seed so clustering and solver tie-breaks reproduce
/// run-to-run unless the caller supplies their own.
pub const DEFAULT_SEED: u64 = 42;

const ALL_DAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

#[derive(Debug, Clone)]
pub struct Config {
    /// Root for inputs and the `outputs/` run directory.
    pub data_root: PathBuf,
    pub customer_file: PathBuf,
    pub depot_file: PathBuf,
    /// Base URL of the external matrix service; `None` selects the
    /// haversine fallback provider.
    pub matrix_base_url: Option<String>,
    pub matrix_profile: String,
    pub matrix_max_retries: u32,
    pub matrix_backoff_seconds: f64,
    pub matrix_timeout_seconds: u64,
    pub matrix_chunk_size: usize,
    pub matrix_concurrency: usize,
    /// Ordered dispatch-day labels used for round-robin route labeling.
    pub working_days: Vec<String>,
    pub solver_time_limit_seconds: u64,
    pub balance_tolerance: f64,
}

impl Default for Config {
    fn default() -> Self {
        let data_root = PathBuf::from("data");
        Self {
            customer_file: data_root.join("customers.csv"),
            depot_file: data_root.join("depots.csv"),
            data_root,
            matrix_base_url: None,
            matrix_profile: "driving".to_string(),
            matrix_max_retries: 3,
            matrix_backoff_seconds: 1.0,
            matrix_timeout_seconds: 10,
            matrix_chunk_size: 80,
            matrix_concurrency: 4,
            working_days: DEFAULT_WORKING_DAYS.iter().map(|d| d.to_string()).collect(),
            solver_time_limit_seconds: 30,
            balance_tolerance: 0.20,
        }
    }
}

impl Config {
    /// Build a config from the process environment, falling back to defaults
    /// for every unset key.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(root) = env::var("DATA_ROOT") {
            config.data_root = PathBuf::from(&root);
            config.customer_file = config.data_root.join("customers.csv");
            config.depot_file = config.data_root.join("depots.csv");
        }
        if let Ok(path) = env::var("CUSTOMER_FILE") {
            config.customer_file = PathBuf::from(path);
        }
        if let Ok(path) = env::var("DEPOT_FILE") {
            config.depot_file = PathBuf::from(path);
        }
        if let Ok(url) = env::var("MATRIX_BASE_URL") {
            if !url.trim().is_empty() {
                config.matrix_base_url = Some(url.trim_end_matches('/').to_string());
            }
        }
        if let Ok(profile) = env::var("MATRIX_PROFILE") {
            config.matrix_profile = profile;
        }
        if let Ok(raw) = env::var("MATRIX_MAX_RETRIES") {
            config.matrix_max_retries = parse_key("MATRIX_MAX_RETRIES", &raw)?;
        }
        if let Ok(raw) = env::var("MATRIX_BACKOFF_SECONDS") {
            config.matrix_backoff_seconds = parse_key("MATRIX_BACKOFF_SECONDS", &raw)?;
        }
        if let Ok(raw) = env::var("WORKING_DAYS") {
            config.working_days = parse_working_days(&raw)?;
        }
        if let Ok(raw) = env::var("SOLVER_TIME_LIMIT_SECONDS") {
            config.solver_time_limit_seconds = parse_key("SOLVER_TIME_LIMIT_SECONDS", &raw)?;
        }
        if let Ok(raw) = env::var("BALANCE_TOLERANCE_DEFAULT") {
            config.balance_tolerance = parse_key("BALANCE_TOLERANCE_DEFAULT", &raw)?;
        }

        Ok(config)
    }
}

fn parse_key<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("{} has unparsable value {:?}", key, raw)))
}

/// Parse a comma-separated day list, e.g. `SUN,MON,TUE,WED,THU`.
///
/// Unknown tokens are an error rather than silently dropped.
pub fn parse_working_days(raw: &str) -> Result<Vec<String>> {
    let days: Vec<String> = raw
        .split(',')
        .map(|token| token.trim().to_ascii_uppercase())
        .filter(|token| !token.is_empty())
        .collect();

    if days.is_empty() {
        return Err(Error::InvalidInput("WORKING_DAYS is empty".to_string()));
    }
    for day in &days {
        if !ALL_DAYS.contains(&day.as_str()) {
            return Err(Error::InvalidInput(format!(
                "unknown working day {:?} (expected one of {:?})",
                day, ALL_DAYS
            )));
        }
    }
    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_working_days_exclude_saturday() {
        let config = Config::default();
        assert_eq!(config.working_days.len(), 6);
        assert!(!config.working_days.contains(&"SAT".to_string()));
        assert_eq!(config.working_days[0], "SUN");
    }

    #[test]
    fn parses_day_list() {
        let days = parse_working_days("sun, mon,TUE").unwrap();
        assert_eq!(days, vec!["SUN", "MON", "TUE"]);
    }

    #[test]
    fn rejects_unknown_day() {
        assert!(parse_working_days("SUN,FUNDAY").is_err());
    }
}
