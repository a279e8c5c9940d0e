//! Run persistence: one timestamped directory per completed computation.
//!
//! Each run directory holds `summary.json` (the full response) and
//! `assignments.csv` (one row per customer for zoning, one per stop for
//! routing). Files are written to a temp name and renamed into place so
//! readers never observe partial content. Listing is lazy and tolerant:
//! unreadable run directories are skipped with a warning.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

pub const SUMMARY_FILE: &str = "summary.json";
pub const ASSIGNMENTS_FILE: &str = "assignments.csv";

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

#[derive(Debug, Clone)]
pub struct RunStore {
    outputs: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub id: String,
    pub run_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub run_type: Option<String>,
    pub city: Option<String>,
    pub zone: Option<String>,
    /// Case-insensitive substring over id, city, method, and zone.
    pub search: Option<String>,
    pub limit: Option<usize>,
}

impl RunStore {
    /// Store rooted at `<data_root>/outputs`.
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            outputs: data_root.into().join("outputs"),
        }
    }

    /// Persist one run; returns the allocated run id.
    ///
    /// Run ids are `<type>_<UTC timestamp>`; a same-second collision gets a
    /// numeric disambiguator.
    pub fn write_run(
        &self,
        run_type: &str,
        summary: &serde_json::Value,
        header: &[String],
        rows: &[Vec<String>],
    ) -> Result<String> {
        fs::create_dir_all(&self.outputs)?;

        let base = format!("{}_{}", run_type, Utc::now().format(TIMESTAMP_FORMAT));
        let (run_id, dir) = self.claim_run_dir(&base)?;

        let summary_tmp = dir.join(format!("{}.tmp", SUMMARY_FILE));
        let file = BufWriter::new(File::create(&summary_tmp)?);
        serde_json::to_writer_pretty(file, summary)?;
        fs::rename(&summary_tmp, dir.join(SUMMARY_FILE))?;

        let csv_tmp = dir.join(format!("{}.tmp", ASSIGNMENTS_FILE));
        {
            let mut writer = csv::Writer::from_writer(BufWriter::new(File::create(&csv_tmp)?));
            writer.write_record(header)?;
            for row in rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }
        fs::rename(&csv_tmp, dir.join(ASSIGNMENTS_FILE))?;

        info!(run = %run_id, rows = rows.len(), "persisted run");
        Ok(run_id)
    }

    fn claim_run_dir(&self, base: &str) -> Result<(String, PathBuf)> {
        for attempt in 0..100u32 {
            let run_id = if attempt == 0 {
                base.to_string()
            } else {
                format!("{}_{}", base, attempt + 1)
            };
            let dir = self.outputs.join(&run_id);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok((run_id, dir)),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(Error::Internal("could not allocate a unique run directory".to_string()))
    }

    /// Scan the outputs root and return manifests newest-first.
    pub fn list_runs(&self, filter: &RunFilter) -> Result<Vec<RunManifest>> {
        let entries = match fs::read_dir(&self.outputs) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut manifests = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let run_id = entry.file_name().to_string_lossy().to_string();
            match self.read_manifest(&run_id) {
                Ok(Some(manifest)) => manifests.push(manifest),
                Ok(None) => {}
                Err(err) => {
                    warn!(run = %run_id, error = %err, "skipping unreadable run directory");
                }
            }
        }

        manifests.retain(|m| {
            filter
                .run_type
                .as_deref()
                .is_none_or(|t| m.run_type.eq_ignore_ascii_case(t))
                && filter
                    .city
                    .as_deref()
                    .is_none_or(|c| m.city.as_deref().is_some_and(|mc| mc.eq_ignore_ascii_case(c)))
                && filter
                    .zone
                    .as_deref()
                    .is_none_or(|z| m.zone.as_deref().is_some_and(|mz| mz.eq_ignore_ascii_case(z)))
                && filter.search.as_deref().is_none_or(|needle| {
                    let needle = needle.to_ascii_lowercase();
                    [
                        Some(m.id.as_str()),
                        m.city.as_deref(),
                        m.method.as_deref(),
                        m.zone.as_deref(),
                    ]
                    .into_iter()
                    .flatten()
                    .any(|hay| hay.to_ascii_lowercase().contains(&needle))
                })
        });

        // Run ids sort chronologically: type prefix, then UTC timestamp.
        manifests.sort_by(|a, b| b.id.cmp(&a.id));
        if let Some(limit) = filter.limit {
            manifests.truncate(limit);
        }
        Ok(manifests)
    }

    fn read_manifest(&self, run_id: &str) -> Result<Option<RunManifest>> {
        let Some((run_type, timestamp)) = split_run_id(run_id) else {
            // Not a run directory; leave it alone silently.
            return Ok(None);
        };

        let created_at = chrono::NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
            .map_err(|err| Error::Internal(format!("bad run timestamp: {}", err)))?
            .and_utc()
            .to_rfc3339();

        let file = File::open(self.outputs.join(run_id).join(SUMMARY_FILE))?;
        let summary: serde_json::Value = serde_json::from_reader(io::BufReader::new(file))?;

        let str_field = |key: &str| {
            summary
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        Ok(Some(RunManifest {
            id: run_id.to_string(),
            run_type: run_type.to_string(),
            city: str_field("city"),
            method: str_field("method"),
            zone: str_field("zone_id"),
            zone_count: summary
                .get("counts")
                .and_then(|v| v.as_array())
                .map(|a| a.len()),
            route_count: summary
                .get("plans")
                .and_then(|v| v.as_array())
                .map(|a| a.len()),
            status: summary
                .pointer("/metadata/status")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            created_at,
        }))
    }

    /// Open one file of a run for streaming.
    ///
    /// Both components are validated so a crafted name cannot escape the
    /// run directory.
    pub fn fetch(&self, run_id: &str, file_name: &str) -> Result<File> {
        validate_component(run_id)?;
        validate_component(file_name)?;

        let path = self.outputs.join(run_id).join(file_name);
        match File::open(&path) {
            Ok(file) => Ok(file),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(Error::NotFound(format!(
                "run {} has no file {}",
                run_id, file_name
            ))),
            Err(err) => Err(err.into()),
        }
    }
}

/// Split `<type>_<timestamp>[_<n>]` into type and timestamp.
fn split_run_id(run_id: &str) -> Option<(&str, &str)> {
    let (run_type, rest) = run_id.split_once('_')?;
    if !matches!(run_type, "zones" | "routes") {
        return None;
    }
    let timestamp = rest.split('_').next().unwrap_or(rest);
    Some((run_type, timestamp))
}

fn validate_component(component: &str) -> Result<()> {
    let ok = !component.is_empty()
        && !component.contains("..")
        && component
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        && !component.starts_with('.');
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "illegal path component {:?}",
            component
        )))
    }
}
