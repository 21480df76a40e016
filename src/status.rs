//! Debug status file: what the watcher did last, for the API and for humans.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::model::{CheckOutcome, CycleReport, DateFailure};

pub const STATUS_FILE: &str = "debug-status.json";

/// Reported interval when no status has been written yet.
const DEFAULT_CHECK_INTERVAL_MS: u64 = 30_000;

/// A watcher counts as running if it checked within this many intervals.
const RUNNING_INTERVALS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugStatus {
    pub is_running: bool,
    pub last_check: Option<DateTime<Utc>>,
    /// Milliseconds.
    pub check_interval: u64,
    pub next_check: Option<DateTime<Utc>>,
    pub alerts: AlertCounts,
    pub last_results: Option<LastResults>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertCounts {
    pub total: usize,
    pub active: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastResults {
    pub timestamp: DateTime<Utc>,
    pub website: WebsiteStatus,
    pub api: ApiStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteStatus {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub success: bool,
    pub condition_met: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStatus {
    pub enabled: bool,
    pub success: bool,
    pub condition_met: bool,
    pub slots_found: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_dates: Vec<DateFailure>,
}

impl Default for DebugStatus {
    fn default() -> Self {
        Self {
            is_running: false,
            last_check: None,
            check_interval: DEFAULT_CHECK_INTERVAL_MS,
            next_check: None,
            alerts: AlertCounts::default(),
            last_results: None,
        }
    }
}

impl LastResults {
    pub fn from_report(report: &CycleReport) -> Self {
        let mut website = WebsiteStatus::default();
        let mut api = ApiStatus::default();
        for outcome in &report.outcomes {
            match outcome {
                CheckOutcome::Website { url, result } => {
                    website = WebsiteStatus {
                        enabled: true,
                        url: Some(url.clone()),
                        success: result.is_success(),
                        condition_met: result.condition_met,
                        message: result.message.clone(),
                        error: result.error.clone(),
                    };
                }
                CheckOutcome::Availability {
                    result,
                    slots_found,
                    failed_dates,
                } => {
                    api = ApiStatus {
                        enabled: true,
                        success: result.is_success(),
                        condition_met: result.condition_met,
                        slots_found: *slots_found,
                        message: result.message.clone(),
                        error: result.error.clone(),
                        failed_dates: failed_dates.clone(),
                    };
                }
            }
        }
        Self {
            timestamp: report.finished_at,
            website,
            api,
        }
    }
}

impl DebugStatus {
    /// Re-derive liveness as seen at `now`: a watcher that has not checked in
    /// three intervals is reported stopped, and `nextCheck` follows the last check.
    pub fn refresh(&mut self, now: DateTime<Utc>, alerts: AlertCounts) {
        self.alerts = alerts;
        let Some(last) = self.last_check else {
            self.is_running = false;
            return;
        };
        let Some(interval) = i64::try_from(self.check_interval)
            .ok()
            .and_then(chrono::Duration::try_milliseconds)
        else {
            self.is_running = false;
            return;
        };
        let stale_after = interval.checked_mul(RUNNING_INTERVALS as i32);
        self.is_running = self.is_running && stale_after.is_some_and(|s| now - last < s);
        if self.is_running {
            self.next_check = last.checked_add_signed(interval);
        }
    }
}

/// Read a status file. Missing or unreadable files yield the default status.
pub async fn load_status(path: &Path) -> DebugStatus {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::debug!(path = %path.display(), "status file unreadable: {e}");
            DebugStatus::default()
        }),
        Err(_) => DebugStatus::default(),
    }
}

/// Receives cycle milestones. Failures are the reporter's problem: none of
/// these calls can fail the cycle.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn record_cycle_start(&self, interval: Duration, total: usize, active: usize);
    async fn record_cycle_result(&self, report: &CycleReport);
    async fn mark_stopped(&self);
}

/// Keeps the current status in memory and rewrites the file after every change.
pub struct FileStatusReporter {
    path: PathBuf,
    state: Mutex<DebugStatus>,
}

impl FileStatusReporter {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(STATUS_FILE),
            state: Mutex::new(DebugStatus::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn current(&self) -> DebugStatus {
        self.state.lock().await.clone()
    }

    async fn write(&self, status: &DebugStatus) {
        let result = async {
            if let Some(dir) = self.path.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }
            let json = serde_json::to_vec_pretty(status).map_err(std::io::Error::other)?;
            tokio::fs::write(&self.path, json).await
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), "failed to write status: {e}");
        }
    }
}

#[async_trait]
impl StatusReporter for FileStatusReporter {
    async fn record_cycle_start(&self, interval: Duration, total: usize, active: usize) {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        state.is_running = true;
        state.last_check = Some(now);
        state.check_interval = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        state.next_check = chrono::Duration::from_std(interval)
            .ok()
            .and_then(|d| now.checked_add_signed(d));
        state.alerts = AlertCounts { total, active };
        self.write(&state).await;
    }

    async fn record_cycle_result(&self, report: &CycleReport) {
        let mut state = self.state.lock().await;
        state.last_results = Some(LastResults::from_report(report));
        self.write(&state).await;
    }

    async fn mark_stopped(&self) {
        let mut state = self.state.lock().await;
        state.is_running = false;
        self.write(&state).await;
    }
}
