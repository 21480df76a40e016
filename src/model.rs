use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Court number as reported by the booking API.
pub type ResourceId = u32;

/// Time-of-day slot label, written `HHMM` on the wire (e.g. `1830`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotTime {
    hour: u8,
    minute: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid slot time {0:?}: expected HHMM")]
pub struct InvalidSlotTime(pub String);

impl SlotTime {
    pub const fn new(hour: u8, minute: u8) -> Self {
        debug_assert!(hour < 24 && minute < 60);
        Self { hour, minute }
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// Human readable form, `18:30`.
    pub fn clock(&self) -> String {
        format!("{:02}:{:02}", self.hour, self.minute)
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}{:02}", self.hour, self.minute)
    }
}

impl FromStr for SlotTime {
    type Err = InvalidSlotTime;

    /// Accepts `1830` and `18:30`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidSlotTime(s.to_string());
        let digits: String = s.trim().chars().filter(|c| *c != ':').collect();
        if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let hour: u8 = digits[..2].parse().map_err(|_| invalid())?;
        let minute: u8 = digits[2..].parse().map_err(|_| invalid())?;
        if hour >= 24 || minute >= 60 {
            return Err(invalid());
        }
        Ok(Self { hour, minute })
    }
}

impl TryFrom<String> for SlotTime {
    type Error = InvalidSlotTime;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SlotTime> for String {
    fn from(value: SlotTime) -> Self {
        value.to_string()
    }
}

/// One unit of bookable capacity: a court at a slot time on a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub date: NaiveDate,
    pub time: SlotTime,
    pub resource: ResourceId,
}

impl Slot {
    pub fn new(date: NaiveDate, time: SlotTime, resource: ResourceId) -> Self {
        Self { date, time, resource }
    }
}

/// A slot some alert is watching, tagged with the alert's name for messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedSlot {
    pub slot: Slot,
    pub source: String,
}

/// A slot the booking API reports as occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookedSlot {
    pub date: NaiveDate,
    pub time: SlotTime,
    pub resource: ResourceId,
}

// ── Alerts ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Ulid,
    pub name: String,
    pub date: NaiveDate,
    pub start_time: SlotTime,
    pub end_time: SlotTime,
    pub courts: Vec<ResourceId>,
    pub active: bool,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid alert: {0}")]
pub struct InvalidAlert(pub &'static str);

impl Alert {
    pub fn validate(&self) -> Result<(), InvalidAlert> {
        if self.name.trim().is_empty() {
            return Err(InvalidAlert("name must not be empty"));
        }
        if self.courts.is_empty() {
            return Err(InvalidAlert("at least one court is required"));
        }
        if self.start_time >= self.end_time {
            return Err(InvalidAlert("startTime must be before endTime"));
        }
        Ok(())
    }

    /// Courts form a set: sorted, no duplicates.
    pub fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        self.courts.sort_unstable();
        self.courts.dedup();
    }
}

/// Request body for creating an alert.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    pub name: String,
    pub date: NaiveDate,
    pub start_time: SlotTime,
    pub end_time: SlotTime,
    pub courts: Vec<ResourceId>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl NewAlert {
    pub fn into_alert(self, id: Ulid, created: DateTime<Utc>) -> Alert {
        Alert {
            id,
            name: self.name,
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
            courts: self.courts,
            active: self.active,
            created,
        }
    }
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPatch {
    pub name: Option<String>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<SlotTime>,
    pub end_time: Option<SlotTime>,
    pub courts: Option<Vec<ResourceId>>,
    pub active: Option<bool>,
}

impl AlertPatch {
    pub fn apply_to(self, alert: &mut Alert) {
        if let Some(name) = self.name {
            alert.name = name;
        }
        if let Some(date) = self.date {
            alert.date = date;
        }
        if let Some(start) = self.start_time {
            alert.start_time = start;
        }
        if let Some(end) = self.end_time {
            alert.end_time = end;
        }
        if let Some(courts) = self.courts {
            alert.courts = courts;
        }
        if let Some(active) = self.active {
            alert.active = active;
        }
    }
}

// ── Check results ────────────────────────────────────────────────

/// Uniform output of every check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub condition_met: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    pub fn met(message: impl Into<String>) -> Self {
        Self {
            condition_met: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn not_met(message: impl Into<String>) -> Self {
        Self {
            condition_met: false,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            condition_met: false,
            message: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A date whose snapshot could not be used this cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateFailure {
    pub date: NaiveDate,
    pub reason: String,
}

/// Result of one check kind within a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CheckOutcome {
    Website {
        url: String,
        result: CheckResult,
    },
    Availability {
        result: CheckResult,
        slots_found: usize,
        failed_dates: Vec<DateFailure>,
    },
}

impl CheckOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            CheckOutcome::Website { .. } => "website",
            CheckOutcome::Availability { .. } => "availability",
        }
    }

    pub fn result(&self) -> &CheckResult {
        match self {
            CheckOutcome::Website { result, .. } | CheckOutcome::Availability { result, .. } => {
                result
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<CheckOutcome>,
}

impl CycleReport {
    pub fn outcome(&self, name: &str) -> Option<&CheckOutcome> {
        self.outcomes.iter().find(|o| o.name() == name)
    }
}

/// Where a cycle currently is. `Idle` between cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CyclePhase {
    #[default]
    Idle,
    Fetching,
    Resolving,
    Filtering,
    Emitting,
    Reporting,
}

impl CyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePhase::Idle => "idle",
            CyclePhase::Fetching => "fetching",
            CyclePhase::Resolving => "resolving",
            CyclePhase::Filtering => "filtering",
            CyclePhase::Emitting => "emitting",
            CyclePhase::Reporting => "reporting",
        }
    }
}
