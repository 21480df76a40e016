use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::window::{self, StandingWatch};
use crate::fetch::DEFAULT_SLOT_API_URL;
use crate::model::{ResourceId, SlotTime};

pub const DEFAULT_BOOKING_URL: &str =
    "https://www.eversports.de/venue/squashpoint-schoneberg";

/// Longest accepted `CHECK_INTERVAL`: one day.
pub const MAX_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("nothing to watch: set TARGET_URL or API_ENABLED=true")]
    NothingEnabled,
}

/// Availability check settings, present only when `API_ENABLED` is true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityConfig {
    pub facility_id: String,
    pub slot_api_url: String,
    pub booking_url: String,
    pub fetch_timeout: Duration,
    /// `None` when `TARGET_TIMES` is unset: only stored alerts are watched.
    pub standing: Option<StandingWatch>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageConfig {
    pub url: String,
    pub condition_text: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    pub check_interval: Duration,
    pub shutdown_grace: Duration,
    pub page: Option<PageConfig>,
    pub availability: Option<AvailabilityConfig>,
    pub data_dir: PathBuf,
    pub http_bind: SocketAddr,
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));
        let millis = |name: &'static str, default: u64| -> Result<Duration, ConfigError> {
            Ok(Duration::from_millis(parse_or(name, get(name), default)?))
        };

        let telegram_bot_token = required("TELEGRAM_BOT_TOKEN")?;
        let telegram_chat_id = required("TELEGRAM_CHAT_ID")?;
        let check_interval = millis("CHECK_INTERVAL", 300_000)?;
        if check_interval.is_zero() || check_interval > MAX_CHECK_INTERVAL {
            return Err(ConfigError::Invalid {
                name: "CHECK_INTERVAL",
                value: check_interval.as_millis().to_string(),
                reason: format!(
                    "must be between 1 and {} ms",
                    MAX_CHECK_INTERVAL.as_millis()
                ),
            });
        }

        let page = match get("TARGET_URL") {
            Some(url) => Some(PageConfig {
                url,
                condition_text: get("PAGE_CONDITION_TEXT"),
                timeout: millis("PAGE_TIMEOUT", 30_000)?,
            }),
            None => None,
        };

        let api_enabled: bool = parse_or("API_ENABLED", get("API_ENABLED"), false)?;
        let availability = if api_enabled {
            let standing = match get("TARGET_TIMES") {
                Some(raw) => Some(StandingWatch {
                    times: slot_times("TARGET_TIMES", &raw)?,
                    courts: parse_list::<ResourceId>("COURT_IDS", &get("COURT_IDS").unwrap_or_else(|| "1,2,3,4".into()))?,
                    days: parse_or("DAYS_TO_CHECK", get("DAYS_TO_CHECK"), 7)?,
                }),
                None => None,
            };
            Some(AvailabilityConfig {
                facility_id: required("FACILITY_ID")?,
                slot_api_url: get("SLOT_API_URL").unwrap_or_else(|| DEFAULT_SLOT_API_URL.into()),
                booking_url: get("BOOKING_URL").unwrap_or_else(|| DEFAULT_BOOKING_URL.into()),
                fetch_timeout: millis("FETCH_TIMEOUT", 45_000)?,
                standing,
            })
        } else {
            None
        };

        if page.is_none() && availability.is_none() {
            return Err(ConfigError::NothingEnabled);
        }

        Ok(Self {
            telegram_bot_token,
            telegram_chat_id,
            check_interval,
            shutdown_grace: millis("SHUTDOWN_GRACE", 10_000)?,
            page,
            availability,
            data_dir: get("DATA_DIR").map_or_else(|| PathBuf::from("./data"), PathBuf::from),
            http_bind: parse_or("HTTP_BIND", get("HTTP_BIND"), SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            metrics_port: get("METRICS_PORT").map(|v| parse("METRICS_PORT", &v)).transpose()?,
        })
    }
}

fn parse<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.map_or(Ok(default), |v| parse(name, &v))
}

/// Comma separated list; blank entries are skipped.
fn parse_list<T>(name: &'static str, raw: &str) -> Result<Vec<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse(name, s))
        .collect()
}

/// Slot labels that the booking API actually reports on.
fn slot_times(name: &'static str, raw: &str) -> Result<Vec<SlotTime>, ConfigError> {
    let times: Vec<SlotTime> = parse_list(name, raw)?;
    match times.iter().find(|t| !window::is_slot_time(**t)) {
        Some(bad) => Err(ConfigError::Invalid {
            name,
            value: bad.to_string(),
            reason: "not a bookable slot start (0630, 0715, ... 2130)".into(),
        }),
        None => Ok(times),
    }
}
