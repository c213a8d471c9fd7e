//! Configuration loading and management
//!
//! Handles parsing of `taskdesk.toml` configuration files.

use std::path::{Path, PathBuf};

use chrono::{Duration, FixedOffset, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::lock::DEFAULT_LOCK_TIMEOUT_MS;
use crate::profile::Role;
use crate::task::Priority;

/// File name looked up inside the home directory.
pub const CONFIG_FILE: &str = "taskdesk.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub routes: RoutesConfig,

    #[serde(default)]
    pub tasks: TasksConfig,

    #[serde(default)]
    pub filters: FiltersConfig,

    #[serde(default)]
    pub reports: ReportsConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Session lifetime for the local backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long an issued session stays valid (e.g. "8h")
    #[serde(default = "default_session_ttl")]
    pub ttl: String,
}

fn default_session_ttl() -> String {
    "8h".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: default_session_ttl(),
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Result<Duration> {
        parse_duration(&self.ttl)
    }
}

/// Redirect targets and the admin allow-list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutesConfig {
    /// Where unauthenticated navigations are sent
    #[serde(default = "default_login_route")]
    pub login: String,

    /// Where signed-in users land, and where role denials are sent
    #[serde(default = "default_landing_route")]
    pub landing: String,

    /// Roles allowed through admin routes
    #[serde(default = "default_admin_roles")]
    pub admin_roles: Vec<Role>,
}

fn default_login_route() -> String {
    "/login".to_string()
}

fn default_landing_route() -> String {
    "/dashboard".to_string()
}

fn default_admin_roles() -> Vec<Role> {
    vec![Role::Admin]
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            login: default_login_route(),
            landing: default_landing_route(),
            admin_roles: default_admin_roles(),
        }
    }
}

/// Task defaults and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    #[serde(default)]
    pub default_priority: Priority,

    /// Number of tasks shown on the dashboard
    #[serde(default = "default_latest_limit")]
    pub latest_limit: usize,

    #[serde(default = "default_remarks_max_len")]
    pub remarks_max_len: usize,
}

fn default_latest_limit() -> usize {
    10
}

fn default_remarks_max_len() -> usize {
    1000
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            default_priority: Priority::default(),
            latest_limit: default_latest_limit(),
            remarks_max_len: default_remarks_max_len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiltersConfig {
    /// "local" or a fixed offset such as "+05:30"
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "local".to_string()
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
        }
    }
}

/// Time zone used to turn a calendar day into a timestamp range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayZone {
    Local,
    Fixed(FixedOffset),
}

impl FiltersConfig {
    pub fn zone(&self) -> Result<DayZone> {
        let raw = self.timezone.trim();
        if raw.eq_ignore_ascii_case("local") {
            return Ok(DayZone::Local);
        }
        if raw.eq_ignore_ascii_case("utc") || raw == "Z" {
            return Ok(DayZone::Fixed(utc_offset()));
        }
        parse_offset(raw).map(DayZone::Fixed).ok_or_else(|| {
            Error::InvalidConfig(format!(
                "filters.timezone: invalid value '{raw}' (expected local, utc or +HH:MM)"
            ))
        })
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Report period anchors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    /// First day of the week for department reports
    #[serde(default = "default_admin_week_start")]
    pub admin_week_start: String,

    /// First day of the week for personal reports
    #[serde(default = "default_personal_week_start")]
    pub personal_week_start: String,
}

fn default_admin_week_start() -> String {
    "monday".to_string()
}

fn default_personal_week_start() -> String {
    "friday".to_string()
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            admin_week_start: default_admin_week_start(),
            personal_week_start: default_personal_week_start(),
        }
    }
}

impl ReportsConfig {
    pub fn admin_week_start(&self) -> Result<Weekday> {
        parse_weekday(&self.admin_week_start, "reports.admin_week_start")
    }

    pub fn personal_week_start(&self) -> Result<Weekday> {
        parse_weekday(&self.personal_week_start, "reports.personal_week_start")
    }
}

fn parse_weekday(raw: &str, field: &str) -> Result<Weekday> {
    raw.trim().parse::<Weekday>().map_err(|_| {
        Error::InvalidConfig(format!("{field}: invalid weekday '{}'", raw.trim()))
    })
}

/// Local backend storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a `taskdesk.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration if the file exists, or return defaults.
    ///
    /// Unlike a missing file, an invalid one is an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let ttl = self.session.ttl()?;
        if ttl <= Duration::zero() {
            return Err(Error::InvalidConfig(
                "session.ttl must be positive".to_string(),
            ));
        }
        if ttl > max_session_ttl() {
            return Err(Error::InvalidConfig(format!(
                "session.ttl must not exceed {MAX_SESSION_TTL_DAYS}d (got '{}')",
                self.session.ttl
            )));
        }
        self.routes.validate()?;
        self.tasks.validate()?;
        self.filters.zone()?;
        self.reports.admin_week_start()?;
        self.reports.personal_week_start()?;
        if self.storage.lock_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "storage.lock_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl RoutesConfig {
    fn validate(&self) -> Result<()> {
        for (field, value) in [("routes.login", &self.login), ("routes.landing", &self.landing)] {
            if !value.starts_with('/') {
                return Err(Error::InvalidConfig(format!(
                    "{field}: route must start with '/' (got '{value}')"
                )));
            }
        }
        if self.login == self.landing {
            return Err(Error::InvalidConfig(
                "routes.login and routes.landing must differ".to_string(),
            ));
        }
        if self.admin_roles.is_empty() {
            return Err(Error::InvalidConfig(
                "routes.admin_roles cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl TasksConfig {
    fn validate(&self) -> Result<()> {
        if self.latest_limit == 0 {
            return Err(Error::InvalidConfig(
                "tasks.latest_limit must be > 0".to_string(),
            ));
        }
        if self.remarks_max_len == 0 {
            return Err(Error::InvalidConfig(
                "tasks.remarks_max_len must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

const MAX_SESSION_TTL_DAYS: i64 = 365;

fn max_session_ttl() -> Duration {
    Duration::days(MAX_SESSION_TTL_DAYS)
}

/// Parse a duration string like "30m", "8h", "7d"
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::InvalidConfig("duration cannot be empty".to_string()));
    }

    let (num_str, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => (&s[..pos], &s[pos..]),
        None => (s, "m"),
    };

    let num: i64 = num_str
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("invalid duration number: '{num_str}'")))?;

    let duration = match unit.to_lowercase().as_str() {
        "s" | "sec" | "second" | "seconds" => Duration::try_seconds(num),
        "m" | "min" | "minute" | "minutes" => Duration::try_minutes(num),
        "h" | "hr" | "hour" | "hours" => Duration::try_hours(num),
        "d" | "day" | "days" => Duration::try_days(num),
        "w" | "week" | "weeks" => Duration::try_weeks(num),
        _ => {
            return Err(Error::InvalidConfig(format!(
                "invalid duration unit '{unit}'. Expected: s, m, h, d, w"
            )));
        }
    };

    duration.ok_or_else(|| Error::InvalidConfig(format!("duration out of range: '{s}'")))
}

/// Resolve the config file path from an explicit path or the home directory.
pub fn config_path(explicit: Option<&Path>, home: &Path) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => home.join(CONFIG_FILE),
    }
}
