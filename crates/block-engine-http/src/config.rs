use std::collections::HashMap;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use block_engine::{DstPolicy, EngineConfig, HorizonCap, TimeZones};
use chrono_tz::Tz;

/// A configuration variable that is present but cannot be used.
#[derive(Debug, thiserror::Error)]
#[error("{var} is invalid: {message}")]
pub struct ConfigError {
    pub var: &'static str,
    pub message: String,
}

impl ConfigError {
    fn new(var: &'static str, message: impl Into<String>) -> Self {
        Self {
            var,
            message: message.into(),
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`). Also bounds expansion work.
    pub request_timeout_secs: u64,
    /// Zone for sites without an explicit entry (default: `UTC`).
    pub default_timezone: Tz,
    /// Per-site zones from `SITE_TIMEZONES` (`site=Area/City,...`).
    pub site_timezones: HashMap<String, Tz>,
    pub dst_policy: DstPolicy,
    pub conflict_horizon_days: u32,
    pub horizon_max_occurrences: u32,
    pub horizon_max_years: u32,
    /// JSON file with sites, resources and appointments to load at startup.
    pub seed_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let cap = HorizonCap::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_origins: vec!["http://localhost:5173".to_string()],
            request_timeout_secs: 30,
            default_timezone: Tz::UTC,
            site_timezones: HashMap::new(),
            dst_policy: DstPolicy::default(),
            conflict_horizon_days: EngineConfig::default().conflict_horizon_days,
            horizon_max_occurrences: cap.max_occurrences,
            horizon_max_years: cap.max_years,
            seed_file: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                 |
    /// |---------------------------|-------------------------|
    /// | `HOST`                    | `0.0.0.0`               |
    /// | `PORT`                    | `3000`                  |
    /// | `CORS_ORIGINS`            | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                    |
    /// | `DEFAULT_TIMEZONE`        | `UTC`                   |
    /// | `SITE_TIMEZONES`          | (none)                  |
    /// | `DST_POLICY`              | `wall_clock`            |
    /// | `CONFLICT_HORIZON_DAYS`   | `365`                   |
    /// | `HORIZON_MAX_OCCURRENCES` | `1000`                  |
    /// | `HORIZON_MAX_YEARS`       | `5`                     |
    /// | `SEED_FILE`               | (none)                  |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let cors_origins = match lookup("CORS_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => defaults.cors_origins,
        };

        let site_timezones = match lookup("SITE_TIMEZONES") {
            Some(raw) => {
                TimeZones::parse_sites(&raw).map_err(|e| ConfigError::new("SITE_TIMEZONES", e))?
            }
            None => HashMap::new(),
        };

        let dst_policy = match lookup("DST_POLICY") {
            Some(raw) => parse_dst_policy(&raw)?,
            None => defaults.dst_policy,
        };

        let request_timeout_secs = parse_var(&lookup, "REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?;
        if request_timeout_secs == 0 {
            return Err(ConfigError::new("REQUEST_TIMEOUT_SECS", "must be at least 1"));
        }

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT", defaults.port)?,
            cors_origins,
            request_timeout_secs,
            default_timezone: parse_var(&lookup, "DEFAULT_TIMEZONE", defaults.default_timezone)?,
            site_timezones,
            dst_policy,
            conflict_horizon_days: parse_var(
                &lookup,
                "CONFLICT_HORIZON_DAYS",
                defaults.conflict_horizon_days,
            )?,
            horizon_max_occurrences: parse_var(
                &lookup,
                "HORIZON_MAX_OCCURRENCES",
                defaults.horizon_max_occurrences,
            )?,
            horizon_max_years: parse_var(&lookup, "HORIZON_MAX_YEARS", defaults.horizon_max_years)?,
            seed_file: lookup("SEED_FILE")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    /// Engine settings derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        let mut zones = TimeZones::new(self.default_timezone);
        zones.sites = self.site_timezones.clone();
        EngineConfig {
            zones,
            dst: self.dst_policy,
            cap: HorizonCap {
                max_occurrences: self.horizon_max_occurrences,
                max_years: self.horizon_max_years,
            },
            conflict_horizon_days: self.conflict_horizon_days,
        }
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(var) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::new(var, format!("'{raw}': {e}"))),
        None => Ok(default),
    }
}

fn parse_dst_policy(raw: &str) -> Result<DstPolicy, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "skip" => Ok(DstPolicy::Skip),
        "shift_forward" => Ok(DstPolicy::ShiftForward),
        "wall_clock" => Ok(DstPolicy::WallClock),
        other => Err(ConfigError::new(
            "DST_POLICY",
            format!("'{other}' is not one of skip, shift_forward, wall_clock"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = ServerConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.default_timezone, Tz::UTC);
        assert_eq!(config.conflict_horizon_days, 365);
        assert_eq!(config.horizon_max_occurrences, 1000);
        assert!(config.seed_file.is_none());
    }

    #[test]
    fn site_timezones_reach_the_engine() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("DEFAULT_TIMEZONE", "America/Santiago"),
            ("SITE_TIMEZONES", "sede-madrid=Europe/Madrid, sede-ny=America/New_York"),
            ("DST_POLICY", "skip"),
        ]))
        .unwrap();

        let engine = config.engine_config();
        assert_eq!(engine.tz("sede-madrid"), chrono_tz::Europe::Madrid);
        assert_eq!(engine.tz("sede-ny"), chrono_tz::America::New_York);
        assert_eq!(engine.tz("otra"), chrono_tz::America::Santiago);
        assert_eq!(engine.dst, DstPolicy::Skip);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = ServerConfig::from_lookup(lookup_from(&[("PORT", "eighty")])).unwrap_err();
        assert_eq!(err.var, "PORT");

        let err = ServerConfig::from_lookup(lookup_from(&[("DEFAULT_TIMEZONE", "Mars/Olympus")]))
            .unwrap_err();
        assert_eq!(err.var, "DEFAULT_TIMEZONE");

        let err = ServerConfig::from_lookup(lookup_from(&[("SITE_TIMEZONES", "sede-1")])).unwrap_err();
        assert_eq!(err.var, "SITE_TIMEZONES");

        let err = ServerConfig::from_lookup(lookup_from(&[("REQUEST_TIMEOUT_SECS", "0")])).unwrap_err();
        assert_eq!(err.var, "REQUEST_TIMEOUT_SECS");
    }
}
