//! Environment variable utilities
//!
//! Generic `env_get<T>` for parsing `JOBSYS_*` overrides with defaults.
//!
//! # Usage
//!
//! ```ignore
//! use jobsys_core::env::{env_get, env_get_bool, env_get_list};
//!
//! let workers: usize = env_get("JOBSYS_NUM_WORKERS", 0);
//! let enabled = env_get_bool("JOBSYS_ENABLED", true);
//! let filter: Vec<String> = env_get_list("JOBSYS_JOB_FILTER");
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default
///
/// Unset or unparsable values fall back to `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Get environment variable as boolean
///
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Any other set value is false; unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => parse_bool(&val),
        Err(_) => default,
    }
}

/// Get environment variable as optional value
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Get a comma-separated environment variable as a list
///
/// Entries are trimmed and empty entries dropped. Unset yields an empty list.
pub fn env_get_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|v| split_list(&v))
        .unwrap_or_default()
}

/// Split a comma-separated list, trimming and dropping empty entries
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[inline]
pub(crate) fn parse_bool(val: &str) -> bool {
    matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
