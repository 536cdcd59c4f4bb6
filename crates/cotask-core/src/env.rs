//! Environment variable utilities
//!
//! Typed lookups used by the config layer, logging and the fatal mode.
//!
//! ```ignore
//! use cotask_core::env::{env_get, env_get_bool};
//!
//! let max_tasks: usize = env_get("COTASK_MAX_TASKS", 64);
//! let guard: bool = env_get_bool("COTASK_GUARD_PAGE", true);
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default
///
/// An unset variable and one that fails to parse both yield `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as boolean
///
/// "1", "true", "yes", "on" (case-insensitive) are true, "0", "false",
/// "no", "off" are false. Anything else, including unset, is `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Get environment variable as optional value
///
/// Returns `Some(T)` if the variable is set and parses successfully.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
