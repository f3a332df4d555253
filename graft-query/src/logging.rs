//! Logging setup for Graft.
//!
//! Graft logs through `tracing`. Planned fetch steps and executed SQL are logged
//! at `debug`, reconciliation details at `trace`. Installing a subscriber is left
//! to the application unless the `tracing-subscriber` feature is enabled, in which
//! case [`init`] installs one driven by environment variables.
//!
//! # Environment Variables
//!
//! - `GRAFT_DEBUG=true` / `GRAFT_DEBUG=1` - Enable debug logging
//! - `GRAFT_LOG_LEVEL=debug|info|warn|error|trace` - Set specific log level
//! - `GRAFT_LOG_FORMAT=json|pretty|compact` - Set output format (default: json)
//!
//! ```rust,no_run
//! use graft_query::logging;
//!
//! // Call once at startup
//! logging::init();
//! ```

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Check if debug logging is enabled via `GRAFT_DEBUG`.
///
/// Returns `true` if `GRAFT_DEBUG` is "true", "1" or "yes" (case-insensitive).
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("GRAFT_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// The log level from `GRAFT_LOG_LEVEL`.
///
/// Defaults to "debug" if `GRAFT_DEBUG` is enabled, otherwise "warn".
pub fn get_log_level() -> &'static str {
    let fallback = if is_debug_enabled() { "debug" } else { "warn" };
    match env::var("GRAFT_LOG_LEVEL") {
        Ok(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// The log format from `GRAFT_LOG_FORMAT`, "json" unless set otherwise.
pub fn get_log_format() -> &'static str {
    env::var("GRAFT_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Initialize logging. Subsequent calls are no-ops.
///
/// Does nothing unless `GRAFT_DEBUG` or `GRAFT_LOG_LEVEL` is set.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var("GRAFT_LOG_LEVEL").is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(format!(
                "graft={},graft_query={},graft_expr={}",
                level, level, level
            ))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

            let registry = tracing_subscriber::registry().with(filter);
            let result = match get_log_format() {
                "json" => registry.with(fmt::layer().json()).try_init(),
                "compact" => registry.with(fmt::layer().compact()).try_init(),
                _ => registry.with(fmt::layer().pretty()).try_init(),
            };

            if result.is_ok() {
                tracing::info!(
                    level = level,
                    format = get_log_format(),
                    "Graft logging initialized"
                );
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        // SAFETY: no other test in this crate reads or writes these variables
        unsafe {
            env::remove_var("GRAFT_DEBUG");
            env::remove_var("GRAFT_LOG_LEVEL");
            env::remove_var("GRAFT_LOG_FORMAT");
        }
        assert!(!is_debug_enabled());
        assert_eq!(get_log_level(), "warn");
        assert_eq!(get_log_format(), "json");
        init();
    }
}
