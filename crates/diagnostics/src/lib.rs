// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Logging setup shared by the trip pond crates.
//!
//! Log output goes to stderr through `emit_term`. The level comes from the
//! `TRIPPOND_LOG` environment variable:
//! - `off` (default) - no logs
//! - `error`, `warn` - problems only
//! - `info` - partition loads, merges, queries
//! - `debug` - generated SQL, skip decisions, per-step detail

use std::sync::Once;

// Re-export emit so the macros below resolve in dependent crates
pub use emit;

/// Environment variable holding the log level.
pub const LOG_ENV: &str = "TRIPPOND_LOG";

static INIT: Once = Once::new();

/// Parsed value of `TRIPPOND_LOG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSetting {
    Off,
    Min(emit::Level),
    /// Unrecognized value; falls back to info.
    Unknown,
}

impl LogSetting {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "off" | "none" => LogSetting::Off,
            "error" => LogSetting::Min(emit::Level::Error),
            "warn" | "warning" => LogSetting::Min(emit::Level::Warn),
            "info" => LogSetting::Min(emit::Level::Info),
            "debug" => LogSetting::Min(emit::Level::Debug),
            _ => LogSetting::Unknown,
        }
    }

    fn min_level(self) -> Option<emit::Level> {
        match self {
            LogSetting::Off => None,
            LogSetting::Min(level) => Some(level),
            LogSetting::Unknown => Some(emit::Level::Info),
        }
    }
}

/// Initialize diagnostics from `TRIPPOND_LOG`.
///
/// Safe to call more than once; only the first call has an effect.
pub fn init_diagnostics() {
    let raw = std::env::var(LOG_ENV).unwrap_or_default();
    let setting = LogSetting::parse(&raw);
    init_with(setting);
    if setting == LogSetting::Unknown {
        // Runtime is up at info level, so this is visible
        emit::warn!("unknown {env} value {raw}, using info", env: LOG_ENV, raw: raw.as_str());
    }
}

/// Initialize diagnostics with an explicit setting.
pub fn init_with(setting: LogSetting) {
    INIT.call_once(|| {
        let Some(level) = setting.min_level() else {
            return;
        };
        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(level))
            .init();

        // The runtime lives for the whole process
        std::mem::forget(rt);
    });
}

/// Re-export the init function for convenience
pub use init_diagnostics as init;

/// Log basic operations (partition loaded, merge finished, query executed)
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Log detailed diagnostics (generated SQL, skip decisions)
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Log recoverable problems (a partition excluded from a merge pass)
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Log failures (a partition load failed)
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}
