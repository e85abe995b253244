//! Structured logging setup with tracing.
//!
//! The library only emits events; installing a subscriber is up to the host
//! app. [`init`] is the stock setup. `QUILL_LOG` takes an `EnvFilter`
//! directive and overrides the mode's default level.

use std::fmt::Write as _;
use tracing_subscriber::fmt::format::{debug_fn, Writer};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "QUILL_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// `debug` level with targets, file and line, every event field.
    Development,
    /// `info` level, message text only.
    Production,
}

impl LogMode {
    pub fn from_build() -> Self {
        if cfg!(debug_assertions) {
            LogMode::Development
        } else {
            LogMode::Production
        }
    }

    pub fn default_directive(&self) -> &'static str {
        match self {
            LogMode::Development => "quillapp=debug",
            LogMode::Production => "quillapp=info",
        }
    }
}

fn filter(mode: LogMode) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(mode.default_directive()))
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init(mode: LogMode) -> bool {
    let installed = match mode {
        LogMode::Development => tracing_subscriber::registry()
            .with(filter(mode))
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
        LogMode::Production => tracing_subscriber::registry()
            .with(filter(mode))
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .fmt_fields(debug_fn(|writer: &mut Writer<'_>, field, value| {
                        if field.name() == "message" {
                            write!(writer, "{:?}", value)
                        } else {
                            Ok(())
                        }
                    })),
            )
            .try_init(),
    };
    match installed {
        Ok(()) => {
            tracing::debug!(?mode, "logging initialized");
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_follows_build_profile() {
        let expected = if cfg!(debug_assertions) {
            LogMode::Development
        } else {
            LogMode::Production
        };
        assert_eq!(LogMode::from_build(), expected);
        assert_eq!(LogMode::Production.default_directive(), "quillapp=info");
    }

    #[test]
    fn second_init_is_refused() {
        init(LogMode::Production);
        assert!(!init(LogMode::Development));
    }
}
