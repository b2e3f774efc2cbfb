// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Logging and tracing initialization.
//!
//! Log lines carry the application name through the root span that the
//! runtime opens around the whole service; see [`app_span`].

use anyhow::Context;
use tracing::{Level, Span};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::LogFormat;

/// Crates whose chatter is capped regardless of the requested level.
const QUIET_TARGETS: &[&str] = &["zbus=warn", "opcua=warn", "tokio=info"];

// =============================================================================
// Logging Initialization
// =============================================================================

/// Initializes the logging subsystem.
///
/// `RUST_LOG` wins over `level` when set.
///
/// # Errors
///
/// Fails when a directive does not parse or a global subscriber is
/// already installed.
pub fn init_logging(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter = build_filter(level)?;

    let installed = match format {
        LogFormat::Text => {
            let is_terminal = std::io::IsTerminal::is_terminal(&std::io::stdout());
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false)
                        .with_ansi(is_terminal),
                )
                .try_init()
        }
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init(),
        LogFormat::Compact => {
            let is_terminal = std::io::IsTerminal::is_terminal(&std::io::stdout());
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_ansi(is_terminal),
                )
                .try_init()
        }
    };
    installed.context("failed to install log subscriber")
}

fn build_filter(level: &str) -> anyhow::Result<EnvFilter> {
    let base = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log level '{}'", level))?,
    };

    QUIET_TARGETS.iter().try_fold(base, |filter, directive| {
        let directive = directive
            .parse()
            .with_context(|| format!("invalid log directive '{}'", directive))?;
        Ok(filter.add_directive(directive))
    })
}

/// Opens the root span that tags every log line with `app`.
pub fn app_span(app_name: &str) -> Span {
    tracing::info_span!("uabridge", app = %app_name)
}

// =============================================================================
// Log Level Parsing
// =============================================================================

/// Parses a log level string into a `Level`, defaulting to `INFO`.
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}
