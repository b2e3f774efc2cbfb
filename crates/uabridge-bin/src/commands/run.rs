// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `run` command.

use tracing::{info, warn};

use uabridge_config::ConfigLoader;

use crate::cli::{Cli, RunArgs};
use crate::error::BinResult;
use crate::logging::init_logging;
use crate::runtime::RuntimeBuilder;

use super::load_or_default;

/// Executes the `run` command to start the bridge.
pub async fn run(cli: &Cli, args: RunArgs) -> BinResult<()> {
    let loader = ConfigLoader::new();
    let (config, found) = load_or_default(&cli.config, &loader)?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.as_str().to_string());
    let format = cli.log_format.unwrap_or_else(|| config.logging.format.into());
    init_logging(&level, format)?;

    if found {
        info!(path = %cli.config.display(), "Configuration loaded");
    } else {
        warn!(path = %cli.config.display(), "Configuration file not found; using defaults");
    }

    let runtime = RuntimeBuilder::new()
        .config(config)
        .config_path(&cli.config)
        .loader(loader)
        .port(args.port)
        .dry_run(args.dry_run)
        .app_name(cli.effective_app_name())
        .build()?;

    runtime.run().await
}
