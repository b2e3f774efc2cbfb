// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.
//!
//! - `run`: Start the bridge
//! - `validate`: Validate configuration file
//! - `version`: Show version information

mod run;
mod validate;
mod version;

pub use run::run;
pub use validate::validate;
pub use version::version;

use std::path::Path;

use uabridge_config::{BridgeConfig, ConfigLoader};

use crate::cli::{Cli, Commands};
use crate::error::{BinError, BinResult};

/// Executes the appropriate command based on CLI arguments.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.effective_command() {
        Commands::Run(args) => run::run(&cli, args).await,
        Commands::Validate(args) => validate::validate(&cli, args),
        Commands::Version => version::version(&cli),
    }
}

/// Loads the configuration file, falling back to defaults when it is absent.
///
/// Returns the configuration and whether the file existed.
pub(crate) fn load_or_default(path: &Path, loader: &ConfigLoader) -> BinResult<(BridgeConfig, bool)> {
    if !path.exists() {
        return Ok((BridgeConfig::default(), false));
    }
    let config = loader
        .load(path)
        .map_err(|e| BinError::from(e).with_context(format!("loading {}", path.display())))?;
    Ok((config, true))
}
