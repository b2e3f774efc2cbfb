// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use uabridge_config::{BridgeConfig, ConfigLoader};
use uabridge_core::{validate_port, UnresolvedPolicy};

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};

/// Executes the `validate` command to validate configuration.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let config_path = &cli.config;

    if !config_path.exists() {
        return Err(BinError::Configuration(format!(
            "Configuration file not found: {}",
            config_path.display()
        )));
    }

    let config = ConfigLoader::new().load(config_path).map_err(|e| {
        BinError::Configuration(format!("Configuration validation failed: {}", e))
    })?;
    let warnings = collect_warnings(&config);

    match args.format {
        OutputFormat::Text => {
            println!("Configuration is valid: {}", config_path.display());
            println!();
            println!("Summary:");
            println!("  OPC UA: {}:{}", config.server.host, config.server.port);
            println!("  Namespace: {}", config.server.namespace_uri);
            println!("  Temperature service: {}", config.bus.temperature.service);
            println!("  Port service: {}", config.bus.ports.service);
            println!("  Unknown subscriptions: {:?}", config.dispatch.unresolved);
            println!("  Watch: {}", if config.watch.enabled { "enabled" } else { "disabled" });

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &warnings {
                    println!("  - {}", warning);
                }
            }

            if args.show_config {
                println!();
                println!("Parsed configuration:");
                println!(
                    "{}",
                    serde_json::to_string_pretty(&config)
                        .unwrap_or_else(|_| "(serialization error)".to_string())
                );
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "summary": {
                    "host": config.server.host,
                    "port": config.server.port,
                    "namespace_uri": config.server.namespace_uri,
                    "temperature_service": config.bus.temperature.service,
                    "port_service": config.bus.ports.service,
                    "watch_enabled": config.watch.enabled,
                },
                "warnings": warnings,
                "config": if args.show_config { Some(&config) } else { None },
            });
            let text = serde_json::to_string_pretty(&output)
                .map_err(|e| BinError::runtime(format!("cannot render output: {}", e)))?;
            println!("{}", text);
        }
    }

    Ok(())
}

/// Returns the issues that load but keep the bridge from working as expected.
pub(crate) fn collect_warnings(config: &BridgeConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Err(e) = validate_port(config.server.port) {
        warnings.push(format!("{}; the server will not start until it is changed", e));
    }
    if config.dispatch.unresolved == UnresolvedPolicy::Abort {
        warnings.push("unknown subscription ids stop the service".to_string());
    }
    if !config.watch.enabled {
        warnings.push("port changes require a restart while watching is disabled".to_string());
    }

    warnings
}
