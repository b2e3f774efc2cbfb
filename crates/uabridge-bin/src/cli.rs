// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `run`: Start the bridge (default)
//! - `validate`: Validate configuration file
//! - `version`: Show version information

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// uabridge - device bus to OPC UA bridge
///
/// Enumerates the temperature sensors and I/O ports of the device, exposes
/// each one as an OPC UA variable and keeps the values current from bus
/// change notifications.
#[derive(Parser, Debug)]
#[command(
    name = "uabridge",
    author = "Sylvex <contact@sylvex.io>",
    version = uabridge_core::VERSION,
    about = "Exposes device bus sensors and ports as OPC UA variables",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "uabridge.yaml",
        env = "UABRIDGE_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Application name attached to every log line
    #[arg(long, global = true)]
    pub app_name: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the bridge
    ///
    /// This is the default command when no subcommand is specified.
    Run(RunArgs),

    /// Validate the configuration file
    ///
    /// Parses and validates the configuration file without connecting to
    /// the bus or opening the server port.
    Validate(ValidateArgs),

    /// Show detailed version information
    Version,
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `run` command.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// OPC UA listen port, overriding `server.port`
    #[arg(short, long)]
    pub port: Option<u32>,

    /// Serve the address space from memory without opening a network port
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    /// Show parsed configuration after validation
    #[arg(short, long)]
    pub show_config: bool,

    /// Output format for validation results
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

impl From<uabridge_config::LogFormat> for LogFormat {
    fn from(format: uabridge_config::LogFormat) -> Self {
        match format {
            uabridge_config::LogFormat::Text => LogFormat::Text,
            uabridge_config::LogFormat::Json => LogFormat::Json,
            uabridge_config::LogFormat::Compact => LogFormat::Compact,
        }
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for programmatic parsing
    Json,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective command, defaulting to `Run` if none specified.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Run(RunArgs::default()))
    }

    /// Returns the application name used for log identification.
    ///
    /// Falls back to the basename of the running executable.
    pub fn effective_app_name(&self) -> String {
        if let Some(name) = &self.app_name {
            return name.clone();
        }
        std::env::args()
            .next()
            .as_deref()
            .and_then(|arg0| Path::new(arg0).file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "uabridge".to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command() {
        let cli = Cli::parse_from(["uabridge"]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.effective_command(), Commands::Run(_)));
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from(["uabridge", "run", "--port", "4841", "--dry-run"]);
        let Some(Commands::Run(args)) = cli.command else {
            panic!("Expected Run command");
        };
        assert_eq!(args.port, Some(4841));
        assert!(args.dry_run);
    }

    #[test]
    fn test_out_of_range_port_parses() {
        // Range is enforced by the lifecycle controller, not the CLI.
        let cli = Cli::parse_from(["uabridge", "run", "-p", "70000"]);
        assert!(matches!(cli.command, Some(Commands::Run(RunArgs { port: Some(70000), .. }))));
    }

    #[test]
    fn test_validate_command() {
        let cli = Cli::parse_from(["uabridge", "validate", "--show-config", "-f", "json"]);
        if let Some(Commands::Validate(args)) = cli.command {
            assert!(args.show_config);
            assert_eq!(args.format, OutputFormat::Json);
        } else {
            panic!("Expected Validate command");
        }
    }

    #[test]
    fn test_global_options() {
        let cli = Cli::parse_from([
            "uabridge",
            "-c",
            "/etc/uabridge/config.yaml",
            "-l",
            "debug",
            "--log-format",
            "json",
            "--app-name",
            "opcuaserver",
        ]);
        assert_eq!(cli.config, PathBuf::from("/etc/uabridge/config.yaml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert_eq!(cli.effective_app_name(), "opcuaserver");
    }
}
