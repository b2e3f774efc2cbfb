// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uabridge-bin
//!
//! Service binary for uabridge.
//!
//! ## Architecture
//!
//! ```text
//!                  main.rs
//!                     │
//!                  cli.rs ──> commands::{run, validate, version}
//!                                 │
//!                            runtime.rs
//!          ┌──────────────────┼──────────────────┐
//!          ▼                  ▼                  ▼
//!   uabridge-dbus      LifecycleController   ConfigWatcher
//!   (signals)          (uabridge-core)       (uabridge-config)
//!                             │
//!                      uabridge-opcua
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the bridge (default command)
//! uabridge
//!
//! # Start on another port with JSON logs
//! uabridge --log-format json run --port 4841
//!
//! # Validate configuration
//! uabridge -c /etc/uabridge/config.yaml validate
//! ```
//!
//! ## Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Clean shutdown |
//! | 1 | Configuration error |
//! | 2 | Initialization error |
//! | 3 | Runtime error |
//! | 5 | Device bus error |
//! | 6 | Server lifecycle error |
//! | 7 | Other bridge core error |

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

pub use cli::{Cli, Commands, LogFormat, OutputFormat, RunArgs, ValidateArgs};
pub use error::{report_error, report_error_and_exit, BinError, BinResult};
pub use runtime::{apply_change, supervise, BridgeRuntime, LoopExit, LoopInputs, RuntimeBuilder};
pub use shutdown::{OsSignals, ShutdownCoordinator, ShutdownReason};
