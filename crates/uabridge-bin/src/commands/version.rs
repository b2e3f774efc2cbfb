// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `version` command.

use crate::cli::Cli;
use crate::error::BinResult;

/// Prints version information for every crate in the service.
pub fn version(_cli: &Cli) -> BinResult<()> {
    println!("uabridge - device bus to OPC UA bridge");
    println!();
    println!("Version Information:");
    println!("  uabridge-bin:    {}", env!("CARGO_PKG_VERSION"));
    println!("  uabridge-core:   {}", uabridge_core::VERSION);
    println!("  uabridge-config: {}", uabridge_config::VERSION);
    println!("  uabridge-dbus:   {}", uabridge_dbus::VERSION);
    println!("  uabridge-opcua:  {}", uabridge_opcua::VERSION);
    println!();
    println!("Build Information:");
    println!("  Target:       {}", std::env::consts::ARCH);
    println!("  OS:           {}", std::env::consts::OS);
    println!();
    println!("License: PolyForm Noncommercial License 1.0.0");
    println!("Copyright (c) 2025 Sylvex. All rights reserved.");

    Ok(())
}
