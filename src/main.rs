//! circmon-rs CLI application entry point.
//!
//! This binary runs circmon-rs as a standalone monitor, logging circuit,
//! relay and bandwidth activity of a local Tor daemon.
//!
//! # Startup Flow
//!
//! ```text
//!   ┌─────────────────┐
//!   │  Parse CLI Args │ ◄── clap parses command-line arguments
//!   └────────┬────────┘
//!            │
//!            ▼
//!   ┌──────────────────┐      ┌─────────────────┐
//!   │ --generate_config│────▶ │ Write default   │────▶ Exit
//!   │    specified?    │      │ config & exit   │
//!   └────────┬─────────┘      └─────────────────┘
//!            │ No
//!            ▼
//!   ┌─────────────────┐
//!   │  Load Config    │ ◄── Defaults → File → CLI → Env
//!   └────────┬────────┘
//!            │
//!            ▼
//!   ┌─────────────────┐
//!   │ Initialize      │ ◄── Set up tracing subscriber
//!   │   Logging       │
//!   └────────┬────────┘
//!            │
//!            ▼
//!   ┌─────────────────┐
//!   │ Run Main Loop   │ ◄── control::run_main()
//!   │ (control.rs)    │
//!   └─────────────────┘
//! ```
//!
//! # Usage Examples
//!
//! ```bash
//! # Connect via Unix socket and follow hidden-service circuits
//! circmon-rs --control-socket /run/tor/control --hidden-services
//!
//! # Verbose circuit logging to a file
//! circmon-rs --debug-logging --loglevel DEBUG --logfile /var/log/circmon.log
//!
//! # Query Onionoo directly instead of through the default proxy
//! circmon-rs --lookup-proxy ""
//! ```
//!
//! # Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Success |
//! | 1 | Error (see stderr for details) |
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `CIRCMON_CONFIG` | Path to config file (equivalent to `--config`) |

use clap::Parser;
use std::process::ExitCode;

use circmon_rs::{config, control, logger, CliArgs, Config, LogLevel};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> circmon_rs::Result<()> {
    let args = CliArgs::parse();

    if let Some(ref output_path) = args.generate_config {
        let config = Config::default();
        let toml = config.to_toml()?;
        std::fs::write(output_path, toml)?;
        println!("Wrote default config to {}", output_path.display());
        return Ok(());
    }

    let config = config::load_config(&args)?;

    logger::init(config.loglevel, config.logfile.as_deref())?;

    logger::plog(
        LogLevel::Notice,
        &format!("circmon-rs {} starting", control::VERSION),
    );
    logger::plog(
        LogLevel::Debug,
        &format!("Control IP: {}", config.control_ip),
    );

    if config.debug_logging {
        logger::plog(LogLevel::Info, "Circuit debug logging enabled");
    }
    if config.expanded_notifications {
        logger::plog(LogLevel::Info, "Relay tracking and rate notifications enabled");
        if !config.relay_lookup.enabled {
            logger::plog(LogLevel::Info, "Relay lookups disabled");
        }
    }
    if config.hidden_services {
        logger::plog(LogLevel::Info, "Hidden-service circuit tracking enabled");
    }

    logger::plog(LogLevel::Notice, "Configuration loaded successfully");

    control::run_main(config).await
}
