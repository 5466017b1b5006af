//! # circmon-rs
//!
//! Follows a Tor daemon over its control port and keeps an up-to-date view
//! of its circuits, the relays they end at and the bandwidth it moves.
//!
//! # Overview
//!
//! circmon-rs subscribes to Tor's asynchronous control-port events and runs
//! them through a sequential state machine:
//!
//! - **Circuit lifecycle** ([`circuits`]): LAUNCHED → EXTENDED → BUILT →
//!   CLOSED/FAILED, with out-of-order transitions rejected
//! - **Relay metadata** ([`relay_info`]): address, country and operator of
//!   each circuit's final relay, fetched from Onionoo
//! - **Bandwidth** ([`rate`]): locale-aware `kbps`/`Mbps` rate strings and
//!   running totals
//! - **Hidden services** ([`events`]): whether an introduction circuit is
//!   up, and therefore whether the host needs a wake lock
//!
//! ## Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`api`] | High-level [`CircMon`] struct for programmatic use |
//! | [`config`] | Configuration management (TOML, CLI, environment) |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`control`] | Tor connection management and the event loop |
//! | [`events`] | [`TorEvent`] decoding and the [`EventProcessor`] |
//! | [`effects`] | [`Effect`] requests and the [`EffectSink`] host trait |
//! | [`circuits`] | [`CircuitRegistry`] and circuit/relay records |
//! | [`relay_info`] | Onionoo relay lookups with retries |
//! | [`rate`] | Bandwidth rate formatting |
//! | [`kwargs`] | `KEY=value` argument parsing for event bodies |
//! | [`logger`] | Logging infrastructure using tracing |
//!
//! # What This Library Does NOT Do
//!
//! - **Control-protocol framing**: Provided by [`stem_rs::controller`]
//! - **Circuit manipulation**: Circuits are observed, never closed or built
//! - **Platform integration**: Notifications and wake locks are requested
//!   through [`EffectSink`]; implementing them is up to the host
//!
//! # Quick Start
//!
//! ## As a Library
//!
//! ```rust,no_run
//! use circmon_rs::{CircMon, Config};
//!
//! #[tokio::main]
//! async fn main() -> circmon_rs::Result<()> {
//!     let mut config = Config::default();
//!     config.hidden_services = true;
//!
//!     let mut monitor = CircMon::from_config(config)?;
//!     monitor.run().await
//! }
//! ```
//!
//! ## Without a Tor Daemon
//!
//! ```rust
//! use circmon_rs::{Effect, EventProcessor, HostPolicy, RateFormatter, TorEvent};
//!
//! let mut processor = EventProcessor::new(
//!     RateFormatter::default(),
//!     HostPolicy { hidden_services: true, ..HostPolicy::default() },
//! );
//! processor.process(TorEvent::parse_raw("CIRC", "4 BUILT $AA~a,$BB~b PURPOSE=HS_SERVICE_INTRO"));
//! assert!(!processor.wake_lock_required());
//!
//! let effects = processor.process(TorEvent::parse_raw("CIRC", "4 CLOSED $AA~a,$BB~b PURPOSE=HS_SERVICE_INTRO"));
//! assert!(effects.iter().any(|e| matches!(e, Effect::ReevaluateWakeLock)));
//! assert!(processor.wake_lock_required());
//! ```
//!
//! ## As a CLI Application
//!
//! ```bash
//! # Run with default settings
//! circmon-rs
//!
//! # Connect to specific control port
//! circmon-rs --control-ip 127.0.0.1 --control-port 9051
//!
//! # Follow hidden-service introduction circuits over a Unix socket
//! circmon-rs --control-socket /run/tor/control --hidden-services
//!
//! # Generate default configuration file
//! circmon-rs --generate_config circmon.conf
//! ```
//!
//! # Configuration
//!
//! Configuration can be loaded from multiple sources in order of precedence:
//!
//! ```text
//! ┌─────────────────┐
//! │   CLI Arguments │ ◄── Highest priority (overrides all)
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │   Environment   │ ◄── CIRCMON_CONFIG
//! │    Variables    │
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │   Config File   │ ◄── TOML file (default: circmon.conf)
//! │     (TOML)      │
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │    Defaults     │
//! └─────────────────┘
//! ```
//!
//! See [`Config`] for all available options.
//!
//! # See Also
//!
//! - [stem-rs documentation](https://stem.tn3w.dev/docs/) - Tor control library used by circmon-rs
//! - [Tor Control Protocol Specification](https://spec.torproject.org/control-spec) - Protocol reference
//! - [Onionoo](https://metrics.torproject.org/onionoo.html) - Relay directory protocol

#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]

pub mod api;
pub mod circuits;
pub mod config;
pub mod control;
pub mod effects;
pub mod error;
pub mod events;
pub mod kwargs;
pub mod logger;
pub mod rate;
pub mod relay_info;

pub use api::{CircMon, SecurePassword};
pub use circuits::{
    CircuitRecord, CircuitRegistry, CircuitStatus, NodeRecord, PathHop, RelayDetails,
    HS_SERVICE_INTRO,
};
pub use config::{CliArgs, Config, DisplayConfig, LogLevel, RelayLookupConfig};
pub use effects::{BandwidthSample, Effect, EffectSink, NotificationIcon, TracingSink};
pub use error::{Error, Result};
pub use events::{BootstrapState, EventProcessor, HostPolicy, TorEvent};
pub use kwargs::{parse_keyword_args, KeywordArgs};
pub use rate::{NumberFormat, RateFormatter};
pub use relay_info::{ControlLiveness, RelayInfoFetcher};

pub use control::{authenticate_any, control_loop, run_main, run_state, AppState, VERSION};
