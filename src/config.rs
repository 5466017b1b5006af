//! Configuration management for circmon-rs.
//!
//! This module provides configuration parsing from TOML files, command-line arguments,
//! and environment variables. Configuration is applied in order: defaults → config file →
//! command-line arguments, with later sources overriding earlier ones.
//!
//! # Configuration Flow
//!
//! ```text
//!     ┌─────────────────┐
//!     │ Config::default │ ◄── Start with sensible defaults
//!     └────────┬────────┘
//!              │
//!              ▼
//!     ┌─────────────────┐     ┌─────────────────┐
//!     │ Config file     │ ◄───│ circmon.conf    │  (TOML format)
//!     │ exists?         │     │ or --config     │
//!     └────────┬────────┘     └─────────────────┘
//!              │
//!              ▼
//!     ┌─────────────────┐     ┌─────────────────┐
//!     │ Apply CLI args  │ ◄───│ --control-port  │
//!     │ (override)      │     │ --hidden-services│
//!     └────────┬────────┘     └─────────────────┘
//!              │
//!              ▼
//!     ┌─────────────────┐
//!     │ Validate &      │
//!     │ resolve hosts   │
//!     └────────┬────────┘
//!              │
//!              ▼
//!     ┌─────────────────┐
//!     │ Final Config    │ ◄── Ready to use
//!     └─────────────────┘
//! ```
//!
//! # Configuration Sources
//!
//! | Source | Priority | Description |
//! |--------|----------|-------------|
//! | Defaults | Lowest | Built-in sensible defaults |
//! | Config File | Medium | TOML file (`--config` or `CIRCMON_CONFIG`) |
//! | CLI Arguments | Highest | Command-line flags override all |
//!
//! # Example Configuration File
//!
//! ```toml
//! # Connection settings
//! control_ip = "127.0.0.1"
//! control_port = 9051
//! # control_socket = "/run/tor/control"  # Alternative: Unix socket
//! # control_pass = "my_password"         # If using password auth
//!
//! # Logging
//! loglevel = "notice"  # debug, info, notice, warn, error
//! # logfile = "/var/log/circmon.log"    # Optional: log to file
//! # logfile = ":syslog:"                # Optional: log to syslog
//! # retry_limit = 10                    # Optional: limit reconnection attempts
//!
//! # Host policy
//! debug_logging = false           # every circuit event at debug
//! expanded_notifications = true   # relay lookups and rate notifications
//! hidden_services = false         # track introduction circuits
//!
//! [display]
//! number_locale = "de-CH"   # unset uses the host locale, "" disables rate strings
//!
//! [relay_lookup]
//! enabled = true
//! base_url = "https://onionoo.torproject.org/details"
//! proxy = "http://127.0.0.1:8118"   # "" connects directly
//! max_attempts = 3
//! connect_timeout_secs = 60
//! read_timeout_secs = 60
//! ```
//!
//! # What This Module Does NOT Do
//!
//! - **Config file watching**: Changes require restart
//! - **Encrypted config files**: Passwords are stored in plaintext
//!
//! Host policy flags can still change at runtime through
//! [`EventProcessor::set_policy`](crate::events::EventProcessor::set_policy).

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, ToSocketAddrs};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::events::HostPolicy;
use crate::rate::RateFormatter;

/// Log level for circmon-rs output.
///
/// These levels control the verbosity of log output. From most to least verbose:
/// [`Debug`](LogLevel::Debug) > [`Info`](LogLevel::Info) > [`Notice`](LogLevel::Notice) >
/// [`Warn`](LogLevel::Warn) > [`Error`](LogLevel::Error)
///
/// They double as the severities of Tor's own log events, so `ERR` and
/// `WARNING` are accepted when parsing.
///
/// # Example
///
/// ```rust
/// use circmon_rs::LogLevel;
///
/// let level = LogLevel::Notice;
/// assert!(level < LogLevel::Warn);
/// assert_eq!("ERR".parse::<LogLevel>().unwrap(), LogLevel::Error);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Low-level debugging information.
    Debug,
    /// Informational messages about normal operation.
    Info,
    /// Notable events that may be of interest.
    #[default]
    Notice,
    /// Warning conditions that don't prevent operation.
    Warn,
    /// Error conditions that may impair functionality.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Notice => write!(f, "NOTICE"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "NOTICE" => Ok(LogLevel::Notice),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" | "ERR" => Ok(LogLevel::Error),
            _ => Err(Error::Config(format!("invalid log level: {}", s))),
        }
    }
}

/// Display settings for bandwidth rates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DisplayConfig {
    /// BCP 47 locale for rate strings (`en`, `de`, `fr-FR`, `de-CH`, ...).
    ///
    /// Unset means the host locale. An empty string disables rate strings
    /// entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_locale: Option<String>,
}

/// Settings for relay metadata lookups.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `enabled` | `true` |
/// | `base_url` | `https://onionoo.torproject.org/details` |
/// | `proxy` | `http://127.0.0.1:8118` |
/// | `max_attempts` | 3 |
/// | `connect_timeout_secs` | 60 |
/// | `read_timeout_secs` | 60 |
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayLookupConfig {
    /// Run lookups for the final relay of built circuits.
    #[serde(default = "default_lookup_enabled")]
    pub enabled: bool,
    /// Onionoo details endpoint.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// HTTP proxy the lookups go through. Empty for a direct connection.
    #[serde(default = "default_proxy")]
    pub proxy: String,
    /// Attempts per lookup, including skipped ones.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Connect timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub read_timeout_secs: u64,
}

fn default_lookup_enabled() -> bool {
    true
}
fn default_base_url() -> String {
    "https://onionoo.torproject.org/details".to_string()
}
fn default_proxy() -> String {
    "http://127.0.0.1:8118".to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    60
}

impl Default for RelayLookupConfig {
    fn default() -> Self {
        Self {
            enabled: default_lookup_enabled(),
            base_url: default_base_url(),
            proxy: default_proxy(),
            max_attempts: default_max_attempts(),
            connect_timeout_secs: default_timeout_secs(),
            read_timeout_secs: default_timeout_secs(),
        }
    }
}

/// Main configuration for circmon-rs.
///
/// # Example
///
/// ## Creating Default Configuration
///
/// ```rust
/// use circmon_rs::Config;
///
/// let config = Config::default();
/// assert_eq!(config.control_ip, "127.0.0.1");
/// assert!(config.expanded_notifications);
/// assert!(!config.hidden_services);
/// ```
///
/// ## Loading from File
///
/// ```rust,no_run
/// use circmon_rs::Config;
/// use std::path::Path;
///
/// let config = Config::from_file(Path::new("circmon.conf"))?;
/// # Ok::<(), circmon_rs::Error>(())
/// ```
///
/// # Validation
///
/// Call [`validate()`](Config::validate) to check configuration consistency:
///
/// - `max_attempts` and both timeouts must be non-zero
/// - `base_url` and a non-empty `proxy` must be valid URLs
/// - `number_locale` must be unset, empty or a well-formed locale
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// IP address of the Tor control port.
    #[serde(default = "default_control_ip")]
    pub control_ip: String,
    /// Port number of the Tor control port.
    #[serde(default)]
    pub control_port: Option<u16>,
    /// Path to the Tor control socket.
    #[serde(default)]
    pub control_socket: Option<PathBuf>,
    /// Password for Tor control authentication.
    #[serde(default)]
    pub control_pass: Option<String>,
    /// Log level for output.
    #[serde(default)]
    pub loglevel: LogLevel,
    /// Log file path. None for stdout, ":syslog:" for syslog.
    #[serde(default)]
    pub logfile: Option<String>,
    /// Maximum reconnection attempts. None for infinite.
    #[serde(default)]
    pub retry_limit: Option<u32>,
    /// Log every circuit event at debug level.
    #[serde(default)]
    pub debug_logging: bool,
    /// Track built relays and show rate notifications.
    #[serde(default = "default_expanded_notifications")]
    pub expanded_notifications: bool,
    /// Track hidden-service introduction circuits for wake-lock decisions.
    #[serde(default)]
    pub hidden_services: bool,
    /// Rate display settings.
    #[serde(default)]
    pub display: DisplayConfig,
    /// Relay lookup settings.
    #[serde(default)]
    pub relay_lookup: RelayLookupConfig,
}

fn default_control_ip() -> String {
    "127.0.0.1".to_string()
}
fn default_expanded_notifications() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            control_ip: default_control_ip(),
            control_port: None,
            control_socket: None,
            control_pass: None,
            loglevel: LogLevel::default(),
            logfile: None,
            retry_limit: None,
            debug_logging: false,
            expanded_notifications: default_expanded_notifications(),
            hidden_services: false,
            display: DisplayConfig::default(),
            relay_lookup: RelayLookupConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read.
    /// Returns [`Error::Config`] if the TOML is invalid.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if validation fails.
    pub fn validate(&self) -> Result<()> {
        let lookup = &self.relay_lookup;
        if lookup.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }
        if lookup.connect_timeout_secs == 0 || lookup.read_timeout_secs == 0 {
            return Err(Error::Config(
                "relay lookup timeouts must be positive".to_string(),
            ));
        }
        reqwest::Url::parse(&lookup.base_url)
            .map_err(|e| Error::Config(format!("invalid base_url {}: {}", lookup.base_url, e)))?;
        if !lookup.proxy.is_empty() {
            reqwest::Url::parse(&lookup.proxy)
                .map_err(|e| Error::Config(format!("invalid proxy {}: {}", lookup.proxy, e)))?;
        }
        self.rate_formatter()?;
        Ok(())
    }

    /// Resolve hostname to IP address if control_ip is a domain name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if hostname resolution fails.
    pub fn resolve_control_ip(&mut self) -> Result<()> {
        if self.control_ip.parse::<IpAddr>().is_err() {
            let addr = format!("{}:0", self.control_ip)
                .to_socket_addrs()
                .map_err(|e| {
                    Error::Config(format!(
                        "failed to resolve hostname {}: {}",
                        self.control_ip, e
                    ))
                })?
                .next()
                .ok_or_else(|| {
                    Error::Config(format!(
                        "no addresses found for hostname {}",
                        self.control_ip
                    ))
                })?;
            self.control_ip = addr.ip().to_string();
        }
        Ok(())
    }

    /// Host policy derived from the configured flags.
    ///
    /// Connectivity is assumed until the host reports otherwise.
    pub fn host_policy(&self) -> HostPolicy {
        HostPolicy {
            debug_logging: self.debug_logging,
            expanded_notifications: self.expanded_notifications,
            hidden_services: self.hidden_services,
            has_connectivity: true,
        }
    }

    /// Rate formatter for the configured locale.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a malformed locale.
    pub fn rate_formatter(&self) -> Result<RateFormatter> {
        RateFormatter::from_locale(self.display.number_locale.as_deref())
    }
}

/// Command-line arguments for circmon-rs.
///
/// Arguments override configuration file values.
///
/// # Options
///
/// | Option | Description |
/// |--------|-------------|
/// | `--config <FILE>` | Path to configuration file [env: CIRCMON_CONFIG] [default: circmon.conf] |
/// | `--generate_config <FILE>` | Write default config to file and exit |
/// | `--control-ip <IP>` | IP address of the Tor control port (default: 127.0.0.1) |
/// | `--control-port <PORT>` | Tor control port number (typically 9051) |
/// | `--control-socket <PATH>` | Path to Tor control socket (e.g., /run/tor/control) |
/// | `--control-pass <PASS>` | Tor control port password for authentication |
/// | `--loglevel <LEVEL>` | Log verbosity: DEBUG, INFO, NOTICE, WARN, ERROR |
/// | `--logfile <FILE>` | Log to file instead of stdout (use ":syslog:" for syslog) |
/// | `--retry-limit <N>` | Reconnection attempt limit (default: infinite) |
/// | `--debug-logging` | Log every circuit event at debug |
/// | `--no-expanded-notifications` | Disable relay tracking and rate notifications |
/// | `--hidden-services` | Track hidden-service introduction circuits |
/// | `--number-locale <TAG>` | Locale for rate strings |
/// | `--disable-relay-lookup` | Never query Onionoo |
/// | `--lookup-proxy <URL>` | HTTP proxy for Onionoo queries |
///
/// # Examples
///
/// ```bash
/// circmon-rs --control-socket /run/tor/control --hidden-services
/// circmon-rs --control-port 9051 --loglevel DEBUG --debug-logging
/// circmon-rs --generate_config circmon.conf
/// ```
#[derive(Parser, Debug)]
#[command(name = "circmon-rs")]
#[command(about = "Tor circuit, relay and bandwidth monitor")]
#[command(version)]
#[command(
    long_about = "circmon-rs follows a Tor daemon over its control port, tracking circuit \
    lifecycles, looking up the relays circuits end at, reporting bandwidth and deciding \
    when a hidden service needs the device kept awake."
)]
pub struct CliArgs {
    /// Write default config to file and exit.
    #[arg(long = "generate_config")]
    pub generate_config: Option<PathBuf>,

    /// Log verbosity (DEBUG, INFO, NOTICE, WARN, ERROR).
    #[arg(long)]
    pub loglevel: Option<String>,

    /// Log to file instead of stdout (use ":syslog:" for syslog).
    #[arg(long)]
    pub logfile: Option<String>,

    /// Path to configuration file.
    #[arg(long = "config", env = "CIRCMON_CONFIG", default_value = "circmon.conf")]
    pub config_file: PathBuf,

    /// IP address of the Tor control port.
    ///
    /// Can be an IPv4 address, IPv6 address, or hostname (will be resolved).
    #[arg(long)]
    pub control_ip: Option<String>,

    /// Tor control port number.
    #[arg(long)]
    pub control_port: Option<u16>,

    /// Path to Tor control socket.
    ///
    /// Takes precedence over TCP connection if specified.
    #[arg(long)]
    pub control_socket: Option<PathBuf>,

    /// Tor control port password.
    ///
    /// If not provided and required, will prompt interactively.
    #[arg(long)]
    pub control_pass: Option<String>,

    /// Reconnection attempt limit (default: infinite).
    #[arg(long)]
    pub retry_limit: Option<u32>,

    /// Log every circuit event at debug level.
    #[arg(long)]
    pub debug_logging: bool,

    /// Disable relay tracking and rate notifications.
    #[arg(long)]
    pub no_expanded_notifications: bool,

    /// Track hidden-service introduction circuits.
    #[arg(long)]
    pub hidden_services: bool,

    /// Locale for rate strings ("" disables them).
    #[arg(long)]
    pub number_locale: Option<String>,

    /// Never query the relay directory.
    #[arg(long)]
    pub disable_relay_lookup: bool,

    /// HTTP proxy for relay directory queries ("" for direct).
    #[arg(long)]
    pub lookup_proxy: Option<String>,
}

impl CliArgs {
    /// Apply CLI arguments to a configuration, overriding values.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(ref loglevel) = self.loglevel {
            if let Ok(level) = loglevel.parse() {
                config.loglevel = level;
            }
        }
        if let Some(ref logfile) = self.logfile {
            config.logfile = Some(logfile.clone());
        }
        if let Some(ref control_ip) = self.control_ip {
            config.control_ip = control_ip.clone();
        }
        if let Some(control_port) = self.control_port {
            config.control_port = Some(control_port);
        }
        if let Some(ref control_socket) = self.control_socket {
            config.control_socket = Some(control_socket.clone());
        }
        if let Some(ref control_pass) = self.control_pass {
            config.control_pass = Some(control_pass.clone());
        }
        if let Some(retry_limit) = self.retry_limit {
            config.retry_limit = Some(retry_limit);
        }
        if self.debug_logging {
            config.debug_logging = true;
        }
        if self.no_expanded_notifications {
            config.expanded_notifications = false;
        }
        if self.hidden_services {
            config.hidden_services = true;
        }
        if let Some(ref locale) = self.number_locale {
            config.display.number_locale = Some(locale.clone());
        }
        if self.disable_relay_lookup {
            config.relay_lookup.enabled = false;
        }
        if let Some(ref proxy) = self.lookup_proxy {
            config.relay_lookup.proxy = proxy.clone();
        }
    }
}

/// Load configuration from file and CLI arguments.
///
/// This function implements the configuration loading order:
/// 1. Start with defaults
/// 2. Apply config file if it exists
/// 3. Apply CLI arguments (override)
///
/// # Errors
///
/// Returns [`Error::Config`] if configuration is invalid.
pub fn load_config(args: &CliArgs) -> Result<Config> {
    let mut config = Config::default();

    if args.config_file.exists() {
        config = Config::from_file(&args.config_file)?;
    }

    args.apply_to(&mut config);
    config.resolve_control_ip()?;
    config.validate()?;

    Ok(config)
}
