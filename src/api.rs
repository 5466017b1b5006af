//! High-level API for circmon-rs.
//!
//! This module provides the [`CircMon`] struct, the entry point for using
//! circmon-rs as a library.
//!
//! # Overview
//!
//! [`CircMon`] owns the event processor, the relay lookup client and the
//! host [`EffectSink`]. It survives reconnections: the circuit registry,
//! bootstrap state and bandwidth totals are kept when the control
//! connection drops and is re-established.
//!
//! # Example
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use circmon_rs::{CircMon, Config};
//!
//! #[tokio::main]
//! async fn main() -> circmon_rs::Result<()> {
//!     let mut monitor = CircMon::from_config(Config::default())?;
//!     monitor.run().await
//! }
//! ```
//!
//! ## Custom Host
//!
//! ```rust,no_run
//! use circmon_rs::{CircMon, Config, EffectSink, NotificationIcon};
//!
//! struct StatusBar;
//!
//! impl EffectSink for StatusBar {
//!     fn notify(&mut self, text: &str, _icon: NotificationIcon) {
//!         println!("{}", text);
//!     }
//!     fn wake_lock(&mut self, _hold: bool) {}
//!     fn network_ready(&mut self) {}
//! }
//!
//! #[tokio::main]
//! async fn main() -> circmon_rs::Result<()> {
//!     let mut monitor = CircMon::with_sink(Config::default(), Box::new(StatusBar))?;
//!     monitor.run().await
//! }
//! ```
//!
//! # Security
//!
//! The control password is moved out of the [`Config`] into a
//! [`SecurePassword`] and zeroized on drop.

use zeroize::Zeroize;

use crate::config::Config;
use crate::control::{self, AppState};
use crate::effects::{EffectSink, TracingSink};
use crate::error::Result;
use crate::events::{EventProcessor, HostPolicy};

/// A wrapper for sensitive password data that clears itself on drop.
///
/// Debug output shows `[REDACTED]` instead of the password.
///
/// # Example
///
/// ```rust
/// use circmon_rs::SecurePassword;
///
/// let password = SecurePassword::new("my_secret_password".to_string());
/// assert_eq!(password.as_str(), "my_secret_password");
///
/// let debug = format!("{:?}", password);
/// assert!(debug.contains("REDACTED"));
/// assert!(!debug.contains("my_secret"));
/// ```
#[derive(Clone)]
pub struct SecurePassword(String);

impl SecurePassword {
    /// Creates a new secure password wrapper.
    pub fn new(password: String) -> Self {
        Self(password)
    }

    /// Returns a reference to the password string.
    ///
    /// Avoid converting the result to an owned `String`; the copy would not
    /// be zeroized.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Drop for SecurePassword {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for SecurePassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecurePassword([REDACTED])")
    }
}

/// Circuit monitor bound to one host.
///
/// # Lifecycle
///
/// ```text
/// ┌─────────────────┐
/// │  from_config()  │ ◄── Build processor, lookup client, sink
/// └────────┬────────┘
///          │
///          ▼
/// ┌─────────────────┐
/// │     run()       │ ◄── Connect, authenticate, subscribe
/// └────────┬────────┘
///          │
///          ▼
/// ┌─────────────────┐
/// │  Event Loop     │ ◄── Reconnects until CTRL+C or retry limit
/// │  (control.rs)   │
/// └─────────────────┘
/// ```
///
/// `CircMon` is `Send` but not `Sync`. Wrap it in
/// `Arc<tokio::sync::Mutex<_>>` to share it between tasks.
pub struct CircMon {
    state: AppState,
}

impl CircMon {
    /// Creates a monitor that logs every effect through [`TracingSink`].
    ///
    /// # Errors
    ///
    /// Returns an error if the number locale is malformed or the lookup
    /// client cannot be built.
    pub fn from_config(config: Config) -> Result<Self> {
        Self::with_sink(config, Box::new(TracingSink::new()))
    }

    /// Creates a monitor that hands effects to `sink`.
    ///
    /// # Errors
    ///
    /// Same as [`CircMon::from_config`].
    pub fn with_sink(config: Config, sink: Box<dyn EffectSink>) -> Result<Self> {
        Ok(Self {
            state: AppState::new(config, sink)?,
        })
    }

    /// Runs the event loop until CTRL+C or the retry limit.
    ///
    /// # Errors
    ///
    /// Returns an error if Tor could never be reached.
    pub async fn run(&mut self) -> Result<()> {
        control::run_state(&mut self.state).await
    }

    /// Returns the event processor.
    pub fn processor(&self) -> &EventProcessor {
        &self.state.processor
    }

    /// Replaces the host policy.
    pub fn set_policy(&mut self, policy: HostPolicy) {
        self.state.processor.set_policy(policy);
    }

    /// Reports a change in host network connectivity.
    pub fn set_connectivity(&mut self, has_connectivity: bool) {
        self.state.processor.set_connectivity(has_connectivity);
    }

    /// Returns the configuration, without the control password.
    pub fn config(&self) -> &Config {
        &self.state.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_password_debug_redacted() {
        let password = SecurePassword::new("secret123".to_string());
        let debug_str = format!("{:?}", password);
        assert!(!debug_str.contains("secret123"));
        assert!(debug_str.contains("REDACTED"));
    }

    #[test]
    fn test_secure_password_as_str() {
        let password = SecurePassword::new("secret123".to_string());
        assert_eq!(password.as_str(), "secret123");
    }

    #[test]
    fn test_from_config_strips_password() {
        let mut config = Config::default();
        config.control_pass = Some("hunter2".to_string());
        let monitor = CircMon::from_config(config).unwrap();
        assert!(monitor.config().control_pass.is_none());
    }

    #[test]
    fn test_policy_follows_config_and_updates() {
        let mut config = Config::default();
        config.hidden_services = true;
        let mut monitor = CircMon::from_config(config).unwrap();

        let policy = monitor.processor().policy();
        assert!(policy.hidden_services);
        assert!(policy.has_connectivity);

        monitor.set_connectivity(false);
        assert!(!monitor.processor().policy().has_connectivity);

        monitor.set_policy(HostPolicy::default());
        assert!(!monitor.processor().policy().hidden_services);
    }

    #[test]
    fn test_malformed_locale_rejected() {
        let mut config = Config::default();
        config.display.number_locale = Some("en_US.UTF-8".to_string());
        assert!(CircMon::from_config(config).is_err());
    }
}
