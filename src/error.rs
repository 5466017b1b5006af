//! Error types for circmon-rs.
//!
//! This module defines the [`enum@Error`] enum covering every failure the
//! library can report. Very few of them ever escape the event path: the
//! processor is permissive by construction and turns malformed input,
//! unknown protocol values and failed relay lookups into log lines. The
//! variants below mostly surface at startup (configuration, connection) or
//! inside background lookups.
//!
//! # Error Categories
//!
//! ```text
//!   Error
//!   ├── Io                  ◄── File/socket I/O failures
//!   ├── Config              ◄── Invalid configuration
//!   ├── Control             ◄── Tor control protocol errors (from stem-rs)
//!   ├── Http                ◄── Relay lookup transport failures (from reqwest)
//!   ├── Lookup              ◄── Relay lookup response unusable
//!   ├── InvalidTransition   ◄── Circuit status outside the lifecycle
//!   └── Validation          ◄── Invalid input data
//! ```
//!
//! # Recovery Guide
//!
//! | Error | Recoverable | Retry | Recommended Action |
//! |-------|-------------|-------|-------------------|
//! | [`Io`](Error::Io) | Sometimes | Yes | Check permissions and paths |
//! | [`Config`](Error::Config) | No | No | Fix configuration file |
//! | [`Control`](Error::Control) | Sometimes | Yes | Reconnect to Tor |
//! | [`Http`](Error::Http) | Yes | Yes | Retried by the relay fetcher |
//! | [`Lookup`](Error::Lookup) | Yes | Yes | Retried by the relay fetcher |
//! | [`InvalidTransition`](Error::InvalidTransition) | Yes | No | Event is ignored |
//! | [`Validation`](Error::Validation) | No | No | Fix input data |
//!
//! # Example
//!
//! ```rust
//! use circmon_rs::{Config, Error, Result};
//!
//! fn load_config() -> Result<Config> {
//!     let config = Config::from_file(std::path::Path::new("circmon.conf"))?;
//!     config.validate()?;
//!     Ok(config)
//! }
//!
//! fn main() {
//!     match load_config() {
//!         Ok(_) => println!("Config loaded successfully"),
//!         Err(Error::Io(e)) => eprintln!("File error: {}", e),
//!         Err(Error::Config(msg)) => eprintln!("Config error: {}", msg),
//!         Err(e) => eprintln!("Other error: {}", e),
//!     }
//! }
//! ```

use thiserror::Error;

use crate::circuits::CircuitStatus;

/// Errors that can occur during circmon-rs operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during file or socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    ///
    /// Invalid configuration values or parsing failures. Not recoverable
    /// without user intervention.
    #[error("configuration error: {0}")]
    Config(String),

    /// Tor control protocol error.
    ///
    /// Wraps errors from stem-rs when talking to Tor's control port.
    ///
    /// # Recovery
    ///
    /// - Check if Tor is running
    /// - Verify control port configuration
    /// - The runtime reconnects automatically until `retry_limit`
    #[error("Tor control error: {0}")]
    Control(#[from] stem_rs::Error),

    /// HTTP transport error during a relay lookup.
    ///
    /// Connection refused by the proxy, timeouts and non-success statuses
    /// all land here. The relay fetcher treats it as a failed attempt.
    #[error("relay lookup request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The relay lookup answered but the answer was unusable.
    #[error("relay lookup failed: {0}")]
    Lookup(String),

    /// A circuit status that does not follow the circuit lifecycle.
    #[error("circuit {circuit_id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        /// The circuit the event referred to.
        circuit_id: String,
        /// Status currently recorded for the circuit.
        from: CircuitStatus,
        /// Status carried by the rejected event.
        to: CircuitStatus,
    },

    /// Input validation error.
    #[error("validation error: {0}")]
    Validation(String),
}

/// Result type alias for circmon-rs operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message() {
        let err = Error::InvalidTransition {
            circuit_id: "12".to_string(),
            from: CircuitStatus::Built,
            to: CircuitStatus::Launched,
        };
        assert_eq!(
            err.to_string(),
            "circuit 12: invalid transition BUILT -> LAUNCHED"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
