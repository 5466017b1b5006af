//! Logging for circmon-rs.
//!
//! Log output goes through the tracing ecosystem to stdout, a file, or
//! syslog. Both this crate's own messages and the log lines carried by
//! [`Effect::Log`](crate::effects::Effect::Log) use Tor's level names.
//!
//! # Log Levels
//!
//! | Level | Typical content |
//! |-------|-----------------|
//! | [`Debug`](crate::LogLevel::Debug) | Intermediate circuit states, OR connections, failed lookups |
//! | [`Info`](crate::LogLevel::Info) | Rate notifications from the default sink |
//! | [`Notice`](crate::LogLevel::Notice) | Built and closed circuits, streams, relay details |
//! | [`Warn`](crate::LogLevel::Warn) | Tor warnings, lost connections |
//! | [`Error`](crate::LogLevel::Error) | Tor errors, fatal startup failures |
//!
//! `RUST_LOG` overrides the configured level.
//!
//! # Example
//!
//! ```rust,no_run
//! use circmon_rs::{LogLevel, logger};
//!
//! logger::init(LogLevel::Notice, None).unwrap();
//! logger::plog(LogLevel::Notice, "Circuit (5) [GENERAL] BUILT: a > b > c");
//!
//! // File or syslog output
//! logger::init(LogLevel::Debug, Some("/var/log/circmon.log")).unwrap();
//! logger::init(LogLevel::Notice, Some(":syslog:")).unwrap();
//! ```
//!
//! Log rotation is left to external tools such as logrotate.

use std::io::Write;
use std::os::unix::net::UnixDatagram;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, error, info, warn};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use crate::config::LogLevel;
use crate::error::{Error, Result};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize the logging system.
///
/// Sets up the tracing subscriber once; subsequent calls are no-ops.
///
/// * `logfile` - `None` for stdout with ANSI colors, `Some(":syslog:")`
///   for syslog, or `Some(path)` to append to a file
///
/// # Errors
///
/// Returns [`Error::Io`] if:
/// - The log file cannot be created or opened
/// - The syslog socket cannot be found (Linux: `/dev/log`, macOS: `/var/run/syslog`)
///
/// Returns [`Error::Config`] if:
/// - The tracing subscriber cannot be set (usually means already initialized)
///
/// Syslog messages are prefixed with "circmon:".
pub fn init(level: LogLevel, logfile: Option<&str>) -> Result<()> {
    if LOGGER_INITIALIZED.get().is_some() {
        return Ok(());
    }

    let filter = match level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Notice => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match logfile {
        None => {
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_thread_ids(false)
                .with_span_events(FmtSpan::NONE)
                .with_ansi(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|e| Error::Config(format!("failed to set logger: {}", e)))?;
        }
        Some(":syslog:") => {
            init_syslog(env_filter)?;
        }
        Some(path) => {
            init_file_logger(path, env_filter)?;
        }
    }

    LOGGER_INITIALIZED.get_or_init(|| ());
    Ok(())
}

fn init_syslog(env_filter: EnvFilter) -> Result<()> {
    let syslog_path = if Path::new("/dev/log").exists() {
        "/dev/log"
    } else if Path::new("/var/run/syslog").exists() {
        "/var/run/syslog"
    } else {
        return Err(Error::Config("no syslog socket found".to_string()));
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_ansi(false)
        .with_writer(move || SyslogWriter {
            socket: UnixDatagram::unbound()
                .and_then(|sock| sock.connect(syslog_path).map(|_| sock))
                .ok(),
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Config(format!("failed to set logger: {}", e)))?;

    Ok(())
}

struct SyslogWriter {
    socket: Option<UnixDatagram>,
}

impl Write for SyslogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Some(ref socket) = self.socket {
            let msg = format!("circmon: {}", String::from_utf8_lossy(buf));
            socket.send(msg.as_bytes())?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn init_file_logger(path: &str, env_filter: EnvFilter) -> Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Config(format!("failed to set logger: {}", e)))?;

    Ok(())
}

/// Log a message at the specified level.
///
/// # Level Mapping
///
/// | LogLevel | tracing macro |
/// |----------|---------------|
/// | Debug | `debug!` |
/// | Info | `info!` |
/// | Notice | `info!` |
/// | Warn | `warn!` |
/// | Error | `error!` |
///
/// Notice maps to `info!` since tracing has no notice level.
pub fn plog(level: LogLevel, message: &str) {
    match level {
        LogLevel::Debug => debug!("{}", message),
        LogLevel::Info => info!("{}", message),
        LogLevel::Notice => info!("{}", message),
        LogLevel::Warn => warn!("{}", message),
        LogLevel::Error => error!("{}", message),
    }
}

/// Log a formatted message at the specified level.
///
/// ```rust
/// use circmon_rs::{LogLevel, plog_fmt};
///
/// plog_fmt!(LogLevel::Notice, "Connected to Tor version {}", "0.4.8.12");
/// plog_fmt!(LogLevel::Debug, "Tracking {} circuits", 3);
/// ```
#[macro_export]
macro_rules! plog_fmt {
    ($level:expr, $($arg:tt)*) => {
        $crate::logger::plog($level, &format!($($arg)*))
    };
}
