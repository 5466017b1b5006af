//! Effect requests emitted by the event processor.
//!
//! The [`EventProcessor`](crate::events::EventProcessor) never touches the
//! host directly. Each processing step returns a list of [`Effect`]s and
//! the runtime hands them to an [`EffectSink`], which owns the actual
//! notification area, wake lock and telemetry consumers.
//!
//! # Effect Flow
//!
//! ```text
//!   TorEvent ──▶ EventProcessor ──▶ Vec<Effect> ──▶ runtime
//!                                                    │
//!                        ┌───────────────────────────┼──────────────────┐
//!                        ▼                           ▼                  ▼
//!                  EffectSink::*           registry query for     tokio::spawn
//!               (log, notify, lock)       ReevaluateWakeLock     (LookupRelay)
//! ```
//!
//! [`TracingSink`] is the default host: it renders everything through the
//! crate logger and remembers the wake-lock and readiness state so callers
//! can inspect them.

use crate::circuits::NodeRecord;
use crate::config::LogLevel;
use crate::logger::plog;

/// Icon shown alongside a status notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationIcon {
    /// No bytes moved during the last tick.
    Idle,
    /// Bytes were read or written during the last tick.
    Transfer,
}

/// Bandwidth figures for one reporting tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BandwidthSample {
    /// Bytes read during the tick.
    pub read_bytes: u64,
    /// Bytes written during the tick.
    pub written_bytes: u64,
    /// Bytes read since process start.
    pub total_read: u64,
    /// Bytes written since process start.
    pub total_written: u64,
}

/// A request for the host to do something.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Write a log line.
    Log {
        /// Severity of the line.
        level: LogLevel,
        /// Rendered message.
        message: String,
    },
    /// Refresh the status notification.
    Notify {
        /// Display text, e.g. a rate pair.
        text: String,
        /// Icon selector.
        icon: NotificationIcon,
    },
    /// Acquire (`true`) or release (`false`) the wake lock.
    WakeLock(bool),
    /// The first circuit has been built; the network is usable.
    NetworkReady,
    /// Hidden-service circuits changed; decide again whether a wake lock
    /// is needed.
    ReevaluateWakeLock,
    /// Telemetry for the latest bandwidth tick.
    Bandwidth(BandwidthSample),
    /// Fetch directory metadata for the final relay of a built circuit.
    LookupRelay {
        /// Circuit the relay terminates.
        circuit_id: String,
        /// Node whose enrichment slot the lookup fills.
        node: NodeRecord,
    },
}

impl Effect {
    /// Shorthand for [`Effect::Log`].
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Effect::Log {
            level,
            message: message.into(),
        }
    }
}

/// Host side of the effect channel.
///
/// Only the effects that reach outside the process are routed here;
/// [`Effect::ReevaluateWakeLock`] and [`Effect::LookupRelay`] are resolved
/// by the runtime itself.
pub trait EffectSink: Send {
    /// Writes a log line.
    fn log(&mut self, level: LogLevel, message: &str) {
        plog(level, message);
    }

    /// Shows or refreshes the status notification.
    fn notify(&mut self, text: &str, icon: NotificationIcon);

    /// Acquires or releases the wake lock.
    fn wake_lock(&mut self, hold: bool);

    /// Signals that the network became usable.
    fn network_ready(&mut self);

    /// Receives bandwidth telemetry.
    fn bandwidth(&mut self, _sample: &BandwidthSample) {}
}

/// Default sink that logs every effect.
#[derive(Debug, Default)]
pub struct TracingSink {
    wake_lock_held: bool,
    network_ready: bool,
    last_sample: Option<BandwidthSample>,
}

impl TracingSink {
    /// Creates a sink with the wake lock released.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the wake lock is currently held.
    pub fn wake_lock_held(&self) -> bool {
        self.wake_lock_held
    }

    /// Returns whether the network-ready signal has been received.
    pub fn is_network_ready(&self) -> bool {
        self.network_ready
    }

    /// Returns the most recent bandwidth sample.
    pub fn last_sample(&self) -> Option<BandwidthSample> {
        self.last_sample
    }
}

impl EffectSink for TracingSink {
    fn notify(&mut self, text: &str, icon: NotificationIcon) {
        if !text.is_empty() {
            plog(LogLevel::Info, &format!("[{:?}] {}", icon, text));
        }
    }

    fn wake_lock(&mut self, hold: bool) {
        if hold != self.wake_lock_held {
            plog(
                LogLevel::Debug,
                if hold {
                    "Acquiring wake lock"
                } else {
                    "Releasing wake lock"
                },
            );
        }
        self.wake_lock_held = hold;
    }

    fn network_ready(&mut self) {
        self.network_ready = true;
        plog(LogLevel::Notice, "Tor network is ready");
    }

    fn bandwidth(&mut self, sample: &BandwidthSample) {
        self.last_sample = Some(*sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_sink_tracks_state() {
        let mut sink = TracingSink::new();
        assert!(!sink.wake_lock_held());
        assert!(!sink.is_network_ready());

        sink.wake_lock(true);
        assert!(sink.wake_lock_held());
        sink.wake_lock(false);
        assert!(!sink.wake_lock_held());

        sink.network_ready();
        assert!(sink.is_network_ready());

        let sample = BandwidthSample {
            read_bytes: 10,
            written_bytes: 20,
            total_read: 10,
            total_written: 20,
        };
        sink.bandwidth(&sample);
        assert_eq!(sink.last_sample(), Some(sample));
    }

    #[test]
    fn test_log_constructor() {
        match Effect::log(LogLevel::Notice, "hello") {
            Effect::Log { level, message } => {
                assert_eq!(level, LogLevel::Notice);
                assert_eq!(message, "hello");
            }
            other => panic!("unexpected effect: {:?}", other),
        }
    }
}
