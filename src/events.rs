//! Control-port event processing.
//!
//! This module turns Tor's asynchronous control-port events into state
//! changes on a [`CircuitRegistry`] and into [`Effect`] requests for the
//! host.
//!
//! # Overview
//!
//! The [`EventProcessor`] is a synchronous state machine. It is fed one
//! [`TorEvent`] at a time by the runtime in [`crate::control`] and returns
//! the effects that event produced. Nothing here blocks or performs I/O:
//! relay lookups are requested through [`Effect::LookupRelay`] and run
//! elsewhere.
//!
//! ```text
//!   ┌──────────────┐   TorEvent    ┌────────────────┐   Vec<Effect>
//!   │  control.rs  │ ────────────▶ │ EventProcessor │ ─────────────▶ host
//!   └──────────────┘               └───────┬────────┘
//!                                          │ mutates
//!                                          ▼
//!                                  ┌─────────────────┐
//!                                  │ CircuitRegistry │
//!                                  └─────────────────┘
//! ```
//!
//! # Event Handling
//!
//! | Event | State | Effects |
//! |-------|-------|---------|
//! | `CIRC` | Circuit lifecycle, built relays, hidden-service index | Log, NetworkReady, LookupRelay, ReevaluateWakeLock |
//! | `CIRC_MINOR` | Hidden-service purpose | ReevaluateWakeLock |
//! | `BW` | Last tick, totals | Notify, Bandwidth |
//! | `STREAM` | None | Log |
//! | `ORCONN` | None | Log |
//! | Log events | None | Log |
//! | Work status | None | WakeLock |
//! | Anything else | None | Log |
//!
//! # Host Policy
//!
//! The host decides *whether* some effects happen through [`HostPolicy`];
//! the processor decides *when*. Policy can change at any time with
//! [`EventProcessor::set_policy`].

use crate::circuits::{
    decode_path, path_chain, CircuitRecord, CircuitRegistry, CircuitStatus, NodeRecord, PathHop,
    StatusChange,
};
use crate::config::LogLevel;
use crate::effects::{BandwidthSample, Effect, NotificationIcon};
use crate::kwargs::parse_keyword_args;
use crate::rate::RateFormatter;

/// An event received from Tor's control port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorEvent {
    /// `CIRC`: a circuit changed status.
    CircuitStatus {
        /// Status keyword, possibly one this crate does not know.
        status: String,
        /// Circuit identifier.
        circuit_id: String,
        /// Comma-separated hop tokens, empty if the event had none.
        path: String,
        /// `PURPOSE` attribute, empty if absent.
        purpose: String,
    },
    /// `CIRC_MINOR`: a circuit changed purpose or hidden-service state.
    CircuitMinorStatus {
        /// Minor event keyword (e.g. `PURPOSE_CHANGED`).
        event: String,
        /// Circuit identifier.
        circuit_id: String,
        /// New `PURPOSE` attribute, empty if absent.
        purpose: String,
    },
    /// `STREAM`: a stream changed status.
    StreamStatus {
        /// Status keyword.
        status: String,
        /// Stream identifier.
        stream_id: String,
        /// Stream target.
        target: String,
    },
    /// `ORCONN`: an OR connection changed status.
    OrConnStatus {
        /// Status keyword.
        status: String,
        /// Relay the connection goes to.
        or_name: String,
    },
    /// `BW`: bytes moved during the last second.
    Bandwidth {
        /// Bytes read.
        read: u64,
        /// Bytes written.
        written: u64,
    },
    /// A Tor log message.
    Message {
        /// Severity reported by Tor.
        severity: LogLevel,
        /// Message text.
        text: String,
    },
    /// Tor reports whether it wants the device kept awake.
    WorkStatus(bool),
    /// Any event kind without a dedicated variant.
    Unrecognized {
        /// Event keyword.
        kind: String,
        /// Raw event body.
        text: String,
    },
}

impl TorEvent {
    /// Builds an event from a raw control-port event keyword and body.
    ///
    /// The body is what follows the keyword on the `650` line, e.g. for
    /// `650 CIRC 5 BUILT $AA~a PURPOSE=GENERAL` the kind is `CIRC` and the
    /// content is `5 BUILT $AA~a PURPOSE=GENERAL`. Bodies too short for
    /// their kind become [`TorEvent::Unrecognized`].
    pub fn parse_raw(kind: &str, content: &str) -> TorEvent {
        let unrecognized = || TorEvent::Unrecognized {
            kind: kind.to_string(),
            text: content.to_string(),
        };

        match kind {
            "CIRC" | "CIRC_MINOR" => {
                let parsed = parse_keyword_args(content);
                let mut tokens = parsed.remainder.split_whitespace();
                let (Some(circuit_id), Some(keyword)) = (tokens.next(), tokens.next()) else {
                    return unrecognized();
                };
                let path = tokens.next().unwrap_or_default();
                let purpose = parsed.get_or("PURPOSE", "").to_string();

                if kind == "CIRC" {
                    TorEvent::CircuitStatus {
                        status: keyword.to_string(),
                        circuit_id: circuit_id.to_string(),
                        path: path.to_string(),
                        purpose,
                    }
                } else {
                    TorEvent::CircuitMinorStatus {
                        event: keyword.to_string(),
                        circuit_id: circuit_id.to_string(),
                        purpose,
                    }
                }
            }
            "STREAM" => {
                let tokens: Vec<&str> = content.split_whitespace().collect();
                if tokens.len() < 2 {
                    return unrecognized();
                }
                TorEvent::StreamStatus {
                    stream_id: tokens[0].to_string(),
                    status: tokens[1].to_string(),
                    target: tokens.get(3).copied().unwrap_or_default().to_string(),
                }
            }
            "ORCONN" => {
                let tokens: Vec<&str> = content.split_whitespace().collect();
                if tokens.len() < 2 {
                    return unrecognized();
                }
                TorEvent::OrConnStatus {
                    or_name: tokens[0].to_string(),
                    status: tokens[1].to_string(),
                }
            }
            "BW" => {
                let mut tokens = content.split_whitespace();
                match (
                    tokens.next().and_then(|t| t.parse().ok()),
                    tokens.next().and_then(|t| t.parse().ok()),
                ) {
                    (Some(read), Some(written)) => TorEvent::Bandwidth { read, written },
                    _ => unrecognized(),
                }
            }
            "DEBUG" | "INFO" | "NOTICE" | "WARN" | "ERR" => match kind.parse() {
                Ok(severity) => TorEvent::Message {
                    severity,
                    text: content.to_string(),
                },
                Err(_) => unrecognized(),
            },
            _ => unrecognized(),
        }
    }
}

/// Host-owned switches that gate effects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostPolicy {
    /// Log every circuit event at debug instead of only `BUILT`/`CLOSED`.
    pub debug_logging: bool,
    /// Track built relays, look up their metadata and show rate
    /// notifications.
    pub expanded_notifications: bool,
    /// The host publishes hidden services and needs introduction circuits.
    pub hidden_services: bool,
    /// The host currently has network connectivity.
    pub has_connectivity: bool,
}

/// Readiness of the Tor network as seen by the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    /// No circuit has been built yet.
    Starting,
    /// At least one circuit has been built.
    Ready,
}

/// Sequential state machine over Tor control-port events.
///
/// # Example
///
/// ```rust
/// use circmon_rs::effects::Effect;
/// use circmon_rs::events::{EventProcessor, HostPolicy, TorEvent};
/// use circmon_rs::rate::RateFormatter;
///
/// let mut processor = EventProcessor::new(RateFormatter::default(), HostPolicy::default());
/// let effects = processor.process(TorEvent::parse_raw("CIRC", "1 BUILT $AA~alice PURPOSE=GENERAL"));
///
/// assert!(effects.iter().any(|e| matches!(e, Effect::NetworkReady)));
/// assert!(processor.registry().circuit("1").is_some());
/// ```
#[derive(Debug)]
pub struct EventProcessor {
    registry: CircuitRegistry,
    formatter: RateFormatter,
    policy: HostPolicy,
    bootstrap: BootstrapState,
    last_tick: Option<(u64, u64)>,
    total_read: u64,
    total_written: u64,
}

impl EventProcessor {
    /// Creates a processor in the starting state with an empty registry.
    pub fn new(formatter: RateFormatter, policy: HostPolicy) -> Self {
        Self {
            registry: CircuitRegistry::new(),
            formatter,
            policy,
            bootstrap: BootstrapState::Starting,
            last_tick: None,
            total_read: 0,
            total_written: 0,
        }
    }

    /// Returns the circuit registry.
    pub fn registry(&self) -> &CircuitRegistry {
        &self.registry
    }

    /// Returns the current host policy.
    pub fn policy(&self) -> HostPolicy {
        self.policy
    }

    /// Replaces the host policy.
    pub fn set_policy(&mut self, policy: HostPolicy) {
        self.policy = policy;
    }

    /// Updates the connectivity flag of the host policy.
    pub fn set_connectivity(&mut self, has_connectivity: bool) {
        self.policy.has_connectivity = has_connectivity;
    }

    /// Returns the bootstrap state.
    pub fn bootstrap_state(&self) -> BootstrapState {
        self.bootstrap
    }

    /// Returns `(total_read, total_written)` since process start.
    pub fn totals(&self) -> (u64, u64) {
        (self.total_read, self.total_written)
    }

    /// Forgets live circuits and built relays, e.g. after a reconnect.
    ///
    /// Bootstrap state, bandwidth totals and the hidden-service index are
    /// kept; the index is rebuilt by [`init_circuit_status`](Self::init_circuit_status).
    /// Returns the number of circuits dropped.
    pub fn reset_circuits(&mut self) -> usize {
        self.registry.clear_live_circuits()
    }

    /// Returns whether the host should hold a wake lock to keep an
    /// introduction circuit alive.
    pub fn wake_lock_required(&self) -> bool {
        self.policy.hidden_services && !self.registry.has_built_hidden_service_circuits()
    }

    /// Processes one event.
    pub fn process(&mut self, event: TorEvent) -> Vec<Effect> {
        match event {
            TorEvent::CircuitStatus {
                status,
                circuit_id,
                path,
                purpose,
            } => self.on_circuit_status(&status, &circuit_id, &path, &purpose),
            TorEvent::CircuitMinorStatus {
                event,
                circuit_id,
                purpose,
            } => self.on_circuit_minor_status(&event, &circuit_id, &purpose),
            TorEvent::StreamStatus {
                status, stream_id, ..
            } => vec![Effect::log(
                LogLevel::Notice,
                format!("StreamStatus ({}): {}", stream_id, status),
            )],
            TorEvent::OrConnStatus { status, or_name } => vec![Effect::log(
                LogLevel::Debug,
                format!("orConnStatus ({}): {}", parse_node_name(&or_name), status),
            )],
            TorEvent::Bandwidth { read, written } => self.on_bandwidth(read, written),
            TorEvent::Message { severity, text } => vec![Effect::log(
                severity,
                format!("{}: {}", severity_keyword(severity), text),
            )],
            TorEvent::WorkStatus(hold) => vec![
                Effect::log(LogLevel::Debug, format!("workStatus: {}", hold)),
                Effect::WakeLock(hold),
            ],
            TorEvent::Unrecognized { kind, text } => vec![Effect::log(
                LogLevel::Notice,
                format!("Message ({}): {}", kind, text),
            )],
        }
    }

    /// Handles a `CIRC` event.
    ///
    /// Unknown statuses and transitions outside the lifecycle are logged at
    /// debug and leave the registry untouched.
    pub fn on_circuit_status(
        &mut self,
        status: &str,
        circuit_id: &str,
        path: &str,
        purpose: &str,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        let hops = decode_path(path);
        let line = format!(
            "Circuit ({}) [{}] {}: {}",
            circuit_id,
            purpose,
            status,
            path_chain(&hops)
        );

        let parsed = status.parse::<CircuitStatus>().ok();

        if self.policy.debug_logging {
            effects.push(Effect::log(LogLevel::Debug, line));
        } else if matches!(parsed, Some(CircuitStatus::Built | CircuitStatus::Closed)) {
            effects.push(Effect::log(LogLevel::Notice, line));
        }

        match parsed {
            None => effects.push(Effect::log(
                LogLevel::Debug,
                format!("Ignoring circuit {} status {}", circuit_id, status),
            )),
            Some(new_status) => {
                match self
                    .registry
                    .apply_status(circuit_id, new_status, hops.clone(), purpose)
                {
                    Err(e) => effects.push(Effect::log(LogLevel::Debug, e.to_string())),
                    Ok(change) => {
                        if let StatusChange::Created(first) = change {
                            if first != CircuitStatus::Launched && self.policy.debug_logging {
                                effects.push(Effect::log(
                                    LogLevel::Debug,
                                    format!("Circuit ({}) first seen as {}", circuit_id, first),
                                ));
                            }
                        }

                        if new_status == CircuitStatus::Built {
                            if self.bootstrap == BootstrapState::Starting {
                                self.bootstrap = BootstrapState::Ready;
                                effects.push(Effect::NetworkReady);
                            }
                            if self.policy.expanded_notifications {
                                self.track_final_hop(circuit_id, &hops, &mut effects);
                            }
                        }

                        if self.policy.hidden_services {
                            if new_status == CircuitStatus::Built {
                                self.registry.track_hidden_service_circuit(CircuitRecord::new(
                                    circuit_id, new_status, hops, purpose,
                                ));
                            } else if new_status.is_terminal() {
                                self.registry.untrack_hidden_service_circuit(circuit_id);
                            }
                        }
                    }
                }
            }
        }

        if self.policy.hidden_services {
            effects.push(Effect::ReevaluateWakeLock);
        }

        effects
    }

    fn track_final_hop(
        &mut self,
        circuit_id: &str,
        hops: &[PathHop],
        effects: &mut Vec<Effect>,
    ) {
        let Some(last) = hops.last() else {
            return;
        };

        // Reuse the enrichment of a relay that already ends another circuit.
        let node = match self
            .registry
            .built_nodes()
            .values()
            .find(|n| n.id == last.id)
        {
            Some(existing) => {
                let mut node = existing.clone();
                node.display_name = last.display_name.clone();
                node.status = CircuitStatus::Built;
                node
            }
            None => NodeRecord::from_hop(last, CircuitStatus::Built),
        };

        if self.registry.register_built_node(circuit_id, node.clone()) && !node.is_enriched() {
            effects.push(Effect::LookupRelay {
                circuit_id: circuit_id.to_string(),
                node,
            });
        }
    }

    /// Handles a `CIRC_MINOR` event.
    pub fn on_circuit_minor_status(
        &mut self,
        event: &str,
        circuit_id: &str,
        purpose: &str,
    ) -> Vec<Effect> {
        if !self.policy.hidden_services {
            return Vec::new();
        }

        let mut effects = Vec::new();
        if self
            .registry
            .update_hidden_service_purpose(circuit_id, purpose)
        {
            if self.policy.debug_logging {
                effects.push(Effect::log(
                    LogLevel::Debug,
                    format!("Circuit ({}) {}: purpose {}", circuit_id, event, purpose),
                ));
            }
            effects.push(Effect::ReevaluateWakeLock);
        }
        effects
    }

    /// Handles a `BW` tick.
    ///
    /// Notifications are refreshed only when the `(read, written)` pair
    /// differs from the previous tick. Totals grow on every tick.
    pub fn on_bandwidth(&mut self, read: u64, written: u64) -> Vec<Effect> {
        let mut effects = Vec::new();

        self.total_read = self.total_read.saturating_add(read);
        self.total_written = self.total_written.saturating_add(written);

        if self.last_tick != Some((read, written)) {
            let text = self.formatter.format_pair(read, written);
            let icon = if read > 0 || written > 0 {
                NotificationIcon::Transfer
            } else {
                NotificationIcon::Idle
            };

            if !text.is_empty()
                && self.policy.has_connectivity
                && self.policy.expanded_notifications
            {
                effects.push(Effect::Notify { text, icon });
            }
        }
        self.last_tick = Some((read, written));

        effects.push(Effect::Bandwidth(BandwidthSample {
            read_bytes: read,
            written_bytes: written,
            total_read: self.total_read,
            total_written: self.total_written,
        }));
        effects
    }

    /// Rebuilds the hidden-service index from a `GETINFO circuit-status`
    /// dump.
    ///
    /// Only `BUILT` circuits are kept. Calling it twice with the same dump
    /// leaves the same index.
    pub fn init_circuit_status(&mut self, raw: &str) -> Vec<Effect> {
        self.registry.clear_hidden_service_circuits();

        for line in raw.lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let mut tokens = line.split_whitespace();
            let (Some(circuit_id), Some(status)) = (tokens.next(), tokens.next()) else {
                continue;
            };
            if status != CircuitStatus::Built.as_str() {
                continue;
            }

            let kwargs = parse_keyword_args(line);
            let path = tokens
                .next()
                .filter(|t| t.starts_with('$'))
                .map(decode_path)
                .unwrap_or_default();

            self.registry.track_hidden_service_circuit(CircuitRecord::new(
                circuit_id,
                CircuitStatus::Built,
                path,
                kwargs.get_or("PURPOSE", ""),
            ));
        }

        if self.policy.hidden_services {
            vec![Effect::ReevaluateWakeLock]
        } else {
            Vec::new()
        }
    }
}

/// Tor's own keyword for a log severity.
fn severity_keyword(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "DEBUG",
        LogLevel::Info => "INFO",
        LogLevel::Notice => "NOTICE",
        LogLevel::Warn => "WARN",
        LogLevel::Error => "ERR",
    }
}

/// Returns the nickname part of an `$ID=name` / `$ID~name` token, or the
/// token itself.
fn parse_node_name(node: &str) -> &str {
    node.split_once('=')
        .or_else(|| node.split_once('~'))
        .map(|(_, name)| name)
        .unwrap_or(node)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn status_strategy() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec![
            "LAUNCHED", "EXTENDED", "BUILT", "FAILED", "CLOSED", "GUARD_WAIT",
        ])
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn registry_only_follows_lifecycle(
            events in prop::collection::vec((0u8..4, status_strategy()), 0..60)
        ) {
            let mut p = EventProcessor::new(RateFormatter::default(), HostPolicy {
                expanded_notifications: true,
                ..HostPolicy::default()
            });
            let mut seen: std::collections::HashMap<String, CircuitStatus> = Default::default();

            for (id, status) in events {
                let id = id.to_string();
                p.on_circuit_status(status, &id, "$AA~a,$BB~b", "GENERAL");

                match p.registry().circuit(&id) {
                    Some(record) => {
                        if let Some(prev) = seen.get(&id) {
                            prop_assert!(*prev == record.status || prev.can_transition_to(record.status));
                        }
                        prop_assert!(!record.status.is_terminal());
                        seen.insert(id.clone(), record.status);
                    }
                    None => {
                        seen.remove(&id);
                    }
                }

                for circuit_id in p.registry().built_nodes().keys() {
                    prop_assert_eq!(
                        p.registry().circuit(circuit_id).map(|c| c.status),
                        Some(CircuitStatus::Built)
                    );
                }
            }
        }

        #[test]
        fn network_ready_at_most_once(statuses in prop::collection::vec(status_strategy(), 0..40)) {
            let mut p = EventProcessor::new(RateFormatter::default(), HostPolicy::default());
            let mut fired = 0;
            for (i, status) in statuses.iter().enumerate() {
                let effects = p.on_circuit_status(status, &i.to_string(), "", "GENERAL");
                fired += effects.iter().filter(|e| matches!(e, Effect::NetworkReady)).count();
            }
            prop_assert!(fired <= 1);
        }
    }
}
