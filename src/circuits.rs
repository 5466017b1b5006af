//! Circuit and relay state.
//!
//! This module holds the live view of circuits reported by Tor's `CIRC`
//! events, the terminal relay of every built circuit, and the
//! hidden-service purpose index used for wake-lock arbitration.
//!
//! # Circuit Lifecycle
//!
//! ```text
//!   LAUNCHED ──▶ EXTENDED ──▶ BUILT ──▶ CLOSED
//!      │            │ ▲                   ▲
//!      │            └─┘ (one per hop)     │
//!      │            │                     │
//!      ├────────────┴─────────────────────┘  (torn down before completion)
//!      │            │
//!      └────────────┴──▶ FAILED              (never built)
//! ```
//!
//! `CLOSED` and `FAILED` are terminal: the record leaves the live set. The
//! first status seen for an unknown circuit id is accepted as its starting
//! point, since circuits routinely predate the control connection.
//!
//! # Relay Enrichment
//!
//! A [`NodeRecord`]'s IP address, country and organization come from a
//! background lookup that may finish long after the circuit event that
//! created the node. The enrichment is stored as one immutable
//! [`RelayDetails`] snapshot in a shared [`EnrichmentSlot`] and replaced
//! whole, so a reader sees either no enrichment or all of it.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};

/// Purpose tag of hidden-service introduction circuits.
pub const HS_SERVICE_INTRO: &str = "HS_SERVICE_INTRO";

/// Status of a circuit as reported in `CIRC` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitStatus {
    /// Circuit ID assigned to a new circuit.
    Launched,
    /// One more hop has been completed.
    Extended,
    /// All hops finished; the circuit can carry streams.
    Built,
    /// Circuit closed before it was built.
    Failed,
    /// Circuit closed.
    Closed,
}

impl CircuitStatus {
    /// Returns the status keyword used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitStatus::Launched => "LAUNCHED",
            CircuitStatus::Extended => "EXTENDED",
            CircuitStatus::Built => "BUILT",
            CircuitStatus::Failed => "FAILED",
            CircuitStatus::Closed => "CLOSED",
        }
    }

    /// Returns whether the circuit leaves the live set on this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CircuitStatus::Failed | CircuitStatus::Closed)
    }

    /// Returns whether a circuit currently in `self` may move to `next`.
    pub fn can_transition_to(&self, next: CircuitStatus) -> bool {
        use CircuitStatus::*;
        matches!(
            (self, next),
            (Launched, Extended)
                | (Launched, Failed)
                | (Launched, Closed)
                | (Extended, Extended)
                | (Extended, Built)
                | (Extended, Failed)
                | (Extended, Closed)
                | (Built, Closed)
        )
    }
}

impl fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CircuitStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "LAUNCHED" => Ok(CircuitStatus::Launched),
            "EXTENDED" => Ok(CircuitStatus::Extended),
            "BUILT" => Ok(CircuitStatus::Built),
            "FAILED" => Ok(CircuitStatus::Failed),
            "CLOSED" => Ok(CircuitStatus::Closed),
            _ => Err(Error::Validation(format!("unknown circuit status: {}", s))),
        }
    }
}

/// One hop of a circuit path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathHop {
    /// Relay fingerprint with the leading sigil removed.
    pub id: String,
    /// Relay nickname, or the id when the path carried none.
    pub display_name: String,
}

impl PathHop {
    /// Decodes a single path token: `$ID=name`, `$ID~name` or `$ID`.
    ///
    /// The first character of the id segment is a marker and is dropped.
    /// Returns `None` for empty tokens.
    pub fn parse(token: &str) -> Option<Self> {
        if token.is_empty() {
            return None;
        }

        let (raw_id, name) = if let Some((id, name)) = token.split_once('=') {
            (id, Some(name))
        } else if let Some((id, name)) = token.split_once('~') {
            (id, Some(name))
        } else {
            (token, None)
        };

        let mut chars = raw_id.chars();
        chars.next();
        let id = chars.as_str().to_string();
        let display_name = match name {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => id.clone(),
        };

        Some(Self { id, display_name })
    }
}

/// Decodes a comma-separated circuit path. Empty tokens are skipped.
pub fn decode_path(path: &str) -> Vec<PathHop> {
    path.split(',').filter_map(PathHop::parse).collect()
}

/// Joins hop display names with `" > "` for logging.
pub fn path_chain(hops: &[PathHop]) -> String {
    hops.iter()
        .map(|h| h.display_name.as_str())
        .collect::<Vec<_>>()
        .join(" > ")
}

/// Relay metadata fetched from the relay directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayDetails {
    /// Address of the relay's first OR port, without the port.
    pub ip_address: String,
    /// Country name, if the directory knows it.
    pub country: Option<String>,
    /// Autonomous system name, if the directory knows it.
    pub organization: Option<String>,
}

impl fmt::Display for RelayDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ip_address)?;
        if let Some(ref country) = self.country {
            write!(f, " {}", country)?;
        }
        if let Some(ref org) = self.organization {
            write!(f, " ({})", org)?;
        }
        Ok(())
    }
}

/// Shared, atomically replaced slot holding a node's enrichment.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentSlot(Arc<RwLock<Option<Arc<RelayDetails>>>>);

impl EnrichmentSlot {
    /// Returns the current snapshot, if any.
    pub fn get(&self) -> Option<Arc<RelayDetails>> {
        match self.0.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replaces the snapshot.
    pub fn set(&self, details: RelayDetails) {
        let details = Some(Arc::new(details));
        match self.0.write() {
            Ok(mut guard) => *guard = details,
            Err(poisoned) => *poisoned.into_inner() = details,
        }
    }

    /// Returns whether the slot has been filled.
    pub fn is_filled(&self) -> bool {
        self.get().is_some()
    }

    /// Returns whether two slots are the same shared cell.
    pub fn ptr_eq(&self, other: &EnrichmentSlot) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A relay at the end of a built circuit.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    /// Relay fingerprint.
    pub id: String,
    /// Relay nickname, or the fingerprint.
    pub display_name: String,
    /// Last circuit status that referenced this relay.
    pub status: CircuitStatus,
    enrichment: EnrichmentSlot,
}

impl NodeRecord {
    /// Creates an unenriched node from a path hop.
    pub fn from_hop(hop: &PathHop, status: CircuitStatus) -> Self {
        Self {
            id: hop.id.clone(),
            display_name: hop.display_name.clone(),
            status,
            enrichment: EnrichmentSlot::default(),
        }
    }

    /// Returns the enrichment snapshot, if a lookup has completed.
    pub fn details(&self) -> Option<Arc<RelayDetails>> {
        self.enrichment.get()
    }

    /// Returns whether enrichment has been filled in.
    pub fn is_enriched(&self) -> bool {
        self.enrichment.is_filled()
    }

    /// Returns the shared enrichment slot for a background writer.
    pub fn enrichment_slot(&self) -> EnrichmentSlot {
        self.enrichment.clone()
    }

    /// IP address of the relay, once known.
    pub fn ip_address(&self) -> Option<String> {
        self.details().map(|d| d.ip_address.clone())
    }

    /// Country of the relay, once known.
    pub fn country(&self) -> Option<String> {
        self.details().and_then(|d| d.country.clone())
    }

    /// Organization of the relay, once known.
    pub fn organization(&self) -> Option<String> {
        self.details().and_then(|d| d.organization.clone())
    }
}

/// A live circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitRecord {
    /// Circuit identifier.
    pub id: String,
    /// Current status.
    pub status: CircuitStatus,
    /// Decoded path, as of the last event that carried one.
    pub path: Vec<PathHop>,
    /// Circuit purpose tag.
    pub purpose: String,
}

impl CircuitRecord {
    /// Creates a record.
    pub fn new(id: &str, status: CircuitStatus, path: Vec<PathHop>, purpose: &str) -> Self {
        Self {
            id: id.to_string(),
            status,
            path,
            purpose: purpose.to_string(),
        }
    }
}

/// Outcome of [`CircuitRegistry::apply_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    /// The circuit was not known and has been created.
    Created(CircuitStatus),
    /// The circuit moved between two statuses.
    Moved {
        /// Status before the event.
        from: CircuitStatus,
        /// Status after the event.
        to: CircuitStatus,
    },
}

/// Owner of all live circuit state.
///
/// Mutated only from the event-processing task; readers in other tasks
/// only ever touch [`EnrichmentSlot`]s handed out through [`NodeRecord`]s.
///
/// # Example
///
/// ```rust
/// use circmon_rs::circuits::{decode_path, CircuitRegistry, CircuitStatus};
///
/// let mut registry = CircuitRegistry::new();
/// registry.apply_status("4", CircuitStatus::Launched, Vec::new(), "GENERAL").unwrap();
/// registry.apply_status("4", CircuitStatus::Extended, decode_path("$AA~a"), "GENERAL").unwrap();
/// registry.apply_status("4", CircuitStatus::Built, decode_path("$AA~a,$BB~b"), "GENERAL").unwrap();
/// assert_eq!(registry.circuit("4").unwrap().status, CircuitStatus::Built);
///
/// registry.apply_status("4", CircuitStatus::Closed, Vec::new(), "GENERAL").unwrap();
/// assert!(registry.circuit("4").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CircuitRegistry {
    circuits: HashMap<String, CircuitRecord>,
    built_nodes: HashMap<String, NodeRecord>,
    hs_circuits: HashMap<String, CircuitRecord>,
}

impl CircuitRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a status to a circuit, creating it if unknown.
    ///
    /// Terminal statuses remove the circuit and its built-node entry.
    /// A non-empty `path` replaces the stored path; an empty one keeps it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] when the status does not
    /// follow the lifecycle; the registry is left untouched.
    pub fn apply_status(
        &mut self,
        circuit_id: &str,
        status: CircuitStatus,
        path: Vec<PathHop>,
        purpose: &str,
    ) -> Result<StatusChange> {
        let change = match self.circuits.get_mut(circuit_id) {
            Some(record) => {
                if !record.status.can_transition_to(status) {
                    return Err(Error::InvalidTransition {
                        circuit_id: circuit_id.to_string(),
                        from: record.status,
                        to: status,
                    });
                }
                let from = record.status;
                record.status = status;
                record.purpose = purpose.to_string();
                if !path.is_empty() {
                    record.path = path;
                }
                StatusChange::Moved { from, to: status }
            }
            None => {
                self.circuits.insert(
                    circuit_id.to_string(),
                    CircuitRecord::new(circuit_id, status, path, purpose),
                );
                StatusChange::Created(status)
            }
        };

        if status.is_terminal() {
            self.circuits.remove(circuit_id);
            self.built_nodes.remove(circuit_id);
        }

        Ok(change)
    }

    /// Returns a live circuit.
    pub fn circuit(&self, circuit_id: &str) -> Option<&CircuitRecord> {
        self.circuits.get(circuit_id)
    }

    /// Returns the number of live circuits.
    pub fn circuit_count(&self) -> usize {
        self.circuits.len()
    }

    /// Drops every live circuit and built node, returning how many
    /// circuits were dropped. The hidden-service index is left alone.
    pub fn clear_live_circuits(&mut self) -> usize {
        let dropped = self.circuits.len();
        self.circuits.clear();
        self.built_nodes.clear();
        dropped
    }

    /// Records the terminal relay of a built circuit.
    ///
    /// Ignored unless the circuit is currently `BUILT`.
    pub fn register_built_node(&mut self, circuit_id: &str, node: NodeRecord) -> bool {
        let built = self
            .circuits
            .get(circuit_id)
            .is_some_and(|c| c.status == CircuitStatus::Built);
        if built {
            self.built_nodes.insert(circuit_id.to_string(), node);
        }
        built
    }

    /// Returns the terminal relay recorded for a circuit.
    pub fn built_node(&self, circuit_id: &str) -> Option<&NodeRecord> {
        self.built_nodes.get(circuit_id)
    }

    /// Returns all built nodes keyed by circuit id.
    pub fn built_nodes(&self) -> &HashMap<String, NodeRecord> {
        &self.built_nodes
    }

    /// Inserts or replaces a circuit in the hidden-service index.
    pub fn track_hidden_service_circuit(&mut self, record: CircuitRecord) {
        self.hs_circuits.insert(record.id.clone(), record);
    }

    /// Removes a circuit from the hidden-service index.
    pub fn untrack_hidden_service_circuit(&mut self, circuit_id: &str) -> bool {
        self.hs_circuits.remove(circuit_id).is_some()
    }

    /// Updates the purpose of an indexed hidden-service circuit.
    ///
    /// Returns `false` if the circuit is not indexed.
    pub fn update_hidden_service_purpose(&mut self, circuit_id: &str, purpose: &str) -> bool {
        match self.hs_circuits.get_mut(circuit_id) {
            Some(record) => {
                record.purpose = purpose.to_string();
                true
            }
            None => false,
        }
    }

    /// Empties the hidden-service index.
    pub fn clear_hidden_service_circuits(&mut self) {
        self.hs_circuits.clear();
    }

    /// Returns the hidden-service index.
    pub fn hidden_service_circuits(&self) -> &HashMap<String, CircuitRecord> {
        &self.hs_circuits
    }

    /// Returns whether any indexed circuit serves `purpose`.
    pub fn has_circuit_with_purpose(&self, purpose: &str) -> bool {
        self.hs_circuits.values().any(|c| c.purpose == purpose)
    }

    /// Returns whether a hidden-service introduction circuit is built.
    pub fn has_built_hidden_service_circuits(&self) -> bool {
        self.has_circuit_with_purpose(HS_SERVICE_INTRO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_path_with_names() {
        let hops = decode_path("$ABCD1234=Alice,$EF567890~Bob");
        assert_eq!(hops.len(), 2);
        assert_eq!(hops[0].id, "ABCD1234");
        assert_eq!(hops[0].display_name, "Alice");
        assert_eq!(hops[1].id, "EF567890");
        assert_eq!(hops[1].display_name, "Bob");
        assert_eq!(path_chain(&hops), "Alice > Bob");
    }

    #[test]
    fn test_decode_path_bare_ids() {
        let hops = decode_path("$AAAA,,$BBBB");
        assert_eq!(hops.len(), 2);
        assert_eq!(hops[0].id, "AAAA");
        assert_eq!(hops[0].display_name, "AAAA");
        assert_eq!(path_chain(&hops), "AAAA > BBBB");
    }

    #[test]
    fn test_decode_empty_path() {
        assert!(decode_path("").is_empty());
        assert_eq!(path_chain(&[]), "");
    }

    #[test]
    fn test_hop_with_empty_name_falls_back_to_id() {
        let hop = PathHop::parse("$CAFE~").unwrap();
        assert_eq!(hop.id, "CAFE");
        assert_eq!(hop.display_name, "CAFE");
    }

    #[test]
    fn test_status_round_trip() {
        for s in ["LAUNCHED", "EXTENDED", "BUILT", "FAILED", "CLOSED"] {
            let status: CircuitStatus = s.parse().unwrap();
            assert_eq!(status.as_str(), s);
        }
        assert!("GUARD_WAIT".parse::<CircuitStatus>().is_err());
    }

    #[test]
    fn test_transitions() {
        use CircuitStatus::*;
        assert!(Launched.can_transition_to(Extended));
        assert!(Extended.can_transition_to(Extended));
        assert!(Extended.can_transition_to(Built));
        assert!(Built.can_transition_to(Closed));
        assert!(Launched.can_transition_to(Failed));
        assert!(!Built.can_transition_to(Failed));
        assert!(!Built.can_transition_to(Launched));
        assert!(!Launched.can_transition_to(Built));
        assert!(!Closed.can_transition_to(Launched));
    }

    #[test]
    fn test_lazy_creation() {
        let mut reg = CircuitRegistry::new();
        let change = reg
            .apply_status("9", CircuitStatus::Built, decode_path("$AA~a"), "GENERAL")
            .unwrap();
        assert_eq!(change, StatusChange::Created(CircuitStatus::Built));
        assert_eq!(reg.circuit_count(), 1);
    }

    #[test]
    fn test_clear_live_circuits_keeps_hs_index() {
        let mut reg = CircuitRegistry::new();
        let hops = decode_path("$AA~a");
        reg.apply_status("1", CircuitStatus::Built, hops.clone(), HS_SERVICE_INTRO)
            .unwrap();
        reg.register_built_node("1", NodeRecord::from_hop(&hops[0], CircuitStatus::Built));
        reg.track_hidden_service_circuit(CircuitRecord::new(
            "1",
            CircuitStatus::Built,
            hops,
            HS_SERVICE_INTRO,
        ));

        assert_eq!(reg.clear_live_circuits(), 1);
        assert_eq!(reg.circuit_count(), 0);
        assert!(reg.built_nodes().is_empty());
        assert!(reg.has_built_hidden_service_circuits());

        // The id can start over from LAUNCHED.
        let change = reg
            .apply_status("1", CircuitStatus::Launched, Vec::new(), "GENERAL")
            .unwrap();
        assert_eq!(change, StatusChange::Created(CircuitStatus::Launched));
    }

    #[test]
    fn test_invalid_transition_leaves_state() {
        let mut reg = CircuitRegistry::new();
        reg.apply_status("1", CircuitStatus::Built, Vec::new(), "GENERAL")
            .unwrap();
        let err = reg
            .apply_status("1", CircuitStatus::Launched, Vec::new(), "OTHER")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        let circ = reg.circuit("1").unwrap();
        assert_eq!(circ.status, CircuitStatus::Built);
        assert_eq!(circ.purpose, "GENERAL");
    }

    #[test]
    fn test_path_kept_when_event_has_none() {
        let mut reg = CircuitRegistry::new();
        reg.apply_status("1", CircuitStatus::Extended, decode_path("$AA~a"), "GENERAL")
            .unwrap();
        reg.apply_status("1", CircuitStatus::Extended, Vec::new(), "GENERAL")
            .unwrap();
        assert_eq!(reg.circuit("1").unwrap().path.len(), 1);
    }

    #[test]
    fn test_terminal_status_removes_built_node() {
        let mut reg = CircuitRegistry::new();
        let hops = decode_path("$AA~a,$BB~b");
        reg.apply_status("1", CircuitStatus::Built, hops.clone(), "GENERAL")
            .unwrap();
        assert!(reg.register_built_node("1", NodeRecord::from_hop(&hops[1], CircuitStatus::Built)));
        assert_eq!(reg.built_node("1").unwrap().id, "BB");

        reg.apply_status("1", CircuitStatus::Closed, Vec::new(), "GENERAL")
            .unwrap();
        assert!(reg.built_node("1").is_none());
        assert!(reg.circuit("1").is_none());
    }

    #[test]
    fn test_built_node_requires_built_circuit() {
        let mut reg = CircuitRegistry::new();
        let hop = PathHop::parse("$AA~a").unwrap();
        reg.apply_status("1", CircuitStatus::Launched, Vec::new(), "GENERAL")
            .unwrap();
        assert!(!reg.register_built_node("1", NodeRecord::from_hop(&hop, CircuitStatus::Launched)));
        assert!(!reg.register_built_node("2", NodeRecord::from_hop(&hop, CircuitStatus::Built)));
        assert!(reg.built_nodes().is_empty());
    }

    #[test]
    fn test_hidden_service_index() {
        let mut reg = CircuitRegistry::new();
        assert!(!reg.has_built_hidden_service_circuits());

        reg.track_hidden_service_circuit(CircuitRecord::new(
            "5",
            CircuitStatus::Built,
            Vec::new(),
            "HS_VANGUARDS",
        ));
        assert!(!reg.has_built_hidden_service_circuits());

        assert!(reg.update_hidden_service_purpose("5", HS_SERVICE_INTRO));
        assert!(reg.has_built_hidden_service_circuits());
        assert!(!reg.update_hidden_service_purpose("6", HS_SERVICE_INTRO));

        assert!(reg.untrack_hidden_service_circuit("5"));
        assert!(!reg.has_built_hidden_service_circuits());
    }

    #[test]
    fn test_enrichment_snapshot_shared() {
        let hop = PathHop::parse("$AA~a").unwrap();
        let node = NodeRecord::from_hop(&hop, CircuitStatus::Built);
        let copy = node.clone();
        assert!(!node.is_enriched());
        assert_eq!(node.ip_address(), None);

        node.enrichment_slot().set(RelayDetails {
            ip_address: "192.0.2.1".to_string(),
            country: Some("Germany".to_string()),
            organization: None,
        });

        assert!(copy.is_enriched());
        assert_eq!(copy.ip_address().as_deref(), Some("192.0.2.1"));
        assert_eq!(copy.country().as_deref(), Some("Germany"));
        assert_eq!(copy.organization(), None);
        assert!(node.enrichment_slot().ptr_eq(&copy.enrichment_slot()));
    }

    #[test]
    fn test_relay_details_display() {
        let details = RelayDetails {
            ip_address: "192.0.2.1".to_string(),
            country: Some("Germany".to_string()),
            organization: Some("Example AS".to_string()),
        };
        assert_eq!(details.to_string(), "192.0.2.1 Germany (Example AS)");
    }
}
