//! Relay metadata lookups against the Onionoo directory.
//!
//! When a circuit is built, the runtime asks a [`RelayInfoFetcher`] to look
//! up the circuit's final relay. The answer (address, country, autonomous
//! system) is written into the relay's [`EnrichmentSlot`] as one snapshot.
//!
//! # Request Contract
//!
//! ```text
//! GET <base_url>?fields=country_name,as_name,or_addresses&lookup=<fingerprint>
//! Connection: close
//!
//! { "relays": [ { "or_addresses": ["192.0.2.1:9001", ...],
//!                 "country_name": "Germany",
//!                 "as_name": "Example AS" } ] }
//! ```
//!
//! Requests go through an HTTP proxy (Tor's local HTTP tunnel by default)
//! so the lookup itself is anonymized.
//!
//! # Retry Policy
//!
//! Up to `max_attempts` attempts. Before each attempt the
//! [`ControlLiveness`] flag is checked; while the control connection is
//! down the attempt is skipped but still counted. A transport error,
//! non-success status, malformed body or empty relay list fails the
//! attempt. Nothing is surfaced beyond a debug log line; exhaustion leaves
//! the relay unenriched.
//!
//! A connection drop in the middle of an attempt shows up as a transport
//! error and is retried like any other. A response that completes after
//! the control connection went away is still stored.
//!
//! [`EnrichmentSlot`]: crate::circuits::EnrichmentSlot

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONNECTION};
use serde::Deserialize;
use tokio::task::JoinHandle;

use crate::circuits::{NodeRecord, RelayDetails};
use crate::config::{LogLevel, RelayLookupConfig};
use crate::error::{Error, Result};
use crate::logger::plog;

const LOOKUP_FIELDS: &str = "country_name,as_name,or_addresses";

/// Shared flag telling background tasks whether the control connection
/// is up.
#[derive(Debug, Clone, Default)]
pub struct ControlLiveness(Arc<AtomicBool>);

impl ControlLiveness {
    /// Creates a flag in the disconnected state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the connection as up or down.
    pub fn set(&self, live: bool) {
        self.0.store(live, Ordering::SeqCst);
    }

    /// Returns whether the connection is up.
    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    #[serde(default)]
    relays: Vec<RelayEntry>,
}

#[derive(Debug, Deserialize)]
struct RelayEntry {
    #[serde(default)]
    or_addresses: Vec<String>,
    country_name: Option<String>,
    as_name: Option<String>,
}

/// Returns the address part of an `ip:port` or `[ipv6]:port` string.
fn host_part(address: &str) -> &str {
    let host = match address.rsplit_once(':') {
        Some((host, _)) if address.starts_with('[') || !host.contains(':') => host,
        _ => address,
    };
    host.trim_start_matches('[').trim_end_matches(']')
}

impl DetailsResponse {
    fn into_details(self) -> Result<RelayDetails> {
        let relay = self
            .relays
            .into_iter()
            .next()
            .ok_or_else(|| Error::Lookup("no relays in response".to_string()))?;
        let address = relay
            .or_addresses
            .first()
            .ok_or_else(|| Error::Lookup("relay has no OR addresses".to_string()))?;

        Ok(RelayDetails {
            ip_address: host_part(address).to_string(),
            country: relay.country_name,
            organization: relay.as_name,
        })
    }
}

/// Proxy-routed Onionoo client with bounded retries.
///
/// # Example
///
/// ```rust,no_run
/// use circmon_rs::circuits::{CircuitStatus, NodeRecord, PathHop};
/// use circmon_rs::config::RelayLookupConfig;
/// use circmon_rs::relay_info::{ControlLiveness, RelayInfoFetcher};
///
/// # async fn example() -> circmon_rs::Result<()> {
/// let fetcher = RelayInfoFetcher::new(&RelayLookupConfig::default())?;
/// let liveness = ControlLiveness::new();
/// liveness.set(true);
///
/// let hop = PathHop::parse("$9695DFC35FFEB861329B9F1AB04C46397020CE31~moria1").unwrap();
/// let node = NodeRecord::from_hop(&hop, CircuitStatus::Built);
/// if fetcher.enrich(&node, &liveness).await {
///     println!("{:?}", node.details());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RelayInfoFetcher {
    client: reqwest::Client,
    base_url: String,
    max_attempts: u32,
}

impl RelayInfoFetcher {
    /// Builds a fetcher from lookup settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the proxy URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(settings: &RelayLookupConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("close"));

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .read_timeout(Duration::from_secs(settings.read_timeout_secs));

        builder = if settings.proxy.is_empty() {
            builder.no_proxy()
        } else {
            builder.proxy(reqwest::Proxy::all(settings.proxy.as_str())?)
        };

        Ok(Self {
            client: builder.build()?,
            base_url: settings.base_url.clone(),
            max_attempts: settings.max_attempts,
        })
    }

    /// Maximum number of attempts per lookup.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Builds the lookup URL for a relay fingerprint.
    pub fn lookup_url(&self, relay_id: &str) -> String {
        format!(
            "{}?fields={}&lookup={}",
            self.base_url, LOOKUP_FIELDS, relay_id
        )
    }

    /// Performs a single lookup attempt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on transport failures, non-success statuses
    /// and undecodable bodies, and [`Error::Lookup`] when the directory
    /// knows no usable relay for the fingerprint.
    pub async fn fetch_details(&self, relay_id: &str) -> Result<RelayDetails> {
        let response = self
            .client
            .get(self.lookup_url(relay_id))
            .send()
            .await?
            .error_for_status()?;
        let body: DetailsResponse = response.json().await?;
        body.into_details()
    }

    /// Looks up `node` and stores the result in its enrichment slot.
    ///
    /// Returns `true` once a lookup succeeded, `false` when every attempt
    /// was skipped or failed.
    pub async fn enrich(&self, node: &NodeRecord, liveness: &ControlLiveness) -> bool {
        for attempt in 1..=self.max_attempts {
            if !liveness.is_live() {
                plog(
                    LogLevel::Debug,
                    &format!(
                        "No control connection, skipping lookup of {} (attempt {}/{})",
                        node.id, attempt, self.max_attempts
                    ),
                );
                continue;
            }

            match self.fetch_details(&node.id).await {
                Ok(details) => {
                    plog(LogLevel::Notice, &details.to_string());
                    node.enrichment_slot().set(details);
                    return true;
                }
                Err(e) => {
                    plog(
                        LogLevel::Debug,
                        &format!("Error getting node details from onionoo: {}", e),
                    );
                }
            }
        }
        false
    }

    /// Runs [`enrich`](Self::enrich) on a background task.
    pub fn spawn(&self, node: NodeRecord, liveness: ControlLiveness) -> JoinHandle<bool> {
        let fetcher = self.clone();
        tokio::spawn(async move { fetcher.enrich(&node, &liveness).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuits::{CircuitStatus, PathHop};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FINGERPRINT: &str = "9695DFC35FFEB861329B9F1AB04C46397020CE31";

    fn fetcher(server: &MockServer) -> RelayInfoFetcher {
        let settings = RelayLookupConfig {
            base_url: format!("{}/details", server.uri()),
            proxy: String::new(),
            connect_timeout_secs: 5,
            read_timeout_secs: 5,
            ..RelayLookupConfig::default()
        };
        RelayInfoFetcher::new(&settings).unwrap()
    }

    fn node() -> NodeRecord {
        let hop = PathHop::parse(&format!("${}~moria1", FINGERPRINT)).unwrap();
        NodeRecord::from_hop(&hop, CircuitStatus::Built)
    }

    fn live() -> ControlLiveness {
        let liveness = ControlLiveness::new();
        liveness.set(true);
        liveness
    }

    fn relay_body() -> serde_json::Value {
        serde_json::json!({
            "relays": [{
                "or_addresses": ["192.0.2.10:9001", "[2001:db8::10]:9001"],
                "country_name": "Germany",
                "as_name": "Example Hosting"
            }]
        })
    }

    #[test]
    fn test_host_part() {
        assert_eq!(host_part("192.0.2.1:9001"), "192.0.2.1");
        assert_eq!(host_part("[2001:db8::1]:443"), "2001:db8::1");
        assert_eq!(host_part("192.0.2.1"), "192.0.2.1");
        assert_eq!(host_part("2001:db8::1"), "2001:db8::1");
    }

    #[test]
    fn test_lookup_url() {
        let f = RelayInfoFetcher::new(&RelayLookupConfig {
            proxy: String::new(),
            ..RelayLookupConfig::default()
        })
        .unwrap();
        assert_eq!(
            f.lookup_url("ABCD"),
            "https://onionoo.torproject.org/details?fields=country_name,as_name,or_addresses&lookup=ABCD"
        );
        assert_eq!(f.max_attempts(), 3);
    }

    #[test]
    fn test_invalid_proxy_rejected() {
        let settings = RelayLookupConfig {
            proxy: "http://[::1".to_string(),
            ..RelayLookupConfig::default()
        };
        assert!(matches!(
            RelayInfoFetcher::new(&settings),
            Err(Error::Http(_))
        ));
    }

    #[tokio::test]
    async fn test_enrich_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/details"))
            .and(query_param("lookup", FINGERPRINT))
            .and(query_param("fields", LOOKUP_FIELDS))
            .respond_with(ResponseTemplate::new(200).set_body_json(relay_body()))
            .expect(1)
            .mount(&server)
            .await;

        let node = node();
        assert!(fetcher(&server).enrich(&node, &live()).await);

        let details = node.details().unwrap();
        assert_eq!(details.ip_address, "192.0.2.10");
        assert_eq!(details.country.as_deref(), Some("Germany"));
        assert_eq!(details.organization.as_deref(), Some("Example Hosting"));
    }

    #[tokio::test]
    async fn test_enrich_ipv6_first_address() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "relays": [{ "or_addresses": ["[2001:db8::7]:443"] }]
            })))
            .mount(&server)
            .await;

        let node = node();
        assert!(fetcher(&server).enrich(&node, &live()).await);
        assert_eq!(node.ip_address().as_deref(), Some("2001:db8::7"));
        assert_eq!(node.country(), None);
        assert_eq!(node.organization(), None);
    }

    #[tokio::test]
    async fn test_retries_after_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(relay_body()))
            .expect(1)
            .mount(&server)
            .await;

        let node = node();
        assert!(fetcher(&server).enrich(&node, &live()).await);
        assert!(node.is_enriched());
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "relays": []
            })))
            .expect(3)
            .mount(&server)
            .await;

        let node = node();
        assert!(!fetcher(&server).enrich(&node, &live()).await);
        assert!(!node.is_enriched());
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_failed_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .expect(3)
            .mount(&server)
            .await;

        let node = node();
        assert!(!fetcher(&server).enrich(&node, &live()).await);
    }

    #[tokio::test]
    async fn test_relay_without_addresses_is_a_failed_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "relays": [{ "or_addresses": [], "country_name": "Germany" }]
            })))
            .mount(&server)
            .await;

        let result = fetcher(&server).fetch_details(FINGERPRINT).await;
        assert!(matches!(result, Err(Error::Lookup(_))));
    }

    #[tokio::test]
    async fn test_skips_attempts_without_control_connection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(relay_body()))
            .expect(0)
            .mount(&server)
            .await;

        let node = node();
        assert!(!fetcher(&server).enrich(&node, &ControlLiveness::new()).await);
        assert!(!node.is_enriched());
    }

    #[tokio::test]
    async fn test_spawned_lookup_fills_shared_slot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(relay_body()))
            .mount(&server)
            .await;

        let node = node();
        let observer = node.clone();
        let handle = fetcher(&server).spawn(node, live());
        assert!(handle.await.unwrap());
        assert_eq!(observer.ip_address().as_deref(), Some("192.0.2.10"));
    }
}
