//! Tor controller interaction and the main application loop.
//!
//! This module connects to Tor's control port, authenticates, subscribes to
//! the events the [`EventProcessor`] understands and feeds them through it
//! one at a time. The resulting [`Effect`]s are applied here: host effects
//! go to an [`EffectSink`], wake-lock re-evaluation is answered from the
//! registry, and relay lookups are spawned onto the tokio runtime.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                          control_loop                              │
//! │                                                                    │
//! │  ┌──────────────┐   ParsedEvent   ┌──────────────┐                 │
//! │  │  Tor Control │ ──────────────▶ │  to_tor_event │                │
//! │  │    Socket    │                 └──────┬───────┘                 │
//! │  └──────────────┘                        │ TorEvent                │
//! │         ▲                                ▼                         │
//! │         │                       ┌────────────────┐                 │
//! │  GETINFO circuit-status ──────▶ │ EventProcessor │                 │
//! │  (hidden-service resync)        └───────┬────────┘                 │
//! │                                         │ Vec<Effect>              │
//! │                                         ▼                          │
//! │                              ┌─────────────────────┐               │
//! │                              │ AppState::apply_    │               │
//! │                              │      effects        │               │
//! │                              └──┬───────┬───────┬──┘               │
//! │                                 │       │       │                  │
//! │                      EffectSink ◄┘       │       └► tokio::spawn    │
//! │                                  wake_lock_required  RelayInfoFetcher│
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Main Loop Flow
//!
//! ```text
//!   Connect (socket → port → /run/tor/control → 127.0.0.1:9051)
//!      │
//!      ▼
//!   Authenticate (none/cookie → password → prompt)
//!      │
//!      ▼
//!   Mark control connection live, forget previous circuits
//!      │
//!      ▼
//!   SETEVENTS CIRC CIRC_MINOR STREAM ORCONN BW NOTICE WARN ERR [INFO DEBUG]
//!      │
//!      ▼
//!   Hidden services? ── yes ──▶ GETINFO circuit-status → init_circuit_status
//!      │
//!      ▼
//!   recv_event loop ── error ──▶ mark not live, return "closed"
//! ```
//!
//! [`run_main`] wraps the loop with CTRL+C handling and reconnection.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stem_rs::controller::Controller;
use stem_rs::events::ParsedEvent;
use stem_rs::EventType;

use crate::api::SecurePassword;
use crate::config::{Config, LogLevel};
use crate::effects::{Effect, EffectSink, TracingSink};
use crate::error::{Error, Result};
use crate::events::{EventProcessor, TorEvent};
use crate::logger::plog;
use crate::relay_info::{ControlLiveness, RelayInfoFetcher};

/// Version of circmon-rs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Authenticates with Tor using any available method.
///
/// Tries no-auth/cookie, then the supplied password. If Tor wants a
/// password and none was supplied, prompts for one interactively.
///
/// # Errors
///
/// Returns [`Error::Control`] if authentication fails.
pub async fn authenticate_any(controller: &mut Controller, password: Option<&str>) -> Result<()> {
    match controller.authenticate(password).await {
        Ok(()) => {}
        Err(stem_rs::Error::Authentication(stem_rs::AuthError::MissingPassword)) => {
            let passwd = SecurePassword::new(prompt_password()?);
            controller.authenticate(Some(passwd.as_str())).await?;
        }
        Err(e) => return Err(Error::Control(e)),
    }

    let version = controller.get_version().await?;
    plog(
        LogLevel::Notice,
        &format!("circmon-rs {} connected to Tor {} using stem-rs", VERSION, version),
    );
    Ok(())
}

fn prompt_password() -> Result<String> {
    eprint!("Controller password: ");
    let mut password = String::new();
    std::io::stdin()
        .read_line(&mut password)
        .map_err(Error::Io)?;
    Ok(password.trim().to_string())
}

/// Connects to Tor's control port.
///
/// Attempts connection in this order:
/// 1. Unix socket if configured
/// 2. TCP port if configured
/// 3. Default Unix socket /run/tor/control
/// 4. Default TCP port 9051 on `control_ip`
async fn connect_to_tor(config: &Config) -> Result<Controller> {
    if let Some(ref socket_path) = config.control_socket {
        let controller = Controller::from_socket_file(socket_path.as_path()).await?;
        plog(
            LogLevel::Notice,
            &format!("Connected to Tor via socket {}", socket_path.display()),
        );
        return Ok(controller);
    }

    if let Some(port) = config.control_port {
        let addr = format!("{}:{}", config.control_ip, port);
        let controller = Controller::from_port(
            addr.parse()
                .map_err(|e| Error::Config(format!("Invalid control address: {}", e)))?,
        )
        .await?;
        plog(
            LogLevel::Notice,
            &format!("Connected to Tor via control port {}", addr),
        );
        return Ok(controller);
    }

    if let Ok(controller) = Controller::from_socket_file(Path::new("/run/tor/control")).await {
        plog(
            LogLevel::Notice,
            "Connected to Tor via /run/tor/control socket",
        );
        return Ok(controller);
    }

    let addr = format!("{}:9051", config.control_ip);
    let controller = Controller::from_port(
        addr.parse()
            .map_err(|e| Error::Config(format!("Invalid control address: {}", e)))?,
    )
    .await?;
    plog(
        LogLevel::Notice,
        &format!("Connected to Tor via {} control port", addr),
    );
    Ok(controller)
}

/// Event types to subscribe to.
///
/// Tor's own log events are requested down to the configured log level so
/// that lines the logger would drop are not sent over the socket.
fn get_event_types(config: &Config) -> Vec<EventType> {
    let mut events = vec![
        EventType::Circ,
        EventType::CircMinor,
        EventType::Stream,
        EventType::OrConn,
        EventType::Bw,
        EventType::Notice,
        EventType::Warn,
        EventType::Err,
    ];
    if config.loglevel <= LogLevel::Info {
        events.push(EventType::Info);
    }
    if config.loglevel <= LogLevel::Debug {
        events.push(EventType::Debug);
    }
    events
}

/// Rebuilds Tor's `$FINGERPRINT~nickname` path syntax.
fn path_string(path: &[(String, Option<String>)]) -> String {
    path.iter()
        .map(|(fp, nick)| match nick {
            Some(nick) => format!("${}~{}", fp, nick),
            None => format!("${}", fp),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Converts a stem-rs event into a [`TorEvent`].
///
/// stem-rs enums render their Tor keyword through `Display`. Returns `None`
/// for event kinds this crate does not subscribe to.
fn to_tor_event(event: &ParsedEvent) -> Option<TorEvent> {
    match event {
        ParsedEvent::Circuit(e) => Some(TorEvent::CircuitStatus {
            status: e.status.to_string(),
            circuit_id: e.id.0.clone(),
            path: path_string(&e.path),
            purpose: e
                .purpose
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
        }),
        ParsedEvent::Stream(e) => Some(TorEvent::StreamStatus {
            status: e.status.to_string(),
            stream_id: e.id.0.clone(),
            target: format!("{}:{}", e.target_host, e.target_port),
        }),
        ParsedEvent::OrConn(e) => Some(TorEvent::OrConnStatus {
            status: e.status.to_string(),
            or_name: e.target.clone(),
        }),
        ParsedEvent::Bandwidth(e) => Some(TorEvent::Bandwidth {
            read: e.read,
            written: e.written,
        }),
        ParsedEvent::Log(e) => {
            let severity = e.runlevel.to_string().parse().ok()?;
            Some(TorEvent::Message {
                severity,
                text: e.message.clone(),
            })
        }
        ParsedEvent::Unknown {
            event_type,
            content,
        } => Some(TorEvent::parse_raw(event_type, content)),
        _ => None,
    }
}

/// Runtime state shared across reconnections.
///
/// The processor lives as long as the process. Its bootstrap state and
/// bandwidth totals carry over between connections; the circuit and
/// built-relay maps are dropped at the start of each one, since Tor may
/// have closed circuits in the gap and reuses circuit ids after a restart.
pub struct AppState {
    /// Event state machine.
    pub processor: EventProcessor,
    /// Relay lookup client, if lookups are enabled.
    pub fetcher: Option<RelayInfoFetcher>,
    /// Whether the control connection is currently up.
    pub liveness: ControlLiveness,
    /// Host effect consumer.
    pub sink: Box<dyn EffectSink>,
    /// Application configuration, without the control password.
    pub config: Config,
    password: Option<SecurePassword>,
}

impl AppState {
    /// Creates the runtime state from a validated configuration.
    ///
    /// The control password is moved out of `config` into a
    /// [`SecurePassword`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown number locale and
    /// [`Error::Http`] if the lookup client cannot be built.
    pub fn new(mut config: Config, sink: Box<dyn EffectSink>) -> Result<Self> {
        let password = config.control_pass.take().map(SecurePassword::new);
        let processor = EventProcessor::new(config.rate_formatter()?, config.host_policy());
        let fetcher = if config.relay_lookup.enabled {
            Some(RelayInfoFetcher::new(&config.relay_lookup)?)
        } else {
            None
        };

        Ok(Self {
            processor,
            fetcher,
            liveness: ControlLiveness::new(),
            sink,
            config,
            password,
        })
    }

    /// Runs one event through the processor and applies its effects.
    pub fn handle_event(&mut self, event: TorEvent) {
        let effects = self.processor.process(event);
        self.apply_effects(effects);
    }

    /// Starts a new control session.
    ///
    /// Forgets the circuits seen on the previous connection. Lookups still
    /// in flight for them finish into slots nothing reads any more.
    pub fn begin_session(&mut self) {
        let dropped = self.processor.reset_circuits();
        if dropped > 0 {
            plog(
                LogLevel::Info,
                &format!("Dropped {} circuits from the previous connection", dropped),
            );
        }
    }

    /// Rebuilds the hidden-service index from a `circuit-status` dump.
    pub fn resync_circuits(&mut self, raw: &str) {
        let effects = self.processor.init_circuit_status(raw);
        self.apply_effects(effects);
    }

    /// Applies effects in order.
    ///
    /// Must be called from within a tokio runtime when effects may contain
    /// [`Effect::LookupRelay`].
    pub fn apply_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Log { level, message } => self.sink.log(level, &message),
                Effect::Notify { text, icon } => self.sink.notify(&text, icon),
                Effect::WakeLock(hold) => self.sink.wake_lock(hold),
                Effect::NetworkReady => self.sink.network_ready(),
                Effect::ReevaluateWakeLock => {
                    let required = self.processor.wake_lock_required();
                    self.sink.wake_lock(required);
                }
                Effect::Bandwidth(sample) => self.sink.bandwidth(&sample),
                Effect::LookupRelay { circuit_id, node } => {
                    if let Some(ref fetcher) = self.fetcher {
                        plog(
                            LogLevel::Debug,
                            &format!("Looking up relay {} for circuit {}", node.id, circuit_id),
                        );
                        fetcher.spawn(node, self.liveness.clone());
                    }
                }
            }
        }
    }
}

/// Main control loop for event processing.
///
/// Connects, authenticates, subscribes and processes events until the
/// connection is lost.
///
/// # Returns
///
/// - `"closed"` - Connection was closed after a successful setup
/// - `"failed: <reason>"` - Connection or setup failed
pub async fn control_loop(state: &mut AppState) -> String {
    let mut controller = match connect_to_tor(&state.config).await {
        Ok(c) => c,
        Err(e) => return format!("failed: {}", e),
    };

    let password = state.password.as_ref().map(SecurePassword::as_str);
    if let Err(e) = authenticate_any(&mut controller, password).await {
        return format!("failed: {}", e);
    }

    state.liveness.set(true);
    state.begin_session();

    let event_types = get_event_types(&state.config);
    if let Err(e) = controller.set_events(&event_types).await {
        state.liveness.set(false);
        return format!("failed: {}", e);
    }

    if state.processor.policy().hidden_services {
        match controller.get_info("circuit-status").await {
            Ok(raw) => state.resync_circuits(&raw),
            Err(e) => plog(
                LogLevel::Warn,
                &format!("Failed to read circuit-status: {}", e),
            ),
        }
    }

    loop {
        match controller.recv_event().await {
            Ok(event) => match to_tor_event(&event) {
                Some(tor_event) => state.handle_event(tor_event),
                None => plog(LogLevel::Debug, &format!("Ignoring event: {:?}", event)),
            },
            Err(e) => {
                plog(LogLevel::Debug, &format!("Event receive error: {}", e));
                state.liveness.set(false);
                return "closed".to_string();
            }
        }
    }
}

/// Runs the control loop with reconnection until CTRL+C or the retry
/// limit.
///
/// # Errors
///
/// Returns [`Error::Config`] if no connection ever succeeded.
pub async fn run_state(state: &mut AppState) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            plog(LogLevel::Notice, "Got CTRL+C. Exiting.");
            shutdown_clone.store(true, Ordering::SeqCst);
        }
    });

    let retry_limit = state.config.retry_limit;
    let mut reconnects = 0u32;
    let mut connected = false;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        if let Some(limit) = retry_limit {
            if reconnects >= limit {
                break;
            }
        }

        let result = control_loop(state).await;

        if result == "closed" {
            connected = true;
        }

        if result == "closed" || reconnects.is_multiple_of(10) {
            let level = if connected {
                LogLevel::Warn
            } else {
                LogLevel::Notice
            };
            plog(
                level,
                &format!("Tor daemon connection {}. Trying again...", result),
            );
        }

        reconnects += 1;

        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    if !connected {
        return Err(Error::Config("Failed to connect to Tor".to_string()));
    }

    Ok(())
}

/// Runs the application with the default [`TracingSink`].
///
/// # Errors
///
/// Returns an error if the runtime state cannot be built or no connection
/// ever succeeded.
///
/// # Example
///
/// ```rust,no_run
/// use circmon_rs::config::Config;
/// use circmon_rs::control::run_main;
///
/// #[tokio::main]
/// async fn main() -> Result<(), circmon_rs::error::Error> {
///     run_main(Config::default()).await
/// }
/// ```
pub async fn run_main(config: Config) -> Result<()> {
    let mut state = AppState::new(config, Box::new(TracingSink::new()))?;
    run_state(&mut state).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{BandwidthSample, NotificationIcon};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recorded {
        logs: Vec<(LogLevel, String)>,
        notifications: Vec<(String, NotificationIcon)>,
        wake_locks: Vec<bool>,
        ready: usize,
        samples: Vec<BandwidthSample>,
    }

    #[derive(Clone, Default)]
    struct RecordingSink(Arc<Mutex<Recorded>>);

    impl EffectSink for RecordingSink {
        fn log(&mut self, level: LogLevel, message: &str) {
            self.0.lock().unwrap().logs.push((level, message.to_string()));
        }
        fn notify(&mut self, text: &str, icon: NotificationIcon) {
            self.0
                .lock()
                .unwrap()
                .notifications
                .push((text.to_string(), icon));
        }
        fn wake_lock(&mut self, hold: bool) {
            self.0.lock().unwrap().wake_locks.push(hold);
        }
        fn network_ready(&mut self) {
            self.0.lock().unwrap().ready += 1;
        }
        fn bandwidth(&mut self, sample: &BandwidthSample) {
            self.0.lock().unwrap().samples.push(*sample);
        }
    }

    fn state_with(config: Config) -> (AppState, RecordingSink) {
        let sink = RecordingSink::default();
        let state = AppState::new(config, Box::new(sink.clone())).unwrap();
        (state, sink)
    }

    fn convert(kind: &str, content: &str) -> Option<TorEvent> {
        to_tor_event(&ParsedEvent::parse(kind, content, None).unwrap())
    }

    #[test]
    fn test_subscribed_events_convert() {
        assert_eq!(
            convert(
                "CIRC",
                "7 BUILT $AAAA~alpha,$BBBB=beta BUILD_FLAGS=IS_INTERNAL PURPOSE=HS_SERVICE_INTRO"
            ),
            Some(TorEvent::CircuitStatus {
                status: "BUILT".to_string(),
                circuit_id: "7".to_string(),
                path: "$AAAA~alpha,$BBBB~beta".to_string(),
                purpose: "HS_SERVICE_INTRO".to_string(),
            })
        );
        assert_eq!(
            convert(
                "CIRC_MINOR",
                "7 PURPOSE_CHANGED $AAAA~alpha PURPOSE=HS_SERVICE_INTRO OLD_PURPOSE=HS_VANGUARDS"
            ),
            Some(TorEvent::CircuitMinorStatus {
                event: "PURPOSE_CHANGED".to_string(),
                circuit_id: "7".to_string(),
                purpose: "HS_SERVICE_INTRO".to_string(),
            })
        );
        assert_eq!(
            convert("STREAM", "12 SUCCEEDED 5 example.com:443"),
            Some(TorEvent::StreamStatus {
                status: "SUCCEEDED".to_string(),
                stream_id: "12".to_string(),
                target: "example.com:443".to_string(),
            })
        );
        assert_eq!(
            convert(
                "ORCONN",
                "$A1130635A0CDA6F60C276FBF6994EFBD4ECADAB1~tama CLOSED REASON=DONE"
            ),
            Some(TorEvent::OrConnStatus {
                status: "CLOSED".to_string(),
                or_name: "$A1130635A0CDA6F60C276FBF6994EFBD4ECADAB1~tama".to_string(),
            })
        );
        assert_eq!(
            convert("BW", "1024 2048"),
            Some(TorEvent::Bandwidth {
                read: 1024,
                written: 2048
            })
        );
        assert_eq!(
            convert("ERR", "something broke"),
            Some(TorEvent::Message {
                severity: LogLevel::Error,
                text: "something broke".to_string(),
            })
        );
        assert_eq!(convert("SIGNAL", "RELOAD"), None);
    }

    #[test]
    fn test_launched_circuit_keeps_empty_path() {
        assert_eq!(
            convert("CIRC", "3 LAUNCHED BUILD_FLAGS=NEED_CAPACITY PURPOSE=GENERAL"),
            Some(TorEvent::CircuitStatus {
                status: "LAUNCHED".to_string(),
                circuit_id: "3".to_string(),
                path: String::new(),
                purpose: "GENERAL".to_string(),
            })
        );
    }

    #[test]
    fn test_path_string() {
        let path = vec![
            ("AAAA".to_string(), Some("alpha".to_string())),
            ("BBBB".to_string(), None),
        ];
        assert_eq!(path_string(&path), "$AAAA~alpha,$BBBB");
        assert_eq!(path_string(&[]), "");
    }

    #[test]
    fn test_event_types_follow_loglevel() {
        let has = |events: &[EventType], wanted: EventType| {
            events
                .iter()
                .any(|e| std::mem::discriminant(e) == std::mem::discriminant(&wanted))
        };

        let mut config = Config::default();
        let events = get_event_types(&config);
        assert!(has(&events, EventType::Circ));
        assert!(has(&events, EventType::CircMinor));
        assert!(!has(&events, EventType::Debug));

        config.loglevel = LogLevel::Debug;
        let events = get_event_types(&config);
        assert!(has(&events, EventType::Debug));
        assert!(has(&events, EventType::Info));
    }

    #[test]
    fn test_password_moved_out_of_config() {
        let mut config = Config::default();
        config.control_pass = Some("hunter2".to_string());
        let (state, _) = state_with(config);
        assert!(state.config.control_pass.is_none());
        assert_eq!(state.password.as_ref().map(|p| p.as_str()), Some("hunter2"));
    }

    #[test]
    fn test_effects_reach_sink() {
        let mut config = Config::default();
        config.expanded_notifications = false;
        let (mut state, sink) = state_with(config);

        state.handle_event(TorEvent::parse_raw("CIRC", "1 BUILT $AA~a,$BB~b PURPOSE=GENERAL"));
        state.handle_event(TorEvent::parse_raw("BW", "10 20"));
        state.handle_event(TorEvent::WorkStatus(true));

        let recorded = sink.0.lock().unwrap();
        assert_eq!(recorded.ready, 1);
        assert!(recorded
            .logs
            .contains(&(LogLevel::Notice, "Circuit (1) [GENERAL] BUILT: a > b".to_string())));
        assert_eq!(recorded.samples.len(), 1);
        assert_eq!(recorded.wake_locks, vec![true]);
        assert!(recorded.notifications.is_empty());
    }

    #[test]
    fn test_reevaluate_wake_lock_uses_registry() {
        let mut config = Config::default();
        config.hidden_services = true;
        config.expanded_notifications = false;
        let (mut state, sink) = state_with(config);

        state.handle_event(TorEvent::parse_raw("CIRC", "3 BUILT $AA~a PURPOSE=HS_VANGUARDS"));
        state.handle_event(TorEvent::parse_raw(
            "CIRC_MINOR",
            "3 PURPOSE_CHANGED $AA~a PURPOSE=HS_SERVICE_INTRO",
        ));
        state.handle_event(TorEvent::parse_raw("CIRC", "3 CLOSED $AA~a PURPOSE=HS_SERVICE_INTRO"));

        assert_eq!(sink.0.lock().unwrap().wake_locks, vec![true, false, true]);
    }

    #[test]
    fn test_resync_sets_wake_lock() {
        let mut config = Config::default();
        config.hidden_services = true;
        let (mut state, sink) = state_with(config);

        state.resync_circuits("5 BUILT $AA~a PURPOSE=HS_SERVICE_INTRO\r\n");
        assert_eq!(sink.0.lock().unwrap().wake_locks, vec![false]);
    }

    #[tokio::test]
    async fn test_lookup_skipped_while_disconnected() {
        let mut config = Config::default();
        config.relay_lookup.proxy = String::new();
        config.relay_lookup.base_url = "http://127.0.0.1:9/details".to_string();
        let (mut state, _) = state_with(config);

        state.handle_event(TorEvent::parse_raw("CIRC", "1 BUILT $AA~a PURPOSE=GENERAL"));
        let node = state.processor.registry().built_node("1").cloned().unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!node.is_enriched());
    }

    #[test]
    fn test_new_session_forgets_previous_circuits() {
        let mut config = Config::default();
        config.hidden_services = true;
        config.relay_lookup.enabled = false;
        let (mut state, sink) = state_with(config);

        state.handle_event(TorEvent::parse_raw("CIRC", "5 BUILT $AA~a PURPOSE=GENERAL"));
        assert!(state.processor.registry().built_node("5").is_some());

        // Daemon restarted: circuit 5 is gone and its id gets reused.
        state.begin_session();
        state.resync_circuits("");
        assert!(state.processor.registry().circuit("5").is_none());
        assert!(state.processor.registry().built_node("5").is_none());

        state.handle_event(TorEvent::parse_raw("CIRC", "5 LAUNCHED PURPOSE=HS_SERVICE_INTRO"));
        state.handle_event(TorEvent::parse_raw("CIRC", "5 EXTENDED $BB~b PURPOSE=HS_SERVICE_INTRO"));
        state.handle_event(TorEvent::parse_raw("CIRC", "5 BUILT $BB~b PURPOSE=HS_SERVICE_INTRO"));

        let registry = state.processor.registry();
        assert_eq!(registry.circuit("5").map(|c| c.status), Some(crate::circuits::CircuitStatus::Built));
        assert!(registry.has_built_hidden_service_circuits());
        assert_eq!(registry.built_node("5").map(|n| n.id.as_str()), Some("BB"));
        assert!(!state.processor.wake_lock_required());
        assert_eq!(sink.0.lock().unwrap().wake_locks.last(), Some(&false));

        // Bootstrap state survives the reconnect.
        assert_eq!(sink.0.lock().unwrap().ready, 1);
    }

    #[test]
    fn test_lookups_disabled() {
        let mut config = Config::default();
        config.relay_lookup.enabled = false;
        let (mut state, _) = state_with(config);
        assert!(state.fetcher.is_none());

        // No runtime needed: the lookup effect is dropped.
        state.handle_event(TorEvent::parse_raw("CIRC", "1 BUILT $AA~a PURPOSE=GENERAL"));
        assert!(state.processor.registry().built_node("1").is_some());
    }
}
