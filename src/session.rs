//! MQTT session lifecycle and state publication.
//!
//! [`SessionManager`] wraps any [`MqttClient`] and owns the connection
//! policy: throttled reconnects, online/offline status with a last will,
//! the retained state payload, and replay of a state that failed to go out.
//!
//! The transport never reconnects by itself. Every attempt goes through
//! [`SessionManager::ensure_connected`], at most once per
//! [`RETRY_INTERVAL_MS`].
//!
//! # Example
//!
//! ```rust
//! use rs_fanctl::{SessionManager, FanSnapshot, DutyScale, MqttConfig, hal::MockMqtt};
//!
//! let cfg = MqttConfig::default().with_enabled(true);
//! let mut session = SessionManager::new(MockMqtt::new(), [0xAA, 0xBB, 0xCC, 0, 1, 2], DutyScale::default());
//! assert_eq!(session.client_id(), "fan-AABBCC000102");
//!
//! // First attempt is immediate and publishes online, then the live state
//! assert!(session.ensure_connected(0, &cfg, FanSnapshot { duty: 512, setpoint: 50 }));
//! let mqtt = session.client();
//! assert_eq!(mqtt.payloads_to("fan/status"), vec!["online"]);
//! assert_eq!(
//!     mqtt.payloads_to("fan/state"),
//!     vec![r#"{"duty":512,"percent":50.0,"setpoint":50}"#],
//! );
//! ```

extern crate alloc;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

use heapless::String as HString;
use log::{debug, info, warn};

use crate::config::{MqttConfig, ShortString};
use crate::duty::DutyScale;
use crate::traits::{ConnectOptions, LastWill, MqttClient, QoS};

/// Minimum time between connect attempts.
pub const RETRY_INTERVAL_MS: u64 = 5_000;

/// Status payload while the session is up.
pub const STATUS_ONLINE: &str = "online";

/// Status payload on clean shutdown and as the last will.
pub const STATUS_OFFLINE: &str = "offline";

/// Capacity of the state JSON buffer.
const STATE_PAYLOAD_LEN: usize = 96;

/// What the fan is doing, for the republish after a reconnect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FanSnapshot {
    /// Active-high duty.
    pub duty: u32,
    /// Current setpoint.
    pub setpoint: u8,
}

/// Connection policy around an [`MqttClient`].
///
/// # Type Parameter
///
/// - `M`: The transport ([`MqttClient`] trait)
pub struct SessionManager<M: MqttClient> {
    client: M,
    client_id: ShortString,
    scale: DutyScale,
    was_connected: bool,
    last_attempt_ms: Option<u64>,
    dirty: Option<u32>,
    link_up: bool,
}

impl<M: MqttClient> SessionManager<M> {
    /// Create a session for the device with hardware address `mac`.
    ///
    /// The link is assumed up until [`set_link_up`](Self::set_link_up) says otherwise.
    pub fn new(client: M, mac: [u8; 6], scale: DutyScale) -> Self {
        Self {
            client,
            client_id: client_id_from_mac(&mac),
            scale,
            was_connected: false,
            last_attempt_ms: None,
            dirty: None,
            link_up: true,
        }
    }

    /// Connect if disconnected and the retry interval has passed.
    ///
    /// Returns whether the session is connected afterwards.
    pub fn ensure_connected(&mut self, now_ms: u64, cfg: &MqttConfig, fan: FanSnapshot) -> bool {
        if !cfg.enabled {
            return false;
        }

        if self.client.is_connected() {
            if !self.was_connected {
                self.was_connected = true;
                info!("MQTT connected");
            }
            return true;
        }

        if let Some(last) = self.last_attempt_ms {
            if now_ms.saturating_sub(last) < RETRY_INTERVAL_MS {
                return false;
            }
        }
        self.last_attempt_ms = Some(now_ms);

        if self.was_connected {
            warn!("MQTT connection lost, retrying");
            self.was_connected = false;
        }

        if !self.link_up {
            debug!("Network down, skipping MQTT connect");
            return false;
        }

        info!(
            "MQTT connecting to {}:{} as {} (user '{}', pass len {})",
            cfg.host,
            cfg.port,
            self.client_id,
            cfg.username,
            cfg.password.len()
        );

        if let Err(e) = self.client.connect(&self.connect_options(cfg)) {
            warn!("MQTT connect failed: {:?}", e);
            return false;
        }

        self.was_connected = true;
        self.publish_status(cfg, STATUS_ONLINE);
        if let Err(e) = self.client.subscribe(&cfg.command_topic, QoS::AtLeastOnce) {
            warn!("MQTT subscribe to {} failed: {:?}", cfg.command_topic, e);
        }
        let duty = self.dirty.unwrap_or(fan.duty);
        self.send_state(cfg, duty, fan.setpoint);
        info!("MQTT connected and subscribed to {}", cfg.command_topic);
        true
    }

    /// Publish the retained state payload.
    ///
    /// While disconnected the value is held as dirty and an inline reconnect
    /// is tried; a successful reconnect delivers it.
    pub fn publish_state(&mut self, now_ms: u64, cfg: &MqttConfig, duty: u32, setpoint: u8) {
        if !cfg.enabled {
            return;
        }

        if !self.client.is_connected() {
            self.dirty = Some(duty);
            self.ensure_connected(now_ms, cfg, FanSnapshot { duty, setpoint });
            return;
        }

        self.send_state(cfg, duty, setpoint);
    }

    /// Publish a retained status string. Only while connected.
    pub fn publish_status(&mut self, cfg: &MqttConfig, status: &str) {
        if !cfg.enabled || !self.client.is_connected() {
            return;
        }
        if let Err(e) = self.client.publish(&cfg.status_topic, status.as_bytes(), true) {
            warn!("MQTT status publish failed: {:?}", e);
        }
    }

    /// Scheduler tick: keep the session alive and collect command payloads.
    pub fn poll(&mut self, now_ms: u64, cfg: &MqttConfig, fan: FanSnapshot) -> Vec<String> {
        let mut commands = Vec::new();

        if !cfg.enabled {
            if self.client.is_connected() {
                info!("MQTT disabled, disconnecting");
                self.client.disconnect();
            }
            self.was_connected = false;
            return commands;
        }

        self.ensure_connected(now_ms, cfg, fan);

        while let Some(msg) = self.client.try_recv() {
            if msg.topic != cfg.command_topic.as_str() {
                debug!("Ignoring message on {}", msg.topic);
                continue;
            }
            match msg.payload_str() {
                Some(text) => commands.push(String::from(text)),
                None => debug!("Dropping non-UTF-8 command payload"),
            }
        }

        commands
    }

    /// Announce offline, disconnect, and restart the retry timer.
    pub fn go_offline(&mut self, now_ms: u64, cfg: &MqttConfig) {
        if self.client.is_connected() {
            self.publish_status(cfg, STATUS_OFFLINE);
            self.client.disconnect();
            info!("MQTT disconnected");
        }
        self.was_connected = false;
        self.last_attempt_ms = Some(now_ms);
    }

    /// Report a network link change.
    pub fn set_link_up(&mut self, up: bool) {
        if self.link_up && !up {
            info!("Network link down");
            self.was_connected = false;
        } else if !self.link_up && up {
            info!("Network link up");
        }
        self.link_up = up;
    }

    /// Whether the transport reports a live connection.
    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Duty waiting to be republished, if the last publish failed.
    pub fn dirty(&self) -> Option<u32> {
        self.dirty
    }

    /// MQTT client identifier.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Timestamp of the last connect attempt.
    pub fn last_attempt_ms(&self) -> Option<u64> {
        self.last_attempt_ms
    }

    /// The transport.
    pub fn client(&self) -> &M {
        &self.client
    }

    /// Mutable access to the transport.
    pub fn client_mut(&mut self) -> &mut M {
        &mut self.client
    }

    fn connect_options(&self, cfg: &MqttConfig) -> ConnectOptions {
        let non_empty = |s: &str| (!s.is_empty()).then(|| String::from(s));
        ConnectOptions {
            client_id: String::from(self.client_id.as_str()),
            host: String::from(cfg.host.as_str()),
            port: cfg.port,
            username: non_empty(cfg.username.as_str()),
            password: non_empty(cfg.password.as_str()),
            keep_alive_secs: cfg.keep_alive_secs,
            connect_timeout_ms: cfg.connect_timeout_ms,
            last_will: Some(LastWill::retained(cfg.status_topic.as_str(), STATUS_OFFLINE)),
        }
    }

    fn send_state(&mut self, cfg: &MqttConfig, duty: u32, setpoint: u8) {
        let payload = state_payload(&self.scale, duty, setpoint);
        match self.client.publish(&cfg.state_topic, payload.as_bytes(), true) {
            Ok(()) => self.dirty = None,
            Err(e) => {
                warn!("MQTT state publish failed: {:?}", e);
                self.dirty = Some(duty);
            }
        }
    }
}

/// `fan-` followed by the six address bytes in upper-case hex.
pub fn client_id_from_mac(mac: &[u8; 6]) -> ShortString {
    let mut id = ShortString::new();
    let _ = id.push_str("fan-");
    for b in mac {
        let _ = write!(id, "{:02X}", b);
    }
    id
}

/// Render the retained state JSON.
///
/// ```
/// use rs_fanctl::{DutyScale, session::state_payload};
///
/// let json = state_payload(&DutyScale::default(), 1023, 100);
/// assert_eq!(json.as_str(), r#"{"duty":1023,"percent":100.0,"setpoint":100}"#);
/// ```
pub fn state_payload(scale: &DutyScale, duty: u32, setpoint: u8) -> HString<STATE_PAYLOAD_LEN> {
    let duty = duty.min(scale.max());
    let mut out = HString::new();
    let _ = write!(
        out,
        "{{\"duty\":{},\"percent\":{:.1},\"setpoint\":{}}}",
        duty,
        scale.duty_to_percent_f32(duty),
        setpoint.min(100)
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockMqtt;

    fn enabled() -> MqttConfig {
        MqttConfig::default().with_enabled(true)
    }

    fn session() -> SessionManager<MockMqtt> {
        SessionManager::new(MockMqtt::new(), [0; 6], DutyScale::default())
    }

    fn fan(duty: u32) -> FanSnapshot {
        FanSnapshot { duty, setpoint: 50 }
    }

    // =========================================================================
    // Payloads
    // =========================================================================

    #[test]
    fn client_id_format() {
        let id = client_id_from_mac(&[0x24, 0x0a, 0xc4, 0x12, 0x34, 0xff]);
        assert_eq!(id.as_str(), "fan-240AC41234FF");
    }

    #[test]
    fn state_payload_one_decimal() {
        let json = state_payload(&DutyScale::default(), 205, 20);
        assert_eq!(json.as_str(), r#"{"duty":205,"percent":20.0,"setpoint":20}"#);

        let json = state_payload(&DutyScale::default(), 100, 15);
        assert_eq!(json.as_str(), r#"{"duty":100,"percent":9.8,"setpoint":15}"#);
    }

    // =========================================================================
    // ensure_connected
    // =========================================================================

    #[test]
    fn disabled_does_nothing() {
        let mut s = session();
        assert!(!s.ensure_connected(0, &MqttConfig::default(), fan(0)));
        assert_eq!(s.client().connect_attempts, 0);
    }

    #[test]
    fn connect_options_carry_will_and_credentials() {
        let mut s = session();
        let cfg = enabled().with_auth("user", "");
        s.ensure_connected(0, &cfg, fan(0));

        let opts = s.client().last_connect.clone().unwrap();
        assert_eq!(opts.client_id, "fan-000000000000");
        assert_eq!(opts.username.as_deref(), Some("user"));
        assert_eq!(opts.password, None);
        assert_eq!(opts.keep_alive_secs, 45);
        let will = opts.last_will.unwrap();
        assert_eq!(will.topic, "fan/status");
        assert_eq!(will.payload, b"offline");
        assert!(will.retain);
        assert_eq!(will.qos, QoS::AtLeastOnce);
    }

    #[test]
    fn connect_sequence() {
        let mut s = session();
        assert!(s.ensure_connected(0, &enabled(), fan(512)));

        let mqtt = s.client();
        let topics: Vec<&str> = mqtt.published.iter().map(|(t, _, _)| t.as_str()).collect();
        assert_eq!(topics, vec!["fan/status", "fan/state"]);
        assert!(mqtt.published.iter().all(|(_, _, retain)| *retain));
        assert_eq!(mqtt.subscriptions, vec![("fan/cmd".to_string(), QoS::AtLeastOnce)]);
    }

    #[test]
    fn retry_throttled() {
        let mut s = session();
        s.client_mut().fail_connect = true;

        assert!(!s.ensure_connected(1_000, &enabled(), fan(0)));
        assert!(!s.ensure_connected(5_999, &enabled(), fan(0)));
        assert_eq!(s.client().connect_attempts, 1);

        assert!(!s.ensure_connected(6_000, &enabled(), fan(0)));
        assert_eq!(s.client().connect_attempts, 2);
    }

    #[test]
    fn link_down_skips_attempt_but_consumes_slot() {
        let mut s = session();
        s.set_link_up(false);
        assert!(!s.ensure_connected(0, &enabled(), fan(0)));
        assert_eq!(s.client().connect_attempts, 0);

        s.set_link_up(true);
        assert!(!s.ensure_connected(100, &enabled(), fan(0)));
        assert!(s.ensure_connected(5_000, &enabled(), fan(0)));
    }

    // =========================================================================
    // publish_state
    // =========================================================================

    #[test]
    fn publish_while_connected() {
        let mut s = session();
        s.ensure_connected(0, &enabled(), fan(0));
        s.publish_state(10, &enabled(), 767, 75);
        assert_eq!(
            s.client().payloads_to("fan/state").last().unwrap(),
            r#"{"duty":767,"percent":75.0,"setpoint":75}"#
        );
        assert_eq!(s.dirty(), None);
    }

    #[test]
    fn failed_publish_marks_dirty_and_replays_once() {
        let mut s = session();
        let cfg = enabled();
        s.ensure_connected(0, &cfg, fan(0));

        s.client_mut().fail_publish = true;
        s.publish_state(10, &cfg, 300, 30);
        assert_eq!(s.dirty(), Some(300));

        // Newer value overwrites
        s.publish_state(20, &cfg, 400, 40);
        assert_eq!(s.dirty(), Some(400));

        s.client_mut().fail_publish = false;
        s.client_mut().drop_connection();
        s.ensure_connected(10_000, &cfg, fan(999));

        let states = s.client().payloads_to("fan/state");
        assert_eq!(states.iter().filter(|p| p.contains("\"duty\":400")).count(), 1);
        assert!(!states.iter().any(|p| p.contains("\"duty\":999")));
        assert_eq!(s.dirty(), None);
    }

    #[test]
    fn publish_while_disconnected_flushes_via_inline_reconnect() {
        let mut s = session();
        s.publish_state(0, &enabled(), 512, 50);

        let states = s.client().payloads_to("fan/state");
        assert_eq!(states.len(), 1);
        assert!(states[0].contains("\"duty\":512"));
        assert_eq!(s.dirty(), None);
    }

    #[test]
    fn publish_while_disconnected_and_throttled_stays_dirty() {
        let mut s = session();
        s.client_mut().fail_connect = true;
        s.publish_state(0, &enabled(), 512, 50);
        s.client_mut().fail_connect = false;
        s.publish_state(100, &enabled(), 600, 60);
        assert_eq!(s.dirty(), Some(600));
        assert_eq!(s.client().connect_attempts, 1);
    }

    #[test]
    fn publish_disabled_is_noop() {
        let mut s = session();
        s.publish_state(0, &MqttConfig::default(), 512, 50);
        assert_eq!(s.dirty(), None);
        assert_eq!(s.client().connect_attempts, 0);
    }

    // =========================================================================
    // poll / go_offline
    // =========================================================================

    #[test]
    fn poll_returns_command_topic_payloads_only() {
        let mut s = session();
        s.ensure_connected(0, &enabled(), fan(0));
        s.client_mut().queue_message("fan/cmd", b"42".to_vec());
        s.client_mut().queue_message("other/topic", b"7".to_vec());
        s.client_mut().queue_message("fan/cmd", vec![0xff]);

        let commands = s.poll(10, &enabled(), fan(0));
        assert_eq!(commands, vec!["42".to_string()]);
    }

    #[test]
    fn poll_disconnects_when_disabled() {
        let mut s = session();
        s.ensure_connected(0, &enabled(), fan(0));
        assert!(s.is_connected());

        s.poll(10, &MqttConfig::default(), fan(0));
        assert!(!s.is_connected());
        assert_eq!(s.client().disconnects, 1);
    }

    #[test]
    fn go_offline_publishes_and_resets_timer() {
        let mut s = session();
        s.ensure_connected(0, &enabled(), fan(0));
        s.go_offline(3_000, &enabled());

        assert_eq!(s.client().payloads_to("fan/status"), vec!["online", "offline"]);
        assert!(!s.is_connected());
        assert_eq!(s.last_attempt_ms(), Some(3_000));
        assert!(!s.ensure_connected(7_999, &enabled(), fan(0)));
        assert!(s.ensure_connected(8_000, &enabled(), fan(0)));
    }
}
