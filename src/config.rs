//! Persisted settings for the fan controller.
//!
//! Uses `heapless::String` for `no_std` compatibility while remaining
//! ergonomic to use on desktop with `std`.
//!
//! [`Config`] is the in-memory model. [`ConfigStore`] owns it and mirrors it
//! to a [`KeyValueStore`] (NVS on the ESP32). External string fields coming
//! from a provisioning form are merged with [`ConfigStore::update_from_fields`],
//! which coerces bad values to safe defaults instead of rejecting them.
//!
//! # Example
//!
//! ```rust
//! use rs_fanctl::config::{Config, FanConfig, MqttConfig};
//!
//! // Use defaults
//! let config = Config::default();
//! assert!(!config.mqtt.enabled);
//!
//! // Or customize
//! let config = Config::default()
//!     .with_mqtt(MqttConfig::default().with_host("192.168.1.100").with_enabled(true))
//!     .with_fan(FanConfig::default().with_default_speed(30));
//! ```

extern crate alloc;
use alloc::string::{String, ToString};

use heapless::String as HString;
use log::{info, warn};

use crate::command::parse_leading_int;
use crate::duty::raise_to_min_run;
use crate::traits::KeyValueStore;

/// Maximum length for short config strings (hostnames, credentials)
pub const MAX_SHORT_STRING: usize = 64;

/// Maximum length for longer config strings (topics)
pub const MAX_LONG_STRING: usize = 128;

/// Type alias for short config strings
pub type ShortString = HString<MAX_SHORT_STRING>;

/// Type alias for longer config strings
pub type LongString = HString<MAX_LONG_STRING>;

/// Broker port used when the field is empty or invalid.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// NVS namespace holding every persisted key.
pub const NVS_NAMESPACE: &str = "fan-control";

/// Storage keys.
pub mod keys {
    /// MQTT master toggle.
    pub const MQTT_ENABLED: &str = "mqtt_enabled";
    /// Broker host.
    pub const MQTT_HOST: &str = "mqtt_host";
    /// Broker port.
    pub const MQTT_PORT: &str = "mqtt_port";
    /// Broker username.
    pub const MQTT_USER: &str = "mqtt_user";
    /// Broker password.
    pub const MQTT_PASS: &str = "mqtt_pass";
    /// Command topic.
    pub const CMD_TOPIC: &str = "cmd_topic";
    /// State topic.
    pub const STATE_TOPIC: &str = "state_topic";
    /// Status topic.
    pub const STATUS_TOPIC: &str = "status_topic";
    /// Power-on speed.
    pub const FAN_DEFAULT_SPEED: &str = "fan_def_spd";
    /// Power-on enable flag.
    pub const FAN_DEFAULT_ON: &str = "fan_def_on";
}

// ============================================================================
// Helper for creating heapless strings
// ============================================================================

/// Longest prefix of `s` that fits in `cap` bytes without splitting a char.
fn fit_prefix(s: &str, cap: usize) -> &str {
    if s.len() <= cap {
        return s;
    }
    let mut end = cap;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Create a ShortString from a &str, truncating if too long
pub fn short_string(s: &str) -> ShortString {
    let mut hs = ShortString::new();
    let _ = hs.push_str(fit_prefix(s, MAX_SHORT_STRING));
    hs
}

/// Create a LongString from a &str, truncating if too long
pub fn long_string(s: &str) -> LongString {
    let mut hs = LongString::new();
    let _ = hs.push_str(fit_prefix(s, MAX_LONG_STRING));
    hs
}

// ============================================================================
// Field parsing
// ============================================================================

/// Lenient boolean parse for form fields.
///
/// Leading whitespace is skipped. `1`, `t...`, `y...` and `on` are true;
/// `0`, `f...` and `n...` are false. Empty or anything else is false.
///
/// ```
/// use rs_fanctl::config::parse_bool_param;
///
/// assert!(parse_bool_param("true"));
/// assert!(parse_bool_param("  Yes"));
/// assert!(parse_bool_param("ON"));
/// assert!(!parse_bool_param("off"));
/// assert!(!parse_bool_param(""));
/// ```
pub fn parse_bool_param(value: &str) -> bool {
    let mut chars = value.trim_start().chars().map(|c| c.to_ascii_lowercase());
    match chars.next() {
        Some('1' | 't' | 'y') => true,
        Some('o') => chars.next() == Some('n'),
        _ => false,
    }
}

/// Port field parse: empty or anything outside `1..=65535` gives 1883.
///
/// ```
/// use rs_fanctl::config::parse_port;
///
/// assert_eq!(parse_port(""), 1883);
/// assert_eq!(parse_port("8883"), 8883);
/// assert_eq!(parse_port("99999"), 1883);
/// assert_eq!(parse_port("0"), 1883);
/// ```
pub fn parse_port(value: &str) -> u16 {
    if value.is_empty() {
        return DEFAULT_MQTT_PORT;
    }
    match parse_leading_int(value) {
        p @ 1..=65535 => p as u16,
        _ => DEFAULT_MQTT_PORT,
    }
}

// ============================================================================
// Main Config
// ============================================================================

/// Complete persisted configuration
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// MQTT client configuration
    pub mqtt: MqttConfig,
    /// Power-on behavior
    pub fan: FanConfig,
}

impl Config {
    /// Set MQTT configuration
    pub fn with_mqtt(mut self, mqtt: MqttConfig) -> Self {
        self.mqtt = mqtt;
        self
    }

    /// Set fan configuration
    pub fn with_fan(mut self, fan: FanConfig) -> Self {
        self.fan = fan;
        self
    }

    /// Merge external form fields into a copy of this config.
    ///
    /// Booleans go through [`parse_bool_param`], the port through
    /// [`parse_port`]. An empty default speed keeps the current value;
    /// anything else is clamped and raised to the minimum run speed. Blank
    /// host and topics fall back to their defaults, as on load.
    pub fn merged_with(&self, fields: &ConfigFields) -> Config {
        let mut next = self.clone();

        next.mqtt.enabled = parse_bool_param(&fields.mqtt_enabled);
        next.mqtt.host = short_string(&fields.mqtt_host);
        next.mqtt.port = parse_port(&fields.mqtt_port);
        next.mqtt.username = short_string(&fields.mqtt_user);
        next.mqtt.password = short_string(&fields.mqtt_pass);
        next.mqtt.command_topic = long_string(&fields.command_topic);
        next.mqtt.state_topic = long_string(&fields.state_topic);
        next.mqtt.status_topic = long_string(&fields.status_topic);

        if !fields.fan_default_speed.is_empty() {
            next.fan.default_speed_pct = parse_leading_int(&fields.fan_default_speed)
                .clamp(0, 100) as u8;
        }
        next.fan.default_speed_pct = raise_to_min_run(next.fan.default_speed_pct as i32);
        next.fan.default_on = parse_bool_param(&fields.fan_default_on);

        next.normalized()
    }

    /// Render the config back to form fields (for pre-filling a form).
    pub fn to_fields(&self) -> ConfigFields {
        ConfigFields {
            mqtt_enabled: if self.mqtt.enabled { "1" } else { "0" }.to_string(),
            mqtt_host: self.mqtt.host.as_str().to_string(),
            mqtt_port: self.mqtt.port.to_string(),
            mqtt_user: self.mqtt.username.as_str().to_string(),
            mqtt_pass: self.mqtt.password.as_str().to_string(),
            command_topic: self.mqtt.command_topic.as_str().to_string(),
            state_topic: self.mqtt.state_topic.as_str().to_string(),
            status_topic: self.mqtt.status_topic.as_str().to_string(),
            fan_default_speed: raise_to_min_run(self.fan.default_speed_pct as i32).to_string(),
            fan_default_on: if self.fan.default_on { "true" } else { "false" }.to_string(),
        }
    }

    /// Fill empty host/topics with defaults and normalize the default speed.
    fn normalized(mut self) -> Self {
        let defaults = MqttConfig::default();
        if self.mqtt.host.is_empty() {
            self.mqtt.host = defaults.host;
        }
        if self.mqtt.command_topic.is_empty() {
            self.mqtt.command_topic = defaults.command_topic;
        }
        if self.mqtt.state_topic.is_empty() {
            self.mqtt.state_topic = defaults.state_topic;
        }
        if self.mqtt.status_topic.is_empty() {
            self.mqtt.status_topic = defaults.status_topic;
        }
        self.fan.default_speed_pct = raise_to_min_run(self.fan.default_speed_pct as i32);
        self
    }
}

// ============================================================================
// MQTT Config
// ============================================================================

/// MQTT client configuration
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MqttConfig {
    /// Whether MQTT is enabled
    pub enabled: bool,
    /// Broker hostname or IP
    pub host: ShortString,
    /// Broker port
    pub port: u16,
    /// Username for authentication (empty = no auth)
    pub username: ShortString,
    /// Password for authentication
    pub password: ShortString,
    /// Topic the controller subscribes to for speed commands
    pub command_topic: LongString,
    /// Topic for retained state JSON
    pub state_topic: LongString,
    /// Topic for retained online/offline status and last will
    pub status_topic: LongString,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u16,
    /// Upper bound on a single connect attempt, in milliseconds
    pub connect_timeout_ms: u32,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: short_string("localhost"),
            port: DEFAULT_MQTT_PORT,
            username: ShortString::new(),
            password: ShortString::new(),
            command_topic: long_string("fan/cmd"),
            state_topic: long_string("fan/state"),
            status_topic: long_string("fan/status"),
            keep_alive_secs: 45,
            connect_timeout_ms: 5_000,
        }
    }
}

impl MqttConfig {
    /// Enable or disable MQTT
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the broker host
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = short_string(host);
        self
    }

    /// Set the broker port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set authentication credentials
    pub fn with_auth(mut self, username: &str, password: &str) -> Self {
        self.username = short_string(username);
        self.password = short_string(password);
        self
    }

    /// Set all three topics
    pub fn with_topics(mut self, command: &str, state: &str, status: &str) -> Self {
        self.command_topic = long_string(command);
        self.state_topic = long_string(state);
        self.status_topic = long_string(status);
        self
    }

    /// Check if authentication is configured
    pub fn has_auth(&self) -> bool {
        !self.username.is_empty()
    }
}

// ============================================================================
// Fan Config
// ============================================================================

/// Power-on behavior
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FanConfig {
    /// Speed applied at boot and restored by `state=on` (0 or 15..=100)
    pub default_speed_pct: u8,
    /// Whether the fan starts at boot
    pub default_on: bool,
}

impl Default for FanConfig {
    fn default() -> Self {
        Self {
            default_speed_pct: 50,
            default_on: true,
        }
    }
}

impl FanConfig {
    /// Set the power-on speed (clamped and raised to the minimum run speed)
    pub fn with_default_speed(mut self, pct: i32) -> Self {
        self.default_speed_pct = raise_to_min_run(pct);
        self
    }

    /// Set whether the fan starts at boot
    pub fn with_default_on(mut self, on: bool) -> Self {
        self.default_on = on;
        self
    }
}

// ============================================================================
// External fields
// ============================================================================

/// Raw string fields as submitted by a provisioning form.
///
/// Every field is free text; [`Config::merged_with`] does the coercion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ConfigFields {
    /// `1`/`true`/`on` enables MQTT
    pub mqtt_enabled: String,
    /// Broker host
    pub mqtt_host: String,
    /// Broker port
    pub mqtt_port: String,
    /// Broker username
    pub mqtt_user: String,
    /// Broker password
    pub mqtt_pass: String,
    /// Command topic
    pub command_topic: String,
    /// State topic
    pub state_topic: String,
    /// Status topic
    pub status_topic: String,
    /// Power-on speed
    pub fan_default_speed: String,
    /// Power-on enable flag
    pub fan_default_on: String,
}

// ============================================================================
// Config Store
// ============================================================================

/// Owner of the live [`Config`] and its persisted mirror.
pub struct ConfigStore<S: KeyValueStore> {
    storage: S,
    config: Config,
}

impl<S: KeyValueStore> ConfigStore<S> {
    /// Wrap a storage backend. The config starts at defaults until [`load`](Self::load).
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            config: Config::default(),
        }
    }

    /// Current config.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Storage backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Mutable storage backend.
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Read every key, falling back to defaults for missing or unreadable ones.
    pub fn load(&mut self) -> &Config {
        let defaults = Config::default();
        let s = &self.storage;

        let mqtt = MqttConfig {
            enabled: read(s.get_bool(keys::MQTT_ENABLED), keys::MQTT_ENABLED)
                .unwrap_or(defaults.mqtt.enabled),
            host: read_short(s, keys::MQTT_HOST),
            port: read(s.get_i32(keys::MQTT_PORT), keys::MQTT_PORT)
                .and_then(|p| u16::try_from(p).ok())
                .filter(|p| *p > 0)
                .unwrap_or(DEFAULT_MQTT_PORT),
            username: read_short(s, keys::MQTT_USER),
            password: read_short(s, keys::MQTT_PASS),
            command_topic: read_long(s, keys::CMD_TOPIC),
            state_topic: read_long(s, keys::STATE_TOPIC),
            status_topic: read_long(s, keys::STATUS_TOPIC),
            ..defaults.mqtt
        };
        let fan = FanConfig {
            default_speed_pct: read(s.get_i32(keys::FAN_DEFAULT_SPEED), keys::FAN_DEFAULT_SPEED)
                .map(|p| p.clamp(0, 100) as u8)
                .unwrap_or(defaults.fan.default_speed_pct),
            default_on: read(s.get_bool(keys::FAN_DEFAULT_ON), keys::FAN_DEFAULT_ON)
                .unwrap_or(defaults.fan.default_on),
        };

        self.config = Config { mqtt, fan }.normalized();
        info!(
            "Config loaded: mqtt={} host={}:{} user='{}' pass_len={} default={}% on={}",
            self.config.mqtt.enabled,
            self.config.mqtt.host,
            self.config.mqtt.port,
            self.config.mqtt.username,
            self.config.mqtt.password.len(),
            self.config.fan.default_speed_pct,
            self.config.fan.default_on,
        );
        &self.config
    }

    /// Merge form fields. Returns whether anything differs from the current config.
    ///
    /// The new config is only committed when it differs; persistence is a
    /// separate [`save`](Self::save).
    pub fn update_from_fields(&mut self, fields: &ConfigFields) -> bool {
        let next = self.config.merged_with(fields);
        let changed = next != self.config;
        if changed {
            self.config = next;
        }
        changed
    }

    /// Replace the config wholesale. Returns whether it changed.
    pub fn replace(&mut self, config: Config) -> bool {
        let changed = config != self.config;
        self.config = config;
        changed
    }

    /// Toggle the power-on flag and save. Returns whether it changed.
    pub fn set_default_on(&mut self, on: bool) -> bool {
        let changed = self.config.fan.default_on != on;
        self.config.fan.default_on = on;
        self.save();
        changed
    }

    /// Remember a user setpoint as the power-on speed.
    ///
    /// Storage is only touched when the value changed.
    pub fn persist_setpoint(&mut self, pct: u8) -> bool {
        let pct = raise_to_min_run(pct as i32);
        if self.config.fan.default_speed_pct == pct {
            return false;
        }
        self.config.fan.default_speed_pct = pct;
        self.save();
        true
    }

    /// Write every key, logging the ones whose stored value changed.
    ///
    /// Returns the number of changed keys. Write failures are logged and
    /// skipped; fan control never depends on storage.
    pub fn save(&mut self) -> usize {
        let c = self.config.clone();
        let mut changed = 0;

        changed += self.save_bool(keys::MQTT_ENABLED, c.mqtt.enabled);
        changed += self.save_str(keys::MQTT_HOST, &c.mqtt.host, false);
        changed += self.save_i32(keys::MQTT_PORT, c.mqtt.port as i32);
        changed += self.save_str(keys::MQTT_USER, &c.mqtt.username, false);
        changed += self.save_str(keys::MQTT_PASS, &c.mqtt.password, true);
        changed += self.save_str(keys::CMD_TOPIC, &c.mqtt.command_topic, false);
        changed += self.save_str(keys::STATE_TOPIC, &c.mqtt.state_topic, false);
        changed += self.save_str(keys::STATUS_TOPIC, &c.mqtt.status_topic, false);
        changed += self.save_i32(keys::FAN_DEFAULT_SPEED, c.fan.default_speed_pct as i32);
        changed += self.save_bool(keys::FAN_DEFAULT_ON, c.fan.default_on);

        changed
    }

    /// Current config as form fields.
    pub fn fields(&self) -> ConfigFields {
        self.config.to_fields()
    }

    fn save_bool(&mut self, key: &str, value: bool) -> usize {
        let old = self.storage.get_bool(key).ok().flatten();
        if let Err(e) = self.storage.put_bool(key, value) {
            warn!("NVS write {} failed: {:?}", key, e);
            return 0;
        }
        if old != Some(value) {
            info!("NVS updated: {}: {:?} -> {}", key, old, value);
            return 1;
        }
        0
    }

    fn save_i32(&mut self, key: &str, value: i32) -> usize {
        let old = self.storage.get_i32(key).ok().flatten();
        if let Err(e) = self.storage.put_i32(key, value) {
            warn!("NVS write {} failed: {:?}", key, e);
            return 0;
        }
        if old != Some(value) {
            info!("NVS updated: {}: {:?} -> {}", key, old, value);
            return 1;
        }
        0
    }

    fn save_str(&mut self, key: &str, value: &str, secret: bool) -> usize {
        let old = self.storage.get_str(key).ok().flatten();
        if let Err(e) = self.storage.put_str(key, value) {
            warn!("NVS write {} failed: {:?}", key, e);
            return 0;
        }
        if old.as_deref() == Some(value) {
            return 0;
        }
        if secret {
            info!(
                "NVS updated: {} length: {} -> {}",
                key,
                old.as_deref().map_or(0, str::len),
                value.len()
            );
        } else {
            info!(
                "NVS updated: {}: '{}' -> '{}'",
                key,
                old.as_deref().unwrap_or(""),
                value
            );
        }
        1
    }
}

fn read<T, E: core::fmt::Debug>(result: Result<Option<T>, E>, key: &str) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!("NVS read {} failed: {:?}", key, e);
            None
        }
    }
}

fn read_short<S: KeyValueStore>(s: &S, key: &str) -> ShortString {
    read(s.get_str(key), key)
        .map(|v| short_string(&v))
        .unwrap_or_default()
}

fn read_long<S: KeyValueStore>(s: &S, key: &str) -> LongString {
    read(s.get_str(key), key)
        .map(|v| long_string(&v))
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================
