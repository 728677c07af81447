//! Application context: one owner for the controller, the MQTT session and
//! the persisted settings.
//!
//! [`FanApp`] is what the main loop and the HTTP handlers talk to. It routes
//! every speed change through the [`SpeedController`] and hands the result to
//! the [`SessionManager`], so the state topic always follows the output.
//!
//! # Example
//!
//! ```rust
//! use rs_fanctl::{FanApp, FanQuery, PowerState, hal::{MockMqtt, MockPwm, MockStore}};
//!
//! let mut app = FanApp::new(MockPwm::new(), MockMqtt::new(), MockStore::new(), [0; 6]);
//! app.boot(0).unwrap();
//!
//! let status = app.handle_query(&FanQuery::from_query_str("state=off"), 10).unwrap();
//! assert_eq!(status.status, PowerState::Off);
//! assert_eq!(status.setpoint, 50);
//!
//! // Setting a speed while stopped only moves the setpoint
//! let status = app.handle_query(&FanQuery::from_query_str("speed=70"), 20).unwrap();
//! assert_eq!(status.status, PowerState::Off);
//! assert_eq!(status.setpoint, 70);
//! ```

use heapless::String as HString;
use log::{debug, info, warn};

use crate::command::{parse_leading_int, parse_speed_command};
use crate::config::{parse_bool_param, ConfigFields, ConfigStore, MqttConfig};
use crate::controller::{SpeedController, StateEvent};
use crate::duty::clamp_percent;
use crate::session::{FanSnapshot, SessionManager};
use crate::traits::{KeyValueStore, MqttClient, PwmOutput};

pub use crate::query::FanQuery;

/// Capacity of the status JSON buffer.
const STATUS_JSON_LEN: usize = 80;

/// Control page served at `/`.
pub const INDEX_HTML: &str = include_str!("../www/index.html");

/// Whether the fan is spinning, as reported by `/status`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PowerState {
    /// Effective percent above zero.
    On,
    /// Stopped.
    Off,
}

impl PowerState {
    /// Lowercase name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerState::On => "on",
            PowerState::Off => "off",
        }
    }
}

/// Body of `/status` and `/fan` responses.
///
/// ```
/// use rs_fanctl::{PowerState, StatusResponse};
///
/// let status = StatusResponse { status: PowerState::On, speed: 25, setpoint: 20, default_on: true };
/// assert_eq!(
///     status.to_json().as_str(),
///     r#"{"status":"on","speed":25,"setpoint":20,"default_on":true}"#
/// );
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusResponse {
    /// On when the effective percent is above zero.
    pub status: PowerState,
    /// Effective percent.
    pub speed: u8,
    /// Last non-zero user speed.
    pub setpoint: u8,
    /// Power-on policy.
    pub default_on: bool,
}

impl StatusResponse {
    /// Serialize to the status JSON.
    #[cfg(feature = "serde-json-core")]
    pub fn to_json(&self) -> HString<STATUS_JSON_LEN> {
        serde_json_core::to_string(self).unwrap_or_default()
    }

    /// Serialize to the status JSON.
    #[cfg(not(feature = "serde-json-core"))]
    pub fn to_json(&self) -> HString<STATUS_JSON_LEN> {
        use core::fmt::Write;

        let mut out = HString::new();
        let _ = write!(
            out,
            r#"{{"status":"{}","speed":{},"setpoint":{},"default_on":{}}}"#,
            self.status.as_str(),
            self.speed,
            self.setpoint,
            self.default_on
        );
        out
    }
}

/// The fan controller application.
///
/// # Type Parameters
///
/// - `P`: PWM output ([`PwmOutput`])
/// - `M`: MQTT transport ([`MqttClient`])
/// - `S`: settings storage ([`KeyValueStore`])
///
/// # Thread Safety
///
/// Not thread-safe. The desktop services wrap it in `SharedFanState`;
/// the ESP32 binary in `Arc<Mutex<_>>`.
pub struct FanApp<P: PwmOutput, M: MqttClient, S: KeyValueStore> {
    controller: SpeedController<P>,
    session: SessionManager<M>,
    config: ConfigStore<S>,
}

impl<P, M, S> FanApp<P, M, S>
where
    P: PwmOutput,
    M: MqttClient,
    S: KeyValueStore,
{
    /// Assemble the app. `mac` seeds the MQTT client id.
    pub fn new(pwm: P, mqtt: M, storage: S, mac: [u8; 6]) -> Self {
        let controller = SpeedController::new(pwm);
        let session = SessionManager::new(mqtt, mac, *controller.scale());
        Self {
            controller,
            session,
            config: ConfigStore::new(storage),
        }
    }

    /// Load settings, stop the output, then apply the power-on policy.
    pub fn boot(&mut self, now_ms: u64) -> Result<(), P::Error> {
        self.config.load();
        self.controller.force_stop()?;
        self.controller
            .set_setpoint(self.config.config().fan.default_speed_pct as i32);
        self.apply_power_on_policy(now_ms)
    }

    /// Run at the default speed if default-on, otherwise stop.
    pub fn apply_power_on_policy(&mut self, now_ms: u64) -> Result<(), P::Error> {
        let fan = self.config.config().fan.clone();
        self.controller.set_setpoint(fan.default_speed_pct as i32);
        let target = if fan.default_on { fan.default_speed_pct } else { 0 };
        info!("Power-on policy: default_on={} speed={}%", fan.default_on, target);
        self.set_speed(target as i32, now_ms)
    }

    /// Drive the fan and publish the resulting state.
    pub fn set_speed(&mut self, pct: i32, now_ms: u64) -> Result<(), P::Error> {
        let event = self.controller.set_speed(pct, now_ms)?;
        self.publish(event, now_ms);
        Ok(())
    }

    /// Apply an MQTT command payload. Unparseable payloads are dropped.
    pub fn handle_command(&mut self, payload: &str, now_ms: u64) -> Result<(), P::Error> {
        match parse_speed_command(payload, self.controller.scale()) {
            Some(pct) => {
                debug!("Command {:?} -> {}%", payload, pct);
                self.set_speed(pct as i32, now_ms)
            }
            None => {
                debug!("Dropping unparseable command {:?}", payload);
                Ok(())
            }
        }
    }

    /// Apply `/fan` query parameters and return the resulting status.
    ///
    /// `default_on` is handled first. Then `state` wins over `speed`.
    pub fn handle_query(
        &mut self,
        query: &FanQuery,
        now_ms: u64,
    ) -> Result<StatusResponse, P::Error> {
        if let Some(value) = &query.default_on {
            self.config.set_default_on(parse_bool_param(value));
        }

        if let Some(state) = &query.state {
            match state.as_str() {
                "on" => {
                    let target = match self.controller.setpoint() {
                        0 => self.config.config().fan.default_speed_pct,
                        sp => sp,
                    };
                    self.set_speed(target as i32, now_ms)?;
                }
                "off" => self.set_speed(0, now_ms)?,
                other => debug!("Ignoring state={:?}", other),
            }
        } else if let Some(speed) = &query.speed {
            let requested = clamp_percent(parse_leading_int(speed));
            if requested > 0 {
                self.controller.set_setpoint(requested as i32);
                self.config.persist_setpoint(self.controller.setpoint());
            }

            if self.controller.is_stopped() {
                // Stopped: report the new setpoint without starting the fan
                self.controller.cancel_soft_start();
                let event = StateEvent {
                    duty: 0,
                    setpoint: self.controller.setpoint(),
                };
                self.publish(event, now_ms);
            } else {
                self.set_speed(requested as i32, now_ms)?;
            }
        }

        Ok(self.status())
    }

    /// Current status.
    pub fn status(&self) -> StatusResponse {
        let speed = self.controller.current_percent();
        StatusResponse {
            status: if speed > 0 { PowerState::On } else { PowerState::Off },
            speed,
            setpoint: self.controller.setpoint(),
            default_on: self.config.config().fan.default_on,
        }
    }

    /// Merge provisioning form fields and save.
    ///
    /// Returns whether anything changed. On change the setpoint follows the
    /// new default speed.
    pub fn apply_portal_fields(&mut self, fields: &ConfigFields) -> bool {
        let changed = self.config.update_from_fields(fields);
        self.config.save();
        if changed {
            info!("Settings changed");
            self.controller
                .set_setpoint(self.config.config().fan.default_speed_pct as i32);
        }
        changed
    }

    /// One pass of the main loop.
    ///
    /// Reports the link state, services the MQTT session, applies incoming
    /// commands, then settles a pending soft-start. A command whose PWM write
    /// fails is logged and skipped; only the soft-start write is returned.
    pub fn tick(&mut self, now_ms: u64, link_up: bool) -> Result<(), P::Error> {
        self.session.set_link_up(link_up);

        let snapshot = self.snapshot();
        let commands = self
            .session
            .poll(now_ms, &self.config.config().mqtt, snapshot);
        // A failed write must not drop the rest of the drained batch
        for payload in commands {
            if self.handle_command(&payload, now_ms).is_err() {
                warn!("PWM write failed for command {:?}", payload);
            }
        }

        if let Some(event) = self.controller.poll_soft_start(now_ms)? {
            self.publish(event, now_ms);
        }
        Ok(())
    }

    /// Announce offline and drop the MQTT session before reconfiguring.
    pub fn go_offline(&mut self, now_ms: u64) {
        self.session.go_offline(now_ms, &self.config.config().mqtt);
    }

    /// The speed controller.
    pub fn controller(&self) -> &SpeedController<P> {
        &self.controller
    }

    /// Mutable access to the speed controller.
    pub fn controller_mut(&mut self) -> &mut SpeedController<P> {
        &mut self.controller
    }

    /// The MQTT session.
    pub fn session(&self) -> &SessionManager<M> {
        &self.session
    }

    /// Mutable access to the MQTT session.
    pub fn session_mut(&mut self) -> &mut SessionManager<M> {
        &mut self.session
    }

    /// The settings store.
    pub fn config(&self) -> &ConfigStore<S> {
        &self.config
    }

    /// Mutable access to the settings store.
    pub fn config_mut(&mut self) -> &mut ConfigStore<S> {
        &mut self.config
    }

    /// Current MQTT settings.
    pub fn mqtt_config(&self) -> &MqttConfig {
        &self.config.config().mqtt
    }

    fn snapshot(&self) -> FanSnapshot {
        FanSnapshot {
            duty: self.controller.current_duty(),
            setpoint: self.controller.setpoint(),
        }
    }

    fn publish(&mut self, event: StateEvent, now_ms: u64) {
        self.session
            .publish_state(now_ms, &self.config.config().mqtt, event.duty, event.setpoint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{keys, Config, FanConfig, MqttConfig};
    use crate::duty::SETTLE_MS;
    use crate::hal::{MockMqtt, MockPwm, MockStore};

    type TestApp = FanApp<MockPwm, MockMqtt, MockStore>;

    fn app_with(config: Config) -> TestApp {
        let mut store = ConfigStore::new(MockStore::new());
        store.replace(config);
        store.save();
        let storage = core::mem::take(store.storage_mut());
        let mut app = FanApp::new(MockPwm::new(), MockMqtt::new(), storage, [0; 6]);
        app.boot(0).unwrap();
        app
    }

    fn app() -> TestApp {
        app_with(Config::default())
    }

    fn query(s: &str) -> FanQuery {
        FanQuery::from_query_str(s)
    }

    // =========================================================================
    // Boot
    // =========================================================================

    #[test]
    fn boot_default_on() {
        let app = app();
        assert_eq!(app.controller().current_percent(), 50);
        assert_eq!(app.status().status, PowerState::On);
    }

    #[test]
    fn boot_default_off_keeps_setpoint() {
        let app = app_with(
            Config::default().with_fan(FanConfig::default().with_default_on(false).with_default_speed(40)),
        );
        assert!(app.controller().is_stopped());
        assert_eq!(app.status().setpoint, 40);
    }

    #[test]
    fn boot_low_default_soft_starts() {
        let mut app = app_with(Config::default().with_fan(FanConfig::default().with_default_speed(18)));
        assert_eq!(app.controller().current_percent(), 25);
        app.tick(800, true).unwrap();
        assert_eq!(app.controller().current_percent(), 18);
    }

    // =========================================================================
    // /fan query
    // =========================================================================

    #[test]
    fn state_on_uses_setpoint() {
        let mut app = app();
        app.handle_query(&query("speed=70"), 0).unwrap();
        app.handle_query(&query("state=off"), 10).unwrap();
        let status = app.handle_query(&query("state=on"), 20).unwrap();
        assert_eq!(status.speed, 70);
    }

    #[test]
    fn unknown_state_ignored_and_speed_not_consulted() {
        let mut app = app();
        let status = app.handle_query(&query("state=maybe&speed=90"), 0).unwrap();
        assert_eq!(status.speed, 50);
        assert_eq!(status.setpoint, 50);
    }

    #[test]
    fn speed_while_running_applies() {
        let mut app = app();
        let status = app.handle_query(&query("speed=35"), 0).unwrap();
        assert_eq!(status.speed, 35);
        assert_eq!(app.config().config().fan.default_speed_pct, 35);
        assert_eq!(app.config().storage().get_i32(keys::FAN_DEFAULT_SPEED).unwrap(), Some(35));
    }

    #[test]
    fn speed_while_stopped_does_not_start() {
        let mut app = app();
        app.handle_query(&query("state=off"), 0).unwrap();
        let writes = app.controller().pwm().writes.len();

        let status = app.handle_query(&query("speed=5"), 10).unwrap();
        assert_eq!(status.status, PowerState::Off);
        assert_eq!(status.setpoint, 15);
        assert_eq!(app.controller().pwm().writes.len(), writes);
    }

    #[test]
    fn speed_zero_stops_but_keeps_setpoint() {
        let mut app = app();
        let status = app.handle_query(&query("speed=0"), 0).unwrap();
        assert_eq!(status.status, PowerState::Off);
        assert_eq!(status.setpoint, 50);
    }

    #[test]
    fn speed_garbage_is_zero() {
        let mut app = app();
        let status = app.handle_query(&query("speed=fast"), 0).unwrap();
        assert_eq!(status.speed, 0);
    }

    #[test]
    fn default_on_toggle_persists() {
        let mut app = app();
        let status = app.handle_query(&query("default_on=no"), 0).unwrap();
        assert!(!status.default_on);
        assert_eq!(app.config().storage().get_bool(keys::FAN_DEFAULT_ON).unwrap(), Some(false));
        // Fan untouched
        assert_eq!(status.speed, 50);
    }

    // =========================================================================
    // Commands and portal
    // =========================================================================

    #[test]
    fn command_drives_fan() {
        let mut app = app();
        app.handle_command("RAW:1023", 0).unwrap();
        assert_eq!(app.controller().current_percent(), 100);

        app.handle_command("garbage", 10).unwrap();
        assert_eq!(app.controller().current_percent(), 100);
    }

    #[test]
    fn portal_fields_change_setpoint() {
        let mut app = app();
        let mut fields = app.config().fields();
        fields.fan_default_speed = "80".into();
        assert!(app.apply_portal_fields(&fields));
        assert_eq!(app.status().setpoint, 80);
        // Output is not touched until the next command
        assert_eq!(app.status().speed, 50);

        assert!(!app.apply_portal_fields(&fields));
    }

    #[test]
    fn tick_applies_mqtt_commands() {
        let mut app = app_with(Config::default().with_mqtt(MqttConfig::default().with_enabled(true)));
        assert!(app.session().is_connected());

        app.session_mut().client_mut().queue_message("fan/cmd", b"{\"speed\": 30}".to_vec());
        app.tick(10, true).unwrap();
        assert_eq!(app.controller().current_percent(), 30);

        let last = app.session().client().payloads_to("fan/state").pop().unwrap();
        assert_eq!(last, r#"{"duty":307,"percent":30.0,"setpoint":30}"#);
    }

    #[test]
    fn tick_keeps_applying_commands_after_a_failed_write() {
        let mut app = app_with(Config::default().with_mqtt(MqttConfig::default().with_enabled(true)));

        app.session_mut().client_mut().queue_message("fan/cmd", "80");
        app.session_mut().client_mut().queue_message("fan/cmd", "30");
        app.controller_mut().pwm_mut().fail_next = 1;

        assert!(app.tick(10, true).is_ok());
        assert_eq!(app.controller().current_percent(), 30);
        assert_eq!(app.controller().setpoint(), 30);
    }

    #[test]
    fn tick_settles_boost_even_if_a_command_failed() {
        let mut app = app_with(Config::default().with_mqtt(MqttConfig::default().with_enabled(true)));
        app.set_speed(0, 0).unwrap();
        app.set_speed(20, 10).unwrap();
        assert_eq!(app.controller().current_percent(), 25);

        app.session_mut().client_mut().queue_message("fan/cmd", "RAW:600");
        app.controller_mut().pwm_mut().fail_next = 1;
        app.tick(10 + SETTLE_MS, true).unwrap();
        assert_eq!(app.controller().current_percent(), 20);
    }

    #[test]
    fn pwm_failure_propagates() {
        let mut app = app();
        app.controller_mut().pwm_mut().fail = true;
        assert!(app.set_speed(80, 0).is_err());
        assert_eq!(app.controller().current_percent(), 50);
    }
}
