//! # rs-fanctl
//!
//! Control core for a network-attached PWM fan: a requested speed from the
//! local web UI, an MQTT command topic, or the power-on policy becomes an
//! active-low duty cycle on the fan's PWM pin.
//!
//! ## Features
//!
//! - **Duty math**: percent/duty conversion with minimum-run clamping and active-low inversion
//! - **Soft-start**: cold starts into a low speed get a short boost so the fan does not stall
//! - **MQTT session**: throttled reconnects, retained state/status, last-will, dirty republish
//! - **Command grammar**: `RAW:<duty>`, `{"speed":N}` / `{"percent":N}`, or a bare integer
//! - **Persistent settings**: validated merge of portal fields with change detection
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without hardware:
//!
//! - `traits` - PWM, clock, MQTT and key-value storage abstractions
//! - `duty` - Pure percent/duty math
//! - `controller` - Speed controller and soft-start state machine
//! - `command` - Command payload parser
//! - `session` - MQTT session manager
//! - `config` - Settings model and persistence adapter
//! - `app` - Application context that ties everything together
//! - `hal` - Concrete implementations (mock for testing, esp32 for hardware)
//!
//! ## Example
//!
//! ```rust
//! use rs_fanctl::{FanApp, hal::{MockMqtt, MockPwm, MockStore}};
//!
//! let mut app = FanApp::new(MockPwm::new(), MockMqtt::new(), MockStore::new(), [0; 6]);
//! app.boot(0).unwrap();
//!
//! // Default config: fan on at 50%
//! assert_eq!(app.status().speed, 50);
//!
//! // A low cold-start speed boosts first, then settles
//! app.set_speed(0, 10).unwrap();
//! app.set_speed(20, 20).unwrap();
//! assert_eq!(app.controller().current_percent(), 25);
//!
//! app.tick(820, true).unwrap();
//! assert_eq!(app.controller().current_percent(), 20);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

extern crate alloc;

/// Application context that owns the controller, session and settings.
pub mod app;
/// Speed command parser for MQTT payloads.
pub mod command;
/// Settings model, validation, and persistence adapter.
pub mod config;
/// Speed controller with the soft-start state machine.
pub mod controller;
/// Percent/duty conversion math.
pub mod duty;
/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// URL query decoding for the HTTP control surface.
pub mod query;
/// MQTT session lifecycle and state publication.
pub mod session;
/// Core traits for hardware, network, and storage abstraction.
pub mod traits;

/// Network services for HTTP API and MQTT (feature-gated).
#[cfg(any(feature = "web", feature = "mqtt"))]
pub mod services;

// Re-exports for convenience
pub use app::{FanApp, FanQuery, PowerState, StatusResponse};
pub use command::parse_speed_command;
pub use config::{Config, ConfigFields, ConfigStore, FanConfig, MqttConfig};
pub use controller::{FanPhase, FanState, SpeedController, StateEvent};
pub use duty::{DutyScale, PCT_MIN_RUN, PCT_MIN_START, SETTLE_MS};
pub use session::{FanSnapshot, SessionManager, RETRY_INTERVAL_MS};
pub use traits::{
    Clock, ConnectOptions, KeyValueStore, LastWill, MqttClient, MqttMessage, PwmOutput, QoS,
};
