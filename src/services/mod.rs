//! Network services for running the fan controller on a desktop.
//!
//! This module provides optional network connectivity:
//! - `web` feature: Axum-based HTTP server with the `/fan` and `/status` API
//! - `mqtt` feature: `rumqttc`-backed [`MqttClient`](crate::traits::MqttClient)
//!
//! Both share one `FanApp` through `SharedFanState` wrapped in `Arc`:
//!
//! ```ignore
//! use std::sync::Arc;
//! use rs_fanctl::services::{SharedFanState, RumqttcClient, run_server_with_state};
//!
//! let app = FanApp::new(pwm, RumqttcClient::new(), storage, mac);
//! let state = Arc::new(SharedFanState::new(app));
//!
//! // Control loop on its own thread, web server on tokio
//! let loop_state = Arc::clone(&state);
//! std::thread::spawn(move || loop {
//!     let now = loop_state.now_ms();
//!     let _ = loop_state.with_app(|app| app.tick(now, true));
//!     std::thread::sleep(Duration::from_millis(2));
//! });
//! run_server_with_state(state, WebServerConfig::default()).await?;
//! ```

pub mod shared;

#[cfg(feature = "web")]
pub mod web;

#[cfg(feature = "mqtt")]
pub mod mqtt;

pub use shared::*;

#[cfg(feature = "web")]
pub use web::*;

#[cfg(feature = "mqtt")]
pub use mqtt::*;
