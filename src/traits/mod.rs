//! Trait definitions for hardware, network, and storage abstraction.
//!
//! This module defines the core abstractions that allow rs-fanctl to:
//! - Run on different hardware (ESP32 LEDC, desktop mock)
//! - Use different MQTT transports (esp-idf-svc, rumqttc, mock)
//! - Persist settings to NVS or an in-memory map
//!
//! # Submodules
//!
//! - `hardware`: PWM output and clock
//! - `network`: MQTT client trait and connection options
//! - `storage`: Typed key-value store

pub mod hardware;
pub mod network;
pub mod storage;

pub use hardware::*;
pub use network::*;
pub use storage::*;
