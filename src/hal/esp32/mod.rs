//! ESP32-C3 SuperMini hardware abstraction layer for a single PWM fan.
//!
//! This module provides hardware implementations for the ESP32-C3 SuperMini board
//! driving a 4-pin PC fan through an open-drain transistor stage.
//!
//! # Hardware Configuration
//!
//! - **MCU**: ESP32-C3 SuperMini (RISC-V 160MHz, 4MB Flash)
//! - **Fan**: 4-pin PWM fan, control line pulled up on the fan side
//! - **Driver**: NPN/N-MOSFET between GPIO and the PWM line, so the output
//!   is inverted (a high pin pulls the fan's PWM input low)
//!
//! # Pin Assignments
//!
//! See the [`pins`] module for GPIO assignments matching the SuperMini layout.

mod clock;
mod nvs;
mod pwm;

pub use clock::{efuse_mac, Esp32Clock};
pub use nvs::{Esp32Nvs, Esp32NvsError};
pub use pwm::Esp32FanPwm;

#[cfg(feature = "wifi")]
mod wifi;
#[cfg(feature = "wifi")]
pub use wifi::{Esp32Wifi, WifiCredentials};

#[cfg(feature = "esp32-http")]
mod http;
#[cfg(feature = "esp32-http")]
pub use http::Esp32HttpServer;

#[cfg(feature = "esp32-mqtt")]
mod mqtt;
#[cfg(feature = "esp32-mqtt")]
pub use mqtt::{Esp32Mqtt, Esp32MqttError};

/// Pin assignments and timing for SuperMini ESP32-C3.
pub mod pins {
    // =========================================================================
    // Fan Control
    // =========================================================================

    /// PWM output to the fan driver stage
    pub const FAN_PWM: i32 = 10;

    /// PWM carrier frequency in Hz (the 4-pin fan standard)
    pub const FAN_PWM_FREQ_HZ: u32 = 25_000;

    /// LEDC duty resolution in bits
    pub const FAN_PWM_BITS: u8 = 10;

    // =========================================================================
    // Main Loop
    // =========================================================================

    /// Sleep between main loop passes
    pub const LOOP_INTERVAL_MS: u64 = 2;

    /// HTTP port for the control API
    pub const HTTP_PORT: u16 = 80;
}
