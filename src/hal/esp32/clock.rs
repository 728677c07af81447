//! ESP32 clock and chip identity.

use crate::traits::Clock;
use esp_idf_hal::sys::{esp, esp_efuse_mac_get_default, EspError};

/// ESP32 clock using the hardware timer.
///
/// Provides millisecond-resolution timing using the ESP-IDF `esp_timer_get_time()`
/// function, which returns microseconds since boot. Monotonic, so soft-start
/// deadlines and MQTT retry spacing survive Wi-Fi time sync.
///
/// # Example
///
/// ```ignore
/// use rs_fanctl::hal::esp32::Esp32Clock;
/// use rs_fanctl::traits::Clock;
///
/// let clock = Esp32Clock::new();
/// app.tick(clock.now_ms(), wifi.is_connected())?;
/// ```
pub struct Esp32Clock;

impl Esp32Clock {
    /// Creates a new ESP32 clock instance.
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Default for Esp32Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for Esp32Clock {
    #[inline]
    fn now_ms(&self) -> u64 {
        // Safe: plain read of the hardware timer, no side effects
        let micros = unsafe { esp_idf_hal::sys::esp_timer_get_time() };
        (micros / 1000) as u64
    }
}

/// Factory-programmed base MAC address from eFuse.
///
/// Used to derive the MQTT client id, so it is stable across reflashes.
pub fn efuse_mac() -> Result<[u8; 6], EspError> {
    let mut mac = [0u8; 6];
    // Safe: the buffer is exactly the six bytes the call writes
    esp!(unsafe { esp_efuse_mac_get_default(mac.as_mut_ptr()) })?;
    Ok(mac)
}
