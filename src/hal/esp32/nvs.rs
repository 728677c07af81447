//! Settings storage in the ESP-IDF NVS partition.
//!
//! Booleans are stored as `u8` (NVS has no bool type). Strings are read
//! through a fixed buffer sized for the longest setting.

use crate::config::{MAX_LONG_STRING, NVS_NAMESPACE};
use crate::traits::KeyValueStore;
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use log::debug;

/// Error type for NVS operations.
#[derive(Debug)]
pub struct Esp32NvsError(pub esp_idf_hal::sys::EspError);

impl core::fmt::Display for Esp32NvsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "NVS error: {}", self.0)
    }
}

impl From<esp_idf_hal::sys::EspError> for Esp32NvsError {
    fn from(e: esp_idf_hal::sys::EspError) -> Self {
        Self(e)
    }
}

/// [`KeyValueStore`] over the `fan-control` NVS namespace.
///
/// # Example
///
/// ```ignore
/// let partition = EspDefaultNvsPartition::take()?;
/// let storage = Esp32Nvs::new(partition.clone())?;
/// let app = FanApp::new(pwm, mqtt, storage, efuse_mac()?);
/// ```
pub struct Esp32Nvs {
    nvs: EspNvs<NvsDefault>,
}

impl Esp32Nvs {
    /// Open the namespace read-write.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition cannot be opened.
    pub fn new(partition: EspDefaultNvsPartition) -> anyhow::Result<Self> {
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)?;
        debug!("NVS namespace {:?} open", NVS_NAMESPACE);
        Ok(Self { nvs })
    }
}

impl KeyValueStore for Esp32Nvs {
    type Error = Esp32NvsError;

    fn get_bool(&self, key: &str) -> Result<Option<bool>, Self::Error> {
        Ok(self.nvs.get_u8(key)?.map(|v| v != 0))
    }

    fn get_i32(&self, key: &str) -> Result<Option<i32>, Self::Error> {
        Ok(self.nvs.get_i32(key)?)
    }

    fn get_str(&self, key: &str) -> Result<Option<String>, Self::Error> {
        // Room for the longest value plus NUL
        let mut buf = [0u8; MAX_LONG_STRING + 1];
        Ok(self.nvs.get_str(key, &mut buf)?.map(String::from))
    }

    fn put_bool(&mut self, key: &str, value: bool) -> Result<(), Self::Error> {
        Ok(self.nvs.set_u8(key, value as u8)?)
    }

    fn put_i32(&mut self, key: &str, value: i32) -> Result<(), Self::Error> {
        Ok(self.nvs.set_i32(key, value)?)
    }

    fn put_str(&mut self, key: &str, value: &str) -> Result<(), Self::Error> {
        Ok(self.nvs.set_str(key, value)?)
    }
}
