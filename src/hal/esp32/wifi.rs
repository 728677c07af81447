//! WiFi connection management for ESP32-C3.
//!
//! Provides synchronous WiFi station mode connection using esp-idf-svc.
//! Credentials come from the build environment; provisioning them over a
//! captive portal is left to the platform.
//!
//! # Example
//!
//! ```ignore
//! use rs_fanctl::hal::esp32::{Esp32Wifi, WifiCredentials};
//!
//! let creds = WifiCredentials::from_build_env();
//! let wifi = Esp32Wifi::new(modem, sysloop, Some(nvs), &creds)?;
//! app.tick(now, wifi.is_connected())?;
//! ```

use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use log::{info, warn};
use std::net::Ipv4Addr;

/// Station credentials.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WifiCredentials {
    /// Network name (max 32 bytes)
    pub ssid: heapless::String<32>,
    /// Passphrase (max 64 bytes)
    pub password: heapless::String<64>,
}

impl WifiCredentials {
    /// Read `WIFI_SSID`/`WIFI_PASSWORD` baked in at build time.
    pub fn from_build_env() -> Self {
        let mut creds = Self::default();
        let _ = creds.ssid.push_str(option_env!("WIFI_SSID").unwrap_or(""));
        let _ = creds
            .password
            .push_str(option_env!("WIFI_PASSWORD").unwrap_or(""));
        creds
    }

    /// Whether an SSID is set.
    pub fn is_configured(&self) -> bool {
        !self.ssid.is_empty()
    }
}

/// WiFi connection manager for ESP32.
///
/// The first connection happens during construction. After that the main
/// loop reads [`is_connected`](Self::is_connected) each pass and calls
/// [`reconnect`](Self::reconnect) when the link drops.
pub struct Esp32Wifi<'a> {
    wifi: BlockingWifi<EspWifi<'a>>,
}

impl<'a> Esp32Wifi<'a> {
    /// Start station mode and connect.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to start or the first
    /// association or DHCP lease fails.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
        creds: &WifiCredentials,
    ) -> anyhow::Result<Self> {
        let esp_wifi = EspWifi::new(modem, sysloop.clone(), nvs)?;
        let mut wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;

        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: creds.ssid.clone(),
            password: creds.password.clone(),
            ..Default::default()
        }))?;

        info!("WiFi starting");
        wifi.start()?;

        info!("WiFi connecting to {:?}", creds.ssid.as_str());
        wifi.connect()?;
        wifi.wait_netif_up()?;

        let this = Self { wifi };
        if let Some(ip) = this.ip_addr() {
            info!("WiFi connected, IP {}", ip);
        }
        Ok(this)
    }

    /// Get the current IP address, if connected.
    pub fn ip_addr(&self) -> Option<Ipv4Addr> {
        self.wifi
            .wifi()
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| info.ip)
    }

    /// Check if WiFi is connected.
    pub fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    /// Try one reassociation. Blocks until it succeeds or fails.
    pub fn reconnect(&mut self) -> bool {
        match self.wifi.connect().and_then(|_| self.wifi.wait_netif_up()) {
            Ok(()) => {
                info!("WiFi reconnected");
                true
            }
            Err(e) => {
                warn!("WiFi reconnect failed: {:?}", e);
                false
            }
        }
    }
}
