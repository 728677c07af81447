//! ESP32-C3 SuperMini PWM fan controller.
//!
//! This is the main entry point for the physical hardware controller.
//! It runs a 2ms cooperative loop that:
//! - Tracks the WiFi link and reassociates when it drops
//! - Services the MQTT session (connect throttle, dirty replay, commands)
//! - Settles a pending soft-start boost
//! - Restarts after a settings change from `/reconfig`
//!
//! HTTP handlers (with `esp32-http`) lock the same app and apply requests
//! immediately.
//!
//! # Build
//!
//! ```bash
//! # Fan only, runs the stored power-on policy
//! cargo build --bin esp32_main --features esp32
//!
//! # With WiFi + HTTP + MQTT
//! WIFI_SSID=... WIFI_PASSWORD=... cargo build --bin esp32_main --features esp32-net
//! ```

use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{info, warn};
use rs_fanctl::hal::esp32::{efuse_mac, pins, Esp32Clock, Esp32FanPwm, Esp32Nvs};
use rs_fanctl::traits::Clock;
use rs_fanctl::FanApp;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

#[cfg(feature = "esp32-mqtt")]
type Transport = rs_fanctl::hal::esp32::Esp32Mqtt;
#[cfg(not(feature = "esp32-mqtt"))]
type Transport = rs_fanctl::hal::MockMqtt;

/// Minimum spacing between WiFi reassociation attempts
#[cfg(feature = "wifi")]
const WIFI_RETRY_MS: u64 = 10_000;

fn main() -> anyhow::Result<()> {
    esp_idf_hal::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("rs-fanctl starting");

    let peripherals = Peripherals::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    // =========================================================================
    // Fan output (LEDC on GPIO10)
    // =========================================================================
    let pwm = Esp32FanPwm::new(
        peripherals.pins.gpio10,
        peripherals.ledc.timer0,
        peripherals.ledc.channel0,
    )?;

    let storage = Esp32Nvs::new(nvs_partition.clone())?;
    let mac = efuse_mac()?;
    let clock = Esp32Clock::new();

    // WiFi is not up yet; keep boot from trying the broker
    let mut app = FanApp::new(pwm, Transport::default(), storage, mac);
    app.session_mut().set_link_up(false);
    app.boot(clock.now_ms())?;
    info!("Fan ready, client id {}", app.session().client_id());

    let app = Arc::new(Mutex::new(app));
    let restart = Arc::new(AtomicBool::new(false));

    // =========================================================================
    // WiFi (required for HTTP and MQTT)
    // =========================================================================
    #[cfg(feature = "wifi")]
    let mut wifi = {
        use esp_idf_svc::eventloop::EspSystemEventLoop;
        use rs_fanctl::hal::esp32::{Esp32Wifi, WifiCredentials};

        let creds = WifiCredentials::from_build_env();
        if creds.is_configured() {
            let sysloop = EspSystemEventLoop::take()?;
            match Esp32Wifi::new(peripherals.modem, sysloop, Some(nvs_partition), &creds) {
                Ok(wifi) => Some(wifi),
                Err(e) => {
                    warn!("WiFi unavailable, running local-only: {:?}", e);
                    None
                }
            }
        } else {
            info!("WiFi not configured (set WIFI_SSID/WIFI_PASSWORD), running local-only");
            None
        }
    };

    // =========================================================================
    // HTTP server
    // =========================================================================
    #[cfg(feature = "esp32-http")]
    let _server = match wifi {
        Some(_) => Some(rs_fanctl::hal::esp32::Esp32HttpServer::new(
            pins::HTTP_PORT,
            app.clone(),
            restart.clone(),
        )?),
        None => None,
    };

    #[cfg(feature = "wifi")]
    let mut last_wifi_attempt: u64 = 0;

    // =========================================================================
    // Main Control Loop
    // =========================================================================
    loop {
        let now = clock.now_ms();

        #[cfg(feature = "wifi")]
        let link_up = match wifi.as_mut() {
            Some(w) if w.is_connected() => true,
            Some(w) => {
                if now.saturating_sub(last_wifi_attempt) >= WIFI_RETRY_MS {
                    last_wifi_attempt = now;
                    w.reconnect()
                } else {
                    false
                }
            }
            None => false,
        };
        #[cfg(not(feature = "wifi"))]
        let link_up = false;

        // Without a real transport the session never sees the link
        let link_up = link_up && cfg!(feature = "esp32-mqtt");

        {
            let mut guard = app.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = guard.tick(now, link_up) {
                warn!("PWM write failed: {:?}", e);
            }

            if restart.load(Ordering::SeqCst) {
                info!("Settings changed, restarting");
                guard.go_offline(now);
                drop(guard);
                thread::sleep(Duration::from_millis(200));
                esp_idf_hal::reset::restart();
            }
        }

        thread::sleep(Duration::from_millis(pins::LOOP_INTERVAL_MS));
    }
}
