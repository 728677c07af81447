//! Desktop fan controller for exercising the web UI and MQTT integration.
//!
//! Runs the full application with a mock PWM output, allowing you to:
//! - Access the control page at http://localhost:8080
//! - Drive `/fan?state=on&speed=40` and watch `/status`
//! - Publish commands to `fan/cmd` and watch the retained `fan/state`
//!
//! # Shared State
//!
//! The control loop and the web handlers share a single `FanApp` via
//! `SharedFanState`. Commands from either side are immediately visible to
//! the other.
//!
//! # Usage
//!
//! ```sh
//! MQTT_HOST=192.168.1.10 RUST_LOG=debug cargo run --example desktop_fan --features web,mqtt
//! ```
//!
//! Without `MQTT_HOST` the MQTT session stays disabled and the fan is
//! controlled over HTTP only.

use std::sync::Arc;
use std::time::Duration;

use rs_fanctl::hal::{MockPwm, MockStore};
use rs_fanctl::services::{run_server_with_state, RumqttcClient, SharedFanState, WebServerConfig};
use rs_fanctl::{Config, FanApp, MqttConfig};
use tracing_subscriber::EnvFilter;

type DesktopState = SharedFanState<MockPwm, RumqttcClient, MockStore>;

/// Control loop period
const LOOP_INTERVAL_MS: u64 = 2;

/// Fixed locally-administered MAC for the client id
const DEMO_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0xFA, 0x4E, 0x01];

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut app = FanApp::new(MockPwm::new(), RumqttcClient::new(), MockStore::new(), DEMO_MAC);

    if let Ok(host) = std::env::var("MQTT_HOST") {
        let port = std::env::var("MQTT_PORT")
            .map(|p| rs_fanctl::config::parse_port(&p))
            .unwrap_or(rs_fanctl::config::DEFAULT_MQTT_PORT);
        let mut mqtt = MqttConfig::default()
            .with_enabled(true)
            .with_host(&host)
            .with_port(port);
        if let (Ok(user), Ok(pass)) = (std::env::var("MQTT_USER"), std::env::var("MQTT_PASS")) {
            mqtt = mqtt.with_auth(&user, &pass);
        }
        // Persist so boot's load picks it up
        app.config_mut().replace(Config::default().with_mqtt(mqtt));
        app.config_mut().save();
    }

    let state: Arc<DesktopState> = Arc::new(SharedFanState::new(app));
    let boot_now = state.now_ms();
    state
        .with_app(|app| app.boot(boot_now))
        .map_err(|e| anyhow::anyhow!("PWM init failed: {:?}", e))?;

    let web_config = WebServerConfig::default();
    log::info!(
        "Control page at http://{}, MQTT {}",
        web_config.addr,
        if state.with_app(|app| app.mqtt_config().enabled) { "enabled" } else { "disabled" }
    );

    spawn_control_loop(Arc::clone(&state))?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_server_with_state(state, web_config))?;
    Ok(())
}

/// Run the cooperative loop on its own thread.
///
/// Ticks may block on an MQTT reconnect, so this stays off the tokio runtime.
fn spawn_control_loop(state: Arc<DesktopState>) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("fan-loop".into())
        .spawn(move || loop {
            let now = state.now_ms();
            if let Err(e) = state.with_app(|app| app.tick(now, true)) {
                log::warn!("PWM write failed: {:?}", e);
            }
            std::thread::sleep(Duration::from_millis(LOOP_INTERVAL_MS));
        })?;
    Ok(())
}
