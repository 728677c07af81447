//! HTTP server for ESP32-C3 web API.
//!
//! Provides a lightweight HTTP server using esp-idf-svc for the fan control
//! API and the control page. Handlers lock the same `FanApp` the main loop
//! ticks, so a request applies immediately and its state publish happens
//! inline.
//!
//! # Endpoints
//!
//! - `GET /fan?state=on|off&speed=N&default_on=B` - Control, answers with status JSON
//! - `GET /status` - Current status JSON
//! - `GET /reconfig?mqtt_host=...` - Change the named settings, restart if anything changed
//! - `GET /` - Control page
//!
//! Any other path gets a plain-text 404 `Not found`.
//!
//! # Example
//!
//! ```ignore
//! use rs_fanctl::hal::esp32::Esp32HttpServer;
//! use std::sync::{Arc, Mutex, atomic::AtomicBool};
//!
//! let app = Arc::new(Mutex::new(app));
//! let restart = Arc::new(AtomicBool::new(false));
//! let _server = Esp32HttpServer::new(80, app.clone(), restart.clone())?;
//! ```

use super::Esp32Clock;
use crate::app::{FanApp, FanQuery, INDEX_HTML};
use crate::query::query_part;
use crate::traits::{Clock, KeyValueStore, MqttClient, PwmOutput};
use esp_idf_hal::io::Write;
use esp_idf_svc::http::server::{Configuration, EspHttpServer};
use esp_idf_svc::http::Method;
use esp_idf_svc::io::EspIOError;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const JSON: [(&str, &str); 1] = [("Content-Type", "application/json")];

/// Fan app shared between the main loop and the HTTP handlers.
pub type SharedApp<P, M, S> = Arc<Mutex<FanApp<P, M, S>>>;

/// HTTP server for the fan control API.
///
/// Handlers are registered on construction and live as long as this value.
pub struct Esp32HttpServer {
    _server: EspHttpServer<'static>,
}

fn lock<P, M, S>(app: &Mutex<FanApp<P, M, S>>) -> MutexGuard<'_, FanApp<P, M, S>>
where
    P: PwmOutput,
    M: MqttClient,
    S: KeyValueStore,
{
    app.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Esp32HttpServer {
    /// Start the server and register all routes.
    ///
    /// A changed `/reconfig` sets `restart`; the main loop takes the session
    /// offline and reboots.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP server fails to start.
    pub fn new<P, M, S>(
        port: u16,
        app: SharedApp<P, M, S>,
        restart: Arc<AtomicBool>,
    ) -> anyhow::Result<Self>
    where
        P: PwmOutput + Send + 'static,
        M: MqttClient + Send + 'static,
        S: KeyValueStore + Send + 'static,
    {
        let server_config = Configuration {
            http_port: port,
            uri_match_wildcard: true,
            ..Default::default()
        };

        let mut server = EspHttpServer::new(&server_config)?;

        let app_for_fan = app.clone();
        let app_for_status = app.clone();
        let app_for_reconfig = app;

        // GET /fan - Apply query parameters
        server.fn_handler("/fan", Method::Get, move |req| {
            let query = FanQuery::from_uri(req.uri());
            let now = Esp32Clock::new().now_ms();
            let result = lock(&app_for_fan).handle_query(&query, now);

            match result {
                Ok(status) => {
                    let mut resp = req.into_response(200, None, &JSON)?;
                    resp.write_all(status.to_json().as_bytes())?;
                }
                Err(e) => {
                    warn!("PWM write failed: {:?}", e);
                    let mut resp = req.into_status_response(500)?;
                    resp.write_all(b"PWM output error")?;
                }
            }
            Ok::<_, EspIOError>(())
        })?;

        // GET /status - Current status
        server.fn_handler("/status", Method::Get, move |req| {
            let json = lock(&app_for_status).status().to_json();
            let mut resp = req.into_response(200, None, &JSON)?;
            resp.write_all(json.as_bytes())?;
            Ok::<_, EspIOError>(())
        })?;

        // GET /reconfig - Apply settings, request restart on change
        server.fn_handler("/reconfig", Method::Get, move |req| {
            let changed = {
                let mut app = lock(&app_for_reconfig);
                let mut fields = app.config().fields();
                fields.overlay_query_str(query_part(req.uri()));
                app.apply_portal_fields(&fields)
            };
            if changed {
                restart.store(true, Ordering::SeqCst);
            }
            let mut resp = req.into_response(200, None, &JSON)?;
            let body: &[u8] = if changed {
                b"{\"changed\":true}"
            } else {
                b"{\"changed\":false}"
            };
            resp.write_all(body)?;
            Ok::<_, EspIOError>(())
        })?;

        // GET / - Control page
        server.fn_handler("/", Method::Get, move |req| {
            let mut resp = req.into_response(200, None, &[("Content-Type", "text/html")])?;
            resp.write_all(INDEX_HTML.as_bytes())?;
            Ok::<_, EspIOError>(())
        })?;

        // Everything else
        server.fn_handler("/*", Method::Get, move |req| {
            let mut resp = req.into_response(404, None, &[("Content-Type", "text/plain")])?;
            resp.write_all(b"Not found")?;
            Ok::<_, EspIOError>(())
        })?;

        info!("HTTP server started on port {}", port);

        Ok(Self { _server: server })
    }
}
