//! Shared application state for the desktop services.
//!
//! `SharedFanState` gives the web handlers and the control loop thread-safe
//! access to a single [`FanApp`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rs_fanctl::services::SharedFanState;
//!
//! let state = Arc::new(SharedFanState::new(app));
//!
//! // Control loop
//! let now = state.now_ms();
//! state.with_app(|app| app.tick(now, true))?;
//!
//! // Web handler
//! let status = state.status();
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::app::{FanApp, StatusResponse};
use crate::traits::{KeyValueStore, MqttClient, PwmOutput};

/// One [`FanApp`] shared by every service.
///
/// # Thread Safety
///
/// - Uses `Mutex` (not `RwLock`): the control loop writes every few
///   milliseconds, so readers gain nothing.
/// - All timestamps come from the same `start_time`, so soft-start
///   deadlines and retry throttling agree across services.
pub struct SharedFanState<P, M, S>
where
    P: PwmOutput,
    M: MqttClient,
    S: KeyValueStore,
{
    app: Mutex<FanApp<P, M, S>>,
    start_time: Instant,
}

impl<P, M, S> SharedFanState<P, M, S>
where
    P: PwmOutput,
    M: MqttClient,
    S: KeyValueStore,
{
    /// Wrap an app. `now_ms()` counts from this moment.
    pub fn new(app: FanApp<P, M, S>) -> Self {
        Self {
            app: Mutex::new(app),
            start_time: Instant::now(),
        }
    }

    /// Milliseconds since the state was created.
    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// The start time instant.
    #[inline]
    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    /// Run `f` with exclusive access to the app.
    ///
    /// The closure pattern keeps the lock from being held across await points.
    pub fn with_app<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut FanApp<P, M, S>) -> R,
    {
        let mut guard = self.lock();
        f(&mut guard)
    }

    /// Current status snapshot.
    pub fn status(&self) -> StatusResponse {
        self.lock().status()
    }

    // A panicking handler must not take the fan controller down with it.
    fn lock(&self) -> MutexGuard<'_, FanApp<P, M, S>> {
        self.app.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
