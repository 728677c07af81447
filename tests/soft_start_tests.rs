//! Soft-start behavior of the speed controller and the app around it.

use rs_fanctl::config::keys;
use rs_fanctl::hal::{MockClock, MockMqtt, MockPwm, MockStore};
use rs_fanctl::traits::{Clock, KeyValueStore};
use rs_fanctl::{FanApp, FanPhase, SpeedController, PCT_MIN_START, SETTLE_MS};

/// Raw value on the pin for a logical duty (10-bit, active-low).
fn pin(duty: u32) -> u32 {
    1023 - duty
}

fn controller() -> SpeedController<MockPwm> {
    SpeedController::new(MockPwm::new())
}

// ============================================================================
// Controller
// ============================================================================

#[test]
fn low_start_boosts_then_settles_once() {
    let mut c = controller();

    let event = c.set_speed(20, 0).unwrap();
    // Reported state is the target, the pin carries the boost
    assert_eq!(event.duty, 205);
    assert_eq!(event.setpoint, 20);
    assert_eq!(c.pwm().duty, Some(pin(256)));
    assert_eq!(c.phase(), FanPhase::Boosting);
    assert_eq!(c.pending_target(), Some(20));
    assert_eq!(c.current_percent(), PCT_MIN_START);

    assert_eq!(c.poll_soft_start(SETTLE_MS - 1).unwrap(), None);
    assert_eq!(c.pwm().duty, Some(pin(256)));

    let settled = c.poll_soft_start(SETTLE_MS).unwrap().unwrap();
    assert_eq!(settled.duty, 205);
    assert_eq!(c.pwm().duty, Some(pin(205)));
    assert_eq!(c.phase(), FanPhase::Running);
    assert_eq!(c.current_percent(), 20);

    // Fires exactly once
    let writes = c.pwm().writes.len();
    assert_eq!(c.poll_soft_start(SETTLE_MS * 3).unwrap(), None);
    assert_eq!(c.pwm().writes.len(), writes);
}

#[test]
fn request_below_min_run_boosts_to_min_start_and_settles_at_min_run() {
    let mut c = controller();

    let event = c.set_speed(5, 1_000).unwrap();
    assert_eq!(event.setpoint, 15);
    assert_eq!(event.duty, 153);
    assert_eq!(c.pwm().duty, Some(pin(256)));

    c.poll_soft_start(1_000 + SETTLE_MS).unwrap();
    assert_eq!(c.pwm().duty, Some(pin(153)));
    assert_eq!(c.current_percent(), 15);
}

#[test]
fn start_at_or_above_min_start_writes_directly() {
    let mut c = controller();

    c.set_speed(30, 0).unwrap();
    assert_eq!(c.pwm().writes, vec![pin(307)]);
    assert_eq!(c.phase(), FanPhase::Running);
    assert_eq!(c.pending_target(), None);

    let mut c = controller();
    c.set_speed(25, 0).unwrap();
    assert_eq!(c.pwm().writes, vec![pin(256)]);
    assert_eq!(c.pending_target(), None);
}

#[test]
fn low_speed_while_running_has_no_boost() {
    let mut c = controller();
    c.set_speed(60, 0).unwrap();

    c.set_speed(15, 10).unwrap();
    assert_eq!(c.pwm().duty, Some(pin(153)));
    assert_eq!(c.pending_target(), None);
}

#[test]
fn new_command_during_boost_replaces_it() {
    let mut c = controller();
    c.set_speed(20, 0).unwrap();

    c.set_speed(60, 100).unwrap();
    assert_eq!(c.pwm().duty, Some(pin(614)));
    assert_eq!(c.pending_target(), None);

    // The old deadline does nothing
    assert_eq!(c.poll_soft_start(SETTLE_MS).unwrap(), None);
    assert_eq!(c.pwm().duty, Some(pin(614)));
}

#[test]
fn low_command_during_boost_is_applied_as_is() {
    let mut c = controller();
    c.set_speed(20, 0).unwrap();

    // Output is non-zero, so no second boost
    c.set_speed(15, 100).unwrap();
    assert_eq!(c.pwm().duty, Some(pin(153)));
    assert_eq!(c.pending_target(), None);
    assert_eq!(c.poll_soft_start(SETTLE_MS + 100).unwrap(), None);
}

#[test]
fn stop_during_boost_cancels_it() {
    let mut c = controller();
    c.set_speed(20, 0).unwrap();

    let event = c.set_speed(0, 100).unwrap();
    assert_eq!(event.duty, 0);
    assert_eq!(event.setpoint, 20);
    assert_eq!(c.pwm().duty, Some(pin(0)));
    assert_eq!(c.phase(), FanPhase::Stopped);

    assert_eq!(c.poll_soft_start(SETTLE_MS).unwrap(), None);
    assert_eq!(c.pwm().duty, Some(pin(0)));
}

#[test]
fn clock_driven_settle() {
    let mut clock = MockClock::new();
    let mut c = controller();

    c.set_speed(18, clock.now_ms()).unwrap();
    for _ in 0..(SETTLE_MS / 2) {
        clock.advance(1);
        c.poll_soft_start(clock.now_ms()).unwrap();
    }
    assert_eq!(c.phase(), FanPhase::Boosting);

    clock.advance(SETTLE_MS);
    c.poll_soft_start(clock.now_ms()).unwrap();
    assert_eq!(c.phase(), FanPhase::Running);
    assert_eq!(c.current_percent(), 18);
}

// ============================================================================
// App
// ============================================================================

fn mqtt_store(default_on: bool) -> MockStore {
    let mut store = MockStore::new();
    store.put_bool(keys::MQTT_ENABLED, true).unwrap();
    store.put_bool(keys::FAN_DEFAULT_ON, default_on).unwrap();
    store
}

#[test]
fn command_soft_start_publishes_target_then_settle() {
    let mut app = FanApp::new(MockPwm::new(), MockMqtt::new(), mqtt_store(false), [0; 6]);
    app.boot(0).unwrap();

    app.session_mut()
        .client_mut()
        .queue_message("fan/cmd", "20");
    app.tick(10, true).unwrap();
    assert_eq!(app.controller().pwm().duty, Some(pin(256)));

    app.tick(10 + SETTLE_MS, true).unwrap();
    assert_eq!(app.controller().pwm().duty, Some(pin(205)));

    let states = app.session().client().payloads_to("fan/state");
    assert_eq!(
        states,
        vec![
            r#"{"duty":0,"percent":0.0,"setpoint":50}"#,
            r#"{"duty":205,"percent":20.0,"setpoint":20}"#,
            r#"{"duty":205,"percent":20.0,"setpoint":20}"#,
        ]
    );
}

#[test]
fn power_on_below_min_start_boosts() {
    let mut store = MockStore::new();
    store.put_i32(keys::FAN_DEFAULT_SPEED, 20).unwrap();

    let mut app = FanApp::new(MockPwm::new(), MockMqtt::new(), store, [0; 6]);
    app.boot(0).unwrap();
    assert_eq!(app.controller().phase(), FanPhase::Boosting);

    app.tick(SETTLE_MS, false).unwrap();
    assert_eq!(app.controller().phase(), FanPhase::Running);
    assert_eq!(app.status().speed, 20);
}
