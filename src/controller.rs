//! Speed controller: the only component that writes the fan's PWM output.
//!
//! This module provides [`SpeedController`], which turns a requested percent
//! into an active-low duty and runs the soft-start state machine.
//!
//! # Soft-start
//!
//! A fan at rest may not spin up on a low duty. When the output is at duty 0
//! and the requested speed is below [`PCT_MIN_START`], the controller first
//! drives [`PCT_MIN_START`] and remembers the real target. After
//! [`SETTLE_MS`], [`SpeedController::poll_soft_start`] drops to it.
//!
//! ```text
//!   Stopped --set_speed(p < 25)--> Boosting --deadline--> Running
//!      ^                               |                     |
//!      +---------set_speed(0)----------+---------------------+
//! ```
//!
//! # Example
//!
//! ```rust
//! use rs_fanctl::{SpeedController, FanPhase, hal::MockPwm};
//!
//! let mut controller = SpeedController::new(MockPwm::new());
//!
//! // Cold start at 20% boosts to 25% first
//! let event = controller.set_speed(20, 0).unwrap();
//! assert_eq!(controller.phase(), FanPhase::Boosting);
//! assert_eq!(controller.current_percent(), 25);
//! // The event already reports the final target
//! assert_eq!(event.duty, 205);
//!
//! // Nothing happens before the deadline
//! assert!(controller.poll_soft_start(799).unwrap().is_none());
//!
//! // Then it settles
//! let event = controller.poll_soft_start(800).unwrap().unwrap();
//! assert_eq!(event.duty, 205);
//! assert_eq!(controller.phase(), FanPhase::Running);
//! ```

use log::debug;

use crate::duty::{clamp_percent, raise_to_min_run, DutyScale, PCT_MIN_START, SETTLE_MS};
use crate::traits::PwmOutput;

/// What the output is doing right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FanPhase {
    /// Duty is 0.
    Stopped,
    /// Holding the start boost until the deadline.
    Boosting,
    /// Driving the requested speed.
    Running,
}

/// Result of a speed change, handed to the session for publication.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateEvent {
    /// Active-high duty to report. While boosting this is the target duty,
    /// not the boost duty on the pin.
    pub duty: u32,
    /// Setpoint after the change.
    pub setpoint: u8,
}

/// Full state snapshot for UI/API.
///
/// # Example
///
/// ```rust
/// use rs_fanctl::{SpeedController, FanPhase, hal::MockPwm};
///
/// let controller = SpeedController::new(MockPwm::new());
/// let state = controller.state();
/// assert_eq!(state.duty, 0);
/// assert_eq!(state.phase, FanPhase::Stopped);
/// assert!(state.pending_target.is_none());
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FanState {
    /// Active-high duty currently written.
    pub duty: u32,
    /// Percent currently driving the output.
    pub percent: u8,
    /// Last non-zero speed the user asked for.
    pub setpoint: u8,
    /// Current phase.
    pub phase: FanPhase,
    /// Target the boost will settle to, if boosting.
    pub pending_target: Option<u8>,
}

#[derive(Clone, Copy, Debug)]
struct SoftStart {
    target: u8,
    deadline_ms: u64,
}

/// Percent-to-PWM controller with soft-start.
///
/// # Type Parameter
///
/// - `P`: The PWM output ([`PwmOutput`] trait)
///
/// # Thread Safety
///
/// Not thread-safe. Wrap the owning `FanApp` in a mutex when a web server
/// shares it with the main loop.
pub struct SpeedController<P: PwmOutput> {
    pwm: P,
    scale: DutyScale,
    current_duty: u32,
    current_percent: u8,
    setpoint: u8,
    soft_start: Option<SoftStart>,
}

impl<P: PwmOutput> SpeedController<P> {
    /// Create a controller. The output is assumed to be at rest; call
    /// [`force_stop`](Self::force_stop) to make sure.
    pub fn new(pwm: P) -> Self {
        let scale = DutyScale::new(pwm.resolution_bits());
        Self {
            pwm,
            scale,
            current_duty: 0,
            current_percent: 0,
            setpoint: 0,
            soft_start: None,
        }
    }

    /// Drive the fan to `requested` percent.
    ///
    /// Out-of-range requests are clamped and low non-zero ones raised to
    /// the minimum run speed. Any pending boost is replaced. A zero request
    /// stops the fan and leaves the setpoint alone.
    pub fn set_speed(&mut self, requested: i32, now_ms: u64) -> Result<StateEvent, P::Error> {
        let requested = clamp_percent(requested);

        if requested == 0 {
            self.write_duty(0)?;
            self.soft_start = None;
            self.current_percent = 0;
            return Ok(self.event(0));
        }

        let effective = raise_to_min_run(requested as i32);

        let reported = if self.current_duty == 0 && effective < PCT_MIN_START {
            let boost = self.scale.percent_to_duty(PCT_MIN_START as i32);
            self.write_duty(boost)?;
            self.soft_start = Some(SoftStart {
                target: effective,
                deadline_ms: now_ms + SETTLE_MS,
            });
            debug!("Soft-start: boost to {}% then {}%", PCT_MIN_START, effective);
            self.scale.percent_to_duty(effective as i32)
        } else {
            let duty = self.scale.percent_to_duty(effective as i32);
            self.write_duty(duty)?;
            self.soft_start = None;
            duty
        };

        self.current_percent = self.scale.duty_to_percent(self.current_duty);
        self.setpoint = effective;
        Ok(self.event(reported))
    }

    /// Settle a pending boost once its deadline has passed.
    ///
    /// Call every tick. Returns the event of the settling write, or `None`
    /// when nothing happened.
    pub fn poll_soft_start(&mut self, now_ms: u64) -> Result<Option<StateEvent>, P::Error> {
        let Some(pending) = self.soft_start else {
            return Ok(None);
        };
        if now_ms < pending.deadline_ms {
            return Ok(None);
        }

        self.soft_start = None;
        if self.current_percent > pending.target {
            debug!("Soft-start: settling to {}%", pending.target);
            return self.set_speed(pending.target as i32, now_ms).map(Some);
        }
        Ok(None)
    }

    /// Stop the output without producing an event.
    pub fn force_stop(&mut self) -> Result<(), P::Error> {
        self.soft_start = None;
        self.write_duty(0)?;
        self.current_percent = 0;
        Ok(())
    }

    /// Record a setpoint without driving the fan.
    pub fn set_setpoint(&mut self, pct: i32) {
        self.setpoint = raise_to_min_run(pct);
    }

    /// Drop a pending boost, leaving the output as it is.
    pub fn cancel_soft_start(&mut self) {
        self.soft_start = None;
    }

    /// Get the current state for UI/API
    pub fn state(&self) -> FanState {
        FanState {
            duty: self.current_duty,
            percent: self.current_percent,
            setpoint: self.setpoint,
            phase: self.phase(),
            pending_target: self.pending_target(),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> FanPhase {
        if self.current_duty == 0 {
            FanPhase::Stopped
        } else if self.soft_start.is_some() {
            FanPhase::Boosting
        } else {
            FanPhase::Running
        }
    }

    /// Active-high duty currently written.
    #[inline]
    pub fn current_duty(&self) -> u32 {
        self.current_duty
    }

    /// Percent currently driving the output.
    #[inline]
    pub fn current_percent(&self) -> u8 {
        self.current_percent
    }

    /// Last non-zero speed the user asked for.
    #[inline]
    pub fn setpoint(&self) -> u8 {
        self.setpoint
    }

    /// Whether duty and percent are both zero.
    pub fn is_stopped(&self) -> bool {
        self.current_duty == 0 && self.current_percent == 0
    }

    /// Target a pending boost will settle to.
    pub fn pending_target(&self) -> Option<u8> {
        self.soft_start.map(|s| s.target)
    }

    /// Percent/duty scale of the output.
    pub fn scale(&self) -> &DutyScale {
        &self.scale
    }

    /// The PWM output.
    pub fn pwm(&self) -> &P {
        &self.pwm
    }

    /// Mutable access to the PWM output.
    pub fn pwm_mut(&mut self) -> &mut P {
        &mut self.pwm
    }

    fn write_duty(&mut self, duty: u32) -> Result<(), P::Error> {
        let duty = duty.min(self.scale.max());
        self.pwm.set_duty(self.scale.invert_for_active_low(duty))?;
        self.current_duty = duty;
        Ok(())
    }

    fn event(&self, duty: u32) -> StateEvent {
        StateEvent {
            duty,
            setpoint: self.setpoint,
        }
    }
}
