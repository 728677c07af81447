//! Percent/duty conversion for an N-bit PWM output.
//!
//! Duty values are kept active-high everywhere in the crate. The fan driver
//! inverts the signal, so [`DutyScale::invert_for_active_low`] is applied only
//! at the point where a duty is written to hardware.
//!
//! All conversions use integer arithmetic, rounding half away from zero.
//!
//! # Example
//!
//! ```rust
//! use rs_fanctl::duty::DutyScale;
//!
//! let scale = DutyScale::default(); // 10-bit, DUTY_MAX = 1023
//! assert_eq!(scale.max(), 1023);
//! assert_eq!(scale.percent_to_duty(50), 512);
//! assert_eq!(scale.duty_to_percent(512), 50);
//!
//! // Anything between 0 and the minimum run speed is raised
//! assert_eq!(scale.percent_to_duty(5), scale.percent_to_duty(15));
//!
//! // Active-low wiring
//! assert_eq!(scale.invert_for_active_low(0), 1023);
//! ```

/// Cold starts into a target below this percent are boosted to it first.
pub const PCT_MIN_START: u8 = 25;

/// Lowest percent the fan keeps spinning at. Non-zero targets are raised to it.
pub const PCT_MIN_RUN: u8 = 15;

/// How long a soft-start boost is held before dropping to the real target.
pub const SETTLE_MS: u64 = 800;

/// Resolution of the fan's LEDC timer.
pub const DEFAULT_RESOLUTION_BITS: u8 = 10;

/// Clamp a requested percent to `[0, 100]`.
#[inline]
pub fn clamp_percent(pct: i32) -> u8 {
    pct.clamp(0, 100) as u8
}

/// Clamp to `[0, 100]`, then raise anything in `(0, PCT_MIN_RUN)` to [`PCT_MIN_RUN`].
///
/// ```
/// use rs_fanctl::duty::raise_to_min_run;
///
/// assert_eq!(raise_to_min_run(0), 0);
/// assert_eq!(raise_to_min_run(1), 15);
/// assert_eq!(raise_to_min_run(42), 42);
/// assert_eq!(raise_to_min_run(250), 100);
/// ```
#[inline]
pub fn raise_to_min_run(pct: i32) -> u8 {
    match clamp_percent(pct) {
        0 => 0,
        p if p < PCT_MIN_RUN => PCT_MIN_RUN,
        p => p,
    }
}

/// Linear mapping between percent and an N-bit duty range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DutyScale {
    bits: u8,
}

impl Default for DutyScale {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLUTION_BITS)
    }
}

impl DutyScale {
    /// Create a scale for an N-bit output. `bits` is clamped to `1..=16`.
    pub const fn new(bits: u8) -> Self {
        let bits = if bits < 1 {
            1
        } else if bits > 16 {
            16
        } else {
            bits
        };
        Self { bits }
    }

    /// Resolution in bits.
    #[inline]
    pub const fn bits(&self) -> u8 {
        self.bits
    }

    /// Largest duty value (`2^N - 1`).
    #[inline]
    pub const fn max(&self) -> u32 {
        (1u32 << self.bits) - 1
    }

    /// Clamp a raw duty to `[0, max]`.
    #[inline]
    pub fn clamp_duty(&self, duty: i64) -> u32 {
        duty.clamp(0, self.max() as i64) as u32
    }

    /// Convert a percent to duty after minimum-run clamping.
    ///
    /// Total: any input produces a valid duty.
    pub fn percent_to_duty(&self, pct: i32) -> u32 {
        let pct = raise_to_min_run(pct) as u32;
        let duty = (pct * self.max() + 50) / 100;
        duty.min(self.max())
    }

    /// Convert a duty back to a whole percent, rounded to nearest.
    pub fn duty_to_percent(&self, duty: u32) -> u8 {
        let max = self.max();
        let duty = duty.min(max);
        ((200 * duty + max) / (2 * max)) as u8
    }

    /// Unrounded percent for a duty, as published on the state topic.
    pub fn duty_to_percent_f32(&self, duty: u32) -> f32 {
        100.0 * duty.min(self.max()) as f32 / self.max() as f32
    }

    /// Complement a duty for an active-low driver.
    #[inline]
    pub fn invert_for_active_low(&self, duty: u32) -> u32 {
        self.max() - duty.min(self.max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Percent -> Duty
    // =========================================================================

    #[test]
    fn zero_percent_is_zero_duty() {
        let scale = DutyScale::default();
        assert_eq!(scale.percent_to_duty(0), 0);
        assert_eq!(scale.percent_to_duty(-20), 0);
    }

    #[test]
    fn full_percent_is_max_duty() {
        let scale = DutyScale::default();
        assert_eq!(scale.percent_to_duty(100), 1023);
        assert_eq!(scale.percent_to_duty(400), 1023);
    }

    #[test]
    fn percent_below_min_run_is_raised() {
        let scale = DutyScale::default();
        let min_run = scale.percent_to_duty(PCT_MIN_RUN as i32);
        for pct in 1..PCT_MIN_RUN as i32 {
            assert_eq!(scale.percent_to_duty(pct), min_run, "pct {}", pct);
        }
        assert_eq!(min_run, 153);
    }

    #[test]
    fn percent_to_duty_rounds_to_nearest() {
        let scale = DutyScale::default();
        // 25% of 1023 = 255.75
        assert_eq!(scale.percent_to_duty(25), 256);
        // 20% of 1023 = 204.6
        assert_eq!(scale.percent_to_duty(20), 205);
        // 50% of 1023 = 511.5
        assert_eq!(scale.percent_to_duty(50), 512);
    }

    #[test]
    fn eight_bit_scale() {
        let scale = DutyScale::new(8);
        assert_eq!(scale.max(), 255);
        assert_eq!(scale.percent_to_duty(100), 255);
        assert_eq!(scale.percent_to_duty(50), 128);
    }

    #[test]
    fn resolution_is_clamped() {
        assert_eq!(DutyScale::new(0).bits(), 1);
        assert_eq!(DutyScale::new(32).bits(), 16);
        assert_eq!(DutyScale::new(16).max(), 65_535);
    }

    // =========================================================================
    // Duty -> Percent
    // =========================================================================

    #[test]
    fn duty_to_percent_rounds() {
        let scale = DutyScale::default();
        assert_eq!(scale.duty_to_percent(0), 0);
        assert_eq!(scale.duty_to_percent(1023), 100);
        assert_eq!(scale.duty_to_percent(511), 50);
        assert_eq!(scale.duty_to_percent(150), 15);
        assert_eq!(scale.duty_to_percent(256), 25);
    }

    #[test]
    fn duty_to_percent_clamps_overrange() {
        let scale = DutyScale::default();
        assert_eq!(scale.duty_to_percent(5000), 100);
    }

    #[test]
    fn round_trip_within_one_percent() {
        let scale = DutyScale::default();
        for pct in 1..=100 {
            let expected = raise_to_min_run(pct) as i32;
            let back = scale.duty_to_percent(scale.percent_to_duty(pct)) as i32;
            assert!((back - expected).abs() <= 1, "pct {} -> {}", pct, back);
        }
    }

    #[test]
    fn duty_to_percent_f32_matches_scale() {
        let scale = DutyScale::default();
        let pct = scale.duty_to_percent_f32(512);
        assert!((pct - 50.05).abs() < 0.01);
        assert_eq!(scale.duty_to_percent_f32(0), 0.0);
    }

    // =========================================================================
    // Active-low
    // =========================================================================

    #[test]
    fn inversion_is_involution() {
        let scale = DutyScale::default();
        for duty in 0..=scale.max() {
            let twice = scale.invert_for_active_low(scale.invert_for_active_low(duty));
            assert_eq!(twice, duty);
        }
    }

    #[test]
    fn inversion_clamps_before_complement() {
        let scale = DutyScale::default();
        assert_eq!(scale.invert_for_active_low(2000), 0);
        assert_eq!(scale.invert_for_active_low(1023), 0);
        assert_eq!(scale.invert_for_active_low(0), 1023);
    }

    #[test]
    fn clamp_duty_range() {
        let scale = DutyScale::default();
        assert_eq!(scale.clamp_duty(-1), 0);
        assert_eq!(scale.clamp_duty(511), 511);
        assert_eq!(scale.clamp_duty(99_999), 1023);
    }
}
