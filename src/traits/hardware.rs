//! Hardware abstraction traits for the fan's PWM output and a time source.
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`PwmOutput`] | Raw N-bit duty output |
//! | [`Clock`] | Monotonic millisecond time source |
//!
//! For testing and desktop development, use the mock implementations
//! from [`crate::hal::mock`]. For ESP32 hardware, use the
//! implementations from `hal::esp32` (requires `esp32` feature).
//!
//! # Example
//!
//! ```rust
//! use rs_fanctl::traits::PwmOutput;
//! use rs_fanctl::hal::MockPwm;
//!
//! let mut pwm = MockPwm::new();
//! assert_eq!(pwm.resolution_bits(), 10);
//!
//! pwm.set_duty(767).unwrap();
//! assert_eq!(pwm.duty, Some(767));
//! ```

/// Raw PWM output.
///
/// Implementations write the duty value exactly as given. Active-low
/// inversion is the caller's job ([`SpeedController`] does it), so the
/// value reaching this trait is already the physical pin level.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use rs_fanctl::traits::PwmOutput;
///
/// struct MyPwm { /* LEDC channel */ }
///
/// impl PwmOutput for MyPwm {
///     type Error = ();
///
///     fn resolution_bits(&self) -> u8 {
///         10
///     }
///
///     fn set_duty(&mut self, duty: u32) -> Result<(), ()> {
///         // Write the channel duty register...
///         Ok(())
///     }
/// }
/// ```
///
/// [`SpeedController`]: crate::SpeedController
pub trait PwmOutput {
    /// Error type for PWM operations.
    type Error;

    /// Timer resolution in bits. Duty values range over `0..2^bits`.
    fn resolution_bits(&self) -> u8;

    /// Write a raw duty value to the output.
    fn set_duty(&mut self, duty: u32) -> Result<(), Self::Error>;
}

/// Time source trait for `no_std` compatibility.
///
/// Provides monotonic time in milliseconds for soft-start deadlines and
/// the MQTT retry throttle.
///
/// # Example
///
/// ```rust
/// use rs_fanctl::traits::Clock;
/// use rs_fanctl::hal::MockClock;
///
/// let mut clock = MockClock::new();
/// clock.advance(800);
/// assert_eq!(clock.now_ms(), 800);
/// ```
pub trait Clock {
    /// Returns current time in milliseconds since an arbitrary epoch.
    ///
    /// Must be monotonically increasing.
    fn now_ms(&self) -> u64;
}
