//! Fan PWM output using the ESP32 LEDC peripheral.
//!
//! The driver stage inverts the signal, so the controller hands this type
//! already-inverted duty values. This type only clamps them to the channel range.

use super::pins;
use crate::traits::PwmOutput;
use embedded_hal::pwm::SetDutyCycle;
use esp_idf_hal::ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver, Resolution};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::prelude::*;
use log::info;

/// Single-channel LEDC fan output at 25kHz, 10-bit.
///
/// # Example
///
/// ```ignore
/// use rs_fanctl::hal::esp32::Esp32FanPwm;
///
/// let peripherals = Peripherals::take()?;
/// let pwm = Esp32FanPwm::new(
///     peripherals.pins.gpio10,
///     peripherals.ledc.timer0,
///     peripherals.ledc.channel0,
/// )?;
/// let controller = SpeedController::new(pwm);
/// ```
pub struct Esp32FanPwm<'d> {
    channel: LedcDriver<'d>,
    bits: u8,
}

impl<'d> Esp32FanPwm<'d> {
    const PWM_RESOLUTION: Resolution = Resolution::Bits10;

    /// Configures the LEDC timer and channel.
    ///
    /// The pin is written high right away: with the inverting stage that is
    /// duty 0 at the fan, so it stays still until the first command.
    ///
    /// # Errors
    ///
    /// Returns an error if PWM initialization fails.
    pub fn new<T, TI, C, CI, P, PI>(
        pin: P,
        timer: T,
        channel: C,
    ) -> Result<Self, esp_idf_hal::sys::EspError>
    where
        TI: esp_idf_hal::ledc::LedcTimer + 'd,
        T: Peripheral<P = TI> + 'd,
        CI: esp_idf_hal::ledc::LedcChannel<SpeedMode = TI::SpeedMode> + 'd,
        C: Peripheral<P = CI> + 'd,
        PI: esp_idf_hal::gpio::OutputPin + 'd,
        P: Peripheral<P = PI> + 'd,
    {
        let timer_config = TimerConfig::default()
            .frequency(pins::FAN_PWM_FREQ_HZ.Hz())
            .resolution(Self::PWM_RESOLUTION);
        let timer_driver = LedcTimerDriver::new(timer, &timer_config)?;
        let mut channel = LedcDriver::new(channel, &timer_driver, pin)?;

        let max = channel.get_max_duty();
        channel.set_duty(max)?;

        info!(
            "Fan PWM on GPIO{} at {} Hz, {} bits",
            pins::FAN_PWM,
            pins::FAN_PWM_FREQ_HZ,
            pins::FAN_PWM_BITS
        );

        Ok(Self {
            channel,
            bits: pins::FAN_PWM_BITS,
        })
    }

    /// Raw duty currently on the pin.
    #[inline]
    pub fn duty(&self) -> u32 {
        self.channel.get_duty()
    }
}

impl PwmOutput for Esp32FanPwm<'_> {
    type Error = esp_idf_hal::sys::EspError;

    fn resolution_bits(&self) -> u8 {
        self.bits
    }

    fn set_duty(&mut self, duty: u32) -> Result<(), Self::Error> {
        let max = self.channel.max_duty_cycle();
        self.channel.set_duty_cycle(duty.min(max as u32) as u16)
    }
}
