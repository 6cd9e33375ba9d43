//! HC-SR04 ultrasonic proximity ranger
//!
//! A 10 µs trigger pulse starts a measurement; the sensor answers with an
//! echo pulse whose width encodes the round-trip time. Distance is
//! `pulse_seconds * 17150` cm (speed of sound, halved for the round trip).
//! A missing or out-of-window echo is a [`Error::Timeout`], never a
//! distance of zero; one reported reading is the median of several pings.

use std::thread;
use std::time::{Duration, Instant};

use super::ProximityRanger;
use crate::config::RangerConfig;
use crate::error::{Error, Result};
use crate::gpio::SysfsPin;

/// cm per second of echo pulse width
const ECHO_CM_PER_S: f64 = 17_150.0;
/// Sensor datasheet validity window
const MIN_VALID_CM: f64 = 2.0;
const MAX_VALID_CM: f64 = 400.0;
/// Pause between pings so echoes cannot overlap
const SETTLE: Duration = Duration::from_millis(10);

/// HC-SR04 driver over two sysfs GPIO lines
pub struct UltrasonicRanger {
    trigger: SysfsPin,
    echo: SysfsPin,
    echo_timeout: Duration,
    samples: usize,
}

impl UltrasonicRanger {
    pub fn open(config: &RangerConfig) -> Result<Self> {
        let trigger = SysfsPin::output(config.trigger_pin)?;
        let echo = SysfsPin::input(config.echo_pin)?;
        log::info!(
            "Ultrasonic: trigger gpio{}, echo gpio{}, {} samples per reading",
            config.trigger_pin,
            config.echo_pin,
            config.samples
        );
        Ok(Self {
            trigger,
            echo,
            echo_timeout: Duration::from_millis(config.echo_timeout_ms),
            samples: config.samples.max(1),
        })
    }

    /// One raw ping
    fn ping(&mut self) -> Result<f64> {
        self.trigger.set(false)?;
        thread::sleep(Duration::from_micros(2));
        self.trigger.set(true)?;
        thread::sleep(Duration::from_micros(10));
        self.trigger.set(false)?;

        let deadline = Instant::now() + self.echo_timeout;
        while !self.echo.read()? {
            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
        }
        let pulse_start = Instant::now();
        while self.echo.read()? {
            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
        }

        let distance_cm = pulse_start.elapsed().as_secs_f64() * ECHO_CM_PER_S;
        if !(MIN_VALID_CM..=MAX_VALID_CM).contains(&distance_cm) {
            log::debug!("Ultrasonic: reading {:.1} cm outside validity window", distance_cm);
            return Err(Error::Timeout);
        }
        Ok(distance_cm)
    }
}

impl ProximityRanger for UltrasonicRanger {
    fn measure(&mut self) -> Result<f64> {
        let mut readings = Vec::with_capacity(self.samples);
        for i in 0..self.samples {
            match self.ping() {
                Ok(distance_cm) => readings.push(distance_cm),
                // a silent ping is skipped; the median below decides
                Err(Error::Timeout) => {}
                Err(e) => return Err(e),
            }
            if i + 1 < self.samples {
                thread::sleep(SETTLE);
            }
        }
        median_of(&mut readings).ok_or(Error::Timeout)
    }
}

/// Median of the collected pings; None when every ping failed
fn median_of(readings: &mut [f64]) -> Option<f64> {
    if readings.is_empty() {
        return None;
    }
    readings.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = readings.len() / 2;
    if readings.len() % 2 == 1 {
        Some(readings[mid])
    } else {
        Some((readings[mid - 1] + readings[mid]) / 2.0)
    }
}
