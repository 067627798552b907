//! Live telemetry samples

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Heater power at full PWM duty, in watts
pub const MAX_POWER: f32 = 3500.0;

/// Number of PWM duty steps in one control period
pub const PWM_STEPS: u8 = 120;

/// One reading of the oven's state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Time since recipe start (LSB = 4 s)
    pub raw_time: u16,
    /// Oven temperature (LSB = 0.25 °C)
    pub raw_temp: i16,
    /// Modelled ambient temperature (LSB = 0.25 °C)
    pub raw_ambient: i16,
    /// Heater PWM duty, 0..=PWM_STEPS
    pub raw_output: u8,
    /// When the client received the reading
    pub captured_at: DateTime<Utc>,
}

impl Sample {
    /// Build a sample from raw wire fields, stamped with the current time
    pub fn from_raw(raw_time: u16, raw_temp: i16, raw_ambient: i16, raw_output: u8) -> Self {
        Self {
            raw_time,
            raw_temp,
            raw_ambient,
            raw_output,
            captured_at: Utc::now(),
        }
    }

    /// Time since recipe start
    pub fn time(&self) -> Duration {
        Duration::from_secs(self.raw_time as u64 * 4)
    }

    /// Temperature in °C
    pub fn temperature(&self) -> f32 {
        self.raw_temp as f32 * 0.25
    }

    /// Ambient temperature in °C
    pub fn ambient(&self) -> f32 {
        self.raw_ambient as f32 * 0.25
    }

    /// Estimated heater output in watts
    pub fn power(&self) -> f32 {
        MAX_POWER * self.raw_output as f32 / PWM_STEPS as f32
    }
}
