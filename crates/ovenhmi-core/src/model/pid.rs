//! PID controller coefficients

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseFloatError;
use std::str::FromStr;
use thiserror::Error;

/// Proportional/integral/derivative gains as held by the controller
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pid {
    /// Proportional gain
    pub proportional: f32,
    /// Integral gain
    pub integral: f32,
    /// Derivative gain
    pub derivative: f32,
}

/// Error parsing the `"p,i,d"` text form
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsePidError {
    /// Wrong number of fields
    #[error("expected 3 comma separated values, got {0}")]
    FieldCount(usize),

    /// A field is not a number
    #[error("invalid coefficient '{value}': {source}")]
    Coefficient {
        /// The offending text
        value: String,
        /// Why it did not parse
        source: ParseFloatError,
    },
}

impl Pid {
    /// All gains zero; also what a failed PID exchange yields
    pub const ZERO: Pid = Pid::new(0.0, 0.0, 0.0);

    /// Build from the three gains
    pub const fn new(proportional: f32, integral: f32, derivative: f32) -> Self {
        Self {
            proportional,
            integral,
            derivative,
        }
    }

    /// Coefficients in wire order
    pub fn to_array(&self) -> [f32; 3] {
        [self.proportional, self.integral, self.derivative]
    }

    /// Build from gains in wire order
    pub fn from_array([p, i, d]: [f32; 3]) -> Self {
        Self::new(p, i, d)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.proportional, self.integral, self.derivative)
    }
}

impl FromStr for Pid {
    type Err = ParsePidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(ParsePidError::FieldCount(parts.len()));
        }

        let mut values = [0.0f32; 3];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|source| ParsePidError::Coefficient {
                    value: part.to_string(),
                    source,
                })?;
        }
        Ok(Self::from_array(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_round_trip() {
        for pid in [
            Pid::new(1.5, 0.25, 10.0),
            Pid::new(0.1, 0.2, 0.3),
            Pid::new(-3.75, 1e-7, 123456.79),
            Pid::ZERO,
        ] {
            let text = pid.to_string();
            assert_eq!(text.parse::<Pid>(), Ok(pid), "round trip of {text}");
        }
    }

    #[test]
    fn test_text_format() {
        assert_eq!(Pid::new(2.0, 0.5, 1.25).to_string(), "2,0.5,1.25");
        assert_eq!(" 2 , 0.5,1.25".parse::<Pid>(), Ok(Pid::new(2.0, 0.5, 1.25)));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("1,2".parse::<Pid>(), Err(ParsePidError::FieldCount(2)));
        assert_eq!("1,2,3,4".parse::<Pid>(), Err(ParsePidError::FieldCount(4)));
        assert!(matches!(
            "1,x,3".parse::<Pid>(),
            Err(ParsePidError::Coefficient { value, .. }) if value == "x"
        ));
    }

    #[test]
    fn test_equality_is_component_wise() {
        assert_eq!(Pid::new(1.0, 2.0, 3.0), Pid::from_array([1.0, 2.0, 3.0]));
        assert_ne!(Pid::new(1.0, 2.0, 3.0), Pid::new(1.0, 2.0, 3.5));
    }
}
