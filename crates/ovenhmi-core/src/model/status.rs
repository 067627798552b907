//! Oven status codes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Device-reported state, plus two client-local sentinels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Status {
    /// No recipe loaded
    WaitingForRecipe = 0x00,
    /// Recipe loaded, ready to start
    Standby = 0x01,
    /// Running the recipe
    Running = 0x02,
    /// Controller has faulted
    Faulted = 0x03,
    /// Reported once after a controller reset
    NeedRestart = 0x04,
    /// Local only: the link is occupied by another request
    Busy = 0xFE,
    /// Local only: the serial link could not be used
    NotConnected = 0xFF,
}

impl Status {
    /// Decode a status byte as sent by the firmware.
    ///
    /// The local sentinels are never accepted from the wire.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Status::WaitingForRecipe),
            0x01 => Some(Status::Standby),
            0x02 => Some(Status::Running),
            0x03 => Some(Status::Faulted),
            0x04 => Some(Status::NeedRestart),
            _ => None,
        }
    }

    /// Raw status code
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// True for statuses synthesized by the client rather than reported by the device
    pub fn is_local(&self) -> bool {
        matches!(self, Status::Busy | Status::NotConnected)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::WaitingForRecipe => "WaitingForRecipe",
            Status::Standby => "Standby",
            Status::Running => "Running",
            Status::Faulted => "Faulted",
            Status::NeedRestart => "NeedRestart",
            Status::Busy => "Busy",
            Status::NotConnected => "NotConnected",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_statuses() {
        assert_eq!(Status::from_byte(0), Some(Status::WaitingForRecipe));
        assert_eq!(Status::from_byte(2), Some(Status::Running));
        assert_eq!(Status::from_byte(4), Some(Status::NeedRestart));
        assert_eq!(Status::from_byte(5), None);
    }

    #[test]
    fn test_local_sentinels_not_decoded() {
        assert_eq!(Status::from_byte(0xFE), None);
        assert_eq!(Status::from_byte(0xFF), None);
        assert!(Status::Busy.is_local());
        assert!(Status::NotConnected.is_local());
        assert!(!Status::Standby.is_local());
        assert_eq!(Status::NotConnected.code(), 0xFF);
    }
}
