//! Protocol commands
//!
//! Defines the opcodes understood by the oven controller firmware.

use serde::{Deserialize, Serialize};

/// Protocol commands for oven communication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Start executing the loaded recipe
    Start,

    /// Stop running and turn the heater off
    Stop,

    /// Marks the beginning of a recipe upload
    StartRecipe,

    /// Get the current time/temperature/ambient/output reading
    GetCurrentSample,

    /// Get the current status code
    GetStatus,

    /// Set the ambient temperature used by the thermal model
    SetAmbient,

    /// Set PID coefficients (echoes the adopted values)
    SetPID,

    /// Get the currently adopted PID coefficients
    GetPID,

    /// Marks the end of a recipe upload
    EndRecipe,
}

impl Command {
    /// All commands, in opcode order
    pub const ALL: [Command; 9] = [
        Command::Start,
        Command::Stop,
        Command::StartRecipe,
        Command::GetCurrentSample,
        Command::GetStatus,
        Command::SetAmbient,
        Command::SetPID,
        Command::GetPID,
        Command::EndRecipe,
    ];

    /// Get the wire opcode byte
    pub fn opcode(&self) -> u8 {
        match self {
            Command::Start => 0x01,
            Command::Stop => 0x02,
            Command::StartRecipe => 0x03,
            Command::GetCurrentSample => 0x04,
            Command::GetStatus => 0x05,
            Command::SetAmbient => 0x06,
            Command::SetPID => 0x07,
            Command::GetPID => 0x08,
            Command::EndRecipe => 0xFF,
        }
    }

    /// Look up a command by its wire opcode
    pub fn from_opcode(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.opcode() == byte)
    }

    /// Check if the firmware replies to this command
    pub fn expects_response(&self) -> bool {
        !matches!(self, Command::SetAmbient | Command::EndRecipe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_bytes() {
        assert_eq!(Command::Start.opcode(), 0x01);
        assert_eq!(Command::GetStatus.opcode(), 0x05);
        assert_eq!(Command::GetPID.opcode(), 0x08);
        assert_eq!(Command::EndRecipe.opcode(), 0xFF);
    }

    #[test]
    fn test_from_opcode() {
        for cmd in Command::ALL {
            assert_eq!(Command::from_opcode(cmd.opcode()), Some(cmd));
        }
        assert_eq!(Command::from_opcode(0x00), None);
        assert_eq!(Command::from_opcode(0x09), None);
    }

    #[test]
    fn test_command_response() {
        assert!(Command::GetStatus.expects_response());
        assert!(Command::SetPID.expects_response());
        assert!(!Command::SetAmbient.expects_response());
    }
}
