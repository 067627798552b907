//! Protocol errors

use thiserror::Error;

use crate::model::RecipeError;

/// Errors that can occur while talking to the oven controller
#[derive(Error, Debug)]
pub enum OvenError {
    /// No serial device identifier contains the vendor hint
    #[error("No serial device matching '{0}' was found")]
    NoDevice(String),

    /// The device did not finish replying in time
    #[error("Timed out waiting for the oven")]
    TransportTimeout,

    /// The transport failed or the device hung up
    #[error("Serial I/O error: {0}")]
    TransportIo(String),

    /// A reply had the wrong length or content
    #[error("Malformed response: expected {expected}, got {actual} bytes")]
    MalformedResponse {
        /// What the reply should have been
        expected: String,
        /// Bytes actually received
        actual: usize,
    },

    /// The recipe echo differs from what was sent
    #[error("Recipe echo mismatch at byte {index}")]
    EchoMismatch {
        /// First differing byte
        index: usize,
    },

    /// The recipe was refused before sending
    #[error("Invalid recipe: {0}")]
    InvalidRecipe(#[from] RecipeError),
}

impl OvenError {
    /// Whether this error means the link itself is unusable and must be re-discovered.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            OvenError::NoDevice(_) | OvenError::TransportTimeout | OvenError::TransportIo(_)
        )
    }
}

impl From<std::io::Error> for OvenError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut => OvenError::TransportTimeout,
            _ => OvenError::TransportIo(e.to_string()),
        }
    }
}

impl From<serialport::Error> for OvenError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::Io(std::io::ErrorKind::TimedOut) => OvenError::TransportTimeout,
            _ => OvenError::TransportIo(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(OvenError::TransportTimeout.is_transport());
        assert!(OvenError::NoDevice("USB".into()).is_transport());
        assert!(OvenError::TransportIo("broken pipe".into()).is_transport());
        assert!(!OvenError::EchoMismatch { index: 3 }.is_transport());
        assert!(!OvenError::MalformedResponse {
            expected: "7 bytes".into(),
            actual: 2
        }
        .is_transport());
    }

    #[test]
    fn test_io_timeout_maps_to_transport_timeout() {
        let err: OvenError = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow").into();
        assert!(matches!(err, OvenError::TransportTimeout));

        let err: OvenError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(err, OvenError::TransportIo(_)));
    }

    #[test]
    fn test_error_display() {
        let err = OvenError::NoDevice("USB".into());
        assert_eq!(err.to_string(), "No serial device matching 'USB' was found");
    }
}
