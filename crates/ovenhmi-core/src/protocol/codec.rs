//! Wire encoding/decoding
//!
//! Every message starts with a one-byte opcode. Multi-byte fields are big-endian.
//!
//! Message layouts:
//! - Recipe: `StartRecipe`, then `u16 time, i16 temp` per step, then `EndRecipe`.
//!   The controller echoes the whole message back.
//! - SetAmbient: opcode + `i16` ambient in 0.25 °C units. No reply.
//! - SetPID: opcode + three `f32` (P, I, D). Reply is the adopted PID.
//! - PID reply: 12 bytes, three 4-byte groups, byte order reversed within each group.
//! - Sample reply: `u16 time, i16 temp, i16 ambient, u8 output` (7 bytes).
//! - Status reply: 1 byte.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::{Command, OvenError};
use crate::model::{Pid, RecipeStep, Sample, Status};

/// Length of a PID reply
pub const PID_RESPONSE_LEN: usize = 12;

/// Length of a sample reply
pub const SAMPLE_RESPONSE_LEN: usize = 7;

/// Bytes per recipe step on the wire
pub const RECIPE_STEP_LEN: usize = 4;

/// Prepend the opcode to a payload
pub fn encode_command(command: Command, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(1 + payload.len());
    bytes.push(command.opcode());
    bytes.extend_from_slice(payload);
    bytes
}

/// Encode a full recipe upload, framed by `StartRecipe`/`EndRecipe`.
///
/// This is both the outbound message and the exact echo expected back.
pub fn encode_recipe(steps: &[RecipeStep]) -> Vec<u8> {
    let mut payload = vec![0u8; steps.len() * RECIPE_STEP_LEN];
    for (step, chunk) in steps.iter().zip(payload.chunks_exact_mut(RECIPE_STEP_LEN)) {
        BigEndian::write_u16(&mut chunk[0..2], step.raw_time);
        BigEndian::write_i16(&mut chunk[2..4], step.raw_temp);
    }

    let mut bytes = encode_command(Command::StartRecipe, &payload);
    bytes.push(Command::EndRecipe.opcode());
    bytes
}

/// Encode the ambient temperature, rounded to 0.25 °C
pub fn encode_ambient(celsius: f32) -> Vec<u8> {
    let raw = (celsius * 4.0).round() as i16;
    let mut payload = [0u8; 2];
    BigEndian::write_i16(&mut payload, raw);
    encode_command(Command::SetAmbient, &payload)
}

/// Encode PID coefficients as three big-endian IEEE-754 floats
pub fn encode_pid(pid: &Pid) -> Vec<u8> {
    let mut payload = [0u8; PID_RESPONSE_LEN];
    BigEndian::write_f32_into(&pid.to_array(), &mut payload);
    encode_command(Command::SetPID, &payload)
}

/// Decode a status reply
pub fn decode_status(bytes: &[u8]) -> Result<Status, OvenError> {
    match bytes {
        [byte] => Status::from_byte(*byte).ok_or_else(|| OvenError::MalformedResponse {
            expected: format!("a status code, not {:#04x}", byte),
            actual: 1,
        }),
        _ => Err(OvenError::MalformedResponse {
            expected: "1 byte".to_string(),
            actual: bytes.len(),
        }),
    }
}

/// Decode a PID reply, checking its length
pub fn try_decode_pid(bytes: &[u8]) -> Result<Pid, OvenError> {
    if bytes.len() != PID_RESPONSE_LEN {
        return Err(OvenError::MalformedResponse {
            expected: format!("{} bytes", PID_RESPONSE_LEN),
            actual: bytes.len(),
        });
    }

    // Byte k of each 4-byte group is taken from position 3 - k of that group
    let mut raw = [0u8; PID_RESPONSE_LEN];
    for (x, slot) in raw.iter_mut().enumerate() {
        *slot = bytes[4 * (x / 4) + 3 - x % 4];
    }

    let mut values = [0f32; 3];
    LittleEndian::read_f32_into(&raw, &mut values);
    Ok(Pid::from_array(values))
}

/// Decode a PID reply. A reply of the wrong length yields all-zero coefficients.
pub fn decode_pid(bytes: &[u8]) -> Pid {
    try_decode_pid(bytes).unwrap_or(Pid::ZERO)
}

/// Decode a live sample reply
pub fn decode_sample(bytes: &[u8]) -> Result<Sample, OvenError> {
    if bytes.len() != SAMPLE_RESPONSE_LEN {
        return Err(OvenError::MalformedResponse {
            expected: format!("{} bytes", SAMPLE_RESPONSE_LEN),
            actual: bytes.len(),
        });
    }

    Ok(Sample::from_raw(
        BigEndian::read_u16(&bytes[0..2]),
        BigEndian::read_i16(&bytes[2..4]),
        BigEndian::read_i16(&bytes[4..6]),
        bytes[6],
    ))
}

/// Check that a recipe echo matches what was sent, byte for byte
pub fn verify_echo(sent: &[u8], received: &[u8]) -> Result<(), OvenError> {
    if let Some(index) = sent.iter().zip(received).position(|(a, b)| a != b) {
        return Err(OvenError::EchoMismatch { index });
    }
    if sent.len() != received.len() {
        return Err(OvenError::EchoMismatch {
            index: sent.len().min(received.len()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn reflow_profile() -> Vec<RecipeStep> {
        vec![
            RecipeStep::new(Duration::ZERO, 25.0),
            RecipeStep::new(Duration::from_secs(30 * 60), 225.0),
        ]
    }

    #[test]
    fn test_encode_recipe() {
        let bytes = encode_recipe(&reflow_profile());
        assert_eq!(
            bytes,
            vec![0x03, 0x00, 0x00, 0x00, 0x64, 0x01, 0xC2, 0x03, 0x84, 0xFF]
        );
    }

    #[test]
    fn test_encode_recipe_negative_temperature() {
        let bytes = encode_recipe(&[RecipeStep::from_raw(1, -4)]);
        assert_eq!(bytes, vec![0x03, 0x00, 0x01, 0xFF, 0xFC, 0xFF]);
    }

    #[test]
    fn test_encode_ambient() {
        assert_eq!(encode_ambient(25.0), vec![0x06, 0x00, 0x64]);
        assert_eq!(encode_ambient(-14.0), vec![0x06, 0xFF, 0xC8]);
        // 21.1 * 4 = 84.4 rounds to 84
        assert_eq!(encode_ambient(21.1), vec![0x06, 0x00, 0x54]);
    }

    #[test]
    fn test_encode_pid() {
        let bytes = encode_pid(&Pid::new(1.0, -2.0, 0.5));
        assert_eq!(
            bytes,
            vec![
                0x07, // opcode
                0x3F, 0x80, 0x00, 0x00, // 1.0
                0xC0, 0x00, 0x00, 0x00, // -2.0
                0x3F, 0x00, 0x00, 0x00, // 0.5
            ]
        );
    }

    #[test]
    fn test_decode_pid_group_order() {
        let wire = [
            0x3F, 0x80, 0x00, 0x00, // 1.0
            0x40, 0x20, 0x00, 0x00, // 2.5
            0xBE, 0x80, 0x00, 0x00, // -0.25
        ];
        assert_eq!(decode_pid(&wire), Pid::new(1.0, 2.5, -0.25));
    }

    #[test]
    fn test_decode_pid_reads_set_pid_echo() {
        let pid = Pid::new(12.5, 0.03125, 250.0);
        let sent = encode_pid(&pid);
        assert_eq!(decode_pid(&sent[1..]), pid);
    }

    #[test]
    fn test_decode_pid_wrong_length_is_zero() {
        assert_eq!(decode_pid(&[]), Pid::ZERO);
        assert_eq!(decode_pid(&[0x3F; 11]), Pid::ZERO);
        assert_eq!(decode_pid(&[0x3F; 13]), Pid::ZERO);
        assert!(try_decode_pid(&[0x3F; 11]).is_err());
    }

    #[test]
    fn test_decode_sample() {
        let sample = decode_sample(&[0x00, 0x0A, 0x03, 0x20, 0x00, 0x64, 0x3C]).unwrap();
        assert_eq!(sample.raw_time, 10);
        assert_eq!(sample.raw_temp, 800);
        assert_eq!(sample.raw_ambient, 100);
        assert_eq!(sample.raw_output, 60);
        assert_eq!(sample.time(), Duration::from_secs(40));
        assert_eq!(sample.temperature(), 200.0);
        assert_eq!(sample.ambient(), 25.0);
        assert_eq!(sample.power(), 1750.0);
    }

    #[test]
    fn test_decode_sample_wrong_length() {
        assert!(decode_sample(&[0x00; 6]).is_err());
        assert!(decode_sample(&[0x00; 8]).is_err());
    }

    #[test]
    fn test_decode_status() {
        assert_eq!(decode_status(&[0x01]).unwrap(), Status::Standby);
        assert!(decode_status(&[]).is_err());
        assert!(decode_status(&[0x01, 0x02]).is_err());
        assert!(decode_status(&[0xFF]).is_err());
    }

    #[test]
    fn test_verify_echo() {
        let sent = encode_recipe(&reflow_profile());
        assert!(verify_echo(&sent, &sent).is_ok());

        for i in 0..sent.len() {
            let mut corrupted = sent.clone();
            corrupted[i] ^= 0x01;
            assert!(matches!(
                verify_echo(&sent, &corrupted),
                Err(OvenError::EchoMismatch { index }) if index == i
            ));
        }

        assert!(verify_echo(&sent, &sent[..sent.len() - 1]).is_err());
        assert!(verify_echo(&sent, &[]).is_err());
        let mut longer = sent.clone();
        longer.push(0x00);
        assert!(verify_echo(&sent, &longer).is_err());
    }
}
