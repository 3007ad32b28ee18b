//! LocoNet frame length derivation and checksum verification.
//!
//! These are pure functions over a byte slice (or a queue segment); they
//! hold no state and are safe to call from either the foreground or an
//! interrupt handler.

#[cfg(not(feature = "std"))]
use heapless::Vec;
#[cfg(feature = "std")]
use std::vec::Vec;

use crate::consts::{
    LN_CHECKSUM_TARGET, LN_MAX_FRAME_LEN, LN_OPCODE_LEN_MASK, LN_OPCODE_MSB, LN_QUEUE_CAPACITY,
};
use crate::queue::ByteRingBuffer;

/// Errors produced by the non-interrupt-path codec helpers.
///
/// None of the interrupt-driven pipeline code in [`crate::driver`] returns
/// this type — it exists for the host-facing, non-timing-critical helpers
/// below, which can fail in ways worth reporting back to a caller that is
/// free to retry or log.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LnError {
    /// The destination queue did not have room for the whole frame.
    #[error("queue is full")]
    QueueFull,
    /// A frame was requested from an empty source.
    #[error("queue is empty")]
    QueueEmpty,
    /// The given opcode is not a valid LocoNet opcode (MSB not set).
    #[error("invalid opcode: {0:#04x}")]
    InvalidOpcode(u8),
    /// The assembled frame would exceed [`crate::consts::LN_MAX_FRAME_LEN`].
    #[error("frame too long: {0} bytes")]
    FrameTooLong(usize),
}

/// The total length of a LocoNet frame, as derivable from its opcode alone
/// or requiring a second byte for the variable-length escape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLength {
    /// Total frame length is known from the opcode alone (2, 4, or 6 bytes).
    Fixed(u8),
    /// Length bits were `11`; the caller must also read byte 1 of the frame,
    /// which holds the total frame length (including opcode and checksum).
    Variable,
}

/// Derives the expected frame length from a LocoNet opcode.
///
/// Bits 5-6 of the opcode encode the length:
/// - `00` → 2-byte frame
/// - `01` → 4-byte frame
/// - `10` → 6-byte frame
/// - `11` → [`FrameLength::Variable`]; the caller must inspect byte 1
pub const fn frame_length(opcode: u8) -> FrameLength {
    match (opcode & LN_OPCODE_LEN_MASK) >> 5 {
        0b00 => FrameLength::Fixed(2),
        0b01 => FrameLength::Fixed(4),
        0b10 => FrameLength::Fixed(6),
        _ => FrameLength::Variable,
    }
}

/// XOR of every byte in `bytes`; a well-formed frame's XOR equals
/// [`crate::consts::LN_CHECKSUM_TARGET`] (`0xFF`).
pub fn checksum_of(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Whether the XOR of every byte in `bytes` equals `0xFF`.
pub fn checksum_ok(bytes: &[u8]) -> bool {
    checksum_of(bytes) == LN_CHECKSUM_TARGET
}

/// Whether the XOR of every byte currently queued in `queue` equals `0xFF`.
pub fn checksum_ok_queue(queue: &ByteRingBuffer) -> bool {
    queue.xor_all() == LN_CHECKSUM_TARGET
}

/// Assembles a well-formed LocoNet frame from an opcode and its data bytes,
/// appending the trailing checksum byte.
///
/// This is a host/test convenience — the interrupt-driven pipeline never
/// constructs frames this way, it only ever copies bytes the application
/// already pushed into `tx_queue` one at a time via
/// [`crate::driver::LnDriver::enqueue_tx`].
///
/// `opcode` must have its MSB set; `data` bytes must each have their MSB
/// clear, matching the wire convention. The assembled frame's length
/// (opcode + data + checksum) must not exceed
/// [`crate::consts::LN_MAX_FRAME_LEN`].
#[cfg(feature = "std")]
pub fn encode_frame(opcode: u8, data: &[u8]) -> Result<Vec<u8>, LnError> {
    if opcode & LN_OPCODE_MSB == 0 {
        return Err(LnError::InvalidOpcode(opcode));
    }
    let total_len = data.len() + 2;
    if total_len > LN_MAX_FRAME_LEN as usize {
        return Err(LnError::FrameTooLong(total_len));
    }
    let mut frame = Vec::with_capacity(total_len);
    frame.push(opcode);
    frame.extend_from_slice(data);
    let partial = checksum_of(&frame);
    frame.push(partial ^ LN_CHECKSUM_TARGET);
    Ok(frame)
}

/// Assembles a well-formed LocoNet frame from an opcode and its data bytes,
/// appending the trailing checksum byte.
///
/// See the `std` variant's documentation for the full contract.
#[cfg(not(feature = "std"))]
pub fn encode_frame(opcode: u8, data: &[u8]) -> Result<Vec<u8, LN_QUEUE_CAPACITY>, LnError> {
    if opcode & LN_OPCODE_MSB == 0 {
        return Err(LnError::InvalidOpcode(opcode));
    }
    let total_len = data.len() + 2;
    if total_len > LN_MAX_FRAME_LEN as usize {
        return Err(LnError::FrameTooLong(total_len));
    }
    let mut frame = Vec::new();
    let _ = frame.push(opcode);
    let _ = frame.extend_from_slice(data);
    let partial = checksum_of(&frame);
    let _ = frame.push(partial ^ LN_CHECKSUM_TARGET);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_length_covers_fixed_lengths() {
        assert_eq!(frame_length(0x80), FrameLength::Fixed(2));
        assert_eq!(frame_length(0xa0), FrameLength::Fixed(4));
        assert_eq!(frame_length(0xc0), FrameLength::Fixed(6));
        assert_eq!(frame_length(0xe0), FrameLength::Variable);
    }

    #[test]
    fn frame_length_ignores_non_length_bits() {
        // opcode = 0x80 | (n << 5); bits outside 5-6 should not matter
        assert_eq!(frame_length(0xb0), FrameLength::Fixed(4));
        assert_eq!(frame_length(0xb7), FrameLength::Fixed(4));
    }

    #[test]
    fn checksum_ok_detects_valid_and_invalid_frames() {
        assert!(checksum_ok(&[0xb0, 0x15, 0x20, 0x4b]));
        assert!(!checksum_ok(&[0xb0, 0x15, 0x20, 0x4c]));
    }

    #[test]
    fn encode_frame_produces_checksum_that_validates() {
        let frame = encode_frame(0xb0, &[0x15, 0x20]).unwrap();
        assert!(checksum_ok(&frame));
        assert_eq!(frame.len(), 4);
    }

    #[test]
    fn encode_frame_rejects_bad_opcode() {
        let err = encode_frame(0x10, &[0x01]).unwrap_err();
        assert_eq!(err, LnError::InvalidOpcode(0x10));
    }
}
