//! Constants used across the LocoNet framing and bus-access implementation.
//!
//! These values are fixed by the LocoNet wire protocol and by the timing
//! budget of the carrier-sense backoff scheme; see [`crate::timer::LnTiming`]
//! for the overridable counterparts used at runtime.

/// Capacity, in bytes, of each of the four ring buffers the driver owns.
///
/// A LocoNet frame is at most 128 bytes, so one buffer never needs to hold
/// more than one frame's worth of bytes at a time even at capacity.
pub const LN_QUEUE_CAPACITY: usize = 128;

/// Minimum possible frame length (opcode + checksum, length bits `00`).
pub const LN_MIN_FRAME_LEN: u8 = 2;

/// Maximum possible frame length (variable-length frame, length byte in byte 1).
pub const LN_MAX_FRAME_LEN: u8 = 128;

/// Mask isolating the length bits (bits 5-6) of a LocoNet opcode.
pub const LN_OPCODE_LEN_MASK: u8 = 0x60;

/// Bit that must be set on the first byte (opcode) of every frame.
pub const LN_OPCODE_MSB: u8 = 0x80;

/// Target value of the XOR of every byte in a well-formed frame.
pub const LN_CHECKSUM_TARGET: u8 = 0xff;

/// Galois LFSR feedback polynomial used for the CMP priority slot.
pub const LN_LFSR_POLY: u16 = 0xb400;

/// Default LFSR seed, matching the original PIC18 firmware's `lastRandomValue`.
pub const LN_LFSR_DEFAULT_SEED: u16 = 1234;

/// Default idle-mode timer arm, in microseconds.
pub const LN_IDLE_DELAY_US: u16 = 1_000;

/// Carrier + master portion of the CMP backoff, in microseconds
/// (1,200 µs carrier wait + 360 µs master slot).
pub const LN_CMP_BASE_DELAY_US: u16 = 1_560;

/// Mask applied to the LFSR output to produce the 0..1023 µs priority slot.
pub const LN_CMP_PRIORITY_MASK: u16 = 0x3ff;

/// Full linebreak duration, in microseconds, when this device initiates the break.
pub const LN_LINEBREAK_FULL_US: u16 = 900;

/// Linebreak extension, in microseconds, to complete a remote-initiated break
/// whose first ~600 µs were consumed detecting the framing error.
pub const LN_LINEBREAK_EXTENSION_US: u16 = 300;

/// BRG resynchronisation arm time, in microseconds (approximately one bit time).
pub const LN_BRG_SYNC_US: u16 = 60;

/// LocoNet baud rate, bits per second.
pub const LN_BAUD_RATE: u32 = 16_666;

/// Reference oscillator frequency used by [`crate::timer::compute_brg_divisor`]'s
/// worked example (32 MHz, matching the original PIC18 firmware).
pub const LN_REFERENCE_F_OSC: u32 = 32_000_000;
