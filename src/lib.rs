//! # loconet-driver
//!
//! A portable, no_std Rust driver for LocoNet, the half-duplex,
//! multi-master serial bus used by model-railway command stations,
//! throttles, and accessory decoders.
//!
//! This driver implements the bus-access and framing layer:
//! - carrier-sense multi-master access with a randomized priority backoff
//!   (carrier + master + priority, "CMP" delay)
//! - linebreak generation and detection for collision recovery
//! - opcode-driven frame length derivation and XOR checksum verification
//! - interrupt-safe queue access with `critical-section`
//!
//! It has no notion of what any particular LocoNet opcode means — that is
//! left to a layer built on top, the same way this crate's BRG/UART
//! configuration is left to the caller's HAL.
//!
//! ## Crate features
//! | Feature        | Description |
//! |----------------|-------------|
//! | `std`          | Disables `#![no_std]` and swaps `heapless::Vec` for `std::vec::Vec` in the `codec` module |
//! | `timer-isr` (default) | Pulls in `critical-section` and the global-singleton helpers in [`timer`] |
//! | `defmt-0-3`    | Uses `defmt` for logging |
//! | `log`          | Uses the `log` facade for logging |
//!
//! ## Usage
//!
//! ```rust
//! use loconet_driver::driver::{LineSense, LnDriver, SerialTx};
//! use loconet_driver::timer::{LnTiming, OneShotTimer, TimerScheduler};
//!
//! struct NoopTimer;
//! impl OneShotTimer for NoopTimer {
//!     fn arm_us(&mut self, _us: u16) {}
//! }
//!
//! struct LoopbackLine { free: bool }
//! impl LineSense for LoopbackLine {
//!     fn is_line_free(&mut self) -> bool { self.free }
//! }
//!
//! struct NullTx;
//! impl SerialTx for NullTx {
//!     fn write_byte(&mut self, _b: u8) {}
//!     fn disable(&mut self) {}
//!     fn enable(&mut self) {}
//!     fn drive_break(&mut self, _active: bool) {}
//! }
//!
//! let scheduler = TimerScheduler::new(NoopTimer, LnTiming::default());
//! let mut driver = LnDriver::new(LoopbackLine { free: true }, NullTx, scheduler);
//! driver.enqueue_tx(0x82);
//! driver.enqueue_tx(0x7d);
//! ```
//!
//! Three entry points drive the state machine from interrupt context:
//! [`driver::LnDriver::on_timer`], [`driver::LnDriver::on_rx_byte`], and
//! [`driver::LnDriver::on_rx_framing_error`]. Under the `timer-isr` feature,
//! [`timer::ln_driver_init`]/[`timer::ln_driver_setup`] wrap a single global
//! instance in a `critical_section::Mutex` so those three calls, plus the
//! application-facing [`timer::enqueue_tx_on_global`] and
//! [`timer::dequeue_rx_from_global`], can be reached directly from
//! `#[interrupt]` handlers and `main` alike.
//!
//! ## Integration notes
//!
//! - Only one [`driver::LnDriver`] instance should exist per physical bus
//!   connection.
//! - The caller is responsible for correctly configuring the UART's baud
//!   rate generator; see [`timer::compute_brg_divisor`] and
//!   [`timer::default_brg_divisor`].
//! - This crate does not interpret opcodes, retry failed sends beyond the
//!   bus-access layer's own collision recovery, or provide a blocking
//!   send/receive API — those are left to a protocol layer built on top.
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "timer-isr")]
pub use critical_section;

#[cfg(all(feature = "timer-isr", not(feature = "std")))]
pub use heapless;

pub mod codec;
pub mod consts;
pub mod driver;
pub mod lfsr;
pub mod queue;
pub mod timer;
