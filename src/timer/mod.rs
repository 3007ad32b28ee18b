//! Timer scheduling for the LocoNet bus-access state machine.
//!
//! The driver's notion of time is a single one-shot timer with four
//! "start" operations, each of which programs the timer and sets
//! [`crate::driver::BusMode`] together — spec requires these two writes
//! never be observed apart, so [`TimerScheduler`] bundles them into one
//! call per phase rather than leaving callers to sequence them by hand.
//!
//! Contains:
//! - [`LnTiming`]: the overridable timing budget (defaults match the
//!   reference PIC18 firmware at `F_osc` = 32 MHz)
//! - [`OneShotTimer`]: the trait a caller implements over its hardware timer
//! - [`TimerScheduler`]: owns the timer and timing budget, exposes
//!   `start_idle_delay` / `start_cmp_delay` / `start_linebreak` /
//!   `start_brg_sync`
//! - [`compute_brg_divisor`]: runtime BRG divisor calculator
//! - [`const_brg_divisor`]: compile-time BRG divisor calculator

#[cfg(feature = "timer-isr")]
mod isr;
#[cfg(feature = "timer-isr")]
pub use isr::*;

use crate::consts::{
    LN_BAUD_RATE, LN_BRG_SYNC_US, LN_CMP_BASE_DELAY_US, LN_CMP_PRIORITY_MASK, LN_IDLE_DELAY_US,
    LN_LINEBREAK_EXTENSION_US, LN_LINEBREAK_FULL_US,
};
use crate::driver::BusMode;
use crate::lfsr;
use libm::round;

/// Overridable timing budget for the bus-access state machine.
///
/// Defaults correspond to the values spec'd for a 32 MHz reference
/// oscillator; a caller targeting a different clock or a deliberately
/// different backoff profile can substitute its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LnTiming {
    /// Arm time, in microseconds, for [`TimerScheduler::start_idle_delay`].
    pub idle_delay_us: u16,
    /// Carrier + master portion of the CMP backoff, in microseconds.
    pub cmp_base_delay_us: u16,
    /// Mask applied to the LFSR output to produce the 0..1023 µs priority slot.
    pub cmp_priority_mask: u16,
    /// Full linebreak duration, in microseconds, when this device initiates it.
    pub linebreak_full_us: u16,
    /// Linebreak extension, in microseconds, completing a remote-initiated break.
    pub linebreak_extension_us: u16,
    /// BRG resynchronisation arm time, in microseconds.
    pub brg_sync_us: u16,
}

impl Default for LnTiming {
    fn default() -> Self {
        Self {
            idle_delay_us: LN_IDLE_DELAY_US,
            cmp_base_delay_us: LN_CMP_BASE_DELAY_US,
            cmp_priority_mask: LN_CMP_PRIORITY_MASK,
            linebreak_full_us: LN_LINEBREAK_FULL_US,
            linebreak_extension_us: LN_LINEBREAK_EXTENSION_US,
            brg_sync_us: LN_BRG_SYNC_US,
        }
    }
}

/// A one-shot, microsecond-resolution timer.
///
/// Implementations arm the timer to fire exactly once, `us` microseconds
/// from now, and route the resulting interrupt to
/// [`crate::driver::LnDriver::on_timer`]. Re-arming before expiry (as every
/// `start_*` call here does) must cancel the pending expiry and restart the
/// count.
pub trait OneShotTimer {
    /// Arms the timer to fire once after `us` microseconds.
    fn arm_us(&mut self, us: u16);
}

/// Bundles a [`OneShotTimer`] with the [`LnTiming`] budget and offers the
/// four phase-start operations the bus-access FSM uses.
///
/// Each `start_*` method both arms the timer and returns the [`BusMode`]
/// the caller should adopt, so the two updates are always made together.
#[derive(Debug, Clone, Copy)]
pub struct TimerScheduler<T: OneShotTimer> {
    timer: T,
    /// The timing budget in effect.
    pub timing: LnTiming,
}

impl<T: OneShotTimer> TimerScheduler<T> {
    /// Wraps a concrete timer with the given timing budget.
    pub const fn new(timer: T, timing: LnTiming) -> Self {
        Self { timer, timing }
    }

    /// Arms the idle delay and returns [`BusMode::Idle`].
    pub fn start_idle_delay(&mut self) -> BusMode {
        self.timer.arm_us(self.timing.idle_delay_us);
        BusMode::Idle
    }

    /// Advances `lfsr_state`, arms the CMP backoff (base delay plus a
    /// randomized 0..1023 µs priority slot), and returns
    /// [`BusMode::CmpBackoff`].
    pub fn start_cmp_delay(&mut self, lfsr_state: &mut u16) -> BusMode {
        *lfsr_state = lfsr::next(*lfsr_state);
        let jitter = *lfsr_state & self.timing.cmp_priority_mask;
        self.timer
            .arm_us(self.timing.cmp_base_delay_us.saturating_add(jitter));
        BusMode::CmpBackoff
    }

    /// Arms a linebreak of the given duration and returns
    /// [`BusMode::Linebreak`].
    ///
    /// Typical values: `timing.linebreak_full_us` (900 µs) when this device
    /// initiates the break, `timing.linebreak_extension_us` (300 µs) to
    /// complete a remote-initiated break whose detection already consumed
    /// the first ~600 µs.
    pub fn start_linebreak(&mut self, us: u16) -> BusMode {
        self.timer.arm_us(us);
        BusMode::Linebreak
    }

    /// Arms the BRG resync delay and returns [`BusMode::BrgSync`].
    pub fn start_brg_sync(&mut self) -> BusMode {
        self.timer.arm_us(self.timing.brg_sync_us);
        BusMode::BrgSync
    }

    /// Returns the wrapped timer, consuming the scheduler.
    pub fn into_inner(self) -> T {
        self.timer
    }
}

/// Computes the baud-rate-generator divisor for a UART configured for
/// asynchronous, 16x-oversampled operation.
///
/// `((f_osc / baud) / 16) - 1`, rounded to the nearest integer. At
/// `f_osc` = 32 MHz and `baud` = 16,666 this is 119, matching the reference
/// firmware's `SPBRG` value.
pub fn compute_brg_divisor(f_osc: u32, baud: u32) -> u16 {
    let divisor = (f_osc as f64) / (baud as f64) / 16.0 - 1.0;
    round(divisor) as u16
}

/// Compile-time baud-rate-generator divisor calculator.
///
/// See [`compute_brg_divisor`] for the formula; this variant avoids a
/// runtime float division where the caller's clock and baud rate are known
/// at compile time, at the cost of truncating rather than rounding.
pub const fn const_brg_divisor(f_osc: u32, baud: u32) -> u16 {
    ((f_osc / baud) / 16 - 1) as u16
}

/// Computes the divisor for the canonical 32 MHz / 16,666 baud configuration.
pub const fn default_brg_divisor() -> u16 {
    const_brg_divisor(crate::consts::LN_REFERENCE_F_OSC, LN_BAUD_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeTimer {
        armed_us: Option<u16>,
    }

    impl OneShotTimer for FakeTimer {
        fn arm_us(&mut self, us: u16) {
            self.armed_us = Some(us);
        }
    }

    #[test]
    fn start_idle_delay_arms_and_sets_mode() {
        let mut sched = TimerScheduler::new(FakeTimer::default(), LnTiming::default());
        let mode = sched.start_idle_delay();
        assert_eq!(mode, BusMode::Idle);
        assert_eq!(sched.timer.armed_us, Some(LN_IDLE_DELAY_US));
    }

    #[test]
    fn start_cmp_delay_stays_within_spec_bounds() {
        let mut sched = TimerScheduler::new(FakeTimer::default(), LnTiming::default());
        let mut lfsr_state = 1234u16;
        for _ in 0..200 {
            let mode = sched.start_cmp_delay(&mut lfsr_state);
            assert_eq!(mode, BusMode::CmpBackoff);
            let armed = sched.timer.armed_us.unwrap();
            assert!((1_560..=2_583).contains(&armed));
        }
    }

    #[test]
    fn start_linebreak_arms_requested_duration() {
        let mut sched = TimerScheduler::new(FakeTimer::default(), LnTiming::default());
        let mode = sched.start_linebreak(900);
        assert_eq!(mode, BusMode::Linebreak);
        assert_eq!(sched.timer.armed_us, Some(900));
    }

    #[test]
    fn start_brg_sync_arms_one_bit_time() {
        let mut sched = TimerScheduler::new(FakeTimer::default(), LnTiming::default());
        let mode = sched.start_brg_sync();
        assert_eq!(mode, BusMode::BrgSync);
        assert_eq!(sched.timer.armed_us, Some(LN_BRG_SYNC_US));
    }

    #[test]
    fn brg_divisor_matches_reference_firmware() {
        assert_eq!(compute_brg_divisor(32_000_000, 16_666), 119);
        assert_eq!(const_brg_divisor(32_000_000, 16_666), 119);
        assert_eq!(default_brg_divisor(), 119);
    }
}
