//! Critical-section-guarded global driver access.
//!
//! Exactly one [`LnDriver`] instance should be active on a given bus
//! connection. These helpers wrap it in a `Mutex<RefCell<Option<..>>>` so it
//! can live in a `static`, be initialized once at startup, and be reached
//! safely from both the foreground and the timer/serial interrupt handlers
//! without the caller hand-rolling the `critical_section::with` boilerplate
//! at every call site.

use crate::driver::{LineSense, LnDriver, SerialTx};
use crate::timer::{LnTiming, OneShotTimer, TimerScheduler};
use core::cell::RefCell;
use critical_section::Mutex;

/// Creates the empty, `const`-initializable cell a `static` holds before
/// [`ln_driver_setup`] installs a driver into it.
///
/// # Example
/// ```rust,ignore
/// static LN_DRIVER: Mutex<RefCell<Option<LnDriver<Line, Tx, Timer>>>> =
///     ln_driver_init::<Line, Tx, Timer>();
/// ```
pub const fn ln_driver_init<LS, TX, TMR>() -> Mutex<RefCell<Option<LnDriver<LS, TX, TMR>>>>
where
    LS: LineSense,
    TX: SerialTx,
    TMR: OneShotTimer,
{
    Mutex::new(RefCell::new(None))
}

/// Builds an [`LnDriver`] from its peripherals and installs it into the
/// global cell created by [`ln_driver_init`].
pub fn ln_driver_setup<LS, TX, TMR>(
    global_driver: &'static Mutex<RefCell<Option<LnDriver<LS, TX, TMR>>>>,
    line_sense: LS,
    tx: TX,
    timer: TMR,
    timing: LnTiming,
) where
    LS: LineSense,
    TX: SerialTx,
    TMR: OneShotTimer,
{
    critical_section::with(|cs| {
        let scheduler = TimerScheduler::new(timer, timing);
        let driver = LnDriver::new(line_sense, tx, scheduler);
        global_driver.borrow(cs).replace(Some(driver));
    });
}

/// Runs [`LnDriver::on_timer`] on the global driver. Call from the one-shot
/// timer's interrupt handler.
pub fn ln_on_timer<LS, TX, TMR>(global_driver: &'static Mutex<RefCell<Option<LnDriver<LS, TX, TMR>>>>)
where
    LS: LineSense,
    TX: SerialTx,
    TMR: OneShotTimer,
{
    critical_section::with(|cs| {
        if let Some(driver) = global_driver.borrow(cs).borrow_mut().as_mut() {
            driver.on_timer();
        }
    });
}

/// Runs [`LnDriver::on_rx_byte`] on the global driver. Call from the serial
/// receiver's interrupt handler with the byte just shifted in.
pub fn ln_on_rx_byte<LS, TX, TMR>(
    global_driver: &'static Mutex<RefCell<Option<LnDriver<LS, TX, TMR>>>>,
    byte: u8,
) where
    LS: LineSense,
    TX: SerialTx,
    TMR: OneShotTimer,
{
    critical_section::with(|cs| {
        if let Some(driver) = global_driver.borrow(cs).borrow_mut().as_mut() {
            driver.on_rx_byte(byte);
        }
    });
}

/// Runs [`LnDriver::on_rx_framing_error`] on the global driver. Call from
/// the serial receiver's interrupt handler when a framing error (the
/// remote linebreak signal) is detected instead of a byte.
pub fn ln_on_rx_framing_error<LS, TX, TMR>(
    global_driver: &'static Mutex<RefCell<Option<LnDriver<LS, TX, TMR>>>>,
) where
    LS: LineSense,
    TX: SerialTx,
    TMR: OneShotTimer,
{
    critical_section::with(|cs| {
        if let Some(driver) = global_driver.borrow(cs).borrow_mut().as_mut() {
            driver.on_rx_framing_error();
        }
    });
}

/// Pushes one byte onto the global driver's outbound queue. Safe to call
/// from the foreground: the whole operation runs inside one critical
/// section, so it cannot race the ISR entry points above.
pub fn enqueue_tx_on_global<LS, TX, TMR>(
    global_driver: &'static Mutex<RefCell<Option<LnDriver<LS, TX, TMR>>>>,
    byte: u8,
) -> bool
where
    LS: LineSense,
    TX: SerialTx,
    TMR: OneShotTimer,
{
    critical_section::with(|cs| {
        global_driver
            .borrow(cs)
            .borrow_mut()
            .as_mut()
            .is_some_and(|driver| driver.enqueue_tx(byte))
    })
}

/// Pops one byte from the global driver's inbound queue, or `None` if
/// empty or uninitialized.
pub fn dequeue_rx_from_global<LS, TX, TMR>(
    global_driver: &'static Mutex<RefCell<Option<LnDriver<LS, TX, TMR>>>>,
) -> Option<u8>
where
    LS: LineSense,
    TX: SerialTx,
    TMR: OneShotTimer,
{
    critical_section::with(|cs| {
        global_driver
            .borrow(cs)
            .borrow_mut()
            .as_mut()
            .and_then(|driver| driver.dequeue_rx())
    })
}
