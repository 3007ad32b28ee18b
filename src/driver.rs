//! LocoNet bus driver: carrier-sense multi-master access and framing.
//!
//! This module provides the [`LnDriver`] struct, which implements the whole
//! bus-access state machine and the receive/transmit framing pipelines for
//! LocoNet, a half-duplex multi-master serial bus used for model-railway
//! command and control.
//!
//! The driver is opcode-agnostic: it derives frame length from the opcode's
//! length bits (see [`crate::codec::frame_length`]) and verifies the
//! trailing XOR checksum, but has no notion of what any particular opcode
//! means. It owns no peripherals directly; instead it is generic over three
//! small traits ([`LineSense`], [`SerialTx`], [`crate::timer::OneShotTimer`])
//! that the caller implements against its configured UART, timer and
//! comparator-driven line-idle indicator.
//!
//! ## Driving the state machine
//!
//! Three entry points drive everything after construction:
//! - [`LnDriver::on_timer`] — call from the one-shot timer's interrupt
//! - [`LnDriver::on_rx_byte`] — call from the serial receiver's interrupt
//!   with the byte just received
//! - [`LnDriver::on_rx_framing_error`] — call from the serial receiver's
//!   interrupt when a framing error (the remote linebreak signal) is
//!   detected instead of a byte
//!
//! Application code only ever touches [`LnDriver::enqueue_tx`] and
//! [`LnDriver::dequeue_rx`]; both must be called with interrupts masked
//! with respect to this driver's ISR entry points, or routed through the
//! critical-section-guarded singleton helpers in [`crate::timer`] (under
//! the `timer-isr` feature).

use crate::codec::{checksum_ok_queue, frame_length, FrameLength};
use crate::consts::{LN_LFSR_DEFAULT_SEED, LN_OPCODE_MSB};
use crate::queue::ByteRingBuffer;
use crate::timer::{LnTiming, OneShotTimer, TimerScheduler};

/// A read-only line-idle indicator.
///
/// On the reference hardware this combines a comparator-driven digital pin
/// (high when the bus is electrically idle) with the UART's own "receiver
/// idle" status flag; the driver only needs the combined boolean.
///
/// Any `embedded_hal::digital::InputPin` implements this automatically
/// (`is_high` is treated as "line free"), which covers the common case of a
/// single comparator output pin directly gating bus access. A caller that
/// needs to combine more than one hardware signal implements this trait
/// directly on its own wrapper type instead.
pub trait LineSense {
    /// Returns `true` if the bus is currently idle (no carrier present and
    /// the receiver is not mid-reception).
    fn is_line_free(&mut self) -> bool;
}

impl<P: embedded_hal::digital::InputPin> LineSense for P {
    fn is_line_free(&mut self) -> bool {
        self.is_high().unwrap_or(false)
    }
}

/// The serial transmitter side of the UART peripheral, plus the raw
/// line-drive control needed to emit a linebreak.
///
/// A linebreak is a deliberate UART framing violation: the transmitter is
/// disabled and the line is held in its active state directly (bypassing
/// the UART's normal start/stop bit framing) for a fixed duration.
pub trait SerialTx {
    /// Loads one byte into the transmit register. The caller (the driver)
    /// guarantees this is only called when the previous byte has finished
    /// shifting out.
    fn write_byte(&mut self, byte: u8);
    /// Disables the transmitter, releasing direct control of the line to
    /// [`SerialTx::drive_break`].
    fn disable(&mut self);
    /// Re-enables the transmitter after a linebreak completes.
    fn enable(&mut self);
    /// Drives the line directly to its active (`true`) or idle (`false`)
    /// level, bypassing UART framing. Only valid while disabled.
    fn drive_break(&mut self, active: bool);
}

/// Bus-access mode of the state machine.
///
/// The mode always reflects the phase of the currently-armed one-shot
/// timer; a `TimerScheduler::start_*` call and an assignment to this field
/// are never observed apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusMode {
    /// No timer-driven activity pending beyond the idle-refresh delay;
    /// checked for work (pending TX) each time it expires.
    Idle,
    /// Running the carrier + master + randomized priority backoff before
    /// attempting to claim the bus.
    CmpBackoff,
    /// Emitting or completing a linebreak (collision or remote-abort signal).
    Linebreak,
    /// Waiting for the baud-rate generator to resynchronise before writing
    /// the first byte of a frame.
    BrgSync,
}

/// Diagnostic counters updated only from interrupt context.
///
/// These are pure observability: no part of the state machine reads them
/// back to make a decision. They saturate rather than wrap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LnStats {
    /// Frames fully transmitted and acknowledged by self-read.
    pub frames_sent: u16,
    /// Frames received with a valid checksum and committed to `rx_queue`.
    pub frames_received: u16,
    /// Frames dropped from `rx_temp_queue` for failing checksum verification.
    pub checksum_errors: u16,
    /// Self-read mismatches while transmitting (collisions).
    pub collisions: u16,
    /// Linebreaks this device emitted (collision or failed-CS response).
    pub linebreaks_sent: u16,
    /// Remote-initiated linebreaks (framing errors) observed.
    pub linebreaks_received: u16,
}

/// The LocoNet bus driver: four ring buffers, the bus-access FSM, and the
/// receive/transmit framing pipelines.
///
/// Generic over the line-idle sense (`LS`), the serial transmitter (`TX`),
/// and the one-shot timer (`TMR`), so the driver itself never touches a
/// concrete peripheral register.
#[derive(Debug)]
pub struct LnDriver<LS, TX, TMR>
where
    LS: LineSense,
    TX: SerialTx,
    TMR: OneShotTimer,
{
    /// Application → driver outbound byte queue.
    tx_queue: ByteRingBuffer,
    /// Driver scratch holding the one frame currently being transmitted.
    tx_temp_queue: ByteRingBuffer,
    /// Driver → application inbound byte queue.
    rx_queue: ByteRingBuffer,
    /// Driver scratch holding the partial frame currently being received.
    rx_temp_queue: ByteRingBuffer,

    line_sense: LS,
    tx: TX,
    scheduler: TimerScheduler<TMR>,

    mode: BusMode,
    lfsr_state: u16,

    /// Snapshot of `tx_temp_queue`'s head/count taken the instant a frame
    /// finishes staging, before any byte of it is written or echoed. A
    /// framing error mid-transmission restores `tx_temp_queue` to this
    /// snapshot rather than its live state, so bytes already consumed by
    /// confirmed self-read echoes are re-staged along with the rest.
    tx_committed_head: usize,
    tx_committed_count: usize,

    /// Diagnostic counters; read-only from the foreground.
    pub stats: LnStats,
}

impl<LS, TX, TMR> LnDriver<LS, TX, TMR>
where
    LS: LineSense,
    TX: SerialTx,
    TMR: OneShotTimer,
{
    /// Builds a new driver and enters the initial `CmpBackoff` mode.
    ///
    /// Per spec, the driver starts in backoff rather than idle so it does
    /// not preempt traffic that may already be in progress on the bus.
    pub fn new(line_sense: LS, tx: TX, mut scheduler: TimerScheduler<TMR>) -> Self {
        let mut lfsr_state = LN_LFSR_DEFAULT_SEED;
        let mode = scheduler.start_cmp_delay(&mut lfsr_state);
        Self {
            tx_queue: ByteRingBuffer::new(),
            tx_temp_queue: ByteRingBuffer::new(),
            rx_queue: ByteRingBuffer::new(),
            rx_temp_queue: ByteRingBuffer::new(),
            line_sense,
            tx,
            scheduler,
            mode,
            lfsr_state,
            tx_committed_head: 0,
            tx_committed_count: 0,
            stats: LnStats::default(),
        }
    }

    /// Builds a new driver with an explicit timing budget, in place of the
    /// reference 32 MHz defaults.
    pub fn with_timing(line_sense: LS, tx: TX, timer: TMR, timing: LnTiming) -> Self {
        Self::new(line_sense, tx, TimerScheduler::new(timer, timing))
    }

    /// The timing budget currently in effect.
    pub const fn timing(&self) -> &LnTiming {
        &self.scheduler.timing
    }

    /// The current bus-access mode.
    pub const fn mode(&self) -> BusMode {
        self.mode
    }

    /// Pushes one byte of an application-assembled frame into `tx_queue`.
    ///
    /// The application is responsible for pushing a complete, well-formed
    /// frame: an opcode byte with MSB set, followed by data bytes with MSB
    /// clear, ending in a checksum byte making the whole frame's XOR
    /// `0xFF`. Returns `false` if `tx_queue` is full; the driver performs no
    /// internal retry.
    pub fn enqueue_tx(&mut self, byte: u8) -> bool {
        self.tx_queue.enqueue(byte)
    }

    /// Pops one byte from `rx_queue`, or `None` if empty.
    ///
    /// Callers reassemble frames using the same MSB convention used on the
    /// wire: a byte with MSB set starts a new frame.
    pub fn dequeue_rx(&mut self) -> Option<u8> {
        self.rx_queue.dequeue()
    }

    /// Timer interrupt entry point.
    pub fn on_timer(&mut self) {
        self.mode = match self.mode {
            BusMode::Idle => self.on_timer_idle(),
            BusMode::CmpBackoff => {
                if self.line_sense.is_line_free() {
                    self.scheduler.start_idle_delay()
                } else {
                    self.scheduler.start_cmp_delay(&mut self.lfsr_state)
                }
            }
            BusMode::Linebreak => {
                self.tx.enable();
                self.tx.drive_break(false);
                self.scheduler.start_cmp_delay(&mut self.lfsr_state)
            }
            BusMode::BrgSync => self.on_brg_sync_expired(),
        };
    }

    fn on_timer_idle(&mut self) -> BusMode {
        if !self.line_sense.is_line_free() {
            return self.scheduler.start_cmp_delay(&mut self.lfsr_state);
        }
        if !self.tx_temp_queue.is_empty() {
            return self.scheduler.start_brg_sync();
        }
        if !self.tx_queue.is_empty() {
            self.stage_frame();
            return self.scheduler.start_brg_sync();
        }
        self.scheduler.start_idle_delay()
    }

    fn on_brg_sync_expired(&mut self) -> BusMode {
        if self.line_sense.is_line_free() {
            // Guaranteed Some: BRG sync is only ever entered right after
            // on_timer_idle staged a frame, or after a prior attempt left
            // one staged for retry.
            if let Some(b) = self.tx_temp_queue.peek(0) {
                self.tx.write_byte(b);
            }
            // The self-read of this byte, not a timer, normally advances
            // things from here (see on_rx_byte). Re-arming the full idle
            // delay rather than leaving the spent BRG-sync timer stale
            // gives a bounded recovery path if that self-read is ever
            // lost: idle mode restarts the sync when it finds
            // tx_temp_queue still non-empty.
            self.scheduler.start_idle_delay()
        } else {
            self.stats.linebreaks_sent = self.stats.linebreaks_sent.saturating_add(1);
            self.tx.disable();
            self.tx.drive_break(true);
            self.scheduler
                .start_linebreak(self.scheduler.timing.linebreak_full_us)
        }
    }

    /// Stages one complete frame from `tx_queue` into `tx_temp_queue`.
    ///
    /// Scans from the head: copies the opcode byte (MSB=1), then continues
    /// copying bytes with MSB=0 until `tx_queue` is empty or the next byte
    /// starts a new frame. This finds frame boundaries without needing an
    /// explicit length marker in `tx_queue`.
    ///
    /// Snapshots `tx_temp_queue`'s head/count once staging completes, before
    /// any byte of the frame is written or echoed — see
    /// [`LnDriver::on_rx_framing_error`].
    fn stage_frame(&mut self) {
        loop {
            let Some(b) = self.tx_queue.peek(0) else {
                break;
            };
            if !self.tx_temp_queue.is_empty() && (b & LN_OPCODE_MSB) != 0 {
                break;
            }
            let _ = self.tx_queue.dequeue();
            self.tx_temp_queue.enqueue(b);
        }
        self.tx_committed_head = self.tx_temp_queue.head();
        self.tx_committed_count = self.tx_temp_queue.len();
    }

    /// Serial receive interrupt entry point.
    ///
    /// Dispatches to the transmit self-read verifier while a frame is
    /// staged for transmission, otherwise to the receive pipeline.
    pub fn on_rx_byte(&mut self, byte: u8) {
        if !self.tx_temp_queue.is_empty() {
            self.verify_tx_echo(byte);
        } else {
            self.receive_byte(byte);
            self.mode = self.scheduler.start_cmp_delay(&mut self.lfsr_state);
        }
    }

    fn verify_tx_echo(&mut self, received: u8) {
        match self.tx_temp_queue.peek(0) {
            Some(expected) if expected == received => {
                let _ = self.tx_temp_queue.dequeue();
                if self.tx_temp_queue.is_empty() {
                    self.stats.frames_sent = self.stats.frames_sent.saturating_add(1);
                    self.mode = self.scheduler.start_cmp_delay(&mut self.lfsr_state);
                } else if let Some(next) = self.tx_temp_queue.peek(0) {
                    self.tx.write_byte(next);
                }
            }
            _ => {
                self.stats.collisions = self.stats.collisions.saturating_add(1);
                self.stats.linebreaks_sent = self.stats.linebreaks_sent.saturating_add(1);
                self.tx.disable();
                self.tx.drive_break(true);
                self.mode = self
                    .scheduler
                    .start_linebreak(self.scheduler.timing.linebreak_full_us);
            }
        }
    }

    fn receive_byte(&mut self, byte: u8) {
        if byte & LN_OPCODE_MSB != 0 {
            self.rx_temp_queue.clear();
            self.rx_temp_queue.enqueue(byte);
            return;
        }
        self.rx_temp_queue.enqueue(byte);

        let Some(expected_len) = self.resolve_expected_length() else {
            return;
        };

        if self.rx_temp_queue.len() == expected_len as usize {
            if checksum_ok_queue(&self.rx_temp_queue) {
                let _ = self.rx_temp_queue.drain_into(&mut self.rx_queue);
                self.stats.frames_received = self.stats.frames_received.saturating_add(1);
            } else {
                self.rx_temp_queue.clear();
                self.stats.checksum_errors = self.stats.checksum_errors.saturating_add(1);
            }
        }
    }

    /// Resolves the total expected length of the frame currently
    /// accumulating in `rx_temp_queue`, reading the variable-length escape
    /// byte if present and already received.
    fn resolve_expected_length(&self) -> Option<u8> {
        let opcode = self.rx_temp_queue.peek(0)?;
        match frame_length(opcode) {
            FrameLength::Fixed(len) => Some(len),
            FrameLength::Variable => {
                if self.rx_temp_queue.len() >= 2 {
                    self.rx_temp_queue.peek(1)
                } else {
                    None
                }
            }
        }
    }

    /// Serial framing-error interrupt entry point (a remote linebreak).
    ///
    /// Treated as a collision against any in-flight transmission: the
    /// staged frame is re-armed for retransmit via
    /// [`ByteRingBuffer::recover`], restoring `tx_temp_queue` to the
    /// snapshot [`LnDriver::stage_frame`] took before the first byte went
    /// out, so bytes already consumed by confirmed self-read echoes are
    /// re-sent along with the rest rather than dropped. Any partial receive
    /// is abandoned by clearing `rx_temp_queue` explicitly (in addition to
    /// the implicit reset the next start-of-frame byte would perform).
    pub fn on_rx_framing_error(&mut self) {
        self.rx_temp_queue.clear();
        if !self.tx_temp_queue.is_empty() {
            self.tx_temp_queue
                .recover(self.tx_committed_head, self.tx_committed_count);
        }
        self.stats.linebreaks_received = self.stats.linebreaks_received.saturating_add(1);
        self.mode = self
            .scheduler
            .start_linebreak(self.scheduler.timing.linebreak_extension_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::LN_QUEUE_CAPACITY;

    #[derive(Default)]
    struct FakeTimer;
    impl OneShotTimer for FakeTimer {
        fn arm_us(&mut self, _us: u16) {}
    }

    #[derive(Default)]
    struct FakeLine {
        free: bool,
    }
    impl LineSense for FakeLine {
        fn is_line_free(&mut self) -> bool {
            self.free
        }
    }

    #[derive(Default)]
    struct FakeTx {
        written: std::vec::Vec<u8>,
        enabled: bool,
        break_active: bool,
    }
    impl SerialTx for FakeTx {
        fn write_byte(&mut self, byte: u8) {
            self.written.push(byte);
        }
        fn disable(&mut self) {
            self.enabled = false;
        }
        fn enable(&mut self) {
            self.enabled = true;
        }
        fn drive_break(&mut self, active: bool) {
            self.break_active = active;
        }
    }

    fn new_driver() -> LnDriver<FakeLine, FakeTx, FakeTimer> {
        let scheduler = TimerScheduler::new(FakeTimer::default(), LnTiming::default());
        LnDriver::new(FakeLine { free: true }, FakeTx::default(), scheduler)
    }

    #[test]
    fn starts_in_cmp_backoff() {
        let driver = new_driver();
        assert_eq!(driver.mode(), BusMode::CmpBackoff);
    }

    #[test]
    fn enqueue_tx_rejects_when_full() {
        let mut driver = new_driver();
        for i in 0..LN_QUEUE_CAPACITY {
            assert!(driver.enqueue_tx(i as u8));
        }
        assert!(!driver.enqueue_tx(0xff));
    }

    #[test]
    fn dequeue_rx_empty_returns_none() {
        let mut driver = new_driver();
        assert_eq!(driver.dequeue_rx(), None);
    }

    // S1: send a 4-byte frame over a clean loopback wire and observe the
    // queue post-conditions.
    #[test]
    fn s1_send_four_byte_frame_round_trip() {
        let mut driver = new_driver();
        for b in [0xb0u8, 0x15, 0x20, 0x4b] {
            assert!(driver.enqueue_tx(b));
        }

        driver.on_timer(); // CmpBackoff, line free -> Idle
        assert_eq!(driver.mode(), BusMode::Idle);

        driver.on_timer(); // Idle, work pending -> stage frame -> BrgSync
        assert_eq!(driver.mode(), BusMode::BrgSync);

        driver.on_timer(); // BrgSync expires, line free -> write byte 0, Idle
        assert_eq!(driver.mode(), BusMode::Idle);

        for b in [0xb0u8, 0x15, 0x20, 0x4b] {
            driver.on_rx_byte(b);
        }

        assert_eq!(driver.mode(), BusMode::CmpBackoff);
        assert_eq!(driver.stats.frames_sent, 1);
        assert_eq!(driver.tx.written, [0xb0, 0x15, 0x20, 0x4b]);
        assert!(driver.tx_queue.is_empty());
        assert!(driver.tx_temp_queue.is_empty());
        assert!(driver.rx_queue.is_empty());
    }

    // S2: collision on the second byte triggers a linebreak and keeps the
    // frame staged for retransmission.
    #[test]
    fn s2_collision_triggers_linebreak_and_retains_staged_frame() {
        let mut driver = new_driver();
        for b in [0xb0u8, 0x15, 0x20, 0x4b] {
            driver.enqueue_tx(b);
        }
        driver.on_timer();
        driver.on_timer();
        driver.on_timer();

        driver.on_rx_byte(0xb0); // correct echo, advances
        driver.on_rx_byte(0x7f); // mismatch: collision

        assert_eq!(driver.mode(), BusMode::Linebreak);
        assert_eq!(driver.stats.collisions, 1);
        assert_eq!(driver.tx_temp_queue.len(), 3);
        assert!(!driver.tx.enabled);
        assert!(driver.tx.break_active);
    }

    // S3: variable-length frame is accepted whole when byte[1] gives total length.
    #[test]
    fn s3_receive_variable_length_frame() {
        let mut driver = new_driver();
        let mut frame = [0u8; 14];
        frame[0] = 0xe7;
        frame[1] = 0x0e;
        let partial = frame[..13].iter().fold(0u8, |a, &b| a ^ b);
        frame[13] = partial ^ 0xff;

        for &b in &frame {
            driver.on_rx_byte(b);
        }

        assert_eq!(driver.stats.frames_received, 1);
        assert!(driver.rx_temp_queue.is_empty());
        for &b in &frame {
            assert_eq!(driver.dequeue_rx(), Some(b));
        }
    }

    // S4: a frame with a bad checksum never reaches rx_queue.
    #[test]
    fn s4_bad_checksum_is_dropped() {
        let mut driver = new_driver();
        for b in [0xb0u8, 0x15, 0x20, 0x4c] {
            driver.on_rx_byte(b);
        }
        assert_eq!(driver.stats.checksum_errors, 1);
        assert!(driver.rx_queue.is_empty());
        assert!(driver.rx_temp_queue.is_empty());
    }

    // S5: a stray byte without MSB is dropped and resync happens on the
    // following start-of-frame byte.
    #[test]
    fn s5_stray_byte_resyncs_on_next_start_of_frame() {
        let mut driver = new_driver();
        for b in [0x42u8, 0xb0, 0x15, 0x20, 0x4b] {
            driver.on_rx_byte(b);
        }
        assert_eq!(driver.stats.frames_received, 1);
        assert_eq!(driver.dequeue_rx(), Some(0xb0));
    }

    #[test]
    fn framing_error_recovers_staged_tx_and_clears_partial_rx() {
        let mut driver = new_driver();
        for b in [0xb0u8, 0x15, 0x20, 0x4b] {
            driver.enqueue_tx(b);
        }
        driver.on_timer();
        driver.on_timer();
        driver.on_timer();
        driver.on_rx_byte(0xb0); // consume one byte of tx_temp_queue

        driver.on_rx_framing_error();

        assert_eq!(driver.mode(), BusMode::Linebreak);
        assert_eq!(driver.stats.linebreaks_received, 1);
        assert_eq!(driver.tx_temp_queue.peek(0), Some(0xb0));
        assert_eq!(driver.tx_temp_queue.len(), 4);
        assert!(driver.rx_temp_queue.is_empty());
    }

    #[test]
    fn line_never_free_stays_in_cmp_backoff() {
        let mut driver = new_driver();
        driver.line_sense.free = false;
        for _ in 0..10 {
            driver.on_timer();
            assert_eq!(driver.mode(), BusMode::CmpBackoff);
        }
    }

    #[test]
    fn blanket_impl_reads_line_sense_from_input_pin() {
        use embedded_hal_mock::eh1::digital::{
            Mock as PinMock, State as PinState, Transaction as PinTransaction,
        };

        let mut high = PinMock::new(&[PinTransaction::get(PinState::High)]);
        assert!(high.is_line_free());
        high.done();

        let mut low = PinMock::new(&[PinTransaction::get(PinState::Low)]);
        assert!(!low.is_line_free());
        low.done();
    }
}
