//! Quarter-bit delays.
//!
//! One I2C bit is four quarter-bit waits. Nothing else in the stack keeps
//! time, so the bus speed is whatever this delay makes it.

use embedded_hal::delay::DelayNs;

/// No-op count for one quarter bit. Six `nop`s on a 48MHz core keeps the bus
/// comfortably under the 100kHz standard-mode limit once pin toggling
/// overhead is added.
pub const QUARTER_BIT_CYCLES: usize = 6;

/// Quarter of a 100kHz bit period, in nanoseconds.
pub const STANDARD_MODE_QUARTER_NS: u32 = 2_500;

/// Source of the quarter-bit wait.
pub trait BitTiming {
    /// Block for one quarter of a bit period.
    fn quarter_bit(&mut self);
}

impl<T: BitTiming + ?Sized> BitTiming for &mut T {
    #[inline(always)]
    fn quarter_bit(&mut self) {
        (**self).quarter_bit();
    }
}

/// Busy-wait of `CYCLES` no-op instructions. No timer, no OS.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpinDelay<const CYCLES: usize = QUARTER_BIT_CYCLES>;

impl SpinDelay {
    pub const fn new() -> Self {
        SpinDelay
    }
}

impl<const CYCLES: usize> BitTiming for SpinDelay<CYCLES> {
    #[inline(always)]
    fn quarter_bit(&mut self) {
        for _ in 0..CYCLES {
            unsafe { core::arch::asm!("nop") };
        }
    }
}

/// Quarter bit taken from an `embedded-hal` delay provider.
pub struct DelayTiming<D> {
    delay: D,
    quarter_ns: u32,
}

impl<D: DelayNs> DelayTiming<D> {
    pub fn new(delay: D, quarter_ns: u32) -> Self {
        Self { delay, quarter_ns }
    }

    /// 100kHz bus.
    pub fn standard_mode(delay: D) -> Self {
        Self::new(delay, STANDARD_MODE_QUARTER_NS)
    }

    pub fn quarter_ns(&self) -> u32 {
        self.quarter_ns
    }

    /// Give the delay provider back.
    pub fn free(self) -> D {
        self.delay
    }
}

impl<D: DelayNs> BitTiming for DelayTiming<D> {
    #[inline]
    fn quarter_bit(&mut self) {
        self.delay.delay_ns(self.quarter_ns);
    }
}
