//! Two-level LED brightness from one shared counter.
//!
//! Every call to [`Dimmer::next`] is one frame. Within a period of frames,
//! all LEDs glow for the first `base` frames and the LEDs that are logically
//! on stay lit for the first `pressed` frames. With `base < pressed` that
//! gives a dim backlight and bright active LEDs at the rate the loop runs.

use crate::pinmap::LED_MASK;

/// Frames per brightness cycle.
pub const DEFAULT_PERIOD: u8 = 10;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Dimmer {
    counter: u8,
    period: u8,
    base: u8,
    pressed: u8,
}

impl Default for Dimmer {
    /// Backlight off, active LEDs fully on.
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD, 0, DEFAULT_PERIOD)
    }
}

impl Dimmer {
    /// A period of 0 is treated as 1. Levels above the period clamp to it.
    pub const fn new(period: u8, base: u8, pressed: u8) -> Self {
        let period = if period == 0 { 1 } else { period };

        Self {
            counter: 0,
            period,
            base: clamp(base, period),
            pressed: clamp(pressed, period),
        }
    }

    pub fn period(&self) -> u8 {
        self.period
    }

    pub fn levels(&self) -> (u8, u8) {
        (self.base, self.pressed)
    }

    /// Change both levels. The counter keeps running.
    pub fn set_levels(&mut self, base: u8, pressed: u8) {
        self.base = clamp(base, self.period);
        self.pressed = clamp(pressed, self.period);
    }

    /// LED mask to drive this frame for the logical LED state `logical`.
    pub fn next(&mut self, logical: u8) -> u8 {
        let counter = self.counter;
        self.counter = (counter + 1) % self.period;

        let mut leds = 0;
        if counter < self.base {
            leds |= LED_MASK;
        }
        if counter < self.pressed {
            leds |= logical & LED_MASK;
        }
        leds
    }
}

const fn clamp(level: u8, period: u8) -> u8 {
    if level > period {
        period
    } else {
        level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit_frames(dimmer: &mut Dimmer, logical: u8, led: u8) -> usize {
        (0..dimmer.period())
            .filter(|_| dimmer.next(logical) & led != 0)
            .count()
    }

    #[test]
    fn test_duty_cycles() {
        let mut dimmer = Dimmer::new(10, 2, 7);
        // LED 1 on, LED 2 off.
        assert_eq!(lit_frames(&mut dimmer, 0b01, 0b01), 7);
        assert_eq!(lit_frames(&mut dimmer, 0b01, 0b10), 2);
    }

    #[test]
    fn test_frame_sequence() {
        let mut dimmer = Dimmer::new(4, 1, 3);
        let frames: Vec<u8> = (0..8).map(|_| dimmer.next(0b00100)).collect();
        assert_eq!(
            frames,
            [0b11111, 0b00100, 0b00100, 0, 0b11111, 0b00100, 0b00100, 0]
        );
    }

    #[test]
    fn test_full_and_zero_levels() {
        let mut dimmer = Dimmer::new(10, 0, 10);
        for _ in 0..20 {
            assert_eq!(dimmer.next(0b10101), 0b10101);
        }

        dimmer.set_levels(0, 0);
        for _ in 0..20 {
            assert_eq!(dimmer.next(0b11111), 0);
        }

        dimmer.set_levels(10, 0);
        for _ in 0..20 {
            assert_eq!(dimmer.next(0), LED_MASK);
        }
    }

    #[test]
    fn test_levels_clamp_to_period() {
        let mut dimmer = Dimmer::new(10, 200, 11);
        assert_eq!(dimmer.levels(), (10, 10));
        dimmer.set_levels(3, 255);
        assert_eq!(dimmer.levels(), (3, 10));
    }

    #[test]
    fn test_zero_period() {
        let mut dimmer = Dimmer::new(0, 0, 1);
        assert_eq!(dimmer.period(), 1);
        assert_eq!(dimmer.next(0b1), 0b1);
        assert_eq!(dimmer.next(0b1), 0b1);
    }

    #[test]
    fn test_logical_bits_above_leds_ignored() {
        let mut dimmer = Dimmer::default();
        assert_eq!(dimmer.next(0xFF), LED_MASK);
    }

    #[test]
    fn test_set_levels_keeps_counter() {
        let mut dimmer = Dimmer::new(4, 0, 4);
        dimmer.next(0);
        dimmer.next(0);
        dimmer.set_levels(2, 0);
        // Counter is at 2 now: two dark frames before the backlight returns.
        assert_eq!(dimmer.next(0), 0);
        assert_eq!(dimmer.next(0), 0);
        assert_eq!(dimmer.next(0), LED_MASK);
    }
}
