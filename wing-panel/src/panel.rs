//! The wing: three PCA9557s as one panel of buttons, a knob and LEDs.
//!
//! Nothing about the panel is cached. Every call goes to the chips, and
//! every call builds its own [`BitbangI2c`] on the panel's lines and drops
//! it before returning, so the lines sit in input mode between operations.
//!
//! The wing can be unplugged and plugged back in while the firmware keeps
//! running. A chip that comes back from a power cycle has forgotten its
//! configuration, so [`Wing::check_alive_and_reinit`] re-runs
//! [`Wing::init`] whenever the panel reappears.

use crate::i2c::{BitbangI2c, BusLine};
use crate::pca9557;
use crate::pinmap::{LED_MASK, PIN_MAP};
use crate::timing::BitTiming;

/// Chip probed for presence.
pub const LIVENESS_CHIP: u8 = 2;
/// Inversion bit toggled by the presence probe. Bit 4 of chip 2 is not
/// wired to anything.
pub const LIVENESS_TEST_BIT: u8 = 0x10;

/// Whether the wing answered the last presence probe.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Presence {
    #[default]
    Absent,
    Present,
}

/// Result of feeding one probe into [`Presence::update`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Transition {
    /// Absent → Present: the chips need configuring.
    Arrived,
    /// Present → Absent.
    Departed,
    Unchanged,
}

impl Presence {
    pub fn update(&mut self, alive: bool) -> Transition {
        let next = if alive {
            Presence::Present
        } else {
            Presence::Absent
        };

        let transition = match (*self, next) {
            (Presence::Absent, Presence::Present) => Transition::Arrived,
            (Presence::Present, Presence::Absent) => Transition::Departed,
            _ => Transition::Unchanged,
        };

        *self = next;
        transition
    }

    pub fn is_present(self) -> bool {
        self == Presence::Present
    }
}

/// What the exchange loop needs from a panel.
pub trait Panel {
    /// Probe the panel, configuring it if it just appeared. Returns whether
    /// it answered.
    fn check_alive_and_reinit(&mut self) -> bool;
    /// Pressed buttons, button 1 in bit 0.
    fn read_buttons(&mut self) -> u8;
    /// Knob position.
    fn read_knob(&mut self) -> u16;
    /// Light the LEDs set in `leds`, LED 1 in bit 0.
    fn write_leds(&mut self, leds: u8);
}

pub struct Wing<SCL, SDA, T> {
    scl: SCL,
    sda: SDA,
    timing: T,
    presence: Presence,
}

impl<SCL: BusLine, SDA: BusLine, T: BitTiming> Wing<SCL, SDA, T> {
    /// The wing starts out [`Presence::Absent`]; nothing touches the bus
    /// until the first call.
    pub const fn new(scl: SCL, sda: SDA, timing: T) -> Self {
        Self {
            scl,
            sda,
            timing,
            presence: Presence::Absent,
        }
    }

    /// Give the lines and timing source back.
    pub fn release(self) -> (SCL, SDA, T) {
        (self.scl, self.sda, self.timing)
    }

    pub fn presence(&self) -> Presence {
        self.presence
    }

    /// Take the bus for one operation. Dropping the master releases it.
    fn bus(&mut self) -> BitbangI2c<&mut SCL, &mut SDA, &mut T> {
        BitbangI2c::new(&mut self.scl, &mut self.sda, &mut self.timing)
    }

    /// Configure all three chips and turn every LED off. Safe to repeat.
    pub fn init(&mut self) {
        let mut bus = self.bus();

        for chip in PIN_MAP.iter() {
            pca9557::set_invert(&mut bus, chip.offset, 0);
        }

        for chip in PIN_MAP.iter() {
            pca9557::configure(&mut bus, chip.offset, chip.configuration());
        }

        write_led_registers(&mut bus, 0);
    }

    /// Round-trip a bit through chip 2's inversion register. The wing is
    /// there iff the read-back matches what was written.
    pub fn check_alive(&mut self) -> bool {
        let mut bus = self.bus();

        let before = pca9557::get_invert(&mut bus, LIVENESS_CHIP);

        // Toggle a bit nobody reads.
        let expect = before ^ LIVENESS_TEST_BIT;
        pca9557::set_invert(&mut bus, LIVENESS_CHIP, expect);

        expect == pca9557::get_invert(&mut bus, LIVENESS_CHIP)
    }

    /// [`check_alive`](Self::check_alive), plus [`init`](Self::init) when
    /// the wing was absent on the previous call and answers now.
    pub fn check_alive_and_reinit(&mut self) -> bool {
        let alive = self.check_alive();

        match self.presence.update(alive) {
            Transition::Arrived => {
                info!("wing: present, configuring");
                self.init();
            }
            Transition::Departed => warn!("wing: lost"),
            Transition::Unchanged => {}
        }

        alive
    }

    /// Pressed buttons packed button 5 (MSB) … button 1 (bit 0).
    pub fn read_buttons(&mut self) -> u8 {
        let mut bus = self.bus();

        PIN_MAP
            .iter()
            .filter(|chip| chip.has_buttons())
            .fold(0, |buttons, chip| {
                buttons | chip.buttons(pca9557::read(&mut bus, chip.offset))
            })
    }

    /// 12-bit knob position: chip 0's nibble low, chip 1's byte above it.
    pub fn read_knob(&mut self) -> u16 {
        let mut bus = self.bus();

        PIN_MAP
            .iter()
            .filter(|chip| chip.has_knob())
            .fold(0, |knob, chip| knob | chip.knob(pca9557::read(&mut bus, chip.offset)))
    }

    /// Drive the five LEDs. Bits above LED 5 are ignored.
    pub fn write_leds(&mut self, leds: u8) {
        let mut bus = self.bus();
        write_led_registers(&mut bus, leds);
    }
}

fn write_led_registers<SCL: BusLine, SDA: BusLine, T: BitTiming>(
    bus: &mut BitbangI2c<SCL, SDA, T>,
    leds: u8,
) {
    let leds = leds & LED_MASK;

    for chip in PIN_MAP.iter().filter(|chip| chip.has_leds()) {
        trace!("wing: chip {} output {=u8:#x}", chip.offset, chip.led_output(leds));
        pca9557::write(&mut *bus, chip.offset, chip.led_output(leds));
    }
}

impl<SCL: BusLine, SDA: BusLine, T: BitTiming> Panel for Wing<SCL, SDA, T> {
    fn check_alive_and_reinit(&mut self) -> bool {
        Wing::check_alive_and_reinit(self)
    }

    fn read_buttons(&mut self) -> u8 {
        Wing::read_buttons(self)
    }

    fn read_knob(&mut self) -> u16 {
        Wing::read_knob(self)
    }

    fn write_leds(&mut self, leds: u8) {
        Wing::write_leds(self, leds)
    }
}
