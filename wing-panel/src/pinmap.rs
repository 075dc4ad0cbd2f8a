//! Wiring of the wing's three expanders.
//!
//! Every mask the panel uses comes out of [`PIN_MAP`]: direction
//! configuration, LED output values, button extraction and knob composition.
//! Bit positions are written down once, here.
//!
//! | Chip | Bits         | Role              |
//! |------|--------------|-------------------|
//! | 0    | 0-3          | knob bits 0-3     |
//! | 0    | 4, 7         | LEDs 1, 2         |
//! | 0    | 5, 6         | buttons 1, 2      |
//! | 1    | 0-7          | knob bits 4-11    |
//! | 2    | 0, 3, 6      | buttons 3, 4, 5   |
//! | 2    | 1, 2, 7      | LEDs 3, 4, 5      |
//! | 2    | 4, 5         | unused            |

/// Number of expanders on the wing.
pub const CHIP_COUNT: usize = 3;

pub const BUTTON_COUNT: u8 = 5;
pub const LED_COUNT: u8 = 5;
pub const KNOB_BITS: u8 = 12;

/// All buttons, button 1 in bit 0.
pub const BUTTON_MASK: u8 = (1 << BUTTON_COUNT) - 1;
/// All LEDs, LED 1 in bit 0.
pub const LED_MASK: u8 = (1 << LED_COUNT) - 1;
/// Largest knob reading.
pub const KNOB_MAX: u16 = (1 << KNOB_BITS) - 1;

/// What a pin is wired to. Indices are zero-based: `Button(0)` is button 1.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    Button(u8),
    Knob(u8),
    Led(u8),
    Unused,
}

/// Electrical level that means "pressed" or "lit".
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polarity {
    ActiveHigh,
    ActiveLow,
}

impl Polarity {
    /// Logical state for a pin level, or the level for a logical state.
    const fn apply(self, level: bool) -> bool {
        match self {
            Polarity::ActiveHigh => level,
            Polarity::ActiveLow => !level,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Pin {
    pub role: Role,
    pub polarity: Polarity,
}

const fn button(index: u8) -> Pin {
    Pin {
        role: Role::Button(index),
        polarity: Polarity::ActiveHigh,
    }
}

const fn knob(index: u8) -> Pin {
    Pin {
        role: Role::Knob(index),
        polarity: Polarity::ActiveHigh,
    }
}

const fn led(index: u8) -> Pin {
    Pin {
        role: Role::Led(index),
        polarity: Polarity::ActiveHigh,
    }
}

const UNUSED: Pin = Pin {
    role: Role::Unused,
    polarity: Polarity::ActiveHigh,
};

/// One expander and its pins, indexed by bit position.
#[derive(Debug)]
pub struct ChipMap {
    pub offset: u8,
    pub pins: [Pin; 8],
}

pub static PIN_MAP: [ChipMap; CHIP_COUNT] = [
    ChipMap {
        offset: 0,
        pins: [
            knob(0),
            knob(1),
            knob(2),
            knob(3),
            led(0),
            button(0),
            button(1),
            led(1),
        ],
    },
    ChipMap {
        offset: 1,
        pins: [
            knob(4),
            knob(5),
            knob(6),
            knob(7),
            knob(8),
            knob(9),
            knob(10),
            knob(11),
        ],
    },
    ChipMap {
        offset: 2,
        pins: [
            button(2),
            led(2),
            led(3),
            button(3),
            UNUSED,
            UNUSED,
            button(4),
            led(4),
        ],
    },
];

impl ChipMap {
    /// Direction register value: LEDs are outputs, everything else input.
    pub fn configuration(&self) -> u8 {
        self.pins
            .iter()
            .enumerate()
            .filter(|(_, pin)| !matches!(pin.role, Role::Led(_)))
            .fold(0, |config, (bit, _)| config | 1 << bit)
    }

    pub fn has_leds(&self) -> bool {
        self.pins.iter().any(|pin| matches!(pin.role, Role::Led(_)))
    }

    pub fn has_buttons(&self) -> bool {
        self.pins.iter().any(|pin| matches!(pin.role, Role::Button(_)))
    }

    pub fn has_knob(&self) -> bool {
        self.pins.iter().any(|pin| matches!(pin.role, Role::Knob(_)))
    }

    /// Output register value lighting the LEDs set in `leds`. Pins that are
    /// not LEDs are written 0.
    pub fn led_output(&self, leds: u8) -> u8 {
        self.pins
            .iter()
            .enumerate()
            .fold(0, |output, (bit, pin)| match pin.role {
                Role::Led(index) if pin.polarity.apply(leds >> index & 1 != 0) => {
                    output | 1 << bit
                }
                _ => output,
            })
    }

    /// This chip's share of the button mask, from its input register.
    pub fn buttons(&self, input: u8) -> u8 {
        self.collect(input, |role| match role {
            Role::Button(index) => Some(index),
            _ => None,
        }) as u8
    }

    /// This chip's share of the knob value, from its input register.
    pub fn knob(&self, input: u8) -> u16 {
        self.collect(input, |role| match role {
            Role::Knob(index) => Some(index),
            _ => None,
        })
    }

    fn collect(&self, input: u8, index_of: impl Fn(Role) -> Option<u8>) -> u16 {
        self.pins
            .iter()
            .enumerate()
            .fold(0, |value, (bit, pin)| match index_of(pin.role) {
                Some(index) if pin.polarity.apply(input >> bit & 1 != 0) => value | 1 << index,
                _ => value,
            })
    }
}

/// Map of the chip at bus `offset`.
pub fn chip(offset: u8) -> Option<&'static ChipMap> {
    PIN_MAP.iter().find(|chip| chip.offset == offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chip_at(offset: u8) -> &'static ChipMap {
        chip(offset).unwrap()
    }

    #[test]
    fn test_configuration_masks() {
        // LEDs on bits 4 and 7.
        assert_eq!(chip_at(0).configuration(), 0b0110_1111);
        assert_eq!(chip_at(1).configuration(), 0b1111_1111);
        // LEDs on bits 1, 2 and 7; unused pins stay inputs.
        assert_eq!(chip_at(2).configuration(), 0b0111_1001);
    }

    #[test]
    fn test_buttons_from_known_inputs() {
        let buttons = chip_at(0).buttons(0b0110_0000) | chip_at(2).buttons(0b0000_0001);
        // Buttons 1, 2 and 3 pressed; 4 and 5 released.
        assert_eq!(buttons, 0b00111);
    }

    #[test]
    fn test_each_button_bit() {
        assert_eq!(chip_at(0).buttons(1 << 5), 0b00001);
        assert_eq!(chip_at(0).buttons(1 << 6), 0b00010);
        assert_eq!(chip_at(2).buttons(1 << 0), 0b00100);
        assert_eq!(chip_at(2).buttons(1 << 3), 0b01000);
        assert_eq!(chip_at(2).buttons(1 << 6), 0b10000);
        // LED and knob pins never show up as buttons.
        assert_eq!(chip_at(0).buttons(0b1001_1111), 0);
        assert_eq!(chip_at(1).buttons(0xFF), 0);
    }

    #[test]
    fn test_led_outputs() {
        assert_eq!(chip_at(0).led_output(0b00001), 1 << 4);
        assert_eq!(chip_at(0).led_output(0b00010), 1 << 7);
        assert_eq!(chip_at(2).led_output(0b00100), 1 << 1);
        assert_eq!(chip_at(2).led_output(0b01000), 1 << 2);
        assert_eq!(chip_at(2).led_output(0b10000), 1 << 7);

        assert_eq!(chip_at(0).led_output(LED_MASK), 0b1001_0000);
        assert_eq!(chip_at(2).led_output(LED_MASK), 0b1000_0110);
        assert_eq!(chip_at(1).led_output(LED_MASK), 0);
        // Bits above LED 5 are ignored.
        assert_eq!(chip_at(2).led_output(0xE0), 0);
    }

    #[test]
    fn test_knob_composition() {
        assert_eq!(chip_at(0).knob(0b1111_0101), 0x005);
        assert_eq!(chip_at(1).knob(0xAB), 0xAB0);
        assert_eq!(chip_at(0).knob(0x0F) | chip_at(1).knob(0xFF), KNOB_MAX);
        assert_eq!(chip_at(2).knob(0xFF), 0);
    }

    #[test]
    fn test_roles_are_unique() {
        let mut buttons = 0u8;
        let mut leds = 0u8;
        let mut knob = 0u16;
        for pin in PIN_MAP.iter().flat_map(|chip| chip.pins.iter()) {
            match pin.role {
                Role::Button(index) => {
                    assert_eq!(buttons & 1 << index, 0);
                    buttons |= 1 << index;
                }
                Role::Led(index) => {
                    assert_eq!(leds & 1 << index, 0);
                    leds |= 1 << index;
                }
                Role::Knob(index) => {
                    assert_eq!(knob & 1 << index, 0);
                    knob |= 1 << index;
                }
                Role::Unused => {}
            }
        }
        assert_eq!(buttons, BUTTON_MASK);
        assert_eq!(leds, LED_MASK);
        assert_eq!(knob, KNOB_MAX);
    }

    #[test]
    fn test_active_low_pins_invert() {
        let map = ChipMap {
            offset: 9,
            pins: [
                Pin {
                    role: Role::Button(0),
                    polarity: Polarity::ActiveLow,
                },
                Pin {
                    role: Role::Led(0),
                    polarity: Polarity::ActiveLow,
                },
                UNUSED,
                UNUSED,
                UNUSED,
                UNUSED,
                UNUSED,
                UNUSED,
            ],
        };
        assert_eq!(map.buttons(0b0000_0000), 0b1);
        assert_eq!(map.buttons(0b0000_0001), 0b0);
        assert_eq!(map.led_output(0b0), 0b10);
        assert_eq!(map.led_output(0b1), 0b00);
    }
}
