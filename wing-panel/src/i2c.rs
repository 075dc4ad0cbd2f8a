//! Bit-banged I2C master.
//!
//! Two open-drain lines, driven and sampled in software. Single master only:
//! no arbitration, no clock stretching, and no timeout. A slave that holds
//! SDA or SCL low hangs the caller.
//!
//! A [`BitbangI2c`] owns its lines for as long as it lives. Creating one puts
//! both lines into open-drain output mode and dropping it returns them to
//! input mode, so the bus is only held for the duration of one logical
//! operation.

use core::convert::Infallible;

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::i2c::{ErrorType, I2c, Operation, SevenBitAddress};

use crate::timing::BitTiming;

/// One bus line: an open-drain output that can also be read back.
pub trait BusLine {
    /// Switch the line to open-drain output mode.
    fn acquire(&mut self);
    /// Switch the line back to input mode.
    fn release(&mut self);
    /// Let the line float high.
    fn set_high(&mut self);
    /// Pull the line low.
    fn set_low(&mut self);
    /// Sample the line, whoever is driving it.
    fn is_high(&mut self) -> bool;
}

impl<L: BusLine + ?Sized> BusLine for &mut L {
    #[inline(always)]
    fn acquire(&mut self) {
        (**self).acquire();
    }

    #[inline(always)]
    fn release(&mut self) {
        (**self).release();
    }

    #[inline(always)]
    fn set_high(&mut self) {
        (**self).set_high();
    }

    #[inline(always)]
    fn set_low(&mut self) {
        (**self).set_low();
    }

    #[inline(always)]
    fn is_high(&mut self) -> bool {
        (**self).is_high()
    }
}

/// Adapter for an `embedded-hal` pin the HAL already configured as
/// open-drain with input buffer enabled.
///
/// Mode switching is left to the HAL, so `acquire` only releases the line and
/// `release` leaves it floating.
pub struct OpenDrain<P> {
    pin: P,
}

impl<P: OutputPin + InputPin> OpenDrain<P> {
    pub fn new(pin: P) -> Self {
        Self { pin }
    }

    pub fn free(self) -> P {
        self.pin
    }
}

impl<P: OutputPin + InputPin> BusLine for OpenDrain<P> {
    fn acquire(&mut self) {
        let _ = self.pin.set_high();
    }

    fn release(&mut self) {
        let _ = self.pin.set_high();
    }

    #[inline(always)]
    fn set_high(&mut self) {
        let _ = self.pin.set_high();
    }

    #[inline(always)]
    fn set_low(&mut self) {
        let _ = self.pin.set_low();
    }

    #[inline(always)]
    fn is_high(&mut self) -> bool {
        // A pin that cannot be read looks like an idle, pulled-up line.
        self.pin.is_high().unwrap_or(true)
    }
}

/// Transfer direction, the last bit of the address byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Direction {
    Write = 0,
    Read = 1,
}

/// Address byte for a 7-bit address and direction.
pub const fn address_byte(address: u8, direction: Direction) -> u8 {
    (address << 1) | direction as u8
}

/// Software I2C master over two [`BusLine`]s.
pub struct BitbangI2c<SCL: BusLine, SDA: BusLine, T: BitTiming> {
    scl: SCL,
    sda: SDA,
    timing: T,
}

impl<SCL: BusLine, SDA: BusLine, T: BitTiming> BitbangI2c<SCL, SDA, T> {
    /// Take both lines: idle them high, then switch them to open-drain.
    pub fn new(mut scl: SCL, mut sda: SDA, timing: T) -> Self {
        scl.set_high();
        sda.set_high();

        scl.acquire();
        sda.acquire();

        Self { scl, sda, timing }
    }

    /// Write `bytes` to the device at `address`.
    ///
    /// Acknowledgements are sampled but not acted on: every byte is sent
    /// whether or not the device is there.
    pub fn write_bytes(&mut self, address: u8, bytes: &[u8]) {
        self.start();
        let _ = self.write_byte(address_byte(address, Direction::Write));
        for &byte in bytes {
            let _ = self.write_byte(byte);
        }
        self.stop();
    }

    /// Fill `buffer` from the device at `address`. An empty buffer does
    /// nothing.
    pub fn read_bytes(&mut self, address: u8, buffer: &mut [u8]) {
        if buffer.is_empty() {
            return;
        }

        self.start();
        let _ = self.write_byte(address_byte(address, Direction::Read));
        self.read_into(buffer);
        self.stop();
    }

    /// Write `bytes`, then read into `buffer` after a repeated start, without
    /// releasing the bus in between.
    pub fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) {
        self.start();
        let _ = self.write_byte(address_byte(address, Direction::Write));
        for &byte in bytes {
            let _ = self.write_byte(byte);
        }

        if buffer.is_empty() {
            self.stop();
            return;
        }

        // Repeated start: no stop before it.
        self.read_bytes(address, buffer);
    }

    /// Read one register: register pointer write, repeated start, one byte.
    pub fn read_register(&mut self, address: u8, register: u8) -> u8 {
        let mut value = [0u8];
        self.write_read(address, &[register], &mut value);
        value[0]
    }

    /// Write one register: register pointer and value in one transfer.
    pub fn write_register(&mut self, address: u8, register: u8, value: u8) {
        self.write_bytes(address, &[register, value]);
    }

    /// Clock out one byte, MSB first. Returns `true` if the device
    /// acknowledged it.
    ///
    /// Only meaningful inside a transfer, after a start condition with SCL
    /// low. On an idle bus the first low data bit is itself a start.
    #[must_use]
    pub fn write_byte(&mut self, byte: u8) -> bool {
        for bit in (0..8).rev() {
            self.send_bit(byte & (1 << bit) != 0);
        }

        // Let go of SDA so the device can pull it low.
        self.sda.set_high();

        // Low is ACK, high is NACK.
        !self.read_bit()
    }

    /// Clock in one byte, MSB first, then answer with ACK (`true`, more
    /// bytes wanted) or NACK (`false`, last byte).
    ///
    /// Must follow an address byte sent with the read bit, with SCL low.
    pub fn read_byte(&mut self, ack: bool) -> u8 {
        // An ACK from the previous byte leaves SDA pulled low.
        self.sda.set_high();

        let mut byte = 0u8;
        for _ in 0..8 {
            byte = (byte << 1) | u8::from(self.read_bit());
        }

        self.send_bit(!ack);

        byte
    }

    fn read_into(&mut self, buffer: &mut [u8]) {
        if let Some((last, rest)) = buffer.split_last_mut() {
            for byte in rest {
                *byte = self.read_byte(true);
            }
            *last = self.read_byte(false);
        }
    }

    fn start(&mut self) {
        // Bus idle: both lines high.
        self.sda.set_high();
        self.wait();
        self.scl.set_high();
        self.wait();

        // SDA falls while SCL is high.
        self.sda.set_low();
        self.wait();
        self.scl.set_low();
        self.wait();
    }

    fn stop(&mut self) {
        self.scl.set_low();
        self.wait();
        self.sda.set_low();
        self.wait();
        self.scl.set_high();
        self.wait();

        // SDA rises while SCL is high.
        self.sda.set_high();
    }

    fn send_bit(&mut self, bit: bool) {
        self.wait();

        // Data changes only while SCL is low.
        if bit {
            self.sda.set_high();
        } else {
            self.sda.set_low();
        }

        // Setup time.
        self.wait();

        self.scl.set_high();
        self.wait();
        self.scl.set_low();
        self.wait();
    }

    fn read_bit(&mut self) -> bool {
        self.wait();

        self.scl.set_high();

        self.wait();
        self.wait();

        // Sample as late as possible before SCL falls.
        let bit = self.sda.is_high();

        self.scl.set_low();
        self.wait();

        bit
    }

    #[inline(always)]
    fn wait(&mut self) {
        self.timing.quarter_bit();
    }
}

impl<SCL: BusLine, SDA: BusLine, T: BitTiming> Drop for BitbangI2c<SCL, SDA, T> {
    fn drop(&mut self) {
        self.scl.release();
        self.sda.release();
    }
}

impl<SCL: BusLine, SDA: BusLine, T: BitTiming> ErrorType for BitbangI2c<SCL, SDA, T> {
    type Error = Infallible;
}

/// NACKs are not reported: the bit-banged master never fails, it just reads
/// back an idle bus.
impl<SCL: BusLine, SDA: BusLine, T: BitTiming> I2c<SevenBitAddress> for BitbangI2c<SCL, SDA, T> {
    fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
        self.read_bytes(address, read);
        Ok(())
    }

    fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        self.write_bytes(address, write);
        Ok(())
    }

    fn write_read(&mut self, address: u8, write: &[u8], read: &mut [u8]) -> Result<(), Self::Error> {
        BitbangI2c::write_read(self, address, write, read);
        Ok(())
    }

    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut direction = None;

        for index in 0..operations.len() {
            // Empty reads clock nothing, so they neither continue nor end a
            // read run.
            let read_follows = operations[index + 1..]
                .iter()
                .find(|next| !matches!(next, Operation::Read(buffer) if buffer.is_empty()))
                .is_some_and(|next| matches!(next, Operation::Read(_)));

            match &mut operations[index] {
                Operation::Write(bytes) => {
                    if direction != Some(Direction::Write) {
                        self.start();
                        let _ = self.write_byte(address_byte(address, Direction::Write));
                        direction = Some(Direction::Write);
                    }
                    for &byte in bytes.iter() {
                        let _ = self.write_byte(byte);
                    }
                }
                Operation::Read(buffer) => {
                    if direction != Some(Direction::Read) {
                        self.start();
                        let _ = self.write_byte(address_byte(address, Direction::Read));
                        direction = Some(Direction::Read);
                    }
                    if read_follows {
                        // Adjacent reads are one run: keep asking for more.
                        for byte in buffer.iter_mut() {
                            *byte = self.read_byte(true);
                        }
                    } else {
                        self.read_into(buffer);
                    }
                }
            }
        }

        if direction.is_some() {
            self.stop();
        }

        Ok(())
    }
}
