//! PCA9557 8-bit I/O expander register access.
//!
//! Each access is a fresh bus transaction: no caching, no retries. Bus
//! errors are not reported. A write that nobody acknowledged is simply lost,
//! and a failed read returns [`IDLE_BUS`]. Callers that need to know whether
//! a chip is there have to probe for it.

use embedded_hal::i2c::I2c;

/// Address of chip offset 0 (PCA9557 8.3.2.1, A2..A0 tied low).
pub const BASE_ADDRESS: u8 = 0x18;

/// What a read returns when no device drives the bus.
pub const IDLE_BUS: u8 = 0xFF;

// Register contents after power-on reset.
pub const POWER_ON_OUTPUT: u8 = 0x00;
pub const POWER_ON_INVERT: u8 = 0xF0;
pub const POWER_ON_CONFIG: u8 = 0xFF;

/// Register command bytes (PCA9557 8.3.2.2).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Register {
    /// Pin levels, inputs and outputs alike. Read-only.
    Input = 0x00,
    /// Levels driven on output pins.
    Output = 0x01,
    /// 1 inverts the corresponding input.
    PolarityInversion = 0x02,
    /// 1 = input, 0 = output.
    Configuration = 0x03,
}

impl Register {
    pub const fn opcode(self) -> u8 {
        self as u8
    }

    /// Decode a command byte. Only the two low bits select a register.
    pub const fn from_opcode(opcode: u8) -> Self {
        match opcode & 0x03 {
            0x00 => Register::Input,
            0x01 => Register::Output,
            0x02 => Register::PolarityInversion,
            _ => Register::Configuration,
        }
    }

    pub const fn is_writable(self) -> bool {
        !matches!(self, Register::Input)
    }
}

/// Bus address of the chip at `offset`.
pub const fn address(offset: u8) -> u8 {
    BASE_ADDRESS + offset
}

/// Read the pin levels of chip `offset`, inputs and outputs alike.
pub fn read<I: I2c>(i2c: &mut I, offset: u8) -> u8 {
    read_register(i2c, offset, Register::Input)
}

/// Set the output register of chip `offset`. Only pins configured as outputs
/// follow it.
pub fn write<I: I2c>(i2c: &mut I, offset: u8, output: u8) {
    write_register(i2c, offset, Register::Output, output);
}

/// Set pin directions of chip `offset`: 1 = input, 0 = output.
pub fn configure<I: I2c>(i2c: &mut I, offset: u8, config: u8) {
    write_register(i2c, offset, Register::Configuration, config);
}

/// Set which inputs of chip `offset` read back inverted.
pub fn set_invert<I: I2c>(i2c: &mut I, offset: u8, invert: u8) {
    write_register(i2c, offset, Register::PolarityInversion, invert);
}

/// Read the polarity inversion register of chip `offset`.
pub fn get_invert<I: I2c>(i2c: &mut I, offset: u8) -> u8 {
    read_register(i2c, offset, Register::PolarityInversion)
}

fn write_register<I: I2c>(i2c: &mut I, offset: u8, register: Register, value: u8) {
    let addr = address(offset);

    if i2c.write(addr, &[register.opcode(), value]).is_err() {
        debug!("pca9557 {=u8:#x}: write of {} dropped", addr, register);
    }
}

fn read_register<I: I2c>(i2c: &mut I, offset: u8, register: Register) -> u8 {
    let addr = address(offset);
    let mut value = [IDLE_BUS];

    match i2c.write_read(addr, &[register.opcode()], &mut value) {
        Ok(()) => value[0],
        Err(_) => {
            debug!("pca9557 {=u8:#x}: read of {} failed", addr, register);
            IDLE_BUS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    #[test]
    fn test_read_uses_input_register() {
        let expectations = [I2cTransaction::write_read(0x19, vec![0x00], vec![0xA5])];
        let mut i2c = I2cMock::new(&expectations);
        assert_eq!(read(&mut i2c, 1), 0xA5);
        i2c.done();
    }

    #[test]
    fn test_write_uses_output_register() {
        let expectations = [I2cTransaction::write(0x1A, vec![0x01, 0x86])];
        let mut i2c = I2cMock::new(&expectations);
        write(&mut i2c, 2, 0x86);
        i2c.done();
    }

    #[test]
    fn test_configure_and_invert_registers() {
        let expectations = [
            I2cTransaction::write(0x18, vec![0x03, 0x6F]),
            I2cTransaction::write(0x18, vec![0x02, 0x00]),
            I2cTransaction::write_read(0x18, vec![0x02], vec![0x10]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        configure(&mut i2c, 0, 0x6F);
        set_invert(&mut i2c, 0, 0x00);
        assert_eq!(get_invert(&mut i2c, 0), 0x10);
        i2c.done();
    }

    #[test]
    fn test_errors_are_swallowed() {
        let expectations = [
            I2cTransaction::write(0x18, vec![0x01, 0xFF])
                .with_error(ErrorKind::NoAcknowledge(
                    embedded_hal::i2c::NoAcknowledgeSource::Address,
                )),
            I2cTransaction::write_read(0x18, vec![0x00], vec![0x00]).with_error(ErrorKind::Other),
        ];
        let mut i2c = I2cMock::new(&expectations);
        write(&mut i2c, 0, 0xFF);
        assert_eq!(read(&mut i2c, 0), IDLE_BUS);
        i2c.done();
    }

    #[test]
    fn test_register_opcodes() {
        assert_eq!(Register::Input.opcode(), 0x00);
        assert_eq!(Register::Output.opcode(), 0x01);
        assert_eq!(Register::PolarityInversion.opcode(), 0x02);
        assert_eq!(Register::Configuration.opcode(), 0x03);
        assert_eq!(Register::from_opcode(0x06), Register::PolarityInversion);
        assert!(!Register::Input.is_writable());
        assert!(Register::Configuration.is_writable());
    }

    #[test]
    fn test_chip_addresses() {
        assert_eq!(address(0), 0x18);
        assert_eq!(address(2), 0x1A);
    }
}
