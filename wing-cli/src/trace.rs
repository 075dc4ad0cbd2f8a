use wing_panel::pca9557::{self, Register};
use wing_panel::sim::{BusEvent, Sample, SimBus};
use wing_panel::BitbangI2c;

/// One master operation to run against a simulated wing.
#[derive(Debug, Clone)]
pub enum Operation {
    WriteRegister { address: u8, register: u8, value: u8 },
    ReadRegister { address: u8, register: u8 },
    Write { address: u8, bytes: Vec<u8> },
    Read { address: u8, count: usize },
}

/// What went over the wire for one operation.
pub struct Trace {
    pub events: Vec<BusEvent>,
    pub waveform: Vec<Sample>,
    /// Bytes read back, if the operation reads.
    pub read: Vec<u8>,
}

/// Run `operation` on a fresh simulated wing. `unplugged` chip addresses
/// do not answer.
pub fn run(operation: &Operation, unplugged: &[u8]) -> Trace {
    let bus = SimBus::wing();
    for &address in unplugged {
        bus.unplug(address);
    }

    let mut read = Vec::new();
    {
        let mut i2c = BitbangI2c::new(bus.scl(), bus.sda(), bus.timing());
        match *operation {
            Operation::WriteRegister {
                address,
                register,
                value,
            } => i2c.write_register(address, register, value),
            Operation::ReadRegister { address, register } => {
                read.push(i2c.read_register(address, register));
            }
            Operation::Write { address, ref bytes } => i2c.write_bytes(address, bytes),
            Operation::Read { address, count } => {
                read.resize(count, 0);
                i2c.read_bytes(address, &mut read);
            }
        }
    }

    Trace {
        events: bus.events(),
        waveform: bus.waveform(),
        read,
    }
}

/// One line per event, with the byte's role where it is known.
pub fn format_events(events: &[BusEvent]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut position = 0;
    let mut reading = false;

    for event in events {
        let line = match *event {
            BusEvent::Start => {
                position = 0;
                "START".to_string()
            }
            BusEvent::RepeatedStart => {
                position = 0;
                "REPEATED START".to_string()
            }
            BusEvent::Stop => "STOP".to_string(),
            BusEvent::Byte { value, ack } => {
                let role = if position == 0 {
                    reading = value & 1 == 1;
                    let direction = if reading { "R" } else { "W" };
                    format!("address 0x{:02X} {}", value >> 1, direction)
                } else if reading {
                    "data".to_string()
                } else if position == 1 {
                    format!("register {:?}", Register::from_opcode(value))
                } else {
                    "data".to_string()
                };
                position += 1;
                format!(
                    "  0x{:02X} {:<28} {}",
                    value,
                    role,
                    if ack { "ACK" } else { "NACK" }
                )
            }
        };
        lines.push(line);
    }

    lines
}

/// Two rows of ASCII, one column per quarter-bit sample, wrapped at `width`.
pub fn format_waveform(waveform: &[Sample], width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for chunk in waveform.chunks(width) {
        let scl: String = chunk.iter().map(|s| level(s.scl)).collect();
        let sda: String = chunk.iter().map(|s| level(s.sda)).collect();
        lines.push(format!("SCL {}", scl));
        lines.push(format!("SDA {}", sda));
        lines.push(String::new());
    }

    lines
}

fn level(high: bool) -> char {
    if high {
        '-'
    } else {
        '_'
    }
}

/// Bus address of chip `offset`, rejecting offsets the wing does not have.
pub fn chip_address(offset: u8) -> anyhow::Result<u8> {
    if usize::from(offset) >= wing_panel::pinmap::CHIP_COUNT {
        anyhow::bail!(
            "chip offset {} out of range (0..{})",
            offset,
            wing_panel::pinmap::CHIP_COUNT
        );
    }
    Ok(pca9557::address(offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_register_trace() {
        let trace = run(
            &Operation::WriteRegister {
                address: 0x18,
                register: 0x03,
                value: 0x6F,
            },
            &[],
        );
        let lines = format_events(&trace.events);
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "START");
        assert!(lines[1].contains("address 0x18 W"));
        assert!(lines[1].ends_with("ACK"));
        assert!(lines[2].contains("register Configuration"));
        assert!(lines[3].starts_with("  0x6F"));
        assert_eq!(lines[4], "STOP");
        assert!(trace.read.is_empty());
    }

    #[test]
    fn test_read_register_trace() {
        let trace = run(
            &Operation::ReadRegister {
                address: 0x1A,
                register: 0x03,
            },
            &[],
        );
        assert_eq!(trace.read, [pca9557::POWER_ON_CONFIG]);
        let lines = format_events(&trace.events);
        assert_eq!(lines[3], "REPEATED START");
        assert!(lines[4].contains("address 0x1A R"));
        assert!(lines[5].contains("data"));
        assert!(lines[5].ends_with("NACK"));
        assert_eq!(lines[6], "STOP");
    }

    #[test]
    fn test_unplugged_chip_nacks() {
        let trace = run(
            &Operation::WriteRegister {
                address: 0x19,
                register: 0x01,
                value: 0x00,
            },
            &[0x19],
        );
        let lines = format_events(&trace.events);
        assert!(lines[1].ends_with("NACK"));
    }

    #[test]
    fn test_read_bytes() {
        let trace = run(&Operation::Read { address: 0x18, count: 2 }, &[]);
        // Pointer starts at Input: power-on inversion of the floating inputs.
        assert_eq!(trace.read, [0xF0, 0xF0]);
    }

    #[test]
    fn test_waveform_rows() {
        let trace = run(
            &Operation::Write {
                address: 0x18,
                bytes: vec![0x01],
            },
            &[],
        );
        let lines = format_waveform(&trace.waveform, 40);
        let columns: usize = lines
            .iter()
            .filter(|line| line.starts_with("SCL "))
            .map(|line| line.len() - 4)
            .sum();
        assert_eq!(columns, trace.waveform.len());
        assert!(lines.iter().all(|line| line.len() <= 44));
    }

    #[test]
    fn test_chip_address() {
        assert_eq!(chip_address(2).unwrap(), 0x1A);
        assert!(chip_address(3).is_err());
    }
}
