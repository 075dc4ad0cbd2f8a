//! Line-level I2C bus simulator.
//!
//! Models the two open-drain lines as a wired-AND of the master and every
//! attached device, and runs PCA9557 slave state machines off the clock
//! edges the master produces. A passive decoder turns the same edges into
//! [`BusEvent`]s, and every quarter-bit wait records a [`Sample`] of both
//! lines, so tests and the host tool can see exactly what went over the
//! wire.
//!
//! Single-threaded: handles share state through `Rc<RefCell<_>>`.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::i2c::BusLine;
use crate::pca9557::{self, Register};
use crate::pinmap::CHIP_COUNT;
use crate::timing::BitTiming;

/// Protocol-level view of the bus.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BusEvent {
    Start,
    /// A start while a transfer is already in progress.
    RepeatedStart,
    Stop,
    /// Eight data bits plus the ninth (acknowledge) bit, whoever sent them.
    Byte { value: u8, ack: bool },
}

/// Both line levels at one quarter-bit wait.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    pub scl: bool,
    pub sda: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Line {
    Scl,
    Sda,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Mode {
    Input,
    OpenDrain,
}

/// What a level change means on the bus.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Edge {
    Start,
    Stop,
    ClockRise { sda: bool },
    ClockFall,
}

impl Edge {
    fn classify(old: Sample, new: Sample) -> Option<Edge> {
        match (old.scl, new.scl) {
            (false, true) => Some(Edge::ClockRise { sda: new.sda }),
            (true, false) => Some(Edge::ClockFall),
            (true, true) if old.sda && !new.sda => Some(Edge::Start),
            (true, true) if !old.sda && new.sda => Some(Edge::Stop),
            // Data moving while the clock is low is just setup.
            _ => None,
        }
    }
}

/// Protocol analyzer. Decodes bits whether or not it saw the start.
#[derive(Default)]
struct Decoder {
    in_transfer: bool,
    bits: u8,
    shift: u16,
}

impl Decoder {
    fn observe(&mut self, edge: Edge) -> Option<BusEvent> {
        match edge {
            Edge::Start => {
                let event = if self.in_transfer {
                    BusEvent::RepeatedStart
                } else {
                    BusEvent::Start
                };
                self.in_transfer = true;
                self.bits = 0;
                self.shift = 0;
                Some(event)
            }
            Edge::Stop => {
                self.bits = 0;
                self.shift = 0;
                if core::mem::take(&mut self.in_transfer) {
                    Some(BusEvent::Stop)
                } else {
                    None
                }
            }
            Edge::ClockRise { sda } => {
                self.shift = self.shift << 1 | u16::from(sda);
                self.bits += 1;
                if self.bits < 9 {
                    return None;
                }
                let event = BusEvent::Byte {
                    value: (self.shift >> 1) as u8,
                    ack: self.shift & 1 == 0,
                };
                self.bits = 0;
                self.shift = 0;
                Some(event)
            }
            Edge::ClockFall => None,
        }
    }
}

/// Slave that acknowledges (or refuses) every byte and never sends data.
struct Responder {
    ack: bool,
    clocks: u8,
    pulling: bool,
}

impl Responder {
    fn observe(&mut self, edge: Edge) {
        match edge {
            Edge::Start | Edge::Stop => {
                self.clocks = 0;
                self.pulling = false;
            }
            Edge::ClockRise { .. } => self.clocks += 1,
            Edge::ClockFall => match self.clocks {
                8 => self.pulling = self.ack,
                9 => {
                    self.pulling = false;
                    self.clocks = 0;
                }
                _ => {}
            },
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Address,
    Pointer,
    Data,
    Transmit,
    /// Addressed someone else, or the master ended a read.
    Ignore,
}

/// PCA9557 slave model.
#[derive(Clone, Debug)]
pub struct Expander {
    address: u8,
    connected: bool,
    /// Levels the outside world puts on the pins.
    pins: u8,
    output: u8,
    invert: u8,
    config: u8,
    pointer: Register,
    writes: [usize; 4],

    phase: Phase,
    next: Phase,
    acking: bool,
    master_ack: bool,
    clocks: u8,
    shift: u8,
    transmit: u8,
    pulling: bool,
}

impl Expander {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            connected: true,
            pins: 0,
            output: pca9557::POWER_ON_OUTPUT,
            invert: pca9557::POWER_ON_INVERT,
            config: pca9557::POWER_ON_CONFIG,
            pointer: Register::Input,
            writes: [0; 4],
            phase: Phase::Idle,
            next: Phase::Idle,
            acking: false,
            master_ack: false,
            clocks: 0,
            shift: 0,
            transmit: 0,
            pulling: false,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Register contents as a read would return them.
    pub fn register(&self, register: Register) -> u8 {
        match register {
            Register::Input => {
                let levels = (self.pins & self.config) | (self.output & !self.config);
                levels ^ (self.invert & self.config)
            }
            Register::Output => self.output,
            Register::PolarityInversion => self.invert,
            Register::Configuration => self.config,
        }
    }

    /// Number of bus writes that landed in `register`.
    pub fn writes(&self, register: Register) -> usize {
        self.writes[register.opcode() as usize]
    }

    /// Drop off the bus: no ACKs, no data.
    fn unplug(&mut self) {
        self.connected = false;
        self.pulling = false;
        self.phase = Phase::Idle;
    }

    /// Come back with power-on register contents.
    fn plug_in(&mut self) {
        let pins = self.pins;
        *self = Expander::new(self.address);
        self.pins = pins;
    }

    fn store(&mut self, register: Register, value: u8) {
        match register {
            Register::Input => return,
            Register::Output => self.output = value,
            Register::PolarityInversion => self.invert = value,
            Register::Configuration => self.config = value,
        }
        self.writes[register.opcode() as usize] += 1;
    }

    fn drive_bit(&mut self, bit: u8) {
        self.pulling = self.transmit & (1 << bit) == 0;
    }

    fn receive(&mut self, byte: u8) {
        let next = match self.phase {
            Phase::Address if byte >> 1 != self.address => None,
            Phase::Address if byte & 1 == 1 => Some(Phase::Transmit),
            Phase::Address => Some(Phase::Pointer),
            Phase::Pointer => {
                self.pointer = Register::from_opcode(byte);
                Some(Phase::Data)
            }
            Phase::Data => {
                self.store(self.pointer, byte);
                Some(Phase::Data)
            }
            _ => None,
        };

        match next {
            Some(next) => {
                self.next = next;
                self.acking = true;
                self.pulling = true;
            }
            None => self.phase = Phase::Ignore,
        }
    }

    fn observe(&mut self, edge: Edge) {
        if !self.connected {
            return;
        }

        match edge {
            Edge::Start => {
                self.phase = Phase::Address;
                self.clocks = 0;
                self.shift = 0;
                self.acking = false;
                self.pulling = false;
            }
            Edge::Stop => {
                self.phase = Phase::Idle;
                self.acking = false;
                self.pulling = false;
            }
            Edge::ClockRise { sda } => match self.phase {
                Phase::Address | Phase::Pointer | Phase::Data => {
                    self.clocks += 1;
                    if self.clocks <= 8 {
                        self.shift = self.shift << 1 | u8::from(sda);
                    }
                }
                Phase::Transmit => {
                    self.clocks += 1;
                    if self.clocks == 9 {
                        self.master_ack = !sda;
                    }
                }
                Phase::Idle | Phase::Ignore => {}
            },
            Edge::ClockFall => match self.phase {
                Phase::Address | Phase::Pointer | Phase::Data => match self.clocks {
                    8 => self.receive(self.shift),
                    9 if self.acking => {
                        self.acking = false;
                        self.pulling = false;
                        self.clocks = 0;
                        self.shift = 0;
                        self.phase = self.next;
                        if self.phase == Phase::Transmit {
                            self.transmit = self.register(self.pointer);
                            self.drive_bit(7);
                        }
                    }
                    _ => {}
                },
                Phase::Transmit => match self.clocks {
                    1..=7 => self.drive_bit(7 - self.clocks),
                    // Let go for the master's ACK.
                    8 => self.pulling = false,
                    9 if self.master_ack => {
                        // No auto-increment: the same register again.
                        self.clocks = 0;
                        self.transmit = self.register(self.pointer);
                        self.drive_bit(7);
                    }
                    9 => self.phase = Phase::Ignore,
                    _ => {}
                },
                Phase::Idle | Phase::Ignore => {}
            },
        }
    }
}

struct State {
    scl_mode: Mode,
    sda_mode: Mode,
    scl_drive: bool,
    sda_drive: bool,
    levels: Sample,
    decoder: Decoder,
    responder: Option<Responder>,
    expanders: Vec<Expander>,
    events: Vec<BusEvent>,
    waveform: Vec<Sample>,
    acquisitions: usize,
}

impl State {
    fn new() -> Self {
        Self {
            scl_mode: Mode::Input,
            sda_mode: Mode::Input,
            scl_drive: true,
            sda_drive: true,
            levels: Sample {
                scl: true,
                sda: true,
            },
            decoder: Decoder::default(),
            responder: None,
            expanders: Vec::new(),
            events: Vec::new(),
            waveform: Vec::new(),
            acquisitions: 0,
        }
    }

    fn scl_level(&self) -> bool {
        self.scl_mode == Mode::Input || self.scl_drive
    }

    fn sda_level(&self) -> bool {
        let master = self.sda_mode == Mode::Input || self.sda_drive;
        let responder = self.responder.as_ref().is_some_and(|r| r.pulling);
        let expanders = self.expanders.iter().any(|e| e.pulling);
        master && !responder && !expanders
    }

    /// Recompute the wired-AND and feed any edge to everyone listening.
    fn settle(&mut self) {
        let new = Sample {
            scl: self.scl_level(),
            sda: self.sda_level(),
        };
        let old = core::mem::replace(&mut self.levels, new);

        let Some(edge) = Edge::classify(old, new) else {
            return;
        };

        if let Some(event) = self.decoder.observe(edge) {
            self.events.push(event);
        }
        if let Some(responder) = self.responder.as_mut() {
            responder.observe(edge);
        }
        for expander in self.expanders.iter_mut() {
            expander.observe(edge);
        }

        // Devices only move SDA on a falling clock, so this cannot be a
        // start or stop.
        self.levels.sda = self.sda_level();
    }

    fn expander_mut(&mut self, address: u8) -> Option<&mut Expander> {
        self.expanders.iter_mut().find(|e| e.address == address)
    }
}

/// Shared handle to a simulated bus.
#[derive(Clone)]
pub struct SimBus {
    state: Rc<RefCell<State>>,
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBus {
    /// Empty bus: pull-ups only.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(State::new())),
        }
    }

    /// A wing: one expander per chip offset.
    pub fn wing() -> Self {
        (0..CHIP_COUNT as u8).fold(Self::new(), |bus, offset| {
            bus.with_expander(pca9557::address(offset))
        })
    }

    /// Attach a PCA9557 at `address`.
    pub fn with_expander(self, address: u8) -> Self {
        self.state.borrow_mut().expanders.push(Expander::new(address));
        self
    }

    /// Attach a device that ACKs (or NACKs) every byte regardless of address.
    pub fn with_responder(self, ack: bool) -> Self {
        self.state.borrow_mut().responder = Some(Responder {
            ack,
            clocks: 0,
            pulling: false,
        });
        self
    }

    pub fn scl(&self) -> SimLine {
        SimLine {
            bus: self.clone(),
            line: Line::Scl,
        }
    }

    pub fn sda(&self) -> SimLine {
        SimLine {
            bus: self.clone(),
            line: Line::Sda,
        }
    }

    pub fn timing(&self) -> SimTiming {
        SimTiming { bus: self.clone() }
    }

    /// Decoded protocol events so far.
    pub fn events(&self) -> Vec<BusEvent> {
        self.state.borrow().events.clone()
    }

    /// Decoded protocol events since the last call; clears the log.
    pub fn take_events(&self) -> Vec<BusEvent> {
        core::mem::take(&mut self.state.borrow_mut().events)
    }

    /// Line levels at every quarter-bit wait so far.
    pub fn waveform(&self) -> Vec<Sample> {
        self.state.borrow().waveform.clone()
    }

    /// Quarter-bit waits so far.
    pub fn ticks(&self) -> usize {
        self.state.borrow().waveform.len()
    }

    /// How many times a master took the bus.
    pub fn acquisitions(&self) -> usize {
        self.state.borrow().acquisitions
    }

    /// Both lines back in input mode.
    pub fn is_released(&self) -> bool {
        let state = self.state.borrow();
        state.scl_mode == Mode::Input && state.sda_mode == Mode::Input
    }

    pub fn level(&self, line: Line) -> bool {
        let state = self.state.borrow();
        match line {
            Line::Scl => state.levels.scl,
            Line::Sda => state.levels.sda,
        }
    }

    /// Put `pins` on the input pins of the expander at `address`.
    pub fn set_pins(&self, address: u8, pins: u8) {
        self.with_expander_mut(address, |e| e.pins = pins);
    }

    pub fn unplug(&self, address: u8) {
        self.with_expander_mut(address, Expander::unplug);
    }

    pub fn plug_in(&self, address: u8) {
        self.with_expander_mut(address, Expander::plug_in);
    }

    pub fn unplug_all(&self) {
        for expander in self.state.borrow_mut().expanders.iter_mut() {
            expander.unplug();
        }
    }

    pub fn plug_in_all(&self) {
        for expander in self.state.borrow_mut().expanders.iter_mut() {
            expander.plug_in();
        }
    }

    /// Snapshot of the expander at `address`.
    pub fn expander(&self, address: u8) -> Option<Expander> {
        self.state
            .borrow()
            .expanders
            .iter()
            .find(|e| e.address == address)
            .cloned()
    }

    /// Register contents of the expander at `address`.
    pub fn register(&self, address: u8, register: Register) -> Option<u8> {
        self.expander(address).map(|e| e.register(register))
    }

    fn with_expander_mut(&self, address: u8, f: impl FnOnce(&mut Expander)) {
        if let Some(expander) = self.state.borrow_mut().expander_mut(address) {
            f(expander);
        }
    }
}

/// One line of a [`SimBus`], as seen by the master.
pub struct SimLine {
    bus: SimBus,
    line: Line,
}

impl SimLine {
    fn update(&mut self, f: impl FnOnce(&mut State, Line)) {
        let mut state = self.bus.state.borrow_mut();
        f(&mut state, self.line);
        state.settle();
    }

    fn drive(&mut self, level: bool) {
        self.update(|state, line| match line {
            Line::Scl => state.scl_drive = level,
            Line::Sda => state.sda_drive = level,
        });
    }

    fn set_mode(&mut self, mode: Mode) {
        self.update(|state, line| match line {
            Line::Scl => state.scl_mode = mode,
            Line::Sda => state.sda_mode = mode,
        });
    }
}

impl BusLine for SimLine {
    fn acquire(&mut self) {
        if self.line == Line::Scl {
            self.bus.state.borrow_mut().acquisitions += 1;
        }
        self.set_mode(Mode::OpenDrain);
    }

    fn release(&mut self) {
        self.set_mode(Mode::Input);
    }

    fn set_high(&mut self) {
        self.drive(true);
    }

    fn set_low(&mut self) {
        self.drive(false);
    }

    fn is_high(&mut self) -> bool {
        self.bus.level(self.line)
    }
}

/// Quarter-bit source that records the bus instead of waiting.
pub struct SimTiming {
    bus: SimBus,
}

impl BitTiming for SimTiming {
    fn quarter_bit(&mut self) {
        let mut state = self.bus.state.borrow_mut();
        let sample = state.levels;
        state.waveform.push(sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i2c::BitbangI2c;

    const CHIP: u8 = 0x18;

    fn master(bus: &SimBus) -> BitbangI2c<SimLine, SimLine, SimTiming> {
        BitbangI2c::new(bus.scl(), bus.sda(), bus.timing())
    }

    #[test]
    fn test_idle_bus_is_high() {
        let bus = SimBus::wing();
        assert!(bus.level(Line::Scl));
        assert!(bus.level(Line::Sda));
        assert!(bus.is_released());
    }

    #[test]
    fn test_output_round_trip_through_input_register() {
        let bus = SimBus::wing();
        let mut i2c = master(&bus);

        // Low nibble outputs, high nibble inputs reading 0b1010.
        bus.set_pins(CHIP, 0b1010_0000);
        i2c.write_register(CHIP, Register::PolarityInversion.opcode(), 0x00);
        i2c.write_register(CHIP, Register::Configuration.opcode(), 0xF0);
        i2c.write_register(CHIP, Register::Output.opcode(), 0b0000_0110);

        assert_eq!(i2c.read_register(CHIP, Register::Input.opcode()), 0b1010_0110);
    }

    #[test]
    fn test_invert_applies_to_inputs_only() {
        let bus = SimBus::wing();
        let mut i2c = master(&bus);

        bus.set_pins(CHIP, 0b1111_0000);
        i2c.write_register(CHIP, Register::Configuration.opcode(), 0xF0);
        i2c.write_register(CHIP, Register::Output.opcode(), 0b0000_0011);
        i2c.write_register(CHIP, Register::PolarityInversion.opcode(), 0xFF);

        assert_eq!(i2c.read_register(CHIP, Register::Input.opcode()), 0b0000_0011);
    }

    #[test]
    fn test_input_register_is_read_only() {
        let bus = SimBus::wing();
        let mut i2c = master(&bus);
        i2c.write_register(CHIP, Register::Input.opcode(), 0x55);
        drop(i2c);
        let expander = bus.expander(CHIP).unwrap();
        assert_eq!(expander.writes(Register::Input), 0);
        assert_eq!(expander.register(Register::Output), pca9557::POWER_ON_OUTPUT);
        // Power-on inversion of the high nibble, nothing else.
        assert_eq!(expander.register(Register::Input), 0xF0);
    }

    #[test]
    fn test_other_chips_ignore_foreign_address() {
        let bus = SimBus::wing();
        let mut i2c = master(&bus);
        i2c.write_register(0x19, Register::Output.opcode(), 0xAA);
        drop(i2c);
        assert_eq!(bus.register(0x18, Register::Output), Some(0x00));
        assert_eq!(bus.register(0x19, Register::Output), Some(0xAA));
        assert_eq!(bus.register(0x1A, Register::Output), Some(0x00));
    }

    #[test]
    fn test_unplugged_chip_reads_idle_and_keeps_registers() {
        let bus = SimBus::wing();
        let mut i2c = master(&bus);
        bus.unplug(CHIP);
        i2c.write_register(CHIP, Register::Output.opcode(), 0x12);
        assert_eq!(i2c.read_register(CHIP, Register::Output.opcode()), 0xFF);
        drop(i2c);
        assert_eq!(bus.register(CHIP, Register::Output), Some(0x00));
    }

    #[test]
    fn test_plug_in_restores_power_on_defaults() {
        let bus = SimBus::wing();
        let mut i2c = master(&bus);
        i2c.write_register(CHIP, Register::PolarityInversion.opcode(), 0x00);
        i2c.write_register(CHIP, Register::Configuration.opcode(), 0x0F);
        drop(i2c);

        bus.unplug(CHIP);
        bus.plug_in(CHIP);

        assert_eq!(
            bus.register(CHIP, Register::PolarityInversion),
            Some(pca9557::POWER_ON_INVERT)
        );
        assert_eq!(
            bus.register(CHIP, Register::Configuration),
            Some(pca9557::POWER_ON_CONFIG)
        );
        assert_eq!(bus.expander(CHIP).unwrap().writes(Register::Configuration), 0);
    }

    #[test]
    fn test_waveform_idles_high_between_transfers() {
        let bus = SimBus::wing();
        let mut i2c = master(&bus);
        i2c.write_register(CHIP, Register::Output.opcode(), 0x00);
        drop(i2c);
        let waveform = bus.waveform();
        // Start: first wait sees the idle bus, the third sees SDA low under a
        // high clock.
        assert_eq!(waveform[0], Sample { scl: true, sda: true });
        assert_eq!(waveform[2], Sample { scl: true, sda: false });
        assert!(bus.level(Line::Scl) && bus.level(Line::Sda));
    }
}
