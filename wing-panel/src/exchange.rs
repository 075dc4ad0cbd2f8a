//! Periodic exchange between the wing and a field bus.
//!
//! Every [`Exchange::step`] probes the panel, sends one [`PanelReport`],
//! polls once for a [`LedCommand`] and drives the LEDs through the
//! [`Dimmer`]. The field bus itself (CAN in the firmware) sits behind
//! [`FieldBus`].

use crate::dimmer::{Dimmer, DEFAULT_PERIOD};
use crate::panel::Panel;
use crate::pinmap::LED_MASK;

pub const FRAME_LEN: usize = 8;

/// One field-bus payload.
pub type Frame = [u8; FRAME_LEN];

/// Byte 3 of an outbound frame.
const PRESENT_FLAG: u8 = 0x01;

/// Message transport. `timeout_ms == 0` means do not wait.
pub trait FieldBus {
    type Error;

    fn send(&mut self, id: u32, frame: &Frame, timeout_ms: u32) -> Result<(), Self::Error>;

    /// `Ok(None)` when no message with `id` arrived within the timeout.
    fn receive(&mut self, id: u32, timeout_ms: u32) -> Result<Option<Frame>, Self::Error>;
}

/// Panel state as sent upstream.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PanelReport {
    pub buttons: u8,
    pub knob: u16,
    pub present: bool,
}

impl PanelReport {
    /// What is reported while the wing is unplugged.
    pub const ABSENT: PanelReport = PanelReport {
        buttons: 0,
        knob: 0,
        present: false,
    };

    pub fn to_frame(&self) -> Frame {
        let knob = self.knob.to_le_bytes();
        let mut frame = [0; FRAME_LEN];
        frame[0] = self.buttons;
        frame[1] = knob[0];
        frame[2] = knob[1];
        frame[3] = if self.present { PRESENT_FLAG } else { 0 };
        frame
    }

    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            buttons: frame[0],
            knob: u16::from_le_bytes([frame[1], frame[2]]),
            present: frame[3] & PRESENT_FLAG != 0,
        }
    }
}

/// LED state requested from upstream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LedCommand {
    /// Logically lit LEDs, LED 1 in bit 0.
    pub leds: u8,
    /// Backlight level, in frames per dimmer period.
    pub base: u8,
    /// Level of lit LEDs, in frames per dimmer period.
    pub pressed: u8,
}

impl Default for LedCommand {
    /// All LEDs off until someone says otherwise.
    fn default() -> Self {
        Self {
            leds: 0,
            base: 0,
            pressed: DEFAULT_PERIOD,
        }
    }
}

impl LedCommand {
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            leds: frame[0] & LED_MASK,
            base: frame[1],
            pressed: frame[2],
        }
    }

    pub fn to_frame(&self) -> Frame {
        let mut frame = [0; FRAME_LEN];
        frame[0] = self.leds;
        frame[1] = self.base;
        frame[2] = self.pressed;
        frame
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExchangeConfig {
    /// Id of outbound [`PanelReport`]s.
    pub tx_id: u32,
    /// Id of inbound [`LedCommand`]s.
    pub rx_id: u32,
    pub tx_timeout_ms: u32,
    pub rx_timeout_ms: u32,
    /// Dimmer period, in steps.
    pub period: u8,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            tx_id: 0x700,
            rx_id: 0x701,
            tx_timeout_ms: 10,
            rx_timeout_ms: 0,
            period: DEFAULT_PERIOD,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    Send(E),
    Receive(E),
}

impl<E: core::fmt::Debug> core::fmt::Display for Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Send(e) => write!(f, "field bus send failed: {e:?}"),
            Error::Receive(e) => write!(f, "field bus receive failed: {e:?}"),
        }
    }
}

pub struct Exchange<P, B> {
    panel: P,
    bus: B,
    config: ExchangeConfig,
    command: LedCommand,
    dimmer: Dimmer,
}

impl<P: Panel, B: FieldBus> Exchange<P, B> {
    pub fn new(panel: P, bus: B, config: ExchangeConfig) -> Self {
        let command = LedCommand::default();

        Self {
            panel,
            bus,
            config,
            command,
            dimmer: Dimmer::new(config.period, command.base, command.pressed),
        }
    }

    /// One exchange cycle. Returns the report that was sent.
    ///
    /// The LEDs are driven even when the field bus fails; a send error is
    /// reported in preference to a receive error.
    pub fn step(&mut self) -> Result<PanelReport, Error<B::Error>> {
        let report = if self.panel.check_alive_and_reinit() {
            PanelReport {
                buttons: self.panel.read_buttons(),
                knob: self.panel.read_knob(),
                present: true,
            }
        } else {
            PanelReport::ABSENT
        };

        let sent = self
            .bus
            .send(self.config.tx_id, &report.to_frame(), self.config.tx_timeout_ms)
            .map_err(Error::Send);

        let received = self
            .bus
            .receive(self.config.rx_id, self.config.rx_timeout_ms)
            .map_err(Error::Receive);

        if let Ok(Some(frame)) = &received {
            self.command = LedCommand::from_frame(frame);
            self.dimmer.set_levels(self.command.base, self.command.pressed);
            debug!(
                "exchange: leds {=u8:#x} base {} pressed {}",
                self.command.leds,
                self.command.base,
                self.command.pressed
            );
        }

        let leds = self.dimmer.next(self.command.leds);
        self.panel.write_leds(leds);

        sent?;
        received?;
        Ok(report)
    }

    /// LED state last received.
    pub fn command(&self) -> LedCommand {
        self.command
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn panel(&self) -> &P {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut P {
        &mut self.panel
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_parts(self) -> (P, B) {
        (self.panel, self.bus)
    }
}
