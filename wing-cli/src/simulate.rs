use std::collections::VecDeque;
use std::convert::Infallible;

use anyhow::{anyhow, Result};
use indicatif::{ProgressBar, ProgressStyle};
use wing_panel::exchange::{Exchange, ExchangeConfig, FieldBus, Frame, LedCommand, PanelReport};
use wing_panel::pca9557;
use wing_panel::pinmap::{Role, PIN_MAP};
use wing_panel::sim::{SimBus, SimLine, SimTiming};
use wing_panel::Wing;

use crate::hex::format_frame;

/// Field bus that keeps what was sent and hands out queued frames.
#[derive(Default)]
pub struct Loopback {
    pub sent: Vec<(u32, Frame)>,
    inbox: VecDeque<(u32, Frame)>,
}

impl Loopback {
    pub fn queue(&mut self, id: u32, frame: Frame) {
        self.inbox.push_back((id, frame));
    }
}

impl FieldBus for Loopback {
    type Error = Infallible;

    fn send(&mut self, id: u32, frame: &Frame, _timeout_ms: u32) -> Result<(), Self::Error> {
        self.sent.push((id, *frame));
        Ok(())
    }

    fn receive(&mut self, id: u32, _timeout_ms: u32) -> Result<Option<Frame>, Self::Error> {
        let position = self.inbox.iter().position(|(queued, _)| *queued == id);
        Ok(position
            .and_then(|i| self.inbox.remove(i))
            .map(|(_, frame)| frame))
    }
}

pub struct Options {
    pub ticks: usize,
    /// Buttons held down for the whole run, button 1 in bit 0.
    pub buttons: u8,
    pub knob: u16,
    pub command: LedCommand,
    /// Ticks at which the whole wing is unplugged.
    pub unplug: Vec<usize>,
    /// Ticks at which it is plugged back in.
    pub replug: Vec<usize>,
    pub verbose: bool,
}

/// One line of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub tick: usize,
    pub report: PanelReport,
    /// LED mask written to the panel this tick.
    pub leds: u8,
    /// Whether the chips were (re)configured this tick.
    pub configured: bool,
}

/// Input pin levels per chip that show `buttons` pressed and `knob` on the
/// dial.
pub fn pin_levels(buttons: u8, knob: u16) -> Vec<(u8, u8)> {
    PIN_MAP
        .iter()
        .map(|chip| {
            let pins = chip
                .pins
                .iter()
                .enumerate()
                .fold(0u8, |pins, (bit, pin)| {
                    let set = match pin.role {
                        Role::Button(index) => buttons >> index & 1 != 0,
                        Role::Knob(index) => knob >> index & 1 != 0,
                        _ => false,
                    };
                    if set {
                        pins | 1 << bit
                    } else {
                        pins
                    }
                });
            (pca9557::address(chip.offset), pins)
        })
        .collect()
}

fn config_writes(bus: &SimBus) -> usize {
    PIN_MAP
        .iter()
        .filter_map(|chip| bus.expander(pca9557::address(chip.offset)))
        .map(|expander| expander.writes(pca9557::Register::Configuration))
        .sum()
}

fn led_levels(bus: &SimBus) -> u8 {
    PIN_MAP
        .iter()
        .filter_map(|chip| {
            let expander = bus.expander(pca9557::address(chip.offset))?;
            let output = expander.register(pca9557::Register::Output);
            let config = expander.register(pca9557::Register::Configuration);
            Some(chip.pins.iter().enumerate().fold(0u8, |leds, (bit, pin)| {
                match pin.role {
                    Role::Led(index) if config & (1 << bit) == 0 && output & (1 << bit) != 0 => {
                        leds | 1 << index
                    }
                    _ => leds,
                }
            }))
        })
        .fold(0, |leds, chip| leds | chip)
}

/// Run the exchange loop against a simulated wing.
pub fn run(options: &Options, config: ExchangeConfig) -> Result<Vec<Tick>> {
    let bus = SimBus::wing();
    for (address, pins) in pin_levels(options.buttons, options.knob) {
        bus.set_pins(address, pins);
    }

    let wing: Wing<SimLine, SimLine, SimTiming> = Wing::new(bus.scl(), bus.sda(), bus.timing());
    let mut loopback = Loopback::default();
    loopback.queue(config.rx_id, options.command.to_frame());
    let mut exchange = Exchange::new(wing, loopback, config);

    let pb = ProgressBar::new(options.ticks as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ticks")
            .map_err(|e| anyhow!("progress template: {}", e))?
            .progress_chars("=> "),
    );
    pb.set_message("Simulating");

    let mut ticks = Vec::with_capacity(options.ticks);
    let mut writes = config_writes(&bus);

    for tick in 0..options.ticks {
        if options.unplug.contains(&tick) {
            bus.unplug_all();
            pb.println(format!("tick {:>4}: wing unplugged", tick));
        }
        if options.replug.contains(&tick) {
            bus.plug_in_all();
            // Power-cycled chips forget everything but the pins.
            writes = 0;
            pb.println(format!("tick {:>4}: wing plugged in", tick));
        }

        let report = exchange.step().map_err(|e| anyhow!("tick {}: {}", tick, e))?;

        let now = config_writes(&bus);
        let configured = now > writes;
        writes = now;

        let entry = Tick {
            tick,
            report,
            leds: led_levels(&bus),
            configured,
        };

        if options.verbose || configured {
            pb.println(format_tick(&entry, &report.to_frame()));
        }

        ticks.push(entry);
        pb.inc(1);
    }

    pb.finish_with_message("Done");
    Ok(ticks)
}

pub fn format_tick(tick: &Tick, frame: &Frame) -> String {
    let panel = if tick.report.present {
        format!(
            "buttons {:05b} knob 0x{:03X}",
            tick.report.buttons, tick.report.knob
        )
    } else {
        "absent".to_string()
    };

    format!(
        "tick {:>4}: {:<28} leds {:05b}  tx [{}]{}",
        tick.tick,
        panel,
        tick.leds,
        format_frame(frame),
        if tick.configured { "  (configured)" } else { "" }
    )
}
