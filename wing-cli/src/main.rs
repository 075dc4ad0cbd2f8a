mod hex;
mod simulate;
mod trace;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use wing_panel::exchange::{ExchangeConfig, LedCommand, PanelReport};

use crate::trace::Operation;

#[derive(Parser)]
#[command(name = "wing-cli")]
#[command(about = "Wing control panel bus tracer and simulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one I2C master operation against a simulated wing and show the bus
    Trace {
        #[command(subcommand)]
        operation: TraceCommand,
        /// Chip offsets (0-2) that do not answer
        #[arg(long, value_delimiter = ',', global = true)]
        unplug: Vec<u8>,
        /// Waveform columns per row
        #[arg(long, default_value_t = 72, global = true)]
        width: usize,
    },
    /// Run the exchange loop against a simulated wing and a loopback field bus
    Simulate {
        /// Number of exchange steps
        #[arg(long, default_value_t = 20)]
        ticks: usize,
        /// Held buttons, button 1 in bit 0 (e.g. 0b00101)
        #[arg(long, default_value = "0")]
        buttons: String,
        /// Knob position, 0..=0xFFF
        #[arg(long, default_value = "0")]
        knob: String,
        /// LED command sent before the first step, as a frame payload
        #[arg(long, default_value = "1F 02 0A")]
        command: String,
        /// Steps at which the wing is unplugged
        #[arg(long, value_delimiter = ',')]
        unplug: Vec<usize>,
        /// Steps at which the wing is plugged back in
        #[arg(long, value_delimiter = ',')]
        replug: Vec<usize>,
        /// Dimmer period in steps
        #[arg(long)]
        period: Option<u8>,
        /// Print every step, not only reconfigurations
        #[arg(short, long)]
        verbose: bool,
    },
    /// Decode a field-bus frame payload given in hex
    Decode {
        #[command(subcommand)]
        direction: DecodeCommand,
    },
}

#[derive(Subcommand)]
enum TraceCommand {
    /// Register pointer and value in one transfer
    WriteRegister {
        chip: u8,
        register: String,
        value: String,
    },
    /// Register pointer, repeated start, one byte back
    ReadRegister { chip: u8, register: String },
    /// Raw write to a 7-bit address
    Write {
        address: String,
        #[arg(required = true)]
        bytes: Vec<String>,
    },
    /// Raw read from a 7-bit address
    Read {
        address: String,
        #[arg(default_value_t = 1)]
        count: usize,
    },
}

#[derive(Subcommand)]
enum DecodeCommand {
    /// Panel report (buttons, knob, presence)
    Outbound { payload: String },
    /// LED command (mask, base and pressed levels)
    Inbound { payload: String },
}

fn parse_operation(command: TraceCommand) -> Result<Operation> {
    Ok(match command {
        TraceCommand::WriteRegister {
            chip,
            register,
            value,
        } => Operation::WriteRegister {
            address: trace::chip_address(chip)?,
            register: hex::parse_u8(&register).context("parsing register")?,
            value: hex::parse_u8(&value).context("parsing value")?,
        },
        TraceCommand::ReadRegister { chip, register } => Operation::ReadRegister {
            address: trace::chip_address(chip)?,
            register: hex::parse_u8(&register).context("parsing register")?,
        },
        TraceCommand::Write { address, bytes } => Operation::Write {
            address: parse_address(&address)?,
            bytes: bytes
                .iter()
                .map(|b| hex::parse_u8(b).with_context(|| format!("parsing byte {}", b)))
                .collect::<Result<_>>()?,
        },
        TraceCommand::Read { address, count } => {
            if count == 0 {
                bail!("nothing to read");
            }
            Operation::Read {
                address: parse_address(&address)?,
                count,
            }
        }
    })
}

fn parse_address(input: &str) -> Result<u8> {
    let address = hex::parse_u8(input).context("parsing address")?;
    if address > 0x7F {
        bail!("0x{:02X} is not a 7-bit address", address);
    }
    Ok(address)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Trace {
            operation,
            unplug,
            width,
        } => {
            let operation = parse_operation(operation)?;
            let unplugged = unplug
                .iter()
                .map(|&offset| trace::chip_address(offset))
                .collect::<Result<Vec<_>>>()?;

            let result = trace::run(&operation, &unplugged);

            for line in trace::format_events(&result.events) {
                println!("{}", line);
            }
            if !result.read.is_empty() {
                println!();
                println!("Read: {}", format_bytes(&result.read));
            }
            println!();
            println!("{} quarter-bit waits", result.waveform.len());
            for line in trace::format_waveform(&result.waveform, width) {
                println!("{}", line);
            }
        }
        Command::Simulate {
            ticks,
            buttons,
            knob,
            command,
            unplug,
            replug,
            period,
            verbose,
        } => {
            let buttons = hex::parse_u8(&buttons).context("parsing buttons")?;
            let knob = hex::parse_number(&knob).context("parsing knob")?;
            let knob = match u16::try_from(knob) {
                Ok(knob) if knob <= wing_panel::pinmap::KNOB_MAX => knob,
                _ => bail!("knob {} out of range (max 0x{:03X})", knob, wing_panel::pinmap::KNOB_MAX),
            };
            let command =
                LedCommand::from_frame(&hex::parse_frame(&command).context("parsing command")?);

            let mut config = ExchangeConfig::default();
            if let Some(period) = period {
                config.period = period;
            }

            println!(
                "Simulating {} steps: buttons {:05b}, knob 0x{:03X}, leds {:05b} (base {}, pressed {} of {})",
                ticks, buttons, knob, command.leds, command.base, command.pressed, config.period
            );

            let options = simulate::Options {
                ticks,
                buttons,
                knob,
                command,
                unplug,
                replug,
                verbose,
            };
            let run = simulate::run(&options, config)?;

            let present = run.iter().filter(|tick| tick.report.present).count();
            let configured = run.iter().filter(|tick| tick.configured).count();
            println!(
                "{} of {} steps with the wing present, configured {} time(s).",
                present,
                run.len(),
                configured
            );
        }
        Command::Decode { direction } => match direction {
            DecodeCommand::Outbound { payload } => {
                let frame = hex::parse_frame(&payload).context("parsing payload")?;
                let report = PanelReport::from_frame(&frame);
                println!("Frame:   {}", hex::format_frame(&frame));
                println!("Present: {}", report.present);
                println!("Buttons: {:05b}", report.buttons);
                println!("Knob:    0x{:03X} ({})", report.knob, report.knob);
            }
            DecodeCommand::Inbound { payload } => {
                let frame = hex::parse_frame(&payload).context("parsing payload")?;
                let command = LedCommand::from_frame(&frame);
                println!("Frame:   {}", hex::format_frame(&frame));
                println!("LEDs:    {:05b}", command.leds);
                println!("Base:    {}", command.base);
                println!("Pressed: {}", command.pressed);
            }
        },
    }

    Ok(())
}

fn format_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("0x{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
