//! Driver stack for the wing control panel.
//!
//! The wing is three PCA9557 I/O expanders on one board, hung off a pair of
//! plain GPIO lines that are bit-banged as an I2C master. This crate is
//! `no_std` so the same code runs in the firmware and in host tooling.
//!
//! Layers, bottom up:
//! - [`timing`]: the quarter-bit delay every bus operation is built from
//! - [`i2c`]: the bit-banged master and its line abstraction
//! - [`pca9557`]: expander register access
//! - [`pinmap`]: which pin of which chip is a button, knob bit or LED
//! - [`panel`]: the wing itself, including hot-plug detection
//! - [`dimmer`] and [`exchange`]: the periodic field-bus glue

#![cfg_attr(not(test), no_std)]

#[cfg(any(test, feature = "sim"))]
extern crate alloc;

#[macro_use]
mod fmt;

pub mod dimmer;
pub mod exchange;
pub mod i2c;
pub mod panel;
pub mod pca9557;
pub mod pinmap;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod timing;

pub use dimmer::Dimmer;
pub use exchange::{Exchange, ExchangeConfig, FieldBus, Frame, LedCommand, PanelReport};
pub use i2c::{BitbangI2c, BusLine, OpenDrain};
pub use panel::{Panel, Presence, Wing};
pub use timing::{BitTiming, DelayTiming, SpinDelay};
