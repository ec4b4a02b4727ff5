//! Polling driver for GPIO arcade joysticks.
//!
//! Up to two pads are wired straight to the pin header: four directions and
//! eight buttons per pad, all active low. An MCP3008 converter on a
//! software-driven SPI link supplies two analog sticks. A fixed-period tick
//! samples every pad and flushes one synchronized batch of input events per
//! pad to an [`EventSink`].
//!
//! ## Layers
//!
//! - [`PinBank`] - pin-level access to the header (implemented by the host)
//! - [`BitBangSpi`] - the four-wire link, clocked in software
//! - [`Mcp3008`] - analog channel reads over any [`embedded_hal::spi::SpiDevice`]
//! - [`sample`] / [`report`] - raw samples and their normalization into events
//! - [`AcquisitionSet`] - setup, consumer reference counting and the tick worker
//!
//! ## Example
//!
//! ```rust,ignore
//! use gpio_arcade::{AcquisitionSet, Builder, PadConfig, PadType, SpinDelay};
//!
//! let config = Builder::new()
//!     .pad(PadConfig::fixed(PadType::Gpio).unwrap())
//!     .build()?;
//! let set = AcquisitionSet::create(config, pins, SpinDelay::new(), provider)?;
//!
//! set.attach()?; // first consumer arms the tick
//! // ... events flow into the sinks ...
//! set.detach(); // last consumer stops it and waits for the running pass
//! set.destroy();
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(
    not(test),
    deny(
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented,
        clippy::unwrap_used
    )
)]

extern crate alloc;

pub mod config;
pub mod error;
pub mod input;
pub mod mcp3008;
pub mod params;
pub mod pins;
pub mod report;
pub mod sample;
pub mod spi;

#[cfg(feature = "std")]
pub mod acquisition;
#[cfg(feature = "std")]
pub mod delay;
#[cfg(feature = "std")]
pub mod pad;
#[cfg(feature = "std")]
pub mod scheduler;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use config::{
    AcquisitionConfig, Builder, PadConfig, PadType, PinMap, SerialLinkConfig, BPLUS_PIN_MAP,
    DEFAULT_REFRESH_HZ, GPIO_PIN_MAP,
};
pub use error::{ConfigError, Error, SetupError};
pub use input::{AbsParams, Axis, Button, DeviceIdentity, EventSink, SinkProvider, BUTTON_TABLE};
pub use mcp3008::{Channel, Mcp3008};
pub use pins::{PinBank, Pull};
pub use report::{Direction, normalize_and_flush};
pub use sample::{AnalogSample, DigitalSample, RawSample};
pub use spi::{BitBangError, BitBangSpi, HALF_CYCLE_US};

#[cfg(feature = "std")]
pub use acquisition::AcquisitionSet;
#[cfg(feature = "std")]
pub use delay::SpinDelay;
#[cfg(feature = "std")]
pub use scheduler::TickStats;

/// Maximum number of pads sampled by one acquisition set.
pub const MAX_PADS: usize = 2;

/// Digital lines per pad: four directions followed by eight buttons.
pub const PAD_LINES: usize = 12;
