//! Error types for the driver
//!
//! ## Error Types
//!
//! - [`ConfigError`] - Invalid pad, pin map or parameter; raised before
//!   anything is allocated
//! - [`SetupError`] - Failures while bringing pads up in
//!   [`AcquisitionSet::create`](crate::AcquisitionSet::create)
//! - [`Error`] - Runtime errors of the consumer lifecycle
//!
//! Timing glitches on the software SPI link and a missing converter are not
//! errors: they produce plausible-looking but wrong analog values.
//!
//! ## Example
//!
//! ```
//! use gpio_arcade::{ConfigError, PadConfig};
//!
//! // A custom map needs all 12 slots
//! let result = PadConfig::custom(&[4, 17, 27, 22, 10, 9, 25, 24, 23, 18, 15]);
//! assert!(matches!(result, Err(ConfigError::PinMapLength { found: 11, .. })));
//! ```

use alloc::string::String;
use core::fmt::{self, Debug};

use crate::config::MAX_PIN;
use crate::MAX_PADS;

/// Errors that can occur when building configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Pad type code is neither empty (`0`) nor a known wiring
    UnknownPadType(i32),
    /// A custom pad was requested without a pin map
    MissingCustomPins,
    /// Custom pin map has the wrong number of entries
    PinMapLength {
        /// Number of slots a pin map must have
        expected: usize,
        /// Number of entries supplied
        found: usize,
    },
    /// Pin number outside `0..=MAX_PIN` (and not the unused marker where allowed)
    InvalidPin(i32),
    /// Serial link override does not name exactly four lines
    SerialLinkLength(usize),
    /// Every pad slot is empty
    NoDevices,
    /// More pad slots than [`MAX_PADS`]
    TooManyPads(usize),
    /// Sampling rate of zero or above 1 kHz
    InvalidRefreshRate(u32),
    /// Parameter key not understood
    UnknownParameter(String),
    /// Parameter value could not be parsed
    InvalidValue {
        /// Parameter key
        key: String,
        /// Offending value
        value: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownPadType(code) => write!(f, "Pad type {code} unknown"),
            ConfigError::MissingCustomPins => write!(f, "Custom device needs gpio argument"),
            ConfigError::PinMapLength { expected, found } => write!(
                f,
                "Invalid gpio argument: expected {expected} pins, found {found}"
            ),
            ConfigError::InvalidPin(pin) => {
                write!(f, "Invalid pin {pin} (valid pins are 0..={MAX_PIN})")
            }
            ConfigError::SerialLinkLength(found) => {
                write!(f, "Invalid spi argument: expected 4 lines, found {found}")
            }
            ConfigError::NoDevices => write!(f, "No valid devices specified"),
            ConfigError::TooManyPads(found) => {
                write!(f, "{found} pads requested, at most {MAX_PADS} are supported")
            }
            ConfigError::InvalidRefreshRate(hz) => {
                write!(f, "Invalid refresh rate {hz} Hz (must be 1..=1000)")
            }
            ConfigError::UnknownParameter(key) => write!(f, "Unknown parameter '{key}'"),
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid value '{value}' for parameter '{key}'")
            }
        }
    }
}

impl core::error::Error for ConfigError {}

/// Errors that can occur while setting up an acquisition set
///
/// Generic over the pin bank and sink provider error types. When a pad fails,
/// every pad set up before it has already been unregistered.
#[derive(Debug)]
pub enum SetupError<PinErr, SinkErr> {
    /// Configuration rejected before any sink was allocated
    Config(ConfigError),
    /// Pin direction or pull configuration failed
    Pin(PinErr),
    /// The sink provider could not allocate or register a device
    ResourceExhausted(SinkErr),
}

impl<PinErr, SinkErr> From<ConfigError> for SetupError<PinErr, SinkErr> {
    fn from(err: ConfigError) -> Self {
        SetupError::Config(err)
    }
}

impl<PinErr: Debug, SinkErr: Debug> fmt::Display for SetupError<PinErr, SinkErr> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::Config(e) => write!(f, "Configuration error: {e}"),
            SetupError::Pin(e) => write!(f, "Pin error: {e:?}"),
            SetupError::ResourceExhausted(e) => {
                write!(f, "Not enough resources for input device: {e:?}")
            }
        }
    }
}

impl<PinErr: Debug, SinkErr: Debug> core::error::Error for SetupError<PinErr, SinkErr> {}

/// Errors of the consumer lifecycle
#[derive(Debug)]
pub enum Error {
    /// The lifecycle lock could not be acquired; nothing changed, retry or abort
    Interrupted,
    /// The tick worker thread could not be started; nothing changed
    #[cfg(feature = "std")]
    Spawn(std::io::Error),
    /// A sampling pass panicked and took the pads with it
    EngineLost,
    /// A single pass was requested while the tick is armed
    Busy,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Interrupted => write!(f, "Interrupted while waiting for the pad lock"),
            #[cfg(feature = "std")]
            Error::Spawn(e) => write!(f, "Could not start the sampling thread: {e}"),
            Error::EngineLost => write!(f, "Sampling engine lost after a panic"),
            Error::Busy => write!(f, "Sampling is already running"),
        }
    }
}

impl core::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn messages_name_the_offending_value() {
        assert_eq!(
            ConfigError::UnknownPadType(7).to_string(),
            "Pad type 7 unknown"
        );
        assert_eq!(
            ConfigError::PinMapLength {
                expected: 12,
                found: 11
            }
            .to_string(),
            "Invalid gpio argument: expected 12 pins, found 11"
        );
        assert!(ConfigError::InvalidPin(60).to_string().contains("60"));
    }

    #[test]
    fn config_errors_convert_into_setup_errors() {
        let err: SetupError<(), ()> = ConfigError::NoDevices.into();
        assert!(matches!(err, SetupError::Config(ConfigError::NoDevices)));
        assert_eq!(
            err.to_string(),
            "Configuration error: No valid devices specified"
        );
    }
}
