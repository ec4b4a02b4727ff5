//! Pad and serial link configuration types and builder

use core::fmt;

use crate::{MAX_PADS, PAD_LINES};

pub use crate::error::ConfigError;

/// Highest pin number accepted in a pin map (the BCM283x bank has 54 lines)
pub const MAX_PIN: u8 = 53;

/// Default sampling rate, in passes per second
pub const DEFAULT_REFRESH_HZ: u32 = 100;

/// Map of the first pad: up, down, left, right, start, select, a, b, tr, y, x, tl
pub const GPIO_PIN_MAP: [i32; PAD_LINES] = [4, 17, 27, 22, 10, 9, 25, 24, 23, 18, 15, 14];

/// Map of the second pad, on the extra lines of the 40-pin B+ header
pub const BPLUS_PIN_MAP: [i32; PAD_LINES] = [11, 5, 6, 13, 19, 26, 21, 20, 16, 12, 7, 8];

/// Pin value marking an unused slot in the numeric form of a pin map
pub const UNUSED_PIN: i32 = -1;

/// Wiring variant of a pad
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PadType {
    /// Fixed map on the 26-pin header ([`GPIO_PIN_MAP`])
    Gpio,
    /// Fixed map on the B+ header ([`BPLUS_PIN_MAP`])
    GpioBPlus,
    /// User supplied map
    GpioCustom,
}

impl PadType {
    /// Decode a numeric pad type
    ///
    /// `0` marks an empty slot and decodes to `Ok(None)`.
    pub fn from_code(code: i32) -> Result<Option<Self>, ConfigError> {
        match code {
            0 => Ok(None),
            1 => Ok(Some(PadType::Gpio)),
            2 => Ok(Some(PadType::GpioBPlus)),
            3 => Ok(Some(PadType::GpioCustom)),
            other => Err(ConfigError::UnknownPadType(other)),
        }
    }

    /// Numeric code of this pad type, also used as the device product id
    pub fn code(self) -> u16 {
        match self {
            PadType::Gpio => 1,
            PadType::GpioBPlus => 2,
            PadType::GpioCustom => 3,
        }
    }

    /// Device name announced to the event sink
    pub fn device_name(self) -> &'static str {
        match self {
            PadType::Gpio | PadType::GpioCustom => "GPIO Controller 1",
            PadType::GpioBPlus => "GPIO Controller 2",
        }
    }
}

/// Ordered pin slots of one pad
///
/// Slots 0..4 are the directions (up, down, left, right), slots 4..12 the
/// buttons in [`BUTTON_TABLE`](crate::input::BUTTON_TABLE) order. `None`
/// marks an unused slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PinMap([Option<u8>; PAD_LINES]);

impl PinMap {
    /// Build a pin map from its numeric form, `-1` meaning unused
    ///
    /// # Errors
    ///
    /// - [`ConfigError::PinMapLength`] unless exactly 12 entries are given
    /// - [`ConfigError::InvalidPin`] for negative values other than `-1` or
    ///   pins above [`MAX_PIN`]
    pub fn from_numbers(pins: &[i32]) -> Result<Self, ConfigError> {
        if pins.len() != PAD_LINES {
            return Err(ConfigError::PinMapLength {
                expected: PAD_LINES,
                found: pins.len(),
            });
        }

        let mut slots = [None; PAD_LINES];
        for (slot, &pin) in slots.iter_mut().zip(pins) {
            *slot = parse_pin(pin)?;
        }
        Ok(Self(slots))
    }

    pub fn slots(&self) -> &[Option<u8>; PAD_LINES] {
        &self.0
    }

    /// Pins that are actually wired
    pub fn used(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().flatten().copied()
    }

    /// Pull-resistor mask covering every used slot
    pub fn pull_mask(&self) -> u64 {
        crate::pins::pull_mask(&self.0)
    }
}

fn parse_pin(pin: i32) -> Result<Option<u8>, ConfigError> {
    match pin {
        UNUSED_PIN => Ok(None),
        pin if (0..=i32::from(MAX_PIN)).contains(&pin) => Ok(Some(pin as u8)),
        other => Err(ConfigError::InvalidPin(other)),
    }
}

/// Configuration of a single pad
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PadConfig {
    pad_type: PadType,
    pin_map: PinMap,
}

impl PadConfig {
    /// Configuration of one of the two fixed wirings
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingCustomPins`] for [`PadType::GpioCustom`], whose
    /// pins come from [`PadConfig::custom`].
    pub fn fixed(pad_type: PadType) -> Result<Self, ConfigError> {
        let pin_map = match pad_type {
            PadType::Gpio => PinMap::from_numbers(&GPIO_PIN_MAP)?,
            PadType::GpioBPlus => PinMap::from_numbers(&BPLUS_PIN_MAP)?,
            PadType::GpioCustom => return Err(ConfigError::MissingCustomPins),
        };
        Ok(Self { pad_type, pin_map })
    }

    /// Custom wiring from a numeric pin map
    ///
    /// # Errors
    ///
    /// See [`PinMap::from_numbers`].
    pub fn custom(pins: &[i32]) -> Result<Self, ConfigError> {
        Ok(Self {
            pad_type: PadType::GpioCustom,
            pin_map: PinMap::from_numbers(pins)?,
        })
    }

    pub fn pad_type(&self) -> PadType {
        self.pad_type
    }

    pub fn pin_map(&self) -> &PinMap {
        &self.pin_map
    }
}

/// Pins of the software SPI link to the converter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SerialLinkConfig {
    /// MISO, converter to host
    pub data_in: u8,
    /// MOSI, host to converter
    pub data_out: u8,
    /// SCLK
    pub clock: u8,
    /// Chip select, active low
    pub select: u8,
}

impl SerialLinkConfig {
    pub const DEFAULT: Self = Self {
        data_in: 16,
        data_out: 26,
        clock: 20,
        select: 21,
    };

    /// Build from `[miso, mosi, clk, cs]`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPin`] if any line is not a valid pin.
    pub fn from_numbers(lines: [i32; 4]) -> Result<Self, ConfigError> {
        let line = |pin: i32| match parse_pin(pin)? {
            Some(pin) => Ok(pin),
            None => Err(ConfigError::InvalidPin(pin)),
        };
        Ok(Self {
            data_in: line(lines[0])?,
            data_out: line(lines[1])?,
            clock: line(lines[2])?,
            select: line(lines[3])?,
        })
    }

    pub fn lines(&self) -> [u8; 4] {
        [self.data_in, self.data_out, self.clock, self.select]
    }
}

impl Default for SerialLinkConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for SerialLinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "miso={} mosi={} clk={} cs={}",
            self.data_in, self.data_out, self.clock, self.select
        )
    }
}

/// Validated configuration of an acquisition set
///
/// Use [`Builder`] to create one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcquisitionConfig {
    /// Pad slots; `None` is an empty slot
    pub pads: [Option<PadConfig>; MAX_PADS],
    /// Converter link, shared by all pads
    pub serial_link: SerialLinkConfig,
    /// Sampling passes per second
    pub refresh_hz: u32,
}

impl AcquisitionConfig {
    /// Configured pads with their slot index
    pub fn configured(&self) -> impl Iterator<Item = (usize, &PadConfig)> {
        self.pads
            .iter()
            .enumerate()
            .filter_map(|(slot, pad)| pad.as_ref().map(|pad| (slot, pad)))
    }

    /// Time between the end of one pass and the start of the next
    pub fn refresh_period_us(&self) -> u64 {
        1_000_000 / u64::from(self.refresh_hz.max(1))
    }
}

/// Builder for constructing an acquisition configuration
///
/// # Example
///
/// ```
/// use gpio_arcade::{Builder, PadConfig, PadType};
///
/// let config = Builder::new()
///     .pad(PadConfig::fixed(PadType::Gpio).unwrap())
///     .pad(PadConfig::fixed(PadType::GpioBPlus).unwrap())
///     .build()
///     .expect("valid configuration");
/// assert_eq!(config.configured().count(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct Builder {
    /// Pad slots in order; `None` leaves a slot empty
    slots: alloc::vec::Vec<Option<PadConfig>>,
    /// Converter link pins
    serial_link: SerialLinkConfig,
    /// Sampling passes per second
    refresh_hz: u32,
}

impl Default for Builder {
    fn default() -> Self {
        Builder {
            slots: alloc::vec::Vec::new(),
            serial_link: SerialLinkConfig::DEFAULT,
            refresh_hz: DEFAULT_REFRESH_HZ,
        }
    }
}

impl Builder {
    /// Create a new Builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pad in the next slot
    pub fn pad(mut self, pad: PadConfig) -> Self {
        self.slots.push(Some(pad));
        self
    }

    /// Leave the next slot empty
    pub fn empty_slot(mut self) -> Self {
        self.slots.push(None);
        self
    }

    /// Override the converter link pins
    pub fn serial_link(mut self, lines: SerialLinkConfig) -> Self {
        self.serial_link = lines;
        self
    }

    /// Set the sampling rate in passes per second
    pub fn refresh_hz(mut self, hz: u32) -> Self {
        self.refresh_hz = hz;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// - [`ConfigError::TooManyPads`] if more than [`MAX_PADS`] slots were added
    /// - [`ConfigError::NoDevices`] if every slot is empty
    /// - [`ConfigError::InvalidRefreshRate`] for a rate of zero or above 1 kHz
    pub fn build(self) -> Result<AcquisitionConfig, ConfigError> {
        if self.slots.len() > MAX_PADS {
            return Err(ConfigError::TooManyPads(self.slots.len()));
        }
        if self.refresh_hz == 0 || self.refresh_hz > 1000 {
            return Err(ConfigError::InvalidRefreshRate(self.refresh_hz));
        }

        let mut pads: [Option<PadConfig>; MAX_PADS] = Default::default();
        for (slot, pad) in pads.iter_mut().zip(self.slots) {
            *slot = pad;
        }
        if pads.iter().all(Option::is_none) {
            return Err(ConfigError::NoDevices);
        }

        Ok(AcquisitionConfig {
            pads,
            serial_link: self.serial_link,
            refresh_hz: self.refresh_hz,
        })
    }
}
