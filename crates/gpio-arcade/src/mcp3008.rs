//! MCP3008 analog reads
//!
//! Each channel is read with one 3-byte frame: a start bit, the single-ended
//! flag with the channel number, and a padding byte while the 10-bit result
//! is clocked back.
//!
//! ```text
//! tx: 0000_0001  1ccc_0000  0000_0000
//! rx: ????_????  ????_?0BB  BBBB_BBBB   (B = result, MSB first)
//! ```

use embedded_hal::spi::SpiDevice;

use crate::sample::AnalogSample;

/// Full-scale value of a 10-bit conversion
pub const FULL_SCALE: u16 = 1023;

/// Converter channels used by the sticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Right stick, vertical
    Ry = 0,
    /// Right stick, horizontal
    Rx = 1,
    /// Left stick, vertical
    Y = 2,
    /// Left stick, horizontal
    X = 3,
}

impl Channel {
    /// All stick channels in read order
    pub const ALL: [Channel; 4] = [Channel::Ry, Channel::Rx, Channel::Y, Channel::X];

    /// Vertical axes are wired upside down and get inverted
    pub fn is_vertical(self) -> bool {
        matches!(self, Channel::Ry | Channel::Y)
    }

    /// Request frame selecting this channel in single-ended mode
    pub fn request(self) -> [u8; 3] {
        [0x01, 0x80 | ((self as u8) << 4), 0x00]
    }
}

/// Extract the 10-bit result from a response frame
pub fn decode(response: &[u8; 3]) -> u16 {
    ((u16::from(response[1]) << 8) | u16::from(response[2])) & 0x3FF
}

/// MCP3008 on an SPI device
pub struct Mcp3008<SPI> {
    spi: SPI,
}

impl<SPI> Mcp3008<SPI>
where
    SPI: SpiDevice,
{
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    /// Release the SPI device
    pub fn release(self) -> SPI {
        self.spi
    }

    /// Raw 10-bit conversion of `channel`
    pub fn read_raw(&mut self, channel: Channel) -> Result<u16, SPI::Error> {
        let mut response = [0u8; 3];
        self.spi.transfer(&mut response, &channel.request())?;
        Ok(decode(&response))
    }

    /// Conversion of `channel` with the orientation fix-up applied
    pub fn read(&mut self, channel: Channel) -> Result<u16, SPI::Error> {
        let raw = self.read_raw(channel)?;
        Ok(if channel.is_vertical() {
            FULL_SCALE - raw
        } else {
            raw
        })
    }

    /// Read both sticks
    pub fn read_axes(&mut self) -> Result<AnalogSample, SPI::Error> {
        Ok(AnalogSample {
            ry: self.read(Channel::Ry)?,
            rx: self.read(Channel::Rx)?,
            y: self.read(Channel::Y)?,
            x: self.read(Channel::X)?,
        })
    }
}
