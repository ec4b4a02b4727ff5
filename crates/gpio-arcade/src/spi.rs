//! Software SPI over four header pins
//!
//! No SPI controller is assumed: every clock edge is produced by a pin write,
//! separated by a fixed half-cycle delay. Mode 0 framing, MSB first:
//!
//! ```text
//! CS   ‾‾\________________________________/‾‾
//! MOSI    X  b7   X  b6   X ... X  b0   X
//! CLK  ______/‾‾\____/‾‾\__ ... ___/‾‾\______
//!               ^ MISO sampled right after the rising edge
//! ```
//!
//! The link has no checksum. A glitch shows up as a wrong bit in the response
//! and is not reported; only pin access failures surface as errors.

use core::fmt::Debug;

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::{self, ErrorKind, ErrorType, Operation, SpiDevice};

use crate::config::SerialLinkConfig;
use crate::pins::{PinBank, PinState};

/// Half-cycle delay of the software clock, in microseconds
pub const HALF_CYCLE_US: u32 = 100;

/// Settle time after the warm-up clock pulse, in microseconds
const WARM_UP_SETTLE_US: u32 = 1000;

/// Errors raised by the bit-banged link
///
/// Only the pin bank can fail; the wire protocol itself has no error path.
#[derive(Debug)]
pub enum BitBangError<E> {
    /// A pin read or write failed
    Pin(E),
}

impl<E: Debug> core::fmt::Display for BitBangError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BitBangError::Pin(e) => write!(f, "Pin error: {e:?}"),
        }
    }
}

impl<E: Debug> core::error::Error for BitBangError<E> {}

impl<E: Debug> spi::Error for BitBangError<E> {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Bit-banged SPI device on four pins of a [`PinBank`]
///
/// Borrows the bank and the delay for the duration of a sampling pass; one
/// [`SpiDevice::transaction`] is one chip-select assertion.
pub struct BitBangSpi<'a, P, D> {
    pins: &'a mut P,
    delay: &'a mut D,
    lines: SerialLinkConfig,
}

impl<'a, P, D> BitBangSpi<'a, P, D>
where
    P: PinBank,
    D: DelayNs,
{
    pub fn new(pins: &'a mut P, delay: &'a mut D, lines: SerialLinkConfig) -> Self {
        Self { pins, delay, lines }
    }

    /// Configure the four lines and settle them with one clock pulse
    ///
    /// Data-in becomes an input; clock, data-out and chip-select become
    /// outputs with clock and data-out low and chip-select idle high.
    pub fn init(&mut self) -> Result<(), BitBangError<P::Error>> {
        let SerialLinkConfig {
            data_in,
            data_out,
            clock,
            select,
        } = self.lines;

        self.pins.set_input(data_in).map_err(BitBangError::Pin)?;
        self.pins.set_output(data_out).map_err(BitBangError::Pin)?;
        self.pins.set_output(clock).map_err(BitBangError::Pin)?;
        self.pins.set_output(select).map_err(BitBangError::Pin)?;

        self.set(clock, PinState::Low)?;
        self.set(data_out, PinState::Low)?;
        self.set(select, PinState::High)?;

        // warm-up toggle
        self.set(clock, PinState::High)?;
        self.set(clock, PinState::Low)?;
        self.delay.delay_us(WARM_UP_SETTLE_US);

        Ok(())
    }

    fn set(&mut self, pin: u8, level: PinState) -> Result<(), BitBangError<P::Error>> {
        self.pins.write(pin, level).map_err(BitBangError::Pin)
    }

    /// Clock one byte out and one byte in, MSB first
    fn shift_byte(&mut self, tx: u8) -> Result<u8, BitBangError<P::Error>> {
        let SerialLinkConfig {
            data_in,
            data_out,
            clock,
            ..
        } = self.lines;

        self.delay.delay_us(HALF_CYCLE_US);

        let mut rx = 0u8;
        for bit in (0..8).rev() {
            self.set(data_out, PinState::from((tx >> bit) & 1 == 1))?;
            self.delay.delay_us(HALF_CYCLE_US);

            self.set(clock, PinState::High)?;
            if self.pins.read(data_in).map_err(BitBangError::Pin)? == PinState::High {
                rx |= 1 << bit;
            }
            self.delay.delay_us(HALF_CYCLE_US);

            self.set(clock, PinState::Low)?;
        }

        Ok(rx)
    }

    /// Run `ops` between chip-select assert and deassert
    fn run(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), BitBangError<P::Error>> {
        for op in operations {
            match op {
                Operation::Read(read) => {
                    for byte in read.iter_mut() {
                        *byte = self.shift_byte(0x00)?;
                    }
                }
                Operation::Write(write) => {
                    for &byte in write.iter() {
                        self.shift_byte(byte)?;
                    }
                }
                Operation::Transfer(read, write) => {
                    let len = read.len().max(write.len());
                    for i in 0..len {
                        let rx = self.shift_byte(write.get(i).copied().unwrap_or(0x00))?;
                        if let Some(slot) = read.get_mut(i) {
                            *slot = rx;
                        }
                    }
                }
                Operation::TransferInPlace(words) => {
                    for byte in words.iter_mut() {
                        *byte = self.shift_byte(*byte)?;
                    }
                }
                Operation::DelayNs(ns) => self.delay.delay_ns(*ns),
                #[allow(unreachable_patterns)]
                _ => {}
            }
        }
        Ok(())
    }
}

impl<P, D> ErrorType for BitBangSpi<'_, P, D>
where
    P: PinBank,
{
    type Error = BitBangError<P::Error>;
}

impl<P, D> SpiDevice for BitBangSpi<'_, P, D>
where
    P: PinBank,
    D: DelayNs,
{
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        let select = self.lines.select;
        self.set(select, PinState::Low)?;
        let result = self.run(operations);
        // release the chip even when a pin failed mid-frame
        let released = self.set(select, PinState::High);
        result.and(released)
    }
}
