//! Pin-level access to the header
//!
//! The driver never touches GPIO registers itself. Everything it needs from
//! the bank is expressed by [`PinBank`]: direction changes, single-pin reads
//! and writes, and one batch call that enables pull resistors for a mask of
//! pins.
//!
//! Levels are [`PinState`] from `embedded-hal`, so existing HAL pin types are
//! easy to wrap.

use core::fmt::Debug;

pub use embedded_hal::digital::PinState;

/// Pull resistor mode applied by [`PinBank::configure_pull`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Pull {
    /// No pull resistor
    Off,
    /// Pull towards ground
    Down,
    /// Pull towards the supply rail (buttons are wired active low)
    #[default]
    Up,
}

/// Trait for the GPIO bank the pads and the serial link are wired to
///
/// Pins are addressed by their bank number. Implementations are expected to
/// be cheap: [`read`](PinBank::read) and [`write`](PinBank::write) run
/// inside the bit-banged transfer, between microsecond delays.
pub trait PinBank {
    /// Error type for pin operations
    type Error: Debug;

    /// Configure `pin` as an input
    fn set_input(&mut self, pin: u8) -> Result<(), Self::Error>;

    /// Configure `pin` as a driven output
    fn set_output(&mut self, pin: u8) -> Result<(), Self::Error>;

    /// Read the current level of `pin`
    fn read(&mut self, pin: u8) -> Result<PinState, Self::Error>;

    /// Drive `pin` to `level`
    fn write(&mut self, pin: u8, level: PinState) -> Result<(), Self::Error>;

    /// Apply `pull` to every pin whose bit is set in `mask`
    ///
    /// Bit `n` of the mask selects pin `n`.
    fn configure_pull(&mut self, mask: u64, pull: Pull) -> Result<(), Self::Error>;
}

impl<T: PinBank + ?Sized> PinBank for &mut T {
    type Error = T::Error;

    fn set_input(&mut self, pin: u8) -> Result<(), Self::Error> {
        T::set_input(self, pin)
    }

    fn set_output(&mut self, pin: u8) -> Result<(), Self::Error> {
        T::set_output(self, pin)
    }

    fn read(&mut self, pin: u8) -> Result<PinState, Self::Error> {
        T::read(self, pin)
    }

    fn write(&mut self, pin: u8, level: PinState) -> Result<(), Self::Error> {
        T::write(self, pin, level)
    }

    fn configure_pull(&mut self, mask: u64, pull: Pull) -> Result<(), Self::Error> {
        T::configure_pull(self, mask, pull)
    }
}

/// Build the pull-resistor mask for a set of optional pins
///
/// Unused slots contribute nothing.
pub fn pull_mask<'a>(pins: impl IntoIterator<Item = &'a Option<u8>>) -> u64 {
    pins.into_iter()
        .flatten()
        .fold(0u64, |mask, &pin| mask | (1u64 << pin))
}
