//! Busy-wait delay for the bit-banged link
//!
//! The serial link timing must not be stretched by the host scheduler, so
//! this delay spins on a monotonic clock instead of sleeping.

use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;

/// [`DelayNs`] implementation that spins on [`Instant`]
#[derive(Clone, Copy, Debug, Default)]
pub struct SpinDelay;

impl SpinDelay {
    /// Create a delay; it carries no state
    pub fn new() -> Self {
        Self
    }
}

impl DelayNs for SpinDelay {
    fn delay_ns(&mut self, ns: u32) {
        let deadline = Instant::now() + Duration::from_nanos(u64::from(ns));
        while Instant::now() < deadline {
            core::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spins_at_least_the_requested_time() {
        let mut delay = SpinDelay::new();
        let start = Instant::now();
        delay.delay_us(200);
        assert!(start.elapsed() >= Duration::from_micros(200));
    }
}
