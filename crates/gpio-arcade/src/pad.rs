//! One pad: its wiring, last sample and event sink

use alloc::format;

use embedded_hal::delay::DelayNs;

use crate::config::{PadConfig, SerialLinkConfig};
use crate::error::SetupError;
use crate::input::{BUS_PARPORT, BUTTON_TABLE, DPAD_BUTTONS, DeviceIdentity, EventSink, PAD_AXES, SinkProvider};
use crate::mcp3008::Mcp3008;
use crate::pins::{PinBank, Pull};
use crate::report::normalize_and_flush;
use crate::sample::{DigitalSample, RawSample, read_buttons};
use crate::spi::{BitBangError, BitBangSpi};

const VENDOR_ID: u16 = 0x0001;
const DEVICE_VERSION: u16 = 0x0100;

/// A configured pad and its registered sink
pub struct Pad<K> {
    slot: usize,
    config: PadConfig,
    raw: RawSample,
    sink: K,
}

impl<K> Pad<K> {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn config(&self) -> &PadConfig {
        &self.config
    }

    /// Sample taken by the most recent pass
    pub fn raw(&self) -> &RawSample {
        &self.raw
    }

    pub(crate) fn into_sink(self) -> K {
        self.sink
    }
}

impl<K: EventSink> Pad<K> {
    /// Read the digital lines, then the converter, into the raw sample
    ///
    /// On a pin fault the previous sample is kept untouched.
    pub fn sample<P, D>(
        &mut self,
        pins: &mut P,
        delay: &mut D,
        lines: SerialLinkConfig,
    ) -> Result<(), P::Error>
    where
        P: PinBank,
        D: DelayNs,
    {
        let digital = DigitalSample::from_lines(read_buttons(pins, self.config.pin_map())?);
        let analog = Mcp3008::new(BitBangSpi::new(pins, delay, lines))
            .read_axes()
            .map_err(|BitBangError::Pin(e)| e)?;

        self.raw = RawSample { digital, analog };
        Ok(())
    }

    /// Flush the current raw sample as one event batch
    pub fn flush(&mut self) {
        normalize_and_flush(&self.raw, &mut self.sink);
    }
}

/// Identity announced for the pad in `slot`
pub fn identity(slot: usize, config: &PadConfig) -> DeviceIdentity {
    let pad_type = config.pad_type();
    DeviceIdentity {
        name: pad_type.device_name(),
        phys: format!("input{slot}"),
        bustype: BUS_PARPORT,
        vendor: VENDOR_ID,
        product: pad_type.code(),
        version: DEVICE_VERSION,
        buttons: &BUTTON_TABLE,
        dpad: &DPAD_BUTTONS,
        axes: &PAD_AXES,
    }
}

/// Allocate the sink, configure the pad's pins and register the sink
///
/// A sink that was allocated but not registered is released on failure.
pub(crate) fn setup_pad<P, S>(
    slot: usize,
    config: &PadConfig,
    pins: &mut P,
    provider: &mut S,
    lines: SerialLinkConfig,
) -> Result<Pad<S::Sink>, SetupError<P::Error, S::Error>>
where
    P: PinBank,
    S: SinkProvider,
{
    let identity = identity(slot, config);
    let mut sink = provider
        .allocate(&identity)
        .map_err(SetupError::ResourceExhausted)?;

    if let Err(err) = configure_pins(config, pins, lines) {
        provider.release(sink);
        return Err(SetupError::Pin(err));
    }

    if let Err(err) = provider.register(&mut sink) {
        provider.release(sink);
        return Err(SetupError::ResourceExhausted(err));
    }

    log::info!(
        "{} configured as {:?} on {} (pins {:?})",
        identity.name,
        config.pad_type(),
        identity.phys,
        config.pin_map().slots()
    );

    Ok(Pad {
        slot,
        config: config.clone(),
        raw: RawSample::default(),
        sink,
    })
}

fn configure_pins<P: PinBank>(
    config: &PadConfig,
    pins: &mut P,
    lines: SerialLinkConfig,
) -> Result<(), P::Error> {
    let map = config.pin_map();
    for pin in map.used() {
        if lines.lines().contains(&pin) {
            log::warn!("Pin {pin} is shared with the converter link ({lines})");
        }
        pins.set_input(pin)?;
    }
    pins.configure_pull(map.pull_mask(), Pull::Up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GPIO_PIN_MAP, PadType};
    use crate::mock::{MockPins, NoDelay, RecordingProvider};

    #[test]
    fn identity_follows_pad_type() {
        let gpio = identity(0, &PadConfig::fixed(PadType::Gpio).unwrap());
        assert_eq!(gpio.name, "GPIO Controller 1");
        assert_eq!(gpio.phys, "input0");
        assert_eq!(gpio.product, 1);
        assert_eq!(gpio.bustype, 0x07);
        assert_eq!(gpio.version, 0x0100);

        let bplus = identity(1, &PadConfig::fixed(PadType::GpioBPlus).unwrap());
        assert_eq!(bplus.name, "GPIO Controller 2");
        assert_eq!(bplus.phys, "input1");
        assert_eq!(bplus.product, 2);

        let custom = identity(0, &PadConfig::custom(&GPIO_PIN_MAP).unwrap());
        assert_eq!(custom.name, "GPIO Controller 1");
        assert_eq!(custom.product, 3);
    }

    #[test]
    fn setup_configures_used_pins_with_pull_ups() {
        let mut pins = MockPins::new();
        let mut provider = RecordingProvider::new();
        let mut numbers = GPIO_PIN_MAP;
        numbers[3] = -1;
        let config = PadConfig::custom(&numbers).unwrap();

        let pad = setup_pad(0, &config, &mut pins, &mut provider, SerialLinkConfig::DEFAULT)
            .unwrap();

        assert_eq!(pad.slot(), 0);
        assert!(pins.is_input(4));
        assert!(!pins.is_input(22));
        assert_eq!(
            pins.pull_calls(),
            vec![(config.pin_map().pull_mask(), Pull::Up)]
        );
        assert_eq!(pins.pull_calls()[0].0 & (1 << 22), 0);
        assert_eq!(provider.registered(), vec!["input0".to_string()]);
    }

    #[test]
    fn failed_registration_releases_the_sink() {
        let mut pins = MockPins::new();
        let mut provider = RecordingProvider::new();
        provider.fail_register_of("input0");

        let result = setup_pad(
            0,
            &PadConfig::fixed(PadType::Gpio).unwrap(),
            &mut pins,
            &mut provider,
            SerialLinkConfig::DEFAULT,
        );

        assert!(matches!(result, Err(SetupError::ResourceExhausted(_))));
        assert!(provider.registered().is_empty());
        assert_eq!(provider.released(), vec!["input0".to_string()]);
    }

    #[test]
    fn failed_pin_setup_releases_the_sink() {
        let mut pins = MockPins::new();
        pins.fail_direction_of(17);
        let mut provider = RecordingProvider::new();

        let result = setup_pad(
            0,
            &PadConfig::fixed(PadType::Gpio).unwrap(),
            &mut pins,
            &mut provider,
            SerialLinkConfig::DEFAULT,
        );

        assert!(matches!(result, Err(SetupError::Pin(_))));
        assert_eq!(provider.released(), vec!["input0".to_string()]);
    }

    #[test]
    fn sample_then_flush_reports_pressed_up() {
        let mut pins = MockPins::new();
        pins.attach_adc(SerialLinkConfig::DEFAULT);
        let mut provider = RecordingProvider::new();
        let config = PadConfig::custom(&GPIO_PIN_MAP).unwrap();
        let mut pad =
            setup_pad(0, &config, &mut pins, &mut provider, SerialLinkConfig::DEFAULT).unwrap();
        BitBangSpi::new(&mut pins, &mut NoDelay, SerialLinkConfig::DEFAULT)
            .init()
            .unwrap();

        pins.press(4);
        pad.sample(&mut pins, &mut NoDelay, SerialLinkConfig::DEFAULT)
            .unwrap();
        pad.flush();

        assert!(pad.raw().digital.up);
        assert!(!pad.raw().digital.down);
        let batch = provider.log("input0").last_batch().unwrap();
        assert_eq!(batch.axis(crate::Axis::Hat0Y), Some(-1));
        assert_eq!(batch.axis(crate::Axis::Hat0X), Some(0));
        assert!(BUTTON_TABLE.iter().all(|&b| batch.button(b) == Some(false)));
    }
}
