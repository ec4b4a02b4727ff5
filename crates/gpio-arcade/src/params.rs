//! Module-parameter style configuration front end
//!
//! `key=value` tokens, as passed on a command line:
//!
//! ```text
//! map=1,2                                  pad types per slot (0 = empty)
//! gpio=4,17,27,22,10,9,25,24,23,18,15,14   pins of a custom (type 3) pad
//! spi=16,26,20,21                          converter link: miso,mosi,clk,cs
//! refresh_hz=100                           sampling passes per second
//! ```

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::config::{Builder, PadConfig, PadType, SerialLinkConfig};
use crate::error::ConfigError;

/// Parse parameters into a [`Builder`]
///
/// # Errors
///
/// - [`ConfigError::NoDevices`] if `map` is missing or empty
/// - [`ConfigError::MissingCustomPins`] if a custom pad has no `gpio`
/// - [`ConfigError::UnknownParameter`] / [`ConfigError::InvalidValue`] for
///   malformed tokens
/// - any error of [`PadType::from_code`], [`PadConfig::custom`] and
///   [`SerialLinkConfig::from_numbers`]
///
/// # Example
///
/// ```
/// use gpio_arcade::params::parse_params;
///
/// let config = parse_params(["map=1,2", "spi=9,10,11,8"])
///     .and_then(|builder| builder.build())
///     .unwrap();
/// assert_eq!(config.serial_link.clock, 11);
/// ```
pub fn parse_params<'a>(params: impl IntoIterator<Item = &'a str>) -> Result<Builder, ConfigError> {
    let mut map: Vec<i32> = Vec::new();
    let mut gpio: Option<Vec<i32>> = None;
    let mut spi: Option<Vec<i32>> = None;
    let mut refresh_hz: Option<u32> = None;

    for token in params {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| ConfigError::UnknownParameter(token.to_string()))?;

        match key {
            "map" => map = parse_list(key, value)?,
            "gpio" => gpio = Some(parse_list(key, value)?),
            "spi" => spi = Some(parse_list(key, value)?),
            "refresh_hz" => {
                refresh_hz = Some(value.parse().map_err(|_| invalid(key, value))?);
            }
            other => return Err(ConfigError::UnknownParameter(other.to_string())),
        }
    }

    if map.is_empty() {
        return Err(ConfigError::NoDevices);
    }

    let mut builder = Builder::new();
    for code in map {
        builder = match PadType::from_code(code)? {
            None => builder.empty_slot(),
            Some(PadType::GpioCustom) => {
                let pins = gpio.as_deref().ok_or(ConfigError::MissingCustomPins)?;
                builder.pad(PadConfig::custom(pins)?)
            }
            Some(fixed) => builder.pad(PadConfig::fixed(fixed)?),
        };
    }

    if let Some(lines) = spi {
        let lines: [i32; 4] = lines
            .as_slice()
            .try_into()
            .map_err(|_| ConfigError::SerialLinkLength(lines.len()))?;
        builder = builder.serial_link(SerialLinkConfig::from_numbers(lines)?);
    }

    if let Some(hz) = refresh_hz {
        builder = builder.refresh_hz(hz);
    }

    Ok(builder)
}

fn parse_list(key: &str, value: &str) -> Result<Vec<i32>, ConfigError> {
    value
        .split(',')
        .map(|item| item.trim().parse::<i32>().map_err(|_| invalid(key, value)))
        .collect()
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: String::from(key),
        value: String::from(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GPIO_PIN_MAP, SerialLinkConfig};

    fn build(params: &[&str]) -> Result<crate::AcquisitionConfig, ConfigError> {
        parse_params(params.iter().copied()).and_then(Builder::build)
    }

    #[test]
    fn two_fixed_pads() {
        let config = build(&["map=1,2"]).unwrap();
        let types: Vec<PadType> = config.configured().map(|(_, pad)| pad.pad_type()).collect();
        assert_eq!(types, vec![PadType::Gpio, PadType::GpioBPlus]);
        assert_eq!(config.serial_link, SerialLinkConfig::DEFAULT);
    }

    #[test]
    fn zero_leaves_slot_empty() {
        let config = build(&["map=0,2"]).unwrap();
        assert!(config.pads[0].is_none());
        assert_eq!(
            config.pads[1].as_ref().map(|pad| pad.pad_type()),
            Some(PadType::GpioBPlus)
        );
    }

    #[test]
    fn custom_pad_uses_gpio_list() {
        let config = build(&["map=3", "gpio=4,17,27,22,10,9,25,24,23,18,15,14"]).unwrap();
        let pad = config.pads[0].as_ref().unwrap();
        assert_eq!(pad, &PadConfig::custom(&GPIO_PIN_MAP).unwrap());
    }

    #[test]
    fn custom_pad_without_gpio_is_rejected() {
        assert_eq!(build(&["map=3"]), Err(ConfigError::MissingCustomPins));
    }

    #[test]
    fn custom_pad_with_short_gpio_is_rejected() {
        assert_eq!(
            build(&["map=3", "gpio=4,17,27,22,10,9,25,24,23,18,15"]),
            Err(ConfigError::PinMapLength {
                expected: 12,
                found: 11
            })
        );
    }

    #[test]
    fn spi_override_needs_four_lines() {
        let config = build(&["map=1", "spi=5,6,13,19"]).unwrap();
        assert_eq!(config.serial_link.lines(), [5, 6, 13, 19]);

        assert_eq!(
            build(&["map=1", "spi=5,6,13"]),
            Err(ConfigError::SerialLinkLength(3))
        );
    }

    #[test]
    fn missing_map_means_no_devices() {
        assert_eq!(build(&[]), Err(ConfigError::NoDevices));
        assert_eq!(build(&["map=0"]), Err(ConfigError::NoDevices));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert_eq!(
            build(&["map=1", "verbose"]),
            Err(ConfigError::UnknownParameter("verbose".into()))
        );
        assert_eq!(
            build(&["map=1", "speed=3"]),
            Err(ConfigError::UnknownParameter("speed".into()))
        );
        assert_eq!(
            build(&["map=one"]),
            Err(ConfigError::InvalidValue {
                key: "map".into(),
                value: "one".into()
            })
        );
        assert_eq!(build(&["map=9"]), Err(ConfigError::UnknownPadType(9)));
    }

    #[test]
    fn refresh_rate_is_validated_by_builder() {
        assert_eq!(build(&["map=1", "refresh_hz=50"]).unwrap().refresh_hz, 50);
        assert_eq!(
            build(&["map=1", "refresh_hz=0"]),
            Err(ConfigError::InvalidRefreshRate(0))
        );
    }
}
