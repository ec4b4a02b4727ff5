//! Host-side scenario harness for scripted pad sessions.

use std::thread;
use std::time::{Duration, Instant};

use gpio_arcade::mock::{Batch, MockError, MockPins, NoDelay, RecordingProvider, SinkLog};
use gpio_arcade::params::parse_params;
use gpio_arcade::{AcquisitionConfig, AcquisitionSet, PinMap, SetupError, TickStats};

pub type MockSet = AcquisitionSet<MockPins, NoDelay, RecordingProvider>;

/// Couples an acquisition set with its mock pins and recording provider.
pub struct ScenarioHarness {
    set: MockSet,
    pins: MockPins,
    provider: RecordingProvider,
    maps: Vec<(usize, PinMap)>,
}

impl ScenarioHarness {
    /// Bring up a set with a converter attached on the configured link.
    pub fn new(config: AcquisitionConfig) -> Result<Self, SetupError<MockError, MockError>> {
        Self::with_provider(config, RecordingProvider::new())
    }

    /// Bring up a set with a caller-prepared provider, e.g. one with injected failures.
    pub fn with_provider(
        config: AcquisitionConfig,
        provider: RecordingProvider,
    ) -> Result<Self, SetupError<MockError, MockError>> {
        let pins = MockPins::new();
        pins.attach_adc(config.serial_link);
        let maps = config
            .configured()
            .map(|(slot, pad)| (slot, *pad.pin_map()))
            .collect();
        let set = AcquisitionSet::create(config, pins.clone(), NoDelay, provider.clone())?;
        Ok(Self {
            set,
            pins,
            provider,
            maps,
        })
    }

    /// Build from module-style parameters, panicking on invalid input.
    pub fn from_params(params: &[&str]) -> Self {
        let config = parse_params(params.iter().copied())
            .and_then(|builder| builder.build())
            .expect("scenario parameters should be valid");
        Self::new(config).expect("scenario setup should succeed")
    }

    fn pin(&self, slot: usize, line: usize) -> u8 {
        let (_, map) = self
            .maps
            .iter()
            .find(|(s, _)| *s == slot)
            .expect("slot should be configured");
        map.slots()[line].expect("line should be wired")
    }

    /// Ground digital line `line` (0..12) of the pad in `slot`.
    pub fn press(&self, slot: usize, line: usize) {
        self.pins.press(self.pin(slot, line));
    }

    /// Release digital line `line` of the pad in `slot`.
    pub fn release(&self, slot: usize, line: usize) {
        self.pins.release(self.pin(slot, line));
    }

    /// Set the raw converter value of a stick channel.
    pub fn set_stick(&self, channel: u8, raw: u16) {
        self.pins.set_adc_channel(channel, raw);
    }

    /// Run one pass on the calling thread.
    pub fn pass(&self) {
        self.set.poll_once().expect("idle set should accept a single pass");
    }

    /// Attach one consumer, wait for `passes` more timer passes, detach.
    pub fn run_passes(&self, passes: u64) -> TickStats {
        let start = self.set.stats().passes;
        self.set.attach().expect("attach should succeed");
        self.wait_for_passes(start + passes);
        self.set.detach();
        self.set.stats()
    }

    /// Block until the engine has completed `passes` in total.
    pub fn wait_for_passes(&self, passes: u64) {
        const TIMEOUT: Duration = Duration::from_secs(5);
        let deadline = Instant::now() + TIMEOUT;
        while self.set.stats().passes < passes {
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {} passes, saw {}",
                passes,
                self.set.stats().passes
            );
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Event log of the pad in `slot`.
    pub fn log(&self, slot: usize) -> SinkLog {
        self.provider.log(&format!("input{slot}"))
    }

    /// Most recent complete batch of the pad in `slot`.
    pub fn last_batch(&self, slot: usize) -> Batch {
        self.log(slot)
            .last_batch()
            .expect("pad should have flushed a batch")
    }

    pub fn set(&self) -> &MockSet {
        &self.set
    }

    pub fn pins(&self) -> &MockPins {
        &self.pins
    }

    pub fn provider(&self) -> &RecordingProvider {
        &self.provider
    }

    /// Tear the set down, returning the provider for final assertions.
    pub fn destroy(self) -> RecordingProvider {
        self.set.destroy();
        self.provider
    }
}
