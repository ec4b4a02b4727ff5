//! Acquisition set: pad setup and the consumer reference count
//!
//! The first [`attach`](AcquisitionSet::attach) arms the sampling worker and
//! the last matching [`detach`](AcquisitionSet::detach) stops it, waiting for
//! the pass in flight. The count and the worker state change together under
//! one lock, so concurrent callers always observe either an idle set with no
//! consumers or an armed set with at least one.

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use embedded_hal::delay::DelayNs;

use crate::MAX_PADS;
use crate::config::AcquisitionConfig;
use crate::error::{ConfigError, Error, SetupError};
use crate::input::SinkProvider;
use crate::pad::{Pad, setup_pad};
use crate::pins::PinBank;
use crate::scheduler::{Engine, SharedStats, Tick, TickStats, Ticker};
use crate::spi::{BitBangError, BitBangSpi};

enum State<E> {
    Idle(E),
    Armed(Ticker<E>),
    /// A pass panicked; the pads went down with the worker
    Lost,
}

struct Lifecycle<E> {
    consumers: usize,
    state: State<E>,
}

impl<E: Tick> Lifecycle<E> {
    fn arm(&mut self, period: Duration) -> Result<(), Error> {
        match mem::replace(&mut self.state, State::Lost) {
            State::Idle(engine) => match Ticker::arm(engine, period) {
                Ok(ticker) => {
                    self.state = State::Armed(ticker);
                    log::debug!("Sampling armed, period {period:?}");
                    Ok(())
                }
                Err((engine, err)) => {
                    self.state = State::Idle(engine);
                    log::error!("Could not start the sampling thread: {err}");
                    Err(Error::Spawn(err))
                }
            },
            armed @ State::Armed(_) => {
                self.state = armed;
                Ok(())
            }
            State::Lost => Err(Error::EngineLost),
        }
    }

    fn disarm(&mut self) {
        match mem::replace(&mut self.state, State::Lost) {
            State::Armed(ticker) => match ticker.disarm() {
                Some(engine) => {
                    self.state = State::Idle(engine);
                    log::debug!("Sampling stopped");
                }
                None => log::error!("Sampling pass panicked, pads are lost"),
            },
            other => self.state = other,
        }
    }
}

/// Up to [`MAX_PADS`] pads sampled by one worker
///
/// `P` is the pin bank, `D` the delay used for the serial link timing and `S`
/// the provider of event sinks. All methods take `&self`; share the set
/// between consumers with an [`Arc`].
pub struct AcquisitionSet<P, D, S>
where
    S: SinkProvider,
{
    lifecycle: Mutex<Lifecycle<Engine<P, D, S::Sink>>>,
    provider: Mutex<S>,
    stats: Arc<SharedStats>,
    period: Duration,
    slots: Vec<usize>,
}

impl<P, D, S> AcquisitionSet<P, D, S>
where
    P: PinBank + Send + 'static,
    D: DelayNs + Send + 'static,
    S: SinkProvider,
    S::Sink: Send + 'static,
{
    /// Bring up every configured pad and the serial link
    ///
    /// Pads are set up in slot order: a sink is allocated, the pad's pins
    /// become pulled-up inputs and the sink is registered. The link lines are
    /// configured afterwards and keep their link directions even when a pad
    /// map names them. The returned set is idle with no consumers.
    ///
    /// # Errors
    ///
    /// - [`SetupError::Config`] if no pad is configured or the rate is invalid
    /// - [`SetupError::Pin`] if a pin cannot be configured
    /// - [`SetupError::ResourceExhausted`] if the provider fails
    ///
    /// On error every pad registered so far has been unregistered again.
    pub fn create(
        config: AcquisitionConfig,
        mut pins: P,
        mut delay: D,
        mut provider: S,
    ) -> Result<Self, SetupError<P::Error, S::Error>> {
        if config.configured().next().is_none() {
            return Err(ConfigError::NoDevices.into());
        }
        if config.refresh_hz == 0 || config.refresh_hz > 1000 {
            return Err(ConfigError::InvalidRefreshRate(config.refresh_hz).into());
        }

        let lines = config.serial_link;
        let mut pads: Vec<Pad<S::Sink>> = Vec::with_capacity(MAX_PADS);
        for (slot, pad_config) in config.configured() {
            match setup_pad(slot, pad_config, &mut pins, &mut provider, lines) {
                Ok(pad) => pads.push(pad),
                Err(err) => {
                    log::error!("Setup of pad {slot} failed: {err}");
                    for pad in pads.into_iter().rev() {
                        provider.unregister(pad.into_sink());
                    }
                    return Err(err);
                }
            }
        }

        // Pad maps may share the link lines, so the link directions go last.
        let link = BitBangSpi::new(&mut pins, &mut delay, lines).init();
        if let Err(BitBangError::Pin(err)) = link {
            log::error!("Converter link setup failed: {err:?}");
            for pad in pads.into_iter().rev() {
                provider.unregister(pad.into_sink());
            }
            return Err(SetupError::Pin(err));
        }
        log::info!("Converter link ready ({lines})");

        let slots = pads.iter().map(Pad::slot).collect();
        let stats = Arc::new(SharedStats::default());
        let engine = Engine::new(pins, delay, lines, pads, stats.clone());
        let period = Duration::from_micros(config.refresh_period_us());

        Ok(Self {
            lifecycle: Mutex::new(Lifecycle {
                consumers: 0,
                state: State::Idle(engine),
            }),
            provider: Mutex::new(provider),
            stats,
            period,
            slots,
        })
    }

    /// Lock the lifecycle, failing once if a caller panicked while holding it
    ///
    /// The poison is cleared so the next caller gets the lock again.
    fn lock_lifecycle(&self) -> Result<MutexGuard<'_, Lifecycle<Engine<P, D, S::Sink>>>, Error> {
        match self.lifecycle.lock() {
            Ok(lifecycle) => Ok(lifecycle),
            Err(poisoned) => {
                drop(poisoned);
                self.lifecycle.clear_poison();
                log::warn!("Lifecycle lock was poisoned by a panicking caller");
                Err(Error::Interrupted)
            }
        }
    }

    /// Register a consumer, arming the worker for the first one
    ///
    /// # Errors
    ///
    /// - [`Error::Interrupted`] if an earlier caller panicked while holding
    ///   the lock; nothing changed and a retry may succeed
    /// - [`Error::Spawn`] if the worker could not be started; nothing changed
    /// - [`Error::EngineLost`] if an earlier pass panicked on the worker
    pub fn attach(&self) -> Result<(), Error> {
        let mut lifecycle = self.lock_lifecycle()?;
        if lifecycle.consumers == 0 {
            lifecycle.arm(self.period)?;
        }
        lifecycle.consumers += 1;
        Ok(())
    }

    /// Unregister a consumer, stopping the worker after the last one
    ///
    /// Returns once the pass in flight, if any, has completed. A detach
    /// without a matching attach is ignored.
    pub fn detach(&self) {
        let mut lifecycle = self
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match lifecycle.consumers {
            0 => log::warn!("Detach without a matching attach ignored"),
            1 => {
                lifecycle.consumers = 0;
                lifecycle.disarm();
            }
            _ => lifecycle.consumers -= 1,
        }
    }

    /// Run one sampling pass on the caller's thread
    ///
    /// # Errors
    ///
    /// - [`Error::Busy`] while consumers keep the worker armed
    /// - [`Error::Interrupted`] if an earlier caller panicked while holding
    ///   the lock; a retry may succeed
    /// - [`Error::EngineLost`] if an earlier pass panicked on the worker
    pub fn poll_once(&self) -> Result<(), Error> {
        let mut lifecycle = self.lock_lifecycle()?;
        match &mut lifecycle.state {
            State::Idle(engine) => {
                engine.pass();
                Ok(())
            }
            State::Armed(_) => Err(Error::Busy),
            State::Lost => Err(Error::EngineLost),
        }
    }

    /// Number of attached consumers
    pub fn consumers(&self) -> usize {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .consumers
    }

    /// Whether the sampling worker is running
    pub fn is_armed(&self) -> bool {
        matches!(
            self.lifecycle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .state,
            State::Armed(_)
        )
    }

    /// Counters since creation
    pub fn stats(&self) -> TickStats {
        self.stats.snapshot()
    }

    /// Slots holding a registered pad
    pub fn slots(&self) -> &[usize] {
        &self.slots
    }

    /// Time between the end of one pass and the start of the next
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stop sampling and unregister every pad
    ///
    /// Consumers still attached are dropped with the set.
    pub fn destroy(self) {
        let Self {
            lifecycle,
            provider,
            ..
        } = self;
        let mut lifecycle = lifecycle.into_inner().unwrap_or_else(PoisonError::into_inner);
        if lifecycle.consumers > 0 {
            log::warn!("Destroyed with {} consumers attached", lifecycle.consumers);
        }
        lifecycle.disarm();

        let mut provider = provider.into_inner().unwrap_or_else(PoisonError::into_inner);
        match lifecycle.state {
            State::Idle(engine) => {
                for pad in engine.into_pads() {
                    log::info!("Pad {} unregistered", pad.slot());
                    provider.unregister(pad.into_sink());
                }
            }
            State::Armed(_) | State::Lost => log::error!("Pads lost, nothing to unregister"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Builder, GPIO_PIN_MAP, PadConfig, PadType, SerialLinkConfig};
    use crate::input::{AbsParams, Axis, Button, DeviceIdentity, EventSink};
    use crate::mock::{MockError, MockPins, NoDelay, RecordingProvider};
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Instant;

    type MockSet = AcquisitionSet<MockPins, NoDelay, RecordingProvider>;

    fn two_pads() -> AcquisitionConfig {
        Builder::new()
            .pad(PadConfig::fixed(PadType::Gpio).unwrap())
            .pad(PadConfig::fixed(PadType::GpioBPlus).unwrap())
            .refresh_hz(1000)
            .build()
            .unwrap()
    }

    fn create(config: AcquisitionConfig) -> (MockSet, MockPins, RecordingProvider) {
        let pins = MockPins::new();
        pins.attach_adc(config.serial_link);
        let provider = RecordingProvider::new();
        let set = AcquisitionSet::create(config, pins.clone(), NoDelay, provider.clone()).unwrap();
        (set, pins, provider)
    }

    fn wait_for_passes(set: &MockSet, passes: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while set.stats().passes < passes {
            assert!(Instant::now() < deadline, "no sampling passes");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn create_registers_every_pad_idle() {
        let (set, pins, provider) = create(two_pads());

        assert_eq!(provider.registered(), vec!["input0", "input1"]);
        assert_eq!(set.slots(), &[0, 1]);
        assert_eq!(set.consumers(), 0);
        assert!(!set.is_armed());
        assert_eq!(set.period(), Duration::from_millis(1));
        // link initialized once
        assert_eq!(pins.rising_edges(SerialLinkConfig::DEFAULT.clock), 1);
        assert!(provider.log("input0").events().is_empty());
    }

    #[test]
    fn link_lines_keep_their_directions_next_to_a_bplus_pad() {
        let (set, pins, provider) = create(two_pads());
        let lines = SerialLinkConfig::DEFAULT;

        assert!(pins.is_input(lines.data_in));
        assert!(pins.is_output(lines.data_out));
        assert!(pins.is_output(lines.clock));
        assert!(pins.is_output(lines.select));

        pins.set_adc_channel(3, 300);
        set.poll_once().unwrap();
        assert_eq!(set.stats().pin_faults, 0);
        let batch = provider.log("input0").last_batch().unwrap();
        assert_eq!(batch.axis(Axis::X), Some(300));
        assert_eq!(pins.adc_frames().len(), 8);
    }

    #[test]
    fn failed_link_setup_unregisters_every_pad() {
        let pins = MockPins::new();
        pins.fail_direction_of(SerialLinkConfig::DEFAULT.clock);
        let provider = RecordingProvider::new();
        let config = Builder::new()
            .pad(PadConfig::fixed(PadType::Gpio).unwrap())
            .build()
            .unwrap();

        let result = AcquisitionSet::create(config, pins, NoDelay, provider.clone());

        assert!(matches!(
            result,
            Err(SetupError::Pin(MockError::Direction(20)))
        ));
        assert_eq!(provider.unregistered(), vec!["input0"]);
        assert!(provider.active().is_empty());
    }

    #[test]
    fn attach_arms_and_last_detach_stops() {
        let (set, _pins, provider) = create(two_pads());

        set.attach().unwrap();
        set.attach().unwrap();
        assert!(set.is_armed());
        wait_for_passes(&set, 2);

        set.detach();
        assert!(set.is_armed());
        assert_eq!(set.consumers(), 1);

        set.detach();
        assert!(!set.is_armed());
        let stopped_at = set.stats().passes;
        let batches = provider.log("input0").batches().len();
        thread::sleep(Duration::from_millis(10));
        assert_eq!(set.stats().passes, stopped_at);
        assert_eq!(provider.log("input0").batches().len(), batches);
    }

    #[test]
    fn unbalanced_detach_is_ignored() {
        let (set, _pins, _provider) = create(two_pads());
        set.detach();
        assert_eq!(set.consumers(), 0);
        set.attach().unwrap();
        assert!(set.is_armed());
        set.detach();
        assert!(!set.is_armed());
    }

    #[test]
    fn every_pad_flushes_once_per_pass() {
        let (set, pins, provider) = create(two_pads());
        pins.press(27); // pad 0 left
        pins.press(19); // pad 1 start

        set.poll_once().unwrap();
        set.poll_once().unwrap();

        let pad0 = provider.log("input0").batches();
        let pad1 = provider.log("input1").batches();
        assert_eq!(pad0.len(), 2);
        assert_eq!(pad1.len(), 2);
        assert_eq!(pad0[1].events.len(), 18);
        assert_eq!(pad0[1].axis(Axis::Hat0X), Some(-1));
        assert_eq!(pad0[1].button(Button::Start), Some(false));
        assert_eq!(pad1[1].axis(Axis::Hat0X), Some(0));
        assert_eq!(pad1[1].button(Button::Start), Some(true));
        assert_eq!(set.stats().passes, 2);
    }

    #[test]
    fn poll_once_is_refused_while_armed() {
        let (set, _pins, _provider) = create(two_pads());
        set.attach().unwrap();
        assert!(matches!(set.poll_once(), Err(Error::Busy)));
        set.detach();
        assert!(set.poll_once().is_ok());
    }

    #[test]
    fn custom_map_reports_up_and_left_stick() {
        let config = Builder::new()
            .pad(PadConfig::custom(&GPIO_PIN_MAP).unwrap())
            .build()
            .unwrap();
        let (set, pins, provider) = create(config);
        pins.press(4);
        pins.set_adc_channel(3, 767);

        set.poll_once().unwrap();

        let batch = provider.log("input0").last_batch().unwrap();
        assert_eq!(batch.axis(Axis::Hat0Y), Some(-1));
        assert_eq!(batch.axis(Axis::Hat0X), Some(0));
        assert_eq!(batch.button(Button::DpadUp), Some(true));
        assert_eq!(batch.axis(Axis::X), Some(767));
        assert!(
            crate::BUTTON_TABLE
                .iter()
                .all(|&button| batch.button(button) == Some(false))
        );
    }

    #[test]
    fn failed_second_pad_rolls_back_the_first() {
        let pins = MockPins::new();
        let provider = RecordingProvider::new();
        provider.fail_register_of("input1");

        let result = AcquisitionSet::create(two_pads(), pins, NoDelay, provider.clone());

        assert!(matches!(result, Err(SetupError::ResourceExhausted(_))));
        assert_eq!(provider.registered(), vec!["input0"]);
        assert_eq!(provider.unregistered(), vec!["input0"]);
        assert_eq!(provider.released(), vec!["input1"]);
        assert!(provider.active().is_empty());
    }

    #[test]
    fn failed_allocation_leaves_nothing_registered() {
        let pins = MockPins::new();
        let provider = RecordingProvider::new();
        provider.fail_allocate_of("input1");

        let result = AcquisitionSet::create(two_pads(), pins, NoDelay, provider.clone());

        assert!(matches!(result, Err(SetupError::ResourceExhausted(_))));
        assert!(provider.active().is_empty());
        assert!(provider.released().is_empty());
    }

    #[test]
    fn invalid_config_allocates_nothing() {
        let mut config = two_pads();
        config.pads = [None, None];
        let provider = RecordingProvider::new();

        let result = AcquisitionSet::create(config, MockPins::new(), NoDelay, provider.clone());

        assert!(matches!(
            result,
            Err(SetupError::Config(ConfigError::NoDevices))
        ));
        assert!(provider.identities().is_empty());
    }

    #[test]
    fn pin_fault_skips_the_pad_for_that_pass() {
        let (set, pins, provider) = create(two_pads());
        pins.fail_reads_of(17); // pad 0 down

        set.poll_once().unwrap();
        assert!(provider.log("input0").batches().is_empty());
        assert_eq!(provider.log("input1").batches().len(), 1);
        assert_eq!(
            set.stats(),
            TickStats {
                passes: 1,
                pin_faults: 1
            }
        );

        pins.heal();
        set.poll_once().unwrap();
        assert_eq!(provider.log("input0").batches().len(), 1);
    }

    #[test]
    fn destroy_unregisters_every_pad() {
        let (set, _pins, provider) = create(two_pads());
        set.attach().unwrap();
        wait_for_passes(&set, 1);
        set.detach();

        set.destroy();
        assert_eq!(provider.unregistered(), vec!["input0", "input1"]);
        assert!(provider.active().is_empty());
    }

    #[test]
    fn destroy_stops_a_running_worker() {
        let (set, _pins, provider) = create(two_pads());
        set.attach().unwrap();
        set.destroy();
        assert!(provider.active().is_empty());
    }

    #[test]
    fn concurrent_attach_and_detach_settle_idle() {
        let (set, _pins, _provider) = create(two_pads());
        let set = Arc::new(set);

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let set = set.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        set.attach().unwrap();
                        assert!(set.is_armed());
                        set.detach();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(set.consumers(), 0);
        assert!(!set.is_armed());
    }

    /// Sink whose first sync panics
    struct TrippingSink {
        trip: Arc<AtomicBool>,
    }

    impl EventSink for TrippingSink {
        fn report_button(&mut self, _button: Button, _pressed: bool) {}

        fn report_axis(&mut self, _axis: Axis, _value: i32, _params: AbsParams) {}

        fn sync(&mut self) {
            if self.trip.swap(false, Ordering::SeqCst) {
                panic!("sink failed");
            }
        }
    }

    struct TrippingProvider {
        trip: Arc<AtomicBool>,
    }

    impl SinkProvider for TrippingProvider {
        type Sink = TrippingSink;
        type Error = MockError;

        fn allocate(&mut self, _identity: &DeviceIdentity) -> Result<TrippingSink, MockError> {
            Ok(TrippingSink {
                trip: self.trip.clone(),
            })
        }

        fn register(&mut self, _sink: &mut TrippingSink) -> Result<(), MockError> {
            Ok(())
        }

        fn unregister(&mut self, _sink: TrippingSink) {}
    }

    #[test]
    fn attach_recovers_after_a_panicking_single_pass() {
        let config = Builder::new()
            .pad(PadConfig::fixed(PadType::Gpio).unwrap())
            .refresh_hz(1000)
            .build()
            .unwrap();
        let provider = TrippingProvider {
            trip: Arc::new(AtomicBool::new(true)),
        };
        let set = AcquisitionSet::create(config, MockPins::new(), NoDelay, provider).unwrap();

        let pass = panic::catch_unwind(AssertUnwindSafe(|| set.poll_once()));
        assert!(pass.is_err());

        assert!(matches!(set.attach(), Err(Error::Interrupted)));
        assert_eq!(set.consumers(), 0);
        assert!(!set.is_armed());

        set.attach().unwrap();
        assert!(set.is_armed());
        let passes = set.stats().passes;
        let deadline = Instant::now() + Duration::from_secs(5);
        while set.stats().passes <= passes {
            assert!(Instant::now() < deadline, "no sampling passes");
            thread::sleep(Duration::from_millis(1));
        }
        set.detach();
        assert!(!set.is_armed());
        assert!(set.poll_once().is_ok());
    }
}
