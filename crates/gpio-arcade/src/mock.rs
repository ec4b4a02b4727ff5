//! In-memory pin bank, converter and sinks for tests and the simulator
//!
//! [`MockPins`] models the header: undriven lines read high through their
//! pull-ups, buttons are pressed by grounding a line, and an optional MCP3008
//! answers on the serial link. [`RecordingProvider`] hands out sinks that
//! log every event so batches can be inspected afterwards.
//!
//! All handles are cheap clones of shared state, so a test can keep one
//! while the acquisition set owns another.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embedded_hal::delay::DelayNs;

use crate::config::SerialLinkConfig;
use crate::input::{AbsParams, Axis, Button, DeviceIdentity, EventSink, SinkProvider};
use crate::pins::{PinBank, PinState, Pull};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Failures injected into the mocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockError {
    Read(u8),
    Write(u8),
    Direction(u8),
    /// Write to a line that was never made an output
    NotOutput(u8),
    Allocate(String),
    Register(String),
}

impl core::fmt::Display for MockError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MockError::Read(pin) => write!(f, "read of pin {pin} failed"),
            MockError::Write(pin) => write!(f, "write of pin {pin} failed"),
            MockError::Direction(pin) => write!(f, "direction of pin {pin} rejected"),
            MockError::NotOutput(pin) => write!(f, "pin {pin} is not an output"),
            MockError::Allocate(phys) => write!(f, "no sink available for {phys}"),
            MockError::Register(phys) => write!(f, "registration of {phys} refused"),
        }
    }
}

impl core::error::Error for MockError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Input,
    Output,
}

/// MCP3008 attached to the serial link
#[derive(Debug)]
struct Converter {
    lines: SerialLinkConfig,
    channels: [u16; 8],
    selected: bool,
    /// Data-out levels latched on each rising clock edge of the frame
    tx: Vec<bool>,
    frames: Vec<[u8; 3]>,
}

impl Converter {
    fn new(lines: SerialLinkConfig) -> Self {
        Self {
            lines,
            channels: [0; 8],
            selected: false,
            tx: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// Response bit at the last clocked position
    fn response_bit(&self) -> PinState {
        let Some(position) = self.tx.len().checked_sub(1) else {
            return PinState::Low;
        };
        if !self.selected || !(14..24).contains(&position) {
            return PinState::Low;
        }
        let channel = self.tx[9..12]
            .iter()
            .fold(0usize, |acc, &bit| (acc << 1) | usize::from(bit));
        let value = self.channels[channel] & 0x3FF;
        PinState::from((value >> (23 - position)) & 1 == 1)
    }

    fn close_frame(&mut self) {
        if self.tx.len() == 24 {
            let mut frame = [0u8; 3];
            for (i, &bit) in self.tx.iter().enumerate() {
                if bit {
                    frame[i / 8] |= 0x80 >> (i % 8);
                }
            }
            self.frames.push(frame);
        }
        self.tx.clear();
    }
}

#[derive(Debug, Default)]
struct PinsState {
    directions: HashMap<u8, Direction>,
    levels: HashMap<u8, PinState>,
    rising_edges: HashMap<u8, usize>,
    reads: HashMap<u8, usize>,
    pull_calls: Vec<(u64, Pull)>,
    failing_reads: HashSet<u8>,
    failing_writes: HashSet<u8>,
    failing_directions: HashSet<u8>,
    converter: Option<Converter>,
}

impl PinsState {
    fn write(&mut self, pin: u8, level: PinState) {
        // undriven lines count as low for edge detection
        let previous = self.levels.insert(pin, level).unwrap_or(PinState::Low);
        let rising = previous == PinState::Low && level == PinState::High;
        if rising {
            *self.rising_edges.entry(pin).or_default() += 1;
        }

        let Some(lines) = self.converter.as_ref().map(|converter| converter.lines) else {
            return;
        };
        let data_out = self.levels.get(&lines.data_out).copied();
        let Some(converter) = self.converter.as_mut() else {
            return;
        };
        if pin == lines.select {
            match level {
                PinState::Low => {
                    converter.selected = true;
                    converter.tx.clear();
                }
                PinState::High => {
                    if converter.selected {
                        converter.close_frame();
                    }
                    converter.selected = false;
                }
            }
        } else if pin == lines.clock && rising && converter.selected {
            converter.tx.push(data_out == Some(PinState::High));
        }
    }
}

/// Header pins backed by shared in-memory state
#[derive(Debug, Clone, Default)]
pub struct MockPins {
    state: Arc<Mutex<PinsState>>,
}

impl MockPins {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, PinsState> {
        lock(&self.state)
    }

    /// Ground `pin`, as a pressed button does
    pub fn press(&self, pin: u8) {
        self.set_level(pin, PinState::Low);
    }

    /// Let `pin` float back high
    pub fn release(&self, pin: u8) {
        self.set_level(pin, PinState::High);
    }

    /// Force the level of `pin` without counting an edge
    pub fn set_level(&self, pin: u8, level: PinState) {
        self.state().levels.insert(pin, level);
    }

    /// Current level of `pin`; undriven lines read high
    pub fn level(&self, pin: u8) -> PinState {
        self.state()
            .levels
            .get(&pin)
            .copied()
            .unwrap_or(PinState::High)
    }

    pub fn is_input(&self, pin: u8) -> bool {
        self.state().directions.get(&pin) == Some(&Direction::Input)
    }

    pub fn is_output(&self, pin: u8) -> bool {
        self.state().directions.get(&pin) == Some(&Direction::Output)
    }

    pub fn rising_edges(&self, pin: u8) -> usize {
        self.state().rising_edges.get(&pin).copied().unwrap_or(0)
    }

    pub fn reads_of(&self, pin: u8) -> usize {
        self.state().reads.get(&pin).copied().unwrap_or(0)
    }

    pub fn pull_calls(&self) -> Vec<(u64, Pull)> {
        self.state().pull_calls.clone()
    }

    pub fn fail_reads_of(&self, pin: u8) {
        self.state().failing_reads.insert(pin);
    }

    pub fn fail_writes_of(&self, pin: u8) {
        self.state().failing_writes.insert(pin);
    }

    pub fn fail_direction_of(&self, pin: u8) {
        self.state().failing_directions.insert(pin);
    }

    /// Clear every injected failure
    pub fn heal(&self) {
        let mut state = self.state();
        state.failing_reads.clear();
        state.failing_writes.clear();
        state.failing_directions.clear();
    }

    /// Attach a converter answering on `lines`, all channels at zero
    pub fn attach_adc(&self, lines: SerialLinkConfig) {
        self.state().converter = Some(Converter::new(lines));
    }

    /// Set the raw 10-bit value the converter returns for `channel`
    pub fn set_adc_channel(&self, channel: u8, value: u16) {
        if let Some(converter) = self.state().converter.as_mut() {
            converter.channels[usize::from(channel & 0x07)] = value & 0x3FF;
        }
    }

    /// Complete request frames received by the converter
    pub fn adc_frames(&self) -> Vec<[u8; 3]> {
        self.state()
            .converter
            .as_ref()
            .map(|converter| converter.frames.clone())
            .unwrap_or_default()
    }
}

impl PinBank for MockPins {
    type Error = MockError;

    fn set_input(&mut self, pin: u8) -> Result<(), Self::Error> {
        let mut state = self.state();
        if state.failing_directions.contains(&pin) {
            return Err(MockError::Direction(pin));
        }
        state.directions.insert(pin, Direction::Input);
        Ok(())
    }

    fn set_output(&mut self, pin: u8) -> Result<(), Self::Error> {
        let mut state = self.state();
        if state.failing_directions.contains(&pin) {
            return Err(MockError::Direction(pin));
        }
        state.directions.insert(pin, Direction::Output);
        Ok(())
    }

    fn read(&mut self, pin: u8) -> Result<PinState, Self::Error> {
        let mut state = self.state();
        if state.failing_reads.contains(&pin) {
            return Err(MockError::Read(pin));
        }
        *state.reads.entry(pin).or_default() += 1;

        if let Some(converter) = state.converter.as_ref() {
            if pin == converter.lines.data_in {
                return Ok(converter.response_bit());
            }
        }
        Ok(state.levels.get(&pin).copied().unwrap_or(PinState::High))
    }

    fn write(&mut self, pin: u8, level: PinState) -> Result<(), Self::Error> {
        let mut state = self.state();
        if state.failing_writes.contains(&pin) {
            return Err(MockError::Write(pin));
        }
        if state.directions.get(&pin) != Some(&Direction::Output) {
            return Err(MockError::NotOutput(pin));
        }
        state.write(pin, level);
        Ok(())
    }

    fn configure_pull(&mut self, mask: u64, pull: Pull) -> Result<(), Self::Error> {
        self.state().pull_calls.push((mask, pull));
        Ok(())
    }
}

/// Delay that returns immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// One event received by a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    Button(Button, bool),
    Axis(Axis, i32),
    Sync,
}

/// Events of one pass, without the closing sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub events: Vec<SinkEvent>,
}

impl Batch {
    pub fn axis(&self, axis: Axis) -> Option<i32> {
        self.events.iter().find_map(|event| match *event {
            SinkEvent::Axis(a, value) if a == axis => Some(value),
            _ => None,
        })
    }

    pub fn button(&self, button: Button) -> Option<bool> {
        self.events.iter().find_map(|event| match *event {
            SinkEvent::Button(b, pressed) if b == button => Some(pressed),
            _ => None,
        })
    }
}

/// Shared event log of one sink
#[derive(Debug, Clone, Default)]
pub struct SinkLog {
    events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl SinkLog {
    pub fn events(&self) -> Vec<SinkEvent> {
        lock(&self.events).clone()
    }

    /// Complete batches, oldest first
    pub fn batches(&self) -> Vec<Batch> {
        let events = lock(&self.events);
        let mut batches = Vec::new();
        let mut current = Vec::new();
        for &event in events.iter() {
            if event == SinkEvent::Sync {
                batches.push(Batch {
                    events: core::mem::take(&mut current),
                });
            } else {
                current.push(event);
            }
        }
        batches
    }

    pub fn last_batch(&self) -> Option<Batch> {
        self.batches().pop()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }

    fn push(&self, event: SinkEvent) {
        lock(&self.events).push(event);
    }
}

/// Sink appending every event to a [`SinkLog`]
#[derive(Debug, Clone)]
pub struct RecordingSink {
    identity: Option<DeviceIdentity>,
    log: SinkLog,
}

impl RecordingSink {
    /// Sink not handed out by any provider
    pub fn detached() -> Self {
        Self {
            identity: None,
            log: SinkLog::default(),
        }
    }

    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.log.events()
    }

    pub fn log(&self) -> SinkLog {
        self.log.clone()
    }

    fn phys(&self) -> String {
        self.identity
            .as_ref()
            .map(|identity| identity.phys.clone())
            .unwrap_or_default()
    }
}

impl EventSink for RecordingSink {
    fn report_button(&mut self, button: Button, pressed: bool) {
        self.log.push(SinkEvent::Button(button, pressed));
    }

    fn report_axis(&mut self, axis: Axis, value: i32, _params: AbsParams) {
        self.log.push(SinkEvent::Axis(axis, value));
    }

    fn sync(&mut self) {
        self.log.push(SinkEvent::Sync);
    }
}

#[derive(Debug, Default)]
struct ProviderState {
    identities: Vec<DeviceIdentity>,
    logs: HashMap<String, SinkLog>,
    registered: Vec<String>,
    unregistered: Vec<String>,
    released: Vec<String>,
    failing_allocations: HashSet<String>,
    failing_registrations: HashSet<String>,
}

/// Provider of [`RecordingSink`]s that keeps a history of their lifecycle
#[derive(Debug, Clone, Default)]
pub struct RecordingProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ProviderState> {
        lock(&self.state)
    }

    pub fn fail_allocate_of(&self, phys: &str) {
        self.state().failing_allocations.insert(phys.into());
    }

    pub fn fail_register_of(&self, phys: &str) {
        self.state().failing_registrations.insert(phys.into());
    }

    /// Identities of every allocated sink, in allocation order
    pub fn identities(&self) -> Vec<DeviceIdentity> {
        self.state().identities.clone()
    }

    pub fn registered(&self) -> Vec<String> {
        self.state().registered.clone()
    }

    pub fn unregistered(&self) -> Vec<String> {
        self.state().unregistered.clone()
    }

    pub fn released(&self) -> Vec<String> {
        self.state().released.clone()
    }

    /// Sinks registered and not yet unregistered
    pub fn active(&self) -> Vec<String> {
        let state = self.state();
        let mut active = state.registered.clone();
        for phys in &state.unregistered {
            if let Some(index) = active.iter().position(|p| p == phys) {
                active.remove(index);
            }
        }
        active
    }

    /// Event log of the sink allocated for `phys`
    pub fn log(&self, phys: &str) -> SinkLog {
        self.state().logs.get(phys).cloned().unwrap_or_default()
    }
}

impl SinkProvider for RecordingProvider {
    type Sink = RecordingSink;
    type Error = MockError;

    fn allocate(&mut self, identity: &DeviceIdentity) -> Result<Self::Sink, Self::Error> {
        let mut state = self.state();
        if state.failing_allocations.contains(&identity.phys) {
            return Err(MockError::Allocate(identity.phys.clone()));
        }
        let log = SinkLog::default();
        state.logs.insert(identity.phys.clone(), log.clone());
        state.identities.push(identity.clone());
        Ok(RecordingSink {
            identity: Some(identity.clone()),
            log,
        })
    }

    fn register(&mut self, sink: &mut Self::Sink) -> Result<(), Self::Error> {
        let phys = sink.phys();
        let mut state = self.state();
        if state.failing_registrations.contains(&phys) {
            return Err(MockError::Register(phys));
        }
        state.registered.push(phys);
        Ok(())
    }

    fn unregister(&mut self, sink: Self::Sink) {
        self.state().unregistered.push(sink.phys());
    }

    fn release(&mut self, sink: Self::Sink) {
        self.state().released.push(sink.phys());
    }
}
