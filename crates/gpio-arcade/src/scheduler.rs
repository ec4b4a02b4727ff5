//! Fixed-period sampling worker
//!
//! While armed, a dedicated thread owns the [`Engine`] (pins, delay, pads)
//! and runs one sampling pass per period. Disarming stops the thread and
//! joins it, which hands the engine back only once the pass in flight has
//! finished. Because the engine moves with the thread, the pins and the
//! serial link are never touched from two threads at once and need no lock.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use embedded_hal::delay::DelayNs;

use crate::config::SerialLinkConfig;
use crate::input::EventSink;
use crate::pad::Pad;
use crate::pins::PinBank;

const WORKER_NAME: &str = "gpio-arcade-tick";

/// Work performed on every firing of the timer
pub trait Tick: Send + 'static {
    fn tick(&mut self);
}

/// Handle of an armed worker
pub struct Ticker<E> {
    stop: Sender<()>,
    handle: JoinHandle<Option<E>>,
}

impl<E: Tick> Ticker<E> {
    /// Move `engine` onto a new worker that ticks it every `period`
    ///
    /// The first pass runs one period after arming. If the thread cannot be
    /// started the engine is handed back with the error.
    pub fn arm(engine: E, period: Duration) -> Result<Self, (E, io::Error)> {
        let (engine_tx, engine_rx) = mpsc::sync_channel::<E>(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let spawned = thread::Builder::new()
            .name(WORKER_NAME.into())
            .spawn(move || {
                let mut engine = engine_rx.recv().ok()?;
                run(&mut engine, &stop_rx, period);
                Some(engine)
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => return Err((engine, err)),
        };
        if let Err(mpsc::SendError(engine)) = engine_tx.send(engine) {
            return Err((engine, io::Error::other("sampling thread exited early")));
        }

        Ok(Self {
            stop: stop_tx,
            handle,
        })
    }

    /// Stop the worker, waiting for the pass in flight
    ///
    /// Returns `None` if a pass panicked.
    pub fn disarm(self) -> Option<E> {
        // a worker that already exited has dropped the receiver
        let _ = self.stop.send(());
        self.handle.join().ok().flatten()
    }
}

fn run<E: Tick>(engine: &mut E, stop: &Receiver<()>, period: Duration) {
    loop {
        match stop.recv_timeout(period) {
            Err(RecvTimeoutError::Timeout) => engine.tick(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Counters of the sampling engine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Completed sampling passes
    pub passes: u64,
    /// Pads skipped because a pin read or write failed
    pub pin_faults: u64,
}

/// Counters shared between the engine and the acquisition set
#[derive(Debug, Default)]
pub(crate) struct SharedStats {
    passes: AtomicU64,
    pin_faults: AtomicU64,
}

impl SharedStats {
    pub(crate) fn snapshot(&self) -> TickStats {
        TickStats {
            passes: self.passes.load(Ordering::Acquire),
            pin_faults: self.pin_faults.load(Ordering::Acquire),
        }
    }
}

/// Pins, delay and pads sampled by one pass
pub struct Engine<P, D, K> {
    pins: P,
    delay: D,
    lines: SerialLinkConfig,
    pads: Vec<Pad<K>>,
    stats: Arc<SharedStats>,
}

impl<P, D, K> Engine<P, D, K>
where
    P: PinBank,
    D: DelayNs,
    K: EventSink,
{
    pub(crate) fn new(
        pins: P,
        delay: D,
        lines: SerialLinkConfig,
        pads: Vec<Pad<K>>,
        stats: Arc<SharedStats>,
    ) -> Self {
        Self {
            pins,
            delay,
            lines,
            pads,
            stats,
        }
    }

    pub fn pads(&self) -> &[Pad<K>] {
        &self.pads
    }

    pub(crate) fn into_pads(self) -> Vec<Pad<K>> {
        self.pads
    }

    /// Sample and flush every pad, in slot order
    ///
    /// A pad whose pins fail is skipped for this pass and reports nothing.
    pub fn pass(&mut self) {
        for pad in &mut self.pads {
            match pad.sample(&mut self.pins, &mut self.delay, self.lines) {
                Ok(()) => pad.flush(),
                Err(err) => {
                    let faults = self.stats.pin_faults.fetch_add(1, Ordering::AcqRel) + 1;
                    if faults == 1 {
                        log::warn!("Pad {} skipped, pin fault: {:?}", pad.slot(), err);
                    } else {
                        log::debug!("Pad {} skipped, pin fault #{}: {:?}", pad.slot(), faults, err);
                    }
                }
            }
        }
        self.stats.passes.fetch_add(1, Ordering::AcqRel);
    }
}

impl<P, D, K> Tick for Engine<P, D, K>
where
    P: PinBank + Send + 'static,
    D: DelayNs + Send + 'static,
    K: EventSink + Send + 'static,
{
    fn tick(&mut self) {
        self.pass();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Instant;

    struct Counter {
        ticks: Arc<AtomicU64>,
        in_pass: Arc<AtomicBool>,
        pass_time: Duration,
    }

    impl Tick for Counter {
        fn tick(&mut self) {
            self.in_pass.store(true, Ordering::SeqCst);
            thread::sleep(self.pass_time);
            self.ticks.fetch_add(1, Ordering::SeqCst);
            self.in_pass.store(false, Ordering::SeqCst);
        }
    }

    fn counter(pass_time: Duration) -> (Counter, Arc<AtomicU64>, Arc<AtomicBool>) {
        let ticks = Arc::new(AtomicU64::new(0));
        let in_pass = Arc::new(AtomicBool::new(false));
        let counter = Counter {
            ticks: ticks.clone(),
            in_pass: in_pass.clone(),
            pass_time,
        };
        (counter, ticks, in_pass)
    }

    fn wait_for(ticks: &AtomicU64, at_least: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while ticks.load(Ordering::SeqCst) < at_least {
            assert!(Instant::now() < deadline, "worker did not tick");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn armed_worker_rearms_after_each_pass() {
        let (counter, ticks, _) = counter(Duration::ZERO);
        let ticker = Ticker::arm(counter, Duration::from_millis(2)).ok().unwrap();

        wait_for(&ticks, 3);
        let engine = ticker.disarm().unwrap();
        assert!(engine.ticks.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn disarm_waits_for_pass_in_flight() {
        let (counter, ticks, in_pass) = counter(Duration::from_millis(30));
        let ticker = Ticker::arm(counter, Duration::from_millis(1)).ok().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !in_pass.load(Ordering::SeqCst) {
            assert!(Instant::now() < deadline, "worker did not start a pass");
            thread::yield_now();
        }

        let engine = ticker.disarm().unwrap();
        assert!(!in_pass.load(Ordering::SeqCst));
        let stopped_at = ticks.load(Ordering::SeqCst);
        assert!(stopped_at >= 1);

        // nothing fires after the stop
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ticks.load(Ordering::SeqCst), stopped_at);
        drop(engine);
    }

    #[test]
    fn no_pass_before_first_period() {
        let (counter, ticks, _) = counter(Duration::ZERO);
        let ticker = Ticker::arm(counter, Duration::from_secs(60)).ok().unwrap();
        thread::sleep(Duration::from_millis(10));
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        assert!(ticker.disarm().is_some());
    }

    struct Panics;

    impl Tick for Panics {
        fn tick(&mut self) {
            panic!("pass failed");
        }
    }

    #[test]
    fn panicking_pass_loses_the_engine() {
        let ticker = Ticker::arm(Panics, Duration::from_millis(1)).ok().unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(ticker.disarm().is_none());
    }
}
