//! Desktop simulator for the arcade joystick driver.
//!
//! Runs the real sampling engine against in-memory pins with a simulated
//! converter, plays a short scripted session on the first pad and prints
//! every batch that differs from the previous one.
//!
//! ```text
//! gpio-arcade-sim [map=1,2] [gpio=...] [spi=16,26,20,21] [refresh_hz=100]
//! ```
//!
//! Set `RUST_LOG=debug` to see the driver's own logging.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::thread;
use std::time::Duration;

use gpio_arcade::mock::{MockPins, NoDelay};
use gpio_arcade::params::parse_params;
use gpio_arcade::{
    AbsParams, AcquisitionSet, Axis, Button, DeviceIdentity, EventSink, PinMap, SinkProvider,
};

/// Sink printing the pad state whenever a batch changes it
struct ConsoleSink {
    phys: String,
    name: &'static str,
    buttons: BTreeMap<&'static str, bool>,
    axes: BTreeMap<&'static str, i32>,
    last_line: String,
}

impl ConsoleSink {
    fn render(&self) -> String {
        let axes: Vec<String> = self
            .axes
            .iter()
            .map(|(axis, value)| format!("{axis}={value}"))
            .collect();
        let pressed: Vec<&str> = self
            .buttons
            .iter()
            .filter(|(_, pressed)| **pressed)
            .map(|(button, _)| *button)
            .collect();
        format!("{} pressed={:?}", axes.join(" "), pressed)
    }
}

impl EventSink for ConsoleSink {
    fn report_button(&mut self, button: Button, pressed: bool) {
        self.buttons.insert(button_label(button), pressed);
    }

    fn report_axis(&mut self, axis: Axis, value: i32, _params: AbsParams) {
        self.axes.insert(axis_label(axis), value);
    }

    fn sync(&mut self) {
        let line = self.render();
        if line != self.last_line {
            println!("{}: {}", self.phys, line);
            self.last_line = line;
        }
    }
}

struct ConsoleProvider;

impl SinkProvider for ConsoleProvider {
    type Sink = ConsoleSink;
    type Error = Infallible;

    fn allocate(&mut self, identity: &DeviceIdentity) -> Result<ConsoleSink, Infallible> {
        Ok(ConsoleSink {
            phys: identity.phys.clone(),
            name: identity.name,
            buttons: BTreeMap::new(),
            axes: BTreeMap::new(),
            last_line: String::new(),
        })
    }

    fn register(&mut self, sink: &mut ConsoleSink) -> Result<(), Infallible> {
        println!("{}: registered \"{}\"", sink.phys, sink.name);
        Ok(())
    }

    fn unregister(&mut self, sink: ConsoleSink) {
        println!("{}: unregistered", sink.phys);
    }
}

fn button_label(button: Button) -> &'static str {
    match button {
        Button::Start => "start",
        Button::Select => "select",
        Button::East => "a",
        Button::South => "b",
        Button::TR => "tr",
        Button::West => "y",
        Button::North => "x",
        Button::TL => "tl",
        Button::DpadUp => "up",
        Button::DpadDown => "down",
        Button::DpadLeft => "left",
        Button::DpadRight => "right",
    }
}

fn axis_label(axis: Axis) -> &'static str {
    match axis {
        Axis::X => "x",
        Axis::Y => "y",
        Axis::RX => "rx",
        Axis::RY => "ry",
        Axis::Hat0X => "hat_x",
        Axis::Hat0Y => "hat_y",
    }
}

/// One step of the scripted session
enum Step {
    Press(usize),
    Release(usize),
    Stick(u8, u16),
    Hold(u64),
}

const SCRIPT: &[Step] = &[
    Step::Hold(50),
    Step::Press(0),
    Step::Hold(50),
    Step::Press(2),
    Step::Hold(50),
    Step::Release(0),
    Step::Release(2),
    Step::Stick(3, 1023),
    Step::Hold(50),
    Step::Stick(3, 512),
    Step::Press(4),
    Step::Hold(50),
    Step::Release(4),
    Step::Press(0),
    Step::Press(1),
    Step::Hold(50),
    Step::Release(0),
    Step::Release(1),
    Step::Hold(50),
];

fn play(pins: &MockPins, map: &PinMap) {
    for step in SCRIPT {
        match *step {
            Step::Press(line) => {
                if let Some(pin) = map.slots()[line] {
                    pins.press(pin);
                }
            }
            Step::Release(line) => {
                if let Some(pin) = map.slots()[line] {
                    pins.release(pin);
                }
            }
            Step::Stick(channel, value) => pins.set_adc_channel(channel, value),
            Step::Hold(ms) => thread::sleep(Duration::from_millis(ms)),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let params: Vec<&str> = if args.is_empty() {
        vec!["map=1"]
    } else {
        args.iter().map(String::as_str).collect()
    };
    let config = parse_params(params)?.build()?;

    let pins = MockPins::new();
    pins.attach_adc(config.serial_link);
    // sticks centered, vertical channels are inverted by the driver
    for channel in 0..4 {
        pins.set_adc_channel(channel, 512);
    }

    let first_map = config
        .configured()
        .next()
        .map(|(_, pad)| *pad.pin_map())
        .ok_or("no pad configured")?;

    println!("GPIO arcade simulator");
    println!("  link: {}", config.serial_link);
    println!("  period: {} us", config.refresh_period_us());

    let set = AcquisitionSet::create(config, pins.clone(), NoDelay, ConsoleProvider)?;
    set.attach()?;
    play(&pins, &first_map);
    set.detach();

    let stats = set.stats();
    println!("{} passes, {} pin faults", stats.passes, stats.pin_faults);
    set.destroy();
    Ok(())
}
