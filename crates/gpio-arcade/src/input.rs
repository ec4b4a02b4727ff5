//! Input event identities and the sink the driver reports into.
//!
//! Codes follow the Linux input event numbering so a sink can forward them to
//! evdev/uinput unchanged.

use alloc::string::String;

/// Buttons a pad reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Start,
    Select,
    /// A
    East,
    /// B
    South,
    /// Right shoulder
    TR,
    /// Y
    West,
    /// X
    North,
    /// Left shoulder
    TL,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
}

impl Button {
    /// Linux `BTN_*` code
    pub fn code(self) -> u16 {
        match self {
            Button::South => 0x130,
            Button::East => 0x131,
            Button::North => 0x133,
            Button::West => 0x134,
            Button::TL => 0x136,
            Button::TR => 0x137,
            Button::Select => 0x13a,
            Button::Start => 0x13b,
            Button::DpadUp => 0x220,
            Button::DpadDown => 0x221,
            Button::DpadLeft => 0x222,
            Button::DpadRight => 0x223,
        }
    }
}

/// Buttons wired to digital slots 4..12, in slot order
pub const BUTTON_TABLE: [Button; 8] = [
    Button::Start,
    Button::Select,
    Button::East,
    Button::South,
    Button::TR,
    Button::West,
    Button::North,
    Button::TL,
];

/// D-pad keys mirroring the hat
pub const DPAD_BUTTONS: [Button; 4] = [
    Button::DpadUp,
    Button::DpadDown,
    Button::DpadLeft,
    Button::DpadRight,
];

/// Absolute axes a pad reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    RX,
    RY,
    Hat0X,
    Hat0Y,
}

impl Axis {
    /// Linux `ABS_*` code
    pub fn code(self) -> u16 {
        match self {
            Axis::X => 0x00,
            Axis::Y => 0x01,
            Axis::RX => 0x03,
            Axis::RY => 0x04,
            Axis::Hat0X => 0x10,
            Axis::Hat0Y => 0x11,
        }
    }

    /// Range and noise tolerances declared for this axis
    pub fn params(self) -> AbsParams {
        match self {
            Axis::Hat0X | Axis::Hat0Y => AbsParams::HAT,
            Axis::X | Axis::Y | Axis::RX | Axis::RY => AbsParams::STICK,
        }
    }
}

/// Range, dead zone and jitter filter of an absolute axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsParams {
    pub min: i32,
    pub max: i32,
    /// Values within `flat` of the center may be treated as centered
    pub flat: i32,
    /// Changes smaller than `fuzz` may be dropped as noise
    pub fuzz: i32,
}

impl AbsParams {
    /// Ternary D-pad hat
    pub const HAT: Self = Self {
        min: -1,
        max: 1,
        flat: 0,
        fuzz: 0,
    };

    /// 10-bit analog stick
    pub const STICK: Self = Self {
        min: 0,
        max: 1023,
        flat: 4,
        fuzz: 8,
    };

    /// Clamp `value` into `min..=max`
    pub fn clamp(&self, value: i32) -> i32 {
        value.clamp(self.min, self.max)
    }
}

/// Axes every pad declares, in report order
pub const PAD_AXES: [Axis; 6] = [Axis::Hat0Y, Axis::Hat0X, Axis::RY, Axis::RX, Axis::Y, Axis::X];

/// Bus type announced for the pads (`BUS_PARPORT`)
pub const BUS_PARPORT: u16 = 0x07;

/// Identity and capabilities a sink is allocated with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub name: &'static str,
    /// Physical path, `input<slot>`
    pub phys: String,
    pub bustype: u16,
    pub vendor: u16,
    /// Pad type code
    pub product: u16,
    pub version: u16,
    pub buttons: &'static [Button],
    pub dpad: &'static [Button],
    pub axes: &'static [Axis],
}

/// Sink receiving one pad's normalized events
///
/// Events of one sampling pass arrive back to back and are closed by
/// [`sync`](EventSink::sync); a consumer should apply them as one observation.
pub trait EventSink {
    /// Report the state of a button
    fn report_button(&mut self, button: Button, pressed: bool);

    /// Report the value of an absolute axis
    fn report_axis(&mut self, axis: Axis, value: i32, params: AbsParams);

    /// Close the current batch
    fn sync(&mut self);
}

impl<T: EventSink + ?Sized> EventSink for &mut T {
    fn report_button(&mut self, button: Button, pressed: bool) {
        T::report_button(self, button, pressed)
    }

    fn report_axis(&mut self, axis: Axis, value: i32, params: AbsParams) {
        T::report_axis(self, axis, value, params)
    }

    fn sync(&mut self) {
        T::sync(self)
    }
}

/// Allocates and registers one sink per pad
///
/// The lifecycle of a sink mirrors an input device: allocated, registered,
/// and eventually either unregistered (after a successful registration) or
/// released (when setup fails before registration completes).
pub trait SinkProvider {
    type Sink: EventSink;
    type Error: core::fmt::Debug;

    /// Allocate a sink for a pad with the given identity
    fn allocate(&mut self, identity: &DeviceIdentity) -> Result<Self::Sink, Self::Error>;

    /// Make an allocated sink visible to consumers
    fn register(&mut self, sink: &mut Self::Sink) -> Result<(), Self::Error>;

    /// Withdraw a registered sink
    fn unregister(&mut self, sink: Self::Sink);

    /// Drop a sink that never completed registration
    fn release(&mut self, sink: Self::Sink) {
        drop(sink);
    }
}
