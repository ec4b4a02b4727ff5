//! Normalization of a raw sample into one event batch
//!
//! Batch order for every pad and pass:
//!
//! 1. D-pad keys: up, down, left, right
//! 2. Hat: `Hat0Y`, `Hat0X`
//! 3. Sticks: `RY`, `RX`, `Y`, `X`
//! 4. The eight buttons in [`BUTTON_TABLE`] order
//! 5. One sync

use crate::input::{AbsParams, Axis, BUTTON_TABLE, Button, EventSink};
use crate::sample::RawSample;

/// Ternary position of one hat axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Up or left
    Negative,
    Neutral,
    /// Down or right
    Positive,
}

impl Direction {
    /// Combine the two opposing lines of an axis
    ///
    /// Pressing both sides cancels out to [`Direction::Neutral`].
    pub fn from_pair(negative: bool, positive: bool) -> Self {
        match (negative, positive) {
            (true, false) => Direction::Negative,
            (false, true) => Direction::Positive,
            _ => Direction::Neutral,
        }
    }

    /// Hat value in `-1..=1`
    pub fn value(self) -> i32 {
        match self {
            Direction::Negative => -1,
            Direction::Neutral => 0,
            Direction::Positive => 1,
        }
    }
}

/// Flush the events of one sample into `sink`
pub fn normalize_and_flush<S: EventSink + ?Sized>(sample: &RawSample, sink: &mut S) {
    let digital = &sample.digital;
    let vertical = Direction::from_pair(digital.up, digital.down);
    let horizontal = Direction::from_pair(digital.left, digital.right);

    sink.report_button(Button::DpadUp, vertical == Direction::Negative);
    sink.report_button(Button::DpadDown, vertical == Direction::Positive);
    sink.report_button(Button::DpadLeft, horizontal == Direction::Negative);
    sink.report_button(Button::DpadRight, horizontal == Direction::Positive);

    sink.report_axis(Axis::Hat0Y, vertical.value(), AbsParams::HAT);
    sink.report_axis(Axis::Hat0X, horizontal.value(), AbsParams::HAT);

    let analog = &sample.analog;
    for (axis, value) in [
        (Axis::RY, analog.ry),
        (Axis::RX, analog.rx),
        (Axis::Y, analog.y),
        (Axis::X, analog.x),
    ] {
        let params = axis.params();
        sink.report_axis(axis, params.clamp(i32::from(value)), params);
    }

    for (&button, &pressed) in BUTTON_TABLE.iter().zip(&digital.buttons) {
        sink.report_button(button, pressed);
    }

    sink.sync();
}
