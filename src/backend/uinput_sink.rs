//! uinput event sink
//!
//! Re-injects pipeline output through one virtual device. Scroll and
//! scroll-gesture output is written as high-resolution wheel motion, with a
//! legacy `REL_WHEEL` notch every 120 units for clients that ignore hi-res
//! events.

use crate::device::DeviceId;
use crate::input::error::{PipelineError, Result};
use crate::input::event::{EventKind, MouseButton, RawInputEvent};
use crate::output::sink::EventSink;
use crate::output::OutputEvent;
use crate::remap::action::DragKind;
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key, RelativeAxisType, Synchronization};
use parking_lot::Mutex;
use tracing::{debug, info, trace};

/// Hi-res units per wheel tick
const HI_RES_PER_TICK: i32 = 120;

/// Name of the virtual device
pub const VIRTUAL_DEVICE_NAME: &str = "lamco-pointerd virtual pointer";

/// Translates output events to kernel events
#[derive(Debug, Default)]
pub struct UinputEncoder {
    /// Hi-res wheel units not yet reported as a legacy notch `[x, y]`
    notch_remainder: [i32; 2],
}

impl UinputEncoder {
    /// Create an encoder with no pending notches
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the kernel events for `event` to `out`
    pub fn encode(&mut self, event: &OutputEvent, out: &mut Vec<InputEvent>) {
        match *event {
            OutputEvent::Passthrough(raw) => self.encode_raw(&raw, out),
            OutputEvent::PointerMove { dx, dy } => {
                push_rel(out, RelativeAxisType::REL_X, dx);
                push_rel(out, RelativeAxisType::REL_Y, dy);
            }
            OutputEvent::Button { button, pressed } => push_button(out, button, pressed),
            OutputEvent::Key { code, pressed } => {
                out.push(InputEvent::new(EventType::KEY, code, pressed as i32));
            }
            OutputEvent::Scroll { dx, dy, .. }
            | OutputEvent::Gesture {
                kind: DragKind::ScrollGesture,
                dx,
                dy,
                ..
            } => self.wheel(out, dx * HI_RES_PER_TICK, dy * HI_RES_PER_TICK),
            OutputEvent::Gesture { kind, .. } => {
                trace!("{:?} gesture has no uinput form", kind);
            }
        }
    }

    fn encode_raw(&mut self, raw: &RawInputEvent, out: &mut Vec<InputEvent>) {
        let [x, y] = raw.delta;
        match raw.kind {
            EventKind::Move | EventKind::Drag(_) => {
                push_rel(out, RelativeAxisType::REL_X, x.round() as i32);
                push_rel(out, RelativeAxisType::REL_Y, y.round() as i32);
            }
            EventKind::Scroll => {
                let units = |v: f64| (v * HI_RES_PER_TICK as f64).round() as i32;
                self.wheel(out, units(x), units(y));
            }
            EventKind::ButtonDown(button) => push_button(out, button, true),
            EventKind::ButtonUp(button) => push_button(out, button, false),
            EventKind::FlagsChanged(_) => {}
        }
    }

    fn wheel(&mut self, out: &mut Vec<InputEvent>, hx: i32, hy: i32) {
        let axes = [
            (hx, RelativeAxisType::REL_HWHEEL_HI_RES, RelativeAxisType::REL_HWHEEL),
            (hy, RelativeAxisType::REL_WHEEL_HI_RES, RelativeAxisType::REL_WHEEL),
        ];
        for (i, (units, hi_res, legacy)) in axes.into_iter().enumerate() {
            if units == 0 {
                continue;
            }
            push_rel(out, hi_res, units);

            let pending = &mut self.notch_remainder[i];
            if pending.signum() != units.signum() {
                *pending = 0;
            }
            *pending += units;
            let notches = *pending / HI_RES_PER_TICK;
            *pending -= notches * HI_RES_PER_TICK;
            push_rel(out, legacy, notches);
        }
    }
}

fn push_rel(out: &mut Vec<InputEvent>, axis: RelativeAxisType, value: i32) {
    if value != 0 {
        out.push(InputEvent::new(EventType::RELATIVE, axis.0, value));
    }
}

fn push_button(out: &mut Vec<InputEvent>, button: MouseButton, pressed: bool) {
    out.push(InputEvent::new(
        EventType::KEY,
        button.to_linux_button(),
        pressed as i32,
    ));
}

struct Inner {
    device: VirtualDevice,
    encoder: UinputEncoder,
    scratch: Vec<InputEvent>,
}

/// Sink writing to a uinput virtual device
pub struct UinputSink {
    inner: Mutex<Inner>,
}

impl UinputSink {
    /// Create the virtual device
    ///
    /// `extra_keys` are the key codes used by configured key combos.
    pub fn new(extra_keys: impl IntoIterator<Item = u16>) -> Result<Self> {
        let mut keys = AttributeSet::<Key>::new();
        for button in MouseButton::ALL {
            keys.insert(Key::new(button.to_linux_button()));
        }
        for code in extra_keys {
            keys.insert(Key::new(code));
        }

        let mut axes = AttributeSet::<RelativeAxisType>::new();
        for axis in [
            RelativeAxisType::REL_X,
            RelativeAxisType::REL_Y,
            RelativeAxisType::REL_WHEEL,
            RelativeAxisType::REL_HWHEEL,
            RelativeAxisType::REL_WHEEL_HI_RES,
            RelativeAxisType::REL_HWHEEL_HI_RES,
        ] {
            axes.insert(axis);
        }

        let device = VirtualDeviceBuilder::new()
            .and_then(|b| b.name(VIRTUAL_DEVICE_NAME).with_keys(&keys))
            .and_then(|b| b.with_relative_axes(&axes))
            .and_then(|b| b.build())
            .map_err(|e| PipelineError::Sink(format!("failed to create uinput device: {}", e)))?;

        info!("Created uinput device \"{}\"", VIRTUAL_DEVICE_NAME);

        Ok(Self {
            inner: Mutex::new(Inner {
                device,
                encoder: UinputEncoder::new(),
                scratch: Vec::with_capacity(16),
            }),
        })
    }
}

impl EventSink for UinputSink {
    fn emit(&self, device: DeviceId, events: &[OutputEvent]) -> Result<()> {
        let mut inner = self.inner.lock();
        let Inner {
            device: vdev,
            encoder,
            scratch,
        } = &mut *inner;

        scratch.clear();
        for event in events {
            encoder.encode(event, scratch);
        }
        if scratch.is_empty() {
            return Ok(());
        }
        scratch.push(InputEvent::new(
            EventType::SYNCHRONIZATION,
            Synchronization::SYN_REPORT.0,
            0,
        ));

        trace!("{} kernel events for {}", scratch.len(), device);
        vdev.emit(scratch).map_err(|e| {
            debug!("uinput write failed: {}", e);
            PipelineError::Sink(e.to_string())
        })
    }
}

impl std::fmt::Debug for UinputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UinputSink")
            .field("name", &VIRTUAL_DEVICE_NAME)
            .finish()
    }
}
