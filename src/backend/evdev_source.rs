//! evdev event source
//!
//! Grabs every relative pointing device (exclusive `EVIOCGRAB`, so the
//! original events never reach the compositor) and reads keyboards without
//! grabbing them, only to track modifier keys.
//!
//! # Frames
//!
//! The kernel reports one hardware report as a run of events terminated by
//! `SYN_REPORT`:
//!
//! ```text
//! REL_X 3, REL_Y -1, REL_WHEEL_HI_RES 120, REL_WHEEL 1, SYN_REPORT
//!    └──────┬─────┘  └──────────┬──────────┘
//!      one Move event     one Scroll event (1.0 tick)
//! ```
//!
//! Button transitions are forwarded as they arrive; motion and wheel deltas
//! are summed and flushed at the frame boundary. When a frame carries a
//! high-resolution wheel value the legacy value for that axis is ignored.

use crate::device::{DeviceClass, DeviceId};
use crate::input::error::{PipelineError, Result};
use crate::input::event::{EventKind, HardwareEvent, MouseButton};
use crate::input::modifiers::{Modifier, ModifierSet};
use crate::tap::source::EventSource;
use evdev::{Device, InputEvent, InputEventKind, Key, RelativeAxisType, Synchronization};
use std::collections::HashSet;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Units per wheel notch in `REL_*_HI_RES`
const HI_RES_PER_TICK: f64 = 120.0;

/// What the daemon does with a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    /// Grabbed and remapped
    Pointer,
    /// Read passively for modifier keys
    Keyboard,
}

/// Device found during enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Identifier used by the pipeline
    pub id: DeviceId,
    /// `/dev/input/eventN`
    pub path: PathBuf,
    /// Kernel-reported name
    pub name: String,
    /// USB/Bluetooth vendor id
    pub vendor_id: u16,
    /// USB/Bluetooth product id
    pub product_id: u16,
    /// Grabbed pointer or passive keyboard
    pub role: DeviceRole,
}

impl DiscoveredDevice {
    /// Class guessed from the device name
    pub fn class_hint(&self) -> DeviceClass {
        let name = self.name.to_ascii_lowercase();
        if name.contains("touchpad") || name.contains("trackpad") {
            DeviceClass::Trackpad
        } else {
            DeviceClass::Mouse
        }
    }
}

/// Decodes kernel event frames of one pointing device
#[derive(Debug, Clone, Default)]
pub struct FrameDecoder {
    motion: [i32; 2],
    wheel: [i32; 2],
    wheel_hi_res: [Option<i32>; 2],
    held: Vec<MouseButton>,
}

impl FrameDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one kernel event, appending completed events to `out`
    pub fn decode(&mut self, device: DeviceId, event: &InputEvent, out: &mut Vec<HardwareEvent>) {
        match event.kind() {
            InputEventKind::RelAxis(axis) => match axis {
                RelativeAxisType::REL_X => self.motion[0] += event.value(),
                RelativeAxisType::REL_Y => self.motion[1] += event.value(),
                RelativeAxisType::REL_HWHEEL => self.wheel[0] += event.value(),
                RelativeAxisType::REL_WHEEL => self.wheel[1] += event.value(),
                RelativeAxisType::REL_HWHEEL_HI_RES => {
                    *self.wheel_hi_res[0].get_or_insert(0) += event.value();
                }
                RelativeAxisType::REL_WHEEL_HI_RES => {
                    *self.wheel_hi_res[1].get_or_insert(0) += event.value();
                }
                other => trace!("Ignoring axis {:?}", other),
            },

            InputEventKind::Key(key) => {
                let Some(button) = MouseButton::from_linux_button(key.code()) else {
                    trace!("Ignoring key {:?} on pointer {}", key, device);
                    return;
                };
                match event.value() {
                    0 => {
                        self.held.retain(|b| *b != button);
                        out.push(HardwareEvent::button(device, button, false));
                    }
                    1 => {
                        if !self.held.contains(&button) {
                            self.held.push(button);
                        }
                        out.push(HardwareEvent::button(device, button, true));
                    }
                    _ => {}
                }
            }

            InputEventKind::Synchronization(Synchronization::SYN_REPORT) => self.flush(device, out),

            InputEventKind::Synchronization(Synchronization::SYN_DROPPED) => {
                debug!("Kernel dropped events for {}, discarding frame", device);
                self.motion = [0, 0];
                self.wheel = [0, 0];
                self.wheel_hi_res = [None, None];
            }

            _ => {}
        }
    }

    /// Buttons currently held, in press order
    pub fn held(&self) -> &[MouseButton] {
        &self.held
    }

    fn flush(&mut self, device: DeviceId, out: &mut Vec<HardwareEvent>) {
        let [mx, my] = std::mem::take(&mut self.motion);
        if mx != 0 || my != 0 {
            let mut event = HardwareEvent::motion(device, mx as f64, my as f64);
            if let Some(button) = self.held.first() {
                event.kind = EventKind::Drag(*button);
            }
            out.push(event);
        }

        let wheel = std::mem::take(&mut self.wheel);
        let hi_res = std::mem::take(&mut self.wheel_hi_res);
        let axis = |i: usize| match hi_res[i] {
            Some(units) => units as f64 / HI_RES_PER_TICK,
            None => wheel[i] as f64,
        };
        let (dx, dy) = (axis(0), axis(1));
        if dx != 0.0 || dy != 0.0 {
            out.push(HardwareEvent::scroll(device, dx, dy));
        }
    }
}

/// Tracks modifier keys across every keyboard
#[derive(Debug, Clone, Default)]
pub struct KeyboardTracker {
    pressed: HashSet<u16>,
    flags: ModifierSet,
}

impl KeyboardTracker {
    /// Create a tracker with nothing held
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one keyboard event; emits `FlagsChanged` when the flags change
    pub fn decode(&mut self, device: DeviceId, event: &InputEvent, out: &mut Vec<HardwareEvent>) {
        let InputEventKind::Key(key) = event.kind() else {
            return;
        };
        if Modifier::from_linux_key(key.code()).is_none() {
            return;
        }

        match event.value() {
            0 => {
                self.pressed.remove(&key.code());
            }
            1 => {
                self.pressed.insert(key.code());
            }
            _ => return,
        }

        let flags = self
            .pressed
            .iter()
            .filter_map(|code| Modifier::from_linux_key(*code))
            .fold(ModifierSet::empty(), |acc, m| acc | m);
        if flags != self.flags {
            self.flags = flags;
            out.push(HardwareEvent::flags(device, flags));
        }
    }

    /// Current keyboard flags
    pub fn flags(&self) -> ModifierSet {
        self.flags
    }
}

struct OpenDevice {
    info: DiscoveredDevice,
    device: Device,
    decoder: FrameDecoder,
}

/// Source reading grabbed evdev pointers and passive keyboards
pub struct EvdevSource {
    devices: Vec<OpenDevice>,
    keyboard: KeyboardTracker,
    removed: Vec<DeviceId>,
    pollfds: Vec<libc::pollfd>,
}

impl EvdevSource {
    /// Open input devices
    ///
    /// With a non-empty `only`, pointers are limited to those paths;
    /// keyboards are always read and never grabbed. Pointers are grabbed
    /// only when `grab` is set.
    pub fn open(only: &[PathBuf], grab: bool) -> Result<Self> {
        let mut devices = Vec::new();
        let mut next_id = 1;

        let mut nodes: Vec<(PathBuf, Device)> = evdev::enumerate().collect();
        nodes.sort_by(|a, b| a.0.cmp(&b.0));

        for (path, mut device) in nodes {
            let Some(role) = role_of(&device) else {
                continue;
            };
            if role == DeviceRole::Pointer && !only.is_empty() && !only.contains(&path) {
                debug!("Skipping {} (not selected)", path.display());
                continue;
            }

            if let Err(e) = set_nonblocking(&device) {
                warn!("Cannot use {}: {}", path.display(), e);
                continue;
            }
            if grab && role == DeviceRole::Pointer {
                if let Err(e) = device.grab() {
                    warn!("Failed to grab {}: {}", path.display(), e);
                    continue;
                }
            }

            let input_id = device.input_id();
            let info = DiscoveredDevice {
                id: DeviceId(next_id),
                path,
                name: device.name().unwrap_or("unnamed").to_string(),
                vendor_id: input_id.vendor(),
                product_id: input_id.product(),
                role,
            };
            next_id += 1;

            info!(
                "{} {} \"{}\" ({:04x}:{:04x}) as {}",
                if grab && role == DeviceRole::Pointer { "Grabbed" } else { "Reading" },
                info.path.display(),
                info.name,
                info.vendor_id,
                info.product_id,
                info.id
            );
            devices.push(OpenDevice {
                info,
                device,
                decoder: FrameDecoder::new(),
            });
        }

        if !devices.iter().any(|d| d.info.role == DeviceRole::Pointer) {
            return Err(PipelineError::Source(
                "no pointing device could be opened or grabbed".to_string(),
            ));
        }

        Ok(Self {
            devices,
            keyboard: KeyboardTracker::new(),
            removed: Vec::new(),
            pollfds: Vec::new(),
        })
    }

    /// Devices opened by this source
    pub fn devices(&self) -> impl Iterator<Item = &DiscoveredDevice> {
        self.devices.iter().map(|d| &d.info)
    }

    fn read_device(&mut self, index: usize, out: &mut Vec<HardwareEvent>) -> bool {
        let open = &mut self.devices[index];
        let id = open.info.id;
        let events = match open.device.fetch_events() {
            Ok(events) => events,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return true,
            Err(e) => {
                warn!("Lost {} ({}): {}", open.info.path.display(), id, e);
                return false;
            }
        };

        match open.info.role {
            DeviceRole::Pointer => {
                for event in events {
                    open.decoder.decode(id, &event, out);
                }
            }
            DeviceRole::Keyboard => {
                for event in events {
                    self.keyboard.decode(id, &event, out);
                }
            }
        }
        true
    }
}

impl EventSource for EvdevSource {
    fn poll(&mut self, timeout: Duration, out: &mut Vec<HardwareEvent>) -> Result<()> {
        self.pollfds.clear();
        self.pollfds.extend(self.devices.iter().map(|d| libc::pollfd {
            fd: d.device.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        }));

        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        // SAFETY: pollfds is a valid array of nfds initialized pollfd structs
        let ready = unsafe {
            libc::poll(
                self.pollfds.as_mut_ptr(),
                self.pollfds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        if ready < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err.into());
        }
        if ready == 0 {
            return Ok(());
        }

        let mut lost = Vec::new();
        for index in 0..self.devices.len() {
            let revents = self.pollfds[index].revents;
            if revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
                lost.push(index);
            } else if revents & libc::POLLIN != 0 && !self.read_device(index, out) {
                lost.push(index);
            }
        }

        for index in lost.into_iter().rev() {
            let open = self.devices.remove(index);
            info!("{} removed", open.info.id);
            self.removed.push(open.info.id);
        }
        Ok(())
    }

    fn take_removed(&mut self, out: &mut Vec<DeviceId>) {
        out.append(&mut self.removed);
    }

    fn release(&mut self) {
        for open in &mut self.devices {
            if open.info.role == DeviceRole::Pointer {
                if let Err(e) = open.device.ungrab() {
                    debug!("Ungrab of {} failed: {}", open.info.path.display(), e);
                }
            }
        }
        info!("Released {} input devices", self.devices.len());
        self.devices.clear();
    }
}

impl std::fmt::Debug for EvdevSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvdevSource")
            .field("devices", &self.devices.iter().map(|d| &d.info).collect::<Vec<_>>())
            .field("keyboard", &self.keyboard.flags())
            .finish()
    }
}

/// Role a device would play, if any
fn role_of(device: &Device) -> Option<DeviceRole> {
    let relative = device.supported_relative_axes().is_some_and(|axes| {
        axes.contains(RelativeAxisType::REL_X) && axes.contains(RelativeAxisType::REL_Y)
    });
    let keys = device.supported_keys();
    let buttons = keys.is_some_and(|k| k.contains(Key::BTN_LEFT));

    if relative && buttons {
        return Some(DeviceRole::Pointer);
    }
    let keyboard = keys.is_some_and(|k| k.contains(Key::KEY_LEFTSHIFT) && k.contains(Key::KEY_A));
    keyboard.then_some(DeviceRole::Keyboard)
}

fn set_nonblocking(device: &Device) -> std::io::Result<()> {
    let fd = device.as_raw_fd();

    // SAFETY: fd is owned by `device` and stays open for the duration
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: as above
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Paths of readable event nodes, for diagnostics
pub fn event_nodes(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut nodes: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("event"))
        })
        .collect();
    nodes.sort();
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use evdev::EventType;

    const MOUSE: DeviceId = DeviceId(3);

    fn rel(axis: RelativeAxisType, value: i32) -> InputEvent {
        InputEvent::new(EventType::RELATIVE, axis.0, value)
    }

    fn key(key: Key, value: i32) -> InputEvent {
        InputEvent::new(EventType::KEY, key.code(), value)
    }

    fn syn() -> InputEvent {
        InputEvent::new(EventType::SYNCHRONIZATION, Synchronization::SYN_REPORT.0, 0)
    }

    fn decode(decoder: &mut FrameDecoder, events: &[InputEvent]) -> Vec<HardwareEvent> {
        let mut out = Vec::new();
        for event in events {
            decoder.decode(MOUSE, event, &mut out);
        }
        out
    }

    #[test]
    fn test_motion_summed_per_frame() {
        let mut decoder = FrameDecoder::new();
        let out = decode(
            &mut decoder,
            &[rel(RelativeAxisType::REL_X, 3), rel(RelativeAxisType::REL_Y, -1), rel(RelativeAxisType::REL_X, 2), syn()],
        );
        assert_eq!(out, vec![HardwareEvent::motion(MOUSE, 5.0, -1.0)]);
    }

    #[test]
    fn test_hi_res_wheel_preferred() {
        let mut decoder = FrameDecoder::new();
        let out = decode(
            &mut decoder,
            &[
                rel(RelativeAxisType::REL_WHEEL_HI_RES, 60),
                rel(RelativeAxisType::REL_WHEEL, 1),
                syn(),
                rel(RelativeAxisType::REL_HWHEEL, -1),
                syn(),
            ],
        );
        assert_eq!(
            out,
            vec![
                HardwareEvent::scroll(MOUSE, 0.0, 0.5),
                HardwareEvent::scroll(MOUSE, -1.0, 0.0),
            ]
        );
    }

    #[test]
    fn test_buttons_and_drag() {
        let mut decoder = FrameDecoder::new();
        let out = decode(
            &mut decoder,
            &[
                key(Key::BTN_MIDDLE, 1),
                syn(),
                rel(RelativeAxisType::REL_Y, 4),
                syn(),
                key(Key::BTN_MIDDLE, 0),
                syn(),
            ],
        );

        assert_eq!(out.len(), 3);
        assert_eq!(out[0], HardwareEvent::button(MOUSE, MouseButton::Middle, true));
        assert_eq!(out[1].kind, EventKind::Drag(MouseButton::Middle));
        assert_eq!(out[2], HardwareEvent::button(MOUSE, MouseButton::Middle, false));
        assert!(decoder.held().is_empty());
    }

    #[test]
    fn test_dropped_frame_discarded() {
        let mut decoder = FrameDecoder::new();
        let dropped = InputEvent::new(
            EventType::SYNCHRONIZATION,
            Synchronization::SYN_DROPPED.0,
            0,
        );
        let out = decode(&mut decoder, &[rel(RelativeAxisType::REL_X, 9), dropped, syn()]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_keyboard_modifiers() {
        let mut tracker = KeyboardTracker::new();
        let kbd = DeviceId(10);
        let mut out = Vec::new();

        for event in [
            key(Key::KEY_LEFTSHIFT, 1),
            key(Key::KEY_RIGHTSHIFT, 1),
            key(Key::KEY_A, 1),
            key(Key::KEY_LEFTSHIFT, 2),
            key(Key::KEY_LEFTSHIFT, 0),
            key(Key::KEY_RIGHTSHIFT, 0),
        ] {
            tracker.decode(kbd, &event, &mut out);
        }

        assert_eq!(
            out,
            vec![
                HardwareEvent::flags(kbd, Modifier::Shift.into()),
                HardwareEvent::flags(kbd, ModifierSet::empty()),
            ]
        );
    }

    #[test]
    fn test_class_hint() {
        let mut device = DiscoveredDevice {
            id: DeviceId(1),
            path: PathBuf::from("/dev/input/event4"),
            name: "Logitech USB Receiver".to_string(),
            vendor_id: 0x046d,
            product_id: 0xc52b,
            role: DeviceRole::Pointer,
        };
        assert_eq!(device.class_hint(), DeviceClass::Mouse);
        device.name = "SynPS/2 Synaptics TouchPad".to_string();
        assert_eq!(device.class_hint(), DeviceClass::Trackpad);
    }
}
