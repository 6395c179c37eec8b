//! Typed HID events as delivered by the host driver
//!
//! The host driver owns enumeration and report parsing. It hands the engine one
//! [`InputEvent`] per report, already split into the fixed shape of its device
//! category.

use serde::{Deserialize, Serialize};

/// Maximum number of HID devices connected at the same time
pub const MAX_HID_DEVICES: usize = 8;

/// Maximum number of simultaneously pressed keys in a boot keyboard report
pub const MAX_PRESSED_KEYS: usize = 6;

/// Maximum payload carried by a generic report
pub const MAX_GENERIC_REPORT: usize = 64;

// Device category reported by the host driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeviceType {
    #[default]
    Unknown,
    Keyboard,
    Mouse,
    Gamepad,
    Joystick,
    Generic,
}

// Boot keyboard report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyboardReport {
    pub modifier: u8,
    pub keys: [u8; MAX_PRESSED_KEYS],
}

impl KeyboardReport {
    pub fn new(modifier: u8, pressed: &[u8]) -> Self {
        let mut keys = [0u8; MAX_PRESSED_KEYS];
        for (slot, code) in keys.iter_mut().zip(pressed) {
            *slot = *code;
        }
        Self { modifier, keys }
    }

    /// Key code 0 marks an empty slot and is never reported as pressed
    pub fn is_pressed(&self, code: u8) -> bool {
        code != 0 && self.keys.contains(&code)
    }
}

// Mouse report, axes are relative movements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MouseReport {
    pub buttons: u8,
    pub x: i8,
    pub y: i8,
    pub wheel: i8,
    pub pan: i8,
}

// Gamepad / joystick report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GamepadReport {
    /// Up to 32 buttons, bit n = button n
    pub buttons: u32,
    pub x: i8,
    pub y: i8,
    pub z: i8,
    pub rx: i8,
    pub ry: i8,
    pub rz: i8,
    pub slider1: i8,
    pub slider2: i8,
    pub hat: u8,
}

impl GamepadReport {
    /// Axes in the fixed order used by `GamepadAxis` mappings
    pub fn axes(&self) -> [i8; 8] {
        [
            self.x,
            self.y,
            self.z,
            self.rx,
            self.ry,
            self.rz,
            self.slider1,
            self.slider2,
        ]
    }
}

// Vendor specific report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericReport {
    pub report_id: u16,
    pub report_size: u16,
    pub data: [u8; MAX_GENERIC_REPORT],
}

impl GenericReport {
    pub fn new(report_id: u16, bytes: &[u8]) -> Self {
        let len = bytes.len().min(MAX_GENERIC_REPORT);
        let mut data = [0u8; MAX_GENERIC_REPORT];
        data[..len].copy_from_slice(&bytes[..len]);
        Self {
            report_id,
            report_size: len as u16,
            data,
        }
    }

    /// Bytes actually carried by the report
    pub fn payload(&self) -> &[u8] {
        let len = (self.report_size as usize).min(MAX_GENERIC_REPORT);
        &self.data[..len]
    }
}

/// Report payload, one variant per device category
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    Keyboard(KeyboardReport),
    Mouse(MouseReport),
    Gamepad(GamepadReport),
    Generic(GenericReport),
}

/// One input event from a connected device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    pub device_idx: u8,
    pub device_type: DeviceType,
    pub payload: EventPayload,
}

impl InputEvent {
    pub fn keyboard(device_idx: u8, report: KeyboardReport) -> Self {
        Self {
            device_idx,
            device_type: DeviceType::Keyboard,
            payload: EventPayload::Keyboard(report),
        }
    }

    pub fn mouse(device_idx: u8, report: MouseReport) -> Self {
        Self {
            device_idx,
            device_type: DeviceType::Mouse,
            payload: EventPayload::Mouse(report),
        }
    }

    pub fn gamepad(device_idx: u8, report: GamepadReport) -> Self {
        Self {
            device_idx,
            device_type: DeviceType::Gamepad,
            payload: EventPayload::Gamepad(report),
        }
    }

    pub fn generic(device_idx: u8, report: GenericReport) -> Self {
        Self {
            device_idx,
            device_type: DeviceType::Generic,
            payload: EventPayload::Generic(report),
        }
    }
}

/// Everything a host driver reports to the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Connected { device_idx: u8, device_type: DeviceType },
    Disconnected { device_idx: u8 },
    Input(InputEvent),
}

impl From<InputEvent> for HostEvent {
    fn from(event: InputEvent) -> Self {
        HostEvent::Input(event)
    }
}
