//! gilrs-backed gamepad source
//!
//! Keeps one [`GamepadReport`] per connected pad, applies every gilrs event to
//! it and forwards the full report snapshot as an [`InputEvent`]. Pads get the
//! lowest free device index on connect and give it back on disconnect.

use crate::controller::event::{
    DeviceType, GamepadReport, HostEvent, InputEvent, MAX_HID_DEVICES,
};
use gilrs::{Axis, Button, Event, EventType, GamepadId, Gilrs};
use statum::{machine, state};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Hat value when no direction is held
pub const HAT_NEUTRAL: u8 = 8;

#[derive(Clone, Debug)]
pub struct CollectorSettings {
    pub joystick_deadzone: f32,
    /// How long one poll waits for a gilrs event
    pub poll_timeout_ms: u64,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            joystick_deadzone: 0.05,
            poll_timeout_ms: 50,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize collector: {0}")]
    InitializationError(String),

    #[error("Failed to send event: {0}")]
    EventSendError(String),
}

#[derive(Debug, Clone, Copy, Default)]
struct DPad {
    up: bool,
    down: bool,
    left: bool,
    right: bool,
}

#[derive(Debug, Clone)]
struct PadState {
    device_idx: u8,
    report: GamepadReport,
    dpad: DPad,
}

#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
pub struct GamepadCollector<S: CollectionState> {
    gilrs: Gilrs,
    settings: CollectorSettings,
    event_sender: mpsc::Sender<HostEvent>,
    pads: HashMap<GamepadId, PadState>,
}

impl GamepadCollector<Initializing> {
    pub fn create(
        settings: Option<CollectorSettings>,
        event_sender: mpsc::Sender<HostEvent>,
    ) -> Result<Self, CollectorError> {
        let settings = settings.unwrap_or_default();
        info!("Initializing gilrs gamepad interface");
        let gilrs = Gilrs::new().map_err(|e| {
            error!("Failed to initialize gilrs: {}", e);
            CollectorError::InitializationError(e.to_string())
        })?;

        Ok(Self::new(gilrs, settings, event_sender, HashMap::new()))
    }

    /// Registers already connected pads and starts collecting
    pub fn initialize(mut self) -> Result<GamepadCollector<Collecting>, CollectorError> {
        let ids: Vec<GamepadId> = self.gilrs.gamepads().map(|(id, _)| id).collect();
        if ids.is_empty() {
            warn!("No gamepad connected, waiting for one");
        }
        for id in ids {
            self.connect(id)?;
        }
        Ok(self.transition())
    }
}

impl<S: CollectionState> GamepadCollector<S> {
    fn connect(&mut self, id: GamepadId) -> Result<(), CollectorError> {
        if self.pads.contains_key(&id) {
            return Ok(());
        }
        let Some(device_idx) = lowest_free_index(self.pads.values().map(|pad| pad.device_idx))
        else {
            warn!("Gamepad {} ignored, all {} device slots in use", id, MAX_HID_DEVICES);
            return Ok(());
        };

        info!(
            "Gamepad {} ({}) connected as device {}",
            id,
            self.gilrs.gamepad(id).name(),
            device_idx
        );
        self.pads.insert(
            id,
            PadState {
                device_idx,
                report: GamepadReport {
                    hat: HAT_NEUTRAL,
                    ..GamepadReport::default()
                },
                dpad: DPad::default(),
            },
        );
        self.send(HostEvent::Connected {
            device_idx,
            device_type: DeviceType::Gamepad,
        })
    }

    fn send(&self, event: HostEvent) -> Result<(), CollectorError> {
        self.event_sender.try_send(event).map_err(|e| {
            if matches!(e, mpsc::error::TrySendError::Full(_)) {
                warn!("Event queue full, gamepad event dropped");
            }
            CollectorError::EventSendError(e.to_string())
        })
    }
}

impl GamepadCollector<Collecting> {
    /// Waits up to the poll timeout for one gilrs event and forwards it
    pub fn collect_next_event(&mut self) -> Result<(), CollectorError> {
        let timeout = Duration::from_millis(self.settings.poll_timeout_ms);
        let Some(Event { id, event, .. }) = self.gilrs.next_event_blocking(Some(timeout)) else {
            return Ok(());
        };

        match event {
            EventType::Connected => self.connect(id),
            EventType::Disconnected => match self.pads.remove(&id) {
                Some(pad) => {
                    info!("Gamepad {} disconnected (device {})", id, pad.device_idx);
                    self.send(HostEvent::Disconnected {
                        device_idx: pad.device_idx,
                    })
                }
                None => Ok(()),
            },
            other => {
                let deadzone = self.settings.joystick_deadzone;
                let Some(pad) = self.pads.get_mut(&id) else {
                    debug!("Event from unregistered gamepad {}", id);
                    return Ok(());
                };
                if !apply_event(pad, other, deadzone) {
                    return Ok(());
                }
                let event = InputEvent::gamepad(pad.device_idx, pad.report);
                self.send(HostEvent::Input(event))
            }
        }
    }

    /// Collects until the event channel closes
    pub fn run_collection_loop(&mut self) {
        info!("Starting gamepad collection loop");
        while !self.event_sender.is_closed() {
            if let Err(e) = self.collect_next_event() {
                debug!("Gamepad event not delivered: {}", e);
            }
        }
        info!("Event channel closed, gamepad collection stopped");
    }
}

/// Runs a [`GamepadCollector`] on tokio's blocking pool
pub struct CollectorHandle {
    task_handle: JoinHandle<()>,
}

impl CollectorHandle {
    pub fn spawn(settings: Option<CollectorSettings>, event_sender: mpsc::Sender<HostEvent>) -> Self {
        let task_handle = tokio::task::spawn_blocking(move || {
            let mut collector = match GamepadCollector::create(settings, event_sender)
                .and_then(GamepadCollector::initialize)
            {
                Ok(collector) => collector,
                Err(e) => {
                    error!("Gamepad collector not started: {}", e);
                    return;
                }
            };
            collector.run_collection_loop();
        });
        Self { task_handle }
    }

    pub fn is_finished(&self) -> bool {
        self.task_handle.is_finished()
    }
}

// Applies one gilrs event to the report, returns whether anything changed
fn apply_event(pad: &mut PadState, event: EventType, deadzone: f32) -> bool {
    let before = pad.report;

    match event {
        EventType::AxisChanged(axis, value, _) => {
            let value = scale_axis(apply_deadzone(value, deadzone));
            match axis {
                Axis::LeftStickX => pad.report.x = value,
                Axis::LeftStickY => pad.report.y = value,
                Axis::LeftZ => pad.report.z = value,
                Axis::RightStickX => pad.report.rx = value,
                Axis::RightStickY => pad.report.ry = value,
                Axis::RightZ => pad.report.rz = value,
                _ => return false,
            }
        }
        EventType::ButtonChanged(Button::LeftTrigger2, value, _) => {
            pad.report.slider1 = scale_axis(value)
        }
        EventType::ButtonChanged(Button::RightTrigger2, value, _) => {
            pad.report.slider2 = scale_axis(value)
        }
        EventType::ButtonPressed(button, _) => set_button(pad, button, true),
        EventType::ButtonReleased(button, _) => set_button(pad, button, false),
        _ => return false,
    }

    pad.report != before
}

fn set_button(pad: &mut PadState, button: Button, pressed: bool) {
    match button {
        Button::DPadUp => pad.dpad.up = pressed,
        Button::DPadDown => pad.dpad.down = pressed,
        Button::DPadLeft => pad.dpad.left = pressed,
        Button::DPadRight => pad.dpad.right = pressed,
        _ => {}
    }
    pad.report.hat = hat_value(pad.dpad);

    if let Some(bit) = button_bit(button) {
        if pressed {
            pad.report.buttons |= 1 << bit;
        } else {
            pad.report.buttons &= !(1 << bit);
        }
    }
}

/// Bit of a gilrs button in the 32-bit button field
pub fn button_bit(button: Button) -> Option<u8> {
    let bit = match button {
        Button::South => 0,
        Button::East => 1,
        Button::North => 2,
        Button::West => 3,
        Button::LeftTrigger => 4,
        Button::RightTrigger => 5,
        Button::LeftTrigger2 => 6,
        Button::RightTrigger2 => 7,
        Button::Select => 8,
        Button::Start => 9,
        Button::Mode => 10,
        Button::LeftThumb => 11,
        Button::RightThumb => 12,
        Button::DPadUp => 13,
        Button::DPadDown => 14,
        Button::DPadLeft => 15,
        Button::DPadRight => 16,
        Button::C => 17,
        Button::Z => 18,
        _ => return None,
    };
    Some(bit)
}

// HID hat switch: 0 = up, clockwise in 45° steps, 8 = neutral
fn hat_value(dpad: DPad) -> u8 {
    match (dpad.up, dpad.right, dpad.down, dpad.left) {
        (true, false, false, false) => 0,
        (true, true, false, false) => 1,
        (false, true, false, false) => 2,
        (false, true, true, false) => 3,
        (false, false, true, false) => 4,
        (false, false, true, true) => 5,
        (false, false, false, true) => 6,
        (true, false, false, true) => 7,
        _ => HAT_NEUTRAL,
    }
}

fn scale_axis(value: f32) -> i8 {
    (value * 127.0).round().clamp(-127.0, 127.0) as i8
}

fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        0.0
    } else {
        let sign = if value < 0.0 { -1.0 } else { 1.0 };
        sign * (value.abs() - deadzone) / (1.0 - deadzone)
    }
}

fn lowest_free_index(used: impl Iterator<Item = u8>) -> Option<u8> {
    let mut taken = [false; MAX_HID_DEVICES];
    for idx in used {
        if let Some(slot) = taken.get_mut(idx as usize) {
            *slot = true;
        }
    }
    taken.iter().position(|t| !t).map(|idx| idx as u8)
}
