//! Input side of the bridge
//!
//! 1. [`event`] - typed HID events and host notifications
//! 2. [`event_pump`] - hands events to the mapping engine
//! 3. `gamepad` (feature `gamepad`) - gilrs event source
//!
//! # Architecture
//!
//! ```text
//! Host driver ──► HostEvent ──► EventPump ──► MappingEngine
//!  (gilrs, ...)    (mpsc)      (Running)     (blocking pool)
//! ```

pub mod event;
pub mod event_pump;
#[cfg(feature = "gamepad")]
pub mod gamepad;

pub use event::{
    DeviceType, EventPayload, GamepadReport, GenericReport, HostEvent, InputEvent,
    KeyboardReport, MouseReport,
};
pub use event_pump::{EventPump, EventPumpHandle, PumpError};
