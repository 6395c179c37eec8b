//! HID input to serial and CAN output bridge
//!
//! Operators configure mapping rules ("when this input on this device meets
//! this condition, send this value in this format on this port, no faster than
//! this"). [`mapping::MappingEngine`] evaluates them for every input event.

pub mod config;
pub mod controller;
pub mod mapping;
pub mod output;
pub mod persistence;
