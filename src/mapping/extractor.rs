//! Raw value extraction from typed input events
//!
//! Pattern-matches `(payload, input_type)` pairs. A pair that does not belong
//! together, or an `input_index` that points outside the report, yields `None`
//! and the rule is skipped for this event.

use crate::controller::event::{EventPayload, InputEvent};
use crate::mapping::mapping_types::InputType;

/// Extracts the raw value a rule observes from an event
pub fn extract(event: &InputEvent, input_type: InputType, input_index: u8) -> Option<i32> {
    match (&event.payload, input_type) {
        (EventPayload::Keyboard(kb), InputType::KeyboardKey) => {
            Some(kb.is_pressed(input_index) as i32)
        }
        (EventPayload::Keyboard(kb), InputType::KeyboardModifier) => {
            bit(kb.modifier as u32, input_index, 8)
        }

        (EventPayload::Mouse(mouse), InputType::MouseButton) => {
            bit(mouse.buttons as u32, input_index, 8)
        }
        (EventPayload::Mouse(mouse), InputType::MouseMoveX) => Some(mouse.x as i32),
        (EventPayload::Mouse(mouse), InputType::MouseMoveY) => Some(mouse.y as i32),
        (EventPayload::Mouse(mouse), InputType::MouseWheel) => Some(mouse.wheel as i32),

        (EventPayload::Gamepad(pad), InputType::GamepadButton) => {
            bit(pad.buttons, input_index, 32)
        }
        (EventPayload::Gamepad(pad), InputType::GamepadAxis) => pad
            .axes()
            .get(input_index as usize)
            .map(|axis| *axis as i32),
        (EventPayload::Gamepad(pad), InputType::GamepadHat) => Some(pad.hat as i32),

        (EventPayload::Generic(report), InputType::GenericReport) => report
            .payload()
            .get(input_index as usize)
            .map(|byte| *byte as i32),

        _ => None,
    }
}

/// Whether rules of `input_type` observe this payload category at all
pub fn accepts(payload: &EventPayload, input_type: InputType) -> bool {
    matches!(
        (payload, input_type),
        (
            EventPayload::Keyboard(_),
            InputType::KeyboardKey | InputType::KeyboardModifier
        ) | (
            EventPayload::Mouse(_),
            InputType::MouseButton
                | InputType::MouseMoveX
                | InputType::MouseMoveY
                | InputType::MouseWheel
        ) | (
            EventPayload::Gamepad(_),
            InputType::GamepadButton | InputType::GamepadAxis | InputType::GamepadHat
        ) | (EventPayload::Generic(_), InputType::GenericReport)
    )
}

// Single bit of a field that is `width` bits wide
fn bit(field: u32, index: u8, width: u8) -> Option<i32> {
    if index >= width {
        return None;
    }
    Some(((field >> index) & 1) as i32)
}
