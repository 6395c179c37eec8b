//! Output payload rendering
//!
//! Turns a transformed value (and/or the rule's fixed bytes) into the byte
//! payload handed to a transport.
//!
//! | format  | payload                                                     |
//! |---------|-------------------------------------------------------------|
//! | Raw     | fixed payload, else minimal big-endian two's complement     |
//! | Hex     | uppercase hex digits, `-` prefix for negative values        |
//! | Decimal | decimal digits, `-` prefix for negative values              |
//! | Ascii   | fixed payload as characters, else the value as one char     |
//! | Custom  | template with the first `{}` or `%d` replaced by the value  |
//!
//! CAN payloads are cut to `can_dlc`, serial payloads to the serial limit.

use crate::mapping::mapping_types::{MappingRule, OutputFormat, OutputType, MAX_FIXED_PAYLOAD};
use crate::mapping::transform::clamp_to_width;

const PLACEHOLDERS: [&str; 2] = ["{}", "%d"];

/// Renders the payload for `rule` carrying `value`
pub fn format_payload(rule: &MappingRule, value: i32, serial_limit: usize) -> Vec<u8> {
    let mut payload = match rule.output_format {
        OutputFormat::Raw => raw(rule, value),
        OutputFormat::Hex => hex(value).into_bytes(),
        OutputFormat::Decimal => value.to_string().into_bytes(),
        OutputFormat::Ascii => ascii(rule, value),
        OutputFormat::Custom => custom(&rule.format_template, value).into_bytes(),
    };

    let limit = transport_limit(rule, serial_limit);
    payload.truncate(limit);
    payload
}

/// Largest payload the rule's transport accepts
pub fn transport_limit(rule: &MappingRule, serial_limit: usize) -> usize {
    match rule.output_type() {
        OutputType::CanBus => (rule.can_dlc as usize).min(MAX_FIXED_PAYLOAD),
        OutputType::Serial => serial_limit,
    }
}

fn raw(rule: &MappingRule, value: i32) -> Vec<u8> {
    if !rule.fixed_payload.is_empty() {
        return rule.fixed_payload.clone();
    }

    // a CAN frame narrower than the value gets the clamped value, not its top bytes
    let max_width = match rule.output_type() {
        OutputType::CanBus => (rule.can_dlc as usize).min(4),
        OutputType::Serial => 4,
    };
    if max_width == 0 {
        return Vec::new();
    }

    let value = clamp_to_width(value, max_width);
    let width = minimal_width(value);
    value.to_be_bytes()[4 - width..].to_vec()
}

/// Fewest bytes holding `value` in two's complement
pub fn minimal_width(value: i32) -> usize {
    if (i8::MIN as i32..=i8::MAX as i32).contains(&value) {
        1
    } else if (i16::MIN as i32..=i16::MAX as i32).contains(&value) {
        2
    } else if (-(1 << 23)..(1 << 23)).contains(&value) {
        3
    } else {
        4
    }
}

fn hex(value: i32) -> String {
    if value < 0 {
        format!("-{:X}", value.unsigned_abs())
    } else {
        format!("{:X}", value)
    }
}

fn ascii(rule: &MappingRule, value: i32) -> Vec<u8> {
    if !rule.fixed_payload.is_empty() {
        return rule.fixed_payload.clone();
    }
    match u8::try_from(value) {
        Ok(byte) if byte.is_ascii() => vec![byte],
        _ => Vec::new(),
    }
}

fn custom(template: &str, value: i32) -> String {
    let first = PLACEHOLDERS
        .iter()
        .filter_map(|marker| template.find(marker).map(|pos| (pos, marker.len())))
        .min_by_key(|(pos, _)| *pos);

    match first {
        Some((pos, len)) => {
            let mut out = String::with_capacity(template.len() + 11);
            out.push_str(&template[..pos]);
            out.push_str(&value.to_string());
            out.push_str(&template[pos + len..]);
            out
        }
        None => template.to_string(),
    }
}
