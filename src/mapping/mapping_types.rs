//! Rule data types for the mapping engine
//!
//! A [`MappingRule`] is one configured input → condition → transform → output
//! record. Every enum carries a stable `u8` discriminant because rules are
//! persisted in a fixed binary layout (see `persistence::codec`).

use crate::controller::event::MAX_HID_DEVICES;
use crate::mapping::MappingError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Maximum number of mappings a single device may own
pub const MAX_MAPPINGS_PER_DEVICE: usize = 16;

/// Total table capacity across all devices
pub const MAX_MAPPINGS: usize = MAX_HID_DEVICES * MAX_MAPPINGS_PER_DEVICE;

/// Maximum length of a custom format template in bytes
pub const MAX_TEMPLATE_LEN: usize = 32;

/// Maximum length of the fixed payload and of a CAN frame
pub const MAX_FIXED_PAYLOAD: usize = 8;

/// Largest standard (11-bit) CAN identifier
pub const CAN_STD_ID_MAX: u32 = 0x7FF;

/// Largest extended (29-bit) CAN identifier
pub const CAN_EXT_ID_MAX: u32 = 0x1FFF_FFFF;

/// HID input categories a rule can observe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, IntoPrimitive, TryFromPrimitive
)]
#[repr(u8)]
pub enum InputType {
    KeyboardKey = 0,
    KeyboardModifier = 1,
    MouseButton = 2,
    MouseMoveX = 3,
    MouseMoveY = 4,
    MouseWheel = 5,
    GamepadButton = 6,
    GamepadAxis = 7,
    GamepadHat = 8,
    GenericReport = 9,
}

/// Condition kinds evaluated against the extracted raw value
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, IntoPrimitive, TryFromPrimitive
)]
#[repr(u8)]
pub enum ConditionKind {
    Equals = 0,
    NotEquals = 1,
    GreaterThan = 2,
    LessThan = 3,
    Changed = 4,
    Always = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub kind: ConditionKind,
    #[serde(default)]
    pub value: i32,
}

impl Condition {
    pub const fn always() -> Self {
        Self {
            kind: ConditionKind::Always,
            value: 0,
        }
    }

    pub const fn new(kind: ConditionKind, value: i32) -> Self {
        Self { kind, value }
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::always()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, IntoPrimitive, TryFromPrimitive
)]
#[repr(u8)]
pub enum OutputType {
    Serial = 0,
    CanBus = 1,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, IntoPrimitive, TryFromPrimitive
)]
#[repr(u8)]
pub enum Parity {
    None = 0,
    Odd = 1,
    Even = 2,
}

// no `#[default]` on these enums: num_enum would turn it into a catch-all for unknown bytes
impl Default for Parity {
    fn default() -> Self {
        Parity::None
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, IntoPrimitive, TryFromPrimitive
)]
#[repr(u8)]
pub enum FlowControl {
    None = 0,
    RtsCts = 1,
    XonXoff = 2,
}

impl Default for FlowControl {
    fn default() -> Self {
        FlowControl::None
    }
}

/// Serial port parameters of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    pub port: u8,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default)]
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: 0,
            baud_rate: 115_200,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

/// CAN bus parameters of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanConfig {
    pub port: u8,
    pub bitrate: u32,
    #[serde(default)]
    pub extended_id: bool,
}

impl Default for CanConfig {
    fn default() -> Self {
        Self {
            port: 0,
            bitrate: 500_000,
            extended_id: false,
        }
    }
}

/// Transport selection; exactly one variant is active per rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutputConfig {
    Serial(SerialConfig),
    CanBus(CanConfig),
}

impl OutputConfig {
    pub fn output_type(&self) -> OutputType {
        match self {
            OutputConfig::Serial(_) => OutputType::Serial,
            OutputConfig::CanBus(_) => OutputType::CanBus,
        }
    }

    pub fn port(&self) -> u8 {
        match self {
            OutputConfig::Serial(cfg) => cfg.port,
            OutputConfig::CanBus(cfg) => cfg.port,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig::Serial(SerialConfig::default())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, IntoPrimitive, TryFromPrimitive
)]
#[repr(u8)]
pub enum OutputFormat {
    Raw = 0,
    Hex = 1,
    Decimal = 2,
    Ascii = 3,
    Custom = 4,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Raw
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Raw => write!(f, "raw"),
            OutputFormat::Hex => write!(f, "hex"),
            OutputFormat::Decimal => write!(f, "decimal"),
            OutputFormat::Ascii => write!(f, "ascii"),
            OutputFormat::Custom => write!(f, "custom"),
        }
    }
}

fn default_scale() -> i32 {
    100
}

fn default_enabled() -> bool {
    true
}

/// One configured transformation from an input to an output
///
/// `last_output_time` and `last_input_value` are runtime state owned by the
/// engine. They are never serialized and start out unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRule {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub device_idx: u8,
    pub input_type: InputType,
    #[serde(default)]
    pub input_index: u8,
    #[serde(default)]
    pub condition: Condition,
    pub output: OutputConfig,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub format_template: String,
    #[serde(default)]
    pub can_id: u32,
    #[serde(default)]
    pub can_dlc: u8,
    #[serde(default)]
    pub fixed_payload: Vec<u8>,
    /// Fixed point with two implied decimals, 100 = x1.00
    #[serde(default = "default_scale")]
    pub scale_factor: i32,
    #[serde(default)]
    pub offset: i32,
    #[serde(default)]
    pub min_interval_ms: u32,

    #[serde(skip)]
    pub last_output_time: Option<Instant>,
    #[serde(skip)]
    pub last_input_value: Option<i32>,
}

impl MappingRule {
    /// Creates an enabled rule with identity transform and an `Always` condition
    pub fn new(device_idx: u8, input_type: InputType, input_index: u8, output: OutputConfig) -> Self {
        Self {
            enabled: true,
            device_idx,
            input_type,
            input_index,
            condition: Condition::always(),
            output,
            output_format: OutputFormat::Raw,
            format_template: String::new(),
            can_id: 0,
            can_dlc: 0,
            fixed_payload: Vec::new(),
            scale_factor: 100,
            offset: 0,
            min_interval_ms: 0,
            last_output_time: None,
            last_input_value: None,
        }
    }

    pub fn output_type(&self) -> OutputType {
        self.output.output_type()
    }

    /// Clears `last_output_time` and `last_input_value`
    pub fn reset_runtime(&mut self) {
        self.last_output_time = None;
        self.last_input_value = None;
    }

    /// Copies runtime state from a previous version of the same rule
    pub(crate) fn inherit_runtime(&mut self, previous: &MappingRule) {
        self.last_output_time = previous.last_output_time;
        self.last_input_value = previous.last_input_value;
    }

    /// Equality over persisted fields only
    pub fn same_config(&self, other: &MappingRule) -> bool {
        let mut a = self.clone();
        let mut b = other.clone();
        a.reset_runtime();
        b.reset_runtime();
        a == b
    }

    /// Checks every field that the type system cannot constrain
    pub fn validate(&self) -> Result<(), MappingError> {
        if self.device_idx as usize >= MAX_HID_DEVICES {
            return Err(MappingError::invalid(format!(
                "device_idx {} exceeds {} devices",
                self.device_idx, MAX_HID_DEVICES
            )));
        }
        if self.can_dlc as usize > MAX_FIXED_PAYLOAD {
            return Err(MappingError::invalid(format!(
                "can_dlc {} exceeds {}",
                self.can_dlc, MAX_FIXED_PAYLOAD
            )));
        }
        if self.format_template.len() > MAX_TEMPLATE_LEN {
            return Err(MappingError::invalid(format!(
                "format template is {} bytes, limit is {}",
                self.format_template.len(),
                MAX_TEMPLATE_LEN
            )));
        }
        if self.fixed_payload.len() > MAX_FIXED_PAYLOAD {
            return Err(MappingError::invalid(format!(
                "fixed payload is {} bytes, limit is {}",
                self.fixed_payload.len(),
                MAX_FIXED_PAYLOAD
            )));
        }

        match &self.output {
            OutputConfig::Serial(cfg) => {
                if !(5..=8).contains(&cfg.data_bits) {
                    return Err(MappingError::invalid(format!(
                        "serial data bits {} not in 5..=8",
                        cfg.data_bits
                    )));
                }
                if !(1..=2).contains(&cfg.stop_bits) {
                    return Err(MappingError::invalid(format!(
                        "serial stop bits {} not in 1..=2",
                        cfg.stop_bits
                    )));
                }
                if cfg.baud_rate == 0 {
                    return Err(MappingError::invalid("serial baud rate is zero"));
                }
            }
            OutputConfig::CanBus(cfg) => {
                let max_id = if cfg.extended_id {
                    CAN_EXT_ID_MAX
                } else {
                    CAN_STD_ID_MAX
                };
                if self.can_id > max_id {
                    return Err(MappingError::invalid(format!(
                        "can_id {:#X} exceeds {:#X}",
                        self.can_id, max_id
                    )));
                }
                if cfg.bitrate == 0 {
                    return Err(MappingError::invalid("CAN bitrate is zero"));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn can_rule() -> MappingRule {
        let mut rule = MappingRule::new(
            0,
            InputType::MouseMoveX,
            0,
            OutputConfig::CanBus(CanConfig::default()),
        );
        rule.can_id = 0x100;
        rule.can_dlc = 1;
        rule
    }

    #[test]
    fn enum_discriminants_round_trip() {
        for raw in 0u8..10 {
            let input = InputType::try_from(raw).unwrap();
            assert_eq!(u8::from(input), raw);
        }
        for raw in 0u8..6 {
            assert_eq!(u8::from(ConditionKind::try_from(raw).unwrap()), raw);
        }
        for raw in 0u8..5 {
            assert_eq!(u8::from(OutputFormat::try_from(raw).unwrap()), raw);
        }
        for raw in 0u8..3 {
            assert_eq!(u8::from(Parity::try_from(raw).unwrap()), raw);
            assert_eq!(u8::from(FlowControl::try_from(raw).unwrap()), raw);
        }
        assert_eq!(u8::from(OutputType::CanBus), 1);
    }

    #[test]
    fn unknown_discriminants_are_rejected() {
        assert!(InputType::try_from(10).is_err());
        assert!(ConditionKind::try_from(6).is_err());
        assert!(OutputType::try_from(2).is_err());
        assert!(Parity::try_from(3).is_err());
        assert!(FlowControl::try_from(0xFF).is_err());
        assert!(OutputFormat::try_from(5).is_err());

        let err = MappingError::from(Parity::try_from(7).unwrap_err());
        assert!(matches!(err, MappingError::InvalidArgument(_)));
    }

    #[test]
    fn validate_rejects_oversized_fields() {
        let mut rule = can_rule();
        rule.can_dlc = 9;
        assert!(matches!(rule.validate(), Err(MappingError::InvalidArgument(_))));

        let mut rule = can_rule();
        rule.format_template = "x".repeat(MAX_TEMPLATE_LEN + 1);
        assert!(rule.validate().is_err());

        let mut rule = can_rule();
        rule.fixed_payload = vec![0; MAX_FIXED_PAYLOAD + 1];
        assert!(rule.validate().is_err());

        let mut rule = can_rule();
        rule.device_idx = MAX_HID_DEVICES as u8;
        assert!(rule.validate().is_err());
    }

    #[test]
    fn validate_checks_can_id_width() {
        let mut rule = can_rule();
        rule.can_id = 0x800;
        assert!(rule.validate().is_err());

        rule.output = OutputConfig::CanBus(CanConfig {
            extended_id: true,
            ..CanConfig::default()
        });
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn same_config_ignores_runtime_state() {
        let a = can_rule();
        let mut b = can_rule();
        b.last_input_value = Some(7);
        b.last_output_time = Some(Instant::now());
        assert!(a.same_config(&b));
    }

    #[test]
    fn rule_deserializes_from_toml_with_defaults() {
        let text = r#"
            device_idx = 1
            input_type = "GamepadAxis"
            input_index = 2
            can_id = 0x120
            can_dlc = 2

            [output]
            type = "CanBus"
            port = 0
            bitrate = 250000
        "#;
        let rule: MappingRule = toml::from_str(text).unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.scale_factor, 100);
        assert_eq!(rule.condition.kind, ConditionKind::Always);
        assert_eq!(rule.output_type(), OutputType::CanBus);
        assert!(rule.validate().is_ok());
    }
}
