//! TOML mapping lists
//!
//! ```toml
//! [[mapping]]
//! device_idx = 0
//! input_type = "MouseMoveX"
//! can_id = 0x100
//! can_dlc = 1
//! scale_factor = 200
//! offset = 10
//!
//! [mapping.output]
//! type = "CanBus"
//! port = 0
//! bitrate = 500000
//! ```

use crate::mapping::mapping_types::MappingRule;
use crate::mapping::MappingError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MappingFile {
    #[serde(default)]
    pub mapping: Vec<MappingRule>,
}

pub fn parse(text: &str) -> Result<Vec<MappingRule>, MappingError> {
    let file: MappingFile = toml::from_str(text)
        .map_err(|e| MappingError::invalid(format!("mapping file: {}", e)))?;
    Ok(file.mapping)
}

pub fn render(rules: Vec<MappingRule>) -> Result<String, MappingError> {
    toml::to_string_pretty(&MappingFile { mapping: rules })
        .map_err(|e| MappingError::Validation(format!("cannot serialize mappings: {}", e)))
}
