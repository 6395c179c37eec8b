//! Binary layout of the persisted mapping table
//!
//! ```text
//! header (20 bytes, little endian)
//!   magic "HMAP" | version u16 | entry_count u16 | saved_at i64 (unix ms) | crc u32
//! record (86 bytes each, slot order)
//!   slot u16 | enabled u8 | device_idx u8 | input_type u8 | input_index u8
//!   cond_kind u8 | cond_value i32
//!   output_type u8 | port u8 | baud_rate/bitrate u32
//!   data_bits u8 | stop_bits u8 | parity u8 | flow_control u8 | extended_id u8
//!   format u8 | template_len u8 | template [32]
//!   can_id u32 | can_dlc u8 | payload_len u8 | payload [8]
//!   scale_factor i32 | offset i32 | min_interval_ms u32 | crc u32
//! ```
//!
//! Both checksums are CRC-32/ISO-HDLC over the preceding bytes of their block.
//! Runtime state is never written.

use crate::controller::event::MAX_HID_DEVICES;
use crate::mapping::mapping_types::{
    CanConfig, Condition, ConditionKind, FlowControl, InputType, MappingRule, OutputConfig,
    OutputFormat, OutputType, Parity, SerialConfig, MAX_FIXED_PAYLOAD, MAX_MAPPINGS,
    MAX_MAPPINGS_PER_DEVICE, MAX_TEMPLATE_LEN,
};
use crate::mapping::MappingError;
use chrono::{DateTime, Utc};
use crc::{Crc, CRC_32_ISO_HDLC};
use tracing::warn;

pub const MAGIC: &[u8; 4] = b"HMAP";
pub const FORMAT_VERSION: u16 = 1;
pub const HEADER_LEN: usize = 20;
pub const RECORD_LEN: usize = 86;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Result of decoding a blob
#[derive(Debug)]
pub struct DecodedTable {
    pub saved_at: Option<DateTime<Utc>>,
    pub entries: Vec<(u16, MappingRule)>,
    /// Records dropped by per-record recovery
    pub skipped: usize,
}

/// Serializes `(slot, rule)` pairs; callers pass them in slot order
pub fn encode<'a, I>(entries: I, saved_at: DateTime<Utc>) -> Vec<u8>
where
    I: IntoIterator<Item = (u16, &'a MappingRule)>,
{
    let mut records = Vec::new();
    let mut count: u16 = 0;
    for (slot, rule) in entries {
        encode_record(&mut records, slot, rule);
        count += 1;
    }

    let mut blob = Vec::with_capacity(HEADER_LEN + records.len());
    blob.extend_from_slice(MAGIC);
    blob.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    blob.extend_from_slice(&count.to_le_bytes());
    blob.extend_from_slice(&saved_at.timestamp_millis().to_le_bytes());
    let crc = CRC32.checksum(&blob);
    blob.extend_from_slice(&crc.to_le_bytes());

    blob.extend_from_slice(&records);
    blob
}

fn encode_record(out: &mut Vec<u8>, slot: u16, rule: &MappingRule) {
    let start = out.len();

    out.extend_from_slice(&slot.to_le_bytes());
    out.push(rule.enabled as u8);
    out.push(rule.device_idx);
    out.push(rule.input_type.into());
    out.push(rule.input_index);
    out.push(rule.condition.kind.into());
    out.extend_from_slice(&rule.condition.value.to_le_bytes());

    out.push(rule.output_type().into());
    out.push(rule.output.port());
    match &rule.output {
        OutputConfig::Serial(cfg) => {
            out.extend_from_slice(&cfg.baud_rate.to_le_bytes());
            out.extend_from_slice(&[
                cfg.data_bits,
                cfg.stop_bits,
                cfg.parity.into(),
                cfg.flow_control.into(),
                0,
            ]);
        }
        OutputConfig::CanBus(cfg) => {
            out.extend_from_slice(&cfg.bitrate.to_le_bytes());
            out.extend_from_slice(&[0, 0, 0, 0, cfg.extended_id as u8]);
        }
    }

    out.push(rule.output_format.into());
    let template = rule.format_template.as_bytes();
    let template_len = template.len().min(MAX_TEMPLATE_LEN);
    out.push(template_len as u8);
    let mut template_buf = [0u8; MAX_TEMPLATE_LEN];
    template_buf[..template_len].copy_from_slice(&template[..template_len]);
    out.extend_from_slice(&template_buf);

    out.extend_from_slice(&rule.can_id.to_le_bytes());
    out.push(rule.can_dlc);
    let payload_len = rule.fixed_payload.len().min(MAX_FIXED_PAYLOAD);
    out.push(payload_len as u8);
    let mut payload_buf = [0u8; MAX_FIXED_PAYLOAD];
    payload_buf[..payload_len].copy_from_slice(&rule.fixed_payload[..payload_len]);
    out.extend_from_slice(&payload_buf);

    out.extend_from_slice(&rule.scale_factor.to_le_bytes());
    out.extend_from_slice(&rule.offset.to_le_bytes());
    out.extend_from_slice(&rule.min_interval_ms.to_le_bytes());

    let crc = CRC32.checksum(&out[start..]);
    out.extend_from_slice(&crc.to_le_bytes());
}

/// Parses a blob
///
/// Header damage fails the whole decode with [`MappingError::Validation`].
/// Record damage only drops that record.
pub fn decode(blob: &[u8]) -> Result<DecodedTable, MappingError> {
    if blob.len() < HEADER_LEN {
        return Err(MappingError::Validation(format!(
            "blob is {} bytes, header needs {}",
            blob.len(),
            HEADER_LEN
        )));
    }

    let mut header = Reader::new(&blob[..HEADER_LEN]);
    let magic = header.array::<4>();
    if &magic != MAGIC {
        return Err(MappingError::Validation(format!("bad magic {:02X?}", magic)));
    }
    let version = header.u16();
    if version != FORMAT_VERSION {
        return Err(MappingError::Validation(format!(
            "unsupported format version {}",
            version
        )));
    }
    let count = header.u16() as usize;
    let saved_at_ms = header.i64();
    let stored_crc = header.u32();
    let crc = CRC32.checksum(&blob[..HEADER_LEN - 4]);
    if crc != stored_crc {
        return Err(MappingError::Validation(format!(
            "header checksum {:#010X} does not match {:#010X}",
            stored_crc, crc
        )));
    }

    let needed = HEADER_LEN + count * RECORD_LEN;
    if blob.len() < needed {
        return Err(MappingError::Validation(format!(
            "blob truncated: {} entries need {} bytes, got {}",
            count,
            needed,
            blob.len()
        )));
    }

    let mut entries: Vec<(u16, MappingRule)> = Vec::with_capacity(count);
    let mut seen = [false; MAX_MAPPINGS];
    let mut per_device = [0usize; MAX_HID_DEVICES];
    let mut skipped = 0;

    for (n, record) in blob[HEADER_LEN..needed].chunks_exact(RECORD_LEN).enumerate() {
        let (slot, rule) = match decode_record(record) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping persisted record {}: {}", n, e);
                skipped += 1;
                continue;
            }
        };

        let slot_idx = slot as usize;
        if slot_idx >= MAX_MAPPINGS || seen[slot_idx] {
            warn!("Skipping persisted record {}: slot {} out of range or duplicate", n, slot);
            skipped += 1;
            continue;
        }
        let device = rule.device_idx as usize;
        if per_device[device] >= MAX_MAPPINGS_PER_DEVICE {
            warn!(
                "Skipping persisted record {}: device {} already owns {} mappings",
                n, device, MAX_MAPPINGS_PER_DEVICE
            );
            skipped += 1;
            continue;
        }

        seen[slot_idx] = true;
        per_device[device] += 1;
        entries.push((slot, rule));
    }

    Ok(DecodedTable {
        saved_at: DateTime::<Utc>::from_timestamp_millis(saved_at_ms),
        entries,
        skipped,
    })
}

fn decode_record(record: &[u8]) -> Result<(u16, MappingRule), MappingError> {
    // checksum first so a flipped byte reads as corruption, not as a bad field
    let body = &record[..RECORD_LEN - 4];
    let stored_crc = u32::from_le_bytes(Reader::new(&record[RECORD_LEN - 4..]).array());
    let crc = CRC32.checksum(body);
    if crc != stored_crc {
        return Err(MappingError::Validation(format!(
            "record checksum {:#010X} does not match {:#010X}",
            stored_crc, crc
        )));
    }

    let mut reader = Reader::new(body);

    let slot = reader.u16();
    let enabled = reader.u8() != 0;
    let device_idx = reader.u8();
    let input_type = InputType::try_from(reader.u8())?;
    let input_index = reader.u8();
    let cond_kind = ConditionKind::try_from(reader.u8())?;
    let cond_value = reader.i32();

    let output_type = OutputType::try_from(reader.u8())?;
    let port = reader.u8();
    let rate = reader.u32();
    let data_bits = reader.u8();
    let stop_bits = reader.u8();
    let parity = Parity::try_from(reader.u8())?;
    let flow_control = FlowControl::try_from(reader.u8())?;
    let extended_id = reader.u8() != 0;

    let output_format = OutputFormat::try_from(reader.u8())?;
    let template_len = reader.u8() as usize;
    let template = reader.array::<MAX_TEMPLATE_LEN>();

    let can_id = reader.u32();
    let can_dlc = reader.u8();
    let payload_len = reader.u8() as usize;
    let payload = reader.array::<MAX_FIXED_PAYLOAD>();

    let scale_factor = reader.i32();
    let offset = reader.i32();
    let min_interval_ms = reader.u32();

    if template_len > MAX_TEMPLATE_LEN || payload_len > MAX_FIXED_PAYLOAD {
        return Err(MappingError::invalid("length field out of range"));
    }
    let format_template = String::from_utf8(template[..template_len].to_vec())
        .map_err(|_| MappingError::invalid("format template is not UTF-8"))?;

    let output = match output_type {
        OutputType::Serial => OutputConfig::Serial(SerialConfig {
            port,
            baud_rate: rate,
            data_bits,
            stop_bits,
            parity,
            flow_control,
        }),
        OutputType::CanBus => OutputConfig::CanBus(CanConfig {
            port,
            bitrate: rate,
            extended_id,
        }),
    };

    let rule = MappingRule {
        enabled,
        device_idx,
        input_type,
        input_index,
        condition: Condition::new(cond_kind, cond_value),
        output,
        output_format,
        format_template,
        can_id,
        can_dlc,
        fixed_payload: payload[..payload_len].to_vec(),
        scale_factor,
        offset,
        min_interval_ms,
        last_output_time: None,
        last_input_value: None,
    };
    rule.validate()?;

    Ok((slot, rule))
}

// Cursor over a block whose length was checked by the caller
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.array::<1>()[0]
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.array())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.array())
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.array())
    }

    fn i64(&mut self) -> i64 {
        i64::from_le_bytes(self.array())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Instant;

    fn sample_rules() -> Vec<(u16, MappingRule)> {
        let mut can = MappingRule::new(
            0,
            InputType::MouseMoveX,
            0,
            OutputConfig::CanBus(CanConfig {
                port: 1,
                bitrate: 250_000,
                extended_id: true,
            }),
        );
        can.can_id = 0x1234_5678;
        can.can_dlc = 4;
        can.scale_factor = 200;
        can.offset = -10;

        let mut serial = MappingRule::new(
            2,
            InputType::KeyboardKey,
            0x04,
            OutputConfig::Serial(SerialConfig {
                port: 0,
                baud_rate: 9_600,
                data_bits: 7,
                stop_bits: 2,
                parity: Parity::Even,
                flow_control: FlowControl::RtsCts,
            }),
        );
        serial.condition = Condition::new(ConditionKind::Equals, 1);
        serial.output_format = OutputFormat::Custom;
        serial.format_template = "KEY {}\n".to_string();
        serial.min_interval_ms = 100;

        let mut fixed = MappingRule::new(
            2,
            InputType::GamepadButton,
            3,
            OutputConfig::Serial(SerialConfig::default()),
        );
        fixed.enabled = false;
        fixed.output_format = OutputFormat::Ascii;
        fixed.fixed_payload = b"FIRE".to_vec();
        fixed.condition = Condition::new(ConditionKind::Changed, 0);

        vec![(0, can), (5, serial), (127, fixed)]
    }

    fn encode_sample() -> (Vec<(u16, MappingRule)>, Vec<u8>) {
        let rules = sample_rules();
        let saved_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let blob = encode(rules.iter().map(|(slot, rule)| (*slot, rule)), saved_at);
        (rules, blob)
    }

    #[test]
    fn layout_sizes() {
        let (rules, blob) = encode_sample();
        assert_eq!(blob.len(), HEADER_LEN + rules.len() * RECORD_LEN);
        assert_eq!(&blob[..4], MAGIC);
    }

    #[test]
    fn decode_restores_every_record() {
        let (rules, blob) = encode_sample();
        let decoded = decode(&blob).unwrap();
        assert_eq!(decoded.skipped, 0);
        assert_eq!(decoded.entries, rules);
        assert_eq!(
            decoded.saved_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn runtime_state_is_not_persisted() {
        let mut rule = sample_rules().remove(0).1;
        rule.last_input_value = Some(42);
        rule.last_output_time = Some(Instant::now());
        let blob = encode([(3u16, &rule)], Utc::now());

        let decoded = decode(&blob).unwrap();
        let (_, restored) = &decoded.entries[0];
        assert_eq!(restored.last_input_value, None);
        assert_eq!(restored.last_output_time, None);
        assert!(restored.same_config(&rule));
    }

    #[test]
    fn corrupted_record_is_skipped() {
        let (rules, mut blob) = encode_sample();
        // flip a byte inside the second record's template
        blob[HEADER_LEN + RECORD_LEN + 30] ^= 0xFF;

        let decoded = decode(&blob).unwrap();
        assert_eq!(decoded.skipped, 1);
        assert_eq!(decoded.entries.len(), rules.len() - 1);
        assert!(decoded.entries.iter().all(|(slot, _)| *slot != 5));
    }

    #[test]
    fn header_damage_fails_whole_decode() {
        let (_, blob) = encode_sample();

        let mut bad_magic = blob.clone();
        bad_magic[0] = b'X';
        assert!(matches!(decode(&bad_magic), Err(MappingError::Validation(_))));

        let mut bad_crc = blob.clone();
        bad_crc[8] ^= 0x01;
        assert!(matches!(decode(&bad_crc), Err(MappingError::Validation(_))));

        let truncated = &blob[..blob.len() - 1];
        assert!(matches!(decode(truncated), Err(MappingError::Validation(_))));

        assert!(matches!(decode(&blob[..10]), Err(MappingError::Validation(_))));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let (_, mut blob) = encode_sample();
        blob[4..6].copy_from_slice(&2u16.to_le_bytes());
        let crc = CRC32.checksum(&blob[..HEADER_LEN - 4]);
        blob[HEADER_LEN - 4..HEADER_LEN].copy_from_slice(&crc.to_le_bytes());
        assert!(matches!(decode(&blob), Err(MappingError::Validation(_))));
    }

    #[test]
    fn duplicate_slots_and_device_overflow_are_skipped() {
        let rule = MappingRule::new(
            1,
            InputType::GamepadAxis,
            0,
            OutputConfig::Serial(SerialConfig::default()),
        );

        let duplicate = encode([(4u16, &rule), (4u16, &rule)], Utc::now());
        let decoded = decode(&duplicate).unwrap();
        assert_eq!(decoded.entries.len(), 1);
        assert_eq!(decoded.skipped, 1);

        let crowded: Vec<(u16, &MappingRule)> = (0..=MAX_MAPPINGS_PER_DEVICE as u16)
            .map(|slot| (slot, &rule))
            .collect();
        let decoded = decode(&encode(crowded, Utc::now())).unwrap();
        assert_eq!(decoded.entries.len(), MAX_MAPPINGS_PER_DEVICE);
        assert_eq!(decoded.skipped, 1);

        let out_of_range = encode([(MAX_MAPPINGS as u16, &rule)], Utc::now());
        assert_eq!(decode(&out_of_range).unwrap().entries.len(), 0);
    }

    #[test]
    fn empty_table_round_trips() {
        let blob = encode(std::iter::empty(), Utc::now());
        assert_eq!(blob.len(), HEADER_LEN);
        let decoded = decode(&blob).unwrap();
        assert!(decoded.entries.is_empty());
    }
}
