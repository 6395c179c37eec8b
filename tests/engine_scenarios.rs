use hidbridge::config::EngineSettings;
use hidbridge::controller::{InputEvent, KeyboardReport, MouseReport};
use hidbridge::mapping::mapping_types::{MAX_MAPPINGS, MAX_MAPPINGS_PER_DEVICE};
use hidbridge::mapping::{
    CanConfig, Condition, ConditionKind, InputType, MappingEngine, MappingError, MappingRule,
    OutputConfig, OutputFormat, SerialConfig,
};
use hidbridge::output::{CanFrame, RecordingTransport, SentMessage};
use hidbridge::persistence::codec::{HEADER_LEN, RECORD_LEN};
use hidbridge::persistence::{BlobStorage, MemoryStorage};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Bench {
    engine: MappingEngine,
    recorder: Arc<RecordingTransport>,
    storage: Arc<MemoryStorage>,
}

fn bench() -> Bench {
    let recorder = Arc::new(RecordingTransport::new());
    let storage = Arc::new(MemoryStorage::new());
    let engine = MappingEngine::new(
        recorder.clone(),
        recorder.clone(),
        storage.clone(),
        EngineSettings::default(),
    );
    Bench {
        engine,
        recorder,
        storage,
    }
}

fn mouse_x(device_idx: u8, x: i8) -> InputEvent {
    InputEvent::mouse(
        device_idx,
        MouseReport {
            x,
            ..MouseReport::default()
        },
    )
}

fn key_rule(device_idx: u8, key: u8) -> MappingRule {
    let mut rule = MappingRule::new(
        device_idx,
        InputType::KeyboardKey,
        key,
        OutputConfig::Serial(SerialConfig {
            port: 1,
            ..SerialConfig::default()
        }),
    );
    rule.output_format = OutputFormat::Custom;
    rule.format_template = "KEY={}\n".to_string();
    rule
}

#[test]
fn added_rule_reads_back_unchanged() {
    let bench = bench();
    let mut rule = key_rule(2, 0x04);
    rule.condition = Condition::new(ConditionKind::Equals, 1);
    rule.min_interval_ms = 250;

    let idx = bench.engine.add(rule.clone()).unwrap();
    assert_eq!(bench.engine.get(idx).unwrap(), rule);
    assert_eq!(bench.engine.count(), 1);
}

#[test]
fn table_capacity_is_enforced() {
    let bench = bench();
    for device in 0..(MAX_MAPPINGS / MAX_MAPPINGS_PER_DEVICE) as u8 {
        for key in 0..MAX_MAPPINGS_PER_DEVICE as u8 {
            bench.engine.add(key_rule(device, key)).unwrap();
        }
    }
    assert_eq!(bench.engine.count(), MAX_MAPPINGS);

    let err = bench.engine.add(key_rule(0, 99)).unwrap_err();
    assert!(matches!(err, MappingError::CapacityExceeded(_)));
    assert_eq!(bench.engine.count(), MAX_MAPPINGS);

    bench.engine.remove(17).unwrap();
    assert_eq!(bench.engine.add(key_rule(1, 99)).unwrap(), 17);
}

#[test]
fn changed_condition_fires_only_on_change() {
    let bench = bench();
    let mut rule = MappingRule::new(
        0,
        InputType::MouseMoveX,
        0,
        OutputConfig::Serial(SerialConfig::default()),
    );
    rule.condition = Condition::new(ConditionKind::Changed, 0);
    rule.output_format = OutputFormat::Decimal;
    bench.engine.add(rule).unwrap();

    for x in [3, 3, 7, 7, -2] {
        bench.engine.process_event(&mouse_x(0, x)).unwrap();
    }

    assert_eq!(
        bench.recorder.serial_payloads(),
        vec![b"7".to_vec(), b"-2".to_vec()]
    );
}

#[test]
fn cooldown_suppresses_early_repeats() {
    let bench = bench();
    let mut rule = key_rule(0, 0x04);
    rule.min_interval_ms = 100;
    bench.engine.add(rule).unwrap();

    let pressed = InputEvent::keyboard(0, KeyboardReport::new(0, &[0x04]));
    let start = Instant::now();

    let first = bench.engine.process_event_at(&pressed, start).unwrap();
    let early = bench
        .engine
        .process_event_at(&pressed, start + Duration::from_millis(50))
        .unwrap();
    let late = bench
        .engine
        .process_event_at(&pressed, start + Duration::from_millis(150))
        .unwrap();

    assert_eq!(first.dispatched, 1);
    assert_eq!(early.rate_limited, 1);
    assert_eq!(early.dispatched, 0);
    assert_eq!(late.dispatched, 1);
    assert_eq!(bench.recorder.serial_payloads().len(), 2);
    assert_eq!(bench.engine.stats().rate_limited, 1);
}

#[test]
fn scale_and_offset_apply_before_formatting() {
    let bench = bench();
    let mut rule = MappingRule::new(
        0,
        InputType::MouseMoveX,
        0,
        OutputConfig::Serial(SerialConfig::default()),
    );
    rule.scale_factor = 200;
    rule.offset = 10;
    rule.output_format = OutputFormat::Decimal;
    bench.engine.add(rule).unwrap();

    bench.engine.process_event(&mouse_x(0, 5)).unwrap();
    bench.engine.process_event(&mouse_x(0, -5)).unwrap();

    assert_eq!(
        bench.recorder.serial_payloads(),
        vec![b"20".to_vec(), b"0".to_vec()]
    );
}

#[test]
fn mouse_motion_becomes_can_frame() {
    let bench = bench();
    let mut rule = MappingRule::new(
        0,
        InputType::MouseMoveX,
        0,
        OutputConfig::CanBus(CanConfig::default()),
    );
    rule.scale_factor = 200;
    rule.offset = 10;
    rule.can_id = 0x100;
    rule.can_dlc = 1;
    rule.output_format = OutputFormat::Raw;
    bench.engine.add(rule).unwrap();

    let outcome = bench.engine.process_event(&mouse_x(0, 5)).unwrap();
    assert_eq!(outcome.dispatched, 1);

    let sent = bench.recorder.sent();
    assert_eq!(sent.len(), 1);
    let SentMessage::Can { port, frame } = &sent[0] else {
        panic!("expected a CAN frame, got {:?}", sent[0]);
    };
    assert_eq!(*port, 0);
    assert_eq!(*frame, CanFrame::new(0x100, false, &[20]));
    assert_eq!(frame.dlc, 1);
}

#[test]
fn events_for_other_devices_are_ignored() {
    let bench = bench();
    bench.engine.add(key_rule(3, 0x04)).unwrap();

    let outcome = bench
        .engine
        .process_event(&InputEvent::keyboard(
            1,
            KeyboardReport::new(0, &[0x04]),
        ))
        .unwrap();
    assert_eq!(outcome.matched, 0);
    assert!(bench.recorder.sent().is_empty());

    let outcome = bench.engine.process_event(&mouse_x(8, 1)).unwrap();
    assert_eq!(outcome.matched, 0);
    assert!(bench.recorder.sent().is_empty());
}

#[test]
fn saved_table_loads_into_fresh_engine() {
    let bench = bench();
    let mut can_rule = MappingRule::new(
        4,
        InputType::GamepadAxis,
        2,
        OutputConfig::CanBus(CanConfig {
            port: 1,
            bitrate: 250_000,
            extended_id: true,
        }),
    );
    can_rule.can_id = 0x1ABC_DEF0;
    can_rule.can_dlc = 2;
    can_rule.offset = -3;

    let slots = [
        bench.engine.add(key_rule(0, 0x04)).unwrap(),
        bench.engine.add(key_rule(0, 0x05)).unwrap(),
        bench.engine.add(can_rule).unwrap(),
    ];
    assert_eq!(bench.engine.save().unwrap(), 3);

    let restored = MappingEngine::new(
        bench.recorder.clone(),
        bench.recorder.clone(),
        bench.storage.clone(),
        EngineSettings::default(),
    );
    assert_eq!(restored.load().unwrap(), 3);
    for slot in slots {
        assert!(restored
            .get(slot)
            .unwrap()
            .same_config(&bench.engine.get(slot).unwrap()));
    }
}

#[test]
fn corrupted_record_costs_only_that_rule() {
    let bench = bench();
    for key in 0..4 {
        bench.engine.add(key_rule(0, key)).unwrap();
    }
    bench.engine.save().unwrap();

    let mut blob = bench.storage.read_blob().unwrap().unwrap();
    // scale factor bytes of the third record
    blob[HEADER_LEN + 2 * RECORD_LEN + 72] ^= 0x5A;
    bench.storage.set_blob(blob);

    assert_eq!(bench.engine.load().unwrap(), 3);
    assert!(matches!(bench.engine.get(2), Err(MappingError::NotFound(2))));
    assert!(bench.engine.get(3).is_ok());
}

#[test]
fn damaged_header_leaves_empty_table() {
    let bench = bench();
    bench.engine.add(key_rule(0, 0x04)).unwrap();
    bench.engine.save().unwrap();

    let mut blob = bench.storage.blob().unwrap();
    blob[0] = b'X';
    bench.storage.set_blob(blob);

    assert!(matches!(
        bench.engine.load(),
        Err(MappingError::Validation(_))
    ));
    assert_eq!(bench.engine.count(), 0);
}

const SEED: &str = r#"
[[mapping]]
device_idx = 0
input_type = "MouseMoveX"
can_id = 0x100
can_dlc = 1
scale_factor = 200
offset = 10

[mapping.output]
type = "CanBus"
port = 0
bitrate = 500000
"#;

#[test]
fn seed_import_survives_repeated_restarts() {
    let recorder = Arc::new(RecordingTransport::new());
    let storage = Arc::new(MemoryStorage::new());

    for boot in 0..20 {
        let engine = MappingEngine::new(
            recorder.clone(),
            recorder.clone(),
            storage.clone(),
            EngineSettings::default(),
        );
        engine.load().unwrap();
        let added = engine.import_toml(SEED).unwrap();
        assert_eq!(added.len(), usize::from(boot == 0), "boot {}", boot);
        assert_eq!(engine.count(), 1, "boot {}", boot);
        engine.save().unwrap();
    }

    let engine = MappingEngine::new(
        recorder.clone(),
        recorder.clone(),
        storage,
        EngineSettings::default(),
    );
    engine.load().unwrap();
    engine.process_event(&mouse_x(0, 5)).unwrap();
    assert_eq!(recorder.can_frames(), vec![CanFrame::new(0x100, false, &[20])]);
}
