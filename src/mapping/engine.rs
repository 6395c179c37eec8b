//! Mapping engine
//!
//! Owns the rule table and runs every input event through
//! extract → evaluate → transform → rate limit → format → dispatch.
//!
//! # Locking
//!
//! ```text
//! process_event:  lock ─ snapshot candidates ─ unlock
//!                 evaluate + dispatch (no lock held, transports may block)
//!                 lock ─ write back runtime state if generation unchanged ─ unlock
//!
//! configuration:  lock ─ mutate (bumps generation) ─ unlock
//! save/load/reset: lock held for the whole pass
//! ```
//!
//! A slow transport therefore delays only the event that triggered it, never a
//! configuration call.

use crate::config::EngineSettings;
use crate::controller::event::{InputEvent, MAX_HID_DEVICES};
use crate::mapping::mapping_types::{MappingRule, OutputType};
use crate::mapping::rate_limit::RateLimiter;
use crate::mapping::stats::{EngineStats, StatsSnapshot};
use crate::mapping::store::{Candidate, MappingTable, RuntimeUpdate};
use crate::mapping::{condition, extractor, formatter, import, transform, MappingError};
use crate::output::{CanTransport, Dispatcher, SerialTransport};
use crate::persistence::{codec, BlobStorage};
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What happened to one event
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EventOutcome {
    /// Candidates whose input could be extracted from the event
    pub matched: usize,
    /// Candidates whose condition fired
    pub fired: usize,
    /// Firings suppressed by the rule's cooldown
    pub rate_limited: usize,
    /// Successful sends
    pub dispatched: usize,
    /// Sends that failed or timed out
    pub failed: usize,
}

pub struct MappingEngine {
    table: Mutex<MappingTable>,
    dispatcher: Dispatcher,
    storage: Arc<dyn BlobStorage>,
    settings: EngineSettings,
    stats: EngineStats,
}

impl MappingEngine {
    pub fn new(
        serial: Arc<dyn SerialTransport>,
        can: Arc<dyn CanTransport>,
        storage: Arc<dyn BlobStorage>,
        settings: EngineSettings,
    ) -> Self {
        info!(
            "Creating mapping engine (serial timeout {} ms, CAN timeout {} ms, serial limit {} bytes)",
            settings.serial_timeout_ms, settings.can_timeout_ms, settings.serial_payload_limit
        );
        let dispatcher = Dispatcher::new(
            serial,
            can,
            settings.serial_timeout(),
            settings.can_timeout(),
        );
        Self {
            table: Mutex::new(MappingTable::new()),
            dispatcher,
            storage,
            settings,
            stats: EngineStats::default(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, MappingTable> {
        match self.table.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Mapping table lock poisoned, recovering");
                self.table.clear_poison();
                poisoned.into_inner()
            }
        }
    }

    /// Processes one input event at the current time
    pub fn process_event(&self, event: &InputEvent) -> Result<EventOutcome, MappingError> {
        self.process_event_at(event, Instant::now())
    }

    /// Processes one input event as if it arrived at `now`
    pub fn process_event_at(
        &self,
        event: &InputEvent,
        now: Instant,
    ) -> Result<EventOutcome, MappingError> {
        self.stats.record_event();
        if event.device_idx as usize >= MAX_HID_DEVICES {
            debug!(
                "Event from device {} ignored, only {} devices are tracked",
                event.device_idx, MAX_HID_DEVICES
            );
            return Ok(EventOutcome::default());
        }

        let candidates = self.lock().candidates(event.device_idx, |rule| {
            extractor::accepts(&event.payload, rule.input_type)
        });
        if candidates.is_empty() {
            return Ok(EventOutcome::default());
        }

        let mut outcome = EventOutcome::default();
        let mut updates = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            if let Some(update) = self.evaluate(candidate, event, now, &mut outcome) {
                updates.push((candidate.slot, candidate.generation, update));
            }
        }

        if !updates.is_empty() {
            let mut table = self.lock();
            let dropped = updates
                .into_iter()
                .filter(|(slot, generation, update)| !table.write_back(*slot, *generation, *update))
                .inspect(|(slot, _, _)| {
                    warn!("Mapping {} changed during evaluation, runtime state dropped", slot)
                })
                .count();
            drop(table);
            self.stats.record_dropped_write_backs(dropped);
        }

        self.stats.record_outcome(&outcome);
        Ok(outcome)
    }

    // Runs one candidate outside the lock; `None` means the input did not resolve
    fn evaluate(
        &self,
        candidate: &Candidate,
        event: &InputEvent,
        now: Instant,
        outcome: &mut EventOutcome,
    ) -> Option<RuntimeUpdate> {
        let rule = &candidate.rule;
        let raw = extractor::extract(event, rule.input_type, rule.input_index)?;
        outcome.matched += 1;

        let mut update = RuntimeUpdate {
            last_input_value: Some(raw),
            last_output_time: rule.last_output_time,
        };

        if !condition::evaluate(&rule.condition, raw, rule.last_input_value) {
            return Some(update);
        }
        outcome.fired += 1;

        let mut limiter = RateLimiter::new(rule.min_interval_ms, rule.last_output_time);
        if !limiter.should_process(now) {
            debug!("Mapping {} rate limited", candidate.slot);
            outcome.rate_limited += 1;
            return Some(update);
        }

        let value = transform::apply(raw, rule.scale_factor, rule.offset);
        let payload = formatter::format_payload(rule, value, self.settings.serial_payload_limit);
        // a zero-length CAN data frame is still a frame
        if payload.is_empty() && rule.output_type() == OutputType::Serial {
            debug!(
                "Mapping {} produced an empty {} payload, nothing sent",
                candidate.slot, rule.output_format
            );
            return Some(update);
        }

        match self.dispatcher.dispatch(rule, &payload) {
            Ok(()) => {
                debug!(
                    "Mapping {}: raw {} -> {} dispatched as {:02X?}",
                    candidate.slot, raw, value, payload
                );
                limiter.record(now);
                update.last_output_time = limiter.last_event_time;
                outcome.dispatched += 1;
            }
            Err(e) => {
                warn!("Mapping {} dispatch failed: {}", candidate.slot, e);
                outcome.failed += 1;
            }
        }
        Some(update)
    }

    pub fn add(&self, rule: MappingRule) -> Result<u16, MappingError> {
        let idx = self.lock().add(rule)?;
        info!("Added mapping {}", idx);
        Ok(idx)
    }

    /// Replaces the configuration of `idx`, keeping its runtime state
    pub fn update(&self, idx: u16, rule: MappingRule) -> Result<(), MappingError> {
        self.lock().update(idx, rule)?;
        info!("Updated mapping {}", idx);
        Ok(())
    }

    /// Replaces the configuration of `idx` and re-arms it
    pub fn update_reset_state(&self, idx: u16, rule: MappingRule) -> Result<(), MappingError> {
        self.lock().update_reset_state(idx, rule)?;
        info!("Updated mapping {} and reset its runtime state", idx);
        Ok(())
    }

    pub fn remove(&self, idx: u16) -> Result<(), MappingError> {
        self.lock().remove(idx)?;
        info!("Removed mapping {}", idx);
        Ok(())
    }

    pub fn get(&self, idx: u16) -> Result<MappingRule, MappingError> {
        self.lock().get(idx)
    }

    pub fn count(&self) -> usize {
        self.lock().count()
    }

    pub fn list(&self) -> Vec<(u16, MappingRule)> {
        self.lock().list()
    }

    /// Writes the whole table to storage, returns the number of rules saved
    pub fn save(&self) -> Result<usize, MappingError> {
        let table = self.lock();
        let count = table.count();
        let blob = codec::encode(table.iter(), Utc::now());
        self.storage.write_blob(&blob).map_err(|e| {
            error!("Saving {} mappings failed: {}", count, e);
            MappingError::from(e)
        })?;
        info!("Saved {} mappings ({} bytes)", count, blob.len());
        Ok(count)
    }

    /// Replaces the table with the persisted one, returns the number of rules loaded
    ///
    /// A storage failure leaves the table untouched. A corrupt header empties it.
    pub fn load(&self) -> Result<usize, MappingError> {
        let mut table = self.lock();

        let blob = match self.storage.read_blob() {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                info!("No persisted mappings, starting with an empty table");
                table.clear();
                return Ok(0);
            }
            Err(e) => {
                error!("Reading persisted mappings failed: {}", e);
                return Err(e.into());
            }
        };

        match codec::decode(&blob) {
            Ok(decoded) => {
                let loaded = decoded.entries.len();
                table.restore(decoded.entries);
                match decoded.saved_at {
                    Some(saved_at) => info!(
                        "Loaded {} mappings saved at {} ({} skipped)",
                        loaded, saved_at, decoded.skipped
                    ),
                    None => info!("Loaded {} mappings ({} skipped)", loaded, decoded.skipped),
                }
                Ok(loaded)
            }
            Err(e) => {
                warn!("Persisted mappings rejected, falling back to an empty table: {}", e);
                table.clear();
                Err(e)
            }
        }
    }

    /// Empties the table
    pub fn reset(&self) {
        self.lock().clear();
        info!("Mapping table reset");
    }

    /// Forgets runtime state of every rule bound to a device that went away
    pub fn device_disconnected(&self, device_idx: u8) -> usize {
        let touched = self.lock().reset_device(device_idx);
        info!(
            "Device {} disconnected, re-armed {} mappings",
            device_idx, touched
        );
        touched
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Adds every `[[mapping]]` of a TOML document, all or nothing
    ///
    /// Rules whose configuration is already in the table are skipped, so a
    /// seed file can be imported on every start. Returns the new slots only.
    pub fn import_toml(&self, text: &str) -> Result<Vec<u16>, MappingError> {
        let rules = import::parse(text)?;

        let mut table = self.lock();
        let mut staged = table.clone();
        let mut slots = Vec::with_capacity(rules.len());
        let mut skipped = 0;
        for rule in rules {
            if staged.iter().any(|(_, existing)| existing.same_config(&rule)) {
                skipped += 1;
                continue;
            }
            slots.push(staged.add(rule)?);
        }
        *table = staged;
        drop(table);

        info!(
            "Imported {} mappings, {} already present",
            slots.len(),
            skipped
        );
        Ok(slots)
    }

    pub fn export_toml(&self) -> Result<String, MappingError> {
        let rules = self.list().into_iter().map(|(_, rule)| rule).collect();
        import::render(rules)
    }
}
