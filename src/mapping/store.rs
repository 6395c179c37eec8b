//! Fixed-capacity rule arena
//!
//! Slot index is a rule's identity for its whole life. Every configuration
//! mutation bumps the slot's generation, which is how the event path notices
//! that a rule changed while it was being evaluated outside the lock.

use crate::controller::event::MAX_HID_DEVICES;
use crate::mapping::mapping_types::{MappingRule, MAX_MAPPINGS, MAX_MAPPINGS_PER_DEVICE};
use crate::mapping::MappingError;
use std::time::Instant;

/// Rule copied out of the table for lock-free evaluation
#[derive(Debug, Clone)]
pub struct Candidate {
    pub slot: u16,
    pub generation: u32,
    pub rule: MappingRule,
}

/// Runtime state produced by evaluating a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeUpdate {
    pub last_input_value: Option<i32>,
    pub last_output_time: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct MappingTable {
    slots: Vec<Option<MappingRule>>,
    generations: Vec<u32>,
}

impl Default for MappingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingTable {
    pub fn new() -> Self {
        Self {
            slots: vec![None; MAX_MAPPINGS],
            generations: vec![0; MAX_MAPPINGS],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn device_count(&self, device_idx: u8) -> usize {
        self.iter()
            .filter(|(_, rule)| rule.device_idx == device_idx)
            .count()
    }

    pub fn generation(&self, idx: u16) -> Option<u32> {
        self.generations.get(idx as usize).copied()
    }

    /// Stores `rule` in the lowest free slot
    pub fn add(&mut self, mut rule: MappingRule) -> Result<u16, MappingError> {
        rule.validate()?;

        if self.device_count(rule.device_idx) >= MAX_MAPPINGS_PER_DEVICE {
            return Err(MappingError::CapacityExceeded(format!(
                "device {} already owns {} mappings",
                rule.device_idx, MAX_MAPPINGS_PER_DEVICE
            )));
        }
        let idx = self
            .slots
            .iter()
            .position(|slot| slot.is_none())
            .ok_or_else(|| {
                MappingError::CapacityExceeded(format!("all {} slots in use", MAX_MAPPINGS))
            })?;

        rule.reset_runtime();
        self.slots[idx] = Some(rule);
        self.bump(idx);
        Ok(idx as u16)
    }

    /// Replaces the configuration in `idx`, keeping its runtime state
    pub fn update(&mut self, idx: u16, rule: MappingRule) -> Result<(), MappingError> {
        self.replace(idx, rule, false)
    }

    /// Replaces the configuration in `idx` and clears its runtime state
    pub fn update_reset_state(&mut self, idx: u16, rule: MappingRule) -> Result<(), MappingError> {
        self.replace(idx, rule, true)
    }

    fn replace(&mut self, idx: u16, mut rule: MappingRule, reset: bool) -> Result<(), MappingError> {
        let current = self.get_ref(idx)?;
        rule.validate()?;

        if rule.device_idx != current.device_idx
            && self.device_count(rule.device_idx) >= MAX_MAPPINGS_PER_DEVICE
        {
            return Err(MappingError::CapacityExceeded(format!(
                "device {} already owns {} mappings",
                rule.device_idx, MAX_MAPPINGS_PER_DEVICE
            )));
        }

        if reset {
            rule.reset_runtime();
        } else {
            rule.inherit_runtime(current);
        }
        self.slots[idx as usize] = Some(rule);
        self.bump(idx as usize);
        Ok(())
    }

    pub fn remove(&mut self, idx: u16) -> Result<MappingRule, MappingError> {
        let rule = self
            .slots
            .get_mut(idx as usize)
            .and_then(Option::take)
            .ok_or(MappingError::NotFound(idx))?;
        self.bump(idx as usize);
        Ok(rule)
    }

    pub fn get(&self, idx: u16) -> Result<MappingRule, MappingError> {
        self.get_ref(idx).cloned()
    }

    fn get_ref(&self, idx: u16) -> Result<&MappingRule, MappingError> {
        self.slots
            .get(idx as usize)
            .and_then(Option::as_ref)
            .ok_or(MappingError::NotFound(idx))
    }

    /// Populated slots in ascending order
    pub fn iter(&self) -> impl Iterator<Item = (u16, &MappingRule)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|rule| (idx as u16, rule)))
    }

    pub fn list(&self) -> Vec<(u16, MappingRule)> {
        self.iter().map(|(idx, rule)| (idx, rule.clone())).collect()
    }

    /// Copies out every enabled rule of `device_idx` that `filter` accepts
    pub fn candidates<F>(&self, device_idx: u8, filter: F) -> Vec<Candidate>
    where
        F: Fn(&MappingRule) -> bool,
    {
        self.iter()
            .filter(|(_, rule)| rule.enabled && rule.device_idx == device_idx && filter(rule))
            .map(|(slot, rule)| Candidate {
                slot,
                generation: self.generations[slot as usize],
                rule: rule.clone(),
            })
            .collect()
    }

    /// Stores runtime state if the slot still holds the evaluated generation
    ///
    /// Returns `false` when the rule was changed or removed in the meantime.
    pub fn write_back(&mut self, slot: u16, generation: u32, update: RuntimeUpdate) -> bool {
        if self.generation(slot) != Some(generation) {
            return false;
        }
        match self.slots.get_mut(slot as usize).and_then(Option::as_mut) {
            Some(rule) => {
                rule.last_input_value = update.last_input_value;
                rule.last_output_time = update.last_output_time;
                true
            }
            None => false,
        }
    }

    /// Empties every slot
    pub fn clear(&mut self) {
        for idx in 0..self.slots.len() {
            if self.slots[idx].take().is_some() {
                self.bump(idx);
            }
        }
    }

    /// Replaces the whole table with already validated `(slot, rule)` pairs
    pub fn restore(&mut self, entries: Vec<(u16, MappingRule)>) {
        self.clear();
        for (slot, mut rule) in entries {
            let idx = slot as usize;
            if idx >= self.slots.len() || rule.device_idx as usize >= MAX_HID_DEVICES {
                continue;
            }
            rule.reset_runtime();
            self.slots[idx] = Some(rule);
            self.bump(idx);
        }
    }

    /// Clears runtime state of every rule bound to `device_idx`
    pub fn reset_device(&mut self, device_idx: u8) -> usize {
        let mut touched = Vec::new();
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if let Some(rule) = slot.as_mut().filter(|rule| rule.device_idx == device_idx) {
                rule.reset_runtime();
                touched.push(idx);
            }
        }
        for idx in &touched {
            self.bump(*idx);
        }
        touched.len()
    }

    fn bump(&mut self, idx: usize) {
        self.generations[idx] = self.generations[idx].wrapping_add(1);
    }
}
