//! Example records and their lifecycle.
//!
//! The engine owns every example it builds; callers hold only an
//! [`ExampleHandle`], a slot index plus a generation stamp into the
//! session's [`ExampleStore`]. Handles are cheap to copy and safe to
//! misuse: a stale or foreign handle fails with
//! [`HopperError::InvalidExample`], a handle whose record was already
//! returned fails with [`HopperError::AlreadyReleased`], and neither path
//! can reach freed memory.
//!
//! Slots recycle through a free list. Releasing a record keeps the slot's
//! generation (so a double release is recognized as such); the generation
//! bumps when the slot is next reused, at which point the old handle turns
//! stale.

use crate::error::{HopperError, Result};
use crate::feature::{FeatureSpace, FeatureSpaceSet};
use crate::hash::HashContext;
use crate::text::ParsedExample;

// =============================================================================
// Handle
// =============================================================================

/// Opaque ticket for an engine-owned example.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExampleHandle {
    slot: u32,
    generation: u32,
}

// =============================================================================
// Record
// =============================================================================

/// An engine-owned example: hashed feature spaces plus training state.
#[derive(Clone, Debug)]
pub struct ExampleRecord {
    spaces: FeatureSpaceSet,
    label: Option<f32>,
    learns: u32,
}

impl ExampleRecord {
    /// Build a record from tokenized text by hashing every feature.
    ///
    /// Each parsed namespace seeds its features with the hash of the full
    /// namespace name; the stored space keeps only the single-character
    /// short name, matching the interchange layout.
    pub fn from_parsed(parsed: &ParsedExample, ctx: &HashContext) -> Self {
        let spaces = parsed
            .spaces
            .iter()
            .map(|parsed_space| {
                let seed = ctx.hash_namespace(&parsed_space.name);
                let mut space = FeatureSpace::new(parsed_space.short_name());
                for feature in &parsed_space.features {
                    space.push(ctx.hash_feature(&feature.token, seed), feature.value);
                }
                space
            })
            .collect();

        Self {
            spaces,
            label: parsed.label,
            learns: 0,
        }
    }

    /// Build a record from pre-hashed feature spaces (the import path).
    /// The set is copied here; the caller keeps its own buffer.
    pub fn from_spaces(spaces: &FeatureSpaceSet) -> Self {
        Self {
            spaces: spaces.clone(),
            label: None,
            learns: 0,
        }
    }

    pub fn spaces(&self) -> &FeatureSpaceSet {
        &self.spaces
    }

    pub fn label(&self) -> Option<f32> {
        self.label
    }

    /// Times this record has been through a learn call.
    pub fn learns(&self) -> u32 {
        self.learns
    }

    /// Attach a label; a record labels at most once, whether the first
    /// label came from text or from an earlier attach.
    pub fn set_label(&mut self, label: f32) -> Result<()> {
        if self.label.is_some() {
            return Err(HopperError::AlreadyLabeled);
        }
        self.label = Some(label);
        Ok(())
    }

    pub(crate) fn note_learn(&mut self) {
        self.learns += 1;
    }
}

// =============================================================================
// Store
// =============================================================================

enum SlotState {
    Live(ExampleRecord),
    Released,
}

struct Slot {
    generation: u32,
    state: SlotState,
}

/// Slab of engine-owned examples with generation-checked access.
#[derive(Default)]
pub struct ExampleStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl ExampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (not yet released) records.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Insert a record, reusing a released slot when one is available.
    pub fn insert(&mut self, record: ExampleRecord) -> ExampleHandle {
        self.live += 1;

        if let Some(slot_index) = self.free.pop() {
            let slot = &mut self.slots[slot_index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.state = SlotState::Live(record);
            return ExampleHandle {
                slot: slot_index,
                generation: slot.generation,
            };
        }

        let slot_index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            state: SlotState::Live(record),
        });
        ExampleHandle {
            slot: slot_index,
            generation: 0,
        }
    }

    pub fn get(&self, handle: ExampleHandle) -> Result<&ExampleRecord> {
        match &self.slot(handle)?.state {
            SlotState::Live(record) => Ok(record),
            SlotState::Released => Err(HopperError::AlreadyReleased),
        }
    }

    pub fn get_mut(&mut self, handle: ExampleHandle) -> Result<&mut ExampleRecord> {
        match &mut self.slot_mut(handle)?.state {
            SlotState::Live(record) => Ok(record),
            SlotState::Released => Err(HopperError::AlreadyReleased),
        }
    }

    /// Release a record, returning its slot to the free list.
    pub fn release(&mut self, handle: ExampleHandle) -> Result<()> {
        let slot = self.slot_mut(handle)?;
        match slot.state {
            SlotState::Live(_) => {
                slot.state = SlotState::Released;
                self.free.push(handle.slot);
                self.live -= 1;
                Ok(())
            }
            SlotState::Released => Err(HopperError::AlreadyReleased),
        }
    }

    fn slot(&self, handle: ExampleHandle) -> Result<&Slot> {
        self.slots
            .get(handle.slot as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(HopperError::InvalidExample)
    }

    fn slot_mut(&mut self, handle: ExampleHandle) -> Result<&mut Slot> {
        self.slots
            .get_mut(handle.slot as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(HopperError::InvalidExample)
    }
}
