// SPDX-License-Identifier: AGPL-3.0-or-later
// Vectra - Embedded Vector Search Engine
// Copyright (C) 2026 Vectra Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Label table: external label <-> dense internal id mapping.
//!
//! Four facets over one set of arrays:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        LabelTable                          │
//! ├───────────────────────────────────────────────────────────┤
//! │  identity store    Vec<Option<LabelId>>   id -> label     │
//! │  reverse lookup    HashMap | linear scan  label -> id     │
//! │  tombstones        HashSet<InternalId>    soft deletion   │
//! │  duplicate groups  primary -> {ids}       same label      │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! The table is not internally synchronized. Mutation takes `&mut self`
//! under the owning index's single-writer discipline; reads take `&self`.
//! Internal ids are stable for the life of the table: deletion is a
//! tombstone, never a compaction.

use std::collections::{HashMap, HashSet};
use std::io::{self, Read, Write};
use std::mem;
use std::sync::Arc;

use tracing::debug;

use crate::alloc::Allocator;
use crate::error::{LabelTableError, Result};
use crate::filter::DeletedIdsFilter;

/// Dense internal position used by the index storage layers.
pub type InternalId = u32;

/// Externally supplied label: arbitrary 64-bit value, possibly sparse,
/// possibly repeated.
pub type LabelId = u64;

const FORMAT_MAGIC: [u8; 4] = *b"VLBT";
const FORMAT_VERSION: u32 = 1;

// Per-entry byte estimates charged to the allocator capability.
const SLOT_BYTES: usize = mem::size_of::<Option<LabelId>>();
const REVERSE_ENTRY_BYTES: usize = mem::size_of::<(LabelId, InternalId)>();
const TOMBSTONE_BYTES: usize = mem::size_of::<InternalId>();
const GROUP_HEADER_BYTES: usize = mem::size_of::<(InternalId, HashSet<InternalId>)>();
const GROUP_MEMBER_BYTES: usize = mem::size_of::<InternalId>();

/// Construction-time switches.
#[derive(Debug, Clone, Copy)]
pub struct LabelTableConfig {
    /// Maintain a hash reverse index while the table is mutable. When off,
    /// reverse lookups linear-scan the identity store from the start.
    pub use_reverse_map: bool,
    /// The owning index records repeated labels through the duplicate
    /// registry instead of inserting one vector per occurrence.
    pub compress_duplicates: bool,
}

impl Default for LabelTableConfig {
    fn default() -> Self {
        Self {
            use_reverse_map: true,
            compress_duplicates: false,
        }
    }
}

/// Reverse-lookup strategy. The `Map -> Scan` transition is one-way:
/// `set_immutable` releases the map and the table never rebuilds it.
enum ReverseLookup {
    Map(HashMap<LabelId, InternalId>),
    Scan,
}

impl ReverseLookup {
    /// Resolve a label to its representative id, ignoring tombstones.
    fn resolve(&self, slots: &[Option<LabelId>], label: LabelId) -> Option<InternalId> {
        match self {
            ReverseLookup::Map(map) => map.get(&label).copied(),
            // First match in id order
            ReverseLookup::Scan => slots
                .iter()
                .position(|slot| *slot == Some(label))
                .map(|idx| idx as InternalId),
        }
    }
}

/// Identifier-management layer of the index: see the module docs.
pub struct LabelTable {
    /// Identity store, the source of truth. `None` = never inserted.
    slots: Vec<Option<LabelId>>,
    lookup: ReverseLookup,
    removed: HashSet<InternalId>,
    /// Primary id -> ids registered as sharing its label. One-directional
    /// on purpose: the owning index relies on knowing which id is primary.
    duplicates: HashMap<InternalId, HashSet<InternalId>>,
    compress_duplicates: bool,
    /// Occupied slots; tombstoned ids still count.
    total_count: usize,
    allocator: Arc<dyn Allocator>,
    /// Bytes currently charged to the allocator, released on drop.
    charged: usize,
}

impl LabelTable {
    /// Reverse map on, duplicate compression off.
    pub fn new(allocator: Arc<dyn Allocator>) -> Self {
        Self::with_config(allocator, LabelTableConfig::default())
    }

    /// Construct with explicit mode switches; both are fixed for the
    /// table's lifetime apart from the one-way [`set_immutable`] transition.
    ///
    /// [`set_immutable`]: LabelTable::set_immutable
    pub fn with_config(allocator: Arc<dyn Allocator>, config: LabelTableConfig) -> Self {
        let lookup = if config.use_reverse_map {
            ReverseLookup::Map(HashMap::new())
        } else {
            ReverseLookup::Scan
        };
        Self {
            slots: Vec::new(),
            lookup,
            removed: HashSet::new(),
            duplicates: HashMap::new(),
            compress_duplicates: config.compress_duplicates,
            total_count: 0,
            allocator,
            charged: 0,
        }
    }

    /// Store `label` at position `id`, growing the identity store when `id`
    /// lies beyond the current capacity. Re-inserting a label that already
    /// exists at a different id is allowed (that is how duplicates arise)
    /// and does NOT register a duplicate group; call [`set_duplicate`]
    /// explicitly for that.
    ///
    /// Re-insertion at an occupied slot overwrites the label and leaves the
    /// occupied count unchanged; a reverse-map entry still pointing at this
    /// id under the old label is dropped rather than left orphaned.
    ///
    /// [`set_duplicate`]: LabelTable::set_duplicate
    pub fn insert(&mut self, id: InternalId, label: LabelId) -> Result<()> {
        let idx = id as usize;
        if idx >= self.slots.len() {
            self.grow_to(idx + 1)?;
        }

        let needs_entry = match &self.lookup {
            ReverseLookup::Map(map) => !map.contains_key(&label),
            ReverseLookup::Scan => false,
        };
        if needs_entry {
            self.charge(REVERSE_ENTRY_BYTES)?;
        }

        let previous = self.slots[idx].replace(label);
        let mut orphan_dropped = false;
        match previous {
            None => self.total_count += 1,
            Some(old) if old != label => {
                if let ReverseLookup::Map(map) = &mut self.lookup {
                    if map.get(&old) == Some(&id) {
                        map.remove(&old);
                        orphan_dropped = true;
                    }
                }
            }
            Some(_) => {}
        }
        if orphan_dropped {
            // The map shrank by the orphaned entry; a fresh entry for the
            // new label, if any, was already charged above
            self.refund(REVERSE_ENTRY_BYTES);
        }

        if let ReverseLookup::Map(map) = &mut self.lookup {
            map.insert(label, id);
        }
        Ok(())
    }

    /// Label stored at `id`. Fails for out-of-range or never-inserted ids,
    /// including unfilled holes left by sparse insertion.
    pub fn label_by_id(&self, id: InternalId) -> Result<LabelId> {
        self.slots
            .get(id as usize)
            .copied()
            .flatten()
            .ok_or(LabelTableError::IdNotFound(id))
    }

    /// Representative internal id for `label`. Tombstoned entries are
    /// invisible unless `allow_removed` is set.
    pub fn id_by_label(&self, label: LabelId, allow_removed: bool) -> Result<InternalId> {
        let id = self
            .lookup
            .resolve(&self.slots, label)
            .ok_or(LabelTableError::LabelNotFound(label))?;
        if !allow_removed && self.removed.contains(&id) {
            return Err(LabelTableError::LabelNotFound(label));
        }
        Ok(id)
    }

    /// True iff `label` resolves to a non-tombstoned id. Never fails.
    pub fn contains_label(&self, label: LabelId) -> bool {
        self.lookup
            .resolve(&self.slots, label)
            .is_some_and(|id| !self.removed.contains(&id))
    }

    /// One-way transition to read-mostly mode: releases the reverse map
    /// and falls back to linear-scan lookups. Once an index stops taking
    /// new labels the map's memory is pure overhead if reverse lookups are
    /// rare. Idempotent.
    pub fn set_immutable(&mut self) {
        let entries = match &self.lookup {
            ReverseLookup::Map(map) => map.len(),
            ReverseLookup::Scan => return,
        };
        self.lookup = ReverseLookup::Scan;
        self.refund(entries * REVERSE_ENTRY_BYTES);
        debug!(entries, "reverse map released; lookups now linear scan");
    }

    /// True while the hash reverse index is active.
    pub fn uses_reverse_map(&self) -> bool {
        matches!(self.lookup, ReverseLookup::Map(_))
    }

    /// True when the owning index compresses repeated labels through the
    /// duplicate registry instead of storing each occurrence.
    pub fn compress_duplicates(&self) -> bool {
        self.compress_duplicates
    }

    /// Tombstone the id `label` resolves to (resolution ignores existing
    /// tombstones, so re-removal is a no-op). Returns the resolved id.
    pub fn mark_removed(&mut self, label: LabelId) -> Result<InternalId> {
        let id = self.id_by_label(label, true)?;
        if !self.removed.contains(&id) {
            self.charge(TOMBSTONE_BYTES)?;
            self.removed.insert(id);
        }
        Ok(id)
    }

    /// True iff `id` is tombstoned. A never-inserted id reports `false`.
    pub fn is_removed(&self, id: InternalId) -> bool {
        self.removed.contains(&id)
    }

    /// Snapshot filter over the tombstone set for the query path, or `None`
    /// when nothing is tombstoned so the pipeline can skip filtering
    /// entirely. Callers should take a fresh filter per query.
    pub fn deleted_ids_filter(&self) -> Option<DeletedIdsFilter> {
        if self.removed.is_empty() {
            return None;
        }
        Some(DeletedIdsFilter::new(self.removed.clone()))
    }

    /// Register `duplicate` as a duplicate of `primary`. Retrieval is
    /// supported from the primary side only; the relation is not made
    /// bidirectional. Registering an id as its own duplicate is a no-op.
    pub fn set_duplicate(&mut self, primary: InternalId, duplicate: InternalId) -> Result<()> {
        if !self.is_occupied(primary) {
            return Err(LabelTableError::IdNotFound(primary));
        }
        if !self.is_occupied(duplicate) {
            return Err(LabelTableError::IdNotFound(duplicate));
        }
        if primary == duplicate {
            return Ok(());
        }

        let mut bytes = 0;
        if !self.duplicates.contains_key(&primary) {
            bytes += GROUP_HEADER_BYTES;
        }
        let already = self
            .duplicates
            .get(&primary)
            .is_some_and(|group| group.contains(&duplicate));
        if !already {
            bytes += GROUP_MEMBER_BYTES;
        }
        if bytes > 0 {
            self.charge(bytes)?;
        }

        self.duplicates.entry(primary).or_default().insert(duplicate);
        Ok(())
    }

    /// Registered duplicate set for `id`; empty when none. Querying a
    /// non-primary member does not find its group.
    pub fn duplicates_of(&self, id: InternalId) -> HashSet<InternalId> {
        self.duplicates.get(&id).cloned().unwrap_or_default()
    }

    /// Grow the identity store to hold ids up to `new_capacity - 1`,
    /// preserving all labels, tombstones, and duplicate groups. Shrinking
    /// is unsupported: requests at or below the current capacity are
    /// ignored.
    pub fn resize(&mut self, new_capacity: usize) -> Result<()> {
        if new_capacity > self.slots.len() {
            self.grow_to(new_capacity)?;
        }
        Ok(())
    }

    /// Number of occupied ids. Tombstoned ids still count.
    pub fn total_count(&self) -> usize {
        self.total_count
    }

    /// Size of the internal id space `[0, capacity)`; may exceed the
    /// occupied count after a resize or sparse insertion.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Best-effort resident-memory estimate across all four facets, for
    /// index-wide accounting. Non-decreasing under insertion; drops when
    /// `set_immutable` releases the reverse map.
    pub fn memory_usage(&self) -> usize {
        let mut bytes = mem::size_of::<Self>();
        bytes += self.slots.capacity() * SLOT_BYTES;
        if let ReverseLookup::Map(map) = &self.lookup {
            bytes += map.capacity() * REVERSE_ENTRY_BYTES;
        }
        bytes += self.removed.capacity() * TOMBSTONE_BYTES;
        bytes += self.duplicates.capacity() * GROUP_HEADER_BYTES;
        for group in self.duplicates.values() {
            bytes += group.capacity() * GROUP_MEMBER_BYTES;
        }
        bytes
    }

    /// Write the full table state to a sequential byte stream.
    ///
    /// Wire format, little-endian, fixed order: magic, version, capacity,
    /// occupied count, one `(id, label)` pair per occupied slot in id
    /// order, the tombstone set, then the duplicate registry (group count,
    /// then per group: primary, member count, members). Sets are emitted
    /// sorted so identical tables produce identical bytes.
    pub fn serialize<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&FORMAT_MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&(self.slots.len() as u64).to_le_bytes())?;
        writer.write_all(&(self.total_count as u64).to_le_bytes())?;

        for (idx, slot) in self.slots.iter().enumerate() {
            if let Some(label) = slot {
                writer.write_all(&(idx as InternalId).to_le_bytes())?;
                writer.write_all(&label.to_le_bytes())?;
            }
        }

        writer.write_all(&(self.removed.len() as u64).to_le_bytes())?;
        let mut removed: Vec<InternalId> = self.removed.iter().copied().collect();
        removed.sort_unstable();
        for id in removed {
            writer.write_all(&id.to_le_bytes())?;
        }

        writer.write_all(&(self.duplicates.len() as u64).to_le_bytes())?;
        let mut primaries: Vec<InternalId> = self.duplicates.keys().copied().collect();
        primaries.sort_unstable();
        for primary in primaries {
            let group = &self.duplicates[&primary];
            writer.write_all(&primary.to_le_bytes())?;
            writer.write_all(&(group.len() as u64).to_le_bytes())?;
            let mut members: Vec<InternalId> = group.iter().copied().collect();
            members.sort_unstable();
            for member in members {
                writer.write_all(&member.to_le_bytes())?;
            }
        }
        Ok(())
    }

    /// Replace this table's state with a stream written by [`serialize`].
    ///
    /// The whole stream is parsed and validated before any existing state
    /// is touched; corrupt or truncated input fails with
    /// [`LabelTableError::Deserialization`] and leaves the table as it was.
    /// The reverse map is rebuilt only if this table's own mode calls for
    /// one, so source and destination flags need not match.
    ///
    /// [`serialize`]: LabelTable::serialize
    pub fn deserialize<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        let mut magic = [0u8; 4];
        read_bytes(reader, &mut magic)?;
        if magic != FORMAT_MAGIC {
            return Err(LabelTableError::Deserialization(
                "invalid magic bytes".to_string(),
            ));
        }
        let version = read_u32(reader)?;
        if version != FORMAT_VERSION {
            return Err(LabelTableError::VersionMismatch {
                expected: FORMAT_VERSION,
                actual: version,
            });
        }

        let capacity = read_u64(reader)?;
        // Internal ids are u32, so any larger declared capacity is corrupt;
        // reject before allocating slots for it.
        if capacity > u64::from(u32::MAX) + 1 {
            return Err(LabelTableError::Deserialization(format!(
                "declared capacity {capacity} exceeds the internal id space"
            )));
        }
        let capacity = capacity as usize;
        let total_count = read_u64(reader)? as usize;
        if total_count > capacity {
            return Err(LabelTableError::Deserialization(format!(
                "occupied count {total_count} exceeds capacity {capacity}"
            )));
        }

        let mut slots: Vec<Option<LabelId>> = vec![None; capacity];
        for _ in 0..total_count {
            let id = read_u32(reader)?;
            let label = read_u64(reader)?;
            let slot = slots.get_mut(id as usize).ok_or_else(|| {
                LabelTableError::Deserialization(format!(
                    "identity entry id {id} out of bounds (capacity {capacity})"
                ))
            })?;
            if slot.replace(label).is_some() {
                return Err(LabelTableError::Deserialization(format!(
                    "identity entry id {id} appears twice"
                )));
            }
        }

        let removed_count = read_u64(reader)? as usize;
        if removed_count > total_count {
            return Err(LabelTableError::Deserialization(format!(
                "tombstone count {removed_count} exceeds occupied count {total_count}"
            )));
        }
        let mut removed: HashSet<InternalId> = HashSet::with_capacity(removed_count);
        for _ in 0..removed_count {
            let id = read_u32(reader)?;
            if slots.get(id as usize).copied().flatten().is_none() {
                return Err(LabelTableError::Deserialization(format!(
                    "tombstone references unoccupied id {id}"
                )));
            }
            removed.insert(id);
        }

        let group_count = read_u64(reader)? as usize;
        let mut duplicates: HashMap<InternalId, HashSet<InternalId>> =
            HashMap::with_capacity(group_count);
        let mut member_total = 0usize;
        for _ in 0..group_count {
            let primary = read_u32(reader)?;
            if slots.get(primary as usize).copied().flatten().is_none() {
                return Err(LabelTableError::Deserialization(format!(
                    "duplicate group primary {primary} is unoccupied"
                )));
            }
            let member_count = read_u64(reader)? as usize;
            if member_count == 0 {
                return Err(LabelTableError::Deserialization(format!(
                    "duplicate group for primary {primary} is empty"
                )));
            }
            let mut group: HashSet<InternalId> = HashSet::with_capacity(member_count);
            for _ in 0..member_count {
                let member = read_u32(reader)?;
                if member == primary {
                    return Err(LabelTableError::Deserialization(format!(
                        "id {member} registered as its own duplicate"
                    )));
                }
                if slots.get(member as usize).copied().flatten().is_none() {
                    return Err(LabelTableError::Deserialization(format!(
                        "duplicate group member {member} is unoccupied"
                    )));
                }
                if !group.insert(member) {
                    return Err(LabelTableError::Deserialization(format!(
                        "duplicate group member {member} appears twice"
                    )));
                }
            }
            if duplicates.insert(primary, group).is_some() {
                return Err(LabelTableError::Deserialization(format!(
                    "duplicate group primary {primary} appears twice"
                )));
            }
            member_total += member_count;
        }

        let lookup = if self.uses_reverse_map() {
            let mut map: HashMap<LabelId, InternalId> = HashMap::with_capacity(total_count);
            for (idx, slot) in slots.iter().enumerate() {
                if let Some(label) = slot {
                    // Highest id wins as the representative for a repeated
                    // label; insertion order is not recoverable from the
                    // stream.
                    map.insert(*label, idx as InternalId);
                }
            }
            ReverseLookup::Map(map)
        } else {
            ReverseLookup::Scan
        };
        let reverse_entries = match &lookup {
            ReverseLookup::Map(map) => map.len(),
            ReverseLookup::Scan => 0,
        };

        // Charge the restored state before swapping it in, so a refused
        // allocation leaves the old table intact.
        let needed = capacity * SLOT_BYTES
            + reverse_entries * REVERSE_ENTRY_BYTES
            + removed.len() * TOMBSTONE_BYTES
            + duplicates.len() * GROUP_HEADER_BYTES
            + member_total * GROUP_MEMBER_BYTES;
        self.allocator.allocate(needed)?;
        let released = mem::replace(&mut self.charged, needed);
        self.allocator.deallocate(released);

        self.slots = slots;
        self.lookup = lookup;
        self.removed = removed;
        self.duplicates = duplicates;
        self.total_count = total_count;
        debug!(
            total_count,
            capacity,
            tombstones = self.removed.len(),
            duplicate_groups = self.duplicates.len(),
            "label table restored from stream"
        );
        Ok(())
    }

    fn is_occupied(&self, id: InternalId) -> bool {
        self.slots.get(id as usize).copied().flatten().is_some()
    }

    fn grow_to(&mut self, capacity: usize) -> Result<()> {
        let delta = capacity - self.slots.len();
        self.charge(delta * SLOT_BYTES)?;
        self.slots.resize(capacity, None);
        Ok(())
    }

    fn charge(&mut self, bytes: usize) -> Result<()> {
        self.allocator.allocate(bytes)?;
        self.charged += bytes;
        Ok(())
    }

    fn refund(&mut self, bytes: usize) {
        let bytes = bytes.min(self.charged);
        self.allocator.deallocate(bytes);
        self.charged -= bytes;
    }
}

impl Drop for LabelTable {
    fn drop(&mut self) {
        self.allocator.deallocate(self.charged);
    }
}

fn read_bytes<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            LabelTableError::Deserialization("unexpected end of stream".to_string())
        } else {
            LabelTableError::Io(e)
        }
    })
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_bytes(reader, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    read_bytes(reader, &mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
