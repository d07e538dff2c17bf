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

//! Deleted-ids filter handed to the search path.
//!
//! During retrieval the query pipeline asks the label table for a filter,
//! drops tombstoned candidates with it, and over-fetches to compensate:
//!
//! 1. Get top-K candidates from the graph
//! 2. Filter out deleted ids (O(1) per candidate)
//! 3. Fetch more candidates if needed (over-fetch strategy)
//!
//! The filter is a point-in-time snapshot: tombstones added after it was
//! obtained are invisible to it, so callers request a fresh filter per
//! query. Ids that are duplicates of a tombstoned primary are NOT excluded
//! here; reconciling duplicate groups against tombstones is the search
//! layer's policy.

use std::collections::HashSet;

use crate::label_table::InternalId;

/// Read-only membership view over the tombstone set.
#[derive(Debug, Clone)]
pub struct DeletedIdsFilter {
    removed: HashSet<InternalId>,
}

impl DeletedIdsFilter {
    pub(crate) fn new(removed: HashSet<InternalId>) -> Self {
        Self { removed }
    }

    /// True iff `id` was tombstoned when the filter was taken.
    #[inline]
    pub fn is_deleted(&self, id: InternalId) -> bool {
        self.removed.contains(&id)
    }

    /// True iff `id` may appear in results.
    #[inline]
    pub fn allows(&self, id: InternalId) -> bool {
        !self.is_deleted(id)
    }

    /// Number of tombstones covered by this snapshot. Always non-zero: the
    /// table returns `None` instead of an empty filter.
    pub fn deleted_count(&self) -> usize {
        self.removed.len()
    }

    /// Drop tombstoned ids from a candidate list in place.
    pub fn retain_allowed(&self, ids: &mut Vec<InternalId>) {
        ids.retain(|id| self.allows(*id));
    }

    /// How many candidates to fetch to end up with `k` live results, given
    /// `total` occupied ids. Over-fetches proportionally to the deletion
    /// rate, with a 20% safety margin.
    pub fn effective_k(&self, k: usize, total: usize) -> usize {
        if total == 0 {
            return k;
        }
        let deletion_rate = (self.removed.len() as f32 / total as f32).min(0.9);
        if deletion_rate < 0.01 {
            (k as f32 * 1.05).ceil() as usize
        } else {
            let factor = 1.0 / (1.0 - deletion_rate);
            (k as f32 * factor * 1.2).ceil() as usize
        }
    }
}
