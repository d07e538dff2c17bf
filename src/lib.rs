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

//! Vectra Label Management Layer
//!
//! Maps externally visible labels (arbitrary, possibly sparse or repeated
//! 64-bit values) to the dense internal ids used by the index's graph and
//! flat storage layers, and back.
//!
//! # Components
//!
//! - [`LabelTable`]: identity store, optional hash reverse index with a
//!   linear-scan fallback after [`LabelTable::set_immutable`], tombstone
//!   set, and explicit duplicate registry, with binary serialization over
//!   `std::io` streams.
//! - [`DeletedIdsFilter`]: point-in-time tombstone snapshot the query path
//!   uses to drop deleted candidates; `None` when nothing is deleted so the
//!   hot path can skip filtering entirely.
//! - [`Allocator`]: injected byte-accounting capability so the owning index
//!   composes one memory budget across all of its components.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use vectra_labels::{DefaultAllocator, LabelTable};
//!
//! let mut table = LabelTable::new(Arc::new(DefaultAllocator::new()));
//! table.insert(0, 9001).unwrap();
//! table.insert(1, 9002).unwrap();
//!
//! assert_eq!(table.label_by_id(0).unwrap(), 9001);
//! assert_eq!(table.id_by_label(9002, false).unwrap(), 1);
//!
//! table.mark_removed(9001).unwrap();
//! assert!(!table.contains_label(9001));
//! assert!(table.deleted_ids_filter().unwrap().is_deleted(0));
//! ```
//!
//! The table assumes the single-writer discipline of its owning index and
//! carries no locks of its own; `&mut self` on every mutator states that
//! contract in the signature.

pub mod alloc;
pub mod error;
pub mod filter;
pub mod label_table;

pub use alloc::{AllocError, Allocator, BudgetAllocator, DefaultAllocator};
pub use error::{LabelTableError, Result};
pub use filter::DeletedIdsFilter;
pub use label_table::{InternalId, LabelId, LabelTable, LabelTableConfig};
