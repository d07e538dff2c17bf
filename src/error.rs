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

//! Error types for the label table.

use std::io;

use thiserror::Error;

use crate::alloc::AllocError;
use crate::label_table::{InternalId, LabelId};

#[derive(Debug, Error)]
pub enum LabelTableError {
    /// Internal id is out of range or was never inserted.
    #[error("internal id {0} not found")]
    IdNotFound(InternalId),

    /// Label is absent, or resolves only to a tombstoned id under a
    /// default (tombstone-invisible) lookup.
    #[error("label {0} not found")]
    LabelNotFound(LabelId),

    /// Persisted stream is malformed, truncated, or internally inconsistent.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// Persisted stream was written with an unsupported format version.
    #[error("label table format version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    /// I/O failure on the underlying byte stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Allocator capability refused the request. Propagated unmodified;
    /// retry policy belongs to the owning index.
    #[error(transparent)]
    Alloc(#[from] AllocError),
}

pub type Result<T> = std::result::Result<T, LabelTableError>;
