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

//! Allocator capability injected into the label table.
//!
//! The owning index composes a memory budget across all of its components,
//! so the label table never allocates against an ambient global budget.
//! Stable Rust cannot thread a custom allocator through `std` containers;
//! the capability is therefore rendered as byte accounting: every structural
//! growth is charged through [`Allocator::allocate`] before it happens, and
//! every charge is released through [`Allocator::deallocate`] when the
//! structure shrinks or is dropped.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

/// Allocation refused by the capability (e.g. budget exhausted).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("allocation of {requested} bytes exceeds remaining budget of {available} bytes")]
pub struct AllocError {
    /// Bytes the caller asked for.
    pub requested: usize,
    /// Bytes the allocator had left.
    pub available: usize,
}

/// Byte-accounting allocator capability.
///
/// Shared across the owning index; implementations must be safe to consult
/// from concurrent readers.
pub trait Allocator: Send + Sync {
    /// Charge `bytes` against the allocator. Fails when the request cannot
    /// be satisfied; the caller must not grow on failure.
    fn allocate(&self, bytes: usize) -> Result<(), AllocError>;

    /// Release a previous charge of `bytes`.
    fn deallocate(&self, bytes: usize);

    /// Bytes currently charged.
    fn allocated_bytes(&self) -> usize;
}

/// Unbounded allocator: plain counter, never refuses.
#[derive(Default)]
pub struct DefaultAllocator {
    allocated: AtomicUsize,
}

impl DefaultAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Allocator for DefaultAllocator {
    fn allocate(&self, bytes: usize) -> Result<(), AllocError> {
        self.allocated.fetch_add(bytes, Ordering::Relaxed);
        Ok(())
    }

    fn deallocate(&self, bytes: usize) {
        // Tolerate over-release rather than wrapping the counter.
        let _ = self
            .allocated
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                Some(cur.saturating_sub(bytes))
            });
    }

    fn allocated_bytes(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for DefaultAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultAllocator")
            .field("allocated", &self.allocated_bytes())
            .finish()
    }
}

/// Allocator with a hard byte cap. Exceeding the cap yields [`AllocError`],
/// which propagates unmodified out of the label table's mutating operations.
pub struct BudgetAllocator {
    budget: usize,
    allocated: AtomicUsize,
}

impl BudgetAllocator {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            allocated: AtomicUsize::new(0),
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }
}

impl Allocator for BudgetAllocator {
    fn allocate(&self, bytes: usize) -> Result<(), AllocError> {
        let mut cur = self.allocated.load(Ordering::Relaxed);
        loop {
            let available = self.budget - cur;
            if bytes > available {
                return Err(AllocError {
                    requested: bytes,
                    available,
                });
            }
            match self.allocated.compare_exchange_weak(
                cur,
                cur + bytes,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(()),
                Err(observed) => cur = observed,
            }
        }
    }

    fn deallocate(&self, bytes: usize) {
        let _ = self
            .allocated
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                Some(cur.saturating_sub(bytes))
            });
    }

    fn allocated_bytes(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for BudgetAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BudgetAllocator")
            .field("budget", &self.budget)
            .field("allocated", &self.allocated_bytes())
            .finish()
    }
}
