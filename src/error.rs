/*
 * Created on Wed Jun 02 2021
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2021, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

use core::alloc::Layout;
use core::fmt;
use std::alloc::handle_alloc_error;

/// The only fallible outcome a table operation can have: the caller asked
/// for more capacity than can be provided.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TryReserveError {
    /// The computed capacity would overflow `usize`, or would require an
    /// allocation larger than `isize::MAX` on a 32-bit target.
    CapacityOverflow,
    /// The allocator itself refused the request.
    AllocatorError {
        /// The layout that the allocator failed to satisfy.
        layout: Layout,
    },
}

impl fmt::Display for TryReserveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityOverflow => write!(f, "hash table capacity overflow"),
            Self::AllocatorError { layout } => write!(
                f,
                "allocator failed to provide {} bytes (align {})",
                layout.size(),
                layout.align()
            ),
        }
    }
}

impl std::error::Error for TryReserveError {}

/// Whether a table operation is allowed to report failure or must panic.
///
/// This mirrors the two public entry points every mutating method has: an
/// infallible one (`insert`, `reserve`, ...) that panics on the rare
/// allocation failure, and a `try_`-prefixed fallible twin that returns
/// [`TryReserveError`] instead.
#[derive(Clone, Copy)]
pub enum Fallibility {
    Fallible,
    Infallible,
}

impl Fallibility {
    pub fn capacity_overflow(self) -> TryReserveError {
        match self {
            Self::Fallible => TryReserveError::CapacityOverflow,
            Self::Infallible => panic!("hash table capacity overflow"),
        }
    }

    pub fn allocator_error(self, layout: Layout) -> TryReserveError {
        match self {
            Self::Fallible => TryReserveError::AllocatorError { layout },
            Self::Infallible => handle_alloc_error(layout),
        }
    }
}
