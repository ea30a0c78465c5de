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

//! A SIMD-accelerated, open-addressed hash set/map engine in the style of
//! Abseil's `raw_hash_set` and `hashbrown`.
//!
//! The table keeps one metadata byte per bucket (`EMPTY`, `DELETED`, or a
//! 7-bit tag of the entry's hash) in a separate array from the entries
//! themselves, and scans eight (or sixteen, with SSE2) of those bytes at a
//! time while probing. [`SwissMap`] and [`SwissSet`] are the public,
//! `std`-shaped surfaces over the lower-level [`raw::RawTable`]; most callers
//! should reach for those two rather than `raw` directly.

mod bitmask;
mod control_bytes;
mod error;
mod generic;
mod map;
mod mapalloc;
mod raw;
mod scopeguard;
mod set;
mod sse2;
mod util;

cfg_if::cfg_if! {
    if #[cfg(all(
        target_feature = "sse2",
        any(target_arch = "x86", target_arch = "x86_64")
    ))] {
        use sse2 as imp;
    } else {
        use generic as imp;
    }
}

pub use error::{Fallibility, TryReserveError};
pub use map::SwissMap;
pub use mapalloc::{Allocator, Global};
pub use raw::{Bucket, RawDrain, RawIter, RawTable};
pub use set::SwissSet;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_and_set_are_reexported_at_the_crate_root() {
        let mut map: SwissMap<u32, u32> = SwissMap::new();
        map.insert(1, 2);
        assert_eq!(map.get(&1), Some(&2));

        let mut set: SwissSet<u32> = SwissSet::new();
        assert!(set.insert(1));
        assert!(set.contains(&1));
    }
}
