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

//! Large randomized end-to-end scenarios run against the public `SwissSet`/`SwissMap`
//! surface and cross-checked against `std::collections::HashSet`.

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use std::collections::HashSet as StdHashSet;
use swissmap::{SwissMap, SwissSet};

#[test]
fn single_u32_entry_roundtrips() {
    let mut set: SwissSet<u32> = SwissSet::new();
    assert!(set.insert(0xFFFF_FFFF));
    assert_eq!(set.len(), 1);
    assert!(set.contains(&0xFFFF_FFFF));
    assert!(!set.contains(&0));
}

#[test]
fn inserting_the_same_u32_twice_only_counts_once() {
    let mut set: SwissSet<u32> = SwissSet::new();
    assert!(set.insert(0xFFFF_FFFF));
    assert!(!set.insert(0xFFFF_FFFF));
    assert_eq!(set.len(), 1);
}

#[test]
fn one_million_pseudo_random_inserts_with_interleaved_removal_matches_a_reference_set() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut rng = StdRng::seed_from_u64(0x5EED_F00D);
    let mut set: SwissSet<u32> = SwissSet::new();
    let mut reference: StdHashSet<u32> = StdHashSet::new();
    let mut inserted_so_far: Vec<u32> = Vec::new();

    const N: usize = 1_048_576;
    for i in 0..N {
        let value: u32 = rng.gen();
        if set.insert(value) {
            reference.insert(value);
            inserted_so_far.push(value);
        }

        if i % 3 == 0 && !inserted_so_far.is_empty() {
            let victim_index = rng.gen_range(0..inserted_so_far.len());
            let victim = inserted_so_far.swap_remove(victim_index);
            if set.remove(&victim) {
                reference.remove(&victim);
            }
        }
    }

    assert_eq!(set.len(), reference.len());
    for v in &reference {
        assert!(set.contains(v));
    }
}

#[test]
fn mapping_u32_to_f32_supports_lookup_and_mutation_through_get_mut() {
    let mut map: SwissMap<u32, f32> = SwissMap::new();
    map.insert(0xFFFF_FFFF, 0.0);
    *map.get_mut(&0xFFFF_FFFF).expect("key was just inserted") = 0.1;
    assert_eq!(map.get(&0xFFFF_FFFF), Some(&0.1));
}

#[test]
fn trim_after_bulk_insert_drops_to_the_capacity_for_the_live_count() {
    let mut set: SwissSet<u32> = SwissSet::new();
    for i in 0..1_000u32 {
        set.insert(i);
    }
    set.shrink_to_fit();
    for i in 0..1_000u32 {
        assert!(set.contains(&i));
    }
    assert_eq!(set.len(), 1_000);
}

#[test]
fn dense_key_set_forces_an_in_place_rehash_then_a_resize_with_every_key_surviving() {
    let mut rng = StdRng::seed_from_u64(0x0B1E_CAFE);
    let mut set: SwissSet<u32> = SwissSet::new();
    let mut live: Vec<u32> = Vec::new();

    // Build up heavy tombstone churn (inserts immediately followed by mostly
    // removals) so growth is satisfied by an in-place rehash rather than an
    // allocation, then push well past capacity to force a genuine resize.
    for round in 0..10u32 {
        let mut batch: Vec<u32> = (0..256).map(|i| round * 10_000 + i).collect();
        batch.shuffle(&mut rng);
        for &v in &batch {
            set.insert(v);
        }
        for &v in &batch[..192] {
            set.remove(&v);
        }
        live.extend(&batch[192..]);
    }

    for i in 0..20_000u32 {
        set.insert(2_000_000 + i);
        live.push(2_000_000 + i);
    }

    for v in &live {
        assert!(set.contains(v));
    }
    assert_eq!(set.len(), live.len());
}
