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

//! A hash set, implemented as a thin wrapper over [`SwissMap<T, ()>`].

use crate::error::TryReserveError;
use crate::map::{self, SwissMap};
use crate::mapalloc::{Allocator, Global};
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::iter::FromIterator;
use std::collections::hash_map::RandomState;

/// A hash set with the same external shape as [`std::collections::HashSet`].
pub struct SwissSet<T, S = RandomState, A: Allocator + Clone = Global> {
    map: SwissMap<T, (), S, A>,
}

impl<T> SwissSet<T, RandomState> {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: SwissMap::with_capacity(capacity),
        }
    }
}

impl<T> Default for SwissSet<T, RandomState> {
    fn default() -> Self {
        Self {
            map: SwissMap::default(),
        }
    }
}

impl<T, S> SwissSet<T, S> {
    pub fn with_hasher(hash_builder: S) -> Self {
        Self {
            map: SwissMap::with_hasher(hash_builder),
        }
    }
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            map: SwissMap::with_capacity_and_hasher(capacity, hash_builder),
        }
    }
}

impl<T, S, A: Allocator + Clone> SwissSet<T, S, A> {
    pub fn len(&self) -> usize {
        self.map.len()
    }
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
    pub fn capacity(&self) -> usize {
        self.map.capacity()
    }
    pub fn clear(&mut self) {
        self.map.clear()
    }
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            inner: self.map.iter(),
        }
    }
}

impl<T: Eq + Hash, S: BuildHasher, A: Allocator + Clone> SwissSet<T, S, A> {
    pub fn reserve(&mut self, additional: usize) {
        self.map.reserve(additional)
    }
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        self.map.try_reserve(additional)
    }
    pub fn shrink_to_fit(&mut self) {
        self.map.shrink_to_fit()
    }
    pub fn shrink_to(&mut self, min_capacity: usize) {
        self.map.shrink_to(min_capacity)
    }

    /// Give back spare capacity down to the default shrink target, never
    /// below what's needed to hold the values currently stored.
    pub fn trim(&mut self) {
        self.map.trim()
    }

    pub fn try_trim(&mut self) -> Result<(), TryReserveError> {
        self.map.try_trim()
    }

    /// Insert `value`, returning `true` if it was newly inserted. A set is
    /// implemented as a map whose values carry no information.
    pub fn insert(&mut self, value: T) -> bool {
        self.map.insert(value, ()).is_none()
    }

    /// Alias for [`SwissSet::insert`].
    ///
    /// `insert`/`add` panic on allocation failure rather than returning a
    /// `Result`; [`SwissSet::try_reserve`] is the fallible seam for that path
    /// — call it first to guarantee room for the value about to be inserted
    /// if the allocator's failure needs to be observable.
    pub fn add(&mut self, value: T) -> bool {
        self.insert(value)
    }

    pub fn contains<Q: ?Sized>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.map.contains_key(value)
    }

    /// Return the canonical stored value equal to `value`, if present.
    pub fn get<Q: ?Sized>(&self, value: &Q) -> Option<&T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.map.get_key_value(value).map(|(k, _)| k)
    }

    /// Resolve the bucket index currently backing `value`, if present. Not
    /// stable across any mutation.
    pub fn index_of<Q: ?Sized>(&self, value: &Q) -> Option<usize>
    where
        T: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.map.bucket_index(value)
    }

    pub fn remove<Q: ?Sized>(&mut self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.map.remove(value).is_some()
    }

    /// Remove `value`, then [`SwissSet::trim`] the table.
    pub fn remove_and_shrink<Q: ?Sized>(&mut self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.map.remove_and_shrink(value).is_some()
    }
}

impl<T: Eq + Hash + fmt::Debug, S: BuildHasher, A: Allocator + Clone> fmt::Debug
    for SwissSet<T, S, A>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T: Eq + Hash + Clone, S: BuildHasher + Clone, A: Allocator + Clone> Clone
    for SwissSet<T, S, A>
where
    SwissMap<T, (), S, A>: Clone,
{
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
        }
    }
}

impl<T: Eq + Hash, S: BuildHasher + Default> FromIterator<T> for SwissSet<T, S> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut set = Self::with_capacity_and_hasher(iter.size_hint().0, S::default());
        for v in iter {
            set.insert(v);
        }
        set
    }
}

impl<'a, T, S, A: Allocator + Clone> IntoIterator for &'a SwissSet<T, S, A> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct Iter<'a, T> {
    inner: map::Iter<'a, T, ()>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Owned iterator produced by [`IntoIterator::into_iter`] on a [`SwissSet`] by value.
pub struct IntoIter<T, A: Allocator + Clone = Global> {
    inner: map::IntoIter<T, (), A>,
}

impl<T, A: Allocator + Clone> Iterator for IntoIter<T, A> {
    type Item = T;
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(v, ())| v)
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T, S, A: Allocator + Clone> IntoIterator for SwissSet<T, S, A> {
    type Item = T;
    type IntoIter = IntoIter<T, A>;
    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.map.into_iter(),
        }
    }
}

impl<T: Eq + Hash, S: BuildHasher, A: Allocator + Clone> Extend<T> for SwissSet<T, S, A> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.map.extend(iter.into_iter().map(|v| (v, ())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_reports_whether_value_was_new() {
        let mut set: SwissSet<u32> = SwissSet::new();
        assert!(set.insert(1));
        assert!(!set.insert(1));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remove_and_contains_roundtrip() {
        let mut set: SwissSet<&str> = SwissSet::new();
        set.insert("x");
        assert!(set.contains("x"));
        assert!(set.remove("x"));
        assert!(!set.contains("x"));
    }

    #[test]
    fn get_returns_the_canonical_stored_value() {
        let mut set: SwissSet<String> = SwissSet::new();
        set.insert("hello".to_string());
        assert_eq!(set.get("hello"), Some(&"hello".to_string()));
        assert_eq!(set.get("missing"), None);
    }

    #[test]
    fn extend_inserts_every_value_from_an_iterator() {
        let mut set: SwissSet<u32> = SwissSet::new();
        set.insert(0);
        set.extend(1..10);
        assert_eq!(set.len(), 10);
        for i in 0..10 {
            assert!(set.contains(&i));
        }
    }

    #[test]
    fn into_iter_consumes_the_set_and_yields_every_value() {
        let mut set: SwissSet<u32> = SwissSet::new();
        for i in 0..30 {
            set.insert(i);
        }
        let mut values: Vec<_> = set.into_iter().collect();
        values.sort();
        assert_eq!(values, (0..30).collect::<Vec<_>>());
    }

    #[test]
    fn index_of_resolves_a_live_bucket_and_none_for_absent_values() {
        let mut set: SwissSet<u32> = SwissSet::new();
        set.add(42);
        let idx = set.index_of(&42).expect("42 was just inserted");
        assert!(idx < set.capacity());
        assert_eq!(set.index_of(&43), None);
    }

    #[test]
    fn remove_and_shrink_drops_capacity_after_a_hit() {
        let mut set: SwissSet<u32> = SwissSet::new();
        for i in 0..500u32 {
            set.add(i);
        }
        for i in 1..500u32 {
            set.remove(&i);
        }
        let buckets_before = set.capacity();
        assert!(set.remove_and_shrink(&0));
        assert!(set.capacity() <= buckets_before);
        assert!(!set.contains(&0));
    }

    #[test]
    fn large_set_matches_std_hashset_membership() {
        use std::collections::HashSet as StdHashSet;
        let mut set: SwissSet<u32> = SwissSet::new();
        let mut reference = StdHashSet::new();
        for i in 0..10_000u32 {
            set.insert(i);
            reference.insert(i);
        }
        for i in (0..10_000u32).step_by(3) {
            set.remove(&i);
            reference.remove(&i);
        }
        assert_eq!(set.len(), reference.len());
        for v in &reference {
            assert!(set.contains(v));
        }
    }
}
