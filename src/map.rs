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

//! A hash map built on the swiss-table [`RawTable`], generic over the
//! [`BuildHasher`] used to derive both H1 and H2 from a key.

use crate::error::TryReserveError;
use crate::mapalloc::{Allocator, Global};
use crate::raw::{Bucket, RawDrain, RawIter, RawTable};
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash, Hasher};
use core::iter::FromIterator;
use core::mem;
use std::collections::hash_map::RandomState;

fn make_hash<K: Hash + ?Sized>(hash_builder: &impl BuildHasher, val: &K) -> u64 {
    let mut state = hash_builder.build_hasher();
    val.hash(&mut state);
    state.finish()
}

fn equivalent_key<Q: ?Sized, K, V>(k: &Q) -> impl Fn(&(K, V)) -> bool + '_
where
    K: Borrow<Q>,
    Q: Eq,
{
    move |x| k.eq(x.0.borrow())
}

/// A hash map with the same external shape as [`std::collections::HashMap`],
/// backed by a SIMD-scanned swiss table rather than Rust's SipHash-keyed
/// Robin Hood table.
pub struct SwissMap<K, V, S = RandomState, A: Allocator + Clone = Global> {
    hash_builder: S,
    table: RawTable<(K, V), A>,
}

impl<K, V> SwissMap<K, V, RandomState> {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, RandomState::default())
    }
}

impl<K, V> Default for SwissMap<K, V, RandomState> {
    fn default() -> Self {
        Self {
            hash_builder: RandomState::default(),
            table: RawTable::new(),
        }
    }
}

impl<K, V, S> SwissMap<K, V, S> {
    pub fn with_hasher(hash_builder: S) -> Self {
        Self {
            hash_builder,
            table: RawTable::new(),
        }
    }
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            hash_builder,
            table: RawTable::with_capacity(capacity),
        }
    }
}

impl<K, V, S, A: Allocator + Clone> SwissMap<K, V, S, A> {
    pub fn len(&self) -> usize {
        self.table.len()
    }
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
    pub fn capacity(&self) -> usize {
        self.table.buckets()
    }
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }
    pub fn clear(&mut self) {
        self.table.clear();
    }
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: unsafe { self.table.iter() },
            marker: core::marker::PhantomData,
        }
    }
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            inner: unsafe { self.table.iter() },
            marker: core::marker::PhantomData,
        }
    }
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.iter_mut(),
        }
    }
    pub fn drain(&mut self) -> Drain<'_, K, V, A> {
        Drain {
            inner: self.table.drain(),
        }
    }
}

impl<K: Eq + Hash, V, S: BuildHasher, A: Allocator + Clone> SwissMap<K, V, S, A> {
    fn hash_of<Q: ?Sized>(&self, k: &Q) -> u64
    where
        K: Borrow<Q>,
        Q: Hash,
    {
        make_hash(&self.hash_builder, k)
    }

    fn hasher_fn(&self) -> impl Fn(&(K, V)) -> u64 + '_ {
        move |(k, _)| make_hash(&self.hash_builder, k)
    }

    /// Reserve room for `additional` more entries.
    pub fn reserve(&mut self, additional: usize) {
        let hasher = self.hasher_fn();
        self.table.reserve(additional, hasher)
    }

    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        let hasher = self.hasher_fn();
        self.table.try_reserve(additional, hasher)
    }

    /// Give back spare capacity down to the default shrink target, never
    /// below what's needed to hold the entries currently stored.
    pub fn trim(&mut self) {
        let hasher = self.hasher_fn();
        self.table.trim(hasher)
    }

    pub fn try_trim(&mut self) -> Result<(), TryReserveError> {
        let hasher = self.hasher_fn();
        self.table.try_trim(hasher)
    }

    /// Alias for [`SwissMap::trim`], named to match [`std::collections::HashMap`].
    pub fn shrink_to_fit(&mut self) {
        self.trim()
    }

    pub fn shrink_to(&mut self, min_capacity: usize) {
        let hasher = self.hasher_fn();
        self.table.shrink_to(min_capacity, hasher)
    }

    /// Insert a key/value pair, returning the previous value if the key was
    /// already present.
    pub fn insert(&mut self, k: K, v: V) -> Option<V> {
        let hash = self.hash_of(&k);
        match self
            .table
            .find(hash, |(candidate, _)| *candidate == k)
        {
            Some(bucket) => {
                let (_, old_v) = unsafe { bucket.as_mut() };
                Some(mem::replace(old_v, v))
            }
            None => {
                let hasher = self.hasher_fn();
                self.table.insert(hash, (k, v), hasher);
                None
            }
        }
    }

    pub fn get<Q: ?Sized>(&self, k: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let hash = self.hash_of(k);
        self.table
            .get(hash, equivalent_key(k))
            .map(|(_, v)| v)
    }

    pub fn get_key_value<Q: ?Sized>(&self, k: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let hash = self.hash_of(k);
        self.table
            .find(hash, equivalent_key(k))
            .map(|bucket| unsafe { bucket.as_ref() })
            .map(|(k, v)| (k, v))
    }

    pub fn get_mut<Q: ?Sized>(&mut self, k: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let hash = self.hash_of(k);
        self.table
            .get_mut(hash, equivalent_key(k))
            .map(|(_, v)| v)
    }

    pub fn contains_key<Q: ?Sized>(&self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.get(k).is_some()
    }

    pub fn remove<Q: ?Sized>(&mut self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let hash = self.hash_of(k);
        match self.table.find(hash, equivalent_key(k)) {
            Some(bucket) => {
                let (_, v) = unsafe { self.table.remove(bucket) };
                Some(v)
            }
            None => None,
        }
    }

    pub fn remove_entry<Q: ?Sized>(&mut self, k: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let hash = self.hash_of(k);
        let bucket = self.table.find(hash, equivalent_key(k))?;
        Some(unsafe { self.table.remove(bucket) })
    }

    /// Remove `k`, then [`SwissMap::trim`] the table. Unlike `remove`, a hit
    /// always pays for a shrink pass, so prefer plain `remove` unless the
    /// caller specifically wants memory given back immediately.
    pub fn remove_and_shrink<Q: ?Sized>(&mut self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let removed = self.remove(k);
        if removed.is_some() {
            self.trim();
        }
        removed
    }

    /// Alias for [`SwissMap::insert`].
    ///
    /// `insert`/`add` panic on allocation failure rather than returning a
    /// `Result`; [`SwissMap::try_reserve`] is the fallible seam for that path
    /// — call it first to guarantee room for the entries about to be
    /// inserted if the allocator's failure needs to be observable.
    pub fn add(&mut self, k: K, v: V) -> Option<V> {
        self.insert(k, v)
    }

    /// Resolve the bucket index backing `k`, for [`crate::SwissSet::index_of`].
    pub(crate) fn bucket_index<Q: ?Sized>(&self, k: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let hash = self.hash_of(k);
        self.table
            .find(hash, equivalent_key(k))
            .map(|bucket| unsafe { self.table.index_of_bucket(&bucket) })
    }
}

impl<K: Eq + Hash, V: Default, S: BuildHasher, A: Allocator + Clone> SwissMap<K, V, S, A> {
    /// Return a mutable handle to the value for `k`, inserting a
    /// default-initialized `V` first if the key is absent.
    ///
    /// The handle is computed from the bucket `insert` actually wrote to, so
    /// a resize triggered by the insert is already accounted for before the
    /// reference is formed.
    pub fn find_or_insert(&mut self, k: K) -> &mut V {
        let hash = self.hash_of(&k);
        let bucket = match self.table.find(hash, |(candidate, _)| *candidate == k) {
            Some(bucket) => bucket,
            None => {
                let hasher = self.hasher_fn();
                self.table.insert(hash, (k, V::default()), hasher)
            }
        };
        let (_, v) = unsafe { bucket.as_mut() };
        v
    }
}

impl<K: Eq + Hash + fmt::Debug, V: fmt::Debug, S: BuildHasher, A: Allocator + Clone> fmt::Debug
    for SwissMap<K, V, S, A>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Eq + Hash + Clone, V: Clone, S: BuildHasher + Clone, A: Allocator + Clone> Clone
    for SwissMap<K, V, S, A>
where
    RawTable<(K, V), A>: Clone,
{
    fn clone(&self) -> Self {
        Self {
            hash_builder: self.hash_builder.clone(),
            table: self.table.clone(),
        }
    }
}

impl<K: Eq + Hash, V, S: BuildHasher + Default> FromIterator<(K, V)> for SwissMap<K, V, S> {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let iter = iter.into_iter();
        let mut map = Self::with_capacity_and_hasher(iter.size_hint().0, S::default());
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<'a, K, V, S, A: Allocator + Clone> IntoIterator for &'a SwissMap<K, V, S, A> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct Iter<'a, K, V> {
    inner: RawIter<(K, V)>,
    marker: core::marker::PhantomData<(&'a K, &'a V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);
    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|bucket| unsafe {
                let (k, v) = bucket.as_ref();
                (k, v)
            })
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

pub struct IterMut<'a, K, V> {
    inner: RawIter<(K, V)>,
    marker: core::marker::PhantomData<(&'a K, &'a mut V)>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|bucket| unsafe {
            let (k, v) = bucket.as_mut();
            (&*k, v)
        })
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

pub struct ValuesMut<'a, K, V> {
    inner: IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

pub struct Drain<'a, K, V, A: Allocator + Clone = Global> {
    inner: RawDrain<'a, (K, V), A>,
}

impl<'a, K, V, A: Allocator + Clone> Iterator for Drain<'a, K, V, A> {
    type Item = (K, V);
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Owned iterator produced by [`IntoIterator::into_iter`] on a [`SwissMap`] by value.
pub struct IntoIter<K, V, A: Allocator + Clone = Global> {
    inner: crate::raw::RawConsumingIterator<(K, V), A>,
}

impl<K, V, A: Allocator + Clone> Iterator for IntoIter<K, V, A> {
    type Item = (K, V);
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, S, A: Allocator + Clone> IntoIterator for SwissMap<K, V, S, A> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V, A>;
    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.table.into_iter(),
        }
    }
}

impl<K: Eq + Hash, V, S: BuildHasher, A: Allocator + Clone> Extend<(K, V)> for SwissMap<K, V, S, A> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_overwrites_and_returns_previous_value() {
        let mut map: SwissMap<&str, u32> = SwissMap::new();
        assert_eq!(map.insert("a", 1), None);
        assert_eq!(map.insert("a", 2), Some(1));
        assert_eq!(map.get("a"), Some(&2));
    }

    #[test]
    fn remove_returns_owned_value() {
        let mut map: SwissMap<&str, u32> = SwissMap::new();
        map.insert("a", 10);
        assert_eq!(map.remove("a"), Some(10));
        assert_eq!(map.remove("a"), None);
    }

    #[test]
    fn remove_entry_returns_the_owned_key_and_value() {
        let mut map: SwissMap<String, u32> = SwissMap::new();
        map.insert("a".to_string(), 10);
        assert_eq!(map.remove_entry("a"), Some(("a".to_string(), 10)));
        assert_eq!(map.remove_entry("a"), None);
    }

    #[test]
    fn get_key_value_returns_both_the_stored_key_and_value() {
        let mut map: SwissMap<String, u32> = SwissMap::new();
        map.insert("a".to_string(), 10);
        assert_eq!(map.get_key_value("a"), Some((&"a".to_string(), &10)));
        assert_eq!(map.get_key_value("missing"), None);
    }

    #[test]
    fn borrowed_lookup_works_for_string_keys() {
        let mut map: SwissMap<String, u32> = SwissMap::new();
        map.insert("hello".to_string(), 1);
        assert_eq!(map.get("hello"), Some(&1));
    }

    #[test]
    fn iter_visits_every_inserted_pair() {
        let mut map: SwissMap<u32, u32> = SwissMap::new();
        for i in 0..100 {
            map.insert(i, i * 2);
        }
        let mut seen: Vec<_> = map.iter().map(|(k, v)| (*k, *v)).collect();
        seen.sort();
        let expected: Vec<_> = (0..100).map(|i| (i, i * 2)).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn find_or_insert_returns_a_writable_handle() {
        let mut map: SwissMap<u32, f32> = SwissMap::new();
        map.add(0xFFFF_FFFF, 0.0);
        let handle = map.find_or_insert(0xFFFF_FFFF);
        *handle = 0.1;
        assert_eq!(map.get(&0xFFFF_FFFF), Some(&0.1));
    }

    #[test]
    fn find_or_insert_default_initializes_absent_keys() {
        let mut map: SwissMap<u32, f32> = SwissMap::new();
        let handle = map.find_or_insert(7);
        assert_eq!(*handle, 0.0);
        *handle += 1.0;
        assert_eq!(map.get(&7), Some(&1.0));
    }

    #[test]
    fn remove_and_shrink_drops_capacity_after_a_hit() {
        let mut map: SwissMap<u32, u32> = SwissMap::new();
        for i in 0..500 {
            map.insert(i, i);
        }
        for i in 1..500 {
            map.remove(&i);
        }
        let buckets_before = map.capacity();
        assert_eq!(map.remove_and_shrink(&0), Some(0));
        assert!(map.capacity() <= buckets_before);
        assert_eq!(map.get(&0), None);
    }

    #[test]
    fn iter_mut_can_mutate_every_value_in_place() {
        let mut map: SwissMap<u32, u32> = SwissMap::new();
        for i in 0..50 {
            map.insert(i, i);
        }
        for (_, v) in map.iter_mut() {
            *v += 1;
        }
        for i in 0..50 {
            assert_eq!(map.get(&i), Some(&(i + 1)));
        }
    }

    #[test]
    fn keys_and_values_each_cover_every_entry() {
        let mut map: SwissMap<u32, u32> = SwissMap::new();
        for i in 0..20 {
            map.insert(i, i * 10);
        }
        let mut keys: Vec<_> = map.keys().copied().collect();
        keys.sort();
        assert_eq!(keys, (0..20).collect::<Vec<_>>());
        let mut values: Vec<_> = map.values().copied().collect();
        values.sort();
        assert_eq!(values, (0..20).map(|i| i * 10).collect::<Vec<_>>());
    }

    #[test]
    fn extend_inserts_every_pair_from_an_iterator() {
        let mut map: SwissMap<u32, u32> = SwissMap::new();
        map.insert(0, 0);
        map.extend((1..10).map(|i| (i, i * i)));
        assert_eq!(map.len(), 10);
        for i in 1..10 {
            assert_eq!(map.get(&i), Some(&(i * i)));
        }
    }

    #[test]
    fn into_iter_consumes_the_map_and_yields_every_pair() {
        let mut map: SwissMap<u32, u32> = SwissMap::new();
        for i in 0..30 {
            map.insert(i, i * 2);
        }
        let mut pairs: Vec<_> = map.into_iter().collect();
        pairs.sort();
        assert_eq!(pairs, (0..30).map(|i| (i, i * 2)).collect::<Vec<_>>());
    }

    #[test]
    fn shrink_to_fit_keeps_all_entries() {
        let mut map: SwissMap<u32, u32> = SwissMap::new();
        for i in 0..500 {
            map.insert(i, i);
        }
        for i in 0..400 {
            map.remove(&i);
        }
        map.shrink_to_fit();
        for i in 400..500 {
            assert_eq!(map.get(&i), Some(&i));
        }
    }
}
