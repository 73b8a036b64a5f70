// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use foldhash::HashMap;
use parking_lot::RwLock;
use std::{collections::hash_map::Entry, hash::Hash};

/// A map specialized to caching objects that are expensive to create.
///
/// Readers never block each other, except when an entry is vacant. In that case the writer
/// re-checks the entry under the exclusive lock and creates the value while still holding it, so
/// that a value is created exactly once no matter how many threads miss at the same time. Entries
/// are immutable after insertion.
#[derive(Debug)]
pub(crate) struct OnceCache<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for OnceCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a value returned by [`OnceCache::get_or_try_insert`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Lookup {
    /// Found by a reader.
    Hit,
    /// Inserted by another thread between the shared and the exclusive lock.
    LateHit,
    /// Created by this call.
    Miss,
}

impl<K, V> OnceCache<K, V> {
    /// Creates a new `OnceCache`.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::default()),
        }
    }

    /// Returns the number of entries.
    pub(crate) fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Removes every entry. Requires exclusive access, which means no other thread can be reading.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = (K, V)> + '_ {
        self.inner.get_mut().drain()
    }
}

impl<K, V> OnceCache<K, V>
where
    K: Eq + Hash + Copy,
    V: Clone,
{
    /// Returns the value for the specified `key`, if it exists.
    pub(crate) fn get(&self, key: &K) -> Option<V> {
        self.inner.read().get(key).cloned()
    }

    /// Returns the value for the specified `key`. If the entry doesn't exist it is created with
    /// `f` while holding the exclusive lock. If `f` returns [`Err`], the error is propagated and
    /// the entry isn't written to.
    pub(crate) fn get_or_try_insert<E>(
        &self,
        key: K,
        f: impl FnOnce() -> Result<V, E>,
    ) -> Result<(V, Lookup), E> {
        if let Some(value) = self.get(&key) {
            return Ok((value, Lookup::Hit));
        }

        let mut inner = self.inner.write();

        match inner.entry(key) {
            Entry::Occupied(entry) => Ok((entry.get().clone(), Lookup::LateHit)),
            Entry::Vacant(entry) => {
                let value = f()?;
                entry.insert(value.clone());

                Ok((value, Lookup::Miss))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Lookup, OnceCache};
    use std::{
        sync::{
            atomic::{AtomicU32, Ordering},
            Arc, Barrier,
        },
        thread,
    };

    #[test]
    fn creates_once() {
        let cache = OnceCache::<u64, u32>::new();

        let (value, lookup) = cache.get_or_try_insert::<()>(7, || Ok(1)).unwrap();
        assert_eq!((value, lookup), (1, Lookup::Miss));

        let (value, lookup) = cache.get_or_try_insert::<()>(7, || Ok(2)).unwrap();
        assert_eq!((value, lookup), (1, Lookup::Hit));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_creation_leaves_entry_vacant() {
        let cache = OnceCache::<u64, u32>::new();

        assert!(cache.get_or_try_insert(7, || Err("nope")).is_err());
        assert!(cache.get(&7).is_none());
        assert_eq!(cache.get_or_try_insert::<()>(7, || Ok(3)).unwrap().0, 3);
    }

    #[test]
    fn concurrent_misses_create_once() {
        const THREADS: usize = 8;

        let cache = Arc::new(OnceCache::<u64, u32>::new());
        let created = Arc::new(AtomicU32::new(0));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let cache = cache.clone();
                let created = created.clone();
                let barrier = barrier.clone();

                thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_try_insert::<()>(42, || {
                            Ok(created.fetch_add(1, Ordering::SeqCst) + 100)
                        })
                        .unwrap()
                        .0
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 100);
        }

        assert_eq!(created.load(Ordering::SeqCst), 1);
    }
}
