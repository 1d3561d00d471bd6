// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Ordered durable map abstraction.
//!
//! The queue engine only needs a small surface from its store: keyed
//! get/put/remove, first/last key lookup, forward iteration in key order and
//! explicit durability control. [`OrderedMap`] captures that surface;
//! [`LogMap`] is the bundled file-resident implementation.

mod log_map;

use std::{ops::Bound, path::Path};

use bytes::Bytes;
pub use log_map::LogMap;

use crate::Result;

/// A persistent map from `u64` keys to byte payloads, iterable in ascending
/// key order.
///
/// All methods take `&self`; implementations synchronise internally so a
/// single handle can be shared between producer and consumer threads.
/// Mutations are buffered until [`commit`](OrderedMap::commit) and only
/// guaranteed to survive a crash after [`sync`](OrderedMap::sync).
pub trait OrderedMap: Send + Sync + Sized {
    /// Open or create the map stored at `<dir>/<name>`.
    fn open(dir: &Path, name: &str) -> Result<Self>;

    fn get(&self, key: u64) -> Result<Option<Bytes>>;

    /// Insert or overwrite, returning the previous value.
    fn put(&self, key: u64, value: Bytes) -> Result<Option<Bytes>>;

    /// Insert only if `key` is vacant. Returns the existing value, untouched,
    /// when the key is already taken.
    fn put_if_absent(&self, key: u64, value: Bytes) -> Result<Option<Bytes>>;

    fn remove(&self, key: u64) -> Result<Option<Bytes>>;

    fn first_key(&self) -> Result<Option<u64>>;

    fn last_key(&self) -> Result<Option<u64>>;

    /// The smallest entry whose key lies within `from..`.
    fn first_entry_from(&self, from: Bound<u64>) -> Result<Option<(u64, Bytes)>>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> { Ok(self.len()? == 0) }

    /// Whether any stored payload equals `value` byte for byte.
    fn contains_value(&self, value: &[u8]) -> Result<bool>;

    /// Remove every entry.
    fn clear(&self) -> Result<()>;

    /// Hand buffered writes to the store's log.
    fn commit(&self) -> Result<()>;

    /// Force committed writes to stable storage.
    fn sync(&self) -> Result<()>;

    /// Sync and release the underlying resources. Idempotent.
    fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;

    /// Forward cursor starting at `key` (inclusive).
    fn cursor_from(&self, key: u64) -> Cursor<'_, Self> { Cursor::new(self, Bound::Included(key)) }
}

/// Live forward cursor over an [`OrderedMap`].
///
/// Each step looks up the next key after the last one returned, so entries
/// inserted or removed ahead of the cursor are observed. This is not a
/// snapshot.
pub struct Cursor<'a, M> {
    map:  &'a M,
    from: Bound<u64>,
    done: bool,
}

impl<'a, M: OrderedMap> Cursor<'a, M> {
    pub(crate) const fn new(map: &'a M, from: Bound<u64>) -> Self {
        Self {
            map,
            from,
            done: false,
        }
    }
}

impl<M: OrderedMap> Iterator for Cursor<'_, M> {
    type Item = Result<(u64, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.map.first_entry_from(self.from) {
            Ok(Some((key, value))) => {
                self.from = Bound::Excluded(key);
                Some(Ok((key, value)))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
