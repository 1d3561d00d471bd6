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

//! Durable FIFO queue engine.
//!
//! [`DurableQueue`] layers queue semantics over an [`OrderedMap`]:
//! - Enqueue allocates the next key and inserts the encoded value
//! - Dequeue removes the entry with the smallest key
//! - Flush and close forward to the map's commit/sync/close
//!
//! ## Usage
//!
//! ```ignore
//! let queue = QueueBuilder::new()
//!     .name("events")
//!     .path("/var/lib/spool")
//!     .codec(StringCodec)
//!     .build()?;
//!
//! queue.enqueue(&"hello".to_string())?;
//! queue.flush()?;
//!
//! while let Some(value) = queue.dequeue()? {
//!     println!("{value}");
//! }
//!
//! queue.close()?;
//! ```
//!
//! ## Concurrency
//!
//! Any number of threads may share one handle. Dequeues are serialised by a
//! poll lock so two consumers never take the same head entry. `clear`,
//! `close` and `reopen` hold the state lock exclusively and therefore never
//! interleave with an in-flight enqueue or dequeue.
//!
//! Iteration walks a live cursor. Enqueueing or dequeueing while an iterator
//! is in flight is allowed but the iterator may or may not observe those
//! changes.

use std::{
    borrow::Borrow,
    ops::Bound,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::{Mutex, RwLock};
use snafu::{OptionExt, ensure};
use tracing::{debug, info, warn};

use crate::{
    Codec, KeyAllocator, LogMap, OrderedMap, QueueConfig, Result,
    error::{ClosedSnafu, NoSuchElementSnafu},
};

/// FIFO capability of a file-backed queue.
///
/// Only queue operations are exposed. Removing an arbitrary element and bulk
/// remove/retain are not part of the contract.
pub trait FileQueue<T> {
    /// Append `value` to the tail. Returns the key it was stored under.
    fn enqueue(&self, value: &T) -> Result<u64>;

    /// Take the head value, or `None` when empty.
    fn dequeue(&self) -> Result<Option<T>>;

    /// Read the head value without removing it.
    fn peek(&self) -> Result<Option<T>>;

    fn len(&self) -> Result<usize>;

    /// Whether a stored entry encodes to the same bytes as `value`.
    fn contains(&self, value: &T) -> Result<bool>;

    /// Remove everything and restart key numbering. No-op once closed.
    fn clear(&self) -> Result<()>;

    /// Commit and sync pending writes. No-op once closed.
    fn flush(&self) -> Result<()>;

    /// Sync and release the store. Idempotent.
    fn close(&self) -> Result<()>;

    /// Path of the backing storage file.
    fn storage_file(&self) -> &Path;

    /// Enqueue `value` if present. `None` is a no-op and yields `false`.
    fn offer(&self, value: Option<&T>) -> Result<bool> {
        match value {
            Some(value) => self.enqueue(value).map(|_| true),
            None => Ok(false),
        }
    }

    /// Like [`dequeue`](FileQueue::dequeue) but an empty queue is an error.
    fn require_dequeue(&self) -> Result<T> {
        self.dequeue()?.context(NoSuchElementSnafu {
            path: self.storage_file(),
        })
    }

    /// Like [`peek`](FileQueue::peek) but an empty queue is an error.
    fn require_peek(&self) -> Result<T> {
        self.peek()?.context(NoSuchElementSnafu {
            path: self.storage_file(),
        })
    }

    fn is_empty(&self) -> Result<bool> { Ok(self.len()? == 0) }

    /// Enqueue every item in order. Stops at the first failure; items before
    /// it stay enqueued. Returns the number enqueued.
    fn drain_all<I>(&self, items: I) -> Result<usize>
    where
        Self: Sized,
        I: IntoIterator,
        I::Item: Borrow<T>,
    {
        let mut count = 0;
        for item in items {
            self.enqueue(item.borrow())?;
            count += 1;
        }
        Ok(count)
    }
}

/// A durable FIFO queue stored in an [`OrderedMap`].
pub struct DurableQueue<T, M: OrderedMap = LogMap> {
    /// Construction parameters (name, directory, inert options).
    config:       QueueConfig,
    /// `<base_path>/<name>`, cached for error messages.
    storage_file: PathBuf,
    codec:        Arc<dyn Codec<T>>,
    map:          M,
    allocator:    KeyAllocator,
    /// Shared by data operations, exclusive for clear/close.
    state:        RwLock<()>,
    /// Serialises the read-head-then-remove pair of dequeue.
    poll_lock:    Mutex<()>,
}

impl<T, M: OrderedMap> DurableQueue<T, M> {
    /// Open (or create) the storage file and recover the key counter from it.
    pub(crate) fn open(config: QueueConfig, codec: Arc<dyn Codec<T>>) -> Result<Self> {
        let map = M::open(&config.base_path, &config.name)?;
        let allocator = KeyAllocator::new();
        allocator.recover(map.last_key()?);

        let storage_file = config.storage_file();
        info!(
            name = %config.name,
            path = ?storage_file,
            last_key = allocator.current(),
            "Queue opened"
        );

        Ok(Self {
            config,
            storage_file,
            codec,
            map,
            allocator,
            state: RwLock::new(()),
            poll_lock: Mutex::new(()),
        })
    }

    /// Replace the store handle with a freshly opened one.
    ///
    /// A failure to close the current handle is logged and ignored.
    pub fn reopen(&mut self) -> Result<()> {
        if !self.map.is_closed() {
            if let Err(error) = self.map.close() {
                warn!(name = %self.config.name, %error, "Ignoring failure to close previous store");
            }
        }

        self.map = M::open(&self.config.base_path, &self.config.name)?;
        self.allocator.recover(self.map.last_key()?);

        info!(
            name = %self.config.name,
            last_key = self.allocator.current(),
            "Queue reopened"
        );
        Ok(())
    }

    #[must_use]
    pub fn name(&self) -> &str { &self.config.name }

    #[must_use]
    pub const fn config(&self) -> &QueueConfig { &self.config }

    /// The last key handed out by the allocator (0 if none since open/clear).
    #[must_use]
    pub fn last_key(&self) -> u64 { self.allocator.current() }

    /// Whether any stored payload equals `encoded` byte for byte.
    pub fn contains_raw(&self, encoded: &[u8]) -> Result<bool> {
        let _state = self.state.read();
        self.ensure_open()?;
        self.map.contains_value(encoded)
    }

    /// Iterate values from head to tail without removing them.
    ///
    /// The iterator is single-pass and reads through a live cursor; see the
    /// module docs for what that means under concurrent mutation.
    pub fn iter(&self) -> Result<Iter<'_, T, M>> {
        let _state = self.state.read();
        self.ensure_open()?;
        Ok(Iter {
            queue: self,
            from:  Bound::Unbounded,
            done:  false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        ensure!(
            !self.map.is_closed(),
            ClosedSnafu {
                name: &self.config.name,
            }
        );
        Ok(())
    }
}

impl<T, M: OrderedMap> FileQueue<T> for DurableQueue<T, M> {
    fn enqueue(&self, value: &T) -> Result<u64> {
        let _state = self.state.read();
        self.ensure_open()?;

        let payload = self.codec.encode(value)?;
        loop {
            let key = self.allocator.next_key();
            if self.map.put_if_absent(key, payload.clone())?.is_none() {
                return Ok(key);
            }
            debug!(name = %self.config.name, key, "Key already taken, reallocating");
        }
    }

    fn dequeue(&self) -> Result<Option<T>> {
        let _state = self.state.read();
        self.ensure_open()?;

        let removed = {
            let _poll = self.poll_lock.lock();
            match self.map.first_key()? {
                Some(key) => self.map.remove(key)?,
                None => None,
            }
        };
        removed.map(|payload| self.codec.decode(payload)).transpose()
    }

    fn peek(&self) -> Result<Option<T>> {
        let _state = self.state.read();
        self.ensure_open()?;

        self.map
            .first_entry_from(Bound::Unbounded)?
            .map(|(_, payload)| self.codec.decode(payload))
            .transpose()
    }

    fn len(&self) -> Result<usize> {
        let _state = self.state.read();
        self.ensure_open()?;
        self.map.len()
    }

    fn contains(&self, value: &T) -> Result<bool> {
        let encoded = self.codec.encode(value)?;
        self.contains_raw(&encoded)
    }

    fn clear(&self) -> Result<()> {
        let _state = self.state.write();
        if self.map.is_closed() {
            return Ok(());
        }
        self.map.clear()?;
        self.allocator.reset();
        info!(name = %self.config.name, "Queue cleared");
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let _state = self.state.read();
        if self.map.is_closed() {
            return Ok(());
        }
        let _poll = self.poll_lock.lock();
        self.map.commit()?;
        self.map.sync()?;
        debug!(name = %self.config.name, "Queue flushed");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let _state = self.state.write();
        if self.map.is_closed() {
            return Ok(());
        }
        self.map.sync()?;
        self.map.close()?;
        info!(name = %self.config.name, "Queue closed");
        Ok(())
    }

    fn storage_file(&self) -> &Path { &self.storage_file }
}

impl<T, M: OrderedMap> Drop for DurableQueue<T, M> {
    fn drop(&mut self) {
        if !self.map.is_closed() {
            if let Err(error) = self.map.close() {
                warn!(name = %self.config.name, %error, "Failed to close queue on drop");
            }
        }
    }
}

impl<T, M: OrderedMap> std::fmt::Debug for DurableQueue<T, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableQueue")
            .field("name", &self.config.name)
            .field("storage_file", &self.storage_file)
            .field("last_key", &self.allocator.current())
            .field("closed", &self.map.is_closed())
            .finish_non_exhaustive()
    }
}

/// Head-to-tail iterator over a [`DurableQueue`].
pub struct Iter<'a, T, M: OrderedMap> {
    queue: &'a DurableQueue<T, M>,
    from:  Bound<u64>,
    done:  bool,
}

impl<T, M: OrderedMap> Iterator for Iter<'_, T, M> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let step = {
            let _state = self.queue.state.read();
            self.queue
                .ensure_open()
                .and_then(|()| self.queue.map.first_entry_from(self.from))
        };

        match step {
            Ok(Some((key, payload))) => {
                self.from = Bound::Excluded(key);
                Some(self.queue.codec.decode(payload))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}
