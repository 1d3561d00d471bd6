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

//! Monotonic key allocation.
//!
//! The counter holds the last key handed out. On open it is recovered from
//! the map's largest key so a restart never reuses a key; it only goes back
//! to zero when the queue is cleared.

use std::sync::atomic::{AtomicU64, Ordering};

/// Generator of strictly increasing entry keys.
#[derive(Debug, Default)]
pub struct KeyAllocator {
    last: AtomicU64,
}

impl KeyAllocator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Reserve the next key. Safe to call from many producer threads.
    pub fn next_key(&self) -> u64 { self.last.fetch_add(1, Ordering::AcqRel) + 1 }

    /// Resume after the largest key found in the map.
    pub fn recover(&self, last_key: Option<u64>) {
        self.last.store(last_key.unwrap_or(0), Ordering::Release);
    }

    /// Start numbering from 1 again. Only valid on an emptied map.
    pub fn reset(&self) { self.last.store(0, Ordering::Release); }

    /// The last key handed out (0 if none).
    #[must_use]
    pub fn current(&self) -> u64 { self.last.load(Ordering::Acquire) }
}
