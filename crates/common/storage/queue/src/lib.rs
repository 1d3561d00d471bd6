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

//! Durable disk-backed FIFO queue.
//!
//! Values are encoded by a [`Codec`], stored under monotonically increasing
//! keys in an [`OrderedMap`], and handed back in key order. Writes are
//! buffered until [`FileQueue::flush`] or [`FileQueue::close`].

pub mod allocator;
pub mod builder;
pub mod codec;
pub mod config;
mod crc;
pub mod error;
pub mod map;
pub mod queue;
mod record;
mod recovery;

pub use allocator::KeyAllocator;
pub use builder::QueueBuilder;
pub use codec::{BytesCodec, Codec, JsonCodec, StringCodec};
pub use config::{ConfigKey, QueueConfig};
pub use error::{QueueError, Result};
pub use map::{Cursor, LogMap, OrderedMap};
pub use queue::{DurableQueue, FileQueue, Iter};
