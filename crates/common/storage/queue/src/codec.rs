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

//! Value <-> payload transforms.
//!
//! A [`Codec`] is pure: it holds no per-call state and may be shared across
//! producer and consumer threads. `decode` receives the stored payload by
//! value. Codecs whose output type is the payload itself ([`BytesCodec`])
//! hand the buffer over untouched; every other codec borrows it and the
//! buffer is released as soon as `decode` returns.

use std::marker::PhantomData;

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use snafu::IntoError;

use crate::{
    Result,
    error::{DecodeSnafu, EncodeSnafu},
};

/// Bidirectional transform between `T` and a byte payload.
pub trait Codec<T>: Send + Sync {
    /// Encode `value` into the payload stored in the map.
    fn encode(&self, value: &T) -> Result<Bytes>;

    /// Decode a payload previously produced by [`encode`](Codec::encode).
    fn decode(&self, payload: Bytes) -> Result<T>;
}

/// Identity codec over raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl Codec<Bytes> for BytesCodec {
    fn encode(&self, value: &Bytes) -> Result<Bytes> { Ok(value.clone()) }

    fn decode(&self, payload: Bytes) -> Result<Bytes> { Ok(payload) }
}

/// UTF-8 string codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl Codec<String> for StringCodec {
    fn encode(&self, value: &String) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(value.as_bytes()))
    }

    fn decode(&self, payload: Bytes) -> Result<String> {
        std::str::from_utf8(&payload)
            .map(ToOwned::to_owned)
            .map_err(|e| DecodeSnafu.into_error(Box::new(e)))
    }
}

/// JSON codec for any serde type.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self { Self::new() }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self { Self::new() }
}

impl<T> std::fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<T> Codec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Bytes> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| EncodeSnafu.into_error(Box::new(e)))
    }

    fn decode(&self, payload: Bytes) -> Result<T> {
        serde_json::from_slice(&payload).map_err(|e| DecodeSnafu.into_error(Box::new(e)))
    }
}
