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

#![allow(clippy::cast_possible_truncation)]

//! Log record types and on-disk framing.
//!
//! Every mutation of a [`LogMap`](crate::LogMap) is appended to its file as
//! one record:
//!
//! ```text
//! ┌──────────────┬─────────────────────────────────────────┬──────────────┐
//! │ Length (4B)  │ Body                                    │ CRC32 (4B)   │
//! │ little-endian│ op (1B) │ key (8B LE) │ value (put only) │ little-endian│
//! └──────────────┴─────────────────────────────────────────┴──────────────┘
//! ```
//!
//! - **Length**: size of the body in bytes
//! - **op**: [`OP_PUT`] or [`OP_REMOVE`]
//! - **CRC32**: over the length prefix and the body

use bytes::{BufMut, Bytes, BytesMut};
use snafu::ensure;

use crate::{Result, crc::calculate_record_crc, error::CorruptedRecordSnafu};

/// Size of the length prefix in bytes.
pub(crate) const RECORD_LENGTH_SIZE: usize = 4;

/// Size of the CRC32 trailer in bytes.
pub(crate) const RECORD_CRC_SIZE: usize = 4;

/// Size of the op byte plus the key.
pub(crate) const RECORD_HEADER_SIZE: usize = 1 + 8;

pub(crate) const OP_PUT: u8 = 1;
pub(crate) const OP_REMOVE: u8 = 2;

/// A single logged mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Record {
    Put { key: u64, value: Bytes },
    Remove { key: u64 },
}

impl Record {
    /// Encode into a full frame: length, body, CRC.
    pub(crate) fn encode(&self) -> Bytes {
        let value_len = match self {
            Self::Put { value, .. } => value.len(),
            Self::Remove { .. } => 0,
        };
        let body_len = RECORD_HEADER_SIZE + value_len;
        let mut buf = BytesMut::with_capacity(record_disk_size(body_len));

        buf.put_u32_le(body_len as u32);
        match self {
            Self::Put { key, value } => {
                buf.put_u8(OP_PUT);
                buf.put_u64_le(*key);
                buf.put_slice(value);
            }
            Self::Remove { key } => {
                buf.put_u8(OP_REMOVE);
                buf.put_u64_le(*key);
            }
        }
        let crc = calculate_record_crc(body_len as u32, &buf[RECORD_LENGTH_SIZE..]);
        buf.put_u32_le(crc);
        buf.freeze()
    }

    /// Decode a CRC-verified body. `offset` is only used for error reporting.
    pub(crate) fn decode_body(body: &Bytes, offset: u64) -> Result<Self> {
        ensure!(
            body.len() >= RECORD_HEADER_SIZE,
            CorruptedRecordSnafu { offset }
        );

        let mut key_buf = [0u8; 8];
        key_buf.copy_from_slice(&body[1..RECORD_HEADER_SIZE]);
        let key = u64::from_le_bytes(key_buf);

        match body[0] {
            OP_PUT => Ok(Self::Put {
                key,
                value: body.slice(RECORD_HEADER_SIZE..),
            }),
            OP_REMOVE if body.len() == RECORD_HEADER_SIZE => Ok(Self::Remove { key }),
            _ => CorruptedRecordSnafu { offset }.fail(),
        }
    }
}

/// Total on-disk size of a record whose body is `body_len` bytes.
#[inline]
pub(crate) const fn record_disk_size(body_len: usize) -> usize {
    RECORD_LENGTH_SIZE + body_len + RECORD_CRC_SIZE
}
