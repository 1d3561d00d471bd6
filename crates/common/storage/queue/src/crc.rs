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

//! CRC32 checksums for log records.
//!
//! CRC-32 (IEEE) via crc32fast, over the length prefix and the body.

use crc32fast::Hasher;

/// Checksum of a record with the given length prefix and body.
#[inline]
pub(crate) fn calculate_record_crc(length: u32, body: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&length.to_le_bytes());
    hasher.update(body);
    hasher.finalize()
}

#[inline]
pub(crate) fn verify_record_crc(length: u32, body: &[u8], expected: u32) -> bool {
    calculate_record_crc(length, body) == expected
}
