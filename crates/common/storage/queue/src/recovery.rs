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

//! Crash recovery for [`LogMap`](crate::LogMap) files.
//!
//! Recovery replays the record log from the start:
//! 1. Read length prefix, body and CRC of each record
//! 2. Stop at the first truncated or CRC-mismatching record (a torn write)
//! 3. Apply every valid record to an in-memory index
//!
//! The caller truncates the file back to [`ReplayResult::valid_len`] so new
//! records are never appended after garbage.

use std::{collections::BTreeMap, path::Path};

use bytes::Bytes;
use snafu::ResultExt;
use tracing::{debug, info, warn};

use crate::{
    Result,
    crc::verify_record_crc,
    error::IoAtSnafu,
    record::{RECORD_CRC_SIZE, RECORD_LENGTH_SIZE, Record},
};

/// State rebuilt from a log file.
#[derive(Debug, Default)]
pub(crate) struct ReplayResult {
    /// Live entries after applying every valid record.
    pub entries:   BTreeMap<u64, Bytes>,
    /// Byte length of the valid prefix of the file.
    pub valid_len: u64,
    /// Number of valid records in the file.
    pub records:   u64,
    /// Whether the file had bytes past the valid prefix.
    pub torn_tail: bool,
}

/// Replay the log at `path`. A missing file replays as empty.
pub(crate) fn replay(path: &Path) -> Result<ReplayResult> {
    if !path.exists() {
        info!(path = ?path, "No log file found, starting fresh");
        return Ok(ReplayResult::default());
    }

    let data = Bytes::from(std::fs::read(path).context(IoAtSnafu { path })?);
    let result = replay_bytes(&data)?;

    info!(
        path = ?path,
        entries = result.entries.len(),
        records = result.records,
        valid_len = result.valid_len,
        "Log replay complete"
    );

    Ok(result)
}

fn replay_bytes(data: &Bytes) -> Result<ReplayResult> {
    let file_size = data.len() as u64;
    let mut result = ReplayResult::default();
    let mut position = 0u64;

    while position + RECORD_LENGTH_SIZE as u64 <= file_size {
        let start = position as usize;
        let mut length_buf = [0u8; RECORD_LENGTH_SIZE];
        length_buf.copy_from_slice(&data[start..start + RECORD_LENGTH_SIZE]);
        let length = u32::from_le_bytes(length_buf);

        if length == 0 {
            warn!(position, "Zero-length record found, stopping replay");
            break;
        }

        let total_size = (RECORD_LENGTH_SIZE + RECORD_CRC_SIZE) as u64 + u64::from(length);
        if position + total_size > file_size {
            warn!(
                position,
                length, file_size, "Truncated record found at end of log"
            );
            break;
        }

        let body_start = start + RECORD_LENGTH_SIZE;
        let body_end = body_start + length as usize;
        let body = data.slice(body_start..body_end);

        let mut crc_buf = [0u8; RECORD_CRC_SIZE];
        crc_buf.copy_from_slice(&data[body_end..body_end + RECORD_CRC_SIZE]);
        let stored_crc = u32::from_le_bytes(crc_buf);

        if !verify_record_crc(length, &body, stored_crc) {
            warn!(
                position,
                record = result.records,
                "CRC verification failed, stopping replay at this point"
            );
            break;
        }

        match Record::decode_body(&body, position)? {
            Record::Put { key, value } => {
                result.entries.insert(key, value);
            }
            Record::Remove { key } => {
                result.entries.remove(&key);
            }
        }

        position += total_size;
        result.records += 1;
    }

    result.valid_len = position;
    result.torn_tail = position < file_size;

    debug!(
        records = result.records,
        position, file_size, "Record scan complete"
    );

    Ok(result)
}
