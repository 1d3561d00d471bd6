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

//! File-resident [`OrderedMap`] backed by an append-only record log.
//!
//! The live entries are indexed in memory; every mutation is appended to the
//! log through a buffered writer. Nothing reaches the file until `commit`,
//! and nothing is crash-safe until `sync`. On open the log is replayed (see
//! [`recovery`](crate::recovery)) and, when dead records dominate, rewritten
//! to contain only the live set.

use std::{
    collections::BTreeMap,
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    ops::Bound,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use parking_lot::Mutex;
use snafu::{IntoError, OptionExt, ResultExt, ensure};
use tracing::{debug, error, info, warn};

use super::OrderedMap;
use crate::{
    Result,
    error::{IoAtSnafu, LogPoisonedSnafu, MapClosedSnafu},
    record::Record,
    recovery::{ReplayResult, replay},
};

/// Minimum log length before dead records are worth compacting away.
const COMPACT_MIN_RECORDS: u64 = 1024;

const COMPACT_SUFFIX: &str = ".compact";

/// Ordered durable map stored as a single log file.
pub struct LogMap {
    path:  PathBuf,
    inner: Mutex<Inner>,
}

struct Inner {
    path:          PathBuf,
    /// Live entries in key order.
    entries:       BTreeMap<u64, Bytes>,
    /// Buffered log writer. `None` once closed.
    writer:        Option<BufWriter<File>>,
    /// Records currently in the log file, live or dead.
    records:       u64,
    /// Bytes of whole records handed to the writer, flushed or not.
    log_len:       u64,
    /// Record count at which compaction is next attempted.
    compact_after: u64,
    /// Set when a failed append could not be rolled back.
    poisoned:      bool,
}

impl LogMap {
    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path { &self.path }

    /// Rewrite the log so it holds only the live entries.
    pub fn compact(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.writer()?;
        inner.compact()
    }
}

impl Inner {
    fn ensure_open(&self) -> Result<()> {
        self.writer.as_ref().context(MapClosedSnafu)?;
        Ok(())
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        ensure!(!self.poisoned, LogPoisonedSnafu { path: &self.path });
        self.writer.as_mut().context(MapClosedSnafu)
    }

    /// Append one record. A failed write is rolled back to the end of the
    /// previous record so later appends never land after a partial frame.
    fn append(&mut self, record: &Record) -> Result<()> {
        let frame = record.encode();
        let start = self.log_len;
        let written = self.writer()?.write_all(&frame);
        if let Err(source) = written {
            self.roll_back(start);
            return Err(source.into());
        }
        self.log_len += frame.len() as u64;
        self.records += 1;
        Ok(())
    }

    /// Cut the log back to `valid_len` bytes, or poison the map if that is
    /// not possible.
    fn roll_back(&mut self, valid_len: u64) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let restored = writer
            .flush()
            .and_then(|()| writer.get_ref().set_len(valid_len));
        match restored {
            Ok(()) => warn!(path = ?self.path, valid_len, "Rolled back partial record"),
            Err(error) => {
                error!(
                    path = ?self.path,
                    valid_len,
                    %error,
                    "Rollback failed, refusing further writes"
                );
                self.poisoned = true;
            }
        }
    }

    fn should_compact(&self) -> bool {
        self.records >= self.compact_after && self.records > 2 * self.entries.len() as u64
    }

    /// Compact when dead records dominate. A failure leaves the current log in
    /// use; it is logged and the next attempt deferred.
    fn maybe_compact(&mut self) {
        if !self.should_compact() {
            return;
        }
        if let Err(error) = self.compact() {
            self.compact_after = self.records.saturating_mul(2);
            warn!(
                path = ?self.path,
                %error,
                retry_at = self.compact_after,
                "Log compaction failed"
            );
        }
    }

    fn compact(&mut self) -> Result<()> {
        let (file, len) = write_snapshot(&self.path, &self.entries)?;
        self.install(file, len, self.entries.len() as u64)
    }

    /// Remove every entry by swapping in an empty log. The index is only
    /// emptied once the empty log is in place.
    fn clear(&mut self) -> Result<()> {
        let (file, len) = write_snapshot(&self.path, &BTreeMap::new())?;
        self.entries.clear();
        self.install(file, len, 0)
    }

    /// Rename the snapshot over the log and switch the writer to it.
    fn install(&mut self, file: File, len: u64, records: u64) -> Result<()> {
        let tmp_path = compact_path(&self.path);
        if let Err(source) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(IoAtSnafu { path: &self.path }.into_error(source));
        }

        let dropped = self.records.saturating_sub(records);
        self.writer = Some(BufWriter::new(file));
        self.records = records;
        self.log_len = len;
        self.compact_after = COMPACT_MIN_RECORDS;
        info!(path = ?self.path, live = records, dropped, "Log compacted");

        sync_parent_dir(&self.path)
    }
}

fn compact_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(COMPACT_SUFFIX);
    PathBuf::from(name)
}

/// Write `entries` to `<path>.compact`, synced. Returns an append handle to
/// the new file, valid across the later rename, and its length.
fn write_snapshot(path: &Path, entries: &BTreeMap<u64, Bytes>) -> Result<(File, u64)> {
    let tmp_path = compact_path(path);
    let written = (|| -> std::io::Result<(File, u64)> {
        let mut tmp = BufWriter::new(File::create(&tmp_path)?);
        let mut len = 0u64;
        for (key, value) in entries {
            let frame = Record::Put {
                key:   *key,
                value: value.clone(),
            }
            .encode();
            tmp.write_all(&frame)?;
            len += frame.len() as u64;
        }
        tmp.into_inner()
            .map_err(std::io::IntoInnerError::into_error)?
            .sync_all()?;
        let file = OpenOptions::new().append(true).open(&tmp_path)?;
        Ok((file, len))
    })();

    written.map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        IoAtSnafu { path: &tmp_path }.into_error(source)
    })
}

/// Make a rename in the log's directory durable.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    File::open(dir)
        .and_then(|dir| dir.sync_all())
        .context(IoAtSnafu { path: dir })
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<()> { Ok(()) }

impl OrderedMap for LogMap {
    fn open(dir: &Path, name: &str) -> Result<Self> {
        fs::create_dir_all(dir).context(IoAtSnafu { path: dir })?;
        let path = dir.join(name);

        let ReplayResult {
            entries,
            valid_len,
            records,
            torn_tail,
        } = replay(&path)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context(IoAtSnafu { path: &path })?;

        if torn_tail {
            warn!(path = ?path, valid_len, "Truncating torn tail of log");
            file.set_len(valid_len).context(IoAtSnafu { path: &path })?;
            file.sync_all().context(IoAtSnafu { path: &path })?;
        }

        let mut inner = Inner {
            path: path.clone(),
            entries,
            writer: Some(BufWriter::new(file)),
            records,
            log_len: valid_len,
            compact_after: COMPACT_MIN_RECORDS,
            poisoned: false,
        };
        inner.maybe_compact();

        info!(
            path = ?path,
            entries = inner.entries.len(),
            records = inner.records,
            "Log map opened"
        );

        Ok(Self {
            path,
            inner: Mutex::new(inner),
        })
    }

    fn get(&self, key: u64) -> Result<Option<Bytes>> {
        let inner = self.inner.lock();
        inner.ensure_open()?;
        Ok(inner.entries.get(&key).cloned())
    }

    fn put(&self, key: u64, value: Bytes) -> Result<Option<Bytes>> {
        let mut inner = self.inner.lock();
        inner.append(&Record::Put {
            key,
            value: value.clone(),
        })?;
        Ok(inner.entries.insert(key, value))
    }

    fn put_if_absent(&self, key: u64, value: Bytes) -> Result<Option<Bytes>> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        if let Some(existing) = inner.entries.get(&key) {
            return Ok(Some(existing.clone()));
        }
        inner.append(&Record::Put {
            key,
            value: value.clone(),
        })?;
        inner.entries.insert(key, value);
        Ok(None)
    }

    fn remove(&self, key: u64) -> Result<Option<Bytes>> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        if !inner.entries.contains_key(&key) {
            return Ok(None);
        }
        inner.append(&Record::Remove { key })?;
        let removed = inner.entries.remove(&key);
        inner.maybe_compact();
        Ok(removed)
    }

    fn first_key(&self) -> Result<Option<u64>> {
        let inner = self.inner.lock();
        inner.ensure_open()?;
        Ok(inner.entries.first_key_value().map(|(key, _)| *key))
    }

    fn last_key(&self) -> Result<Option<u64>> {
        let inner = self.inner.lock();
        inner.ensure_open()?;
        Ok(inner.entries.last_key_value().map(|(key, _)| *key))
    }

    fn first_entry_from(&self, from: Bound<u64>) -> Result<Option<(u64, Bytes)>> {
        let inner = self.inner.lock();
        inner.ensure_open()?;
        Ok(inner
            .entries
            .range((from, Bound::Unbounded))
            .next()
            .map(|(key, value)| (*key, value.clone())))
    }

    fn len(&self) -> Result<usize> {
        let inner = self.inner.lock();
        inner.ensure_open()?;
        Ok(inner.entries.len())
    }

    fn contains_value(&self, value: &[u8]) -> Result<bool> {
        let inner = self.inner.lock();
        inner.ensure_open()?;
        Ok(inner.entries.values().any(|stored| stored.as_ref() == value))
    }

    fn clear(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.writer()?;
        inner.clear()
    }

    fn commit(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.writer()?.flush()?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let writer = inner.writer()?;
        writer.flush()?;
        writer
            .get_ref()
            .sync_data()
            .context(IoAtSnafu { path: &self.path })?;
        debug!(path = ?self.path, "Log synced");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let Some(mut writer) = inner.writer.take() else {
            return Ok(());
        };
        inner.entries.clear();
        writer.flush()?;
        writer
            .get_ref()
            .sync_data()
            .context(IoAtSnafu { path: &self.path })?;

        info!(path = ?self.path, "Log map closed");
        Ok(())
    }

    fn is_closed(&self) -> bool { self.inner.lock().writer.is_none() }
}
