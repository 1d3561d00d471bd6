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

use std::{io, path::PathBuf};

use snafu::Snafu;

/// Boxed error produced by a [`Codec`](crate::Codec) implementation.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Queue operation errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum QueueError {
    /// The queue handle was closed before the operation ran.
    #[snafu(display("File queue {name} is closed"))]
    Closed {
        name: String,
        #[snafu(implicit)]
        loc:  snafu::Location,
    },

    /// The backing map was used after `close`.
    #[snafu(display("Ordered map is closed"))]
    MapClosed {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    /// `require_dequeue` / `require_peek` on an empty queue.
    #[snafu(display("No such element in file {}", path.display()))]
    NoSuchElement {
        path: PathBuf,
        #[snafu(implicit)]
        loc:  snafu::Location,
    },

    /// Construction parameters failed validation. No I/O has happened.
    #[snafu(display("Invalid argument: {reason}"))]
    InvalidArgument {
        reason: String,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// Filesystem I/O failure.
    #[snafu(display("IO error"), context(false))]
    Io {
        source: io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// Filesystem I/O failure on a known path.
    #[snafu(display("IO error on {}", path.display()))]
    IoAt {
        path:   PathBuf,
        source: io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// The codec could not turn a value into bytes.
    #[snafu(display("Failed to encode value"))]
    Encode {
        source: BoxedError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// The codec could not turn stored bytes back into a value.
    #[snafu(display("Failed to decode value"))]
    Decode {
        source: BoxedError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// A log record failed framing or CRC checks.
    #[snafu(display("Corrupted record at offset {offset}"))]
    CorruptedRecord {
        offset: u64,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// An append failed and the partial record could not be rolled back.
    /// The map still serves reads but refuses further writes.
    #[snafu(display("Log {} refuses writes after a failed append", path.display()))]
    LogPoisoned {
        path: PathBuf,
        #[snafu(implicit)]
        loc:  snafu::Location,
    },
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
