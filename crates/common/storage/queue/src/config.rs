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

use std::{collections::HashMap, marker::PhantomData, path::PathBuf};

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::ensure;

use crate::{Result, error::InvalidArgumentSnafu};

/// Queue construction parameters.
///
/// The storage file lives at `<base_path>/<name>`. `options` are accepted
/// for forward compatibility and currently have no effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct QueueConfig {
    #[default(_code = "PathBuf::from(\"./queue_data\")")]
    pub base_path: PathBuf,
    pub name:      String,
    pub options:   HashMap<String, serde_json::Value>,
}

impl QueueConfig {
    /// Path of the storage file.
    #[must_use]
    pub fn storage_file(&self) -> PathBuf { self.base_path.join(&self.name) }

    /// Check the parameters without touching the filesystem.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.name.trim().is_empty(),
            InvalidArgumentSnafu {
                reason: "name must not be empty",
            }
        );
        ensure!(
            self.name != "." && self.name != ".." && !self.name.contains(['/', '\\']),
            InvalidArgumentSnafu {
                reason: format!("name {:?} must be a single path component", self.name),
            }
        );
        ensure!(
            !self.base_path.as_os_str().is_empty(),
            InvalidArgumentSnafu {
                reason: "path must not be empty",
            }
        );
        Ok(())
    }
}

/// A named, typed option key.
pub struct ConfigKey<V> {
    name:    &'static str,
    _marker: PhantomData<fn() -> V>,
}

impl<V> ConfigKey<V> {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str { self.name }
}

impl<V> Clone for ConfigKey<V> {
    fn clone(&self) -> Self { *self }
}

impl<V> Copy for ConfigKey<V> {}

impl<V> std::fmt::Debug for ConfigKey<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ConfigKey").field(&self.name).finish()
    }
}
