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

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use serde::Serialize;
use snafu::{OptionExt, ResultExt};
use tracing::{debug, warn};

use crate::{
    Codec, ConfigKey, DurableQueue, LogMap, OrderedMap, QueueConfig, Result,
    error::{InvalidArgumentSnafu, IoAtSnafu},
};

/// Factory for [`DurableQueue`] handles.
///
/// `name`, `path` and `codec` are required. Everything is validated before
/// any file is touched; the storage directory is then created if missing.
pub struct QueueBuilder<T> {
    name:    Option<String>,
    path:    Option<PathBuf>,
    codec:   Option<Arc<dyn Codec<T>>>,
    options: HashMap<String, serde_json::Value>,
}

impl<T> Default for QueueBuilder<T> {
    fn default() -> Self {
        Self {
            name:    None,
            path:    None,
            codec:   None,
            options: HashMap::new(),
        }
    }
}

impl<T> QueueBuilder<T> {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Seed the builder from a deserialized [`QueueConfig`].
    #[must_use]
    pub fn from_config(config: QueueConfig) -> Self {
        Self {
            name:    Some(config.name),
            path:    Some(config.base_path),
            codec:   None,
            options: config.options,
        }
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn codec(mut self, codec: impl Codec<T> + 'static) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    /// Accepted for forward compatibility; has no effect.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Accepted for forward compatibility; has no effect.
    #[must_use]
    pub fn options<I, K>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = (K, serde_json::Value)>,
        K: Into<String>,
    {
        self.options
            .extend(options.into_iter().map(|(key, value)| (key.into(), value)));
        self
    }

    /// Accepted for forward compatibility; has no effect.
    #[must_use]
    pub fn typed_option<V: Serialize>(mut self, key: ConfigKey<V>, value: V) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.options.insert(key.name().to_string(), value);
            }
            Err(error) => warn!(key = key.name(), %error, "Ignoring unserializable option"),
        }
        self
    }

    /// Build a queue backed by the bundled [`LogMap`].
    pub fn build(self) -> Result<DurableQueue<T, LogMap>> { self.build_with::<LogMap>() }

    /// Build a queue backed by any [`OrderedMap`] implementation.
    pub fn build_with<M: OrderedMap>(self) -> Result<DurableQueue<T, M>> {
        let (config, codec) = self.validate()?;

        std::fs::create_dir_all(&config.base_path).context(IoAtSnafu {
            path: &config.base_path,
        })?;
        if !config.options.is_empty() {
            debug!(
                name = %config.name,
                options = ?config.options.keys().collect::<Vec<_>>(),
                "Queue options accepted but not applied"
            );
        }

        DurableQueue::open(config, codec)
    }

    fn validate(self) -> Result<(QueueConfig, Arc<dyn Codec<T>>)> {
        let name = self.name.context(InvalidArgumentSnafu {
            reason: "name must not be empty",
        })?;
        let base_path = self.path.context(InvalidArgumentSnafu {
            reason: "path must not be null",
        })?;
        let codec = self.codec.context(InvalidArgumentSnafu {
            reason: "codec must not be null",
        })?;

        let config = QueueConfig {
            base_path,
            name,
            options: self.options,
        };
        config.validate()?;
        Ok((config, codec))
    }
}
