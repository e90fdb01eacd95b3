use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigStoreError, Result};

/// Settings for a [`ConfigStore`](crate::ConfigStore)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Directory holding one `<bucket>.json` file per bucket
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    /// Quiet period after the last write before dirty buckets are flushed
    #[serde(
        default = "default_save_delay",
        rename = "save_delay_ms",
        with = "duration_ms"
    )]
    pub save_delay: Duration,

    /// How often the directory is re-scanned for external edits; never zero
    #[serde(
        default = "default_reload_interval",
        rename = "reload_interval_ms",
        serialize_with = "duration_ms::serialize",
        deserialize_with = "duration_ms::deserialize_nonzero"
    )]
    pub reload_interval: Duration,
}

fn default_dir() -> PathBuf {
    PathBuf::from("configs")
}

fn default_save_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_reload_interval() -> Duration {
    Duration::from_secs(2)
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            save_delay: default_save_delay(),
            reload_interval: default_reload_interval(),
        }
    }
}

impl StoreOptions {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = delay;
        self
    }

    pub fn with_reload_interval(mut self, interval: Duration) -> Self {
        self.reload_interval = interval;
        self
    }

    /// Reject settings the background tasks can't run with.
    pub fn validate(&self) -> Result<()> {
        if self.reload_interval.is_zero() {
            return Err(ConfigStoreError::InvalidOptions {
                field: "reload_interval_ms",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }

    /// Resolve a relative `dir` against `base`
    pub fn resolve_dir(mut self, base: &Path) -> Self {
        if self.dir.is_relative() {
            self.dir = base.join(&self.dir);
        }
        self
    }
}

mod duration_ms {
    use std::num::NonZeroU64;
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    pub fn deserialize_nonzero<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        NonZeroU64::deserialize(deserializer).map(|ms| Duration::from_millis(ms.get()))
    }
}
