use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::accelerator::AcceleratorFamily;
use crate::common::env::{
    NODESPEC_ACCELERATOR_TYPE, NODESPEC_OBJECT_STORE_MAX_MEMORY_BYTES,
    NODESPEC_OBJECT_STORE_MEMORY_PROPORTION,
};
use crate::common::error::NodeSpecError;

pub const DEFAULT_OBJECT_STORE_MEMORY_PROPORTION: f64 = 0.3;
pub const DEFAULT_OBJECT_STORE_MAX_MEMORY_BYTES: u64 = 200 * 1_000_000_000;
/// Larger object stores perform badly on macOS.
pub const MAC_DEGRADED_PERF_MMAP_SIZE_LIMIT: u64 = 2 * 1024 * 1024 * 1024;
/// The shared memory cap never goes below this.
pub const REQUIRE_SHM_SIZE_THRESHOLD: u64 = 10_000_000_000;
pub const DEFAULT_REDIS_MAX_MEMORY_BYTES: u64 = 10_000_000_000;
pub const REDIS_MINIMUM_MEMORY_BYTES: u64 = 10_000_000;
pub const MAX_RESOURCE_QUANTITY: f64 = 100e12;

/// Tunable constants of the resource sizing policy.
///
/// Values are taken from the built-in defaults, then from an optional TOML
/// file, then from `NODESPEC_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourcePolicy {
    /// Fraction of available memory given to the object store by default.
    pub object_store_memory_proportion: f64,
    pub object_store_max_memory_bytes: u64,
    pub mac_degraded_perf_mmap_size_limit: u64,
    pub require_shm_size_threshold: u64,
    pub redis_default_max_memory_bytes: u64,
    pub redis_minimum_memory_bytes: u64,
    pub max_resource_quantity: f64,
    pub accelerator: AcceleratorFamily,
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        Self {
            object_store_memory_proportion: DEFAULT_OBJECT_STORE_MEMORY_PROPORTION,
            object_store_max_memory_bytes: DEFAULT_OBJECT_STORE_MAX_MEMORY_BYTES,
            mac_degraded_perf_mmap_size_limit: MAC_DEGRADED_PERF_MMAP_SIZE_LIMIT,
            require_shm_size_threshold: REQUIRE_SHM_SIZE_THRESHOLD,
            redis_default_max_memory_bytes: DEFAULT_REDIS_MAX_MEMORY_BYTES,
            redis_minimum_memory_bytes: REDIS_MINIMUM_MEMORY_BYTES,
            max_resource_quantity: MAX_RESOURCE_QUANTITY,
            accelerator: AcceleratorFamily::Cuda,
        }
    }
}

impl ResourcePolicy {
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let policy: ResourcePolicy = toml::from_str(content)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn from_toml_file(path: &Path) -> crate::Result<Self> {
        log::debug!("Loading resource policy from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn with_env_overrides(self) -> crate::Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides looked up by environment variable name.
    pub fn with_overrides<F>(mut self, lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(NODESPEC_OBJECT_STORE_MEMORY_PROPORTION) {
            self.object_store_memory_proportion =
                parse_override(NODESPEC_OBJECT_STORE_MEMORY_PROPORTION, &value)?;
        }
        if let Some(value) = lookup(NODESPEC_OBJECT_STORE_MAX_MEMORY_BYTES) {
            self.object_store_max_memory_bytes =
                parse_override(NODESPEC_OBJECT_STORE_MAX_MEMORY_BYTES, &value)?;
        }
        if let Some(value) = lookup(NODESPEC_ACCELERATOR_TYPE) {
            self.accelerator = value
                .parse()
                .map_err(|e| NodeSpecError::Config(format!("{NODESPEC_ACCELERATOR_TYPE}: {e}")))?;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> crate::Result<()> {
        if !(self.object_store_memory_proportion > 0.0
            && self.object_store_memory_proportion <= 1.0)
        {
            return Err(NodeSpecError::Config(format!(
                "Object store memory proportion has to be in (0, 1], got {}",
                self.object_store_memory_proportion
            )));
        }
        if self.redis_default_max_memory_bytes < self.redis_minimum_memory_bytes {
            return Err(NodeSpecError::Config(format!(
                "Default redis memory cap ({}) is below the minimum ({})",
                self.redis_default_max_memory_bytes, self.redis_minimum_memory_bytes
            )));
        }
        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(name: &str, value: &str) -> crate::Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| NodeSpecError::Config(format!("Invalid value '{value}' of {name}: {e}")))
}
