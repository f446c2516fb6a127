use std::fmt::{Display, Formatter};
use std::net::UdpSocket;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::format::human_size;

const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";
#[cfg(target_os = "linux")]
const SHARED_MEMORY_PATH: &str = "/dev/shm";

/// Connecting a UDP socket only selects a route, nothing is sent.
const NODE_ADDRESS_PROBE_TARGET: &str = "8.8.8.8:80";
const LOCALHOST_ADDRESS: &str = "127.0.0.1";

/// Cgroup v1 reports "no limit" as a page-aligned `i64::MAX`.
const CGROUP_V1_UNLIMITED_THRESHOLD: u64 = 1 << 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Other
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Platform::Linux => "linux",
            Platform::MacOs => "darwin",
            Platform::Windows => "win32",
            Platform::Other => "other",
        })
    }
}

/// Facts about the machine that the resolver needs.
///
/// Implemented by [`LocalHost`] for the real machine; tests provide fixed values.
pub trait HostProbe {
    fn platform(&self) -> Platform;

    /// Number of logical CPUs usable by this process.
    fn cpu_count(&self) -> anyhow::Result<f64>;

    /// Total memory of the node in bytes, capped by a container limit if one is set.
    fn system_memory(&self) -> anyhow::Result<u64>;

    /// Memory that is currently not in use, in bytes.
    fn available_memory(&self) -> anyhow::Result<u64>;

    /// Size of the shared memory filesystem in bytes.
    fn shared_memory(&self) -> anyhow::Result<u64>;

    /// Address under which the node is reachable by the rest of the cluster.
    fn node_address(&self) -> anyhow::Result<String>;
}

#[derive(Debug, Clone)]
pub struct LocalHost {
    cgroup_root: PathBuf,
}

impl Default for LocalHost {
    fn default() -> Self {
        Self::with_cgroup_root(DEFAULT_CGROUP_ROOT)
    }
}

impl LocalHost {
    pub fn with_cgroup_root<P: Into<PathBuf>>(cgroup_root: P) -> Self {
        Self {
            cgroup_root: cgroup_root.into(),
        }
    }
}

impl HostProbe for LocalHost {
    fn platform(&self) -> Platform {
        Platform::current()
    }

    /// `num_cpus` already honours cgroup CPU quotas.
    fn cpu_count(&self) -> anyhow::Result<f64> {
        let n_cpus = num_cpus::get();
        if n_cpus < 1 {
            anyhow::bail!("Cpu detection failed");
        }
        Ok(n_cpus as f64)
    }

    fn system_memory(&self) -> anyhow::Result<u64> {
        let total = psutil::memory::virtual_memory()?.total();
        match read_cgroup_memory_limit(&self.cgroup_root) {
            Some(limit) if limit < total => {
                log::debug!(
                    "Memory is limited by cgroup to {} (machine has {})",
                    human_size(limit),
                    human_size(total)
                );
                Ok(limit)
            }
            _ => Ok(total),
        }
    }

    fn available_memory(&self) -> anyhow::Result<u64> {
        let memory = psutil::memory::virtual_memory()?;
        let limit = read_cgroup_memory_limit(&self.cgroup_root)
            .filter(|limit| *limit < memory.total());
        if let Some(limit) = limit {
            if let Some(usage) = read_cgroup_memory_usage(&self.cgroup_root) {
                return Ok(limit.saturating_sub(usage));
            }
        }
        Ok(memory.available())
    }

    #[cfg(target_os = "linux")]
    fn shared_memory(&self) -> anyhow::Result<u64> {
        let stat = nix::sys::statvfs::statvfs(SHARED_MEMORY_PATH)?;
        Ok(u64::from(stat.block_size()) * u64::from(stat.blocks_available()))
    }

    #[cfg(not(target_os = "linux"))]
    fn shared_memory(&self) -> anyhow::Result<u64> {
        anyhow::bail!("Shared memory size is not known on {}", Platform::current())
    }

    fn node_address(&self) -> anyhow::Result<String> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        match socket
            .connect(NODE_ADDRESS_PROBE_TARGET)
            .and_then(|_| socket.local_addr())
        {
            Ok(address) => Ok(address.ip().to_string()),
            Err(error) => {
                log::warn!(
                    "Cannot determine node address ({error}), using {LOCALHOST_ADDRESS} instead"
                );
                Ok(LOCALHOST_ADDRESS.to_string())
            }
        }
    }
}

/// Reads a single number from a cgroup control file.
/// Returns `None` for "max", missing files and values meaning "unlimited".
fn read_cgroup_value(path: &Path) -> Option<u64> {
    let content = std::fs::read_to_string(path).ok()?;
    parse_cgroup_value(&content)
}

fn parse_cgroup_value(content: &str) -> Option<u64> {
    let content = content.trim();
    if content == "max" {
        return None;
    }
    content
        .parse::<u64>()
        .ok()
        .filter(|value| *value < CGROUP_V1_UNLIMITED_THRESHOLD)
}

fn read_cgroup_memory_limit(root: &Path) -> Option<u64> {
    read_cgroup_value(&root.join("memory.max"))
        .or_else(|| read_cgroup_value(&root.join("memory/memory.limit_in_bytes")))
}

fn read_cgroup_memory_usage(root: &Path) -> Option<u64> {
    read_cgroup_value(&root.join("memory.current"))
        .or_else(|| read_cgroup_value(&root.join("memory/memory.usage_in_bytes")))
}
