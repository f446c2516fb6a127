use crate::common::error::NodeSpecError;
use crate::common::format::human_size;
use crate::config::ResourcePolicy;
use crate::host::Platform;

/// Part of the shared memory filesystem that the object store may use.
const SHM_WIGGLE_ROOM: f64 = 0.95;
/// Part of available memory that the redis cap defaults to.
const REDIS_MEMORY_PROPORTION: f64 = 0.1;
pub const TASK_MEMORY_ABSOLUTE_FLOOR: f64 = 100e6;
pub const TASK_MEMORY_RELATIVE_FLOOR: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct MemoryFacts {
    pub system_memory: u64,
    pub available_memory: u64,
    /// Only consulted on Linux.
    pub shared_memory: Option<u64>,
    pub platform: Platform,
}

/// Explicitly requested sizes; `None` means "use the default".
#[derive(Debug, Clone, Default)]
pub struct MemoryRequest {
    pub object_store_memory: Option<u64>,
    pub memory: Option<u64>,
    pub redis_max_memory: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySizing {
    pub object_store_memory: u64,
    pub memory: u64,
    pub redis_max_memory: u64,
}

/// Splits the node memory between the object store, redis and tasks.
///
/// The head node also hosts redis, so its cap is taken away from task memory there.
pub fn size_memory(
    facts: &MemoryFacts,
    request: &MemoryRequest,
    is_head: bool,
    policy: &ResourcePolicy,
) -> crate::Result<MemorySizing> {
    let object_store_memory = request
        .object_store_memory
        .unwrap_or_else(|| default_object_store_memory(facts, policy));

    let redis_max_memory = request
        .redis_max_memory
        .unwrap_or_else(|| default_redis_max_memory(facts.available_memory, policy));
    if redis_max_memory < policy.redis_minimum_memory_bytes {
        return Err(NodeSpecError::RedisMemoryBelowMinimum {
            requested: redis_max_memory,
            minimum: policy.redis_minimum_memory_bytes,
        });
    }

    let memory = match request.memory {
        Some(memory) => memory,
        None => {
            let redis_reserve = if is_head { redis_max_memory } else { 0 };
            default_task_memory(facts, object_store_memory, redis_reserve)?
        }
    };

    Ok(MemorySizing {
        object_store_memory,
        memory,
        redis_max_memory,
    })
}

/// Upper bound of the default object store size.
pub fn object_store_cap(facts: &MemoryFacts, policy: &ResourcePolicy) -> u64 {
    let max_cap = policy.object_store_max_memory_bytes;
    match facts.platform {
        Platform::Linux => {
            let shm_available = facts
                .shared_memory
                .map(|shm| (shm as f64 * SHM_WIGGLE_ROOM) as u64)
                .unwrap_or(0);
            shm_available
                .max(policy.require_shm_size_threshold)
                .min(max_cap)
        }
        Platform::MacOs | Platform::Windows | Platform::Other => max_cap,
    }
}

fn default_object_store_memory(facts: &MemoryFacts, policy: &ResourcePolicy) -> u64 {
    let mut object_store_memory =
        (facts.available_memory as f64 * policy.object_store_memory_proportion) as u64;

    if facts.platform == Platform::MacOs {
        object_store_memory = object_store_memory.min(policy.mac_degraded_perf_mmap_size_limit);
    }

    let cap = object_store_cap(facts, policy);
    if object_store_memory > cap {
        log::debug!(
            "Capping object store memory to {}. Specify the object store memory explicitly to increase it further.",
            human_size(cap)
        );
        object_store_memory = cap;
    }
    object_store_memory
}

fn default_redis_max_memory(available_memory: u64, policy: &ResourcePolicy) -> u64 {
    let proportional = (available_memory as f64 * REDIS_MEMORY_PROPORTION) as u64;
    proportional
        .max(policy.redis_minimum_memory_bytes)
        .min(policy.redis_default_max_memory_bytes)
}

/// Fails only if the remaining memory is below both the absolute and the relative floor.
fn default_task_memory(
    facts: &MemoryFacts,
    object_store_memory: u64,
    redis_reserve: u64,
) -> crate::Result<u64> {
    // Explicit sizes may exceed `i64::MAX`
    let memory = i128::from(facts.available_memory)
        - i128::from(object_store_memory)
        - i128::from(redis_reserve);
    if (memory as f64) < TASK_MEMORY_ABSOLUTE_FLOOR
        && (memory as f64) < TASK_MEMORY_RELATIVE_FLOOR * facts.system_memory as f64
    {
        return Err(NodeSpecError::InsufficientMemory {
            memory,
            system_memory: facts.system_memory,
        });
    }
    Ok(memory.max(0) as u64)
}
