use serde::{Deserialize, Serialize};

use crate::accelerator::AcceleratorDetector;
use crate::common::Map;
use crate::common::error::NodeSpecError;
use crate::common::format::human_size;
use crate::config::ResourcePolicy;
use crate::host::{HostProbe, LocalHost, Platform};
use crate::resources::memory::{MemoryFacts, MemoryRequest, size_memory};
use crate::resources::{HEAD_NODE_RESOURCE_NAME, NODE_ID_PREFIX, RESERVED_RESOURCE_NAMES};

/// Resources offered by a node.
///
/// Any field may be left unset; [`ResourceSpec::resolve`] fills the unset
/// fields with defaults derived from the local machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourceSpec {
    pub num_cpus: Option<f64>,
    pub num_gpus: Option<f64>,
    /// Memory for tasks and actors, in bytes.
    pub memory: Option<u64>,
    pub object_store_memory: Option<u64>,
    /// Custom resources.
    pub resources: Option<Map<String, f64>>,
    /// Cap of memory used by each redis shard, in bytes.
    pub redis_max_memory: Option<u64>,
}

/// Everything that resolution needs to know about its surroundings.
pub struct ResolveContext {
    host: Box<dyn HostProbe>,
    accelerators: AcceleratorDetector,
    policy: ResourcePolicy,
}

impl ResolveContext {
    pub fn new(
        host: Box<dyn HostProbe>,
        accelerators: AcceleratorDetector,
        policy: ResourcePolicy,
    ) -> Self {
        Self {
            host,
            accelerators,
            policy,
        }
    }

    /// Probes the machine this process runs on.
    pub fn local(policy: ResourcePolicy) -> Self {
        let host = LocalHost::default();
        let accelerators = AcceleratorDetector::local(policy.accelerator, host.platform());
        Self::new(Box::new(host), accelerators, policy)
    }

    pub fn policy(&self) -> &ResourcePolicy {
        &self.policy
    }

    fn memory_facts(&self) -> crate::Result<MemoryFacts> {
        let platform = self.host.platform();
        let shared_memory = if platform == Platform::Linux {
            match self.host.shared_memory() {
                Ok(shm) => Some(shm),
                Err(error) => {
                    log::warn!("Cannot determine shared memory size: {error:?}");
                    None
                }
            }
        } else {
            None
        };
        Ok(MemoryFacts {
            system_memory: self.host.system_memory()?,
            available_memory: self.host.available_memory()?,
            shared_memory,
            platform,
        })
    }
}

impl ResourceSpec {
    /// Returns true if all fields have a value.
    pub fn is_resolved(&self) -> bool {
        self.num_cpus.is_some()
            && self.num_gpus.is_some()
            && self.memory.is_some()
            && self.object_store_memory.is_some()
            && self.resources.is_some()
            && self.redis_max_memory.is_some()
    }

    /// Returns a copy with unset values filled with defaults.
    ///
    /// `node_address` names the node in the injected `node:<address>` resource;
    /// when it is not given, the address is obtained from the host.
    pub fn resolve(
        &self,
        is_head: bool,
        node_address: Option<&str>,
        ctx: &ResolveContext,
    ) -> crate::Result<ResourceSpec> {
        let mut resources = self.resources.clone().unwrap_or_default();
        if let Some(name) = RESERVED_RESOURCE_NAMES
            .iter()
            .find(|name| resources.contains_key(**name))
        {
            return Err(NodeSpecError::ReservedResourceName(name.to_string()));
        }

        let node_address = match node_address {
            Some(address) => address.to_string(),
            None => ctx.host.node_address()?,
        };
        resources.insert(format!("{NODE_ID_PREFIX}{node_address}"), 1.0);

        if resources.contains_key(HEAD_NODE_RESOURCE_NAME) {
            return Err(NodeSpecError::ReservedResourceName(
                HEAD_NODE_RESOURCE_NAME.to_string(),
            ));
        }
        if is_head {
            resources.insert(HEAD_NODE_RESOURCE_NAME.to_string(), 1.0);
        }

        let num_cpus = match self.num_cpus {
            Some(num_cpus) => num_cpus,
            None => {
                let num_cpus = ctx.host.cpu_count()?;
                log::info!("Detected {num_cpus} CPUs");
                num_cpus
            }
        };

        let (num_gpus, gpu_types) = ctx.accelerators.detect(self.num_gpus)?;
        resources.extend(gpu_types);

        let facts = ctx.memory_facts()?;
        let sizing = size_memory(
            &facts,
            &MemoryRequest {
                object_store_memory: self.object_store_memory,
                memory: self.memory,
                redis_max_memory: self.redis_max_memory,
            },
            is_head,
            &ctx.policy,
        )?;
        log::debug!(
            "Memory of node {node_address}: tasks {}, object store {}, redis cap {}",
            human_size(sizing.memory),
            human_size(sizing.object_store_memory),
            human_size(sizing.redis_max_memory)
        );

        let spec = ResourceSpec {
            num_cpus: Some(num_cpus),
            num_gpus: Some(num_gpus),
            memory: Some(sizing.memory),
            object_store_memory: Some(sizing.object_store_memory),
            resources: Some(resources),
            redis_max_memory: Some(sizing.redis_max_memory),
        };
        assert!(spec.is_resolved());
        Ok(spec)
    }
}
