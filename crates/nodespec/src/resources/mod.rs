pub mod map;
pub mod memory;
pub mod spec;

pub use memory::{MemoryFacts, MemoryRequest, MemorySizing, size_memory};
pub use spec::{ResolveContext, ResourceSpec};

pub const CPU_RESOURCE_NAME: &str = "CPU";
pub const GPU_RESOURCE_NAME: &str = "GPU";
pub const MEMORY_RESOURCE_NAME: &str = "memory";
pub const OBJECT_STORE_MEMORY_RESOURCE_NAME: &str = "object_store_memory";

/// Names that are filled from dedicated fields and cannot be custom resources.
pub const RESERVED_RESOURCE_NAMES: [&str; 4] = [
    CPU_RESOURCE_NAME,
    GPU_RESOURCE_NAME,
    MEMORY_RESOURCE_NAME,
    OBJECT_STORE_MEMORY_RESOURCE_NAME,
];

/// Prefix of the resource that identifies a node, e.g. `node:172.23.42.1`.
pub const NODE_ID_PREFIX: &str = "node:";
pub const HEAD_NODE_RESOURCE_NAME: &str = "node:__internal_head__";

/// Prefix of resources describing the accelerator model, e.g. `accelerator_type:V100`.
pub const RESOURCE_CONSTRAINT_PREFIX: &str = "accelerator_type:";
