macro_rules! create_nodespec_env {
    ($name: literal) => {
        concat!("NODESPEC_", $name)
    };
}

/// Policy overrides
pub const NODESPEC_OBJECT_STORE_MEMORY_PROPORTION: &str =
    create_nodespec_env!("OBJECT_STORE_MEMORY_PROPORTION");
pub const NODESPEC_OBJECT_STORE_MAX_MEMORY_BYTES: &str =
    create_nodespec_env!("OBJECT_STORE_MAX_MEMORY_BYTES");
pub const NODESPEC_ACCELERATOR_TYPE: &str = create_nodespec_env!("ACCELERATOR_TYPE");

/// Accelerator visibility allow-lists set by the job launcher
pub const CUDA_VISIBLE_DEVICES: &str = "CUDA_VISIBLE_DEVICES";
pub const XPU_VISIBLE_DEVICES: &str = "XPU_VISIBLE_DEVICES";
