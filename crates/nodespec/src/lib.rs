pub mod accelerator;
pub mod common;
pub mod config;
pub mod host;
pub mod resources;

#[cfg(test)]
pub(crate) mod tests;

pub type Error = crate::common::error::NodeSpecError;
pub type Result<T> = std::result::Result<T, Error>;

pub use crate::common::Map;

// Reexports
pub use crate::accelerator::{AcceleratorDetector, AcceleratorFamily};
pub use crate::config::ResourcePolicy;
pub use crate::host::{HostProbe, LocalHost, Platform};
pub use crate::resources::{ResolveContext, ResourceSpec};
