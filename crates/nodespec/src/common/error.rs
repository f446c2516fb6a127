use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::accelerator::AcceleratorFamily;

/// Which rule a flattened resource quantity breaks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuantityViolation {
    NotWholeNumber,
    Negative,
    ExceedsMaximum(f64),
}

impl Display for QuantityViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotWholeNumber => f.write_str("Resource quantities must all be whole numbers."),
            Self::Negative => f.write_str("Resource quantities must be nonnegative."),
            Self::ExceedsMaximum(max) => write!(f, "Resource quantities must be at most {max}."),
        }
    }
}

#[derive(Debug, Error)]
pub enum NodeSpecError {
    #[error("{0} is a reserved resource name, use another name instead.")]
    ReservedResourceName(String),
    #[error(
        "Attempting to start the node with {requested} {}, but {variable} contains {visible:?}.",
        .family.device_label()
    )]
    MismatchedVisibleDeviceCount {
        family: AcceleratorFamily,
        variable: &'static str,
        requested: f64,
        visible: Vec<String>,
    },
    #[error(
        "Attempting to cap Redis memory usage at {requested} bytes, but the minimum allowed is {minimum} bytes."
    )]
    RedisMemoryBelowMinimum { requested: u64, minimum: u64 },
    #[error(
        "After taking into account object store and redis memory usage, the amount of memory on this node available for tasks and actors ({:.2} GB) is less than {}% of total. You can adjust these settings with `memory=<bytes>` and `object_store_memory=<bytes>`.",
        gigabytes(.memory),
        percent_of(.memory, .system_memory)
    )]
    InsufficientMemory { memory: i128, system_memory: u64 },
    #[error("{violation} Violated by resource '{name}' ({value}).")]
    InvalidResourceQuantity {
        name: String,
        value: f64,
        violation: QuantityViolation,
    },
    #[error("Host probe error: {0}")]
    HostProbe(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

fn gigabytes(memory: &i128) -> f64 {
    *memory as f64 / 1e9
}

fn percent_of(memory: &i128, system_memory: &u64) -> i64 {
    (100.0 * *memory as f64 / *system_memory as f64) as i64
}

impl From<anyhow::Error> for NodeSpecError {
    fn from(error: anyhow::Error) -> Self {
        Self::HostProbe(format!("{error:#}"))
    }
}

impl From<toml::de::Error> for NodeSpecError {
    fn from(error: toml::de::Error) -> Self {
        Self::Config(error.to_string())
    }
}

