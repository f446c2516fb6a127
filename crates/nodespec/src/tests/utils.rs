use crate::Map;
use crate::accelerator::{AcceleratorDetector, AcceleratorFamily, Device, DeviceEnumerator};
use crate::config::ResourcePolicy;
use crate::host::{HostProbe, Platform};
use crate::resources::ResolveContext;

const GB: u64 = 1_000_000_000;

pub fn resources(items: &[(&str, f64)]) -> Map<String, f64> {
    items
        .iter()
        .map(|(name, value)| (name.to_string(), *value))
        .collect()
}

#[derive(Debug, Clone)]
pub struct FakeHost {
    pub platform: Platform,
    pub cpus: f64,
    pub system_memory: u64,
    pub available_memory: u64,
    pub shared_memory: Option<u64>,
    pub node_address: String,
    pub fail_cpu_count: bool,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            platform: Platform::Other,
            cpus: 8.0,
            system_memory: 10 * GB,
            available_memory: 10 * GB,
            shared_memory: None,
            node_address: "10.0.0.1".to_string(),
            fail_cpu_count: false,
        }
    }
}

impl HostProbe for FakeHost {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn cpu_count(&self) -> anyhow::Result<f64> {
        if self.fail_cpu_count {
            anyhow::bail!("Cpu detection failed");
        }
        Ok(self.cpus)
    }

    fn system_memory(&self) -> anyhow::Result<u64> {
        Ok(self.system_memory)
    }

    fn available_memory(&self) -> anyhow::Result<u64> {
        Ok(self.available_memory)
    }

    fn shared_memory(&self) -> anyhow::Result<u64> {
        self.shared_memory
            .ok_or_else(|| anyhow::anyhow!("No shared memory"))
    }

    fn node_address(&self) -> anyhow::Result<String> {
        Ok(self.node_address.clone())
    }
}

/// Enumerator with a scripted outcome.
pub struct FakeEnumerator {
    outcome: Option<Option<Vec<Device>>>,
}

impl FakeEnumerator {
    pub fn devices(names: &[&str]) -> Self {
        Self {
            outcome: Some(Some(names.iter().map(|n| Device::named(*n)).collect())),
        }
    }

    pub fn anonymous(count: usize) -> Self {
        Self {
            outcome: Some(Some(vec![Device::anonymous(); count])),
        }
    }

    pub fn absent() -> Self {
        Self {
            outcome: Some(None),
        }
    }

    pub fn failing() -> Self {
        Self { outcome: None }
    }

    pub fn boxed(self) -> Box<dyn DeviceEnumerator> {
        Box::new(self)
    }
}

impl DeviceEnumerator for FakeEnumerator {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn enumerate(&self) -> anyhow::Result<Option<Vec<Device>>> {
        match &self.outcome {
            Some(outcome) => Ok(outcome.clone()),
            None => anyhow::bail!("Enumeration failed"),
        }
    }
}

fn build_context(
    host: FakeHost,
    enumerators: Vec<FakeEnumerator>,
    visible_devices: Option<Vec<String>>,
) -> ResolveContext {
    let detector = AcceleratorDetector::new(
        AcceleratorFamily::Cuda,
        enumerators.into_iter().map(FakeEnumerator::boxed).collect(),
        visible_devices,
    );
    ResolveContext::new(Box::new(host), detector, ResourcePolicy::default())
}

pub fn cuda_context(host: FakeHost, enumerators: Vec<FakeEnumerator>) -> ResolveContext {
    build_context(host, enumerators, None)
}

pub fn context_with_visible_devices(
    host: FakeHost,
    enumerators: Vec<FakeEnumerator>,
    visible: &[&str],
) -> ResolveContext {
    build_context(
        host,
        enumerators,
        Some(visible.iter().map(|s| s.to_string()).collect()),
    )
}
