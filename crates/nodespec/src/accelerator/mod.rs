//! Accelerator detection.
//!
//! Each accelerator family is counted through a chain of [`DeviceEnumerator`]
//! strategies. Detection is best-effort: a strategy whose tool or driver
//! is missing reports `Ok(None)`, a failing strategy is logged and skipped,
//! and when no strategy reports anything the node simply has no accelerators.
//! Only a conflict between the requested count and the visibility allow-list
//! is a hard error.

pub mod cuda;
pub mod xpu;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use nom::bytes::complete::{tag, take_while};
use nom::combinator::map;
use nom::multi::separated_list1;
use serde::{Deserialize, Serialize};

use crate::common::env::{CUDA_VISIBLE_DEVICES, XPU_VISIBLE_DEVICES};
use crate::common::error::NodeSpecError;
use crate::common::format::format_comma_delimited;
use crate::common::parser::{NomResult, consume_all};
use crate::common::{Map, has_unique_elements};
use crate::host::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcceleratorFamily {
    #[serde(rename = "CUDA")]
    Cuda,
    #[serde(rename = "XPU")]
    Xpu,
}

impl AcceleratorFamily {
    /// Environment variable that restricts which devices this process may use.
    pub fn visible_devices_env(&self) -> &'static str {
        match self {
            AcceleratorFamily::Cuda => CUDA_VISIBLE_DEVICES,
            AcceleratorFamily::Xpu => XPU_VISIBLE_DEVICES,
        }
    }

    pub fn device_label(&self) -> &'static str {
        match self {
            AcceleratorFamily::Cuda => "GPUs",
            AcceleratorFamily::Xpu => "XPUs",
        }
    }
}

impl Display for AcceleratorFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AcceleratorFamily::Cuda => "CUDA",
            AcceleratorFamily::Xpu => "XPU",
        })
    }
}

impl FromStr for AcceleratorFamily {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CUDA" => Ok(AcceleratorFamily::Cuda),
            "XPU" => Ok(AcceleratorFamily::Xpu),
            _ => anyhow::bail!("Unknown accelerator type '{s}', expected CUDA or XPU"),
        }
    }
}

/// A single enumerated device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Device {
    /// Model name, if the enumeration source reports one.
    pub name: Option<String>,
}

impl Device {
    pub fn named<S: Into<String>>(name: S) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self { name: None }
    }
}

/// A source of device enumeration, e.g. a vendor tool or a driver interface.
pub trait DeviceEnumerator {
    fn name(&self) -> &'static str;

    /// Returns `Ok(None)` when the source is not present on this machine.
    fn enumerate(&self) -> anyhow::Result<Option<Vec<Device>>>;
}

pub type DetectedAccelerators = (f64, Map<String, f64>);

pub struct AcceleratorDetector {
    family: AcceleratorFamily,
    enumerators: Vec<Box<dyn DeviceEnumerator>>,
    visible_devices: Option<Vec<String>>,
}

impl AcceleratorDetector {
    pub fn new(
        family: AcceleratorFamily,
        enumerators: Vec<Box<dyn DeviceEnumerator>>,
        visible_devices: Option<Vec<String>>,
    ) -> Self {
        Self {
            family,
            enumerators,
            visible_devices,
        }
    }

    /// Creates a detector with the strategies available on `platform`
    /// and the allow-list taken from the process environment.
    pub fn local(family: AcceleratorFamily, platform: Platform) -> Self {
        let enumerators = match family {
            AcceleratorFamily::Cuda => cuda::enumerators(platform),
            AcceleratorFamily::Xpu => xpu::enumerators(),
        };
        let visible_devices = std::env::var(family.visible_devices_env())
            .ok()
            .and_then(|value| parse_visible_devices(family, &value));
        Self::new(family, enumerators, visible_devices)
    }

    /// Resolves the accelerator count and the type constraint resources.
    ///
    /// An explicit `requested` count is kept as is, but it must fit into the
    /// visibility allow-list. Without it, the enumerated count is used,
    /// clamped to the allow-list.
    pub fn detect(&self, requested: Option<f64>) -> crate::Result<DetectedAccelerators> {
        if let (Some(requested), Some(visible)) = (requested, &self.visible_devices) {
            if requested > visible.len() as f64 {
                return Err(NodeSpecError::MismatchedVisibleDeviceCount {
                    family: self.family,
                    variable: self.family.visible_devices_env(),
                    requested,
                    visible: visible.clone(),
                });
            }
        }

        let devices = self.enumerate_devices().unwrap_or_default();
        let count = match requested {
            Some(count) => count,
            None => {
                let mut count = devices.len();
                if let Some(visible) = &self.visible_devices {
                    count = count.min(visible.len());
                }
                log::info!("Detected {count} {}", self.family.device_label());
                count as f64
            }
        };

        let constraints = match self.family {
            AcceleratorFamily::Cuda => cuda::type_constraints(&devices),
            AcceleratorFamily::Xpu => xpu::type_constraints(),
        };
        Ok((count, constraints))
    }

    /// Returns the devices of the first enumerator that is present.
    fn enumerate_devices(&self) -> Option<Vec<Device>> {
        for enumerator in &self.enumerators {
            match enumerator.enumerate() {
                Ok(Some(devices)) => {
                    log::debug!(
                        "Enumerated {} {} device(s) using {}",
                        devices.len(),
                        self.family,
                        enumerator.name()
                    );
                    return Some(devices);
                }
                Ok(None) => log::debug!("{} is not available", enumerator.name()),
                Err(error) => log::warn!(
                    "Cannot enumerate {} devices using {}: {error:?}",
                    self.family,
                    enumerator.name()
                ),
            }
        }
        None
    }
}

fn p_visible_devices(input: &str) -> NomResult<Vec<String>> {
    separated_list1(
        tag(","),
        map(take_while(|c: char| c != ','), |item: &str| item.trim().to_string()),
    )(input)
}

/// Parses the value of a visibility allow-list variable.
///
/// An empty value (or `NoDevFiles`, which some launchers set) hides all devices.
fn parse_visible_devices(family: AcceleratorFamily, value: &str) -> Option<Vec<String>> {
    let value = value.trim();
    if value.is_empty() || value == "NoDevFiles" {
        return Some(Vec::new());
    }
    match consume_all(p_visible_devices, value) {
        Ok(devices) => {
            log::info!(
                "Detected {} {} from `{}`",
                family.device_label(),
                format_comma_delimited(&devices),
                family.visible_devices_env()
            );
            if !has_unique_elements(&devices) {
                log::warn!(
                    "{} contains duplicates ({value})",
                    family.visible_devices_env()
                );
            }
            Some(devices)
        }
        Err(error) => {
            log::warn!(
                "Cannot parse `{}`: {error:?}",
                family.visible_devices_env()
            );
            None
        }
    }
}
