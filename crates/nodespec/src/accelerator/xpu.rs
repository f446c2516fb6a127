use std::process::Command;

use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{digit1, space0};
use nom::combinator::{map, rest};
use nom::sequence::{preceded, terminated, tuple};

use crate::accelerator::cuda::run_probe_command;
use crate::accelerator::{Device, DeviceEnumerator};
use crate::common::Map;
use crate::common::parser::NomResult;
use crate::resources::RESOURCE_CONSTRAINT_PREFIX;

/// Only devices of this backend and type are counted as XPUs.
pub const XPU_BACKEND_TYPE: &str = "level_zero";
pub const XPU_DEVICE_TYPE: &str = "gpu";

pub(super) fn enumerators() -> Vec<Box<dyn DeviceEnumerator>> {
    vec![Box::new(SyclLs)]
}

/// XPUs are scheduled as GPUs, only tagged with a generic type.
pub(super) fn type_constraints() -> Map<String, f64> {
    Map::from([(format!("{RESOURCE_CONSTRAINT_PREFIX}xpu"), 1.0)])
}

/// Lists SYCL devices using `sycl-ls`.
/// Example expected output:
/// ```console
/// $ sycl-ls
/// [opencl:cpu:0] Intel(R) OpenCL, Intel(R) Xeon(R) Platinum 8480+ 3.0 [2023.16.7.0.21_160000]
/// [ext_oneapi_level_zero:gpu:0] Intel(R) Level-Zero, Intel(R) Data Center GPU Max 1550 1.3 [1.3.26241]
/// ```
pub struct SyclLs;

impl DeviceEnumerator for SyclLs {
    fn name(&self) -> &'static str {
        "sycl-ls"
    }

    fn enumerate(&self) -> anyhow::Result<Option<Vec<Device>>> {
        let mut command = Command::new("sycl-ls");
        Ok(run_probe_command(&mut command)?.map(|stdout| parse_sycl_devices(&stdout)))
    }
}

struct SyclDevice<'a> {
    backend: &'a str,
    device_type: &'a str,
    name: &'a str,
}

fn p_sycl_field(input: &str) -> NomResult<&str> {
    take_while1(|c: char| c != ':' && c != ']')(input)
}

fn p_sycl_device(input: &str) -> NomResult<SyclDevice> {
    map(
        tuple((
            preceded(tag("["), terminated(p_sycl_field, tag(":"))),
            terminated(p_sycl_field, tag(":")),
            terminated(digit1, tag("]")),
            preceded(space0, rest),
        )),
        |(backend, device_type, _, name)| SyclDevice {
            backend,
            device_type,
            name: name.trim(),
        },
    )(input)
}

/// Older runtimes prefix the backend, e.g. `ext_oneapi_level_zero`.
fn parse_sycl_devices(output: &str) -> Vec<Device> {
    output
        .lines()
        .filter_map(|line| p_sycl_device(line.trim()).ok().map(|(_, device)| device))
        .filter(|device| {
            device.backend.ends_with(XPU_BACKEND_TYPE) && device.device_type == XPU_DEVICE_TYPE
        })
        .map(|device| Device::named(device.name))
        .collect()
}
