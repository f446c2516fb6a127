use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use nom::bytes::complete::take_while1;
use nom::sequence::{pair, preceded};

use crate::accelerator::{Device, DeviceEnumerator};
use crate::common::Map;
use crate::common::parser::NomResult;
use crate::host::Platform;
use crate::resources::RESOURCE_CONSTRAINT_PREFIX;

pub const PROC_NVIDIA_GPUS_PATH: &str = "/proc/driver/nvidia/gpus";

pub(super) fn enumerators(platform: Platform) -> Vec<Box<dyn DeviceEnumerator>> {
    let mut enumerators: Vec<Box<dyn DeviceEnumerator>> = vec![Box::new(NvidiaSmi)];
    match platform {
        Platform::Linux => enumerators.push(Box::new(ProcDriverNvidia::new(PROC_NVIDIA_GPUS_PATH))),
        Platform::Windows => enumerators.push(Box::new(Wmic)),
        Platform::MacOs | Platform::Other => {}
    }
    enumerators
}

/// Emits `accelerator_type:<model>` based on the last device that reports a name.
pub(super) fn type_constraints(devices: &[Device]) -> Map<String, f64> {
    let model = devices
        .iter()
        .rev()
        .find_map(|device| device.name.as_deref())
        .and_then(pretty_gpu_name);
    match model {
        Some(model) => Map::from([(format!("{RESOURCE_CONSTRAINT_PREFIX}{model}"), 1.0)]),
        None => {
            log::debug!("No GPU model type detected");
            Map::new()
        }
    }
}

/// Word, whitespace, then an uppercase alphanumeric model token,
/// e.g. `Tesla V100-SXM2-16GB` → `V100`.
fn p_gpu_model(input: &str) -> NomResult<&str> {
    preceded(
        pair(
            take_while1(|c: char| c.is_alphanumeric() || c == '_'),
            take_while1(char::is_whitespace),
        ),
        take_while1(|c: char| c.is_ascii_uppercase() || c.is_ascii_digit()),
    )(input)
}

/// Only the beginning of the name has to match.
pub fn pretty_gpu_name(name: &str) -> Option<String> {
    p_gpu_model(name).ok().map(|(_, model)| model.to_string())
}

/// Finds the `Model:` line of a `/proc/driver/nvidia/gpus/*/information` file.
pub fn parse_model_from_info(info: &str) -> Option<String> {
    info.split('\n').find_map(|line| {
        let mut parts = line.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) if key.trim() == "Model" => {
                Some(value.trim().to_string())
            }
            _ => None,
        }
    })
}

/// Runs `command` and returns its stdout, or `None` when the program is not installed.
pub(super) fn run_probe_command(command: &mut Command) -> anyhow::Result<Option<String>> {
    let program = command.get_program().to_string_lossy().to_string();
    let output = match command.output() {
        Ok(output) => output,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => anyhow::bail!("Cannot execute {program}: {error:?}"),
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        anyhow::bail!(
            "{program} exited with error code {}\nStdout: {stdout}\nStderr: {stderr}",
            output.status
        );
    }
    Ok(Some(stdout.into_owned()))
}

/// Lists Nvidia GPUs using `nvidia-smi`.
/// Example expected output:
/// ```console
/// $ nvidia-smi --query-gpu=name --format=csv,noheader
/// Tesla V100-SXM2-16GB
/// Tesla V100-SXM2-16GB
/// ```
pub struct NvidiaSmi;

impl DeviceEnumerator for NvidiaSmi {
    fn name(&self) -> &'static str {
        "nvidia-smi"
    }

    fn enumerate(&self) -> anyhow::Result<Option<Vec<Device>>> {
        let mut command = Command::new("nvidia-smi");
        command.args(["--query-gpu=name", "--format=csv,noheader"]);
        Ok(run_probe_command(&mut command)?.map(|stdout| parse_nvidia_smi_names(&stdout)))
    }
}

fn parse_nvidia_smi_names(output: &str) -> Vec<Device> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Device::named)
        .collect()
}

/// Lists Nvidia GPUs exposed by the Linux driver, one directory per GPU.
pub struct ProcDriverNvidia {
    path: PathBuf,
}

impl ProcDriverNvidia {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl DeviceEnumerator for ProcDriverNvidia {
    fn name(&self) -> &'static str {
        "nvidia driver"
    }

    fn enumerate(&self) -> anyhow::Result<Option<Vec<Device>>> {
        if !self.path.is_dir() {
            return Ok(None);
        }
        let mut gpu_dirs = std::fs::read_dir(&self.path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        gpu_dirs.sort();

        Ok(Some(
            gpu_dirs
                .iter()
                .map(|dir| Device {
                    name: read_gpu_model(dir),
                })
                .collect(),
        ))
    }
}

fn read_gpu_model(gpu_dir: &Path) -> Option<String> {
    let path = gpu_dir.join("information");
    match std::fs::read_to_string(&path) {
        Ok(info) => parse_model_from_info(&info),
        Err(error) => {
            log::debug!("Cannot read {}: {error}", path.display());
            None
        }
    }
}

/// Counts Nvidia adapters reported by `WMIC` on Windows. Model names are not available.
pub struct Wmic;

impl DeviceEnumerator for Wmic {
    fn name(&self) -> &'static str {
        "WMIC"
    }

    fn enumerate(&self) -> anyhow::Result<Option<Vec<Device>>> {
        let mut command = Command::new("WMIC");
        command.args(["PATH", "Win32_VideoController", "GET", "AdapterCompatibility"]);
        Ok(run_probe_command(&mut command)?
            .map(|stdout| vec![Device::anonymous(); count_wmic_nvidia_adapters(&stdout)]))
    }
}

fn count_wmic_nvidia_adapters(output: &str) -> usize {
    output
        .lines()
        .skip(1)
        .filter(|line| line.starts_with("NVIDIA"))
        .count()
}

#[cfg(test)]
mod tests {
    use super::{
        ProcDriverNvidia, count_wmic_nvidia_adapters, enumerators, parse_model_from_info,
        parse_nvidia_smi_names, pretty_gpu_name, type_constraints,
    };
    use crate::Map;
    use crate::accelerator::{Device, DeviceEnumerator};
    use crate::host::Platform;

    const V100_INFO: &str = "Model: \t\t Tesla V100-SXM2-16GB\n\
        IRQ:   \t\t 107\n\
        GPU UUID: \t GPU-8eaaebb8-bb64-8489-fda2-62256e821983\n\
        Video BIOS: \t 88.00.4f.00.09\n\
        Bus Type: \t PCIe\n\
        DMA Size: \t 47 bits\n\
        DMA Mask: \t 0x7fffffffffff\n\
        Bus Location: \t 0000:00:1e.0\n\
        Device Minor: \t 0\n\
        Blacklisted:\t No\n";

    fn enumerator_names(platform: Platform) -> Vec<&'static str> {
        enumerators(platform).iter().map(|e| e.name()).collect()
    }

    #[test]
    fn test_enumerators_per_platform() {
        assert_eq!(
            enumerator_names(Platform::Linux),
            vec!["nvidia-smi", "nvidia driver"]
        );
        assert_eq!(
            enumerator_names(Platform::Windows),
            vec!["nvidia-smi", "WMIC"]
        );
        assert_eq!(enumerator_names(Platform::MacOs), vec!["nvidia-smi"]);
        assert_eq!(enumerator_names(Platform::Other), vec!["nvidia-smi"]);
    }

    #[test]
    fn test_pretty_gpu_name() {
        assert_eq!(pretty_gpu_name("Tesla V100-SXM2-16GB").as_deref(), Some("V100"));
        assert_eq!(pretty_gpu_name("Tesla K80").as_deref(), Some("K80"));
        assert_eq!(pretty_gpu_name("Tesla T4").as_deref(), Some("T4"));
        assert_eq!(pretty_gpu_name("NVIDIA A100-SXM4-40GB").as_deref(), Some("A100"));
        assert_eq!(pretty_gpu_name("NVIDIA GeForce RTX 3090").as_deref(), Some("G"));
        assert_eq!(pretty_gpu_name("Tesla").as_deref(), None);
        assert_eq!(pretty_gpu_name("Tesla v100").as_deref(), None);
        assert_eq!(pretty_gpu_name(" Tesla V100").as_deref(), None);
        assert_eq!(pretty_gpu_name("").as_deref(), None);
    }

    #[test]
    fn test_parse_model_from_info() {
        assert_eq!(
            parse_model_from_info(V100_INFO).as_deref(),
            Some("Tesla V100-SXM2-16GB")
        );
        assert_eq!(parse_model_from_info("IRQ: 107\n"), None);
        assert_eq!(parse_model_from_info(""), None);
        // Lines with more than one colon are skipped.
        assert_eq!(parse_model_from_info("Model: a:b\n"), None);
    }

    #[test]
    fn test_type_constraints() {
        let devices = vec![
            Device::named("Tesla V100-SXM2-16GB"),
            Device::named("Tesla K80"),
            Device::anonymous(),
        ];
        assert_eq!(
            type_constraints(&devices),
            Map::from([("accelerator_type:K80".to_string(), 1.0)])
        );
        // Only the last named device is looked at
        assert!(
            type_constraints(&[Device::named("Tesla T4"), Device::named("unknown")]).is_empty()
        );
        assert!(type_constraints(&[Device::named("unknown")]).is_empty());
        assert!(type_constraints(&[]).is_empty());
    }

    #[test]
    fn test_parse_nvidia_smi_names() {
        let devices = parse_nvidia_smi_names("Tesla T4\nTesla T4\n\n");
        assert_eq!(devices, vec![Device::named("Tesla T4"), Device::named("Tesla T4")]);
    }

    #[test]
    fn test_count_wmic_nvidia_adapters() {
        let output = "AdapterCompatibility  \r\n\
            NVIDIA                \r\n\
            Intel Corporation     \r\n\
            NVIDIA                \r\n\
            \r\n";
        assert_eq!(count_wmic_nvidia_adapters(output), 2);
        assert_eq!(count_wmic_nvidia_adapters("NVIDIA\n"), 0);
    }

    #[test]
    fn test_proc_driver_missing() {
        let dir = tempfile::tempdir().unwrap();
        let enumerator = ProcDriverNvidia::new(dir.path().join("gpus"));
        assert_eq!(enumerator.enumerate().unwrap(), None);
    }

    #[test]
    fn test_proc_driver_devices() {
        let dir = tempfile::tempdir().unwrap();
        for (bus, info) in [("0000:00:1e.0", Some(V100_INFO)), ("0000:00:1f.0", None)] {
            let gpu_dir = dir.path().join(bus);
            std::fs::create_dir(&gpu_dir).unwrap();
            if let Some(info) = info {
                std::fs::write(gpu_dir.join("information"), info).unwrap();
            }
        }

        let devices = ProcDriverNvidia::new(dir.path()).enumerate().unwrap().unwrap();
        assert_eq!(
            devices,
            vec![Device::named("Tesla V100-SXM2-16GB"), Device::anonymous()]
        );
    }
}
