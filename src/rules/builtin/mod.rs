mod docker_only;
mod eol;
mod gpu_memory;
mod info_signals;
mod ml_niche;
mod node;
mod port_collision;
mod python_version;
mod spec_drift;
mod toolchain;
mod torch_cuda;
mod wheels;

use std::sync::Arc;

use super::Rule;
use crate::config::RulesConfig;
use crate::host::PortProbe;

pub use spec_drift::SpecDriftPolicy;

/// Returns all built-in rules, in declaration order.
///
/// The order is part of the report contract: findings of equal severity
/// appear in this order.
pub fn all_rules(config: &RulesConfig, ports: Arc<dyn PortProbe>) -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(torch_cuda::TorchCudaMismatch),
        Box::new(python_version::PythonVersionMismatch),
        Box::new(eol::PythonEol),
        Box::new(spec_drift::SpecDrift::new(config.spec_drift.clone())),
        Box::new(wheels::AbiWheelMismatch),
        Box::new(wheels::AppleSiliconWheels),
        Box::new(toolchain::NativeToolchainMissing),
        Box::new(gpu_memory::GpuMemoryRisk),
        Box::new(toolchain::NodeNativeWindows),
        Box::new(node::NodeEngineMismatch),
        Box::new(eol::NodeEol),
        Box::new(node::LockFileMissing),
        Box::new(toolchain::MissingSystemLibs),
        Box::new(port_collision::PortCollisionRisk::new(ports)),
        Box::new(docker_only::DockerOnlyDev),
        Box::new(ml_niche::LoraMlxScaling),
        Box::new(ml_niche::TorchaoIncompatible),
        Box::new(info_signals::PythonMinorMismatch),
        Box::new(info_signals::MultiplePythonSubprojects),
        Box::new(info_signals::MixedPythonNode),
        Box::new(info_signals::DockerPythonMismatch),
        Box::new(info_signals::LowRamMultiService),
    ]
}
