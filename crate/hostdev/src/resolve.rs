//! # 设备映射解析
//!
//! 将用户的设备映射（宿主机路径 → 容器路径）解析为一个或多个设备。
//! 宿主机路径本身不是设备节点时，若其为目录，则递归遍历目录树，
//! 收集其中所有的设备节点；单个条目的失败会被忽略。

use std::{
    fs,
    path::{Path, PathBuf},
};

use oci_spec::runtime::{LinuxDevice, LinuxDeviceCgroup};
use serde::Serialize;
use walkdir::WalkDir;

use crate::{
    device::{HostStat, Inspection, NodeStat, inspect},
    error::{DeviceError, Result},
    mapping::DeviceMapping,
    sl,
};

/// Devices to create in the container and the cgroup rules allowing them.
/// Both lists are index-aligned for resolved devices.
#[derive(Serialize, Debug, Default, Clone, PartialEq)]
pub struct ResolvedDevices {
    pub devices: Vec<LinuxDevice>,
    pub cgroup_rules: Vec<LinuxDeviceCgroup>,
}

impl ResolvedDevices {
    pub fn push(&mut self, device: LinuxDevice, rule: LinuxDeviceCgroup) {
        self.devices.push(device);
        self.cgroup_rules.push(rule);
    }

    pub fn extend(&mut self, other: ResolvedDevices) {
        self.devices.extend(other.devices);
        self.cgroup_rules.extend(other.cgroup_rules);
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }
}

/// Resolves device mappings against the host filesystem.
pub fn devices_from_mapping(mapping: &DeviceMapping) -> Result<ResolvedDevices> {
    Resolver::new(HostStat).resolve(mapping)
}

#[derive(Debug, Default, Clone)]
pub struct Resolver<S> {
    stat: S,
}

impl<S: NodeStat> Resolver<S> {
    pub fn new(stat: S) -> Self {
        Resolver { stat }
    }

    pub fn resolve(&self, mapping: &DeviceMapping) -> Result<ResolvedDevices> {
        let host = mapping.path_on_host.as_path();
        let container = mapping.path_in_container.as_path();
        let permissions = mapping.cgroup_permissions.as_str();

        let cause = match inspect(&self.stat, host, permissions) {
            Ok(Inspection::Device(mut device, rule)) => {
                device.set_path(container.to_path_buf());
                let mut resolved = ResolvedDevices::default();
                resolved.push(device, rule);
                return Ok(resolved);
            }
            Ok(Inspection::NotADevice) => DeviceError::NotADevice(host.to_path_buf()),
            Err(e) => return Err(mapping_failed(host, e)),
        };

        // the host path may be a directory holding many devices
        let resolved = match fs::metadata(host) {
            Ok(meta) if meta.is_dir() => self.walk(host, container, permissions),
            _ => ResolvedDevices::default(),
        };

        if resolved.is_empty() {
            return Err(mapping_failed(host, cause));
        }

        info!(sl(), "resolved devices under directory";
            "host-path" => host.display().to_string(),
            "container-path" => container.display().to_string(),
            "count" => resolved.len()
        );

        Ok(resolved)
    }

    fn walk(&self, host: &Path, container: &Path, permissions: &str) -> ResolvedDevices {
        let mut resolved = ResolvedDevices::default();

        for entry in WalkDir::new(host).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(sl(), "skip unreadable entry"; "error" => e.to_string());
                    continue;
                }
            };

            let path = entry.path();
            match inspect(&self.stat, path, permissions) {
                Ok(Inspection::Device(mut device, rule)) => {
                    let Some(target) = rewrite_path(path, host, container) else {
                        continue;
                    };
                    device.set_path(target);
                    resolved.push(device, rule);
                }
                Ok(Inspection::NotADevice) => {}
                Err(e) => {
                    debug!(sl(), "ignore device"; "path" => path.display().to_string(), "error" => e.to_string());
                }
            }
        }

        resolved
    }
}

fn mapping_failed(host: &Path, cause: DeviceError) -> DeviceError {
    DeviceError::MappingFailed {
        host_path: host.to_path_buf(),
        source: Box::new(cause),
    }
}

/// Replaces the leading `host` components of `path` with `container`.
pub fn rewrite_path(path: &Path, host: &Path, container: &Path) -> Option<PathBuf> {
    let rest = path.strip_prefix(host).ok()?;
    if rest.as_os_str().is_empty() {
        return Some(container.to_path_buf());
    }

    Some(container.join(rest))
}
