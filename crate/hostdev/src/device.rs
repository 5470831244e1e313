//! # 设备节点检查
//!
//! 通过 `lstat` 读取单个路径的元数据，判断其是否为字符/块设备节点，
//! 并生成对应的 `LinuxDevice` 与 `LinuxDeviceCgroup` 规则。

use std::{
    fs,
    os::unix::fs::{FileTypeExt, MetadataExt},
    path::Path,
};

use nix::sys::stat;
use oci_spec::runtime::{
    LinuxDevice, LinuxDeviceBuilder, LinuxDeviceCgroup, LinuxDeviceCgroupBuilder, LinuxDeviceType,
};

use crate::error::{DeviceError, Result};

/// Owner/group/other rwx bits kept in `LinuxDevice::file_mode`.
pub const PERMISSION_BITS: u32 = 0o777;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Char,
    Block,
    Other,
}

/// Raw metadata of a filesystem entry, read without following symlinks.
#[derive(Debug, Clone, Copy)]
pub struct NodeInfo {
    pub kind: NodeKind,
    /// Combined device number. `None` when the platform does not report one.
    pub rdev: Option<u64>,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

pub trait NodeStat {
    fn lstat(&self, path: &Path) -> Result<NodeInfo>;
}

/// Reads metadata from the host filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostStat;

impl NodeStat for HostStat {
    fn lstat(&self, path: &Path) -> Result<NodeInfo> {
        let meta = fs::symlink_metadata(path).map_err(|source| DeviceError::NotFound {
            path: path.to_path_buf(),
            source,
        })?;

        let file_type = meta.file_type();
        let kind = if file_type.is_char_device() {
            NodeKind::Char
        } else if file_type.is_block_device() {
            NodeKind::Block
        } else {
            NodeKind::Other
        };

        Ok(NodeInfo {
            kind,
            rdev: Some(meta.rdev()),
            mode: meta.mode(),
            uid: meta.uid(),
            gid: meta.gid(),
        })
    }
}

/// Result of inspecting a single path.
#[derive(Debug, Clone, PartialEq)]
pub enum Inspection {
    Device(LinuxDevice, LinuxDeviceCgroup),
    NotADevice,
}

/// Looks up the device behind `path` on the host. `permissions` is the
/// cgroup access string, which cannot be queried from the node itself.
pub fn device_from_path(path: &Path, permissions: &str) -> Result<Inspection> {
    inspect(&HostStat, path, permissions)
}

pub fn inspect<S: NodeStat + ?Sized>(
    source: &S,
    path: &Path,
    permissions: &str,
) -> Result<Inspection> {
    let info = source.lstat(path)?;

    let typ = match info.kind {
        NodeKind::Char => LinuxDeviceType::C,
        NodeKind::Block => LinuxDeviceType::B,
        NodeKind::Other => return Ok(Inspection::NotADevice),
    };

    let rdev = info
        .rdev
        .ok_or_else(|| DeviceError::DeviceNumberUnavailable(path.to_path_buf()))?;
    let major = stat::major(rdev) as i64;
    let minor = stat::minor(rdev) as i64;

    let device = LinuxDeviceBuilder::default()
        .path(path.to_path_buf())
        .typ(typ)
        .major(major)
        .minor(minor)
        .file_mode(info.mode & PERMISSION_BITS)
        .uid(info.uid)
        .gid(info.gid)
        .build()?;

    let rule = LinuxDeviceCgroupBuilder::default()
        .allow(true)
        .typ(typ)
        .major(major)
        .minor(minor)
        .access(permissions)
        .build()?;

    Ok(Inspection::Device(device, rule))
}
