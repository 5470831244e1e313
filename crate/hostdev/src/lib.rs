//! # 宿主机设备解析
//!
//! 将用户指定的宿主机设备（单个设备节点或包含多个设备的目录）解析为 OCI
//! `LinuxDevice` 以及对应的设备 cgroup 规则，并与默认设备列表合并。
//!
//! ## 核心组件
//! - **device**: 检查单个路径，提取设备类型、主/次设备号、权限位和属主
//! - **resolve**: 解析设备映射，必要时递归遍历目录
//! - **merge**: 合并默认设备与用户设备，处理覆盖与控制终端排除规则
//! - **specconf**: 将合并结果写入容器的 OCI 运行时配置
//!
//! ## 流程
//! ```text
//! DeviceMapping ──► resolve ──► device::inspect (目录时逐项)
//!                      │
//!   DEFAULT_DEVICES ───┴──► merge ──► Spec.linux.devices / resources.devices
//! ```

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate slog;

pub mod device;
pub mod error;
pub mod mapping;
pub mod merge;
pub mod resolve;
pub mod specconf;

pub use device::{HostStat, Inspection, NodeInfo, NodeKind, NodeStat, device_from_path, inspect};
pub use error::DeviceError;
pub use mapping::DeviceMapping;
pub use merge::{CONTROLLING_TERMINAL, DEFAULT_DEVICES, HostDevice, merge_devices};
pub use resolve::{ResolvedDevices, Resolver, devices_from_mapping};
pub use specconf::DeviceOpts;

fn sl() -> slog::Logger {
    slog_scope::logger().new(o!("subsystem" => "devices"))
}
