use std::{collections::HashSet, path::PathBuf};

use oci_spec::runtime::{self as oci, LinuxDevice, LinuxDeviceCgroup};

use crate::{resolve::ResolvedDevices, sl};

/// Only exposed to containers that were allocated a terminal.
pub const CONTROLLING_TERMINAL: &str = "/dev/tty";

/// A device from the platform's default allowlist together with the cgroup
/// access it is granted.
#[derive(Debug, Clone, PartialEq)]
pub struct HostDevice {
    pub device: LinuxDevice,
    pub permissions: String,
}

impl HostDevice {
    pub fn to_cgroup_rule(&self) -> LinuxDeviceCgroup {
        let mut rule = LinuxDeviceCgroup::default();
        rule.set_allow(true)
            .set_typ(Some(self.device.typ()))
            .set_major(Some(self.device.major()))
            .set_minor(Some(self.device.minor()))
            .set_access(Some(self.permissions.clone()));
        rule
    }
}

fn default_device(path: &str, major: i64, minor: i64) -> HostDevice {
    HostDevice {
        device: oci::LinuxDeviceBuilder::default()
            .path(PathBuf::from(path))
            .typ(oci::LinuxDeviceType::C)
            .major(major)
            .minor(minor)
            .file_mode(0o666_u32)
            .uid(0_u32)
            .gid(0_u32)
            .build()
            .unwrap(),
        permissions: "rwm".to_string(),
    }
}

lazy_static! {
    pub static ref DEFAULT_DEVICES: Vec<HostDevice> = {
        vec![
            default_device("/dev/null", 1, 3),
            default_device("/dev/zero", 1, 5),
            default_device("/dev/full", 1, 7),
            default_device(CONTROLLING_TERMINAL, 5, 0),
            default_device("/dev/urandom", 1, 9),
            default_device("/dev/random", 1, 8),
        ]
    };
}

/// Combines the default allowlist with the user's devices. User devices
/// replace any default with the same path; the result holds the surviving
/// defaults first, then every user entry, each in input order.
pub fn merge_devices(
    default_devices: &[HostDevice],
    user: ResolvedDevices,
    has_tty: bool,
) -> ResolvedDevices {
    let user_paths: HashSet<&PathBuf> = user.devices.iter().map(|d| d.path()).collect();

    let mut merged = ResolvedDevices::default();
    for d in default_devices {
        let path = d.device.path();
        if path.as_os_str() == CONTROLLING_TERMINAL && !has_tty {
            debug!(sl(), "skip controlling terminal, no tty allocated");
            continue;
        }
        if user_paths.contains(path) {
            debug!(sl(), "default device overridden"; "path" => path.display().to_string());
            continue;
        }
        merged.push(d.device.clone(), d.to_cgroup_rule());
    }

    merged.extend(user);
    merged
}
