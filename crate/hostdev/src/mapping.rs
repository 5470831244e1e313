use std::{
    fmt::{self, Display},
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

pub const DEFAULT_CGROUP_PERMISSIONS: &str = "rwm";

/// A user request to expose a host device (or a directory of devices) inside
/// the container.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceMapping {
    pub path_on_host: PathBuf,
    pub path_in_container: PathBuf,
    #[serde(default = "default_cgroup_permissions")]
    pub cgroup_permissions: String,
}

fn default_cgroup_permissions() -> String {
    DEFAULT_CGROUP_PERMISSIONS.to_string()
}

impl DeviceMapping {
    pub fn new(
        path_on_host: impl Into<PathBuf>,
        path_in_container: impl Into<PathBuf>,
        cgroup_permissions: impl Into<String>,
    ) -> Self {
        DeviceMapping {
            path_on_host: path_on_host.into(),
            path_in_container: path_in_container.into(),
            cgroup_permissions: cgroup_permissions.into(),
        }
    }

    pub fn validate(&self) -> Result<(), DeviceError> {
        if self.path_on_host.as_os_str().is_empty() {
            return Err(DeviceError::InvalidMapping(format!(
                "{}: empty host path",
                self
            )));
        }

        if !self.path_in_container.is_absolute() {
            return Err(DeviceError::InvalidMapping(format!(
                "{}: container path {} is not absolute",
                self,
                self.path_in_container.display()
            )));
        }

        if !valid_device_mode(&self.cgroup_permissions) {
            return Err(DeviceError::InvalidMapping(format!(
                "{}: bad cgroup permissions {:?}",
                self, self.cgroup_permissions
            )));
        }

        Ok(())
    }
}

impl Display for DeviceMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.path_on_host.display(),
            self.path_in_container.display(),
            self.cgroup_permissions
        )
    }
}

/// Parses `HOST[:CONTAINER][:PERMISSIONS]`.
impl FromStr for DeviceMapping {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split(':').collect();

        let (host, container, permissions) = match fields.as_slice() {
            [host] => (*host, *host, DEFAULT_CGROUP_PERMISSIONS),
            [host, mode] if valid_device_mode(mode) => (*host, *host, *mode),
            [host, container] => (*host, *container, DEFAULT_CGROUP_PERMISSIONS),
            [host, container, mode] => (*host, *container, *mode),
            _ => return Err(DeviceError::InvalidMapping(s.to_string())),
        };

        let container = if container.is_empty() { host } else { container };
        let mapping = DeviceMapping::new(
            Path::new(host),
            Path::new(container),
            permissions.to_string(),
        );
        mapping.validate()?;

        Ok(mapping)
    }
}

/// A mode is a non-empty set of distinct characters out of `r`, `w`, `m`.
pub fn valid_device_mode(mode: &str) -> bool {
    if mode.is_empty() || mode.len() > DEFAULT_CGROUP_PERMISSIONS.len() {
        return false;
    }

    let mut seen = [false; 3];
    for c in mode.chars() {
        let idx = match c {
            'r' => 0,
            'w' => 1,
            'm' => 2,
            _ => return false,
        };
        if seen[idx] {
            return false;
        }
        seen[idx] = true;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_device_mode() {
        let tests = &[
            ("r", true),
            ("rw", true),
            ("rwm", true),
            ("mwr", true),
            ("", false),
            ("rr", false),
            ("rwmr", false),
            ("x", false),
            ("rwx", false),
        ];

        for (mode, valid) in tests.iter() {
            assert_eq!(valid_device_mode(mode), *valid, "mode {:?}", mode);
        }
    }

    #[test]
    fn test_parse_device_mapping() {
        let tests = &[
            ("/dev/sda", "/dev/sda", "/dev/sda", "rwm"),
            ("/dev/sda:/dev/xvda", "/dev/sda", "/dev/xvda", "rwm"),
            ("/dev/sda:r", "/dev/sda", "/dev/sda", "r"),
            ("/dev/sda:/dev/xvda:rw", "/dev/sda", "/dev/xvda", "rw"),
            ("/dev/snd::rm", "/dev/snd", "/dev/snd", "rm"),
        ];

        for (input, host, container, mode) in tests.iter() {
            let m: DeviceMapping = input.parse().unwrap();
            assert_eq!(m, DeviceMapping::new(*host, *container, *mode), "{}", input);
        }
    }

    #[test]
    fn test_parse_device_mapping_invalid() {
        for input in [
            "",
            "/dev/sda:xvda",
            "/dev/sda:/dev/xvda:rwx",
            "/dev/sda:/dev/xvda:rw:extra",
        ] {
            let ret = input.parse::<DeviceMapping>();
            assert!(
                matches!(ret, Err(DeviceError::InvalidMapping(_))),
                "{:?}",
                input
            );
        }
    }

    #[test]
    fn test_device_mapping_json() {
        let m: DeviceMapping = serde_json::from_str(
            r#"{"PathOnHost": "/dev/fuse", "PathInContainer": "/dev/fuse"}"#,
        )
        .unwrap();

        assert_eq!(m, DeviceMapping::new("/dev/fuse", "/dev/fuse", "rwm"));
        assert_eq!(m.to_string(), "/dev/fuse:/dev/fuse:rwm");
    }
}
