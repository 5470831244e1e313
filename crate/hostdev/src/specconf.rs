use std::{fs, path::Path};

use anyhow::{Context, Result, anyhow};
use oci_spec::runtime::Spec;
use serde::{Deserialize, Serialize};

use crate::{
    mapping::DeviceMapping,
    merge::{DEFAULT_DEVICES, merge_devices},
    resolve::{ResolvedDevices, devices_from_mapping},
    sl,
};

/// Device options of a single container.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct DeviceOpts {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceMapping>,
    /// Whether the container was allocated a controlling terminal.
    #[serde(default)]
    pub terminal: bool,
}

impl DeviceOpts {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read device config {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("failed to parse device config {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let opts: DeviceOpts = serde_json::from_str(content)?;
        for m in opts.devices.iter() {
            m.validate()?;
        }
        Ok(opts)
    }

    /// Resolves every mapping on the host. The first mapping that yields no
    /// device aborts the whole request.
    pub fn resolve(&self) -> Result<ResolvedDevices> {
        let mut resolved = ResolvedDevices::default();
        for m in self.devices.iter() {
            let devices =
                devices_from_mapping(m).with_context(|| format!("failed to add device {}", m))?;
            resolved.extend(devices);
        }
        Ok(resolved)
    }

    /// Resolves the user mappings and merges them with `DEFAULT_DEVICES`.
    pub fn gather(&self, has_tty: bool) -> Result<ResolvedDevices> {
        let user = self.resolve()?;
        Ok(merge_devices(&DEFAULT_DEVICES, user, has_tty))
    }

    /// Writes the merged devices into `spec.linux.devices` and appends their
    /// rules to `spec.linux.resources.devices`.
    pub fn apply(&self, spec: &mut Spec) -> Result<()> {
        let has_tty = self.terminal
            || spec
                .process()
                .as_ref()
                .and_then(|p| p.terminal())
                .unwrap_or(false);
        let merged = self.gather(has_tty)?;

        info!(sl(), "updating spec devices";
            "devices" => merged.devices.len(),
            "cgroup-rules" => merged.cgroup_rules.len(),
            "terminal" => has_tty
        );

        let linux = spec
            .linux_mut()
            .as_mut()
            .ok_or_else(|| anyhow!("Spec didn't contain linux field"))?;

        linux.set_devices(Some(merged.devices));

        let mut resources = linux.resources().clone().unwrap_or_default();
        let mut rules = resources.devices().clone().unwrap_or_default();
        rules.extend(merged.cgroup_rules);
        resources.set_devices(Some(rules));
        linux.set_resources(Some(resources));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use oci_spec::runtime::{LinuxBuilder, LinuxDeviceType, ProcessBuilder, SpecBuilder};
    use tempfile::tempdir;

    use super::*;

    fn spec_with_terminal(terminal: bool) -> Spec {
        SpecBuilder::default()
            .process(ProcessBuilder::default().terminal(terminal).build().unwrap())
            .linux(LinuxBuilder::default().build().unwrap())
            .build()
            .unwrap()
    }

    fn device_paths(spec: &Spec) -> Vec<PathBuf> {
        spec.linux()
            .as_ref()
            .unwrap()
            .devices()
            .as_ref()
            .unwrap()
            .iter()
            .map(|d| d.path().clone())
            .collect()
    }

    #[test]
    fn test_from_json() {
        let opts = DeviceOpts::from_json(
            r#"{
                "devices": [
                    {"PathOnHost": "/dev/null", "PathInContainer": "/dev/mynull", "CgroupPermissions": "rw"}
                ],
                "terminal": true
            }"#,
        )
        .unwrap();

        assert!(opts.terminal);
        assert_eq!(
            opts.devices,
            vec![DeviceMapping::new("/dev/null", "/dev/mynull", "rw")]
        );
    }

    #[test]
    fn test_from_json_invalid_permissions() {
        let ret = DeviceOpts::from_json(
            r#"{"devices": [{"PathOnHost": "/dev/null", "PathInContainer": "/dev/null", "CgroupPermissions": "rwx"}]}"#,
        );

        assert!(ret.is_err());
    }

    #[test]
    fn test_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("devices.json");
        fs::write(&path, r#"{"devices": []}"#).unwrap();

        let opts = DeviceOpts::load(&path).unwrap();
        assert_eq!(opts, DeviceOpts::default());

        assert!(DeviceOpts::load(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_gather() {
        let opts = DeviceOpts {
            devices: vec![DeviceMapping::new("/dev/zero", "/dev/null", "r")],
            terminal: false,
        };

        let merged = opts.gather(false).unwrap();

        let paths: Vec<String> = merged
            .devices
            .iter()
            .map(|d| d.path().display().to_string())
            .collect();
        assert_eq!(
            paths,
            vec![
                "/dev/zero",
                "/dev/full",
                "/dev/urandom",
                "/dev/random",
                "/dev/null"
            ]
        );

        let last = merged.devices.last().unwrap();
        assert_eq!((last.major(), last.minor()), (1, 5));
        let rule = merged.cgroup_rules.last().unwrap();
        assert_eq!(rule.typ(), Some(LinuxDeviceType::C));
        assert_eq!(rule.access().as_deref(), Some("r"));
    }

    #[test]
    fn test_gather_failed_mapping() {
        let dir = tempdir().unwrap();
        let opts = DeviceOpts {
            devices: vec![DeviceMapping::new(dir.path(), "/dev/empty", "rwm")],
            terminal: true,
        };

        let err = opts.gather(true).unwrap_err();
        assert!(format!("{:#}", err).contains("gathering device information"));
    }

    #[test]
    fn test_apply_uses_process_terminal() {
        let opts = DeviceOpts::default();

        let mut spec = spec_with_terminal(true);
        opts.apply(&mut spec).unwrap();
        assert!(device_paths(&spec).contains(&PathBuf::from("/dev/tty")));

        let mut spec = spec_with_terminal(false);
        opts.apply(&mut spec).unwrap();
        assert!(!device_paths(&spec).contains(&PathBuf::from("/dev/tty")));
        assert_eq!(device_paths(&spec).len(), DEFAULT_DEVICES.len() - 1);
    }

    #[test]
    fn test_apply_appends_cgroup_rules() {
        let opts = DeviceOpts {
            devices: vec![DeviceMapping::new("/dev/null", "/dev/mynull", "rwm")],
            terminal: true,
        };
        let mut spec = spec_with_terminal(false);
        let before = spec
            .linux()
            .as_ref()
            .and_then(|l| l.resources().as_ref())
            .and_then(|r| r.devices().as_ref())
            .map_or(0, |d| d.len());

        opts.apply(&mut spec).unwrap();

        let rules = spec
            .linux()
            .as_ref()
            .unwrap()
            .resources()
            .as_ref()
            .unwrap()
            .devices()
            .clone()
            .unwrap();
        assert_eq!(rules.len(), before + DEFAULT_DEVICES.len() + 1);
        assert_eq!(device_paths(&spec).last(), Some(&PathBuf::from("/dev/mynull")));
    }

    #[test]
    fn test_apply_without_linux() {
        let mut spec = Spec::default();
        spec.set_linux(None);

        assert!(DeviceOpts::default().apply(&mut spec).is_err());
    }
}
