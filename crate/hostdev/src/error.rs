use std::{io, path::PathBuf};

use oci_spec::OciSpecError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeviceError>;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to stat {}: {source}", .path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Only ever seen as the root cause of a failed mapping. Inspection
    /// itself reports this case through `Inspection::NotADevice`.
    #[error("{} is not a device node", .0.display())]
    NotADevice(PathBuf),

    #[error("cannot determine the device number for device {}", .0.display())]
    DeviceNumberUnavailable(PathBuf),

    #[error(
        "gathering device information while adding custom device {} failed: {source}",
        .host_path.display()
    )]
    MappingFailed {
        host_path: PathBuf,
        #[source]
        source: Box<DeviceError>,
    },

    #[error("invalid device mapping {0}")]
    InvalidMapping(String),

    #[error("failed to build device entry: {0}")]
    Spec(#[from] OciSpecError),
}
