//! Flexvolume verb dispatch.
//!
//! The kubelet drives flexvolume drivers through a fixed verb set, one
//! process invocation per verb. `VolumeDriver` is that verb surface;
//! each storage backend implements it once and registers itself in a
//! `DriverRegistry` keyed by backend name.
//!
//! Verbs receive the kubelet options bag as a raw JSON string and
//! deserialize it into their own options struct in a single step. Code
//! below that boundary only ever sees typed values.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::disk::DiskDriver;
use crate::error::Result;
use crate::system::LinuxSystem;

/// Status field of the flexvolume response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverStatus {
    #[serde(rename = "Success")]
    Success,
    #[serde(rename = "Failure")]
    Failure,
    #[serde(rename = "Not supported")]
    NotSupported,
}

/// Response envelope printed to stdout for the kubelet.
///
/// Optional fields are omitted from the JSON when unset, matching the
/// flexvolume call contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverResponse {
    pub status: DriverStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(rename = "volumeName", default, skip_serializing_if = "Option::is_none")]
    pub volume_name: Option<String>,
}

impl DriverResponse {
    /// Plain success with no payload.
    pub fn success() -> Self {
        Self {
            status: DriverStatus::Success,
            message: None,
            device: None,
            volume_name: None,
        }
    }

    /// Success carrying a resolved device path.
    pub fn with_device(device: impl Into<String>) -> Self {
        Self {
            device: Some(device.into()),
            ..Self::success()
        }
    }

    /// Success carrying a volume name.
    pub fn with_volume_name(volume_name: impl Into<String>) -> Self {
        Self {
            volume_name: Some(volume_name.into()),
            ..Self::success()
        }
    }

    /// Verb is not implemented by this backend.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self {
            status: DriverStatus::NotSupported,
            message: Some(message.into()),
            device: None,
            volume_name: None,
        }
    }

    /// Failure with an error message for the kubelet log.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: DriverStatus::Failure,
            message: Some(message.into()),
            device: None,
            volume_name: None,
        }
    }
}

/// Fixed verb surface expected by the kubelet flexvolume plugin host.
///
/// Implementations return `Ok` with a response envelope for outcomes the
/// kubelet should interpret (including "Not supported"), and `Err` for
/// fatal conditions; the process boundary in `main` turns errors into a
/// Failure envelope and a non-zero exit.
pub trait VolumeDriver {
    /// Backend name used as the registry key.
    fn name(&self) -> &'static str;

    /// Probe issued by the kubelet at plugin discovery.
    fn init(&self) -> Result<DriverResponse>;

    /// Resolve the device path for a volume already attached to this node.
    fn attach(&self, raw_options: &str, node_name: &str) -> Result<DriverResponse>;

    /// Release a volume from this node.
    fn detach(&self, volume_name: &str, node_name: &str) -> Result<DriverResponse>;

    /// Mount a volume at the given path.
    fn mount(&self, mount_path: &str, raw_options: &str) -> Result<DriverResponse>;

    /// Tear down the given mount path.
    fn unmount(&self, mount_path: &str) -> Result<DriverResponse>;

    /// Report the volume name declared in the options bag.
    fn get_volume_name(&self, raw_options: &str) -> Result<DriverResponse>;

    /// Validate the device path reported by a prior attach.
    fn wait_for_attach(&self, device_path: &str, raw_options: &str) -> Result<DriverResponse>;

    /// Mount the attached device at a global mount path.
    fn mount_device(
        &self,
        mount_path: &str,
        device_path: &str,
        raw_options: &str,
    ) -> Result<DriverResponse>;
}

/// Registry of storage backends keyed by backend name.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: HashMap<&'static str, Box<dyn VolumeDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, driver: Box<dyn VolumeDriver>) {
        self.drivers.insert(driver.name(), driver);
    }

    pub fn get(&self, name: &str) -> Option<&dyn VolumeDriver> {
        self.drivers.get(name).map(|d| d.as_ref())
    }
}

/// Registry with the production backends wired to the real node system.
pub fn default_registry() -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    registry.register(Box::new(DiskDriver::new(LinuxSystem)));
    registry
}
