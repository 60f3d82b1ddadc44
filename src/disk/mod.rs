//! Cloud disk backend.
//!
//! Handles block-storage volumes that the cloud control plane attaches
//! to the node out of band. The backend's real work is in two places:
//! resolving a volume identifier to its local device path (`resolver`)
//! and driving mount paths back to absent (`teardown`). Everything else
//! is the thin flexvolume verb surface.

pub mod resolver;
pub mod teardown;

use serde::Deserialize;
use tracing::{info, warn};

use crate::driver::{DriverResponse, VolumeDriver};
use crate::error::{DriverError, Result};
use crate::system::NodeSystem;

pub use resolver::resolve_device;
pub use teardown::{LEGACY_MOUNTS_ROOT, teardown, teardown_with_legacy};

/// Registry key for this backend.
pub const DRIVER_NAME: &str = "disk";

/// Path fragment the kubelet uses for this driver's pod volume mounts.
/// An existing mount table entry containing `<fragment>/<volumeName>`
/// means the volume is already attached and mounted.
const FLEX_MOUNT_FRAGMENT: &str = "ecloud~disk";

/// Options bag the kubelet passes for disk volumes.
///
/// Unknown keys (readwrite mode, secrets, ...) are ignored; missing
/// keys default to empty, matching the loosely-populated bags different
/// kubelet versions send.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiskOptions {
    #[serde(rename = "kubernetes.io/pvOrVolumeName", default)]
    pub volume_name: String,
    #[serde(rename = "kubernetes.io/fsType", default)]
    pub fs_type: String,
    #[serde(rename = "volumeId", default)]
    pub volume_id: String,
}

impl DiskOptions {
    /// Single deserialization step at the dispatch boundary.
    fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Flexvolume driver for cloud disk volumes.
pub struct DiskDriver<S: NodeSystem> {
    sys: S,
}

impl<S: NodeSystem> DiskDriver<S> {
    pub fn new(sys: S) -> Self {
        Self { sys }
    }
}

impl<S: NodeSystem> VolumeDriver for DiskDriver<S> {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn init(&self) -> Result<DriverResponse> {
        Ok(DriverResponse::success())
    }

    /// The control plane has already attached the disk; report the
    /// local device path for it.
    fn attach(&self, raw_options: &str, node_name: &str) -> Result<DriverResponse> {
        let opt = DiskOptions::parse(raw_options)?;
        info!(
            volume_id = %opt.volume_id,
            volume_name = %opt.volume_name,
            node_name = %node_name,
            "Attach request"
        );

        if opt.volume_id.is_empty() {
            return Err(DriverError::PreconditionFailed(
                "volumeId is required in the options bag".into(),
            ));
        }

        // Fast path: the volume is already mounted somewhere under this
        // driver's kubelet directory, so its device is in the mount table.
        if !opt.volume_name.is_empty() {
            let fragment = format!("{}/{}", FLEX_MOUNT_FRAGMENT, opt.volume_name);
            match self.sys.mounted_device_for(&fragment) {
                Ok(Some(device)) => {
                    info!(
                        volume_name = %opt.volume_name,
                        device = %device,
                        "Disk already attached and mounted"
                    );
                    return Ok(DriverResponse::with_device(device));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Mount table probe failed, falling back to serial resolution");
                }
            }
        }

        let device = resolve_device(&self.sys, &opt.volume_id)?
            .ok_or_else(|| DriverError::DeviceNotFound(opt.volume_id.clone()))?;
        Ok(DriverResponse::with_device(device))
    }

    /// Detach is performed by the cloud control plane, not this layer.
    fn detach(&self, volume_name: &str, node_name: &str) -> Result<DriverResponse> {
        info!(volume_name = %volume_name, node_name = %node_name, "Detach request (no-op)");
        Ok(DriverResponse::success())
    }

    fn mount(&self, _mount_path: &str, _raw_options: &str) -> Result<DriverResponse> {
        Ok(DriverResponse::not_supported(
            "mount is not supported by the disk driver",
        ))
    }

    fn unmount(&self, mount_path: &str) -> Result<DriverResponse> {
        if mount_path.is_empty() {
            return Err(DriverError::PreconditionFailed(
                "mount path is required".into(),
            ));
        }

        info!(mount_path = %mount_path, "Unmount request");
        teardown_with_legacy(&self.sys, mount_path)?;
        info!(mount_path = %mount_path, "Unmount successful");
        Ok(DriverResponse::success())
    }

    fn get_volume_name(&self, raw_options: &str) -> Result<DriverResponse> {
        let opt = DiskOptions::parse(raw_options)?;
        Ok(DriverResponse::with_volume_name(opt.volume_name))
    }

    fn wait_for_attach(&self, device_path: &str, raw_options: &str) -> Result<DriverResponse> {
        let opt = DiskOptions::parse(raw_options)?;

        if device_path.is_empty() {
            return Err(DriverError::PreconditionFailed(format!(
                "device path is empty, cannot be used for volume '{}'",
                opt.volume_name
            )));
        }
        if !self.sys.path_exists(device_path)? {
            return Err(DriverError::PreconditionFailed(format!(
                "device path '{}' does not exist, cannot be used for volume '{}'",
                device_path, opt.volume_name
            )));
        }

        info!(
            device = %device_path,
            volume_name = %opt.volume_name,
            "Device is attached"
        );
        Ok(DriverResponse::with_device(device_path))
    }

    fn mount_device(
        &self,
        _mount_path: &str,
        _device_path: &str,
        _raw_options: &str,
    ) -> Result<DriverResponse> {
        Ok(DriverResponse::not_supported(
            "mountdevice is not supported by the disk driver",
        ))
    }
}
