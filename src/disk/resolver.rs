//! Volume-to-device resolution by SCSI hardware serial.
//!
//! The cloud control plane attaches a disk to the node out of band; the
//! only join key between the cloud volume identifier and the local
//! device name is the SCSI serial each block device reports. Resolution
//! walks the node's whole-disk devices in enumeration order and returns
//! the first one whose serial equals the volume identifier.

use tracing::{info, warn};

use crate::error::Result;
use crate::system::NodeSystem;

/// Resolve a volume identifier to its local device path.
///
/// Returns `Ok(None)` when no device serial matches: the volume may
/// simply not be visible yet, and the caller decides whether that is
/// retryable. Enumeration failure and any per-device serial query
/// failure are hard errors that abort the whole resolution; a broken
/// query path is assumed systemic, so partial results are not
/// trustworthy.
///
/// Read-only: no node state is mutated.
pub fn resolve_device<S: NodeSystem + ?Sized>(sys: &S, volume_id: &str) -> Result<Option<String>> {
    let devices = sys.list_disk_devices()?;

    for name in &devices {
        let device_path = format!("/dev/{}", name);
        let serial = sys.query_serial(&device_path)?;
        if serial.trim_end_matches('\n') == volume_id {
            info!(
                volume_id = %volume_id,
                device = %device_path,
                "Resolved volume to device by SCSI serial"
            );
            return Ok(Some(device_path));
        }
    }

    warn!(volume_id = %volume_id, "No device serial matched volume");
    Ok(None)
}
