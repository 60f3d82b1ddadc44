//! Node system collaborators.
//!
//! The resolver and teardown algorithms never touch the OS directly;
//! they go through the narrow `NodeSystem` trait so they can be tested
//! against fake node state. `LinuxSystem` is the production
//! implementation shelling out to lsblk, scsi_id and umount.

mod linux;

pub use linux::LinuxSystem;

use crate::error::Result;

/// Narrow view of the node used by the disk backend.
///
/// Every method is a single blocking external call with no retries;
/// failure reporting is the caller's concern.
pub trait NodeSystem {
    /// Short names of disk-class block devices, in enumeration order.
    /// Partitions and loop devices are excluded.
    fn list_disk_devices(&self) -> Result<Vec<String>>;

    /// SCSI hardware serial of the device node, empty when the device
    /// reports none.
    fn query_serial(&self, device_path: &str) -> Result<String>;

    /// Whether the path exists at all. Stat errors other than NotFound
    /// propagate.
    fn path_exists(&self, path: &str) -> Result<bool>;

    /// Whether the path is currently a mount point.
    fn is_mount_point(&self, path: &str) -> Result<bool>;

    /// Forced unmount of the path (`umount -f`).
    fn force_unmount(&self, path: &str) -> Result<()>;

    /// Remove the (empty) directory at the path.
    fn remove_dir(&self, path: &str) -> Result<()>;

    /// Source device of the first mount table entry whose mount point
    /// contains `fragment`, if any.
    fn mounted_device_for(&self, fragment: &str) -> Result<Option<String>>;
}
