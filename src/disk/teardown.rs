//! Idempotent mount point teardown.
//!
//! Drives a mount path to "absent": nothing to do if the path does not
//! exist, a plain directory removal if it exists without an active
//! mount (a known leftover from prior partial operations), and a forced
//! unmount followed by removal if it is mounted. Success always means
//! the directory itself is gone, not merely unmounted.

use std::path::Path;

use tracing::{debug, warn};

use crate::error::{DriverError, Result};
use crate::system::NodeSystem;

/// Root under which the kubelet keeps per-volume device mount
/// directories for this driver. These can be left behind after a pod
/// teardown and must be cleaned alongside the pod mount path.
pub const LEGACY_MOUNTS_ROOT: &str =
    "/var/lib/kubelet/plugins/kubernetes.io/flexvolume/ecloud/disk/mounts";

/// Tear down a mount path and its legacy twin under
/// [`LEGACY_MOUNTS_ROOT`].
///
/// The legacy step runs unconditionally; its absence is the common case
/// and short-circuits at the existence check. Success means both paths
/// are absent; any hard error on either path fails the whole operation.
pub fn teardown_with_legacy<S: NodeSystem + ?Sized>(sys: &S, mount_path: &str) -> Result<()> {
    teardown(sys, mount_path)?;
    teardown(sys, &legacy_mount_path(mount_path))
}

/// Drive a single mount path to the absent state.
pub fn teardown<S: NodeSystem + ?Sized>(sys: &S, mount_path: &str) -> Result<()> {
    if !sys.path_exists(mount_path)? {
        debug!(path = %mount_path, "Mount path does not exist, nothing to do");
        return Ok(());
    }

    if !sys.is_mount_point(mount_path)? {
        warn!(path = %mount_path, "Path is not a mount point, removing stale directory");
        return sys.remove_dir(mount_path);
    }

    sys.force_unmount(mount_path)?;

    // A path still mounted after a successful umount means either the
    // classification is wrong or the unmount silently no-op'd.
    if sys.is_mount_point(mount_path)? {
        return Err(DriverError::ResidualMount(mount_path.to_string()));
    }

    sys.remove_dir(mount_path)
}

fn legacy_mount_path(mount_path: &str) -> String {
    let base = Path::new(mount_path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(mount_path);
    format!("{}/{}", LEGACY_MOUNTS_ROOT, base)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeSet;
    use std::io;

    use super::*;

    /// Fake node tracking which paths exist and which of those are
    /// mounted, with switches for the failure modes.
    #[derive(Default)]
    struct FakeMounts {
        dirs: RefCell<BTreeSet<String>>,
        mounts: RefCell<BTreeSet<String>>,
        unmount_calls: RefCell<Vec<String>>,
        fail_unmount: bool,
        // Unmount reports success but the mount table still lists the path.
        sticky_mount: bool,
        fail_remove: bool,
    }

    impl FakeMounts {
        fn with_dir(self, path: &str) -> Self {
            self.dirs.borrow_mut().insert(path.to_string());
            self
        }

        fn with_mount(self, path: &str) -> Self {
            self.dirs.borrow_mut().insert(path.to_string());
            self.mounts.borrow_mut().insert(path.to_string());
            self
        }

        fn is_absent(&self, path: &str) -> bool {
            !self.dirs.borrow().contains(path) && !self.mounts.borrow().contains(path)
        }
    }

    impl NodeSystem for FakeMounts {
        fn list_disk_devices(&self) -> Result<Vec<String>> {
            unreachable!("teardown does not enumerate devices")
        }

        fn query_serial(&self, _device_path: &str) -> Result<String> {
            unreachable!("teardown does not query serials")
        }

        fn path_exists(&self, path: &str) -> Result<bool> {
            Ok(self.dirs.borrow().contains(path))
        }

        fn is_mount_point(&self, path: &str) -> Result<bool> {
            Ok(self.mounts.borrow().contains(path))
        }

        fn force_unmount(&self, path: &str) -> Result<()> {
            self.unmount_calls.borrow_mut().push(path.to_string());
            if self.fail_unmount {
                return Err(DriverError::UnmountFailed(
                    path.to_string(),
                    "target is busy".into(),
                ));
            }
            if !self.sticky_mount {
                self.mounts.borrow_mut().remove(path);
            }
            Ok(())
        }

        fn remove_dir(&self, path: &str) -> Result<()> {
            if self.fail_remove {
                return Err(DriverError::RemoveFailed(
                    path.to_string(),
                    io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
                ));
            }
            self.dirs.borrow_mut().remove(path);
            Ok(())
        }

        fn mounted_device_for(&self, _fragment: &str) -> Result<Option<String>> {
            unreachable!("teardown does not probe the mount table for devices")
        }
    }

    #[test]
    fn test_absent_path_is_a_noop() {
        let sys = FakeMounts::default();
        teardown(&sys, "/mnt/disk1").unwrap();
        assert!(sys.unmount_calls.borrow().is_empty());
    }

    #[test]
    fn test_stale_directory_removed_without_unmount() {
        let sys = FakeMounts::default().with_dir("/mnt/disk1");
        teardown(&sys, "/mnt/disk1").unwrap();
        assert!(sys.is_absent("/mnt/disk1"));
        assert!(sys.unmount_calls.borrow().is_empty());
    }

    #[test]
    fn test_mounted_path_unmounted_and_removed() {
        let sys = FakeMounts::default().with_mount("/mnt/disk1");
        teardown(&sys, "/mnt/disk1").unwrap();
        assert!(sys.is_absent("/mnt/disk1"));
        assert_eq!(*sys.unmount_calls.borrow(), vec!["/mnt/disk1"]);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let sys = FakeMounts::default().with_mount("/mnt/disk1");
        teardown(&sys, "/mnt/disk1").unwrap();
        assert!(sys.is_absent("/mnt/disk1"));
        // Second pass finds nothing and still succeeds.
        teardown(&sys, "/mnt/disk1").unwrap();
        assert_eq!(sys.unmount_calls.borrow().len(), 1);
    }

    #[test]
    fn test_unmount_failure_propagates() {
        let sys = FakeMounts {
            fail_unmount: true,
            ..FakeMounts::default()
        }
        .with_mount("/mnt/disk1");

        let err = teardown(&sys, "/mnt/disk1").unwrap_err();
        assert!(matches!(err, DriverError::UnmountFailed(_, _)));
        assert!(!sys.is_absent("/mnt/disk1"));
    }

    #[test]
    fn test_residual_mount_detected() {
        let sys = FakeMounts {
            sticky_mount: true,
            ..FakeMounts::default()
        }
        .with_mount("/mnt/disk1");

        let err = teardown(&sys, "/mnt/disk1").unwrap_err();
        assert!(matches!(err, DriverError::ResidualMount(_)));
    }

    #[test]
    fn test_remove_failure_propagates() {
        let sys = FakeMounts {
            fail_remove: true,
            ..FakeMounts::default()
        }
        .with_dir("/mnt/disk1");

        let err = teardown(&sys, "/mnt/disk1").unwrap_err();
        assert!(matches!(err, DriverError::RemoveFailed(_, _)));
    }

    #[test]
    fn test_legacy_twin_cleaned_up() {
        let legacy = format!("{}/disk1", LEGACY_MOUNTS_ROOT);
        let sys = FakeMounts::default()
            .with_mount("/mnt/disk1")
            .with_dir(&legacy);

        teardown_with_legacy(&sys, "/mnt/disk1").unwrap();
        assert!(sys.is_absent("/mnt/disk1"));
        assert!(sys.is_absent(&legacy));
    }

    #[test]
    fn test_absent_legacy_twin_still_succeeds() {
        let sys = FakeMounts::default().with_mount("/mnt/disk1");
        teardown_with_legacy(&sys, "/mnt/disk1").unwrap();
        assert!(sys.is_absent("/mnt/disk1"));
        assert_eq!(sys.unmount_calls.borrow().len(), 1);
    }

    #[test]
    fn test_legacy_failure_fails_the_whole_operation() {
        let legacy = format!("{}/disk1", LEGACY_MOUNTS_ROOT);
        let sys = FakeMounts {
            sticky_mount: true,
            ..FakeMounts::default()
        }
        .with_dir("/mnt/disk1")
        .with_mount(&legacy);

        let err = teardown_with_legacy(&sys, "/mnt/disk1").unwrap_err();
        assert!(matches!(err, DriverError::ResidualMount(_)));
        // The primary path was still healed before the legacy step failed.
        assert!(sys.is_absent("/mnt/disk1"));
    }

    #[test]
    fn test_legacy_path_derivation() {
        assert_eq!(
            legacy_mount_path("/var/lib/kubelet/pods/uid/volumes/ecloud~disk/disk1"),
            format!("{}/disk1", LEGACY_MOUNTS_ROOT)
        );
        assert_eq!(
            legacy_mount_path("/mnt/d-2zefwuq9sv0gkxqrll5t"),
            format!("{}/d-2zefwuq9sv0gkxqrll5t", LEGACY_MOUNTS_ROOT)
        );
    }
}
