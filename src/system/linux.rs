//! Linux implementation of the node system collaborators.
//!
//! Uses Linux-specific tools:
//! - lsblk for block device enumeration
//! - /lib/udev/scsi_id for SCSI hardware serial queries
//! - /proc/mounts (with a `mount` fallback) for mount table inspection
//! - umount -f for forced unmounts

use std::fs;
use std::io::ErrorKind;
use std::process::Command;

use tracing::{debug, error, warn};

use super::NodeSystem;
use crate::error::{DriverError, Result};

const SCSI_ID: &str = "/lib/udev/scsi_id";
const SCSI_SERIAL_KEY: &str = "ID_SCSI_SERIAL";

/// Production `NodeSystem` backed by the node's own tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxSystem;

impl NodeSystem for LinuxSystem {
    fn list_disk_devices(&self) -> Result<Vec<String>> {
        let output = Command::new("lsblk")
            .args(["-l", "-n", "-o", "NAME,TYPE"])
            .output()
            .map_err(|e| {
                error!(error = %e, "Failed to execute lsblk");
                DriverError::EnumerationFailed(format!("failed to execute lsblk: {}", e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(stderr = %stderr, "lsblk failed");
            return Err(DriverError::EnumerationFailed(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_disk_names(&stdout))
    }

    fn query_serial(&self, device_path: &str) -> Result<String> {
        let output = Command::new(SCSI_ID)
            .args(["-g", "-x", device_path])
            .output()
            .map_err(|e| {
                error!(error = %e, device = %device_path, "Failed to execute scsi_id");
                DriverError::SerialQueryFailed(
                    device_path.to_string(),
                    format!("failed to execute scsi_id: {}", e),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(stderr = %stderr, device = %device_path, "scsi_id failed");
            return Err(DriverError::SerialQueryFailed(
                device_path.to_string(),
                stderr.trim().to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_scsi_serial(&stdout))
    }

    fn path_exists(&self, path: &str) -> Result<bool> {
        match fs::symlink_metadata(path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn is_mount_point(&self, path: &str) -> Result<bool> {
        // /proc/mounts is authoritative; fall back to the mount command
        // if it cannot be read.
        if let Ok(mounts) = fs::read_to_string("/proc/mounts") {
            return Ok(is_mount_point_in(&mounts, path));
        }

        warn!("Could not read /proc/mounts, falling back to mount command");
        let output = Command::new("mount").output().map_err(|e| {
            error!(error = %e, "Failed to execute mount");
            DriverError::Io(e)
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .any(|line| line.contains(&format!(" on {} ", path))))
    }

    fn force_unmount(&self, path: &str) -> Result<()> {
        let output = Command::new("umount")
            .args(["-f", path])
            .output()
            .map_err(|e| {
                error!(error = %e, path = %path, "Failed to execute umount");
                DriverError::UnmountFailed(
                    path.to_string(),
                    format!("failed to execute umount: {}", e),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(stderr = %stderr, path = %path, "umount failed");
            return Err(DriverError::UnmountFailed(
                path.to_string(),
                stderr.trim().to_string(),
            ));
        }

        Ok(())
    }

    fn remove_dir(&self, path: &str) -> Result<()> {
        fs::remove_dir(path).map_err(|e| {
            warn!(error = %e, path = %path, "Could not remove mount directory");
            DriverError::RemoveFailed(path.to_string(), e)
        })
    }

    fn mounted_device_for(&self, fragment: &str) -> Result<Option<String>> {
        let table = match fs::read_to_string("/proc/mounts") {
            Ok(table) => table,
            Err(e) => {
                debug!(error = %e, "Could not read /proc/mounts, falling back to mount command");
                let output = Command::new("mount").output()?;
                String::from_utf8_lossy(&output.stdout).to_string()
            }
        };
        Ok(mounted_device_in(&table, fragment))
    }
}

/// Filter an `lsblk -l -n -o NAME,TYPE` listing to whole-disk names.
fn parse_disk_names(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            match fields.next() {
                Some("disk") => Some(name.to_string()),
                _ => None,
            }
        })
        .collect()
}

/// Extract the `ID_SCSI_SERIAL` value from `scsi_id -g -x` output.
fn parse_scsi_serial(output: &str) -> String {
    output
        .lines()
        .find_map(|line| line.strip_prefix(SCSI_SERIAL_KEY)?.strip_prefix('='))
        .unwrap_or("")
        .trim_end_matches('\n')
        .to_string()
}

/// Whether any mount table entry has `path` as its mount point.
fn is_mount_point_in(table: &str, path: &str) -> bool {
    table
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(path))
}

/// Source device of the first mount table entry whose mount point
/// contains `fragment`.
fn mounted_device_in(table: &str, fragment: &str) -> Option<String> {
    table.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let device = fields.next()?;
        // /proc/mounts has the mount point in field 2; the mount
        // command prints "device on /path type ...".
        let mount_point = match fields.next()? {
            "on" => fields.next()?,
            field => field,
        };
        if mount_point.contains(fragment) {
            Some(device.to_string())
        } else {
            None
        }
    })
}
