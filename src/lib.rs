//! Flexvolume driver library.
//!
//! Kubernetes flexvolume driver that resolves cloud block-storage
//! volumes to their local device paths and manages mount teardown on
//! the node.
//!
//! This library provides:
//! - The flexvolume verb surface and backend registry
//! - The disk backend with SCSI-serial device resolution and
//!   idempotent mount teardown
//! - Node system collaborators (lsblk/scsi_id/umount shell-outs)
//!   behind a fakeable trait

pub mod disk;
pub mod driver;
pub mod error;
pub mod system;

pub use disk::DiskDriver;
pub use driver::{DriverRegistry, DriverResponse, DriverStatus, VolumeDriver, default_registry};
pub use error::{DriverError, Result};
pub use system::{LinuxSystem, NodeSystem};
