use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("failed to enumerate block devices: {0}")]
    EnumerationFailed(String),

    #[error("serial query failed for device '{0}': {1}")]
    SerialQueryFailed(String, String),

    #[error("no attached device found for volume '{0}'")]
    DeviceNotFound(String),

    #[error("failed to unmount '{0}': {1}")]
    UnmountFailed(String, String),

    #[error("'{0}' is still a mount point after unmount")]
    ResidualMount(String),

    #[error("failed to remove mount directory '{0}': {1}")]
    RemoveFailed(String, #[source] std::io::Error),

    #[error("invalid driver options: {0}")]
    InvalidOptions(#[from] serde_json::Error),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DriverError>;
