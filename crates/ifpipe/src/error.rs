//! Error types for device setup.
//!
//! Everything that can go wrong before the first frame is forwarded ends up
//! here. Once the forwarding loop runs, its outcome is reported as a
//! [`TerminationReason`](crate::TerminationReason) instead.

use std::io;
use std::path::PathBuf;

use crate::ifname::IFNAMSIZ;

/// Result type for ifpipe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring, resolving or setting up a device.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Buffer size is not a positive integer.
    #[error("invalid buffer size: {0}")]
    InvalidBufferSize(String),

    /// Control device path is empty.
    #[error("tunnel device name expected")]
    EmptyDevicePath,

    /// Interface name does not fit into `ifr_name`.
    #[error("device name too long (max is {max}): {name}", max = IFNAMSIZ)]
    NameTooLong {
        /// The name that was too long.
        name: String,
    },

    /// Invalid interface name.
    #[error("invalid device name: {0}")]
    InvalidName(String),

    /// No interface with this index exists.
    #[error("interface not found: index {0}")]
    InterfaceNotFound(u32),

    /// Opening a device node or control device failed.
    #[error("failed to open device {}: {source}", .path.display())]
    Open {
        /// The path that could not be opened.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// `fstat` on an opened path failed.
    #[error("failed to stat {}: {source}", .path.display())]
    Stat {
        /// The path that could not be inspected.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// The path exists but is not a character device.
    #[error("not a network device: {}", .0.display())]
    NotANetworkDevice(PathBuf),

    /// Reading a sysfs attribute failed.
    #[error("failed to read {}: {source}", .path.display())]
    Sysfs {
        /// The attribute path.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// A sysfs `ifindex` attribute did not contain an index.
    #[error("invalid ifindex in {}: {content:?}", .path.display())]
    InvalidIfindex {
        /// The attribute path.
        path: PathBuf,
        /// What the attribute contained.
        content: String,
    },

    /// ioctl failed.
    #[error("ioctl {name} failed: {source}")]
    Ioctl {
        /// The ioctl name.
        name: &'static str,
        /// The underlying error.
        source: io::Error,
    },
}

impl Error {
    /// Create an ioctl error.
    pub fn ioctl(name: &'static str, source: io::Error) -> Self {
        Error::Ioctl { name, source }
    }

    /// Create an open error for `path`.
    pub fn open(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Open {
            path: path.into(),
            source,
        }
    }
}
