//! Runtime configuration.
//!
//! A [`Config`] is assembled once, validated, and then only read by the
//! resolver, the configurator and the forwarding loop.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default packet buffer size in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 16384;

/// The path to the TUN/TAP control device.
pub const TUN_DEVICE_PATH: &str = "/dev/net/tun";

/// Where sysfs is mounted.
pub const SYSFS_ROOT: &str = "/sys";

/// Settings shared by device setup and the forwarding loop.
///
/// Build one with [`Config::builder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    buffer_size: usize,
    packet_info: bool,
    vnet_hdr: bool,
    tun_device: PathBuf,
    sysfs_root: PathBuf,
}

impl Config {
    /// Create a new builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Get the packet buffer size.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Whether TAP devices keep the packet information header.
    pub fn packet_info(&self) -> bool {
        self.packet_info
    }

    /// Whether macvtap devices use the virtio-net header.
    pub fn vnet_hdr(&self) -> bool {
        self.vnet_hdr
    }

    /// Get the TUN/TAP control device path.
    pub fn tun_device(&self) -> &Path {
        &self.tun_device
    }

    /// Get the sysfs mount point.
    pub fn sysfs_root(&self) -> &Path {
        &self.sysfs_root
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            packet_info: false,
            vnet_hdr: false,
            tun_device: PathBuf::from(TUN_DEVICE_PATH),
            sysfs_root: PathBuf::from(SYSFS_ROOT),
        }
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a builder holding the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the packet buffer size.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    /// Keep the packet information header on TAP devices (don't set `IFF_NO_PI`).
    pub fn packet_info(mut self, value: bool) -> Self {
        self.config.packet_info = value;
        self
    }

    /// Request the virtio-net header on macvtap devices.
    pub fn vnet_hdr(mut self, value: bool) -> Self {
        self.config.vnet_hdr = value;
        self
    }

    /// Set the TUN/TAP control device path.
    pub fn tun_device(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tun_device = path.into();
        self
    }

    /// Point sysfs lookups somewhere other than `/sys`.
    pub fn sysfs_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.sysfs_root = path.into();
        self
    }

    /// Check the settings and return the finished configuration.
    pub fn build(self) -> Result<Config> {
        let config = self.config;
        if config.buffer_size == 0 {
            return Err(Error::InvalidBufferSize(
                "must be at least 1: 0".to_string(),
            ));
        }
        if config.tun_device.as_os_str().is_empty() {
            return Err(Error::EmptyDevicePath);
        }
        Ok(config)
    }
}

/// Parse a buffer size.
///
/// Accepts decimal, `0x` hexadecimal and `0`-prefixed octal, the way
/// `strtol(3)` with base 0 does. The whole string must be consumed and the
/// result must be at least 1.
pub fn parse_buffer_size(s: &str) -> Result<usize> {
    let invalid = || Error::InvalidBufferSize(format!("not a number: {s}"));

    let digits = s.trim_start();
    let digits = digits.strip_prefix('+').unwrap_or(digits);

    let (radix, digits) = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        (16, hex)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(invalid());
    }

    let size = usize::from_str_radix(digits, radix).map_err(|_| invalid())?;
    if size == 0 {
        return Err(Error::InvalidBufferSize(format!("must be at least 1: {s}")));
    }
    Ok(size)
}
