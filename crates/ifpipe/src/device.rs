//! Device resolution and configuration.
//!
//! An identifier given on the command line is either the name of a network
//! interface or the path of a character device node. Both end up as a
//! [`Target`]: an interface name, its index if the interface already exists,
//! and a [`DeviceKind`]. The target is then opened and configured:
//!
//! - TAP interfaces go through the TUN/TAP control device (`/dev/net/tun`)
//!   and `TUNSETIFF` attaches the descriptor to the named interface,
//!   creating it if needed.
//! - macvtap interfaces have their own character device, `/dev/tap<ifindex>`.
//!   Only the `IFF_VNET_HDR` bit of its flags is changed.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ifname;

// TUN/TAP ioctl constants
const TUNSETIFF: libc::c_ulong = 0x400454ca;
const TUNGETIFF: libc::c_ulong = 0x800454d2;

// TUN/TAP flags (from linux/if_tun.h)
/// TAP device (Layer 2).
const IFF_TAP: libc::c_short = 0x0002;
/// No protocol information.
const IFF_NO_PI: libc::c_short = 0x1000;
/// VNET header support.
const IFF_VNET_HDR: libc::c_short = 0x4000;

/// How the interface is reached from userspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// TAP interface, attached through the TUN/TAP control device.
    Tap,
    /// macvtap interface with its own `/dev/tap<ifindex>` node.
    Macvtap,
}

impl DeviceKind {
    /// Get the kind name.
    pub fn name(&self) -> &'static str {
        match self {
            DeviceKind::Tap => "tap",
            DeviceKind::Macvtap => "macvtap",
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A resolved but not yet opened interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Interface name.
    pub name: String,
    /// Interface index, `None` for a TAP interface that does not exist yet.
    pub index: Option<u32>,
    /// Interface kind.
    pub kind: DeviceKind,
}

impl Target {
    /// The path that has to be opened to talk to this interface.
    pub fn device_path(&self, config: &Config) -> PathBuf {
        match (self.kind, self.index) {
            (DeviceKind::Macvtap, Some(index)) => macvtap_device_path(index),
            _ => config.tun_device().to_path_buf(),
        }
    }
}

/// Path of the character device belonging to macvtap interface `index`.
pub fn macvtap_device_path(index: u32) -> PathBuf {
    PathBuf::from(format!("/dev/tap{index}"))
}

/// Work out which interface `identifier` refers to and what kind it is.
///
/// Nothing stays open when this returns. A device node given by path is
/// opened just long enough to `fstat` it.
pub fn lookup(identifier: &str, config: &Config) -> Result<Target> {
    let (name, index) = locate(identifier, config)?;
    let kind = classify(&name, index, config)?;
    tracing::debug!(%name, ?index, %kind, "resolved {identifier}");
    Ok(Target { name, index, kind })
}

/// Decide between TAP and macvtap for an interface.
///
/// Only looks at sysfs, so asking twice about the same interface gives the
/// same answer as long as the interface is not replaced in between. A missing
/// macvtap node means TAP; any other failure to stat it is an error.
pub fn classify(name: &str, index: Option<u32>, config: &Config) -> Result<DeviceKind> {
    let Some(index) = index else {
        return Ok(DeviceKind::Tap);
    };

    let tap_node = config
        .sysfs_root()
        .join("class/net")
        .join(name)
        .join("macvtap")
        .join(format!("tap{index}"));

    let is_macvtap = tap_node.try_exists().map_err(|source| Error::Sysfs {
        path: tap_node.clone(),
        source,
    })?;

    Ok(if is_macvtap {
        DeviceKind::Macvtap
    } else {
        DeviceKind::Tap
    })
}

/// Map an identifier to an interface name and, if it exists, its index.
fn locate(identifier: &str, config: &Config) -> Result<(String, Option<u32>)> {
    let bare_name = !identifier.contains('/');

    if bare_name {
        ifname::validate(identifier)?;
        if let Some(index) = ifname::name_to_index(identifier) {
            return Ok((identifier.to_string(), Some(index)));
        }
    }

    let (major, minor) = match char_device_numbers(Path::new(identifier)) {
        Err(Error::Open { source, .. })
            if bare_name && source.kind() == io::ErrorKind::NotFound =>
        {
            // Neither an interface nor a file: TUNSETIFF will create it.
            tracing::debug!("{identifier} does not exist yet, will create a tap interface");
            return Ok((identifier.to_string(), None));
        }
        result => result?,
    };

    let index = char_device_ifindex(config.sysfs_root(), major, minor)?;
    let name = ifname::index_to_name(index)?;
    tracing::debug!(major, minor, index, %name, "{identifier} resolved through sysfs");
    Ok((name, Some(index)))
}

/// Open `path` read-only and return the major and minor number of the
/// character device behind it.
fn char_device_numbers(path: &Path) -> Result<(u32, u32)> {
    let file = File::open(path).map_err(|e| Error::open(path, e))?;
    let metadata = file.metadata().map_err(|source| Error::Stat {
        path: path.to_path_buf(),
        source,
    })?;

    if !metadata.file_type().is_char_device() {
        return Err(Error::NotANetworkDevice(path.to_path_buf()));
    }

    let rdev = metadata.rdev();
    Ok((libc::major(rdev), libc::minor(rdev)))
}

/// Read the interface index sysfs exposes for character device `major:minor`.
fn char_device_ifindex(sysfs_root: &Path, major: u32, minor: u32) -> Result<u32> {
    let path = sysfs_root
        .join("dev/char")
        .join(format!("{major}:{minor}"))
        .join("ifindex");

    let content = std::fs::read_to_string(&path).map_err(|source| Error::Sysfs {
        path: path.clone(),
        source,
    })?;

    match content.trim().parse::<u32>() {
        Ok(index) if index != 0 => Ok(index),
        _ => Err(Error::InvalidIfindex { path, content }),
    }
}

/// An opened interface.
///
/// Owns the descriptor; dropping the device closes it.
#[derive(Debug)]
pub struct Device {
    file: File,
    name: String,
    index: Option<u32>,
    kind: DeviceKind,
}

impl Device {
    /// Resolve `identifier` and open the matching device, without
    /// configuring it.
    pub fn resolve(identifier: &str, config: &Config) -> Result<Self> {
        let target = lookup(identifier, config)?;
        Self::open_target(target, config)
    }

    /// Resolve, open and configure `identifier`, ready for forwarding.
    pub fn open(identifier: &str, config: &Config) -> Result<Self> {
        let device = Self::resolve(identifier, config)?;
        device.configure(config)?;
        tracing::info!(
            name = %device.name,
            index = ?device.index,
            kind = %device.kind,
            "device ready"
        );
        Ok(device)
    }

    /// Open the device node for an already resolved target.
    pub fn open_target(target: Target, config: &Config) -> Result<Self> {
        let path = target.device_path(config);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::open(&path, e))?;

        tracing::debug!(path = %path.display(), fd = file.as_raw_fd(), "opened");

        Ok(Device {
            file,
            name: target.name,
            index: target.index,
            kind: target.kind,
        })
    }

    /// Apply the kind-specific ioctl setup.
    pub fn configure(&self, config: &Config) -> Result<()> {
        match self.kind {
            DeviceKind::Tap => self.configure_tap(config),
            DeviceKind::Macvtap => self.configure_macvtap(config),
        }
    }

    fn configure_tap(&self, config: &Config) -> Result<()> {
        let flags = tap_flags(config.packet_info());
        let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
        ifr.ifr_ifru.ifru_flags = flags;
        ifname::fill_ifr_name(&mut ifr.ifr_name, &self.name);

        tracing::debug!(name = %self.name, flags = format_args!("{flags:#06x}"), "TUNSETIFF");
        let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), TUNSETIFF, &ifr) };
        if ret < 0 {
            return Err(Error::ioctl("TUNSETIFF", io::Error::last_os_error()));
        }
        Ok(())
    }

    fn configure_macvtap(&self, config: &Config) -> Result<()> {
        let fd = self.file.as_raw_fd();
        let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };

        let ret = unsafe { libc::ioctl(fd, TUNGETIFF, &mut ifr) };
        if ret < 0 {
            return Err(Error::ioctl("TUNGETIFF", io::Error::last_os_error()));
        }

        let current = unsafe { ifr.ifr_ifru.ifru_flags };
        let flags = macvtap_flags(current, config.vnet_hdr());
        ifr.ifr_ifru.ifru_flags = flags;

        tracing::debug!(
            name = %self.name,
            current = format_args!("{current:#06x}"),
            flags = format_args!("{flags:#06x}"),
            "TUNSETIFF"
        );
        let ret = unsafe { libc::ioctl(fd, TUNSETIFF, &ifr) };
        if ret < 0 {
            return Err(Error::ioctl("TUNSETIFF", io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Get the interface name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the interface index, if the interface existed when resolved.
    pub fn index(&self) -> Option<u32> {
        self.index
    }

    /// Get the device kind.
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }
}

impl Read for Device {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for Device {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl AsFd for Device {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for Device {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

/// Flags for `TUNSETIFF` on a TAP interface.
fn tap_flags(packet_info: bool) -> libc::c_short {
    if packet_info {
        IFF_TAP
    } else {
        IFF_TAP | IFF_NO_PI
    }
}

/// Update macvtap flags, touching only `IFF_VNET_HDR`.
fn macvtap_flags(current: libc::c_short, vnet_hdr: bool) -> libc::c_short {
    if vnet_hdr {
        current | IFF_VNET_HDR
    } else {
        current & !IFF_VNET_HDR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn config_with_sysfs(sysfs: &Path) -> Config {
        Config::builder().sysfs_root(sysfs).build().unwrap()
    }

    fn add_macvtap_node(sysfs: &Path, name: &str, index: u32) {
        let dir = sysfs.join("class/net").join(name).join("macvtap");
        fs::create_dir_all(&dir).unwrap();
        fs::create_dir_all(dir.join(format!("tap{index}"))).unwrap();
    }

    #[test]
    fn test_tap_flags() {
        assert_eq!(tap_flags(false), IFF_TAP | IFF_NO_PI);
        assert_eq!(tap_flags(true), IFF_TAP);
    }

    #[test]
    fn test_macvtap_flags_preserve_other_bits() {
        let current = IFF_TAP | IFF_NO_PI;
        assert_eq!(macvtap_flags(current, true), IFF_TAP | IFF_NO_PI | IFF_VNET_HDR);
        assert_eq!(macvtap_flags(current, false), current);

        let with_hdr = IFF_TAP | IFF_NO_PI | IFF_VNET_HDR | 0x0100;
        assert_eq!(macvtap_flags(with_hdr, false), IFF_TAP | IFF_NO_PI | 0x0100);
        assert_eq!(macvtap_flags(with_hdr, true), with_hdr);
    }

    #[test]
    fn test_char_device_numbers() {
        assert_eq!(char_device_numbers(Path::new("/dev/null")).unwrap(), (1, 3));
    }

    #[test]
    fn test_char_device_probe_needs_no_write_access() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("read-only");
        fs::write(&file, b"").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o444)).unwrap();

        let err = char_device_numbers(&file).unwrap_err();
        assert!(matches!(err, Error::NotANetworkDevice(p) if p == file));
    }

    #[test]
    fn test_classify_plain_interface_is_tap() {
        let sysfs = TempDir::new().unwrap();
        let config = config_with_sysfs(sysfs.path());
        assert_eq!(classify("tap0", Some(12), &config).unwrap(), DeviceKind::Tap);
        assert_eq!(classify("tap0", None, &config).unwrap(), DeviceKind::Tap);
    }

    #[test]
    fn test_classify_macvtap() {
        let sysfs = TempDir::new().unwrap();
        add_macvtap_node(sysfs.path(), "macvtap0", 9);
        let config = config_with_sysfs(sysfs.path());

        assert_eq!(classify("macvtap0", Some(9), &config).unwrap(), DeviceKind::Macvtap);
        // asking again gives the same answer
        assert_eq!(classify("macvtap0", Some(9), &config).unwrap(), DeviceKind::Macvtap);
        // a node for a different index does not count
        assert_eq!(classify("macvtap0", Some(10), &config).unwrap(), DeviceKind::Tap);
    }

    #[test]
    fn test_classify_stat_failure_is_fatal() {
        // class/net/lo is a file, so looking below it fails with ENOTDIR
        let sysfs = TempDir::new().unwrap();
        let class_net = sysfs.path().join("class/net");
        fs::create_dir_all(&class_net).unwrap();
        fs::write(class_net.join("lo"), b"").unwrap();
        let config = config_with_sysfs(sysfs.path());
        let index = ifname::name_to_index("lo").unwrap();

        let err = classify("lo", Some(index), &config).unwrap_err();
        match err {
            Error::Sysfs { path, source } => {
                assert_eq!(path, class_net.join(format!("lo/macvtap/tap{index}")));
                assert_eq!(source.kind(), io::ErrorKind::NotADirectory);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(matches!(lookup("lo", &config), Err(Error::Sysfs { .. })));
    }

    #[test]
    fn test_device_path() {
        let config = Config::default();
        let tap = Target {
            name: "tap0".to_string(),
            index: Some(4),
            kind: DeviceKind::Tap,
        };
        assert_eq!(tap.device_path(&config), Path::new("/dev/net/tun"));

        let macvtap = Target {
            name: "macvtap0".to_string(),
            index: Some(9),
            kind: DeviceKind::Macvtap,
        };
        assert_eq!(macvtap.device_path(&config), Path::new("/dev/tap9"));
    }

    #[test]
    fn test_lookup_existing_interface() {
        let sysfs = TempDir::new().unwrap();
        let config = config_with_sysfs(sysfs.path());
        let index = ifname::name_to_index("lo").unwrap();

        let first = lookup("lo", &config).unwrap();
        assert_eq!(
            first,
            Target {
                name: "lo".to_string(),
                index: Some(index),
                kind: DeviceKind::Tap,
            }
        );
        assert_eq!(lookup("lo", &config).unwrap(), first);
    }

    #[test]
    fn test_lookup_existing_macvtap() {
        let sysfs = TempDir::new().unwrap();
        let index = ifname::name_to_index("lo").unwrap();
        add_macvtap_node(sysfs.path(), "lo", index);
        let config = config_with_sysfs(sysfs.path());

        let target = lookup("lo", &config).unwrap();
        assert_eq!(target.kind, DeviceKind::Macvtap);
        assert_eq!(
            target.device_path(&config),
            PathBuf::from(format!("/dev/tap{index}"))
        );
    }

    #[test]
    fn test_lookup_new_tap() {
        let config = Config::default();
        let target = lookup("ifpipe-nx0", &config).unwrap();
        assert_eq!(target.name, "ifpipe-nx0");
        assert_eq!(target.index, None);
        assert_eq!(target.kind, DeviceKind::Tap);
    }

    #[test]
    fn test_lookup_name_too_long() {
        let config = Config::default();
        let err = lookup("averyveryverylongname", &config).unwrap_err();
        assert!(matches!(err, Error::NameTooLong { .. }));
    }

    #[test]
    fn test_lookup_char_device_follows_ifindex() {
        // /dev/null stands in for a macvtap node; sysfs maps it to lo.
        let sysfs = TempDir::new().unwrap();
        let index = ifname::name_to_index("lo").unwrap();
        let attr = sysfs.path().join("dev/char/1:3");
        fs::create_dir_all(&attr).unwrap();
        fs::write(attr.join("ifindex"), format!("{index}\n")).unwrap();
        let config = config_with_sysfs(sysfs.path());

        let target = lookup("/dev/null", &config).unwrap();
        assert_eq!(target.name, "lo");
        assert_eq!(target.index, Some(index));
        assert_eq!(target.kind, DeviceKind::Tap);
    }

    #[test]
    fn test_lookup_char_device_without_ifindex() {
        let sysfs = TempDir::new().unwrap();
        let config = config_with_sysfs(sysfs.path());
        let err = lookup("/dev/null", &config).unwrap_err();
        assert!(matches!(err, Error::Sysfs { .. }));
    }

    #[test]
    fn test_lookup_char_device_bad_ifindex() {
        let sysfs = TempDir::new().unwrap();
        let attr = sysfs.path().join("dev/char/1:3");
        fs::create_dir_all(&attr).unwrap();
        fs::write(attr.join("ifindex"), "garbage\n").unwrap();
        let config = config_with_sysfs(sysfs.path());

        let err = lookup("/dev/null", &config).unwrap_err();
        assert!(matches!(err, Error::InvalidIfindex { .. }));
    }

    #[test]
    fn test_lookup_regular_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("not-a-device");
        fs::write(&file, b"").unwrap();

        let err = lookup(file.to_str().unwrap(), &Config::default()).unwrap_err();
        assert!(matches!(err, Error::NotANetworkDevice(p) if p == file));
    }

    #[test]
    fn test_lookup_missing_path() {
        let err = lookup("/nonexistent/ifpipe/dev", &Config::default()).unwrap_err();
        match err {
            Error::Open { path, source } => {
                assert_eq!(path, Path::new("/nonexistent/ifpipe/dev"));
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_opens_control_device() {
        // A regular file stands in for /dev/net/tun.
        let dir = TempDir::new().unwrap();
        let tun = dir.path().join("tun");
        fs::write(&tun, b"").unwrap();
        let config = Config::builder()
            .tun_device(&tun)
            .sysfs_root(dir.path())
            .build()
            .unwrap();

        let device = Device::resolve("ifpipe-nx1", &config).unwrap();
        assert_eq!(device.name(), "ifpipe-nx1");
        assert_eq!(device.kind(), DeviceKind::Tap);
        assert_eq!(device.index(), None);

        // TUNSETIFF on a regular file is refused
        let err = device.configure(&config).unwrap_err();
        assert!(matches!(err, Error::Ioctl { name: "TUNSETIFF", .. }));
    }

    #[test]
    fn test_resolve_missing_control_device() {
        let config = Config::builder()
            .tun_device("/nonexistent/net/tun")
            .build()
            .unwrap();
        let err = Device::open("ifpipe-nx2", &config).unwrap_err();
        assert!(matches!(err, Error::Open { .. }));
    }
}
