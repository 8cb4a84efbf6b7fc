//! TAP interface setup against the real kernel.

use ifpipe::{Config, Device, DeviceKind, Result, ifname};

use crate::common::unique_ifname;

#[test]
fn test_open_creates_tap_interface() -> Result<()> {
    require_root!();

    let name = unique_ifname("ifp");
    let config = Config::builder().build()?;

    let device = Device::open(&name, &config)?;
    assert_eq!(device.kind(), DeviceKind::Tap);
    assert_eq!(device.name(), name);
    assert!(
        ifname::name_to_index(&name).is_some(),
        "{name} should exist while the device is open"
    );

    drop(device);
    assert_eq!(
        ifname::name_to_index(&name),
        None,
        "{name} should disappear once the descriptor is closed"
    );

    Ok(())
}

#[test]
fn test_existing_tap_resolves_the_same_way_twice() -> Result<()> {
    require_root!();

    let name = unique_ifname("ifp");
    let config = Config::builder().packet_info(true).build()?;

    let _device = Device::open(&name, &config)?;
    let index = ifname::name_to_index(&name);
    assert!(index.is_some());

    let first = ifpipe::device::lookup(&name, &config)?;
    let second = ifpipe::device::lookup(&name, &config)?;
    assert_eq!(first, second);
    assert_eq!(first.kind, DeviceKind::Tap);
    assert_eq!(first.index, index);

    Ok(())
}

#[test]
fn test_attach_to_busy_tap_fails() -> Result<()> {
    require_root!();

    let name = unique_ifname("ifp");
    let config = Config::builder().build()?;

    let _first = Device::open(&name, &config)?;
    // A single-queue TAP accepts one attached descriptor.
    let err = Device::open(&name, &config).unwrap_err();
    assert!(matches!(err, ifpipe::Error::Ioctl { name: "TUNSETIFF", .. }));

    Ok(())
}
