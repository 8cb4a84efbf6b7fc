//! Pipe a Linux TAP or macvtap interface through stdin and stdout.
//!
//! Frames read from the interface are written to standard output and
//! whatever arrives on standard input is written to the interface, one read
//! per frame. Together with a transport such as `ssh` or `socat` this splices
//! a kernel network interface into another host or process.
//!
//! # Overview
//!
//! 1. [`Device::resolve`] turns an interface name or a character device path
//!    into an open [`Device`] of a known [`DeviceKind`].
//! 2. [`Device::configure`] applies the TAP or macvtap ioctl setup.
//! 3. [`run`] (or [`run_stdio`]) forwards data until one side stops and
//!    reports a [`TerminationReason`].
//!
//! # Example
//!
//! ```ignore
//! use ifpipe::{Config, Device};
//!
//! let config = Config::builder().buffer_size(2048).build()?;
//! let device = Device::open("tap0", &config)?;
//!
//! let reason = ifpipe::run_stdio(device, &config)?;
//! std::process::exit(reason.exit_code());
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod forward;
pub mod ifname;
pub mod poll;

pub use config::{Config, ConfigBuilder, DEFAULT_BUFFER_SIZE, TUN_DEVICE_PATH, parse_buffer_size};
pub use device::{Device, DeviceKind, Target};
pub use error::{Error, Result};
pub use forward::{TerminationReason, run, run_stdio};
pub use poll::{Endpoint, Poller, Readiness};
