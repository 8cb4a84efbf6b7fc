//! Interface name and index utilities.

use std::ffi::{CStr, CString};
use std::io;

use crate::error::{Error, Result};

/// Maximum interface name length (including null terminator).
pub const IFNAMSIZ: usize = libc::IFNAMSIZ;

/// Validate an interface name.
///
/// The length check happens first so an oversized name is always reported as
/// [`Error::NameTooLong`], whatever else is wrong with it.
pub fn validate(name: &str) -> Result<()> {
    if name.len() >= IFNAMSIZ {
        return Err(Error::NameTooLong {
            name: name.to_string(),
        });
    }

    if name.is_empty() {
        return Err(Error::InvalidName("empty name".to_string()));
    }

    if name.contains('/') || name.contains('\0') {
        return Err(Error::InvalidName(format!(
            "{name}: contains invalid characters"
        )));
    }

    if name.chars().any(|c| c.is_whitespace()) {
        return Err(Error::InvalidName(format!("{name}: contains whitespace")));
    }

    Ok(())
}

/// Convert an interface name to its index.
///
/// Returns `None` if the kernel does not know the name.
pub fn name_to_index(name: &str) -> Option<u32> {
    let cname = CString::new(name).ok()?;
    let index = unsafe { libc::if_nametoindex(cname.as_ptr()) };
    (index != 0).then_some(index)
}

/// Convert an interface index to its name.
pub fn index_to_name(index: u32) -> Result<String> {
    if index == 0 {
        return Err(Error::InterfaceNotFound(index));
    }

    let mut buf = [0 as libc::c_char; IFNAMSIZ];
    let ret = unsafe { libc::if_indextoname(index, buf.as_mut_ptr()) };
    if ret.is_null() {
        let err = io::Error::last_os_error();
        tracing::debug!(index, %err, "if_indextoname failed");
        return Err(Error::InterfaceNotFound(index));
    }

    let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
    Ok(name.to_string_lossy().into_owned())
}

/// Copy `name` into a zero-padded `ifr_name` field.
///
/// The caller must have validated the name; anything past `IFNAMSIZ - 1`
/// bytes is cut off so the field stays NUL-terminated.
pub(crate) fn fill_ifr_name(field: &mut [libc::c_char; IFNAMSIZ], name: &str) {
    field.fill(0);
    for (dst, &src) in field
        .iter_mut()
        .zip(name.as_bytes().iter().take(IFNAMSIZ - 1))
    {
        *dst = src as libc::c_char;
    }
}
