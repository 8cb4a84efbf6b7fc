//! Common test utilities for integration tests.

use std::sync::atomic::{AtomicU32, Ordering};

/// Global counter for unique interface names.
static NAME_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Generate an interface name that no other test in this run uses.
///
/// Kept short enough for `IFNAMSIZ`.
pub fn unique_ifname(prefix: &str) -> String {
    let id = NAME_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}{}-{}", prefix, std::process::id() % 10000, id)
}

/// Check if running as root.
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Skip the test if not running as root.
#[macro_export]
macro_rules! require_root {
    () => {
        if !crate::common::is_root() {
            eprintln!("Skipping test: requires root");
            return Ok(());
        }
    };
}
