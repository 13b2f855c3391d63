//! Host privilege detection.
//!
//! The update rewrites system configuration and talks to the container
//! runtime socket, so it only runs with an effective user ID of 0.

use platconf_core::error::{Result, UpdateError};

/// Whether the process runs with root privileges.
pub fn is_elevated() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Fail with [`UpdateError::Privilege`] unless running as root.
pub fn require_elevated() -> Result<()> {
    if is_elevated() {
        Ok(())
    } else {
        Err(UpdateError::Privilege)
    }
}
