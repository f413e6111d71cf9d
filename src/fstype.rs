// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Check a requested root filesystem type against /proc/filesystems.
// Author: Lukas Bower

use crate::error::BootError;
use crate::kmsg::Sink;
use crate::printk;

/// Filesystem types whose root lives in an importable storage pool.
pub const POOL_BACKED: &[&str] = &["zfs"];

/// Succeed when `requested` occurs in the kernel's filesystem listing.
///
/// The listing is matched as plain text, the same way the kernel presents
/// it (`nodev\tproc\n\text4\n...`).
pub fn ensure_available(requested: &str, listing: &str, sink: &dyn Sink) -> Result<(), BootError> {
    if !requested.is_empty() && listing.contains(requested) {
        printk!(sink, Info, "rootfstype=\"{requested}\": filesystem type available.");
        return Ok(());
    }
    printk!(sink, Error, "rootfstype=\"{requested}\": filesystem type not available.");
    Err(BootError::FilesystemUnavailable(requested.to_string()))
}

/// Whether mounting `fstype` needs a pool import first.
pub fn is_pool_backed(fstype: &str) -> bool {
    POOL_BACKED.contains(&fstype)
}
