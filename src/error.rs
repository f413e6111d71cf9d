// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Fatal boot errors and their mapping onto sysexits codes.
// Author: Lukas Bower

use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// `EX_USAGE` from sysexits.h.
pub const EX_USAGE: u8 = 64;
/// `EX_UNAVAILABLE` from sysexits.h.
pub const EX_UNAVAILABLE: u8 = 69;

/// Every condition that terminates the boot before the handoff.
#[derive(Debug, Error)]
pub enum BootError {
    /// Required cmdline keys without a value, in registry order.
    #[error("missing required kernel parameter(s): {}", .0.join(" "))]
    MissingRequired(Vec<&'static str>),
    /// The working buffers could not be reserved.
    #[error("unable to reserve working buffer memory")]
    OutOfMemory,
    /// A kernel-provided file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// `rootfstype` is absent from the filesystem listing.
    #[error("rootfstype \"{0}\": filesystem type not available")]
    FilesystemUnavailable(String),
    /// A mount, chdir or chroot step failed.
    #[error("{op} {}: {source}", path.display())]
    Syscall {
        /// Short operation name, as logged.
        op: &'static str,
        /// Path the operation acted on.
        path: PathBuf,
        /// Kernel error.
        #[source]
        source: Errno,
    },
    /// The init program is missing from the mounted root or not executable.
    #[error("init program {} is not present or not executable", .0.display())]
    InitNotExecutable(PathBuf),
    /// `execv` returned.
    #[error("execv {}: {source}", path.display())]
    Exec {
        /// Program that failed to start.
        path: PathBuf,
        /// Kernel error.
        #[source]
        source: Errno,
    },
}

impl BootError {
    pub(crate) fn syscall(op: &'static str, path: impl Into<PathBuf>, source: Errno) -> Self {
        BootError::Syscall {
            op,
            path: path.into(),
            source,
        }
    }

    /// Usage-class for configuration errors, unavailable-class for everything else.
    pub fn exit_code(&self) -> u8 {
        match self {
            BootError::MissingRequired(_) => EX_USAGE,
            _ => EX_UNAVAILABLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_missing_parameters_are_usage_errors() {
        assert_eq!(BootError::MissingRequired(vec!["root="]).exit_code(), EX_USAGE);
        assert_eq!(
            BootError::FilesystemUnavailable("zfs".into()).exit_code(),
            EX_UNAVAILABLE
        );
        assert_eq!(BootError::OutOfMemory.exit_code(), EX_UNAVAILABLE);
        assert_eq!(
            BootError::syscall("chroot", ".", Errno::EPERM).exit_code(),
            EX_UNAVAILABLE
        );
    }

    #[test]
    fn missing_keys_are_listed() {
        let err = BootError::MissingRequired(vec!["root=", "rootfstype="]);
        assert_eq!(
            err.to_string(),
            "missing required kernel parameter(s): root= rootfstype="
        );
    }
}
