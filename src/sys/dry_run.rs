// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Recording System used by the check tool and the test suites.
// Author: Lukas Bower

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use nix::errno::Errno;

use super::{Access, Handoff, System};
use crate::mount::{MountDescriptor, MountMode};

/// One attempted operation, in the order it was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SysCall {
    /// `mount(2)` of a filesystem.
    Mount {
        /// Device or pseudo-filesystem.
        source: String,
        /// Mount point.
        target: PathBuf,
        /// Filesystem type.
        fstype: String,
        /// Read-only or read-write.
        mode: MountMode,
    },
    /// `MS_MOVE` of an existing mount.
    MoveMount {
        /// Current mount point.
        from: PathBuf,
        /// New mount point.
        to: PathBuf,
    },
    /// `umount(2)`.
    Unmount(PathBuf),
    /// `chdir(2)`.
    Chdir(PathBuf),
    /// `chroot(2)`.
    Chroot(PathBuf),
    /// `access(2)` with the checked mode.
    Access(PathBuf, Access),
    /// `unlink(2)`.
    Unlink(PathBuf),
    /// Console takeover of stdio.
    RedirectConsole(PathBuf),
    /// `execv(2)`.
    Exec {
        /// Program path.
        program: PathBuf,
        /// The only argv entry.
        argv0: String,
    },
}

impl SysCall {
    /// Short operation name, as used by [`DryRunSystem::fail`].
    pub fn op(&self) -> &'static str {
        match self {
            SysCall::Mount { .. } => "mount",
            SysCall::MoveMount { .. } => "move_mount",
            SysCall::Unmount(_) => "umount",
            SysCall::Chdir(_) => "chdir",
            SysCall::Chroot(_) => "chroot",
            SysCall::Access(..) => "access",
            SysCall::Unlink(_) => "unlink",
            SysCall::RedirectConsole(_) => "console",
            SysCall::Exec { .. } => "exec",
        }
    }

    /// The path the operation acts on; for move mounts, the destination.
    pub fn path(&self) -> &Path {
        match self {
            SysCall::Mount { target, .. } => target,
            SysCall::MoveMount { to, .. } => to,
            SysCall::Unmount(p)
            | SysCall::Chdir(p)
            | SysCall::Chroot(p)
            | SysCall::Access(p, _)
            | SysCall::Unlink(p)
            | SysCall::RedirectConsole(p) => p,
            SysCall::Exec { program, .. } => program,
        }
    }
}

/// In-memory [`System`].
///
/// Nothing touches the host. Access checks succeed for paths registered
/// with [`with_file`](Self::with_file) or [`with_executable`](Self::with_executable);
/// any operation can be made to fail with [`fail`](Self::fail).
#[derive(Debug, Default, Clone)]
pub struct DryRunSystem {
    calls: Vec<SysCall>,
    files: HashSet<PathBuf>,
    executables: HashSet<PathBuf>,
    failures: Vec<(&'static str, PathBuf, Errno)>,
}

impl DryRunSystem {
    /// Empty system: no files, no failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `path` exist.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.insert(path.into());
        self
    }

    /// Make `path` exist and pass `X_OK`.
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executables.insert(path.into());
        self
    }

    /// Make operation `op` on `path` fail with `errno`.
    pub fn fail(mut self, op: &'static str, path: impl Into<PathBuf>, errno: Errno) -> Self {
        self.failures.push((op, path.into(), errno));
        self
    }

    /// Every call so far, failed ones included.
    pub fn calls(&self) -> &[SysCall] {
        &self.calls
    }

    /// Index of the first call matching `pred`.
    pub fn position(&self, pred: impl Fn(&SysCall) -> bool) -> Option<usize> {
        self.calls.iter().position(pred)
    }

    /// Whether a mount onto `target` was attempted.
    pub fn mounted(&self, target: impl AsRef<Path>) -> bool {
        let target = target.as_ref();
        self.calls
            .iter()
            .any(|c| matches!(c, SysCall::Mount { target: t, .. } if t == target))
    }

    /// Whether `target` was unmounted.
    pub fn unmounted(&self, target: impl AsRef<Path>) -> bool {
        let target = target.as_ref();
        self.calls
            .iter()
            .any(|c| matches!(c, SysCall::Unmount(t) if t == target))
    }

    fn record(&mut self, call: SysCall) -> Result<(), Errno> {
        let failure = self
            .failures
            .iter()
            .find(|(op, path, _)| *op == call.op() && path == call.path())
            .map(|(_, _, errno)| *errno);
        self.calls.push(call);
        match failure {
            Some(errno) => Err(errno),
            None => Ok(()),
        }
    }
}

impl System for DryRunSystem {
    fn mount(&mut self, desc: &MountDescriptor) -> Result<(), Errno> {
        self.record(SysCall::Mount {
            source: desc.source.clone(),
            target: desc.target.clone(),
            fstype: desc.fstype.clone(),
            mode: desc.mode,
        })
    }

    fn move_mount(&mut self, from: &Path, to: &Path) -> Result<(), Errno> {
        self.record(SysCall::MoveMount {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        })
    }

    fn unmount(&mut self, target: &Path) -> Result<(), Errno> {
        self.record(SysCall::Unmount(target.to_path_buf()))
    }

    fn chdir(&mut self, path: &Path) -> Result<(), Errno> {
        self.record(SysCall::Chdir(path.to_path_buf()))
    }

    fn chroot(&mut self, path: &Path) -> Result<(), Errno> {
        self.record(SysCall::Chroot(path.to_path_buf()))
    }

    fn access(&mut self, path: &Path, mode: Access) -> Result<(), Errno> {
        self.record(SysCall::Access(path.to_path_buf(), mode))?;
        let executable = self.executables.contains(path);
        match mode {
            Access::Execute if executable => Ok(()),
            Access::Execute if self.files.contains(path) => Err(Errno::EACCES),
            Access::Exists if executable || self.files.contains(path) => Ok(()),
            _ => Err(Errno::ENOENT),
        }
    }

    fn unlink(&mut self, path: &Path) -> Result<(), Errno> {
        self.record(SysCall::Unlink(path.to_path_buf()))?;
        self.files.remove(path);
        self.executables.remove(path);
        Ok(())
    }

    fn redirect_console(&mut self, device: &Path) -> Result<(), Errno> {
        self.record(SysCall::RedirectConsole(device.to_path_buf()))
    }

    fn exec(&mut self, program: &Path, argv0: &str) -> Result<Handoff, Errno> {
        self.record(SysCall::Exec {
            program: program.to_path_buf(),
            argv0: argv0.to_string(),
        })?;
        Ok(Handoff {
            program: program.to_path_buf(),
            argv0: argv0.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_reflects_registered_paths() {
        let mut sys = DryRunSystem::new()
            .with_file("/dev/ttyS0")
            .with_executable("/mnt/sbin/init");
        assert_eq!(sys.access(Path::new("/mnt/sbin/init"), Access::Execute), Ok(()));
        assert_eq!(sys.access(Path::new("/dev/ttyS0"), Access::Exists), Ok(()));
        assert_eq!(
            sys.access(Path::new("/dev/ttyS0"), Access::Execute),
            Err(Errno::EACCES)
        );
        assert_eq!(
            sys.access(Path::new("/dev/ttyS1"), Access::Exists),
            Err(Errno::ENOENT)
        );
        assert_eq!(sys.calls().len(), 4);
    }

    #[test]
    fn configured_failures_are_recorded_then_returned() {
        let mut sys = DryRunSystem::new().fail("chroot", ".", Errno::EPERM);
        assert_eq!(sys.chroot(Path::new(".")), Err(Errno::EPERM));
        assert_eq!(sys.chdir(Path::new(".")), Ok(()));
        assert_eq!(sys.calls()[0], SysCall::Chroot(PathBuf::from(".")));
    }
}
