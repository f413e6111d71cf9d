// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: System implementation backed by real Linux syscalls.
// Author: Lukas Bower

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::Path;

use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::mount::{mount, umount, MsFlags};
use nix::sys::stat::Mode;
use nix::unistd::{self, AccessFlags};

use super::{Access, Handoff, System};
use crate::mount::{MountDescriptor, MountMode};

const STDIO: [RawFd; 3] = [0, 1, 2];

/// [`System`] that performs the real syscalls.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxSystem;

impl LinuxSystem {
    /// The process-wide system; it holds no state.
    pub fn new() -> Self {
        Self
    }
}

fn cstring(bytes: &[u8]) -> Result<CString, Errno> {
    CString::new(bytes).map_err(|_| Errno::EINVAL)
}

/// Point stdio at the open console `fd`, stopping at the first failed
/// `dup2`. A descriptor above stdio is closed whether or not that worked.
fn attach_console(
    fd: RawFd,
    mut dup2: impl FnMut(RawFd, RawFd) -> Result<(), Errno>,
    close: impl FnOnce(RawFd) -> Result<(), Errno>,
) -> Result<(), Errno> {
    let duped = STDIO
        .into_iter()
        .filter(|target| *target != fd)
        .try_for_each(|target| dup2(fd, target));
    let closed = if STDIO.contains(&fd) { Ok(()) } else { close(fd) };
    duped.and(closed)
}

impl System for LinuxSystem {
    fn mount(&mut self, desc: &MountDescriptor) -> Result<(), Errno> {
        let flags = match desc.mode {
            MountMode::ReadOnly => MsFlags::MS_RDONLY,
            MountMode::ReadWrite => MsFlags::empty(),
        };
        mount(
            Some(desc.source.as_str()),
            desc.target.as_path(),
            Some(desc.fstype.as_str()),
            flags,
            None::<&str>,
        )
    }

    fn move_mount(&mut self, from: &Path, to: &Path) -> Result<(), Errno> {
        mount(Some(from), to, None::<&str>, MsFlags::MS_MOVE, None::<&str>)
    }

    fn unmount(&mut self, target: &Path) -> Result<(), Errno> {
        umount(target)
    }

    fn chdir(&mut self, path: &Path) -> Result<(), Errno> {
        unistd::chdir(path)
    }

    fn chroot(&mut self, path: &Path) -> Result<(), Errno> {
        unistd::chroot(path)
    }

    fn access(&mut self, path: &Path, mode: Access) -> Result<(), Errno> {
        let flags = match mode {
            Access::Exists => AccessFlags::F_OK,
            Access::Execute => AccessFlags::X_OK,
        };
        unistd::access(path, flags)
    }

    fn unlink(&mut self, path: &Path) -> Result<(), Errno> {
        unistd::unlink(path)
    }

    fn redirect_console(&mut self, device: &Path) -> Result<(), Errno> {
        let fd = open(device, OFlag::O_RDWR, Mode::empty())?;
        attach_console(fd, |from, to| unistd::dup2(from, to).map(drop), unistd::close)
    }

    fn exec(&mut self, program: &Path, argv0: &str) -> Result<Handoff, Errno> {
        let path = cstring(program.as_os_str().as_bytes())?;
        let argv = [cstring(argv0.as_bytes())?];
        match unistd::execv(&path, &argv)? {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn attach(fd: RawFd, fail_on: Option<RawFd>) -> (Result<(), Errno>, Vec<(RawFd, RawFd)>, Vec<RawFd>) {
        let duped = RefCell::new(Vec::new());
        let closed = RefCell::new(Vec::new());
        let res = attach_console(
            fd,
            |from, to| {
                duped.borrow_mut().push((from, to));
                match fail_on {
                    Some(slot) if slot == to => Err(Errno::EBADF),
                    _ => Ok(()),
                }
            },
            |fd| {
                closed.borrow_mut().push(fd);
                Ok(())
            },
        );
        (res, duped.into_inner(), closed.into_inner())
    }

    #[test]
    fn console_takes_over_stdio_and_is_closed() {
        let (res, duped, closed) = attach(5, None);
        assert_eq!(res, Ok(()));
        assert_eq!(duped, vec![(5, 0), (5, 1), (5, 2)]);
        assert_eq!(closed, vec![5]);
    }

    #[test]
    fn console_opened_on_a_stdio_slot_stays_open() {
        let (res, duped, closed) = attach(1, None);
        assert_eq!(res, Ok(()));
        assert_eq!(duped, vec![(1, 0), (1, 2)]);
        assert!(closed.is_empty());
    }

    #[test]
    fn failed_dup2_still_closes_the_console() {
        let (res, duped, closed) = attach(7, Some(1));
        assert_eq!(res, Err(Errno::EBADF));
        assert_eq!(duped, vec![(7, 0), (7, 1)]);
        assert_eq!(closed, vec![7]);
    }

    #[test]
    fn missing_console_device_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("ttyS9");
        assert_eq!(
            LinuxSystem::new().redirect_console(&missing),
            Err(Errno::ENOENT)
        );
    }
}
