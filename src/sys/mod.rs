// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Syscall seam used by the boot flow.
// Author: Lukas Bower

//! The boot flow performs every privileged operation through [`System`].
//!
//! * [`linux::LinuxSystem`] issues the real syscalls via `nix`.
//! * [`dry_run::DryRunSystem`] records calls and answers from a configured
//!   view of the new root; the `check` subcommand and the tests use it.

use std::path::{Path, PathBuf};

use nix::errno::Errno;

use crate::mount::MountDescriptor;

/// Recording implementation.
pub mod dry_run;
/// Real syscalls through `nix`.
pub mod linux;

pub use dry_run::{DryRunSystem, SysCall};
pub use linux::LinuxSystem;

/// Access check flavour, mirroring `access(2)` modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// `F_OK`.
    Exists,
    /// `X_OK`.
    Execute,
}

/// Returned by a successful [`System::exec`]; the real implementation
/// never produces one because the process image is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handoff {
    /// Program that took over.
    pub program: PathBuf,
    /// Its only argument.
    pub argv0: String,
}

/// Privileged operations the boot flow performs.
pub trait System {
    /// Mount `desc.source` on `desc.target`.
    fn mount(&mut self, desc: &MountDescriptor) -> Result<(), Errno>;
    /// Move the mount at `from` to `to`.
    fn move_mount(&mut self, from: &Path, to: &Path) -> Result<(), Errno>;
    /// Unmount whatever is mounted on `target`.
    fn unmount(&mut self, target: &Path) -> Result<(), Errno>;
    /// Change the working directory.
    fn chdir(&mut self, path: &Path) -> Result<(), Errno>;
    /// Change the root directory.
    fn chroot(&mut self, path: &Path) -> Result<(), Errno>;
    /// Check `path` exists, or is executable.
    fn access(&mut self, path: &Path, mode: Access) -> Result<(), Errno>;
    /// Remove a file.
    fn unlink(&mut self, path: &Path) -> Result<(), Errno>;
    /// Open `device` read-write and make it stdin, stdout and stderr.
    fn redirect_console(&mut self, device: &Path) -> Result<(), Errno>;
    /// Replace the process image with `program`, passing `argv0` as the
    /// only argument vector entry.
    fn exec(&mut self, program: &Path, argv0: &str) -> Result<Handoff, Errno>;
}
