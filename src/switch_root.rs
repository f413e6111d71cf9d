// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Move the early mounts into the new root, chroot, and exec init.
// Author: Lukas Bower

//! Switch-root sequencer.
//!
//! Nothing after the first move mount is undone: the initramfs is being
//! abandoned and the new root already holds the virtual filesystems. Each
//! step aborts the boot on failure; only removing our own binary and the
//! console redirection are allowed to fail quietly.

use std::path::{Path, PathBuf};

use nix::errno::Errno;

use crate::error::BootError;
use crate::kmsg::Sink;
use crate::mount::{AuxMount, DEV, PROC, SYS};
use crate::printk;
use crate::sys::{Access, Handoff, System};

/// Order in which the early mounts are moved under the new root.
pub const MOVE_ORDER: [AuxMount; 3] = [DEV, PROC, SYS];

fn fatal(sink: &dyn Sink, op: &'static str, path: &Path, errno: Errno) -> BootError {
    printk!(sink, Error, "time to panic: {op}: {errno}");
    BootError::syscall(op, path, errno)
}

/// Make `new_root` the filesystem root of this process.
///
/// `remove_self` names this program's file in the initramfs; deleting it
/// returns its pages before the initramfs becomes unreachable.
pub fn switch_root<S: System + ?Sized>(
    sys: &mut S,
    sink: &dyn Sink,
    new_root: &Path,
    remove_self: Option<&Path>,
) -> Result<(), BootError> {
    printk!(sink, Info, "Beginning switch root procedure.");

    if let Some(me) = remove_self {
        match sys.unlink(me) {
            Ok(()) => printk!(sink, Info, "Removed {} from initramfs.", me.display()),
            Err(errno) => printk!(sink, Warn, "unlink {}: {errno}; continuing.", me.display()),
        }
    }

    let mut n = 0;
    for aux in MOVE_ORDER {
        n += 1;
        let from = Path::new(aux.target);
        let to = new_root.join(aux.target.trim_start_matches('/'));
        printk!(sink, Info, "({n}) Attempting cmd: mount --move {} {}", from.display(), to.display());
        sys.move_mount(from, &to)
            .map_err(|errno| fatal(sink, "mount", &to, errno))?;
    }

    let dot = Path::new(".");
    let slash = Path::new("/");

    printk!(sink, Info, "({}) Attempting cmd: chdir {}", n + 1, new_root.display());
    sys.chdir(new_root)
        .map_err(|errno| fatal(sink, "chdir", new_root, errno))?;

    printk!(sink, Info, "({}) Attempting cmd: mount --move . /", n + 2);
    sys.move_mount(dot, slash)
        .map_err(|errno| fatal(sink, "mount", slash, errno))?;

    printk!(sink, Info, "({}) Attempting cmd: chroot .", n + 3);
    sys.chroot(dot)
        .map_err(|errno| fatal(sink, "chroot", dot, errno))?;

    printk!(sink, Info, "({}) Attempting cmd: chdir /", n + 4);
    sys.chdir(slash)
        .map_err(|errno| fatal(sink, "chdir", slash, errno))?;

    printk!(sink, Info, "Completed switch root procedure.");
    Ok(())
}

/// Point stdin, stdout and stderr at `/dev/<console>`; failures only warn.
pub fn redirect_console<S: System + ?Sized>(sys: &mut S, sink: &dyn Sink, console: &str) {
    printk!(sink, Info, "Console redirection to device {console} requested.");
    let device = Path::new(DEV.target).join(console);
    if let Err(errno) = sys.access(&device, Access::Exists) {
        printk!(sink, Warn, "access F_OK: {errno}");
        printk!(sink, Warn, "Could not access device: {console}!");
        printk!(sink, Warn, "Console redirection to device {console} aborted!");
        return;
    }
    printk!(sink, Info, "Opening stdin, stdout, and stderr on {console}.");
    if let Err(errno) = sys.redirect_console(&device) {
        printk!(sink, Warn, "Console redirection to device {console} failed: {errno}");
    }
}

/// Replace this process with `init`, handing it `runlevel` as argv[0].
///
/// The runlevel occupies the slot normally holding the program name; init
/// implementations that scan argv for a runlevel still find it.
pub fn exec_init<S: System + ?Sized>(
    sys: &mut S,
    sink: &dyn Sink,
    init: &str,
    runlevel: &str,
) -> Result<Handoff, BootError> {
    printk!(sink, Info, "Execing: \"{init} {runlevel}\" to boot mounted root system.");
    sys.exec(Path::new(init), runlevel).map_err(|errno| {
        printk!(sink, Error, "time to panic: execv: {errno}");
        BootError::Exec {
            path: PathBuf::from(init),
            source: errno,
        }
    })
}
