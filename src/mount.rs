// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Early virtual filesystem mounts, the root mount and its rollback.
// Author: Lukas Bower

//! Mount orchestration.
//!
//! Every mount here is fatal on failure. The one recovery path is the
//! root mount itself: if the new root carries no runnable init it is
//! unmounted again before the boot aborts. The virtual filesystems are
//! left in place on every abort path.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::cmdline::ParsedConfig;
use crate::error::BootError;
use crate::kmsg::Sink;
use crate::printk;
use crate::sys::{Access, System};

/// Read-write state of the root mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountMode {
    /// `MS_RDONLY`.
    ReadOnly,
    /// No flags.
    ReadWrite,
}

impl MountMode {
    /// `ro` and `rw` map directly; anything else degrades to read-only.
    pub fn from_mountopt(opt: &str, sink: &dyn Sink) -> Self {
        match opt {
            "ro" => MountMode::ReadOnly,
            "rw" => MountMode::ReadWrite,
            other => {
                printk!(
                    sink,
                    Warn,
                    "mountopt=\"{other}\": invalid parameter value; defaulting to \"ro\"."
                );
                MountMode::ReadOnly
            }
        }
    }

    fn as_opt(self) -> &'static str {
        match self {
            MountMode::ReadOnly => "ro",
            MountMode::ReadWrite => "rw",
        }
    }
}

/// Everything `mount(2)` needs for one mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountDescriptor {
    /// Device, dataset or pseudo-filesystem name.
    pub source: String,
    /// Mount point.
    pub target: PathBuf,
    /// Filesystem type handed to the kernel.
    pub fstype: String,
    /// Read-only or read-write.
    pub mode: MountMode,
}

impl MountDescriptor {
    /// Descriptor for an arbitrary mount.
    pub fn new(
        source: impl Into<String>,
        target: impl Into<PathBuf>,
        fstype: impl Into<String>,
        mode: MountMode,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            fstype: fstype.into(),
            mode,
        }
    }

    /// The real root, mounted at `new_root` as the cmdline describes.
    pub fn root(cfg: &ParsedConfig, new_root: &Path, sink: &dyn Sink) -> Self {
        Self::new(
            cfg.root(),
            new_root,
            cfg.rootfstype(),
            MountMode::from_mountopt(cfg.mountopt(), sink),
        )
    }
}

impl fmt::Display for MountDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mount -t {} -o {} {} {}",
            self.fstype,
            self.mode.as_opt(),
            self.source,
            self.target.display()
        )
    }
}

/// A kernel virtual filesystem mounted before anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuxMount {
    /// Pseudo-device name.
    pub source: &'static str,
    /// Absolute mount point in the initramfs.
    pub target: &'static str,
    /// Kernel filesystem type.
    pub fstype: &'static str,
}

impl AuxMount {
    /// Read-write descriptor for this mount.
    pub fn descriptor(&self) -> MountDescriptor {
        MountDescriptor::new(self.source, self.target, self.fstype, MountMode::ReadWrite)
    }
}

/// procfs on /proc.
pub const PROC: AuxMount = AuxMount {
    source: "proc",
    target: "/proc",
    fstype: "proc",
};

/// devtmpfs on /dev.
pub const DEV: AuxMount = AuxMount {
    source: "devtmpfs",
    target: "/dev",
    fstype: "devtmpfs",
};

/// sysfs on /sys.
pub const SYS: AuxMount = AuxMount {
    source: "sysfs",
    target: "/sys",
    fstype: "sysfs",
};

/// Mount order: some device nodes link into /proc.
pub const EARLY_MOUNTS: [AuxMount; 3] = [PROC, DEV, SYS];

fn mount_logged<S: System + ?Sized>(
    sys: &mut S,
    sink: &dyn Sink,
    desc: &MountDescriptor,
) -> Result<(), BootError> {
    printk!(sink, Info, "Attempting cmd: {desc}");
    match sys.mount(desc) {
        Ok(()) => {
            printk!(sink, Info, "{} mounted successfully on {}.", desc.source, desc.target.display());
            Ok(())
        }
        Err(errno) => {
            printk!(sink, Error, "time to panic: mount: {errno}");
            Err(BootError::syscall("mount", &desc.target, errno))
        }
    }
}

/// Mount /proc, /dev and /sys in that order.
pub fn mount_early<S: System + ?Sized>(sys: &mut S, sink: &dyn Sink) -> Result<(), BootError> {
    for aux in EARLY_MOUNTS {
        mount_logged(sys, sink, &aux.descriptor())?;
    }
    Ok(())
}

/// Mount the real root; failure is fatal.
pub fn mount_root<S: System + ?Sized>(
    sys: &mut S,
    sink: &dyn Sink,
    root: &MountDescriptor,
) -> Result<(), BootError> {
    mount_logged(sys, sink, root)
}

/// Path of `init` as seen from outside the freshly mounted root.
pub fn init_under(new_root: &Path, init: &str) -> PathBuf {
    new_root.join(init.trim_start_matches('/'))
}

/// Require an executable `init` on the mounted root, unmounting it if absent.
pub fn verify_init<S: System + ?Sized>(
    sys: &mut S,
    sink: &dyn Sink,
    root: &MountDescriptor,
    init: &str,
) -> Result<PathBuf, BootError> {
    let program = init_under(&root.target, init);
    match sys.access(&program, Access::Execute) {
        Ok(()) => {
            printk!(sink, Info, "Init program {} is present and executable.", program.display());
            Ok(program)
        }
        Err(errno) => {
            printk!(sink, Error, "access X_OK: {errno}");
            printk!(
                sink,
                Error,
                "The init program {} is not present or not executable.",
                program.display()
            );
            printk!(sink, Error, "Aborting boot process: no init program.");
            printk!(sink, Info, "Unmounting {}.", root.source);
            match sys.unmount(&root.target) {
                Ok(()) => printk!(sink, Info, "Successfully unmounted {}.", root.source),
                Err(errno) => {
                    printk!(sink, Error, "umount: {errno}");
                    printk!(sink, Error, "Failed to umount {}.", root.source);
                }
            }
            Err(BootError::InitNotExecutable(program))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmsg::RecordingSink;
    use crate::sys::{DryRunSystem, SysCall};
    use nix::errno::Errno;

    #[test]
    fn mountopt_resolution() {
        let sink = RecordingSink::new();
        assert_eq!(MountMode::from_mountopt("ro", &sink), MountMode::ReadOnly);
        assert_eq!(MountMode::from_mountopt("rw", &sink), MountMode::ReadWrite);
        assert!(sink.lines().is_empty());
        assert_eq!(MountMode::from_mountopt("bogus", &sink), MountMode::ReadOnly);
        assert!(sink.contains("mountopt=\"bogus\": invalid parameter value"));
    }

    #[test]
    fn early_mounts_run_in_order() {
        let sink = RecordingSink::new();
        let mut sys = DryRunSystem::new();
        mount_early(&mut sys, &sink).unwrap();
        let targets: Vec<_> = sys.calls().iter().map(|c| c.path().to_path_buf()).collect();
        assert_eq!(
            targets,
            vec![PathBuf::from("/proc"), PathBuf::from("/dev"), PathBuf::from("/sys")]
        );
    }

    #[test]
    fn early_mount_failure_stops_the_sequence() {
        let sink = RecordingSink::new();
        let mut sys = DryRunSystem::new().fail("mount", "/dev", Errno::ENODEV);
        let err = mount_early(&mut sys, &sink).unwrap_err();
        assert!(matches!(err, BootError::Syscall { op: "mount", .. }));
        assert!(!sys.mounted("/sys"));
        assert!(sink.contains("time to panic: mount"));
    }

    #[test]
    fn missing_init_unmounts_root_only() {
        let sink = RecordingSink::new();
        let mut sys = DryRunSystem::new();
        let root = MountDescriptor::new("/dev/sda1", "/mnt", "ext4", MountMode::ReadOnly);
        let err = verify_init(&mut sys, &sink, &root, "/sbin/init").unwrap_err();
        assert!(matches!(err, BootError::InitNotExecutable(ref p) if p == Path::new("/mnt/sbin/init")));
        assert_eq!(
            sys.calls().last(),
            Some(&SysCall::Unmount(PathBuf::from("/mnt")))
        );
        assert!(sink.contains("Successfully unmounted /dev/sda1."));
    }

    #[test]
    fn failed_rollback_is_logged_not_escalated() {
        let sink = RecordingSink::new();
        let mut sys = DryRunSystem::new().fail("umount", "/mnt", Errno::EBUSY);
        let root = MountDescriptor::new("/dev/sda1", "/mnt", "ext4", MountMode::ReadOnly);
        let err = verify_init(&mut sys, &sink, &root, "/sbin/init").unwrap_err();
        assert!(matches!(err, BootError::InitNotExecutable(_)));
        assert!(sink.contains("Failed to umount /dev/sda1."));
    }

    #[test]
    fn present_init_is_resolved_under_new_root() {
        let sink = RecordingSink::new();
        let mut sys = DryRunSystem::new().with_executable("/mnt/usr/lib/systemd/systemd");
        let root = MountDescriptor::new("/dev/sda1", "/mnt", "ext4", MountMode::ReadWrite);
        let program = verify_init(&mut sys, &sink, &root, "/usr/lib/systemd/systemd").unwrap();
        assert_eq!(program, PathBuf::from("/mnt/usr/lib/systemd/systemd"));
        assert!(!sys.unmounted("/mnt"));
    }

    #[test]
    fn descriptor_renders_as_mount_command() {
        let root = MountDescriptor::new("/dev/sda1", "/mnt", "ext4", MountMode::ReadOnly);
        assert_eq!(root.to_string(), "mount -t ext4 -o ro /dev/sda1 /mnt");
    }
}
