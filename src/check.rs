// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Host-side rehearsal of the boot sequence against a dry-run system.
// Author: Lukas Bower

//! Boot rehearsal for packagers.
//!
//! Runs the real boot sequence against [`DryRunSystem`], so a cmdline can
//! be validated on the build host before it is baked into a bootloader
//! entry. Nothing is mounted and nothing is executed.

use std::path::{Path, PathBuf};

use crate::boot::{Boot, BootOutcome};
use crate::cmdline::{self, Registry};
use crate::config::InitConfig;
use crate::kmsg::{RecordingSink, Sink};
use crate::mount;
use crate::pool::NoPoolImport;
use crate::procfs::ProcBuffer;
use crate::sys::{DryRunSystem, SysCall};

/// Where the rehearsed cmdline comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmdlineSource {
    /// A cmdline given inline, as typed into a bootloader entry.
    Text(String),
    /// A file holding the cmdline, such as a saved `/proc/cmdline`.
    File(PathBuf),
}

/// Inputs for one rehearsal.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// The cmdline to resolve.
    pub cmdline: CmdlineSource,
    /// Supported filesystem listing, in `/proc/filesystems` format.
    pub filesystems_path: PathBuf,
    /// Pretend the configured init program exists on the new root.
    pub init_present: bool,
    /// Device names present under /dev once the root is switched.
    pub devices: Vec<String>,
}

/// What the rehearsal would have done.
#[derive(Debug)]
pub struct CheckReport {
    /// How the boot ended.
    pub outcome: BootOutcome,
    /// Every operation issued, in order.
    pub calls: Vec<SysCall>,
}

/// Peek at the cmdline to learn which init path the rehearsal must provide.
fn planned_init(source: &CmdlineSource) -> Option<String> {
    let mut buf = ProcBuffer::reserve().ok()?;
    let raw = match source {
        CmdlineSource::Text(text) => buf.fill_with(text),
        CmdlineSource::File(path) => buf.fill_from(path).ok()?,
    };
    let quiet = RecordingSink::new();
    let cfg = Registry::base().parse(cmdline::normalize(raw), &quiet).ok()?;
    Some(cfg.init().to_string())
}

/// Run the boot sequence against a [`DryRunSystem`] and report the result.
pub fn run_check(opts: &CheckOptions, sink: &dyn Sink) -> CheckReport {
    let mut settings = InitConfig {
        filesystems_path: opts.filesystems_path.clone(),
        ..InitConfig::default()
    };
    if let CmdlineSource::File(path) = &opts.cmdline {
        settings.cmdline_path = path.clone();
    }

    let mut sys = DryRunSystem::new();
    if opts.init_present {
        if let Some(init) = planned_init(&opts.cmdline) {
            sys = sys.with_executable(mount::init_under(&settings.new_root, &init));
        }
    }
    for dev in &opts.devices {
        sys = sys.with_file(Path::new(mount::DEV.target).join(dev));
    }

    let boot = Boot::new(&settings, &mut sys, sink, &NoPoolImport);
    let outcome = match &opts.cmdline {
        CmdlineSource::Text(text) => boot.with_cmdline(text).run(),
        CmdlineSource::File(_) => boot.run(),
    };
    CheckReport {
        outcome,
        calls: sys.calls().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EX_UNAVAILABLE, EX_USAGE};
    use std::fs;
    use tempfile::tempdir;

    fn options(dir: &Path, line: &str) -> CheckOptions {
        let cmdline_path = dir.join("cmdline");
        let filesystems_path = dir.join("filesystems");
        fs::write(&cmdline_path, line).unwrap();
        fs::write(&filesystems_path, "nodev\tproc\n\text4\n").unwrap();
        CheckOptions {
            cmdline: CmdlineSource::File(cmdline_path),
            filesystems_path,
            init_present: true,
            devices: Vec::new(),
        }
    }

    #[test]
    fn rehearsal_reaches_exec() {
        let dir = tempdir().unwrap();
        let opts = options(dir.path(), "root=/dev/sda1 rootfstype=ext4 init=/bin/sh\n");
        let sink = RecordingSink::new();
        let report = run_check(&opts, &sink);
        assert_eq!(report.outcome.exit_code(), 0);
        assert!(matches!(report.calls.last(), Some(SysCall::Exec { .. })));
    }

    #[test]
    fn rehearsal_without_init_is_unavailable() {
        let dir = tempdir().unwrap();
        let mut opts = options(dir.path(), "root=/dev/sda1 rootfstype=ext4");
        opts.init_present = false;
        let report = run_check(&opts, &RecordingSink::new());
        assert_eq!(report.outcome.exit_code(), EX_UNAVAILABLE);
    }

    #[test]
    fn rehearsal_reports_usage_errors() {
        let dir = tempdir().unwrap();
        let opts = options(dir.path(), "rootfstype=ext4");
        let report = run_check(&opts, &RecordingSink::new());
        assert_eq!(report.outcome.exit_code(), EX_USAGE);
        assert!(!report
            .calls
            .iter()
            .any(|c| matches!(c, SysCall::Mount { target, .. } if target == Path::new("/mnt"))));
    }

    #[test]
    fn inline_cmdline_needs_no_file() {
        let dir = tempdir().unwrap();
        let mut opts = options(dir.path(), "root=/dev/wrong rootfstype=xfs\n");
        opts.cmdline = CmdlineSource::Text("root=/dev/vda2 rootfstype=ext4 init=/bin/sh 5".into());
        let sink = RecordingSink::new();

        let report = run_check(&opts, &sink);

        assert_eq!(report.outcome.exit_code(), 0);
        assert!(report.calls.contains(&SysCall::Mount {
            source: "/dev/vda2".into(),
            target: "/mnt".into(),
            fstype: "ext4".into(),
            mode: crate::mount::MountMode::ReadOnly,
        }));
        assert!(matches!(
            report.calls.last(),
            Some(SysCall::Exec { program, argv0 }) if program == Path::new("/bin/sh") && argv0 == "3"
        ));
        assert!(sink.contains("Kernel cmdline: \"root=/dev/vda2 rootfstype=ext4 init=/bin/sh 5\""));
    }

    #[test]
    fn inline_cmdline_reports_usage_errors() {
        let dir = tempdir().unwrap();
        let mut opts = options(dir.path(), "");
        opts.cmdline = CmdlineSource::Text("root=/dev/vda2".into());
        let report = run_check(&opts, &RecordingSink::new());
        assert_eq!(report.outcome.exit_code(), EX_USAGE);
    }
}
