// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: End-to-end boot sequence from the initramfs to the real init.
// Author: Lukas Bower

//! The boot sequence.
//!
//! One pass, no retries:
//!
//!  1. reserve the two working buffers;
//!  2. mount /proc, /dev, /sys;
//!  3. read and resolve the kernel cmdline;
//!  4. check `rootfstype` against /proc/filesystems;
//!  5. import the root pool for pool-backed filesystems (best effort);
//!  6. mount the root and make sure it carries the init program;
//!  7. switch root, redirect the console if asked, exec init.

use std::path::Path;

use crate::cmdline::{self, ParsedConfig, Registry};
use crate::config::InitConfig;
use crate::error::BootError;
use crate::fstype;
use crate::kmsg::Sink;
use crate::mount::{self, MountDescriptor};
use crate::pool::{PoolImport, PoolImportOutcome, PoolRequest};
use crate::printk;
use crate::procfs::ProcBuffer;
use crate::switch_root;
use crate::sys::{Handoff, System};

/// Terminal result of a boot attempt.
#[derive(Debug)]
pub enum BootOutcome {
    /// The init program replaced this process. Only a non-exec
    /// [`System`] lets the caller observe this.
    HandedOff(Handoff),
    /// The boot stopped; the process should exit with
    /// [`exit_code`](Self::exit_code).
    Failed(BootError),
}

impl BootOutcome {
    /// Process exit status; zero once handed off.
    pub fn exit_code(&self) -> u8 {
        match self {
            BootOutcome::HandedOff(_) => 0,
            BootOutcome::Failed(err) => err.exit_code(),
        }
    }
}

/// One boot attempt, wired to its syscall, logging and pool seams.
pub struct Boot<'a, S: System + ?Sized> {
    settings: &'a InitConfig,
    sys: &'a mut S,
    sink: &'a dyn Sink,
    pool: &'a dyn PoolImport,
    inline_cmdline: Option<&'a str>,
}

impl<'a, S: System + ?Sized> Boot<'a, S> {
    /// Wire a boot; nothing happens until [`run`](Self::run).
    pub fn new(
        settings: &'a InitConfig,
        sys: &'a mut S,
        sink: &'a dyn Sink,
        pool: &'a dyn PoolImport,
    ) -> Self {
        Self {
            settings,
            sys,
            sink,
            pool,
            inline_cmdline: None,
        }
    }

    /// Use `text` as the kernel cmdline instead of reading
    /// [`InitConfig::cmdline_path`].
    pub fn with_cmdline(mut self, text: &'a str) -> Self {
        self.inline_cmdline = Some(text);
        self
    }

    /// Run the sequence to the handoff or the first fatal error.
    pub fn run(self) -> BootOutcome {
        match self.try_run() {
            Ok(handoff) => BootOutcome::HandedOff(handoff),
            Err(err) => BootOutcome::Failed(err),
        }
    }

    fn try_run(self) -> Result<Handoff, BootError> {
        let Boot {
            settings,
            sys,
            sink,
            pool,
            inline_cmdline,
        } = self;

        printk!(
            sink,
            Info,
            "earlyinit, version {}: booting initramfs.",
            env!("CARGO_PKG_VERSION")
        );

        let (mut cmdline_buf, mut fs_buf) = match (ProcBuffer::reserve(), ProcBuffer::reserve()) {
            (Ok(a), Ok(b)) => (a, b),
            _ => {
                printk!(sink, Error, "Unable to allocate buffer memory.");
                return Err(BootError::OutOfMemory);
            }
        };

        mount::mount_early(sys, sink)?;

        let raw = match inline_cmdline {
            Some(text) => cmdline_buf.fill_with(text),
            None => read_logged(&mut cmdline_buf, &settings.cmdline_path, sink)?,
        };
        let line = cmdline::normalize(raw);
        printk!(sink, Info, "Kernel cmdline size: {}", line.len());
        printk!(sink, Info, "Kernel cmdline: \"{line}\"");
        let cfg = Registry::base().with(pool.parameters()).parse(line, sink)?;

        let listing = read_logged(&mut fs_buf, &settings.filesystems_path, sink)?;
        fstype::ensure_available(cfg.rootfstype(), listing, sink)?;

        if fstype::is_pool_backed(cfg.rootfstype()) {
            import_pool(pool, &cfg, sink);
        }

        let root = MountDescriptor::root(&cfg, &settings.new_root, sink);
        mount::mount_root(sys, sink, &root)?;
        mount::verify_init(sys, sink, &root, cfg.init())?;

        let remove_self = settings.remove_self.then_some(settings.self_path.as_path());
        switch_root::switch_root(sys, sink, &settings.new_root, remove_self)?;

        if let Some(console) = cfg.requested_console() {
            switch_root::redirect_console(sys, sink, console);
        }

        drop(cmdline_buf);
        drop(fs_buf);
        switch_root::exec_init(sys, sink, cfg.init(), cfg.runlevel())
    }
}

fn read_logged<'b>(buf: &'b mut ProcBuffer, path: &Path, sink: &dyn Sink) -> Result<&'b str, BootError> {
    buf.fill_from(path).map_err(|err| {
        printk!(sink, Error, "{err}");
        err
    })
}

fn import_pool(pool: &dyn PoolImport, cfg: &ParsedConfig, sink: &dyn Sink) {
    let request = PoolRequest::from_config(cfg, sink);
    match pool.import(&request, sink) {
        PoolImportOutcome::Imported => printk!(sink, Info, "Pool import succeeded."),
        PoolImportOutcome::NothingToImport => {
            printk!(sink, Info, "No pool imported; attempting root mount anyway.")
        }
        PoolImportOutcome::Failed(reason) => printk!(
            sink,
            Warn,
            "Pool import failed: {reason}; attempting root mount anyway."
        ),
    }
}
