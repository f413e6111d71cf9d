// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Storage pool import capability consulted before a pool-backed root mount.
// Author: Lukas Bower

//! Pool import.
//!
//! A root on ZFS lives in a pool that has to be imported before
//! `mount -t zfs` can find it. The import is best effort: whatever happens
//! here, the root mount that follows decides whether the boot goes on.
//!
//! The binary is composed with either [`NoPoolImport`] or [`ZpoolCommand`];
//! the boot flow only ever sees the [`PoolImport`] trait.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::cmdline::{ParamSpec, ParsedConfig};
use crate::kmsg::Sink;
use crate::printk;

/// Pool to import by name.
pub const POOL_NAME: &str = "zpool_import_name=";
/// Pool to import by guid; wins over the name.
pub const POOL_GUID: &str = "zpool_import_guid=";
/// Name to import the pool under.
pub const POOL_NEWNAME: &str = "zpool_import_newname=";
/// `1` forces the import of a pool last used by another host.
pub const POOL_FORCE: &str = "zpool_import_force=";

/// Cmdline parameters recognised when a real importer is composed in.
pub const POOL_PARAMS: [ParamSpec; 4] = [
    ParamSpec::optional(POOL_NAME, ""),
    ParamSpec::optional(POOL_GUID, ""),
    ParamSpec::optional(POOL_NEWNAME, ""),
    ParamSpec::optional(POOL_FORCE, "0"),
];

/// How the pool to import is identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolKey {
    /// By pool name.
    Name(String),
    /// By numeric guid.
    Guid(String),
}

impl PoolKey {
    /// The name or guid as given.
    pub fn as_str(&self) -> &str {
        match self {
            PoolKey::Name(s) | PoolKey::Guid(s) => s,
        }
    }
}

/// What the cmdline asked to import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolRequest {
    /// Pool to import; `None` when the cmdline names none.
    pub key: Option<PoolKey>,
    /// Name to import under.
    pub new_name: Option<String>,
    /// Import even if the pool looks in use elsewhere.
    pub force: bool,
}

impl PoolRequest {
    /// Build from the parsed cmdline. A guid takes precedence over a name.
    pub fn from_config(cfg: &ParsedConfig, sink: &dyn Sink) -> Self {
        let non_empty = |key| cfg.value(key).filter(|v| !v.is_empty()).map(str::to_string);
        let name = non_empty(POOL_NAME);
        let guid = non_empty(POOL_GUID);
        let key = match (guid, name) {
            (Some(guid), Some(name)) => {
                printk!(
                    sink,
                    Info,
                    "zpool_import_guid given; ignoring zpool_import_name=\"{name}\"."
                );
                Some(PoolKey::Guid(guid))
            }
            (Some(guid), None) => Some(PoolKey::Guid(guid)),
            (None, Some(name)) => Some(PoolKey::Name(name)),
            (None, None) => None,
        };
        Self {
            key,
            new_name: non_empty(POOL_NEWNAME),
            force: cfg.value(POOL_FORCE) == Some("1"),
        }
    }
}

/// Result of an import attempt; never fatal to the boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolImportOutcome {
    /// The pool is imported.
    Imported,
    /// No pool was requested, or none matched.
    NothingToImport,
    /// The importer failed, with its reason.
    Failed(String),
}

/// Capability that makes a storage pool visible before the root mount.
pub trait PoolImport {
    /// Extra cmdline parameters this importer understands.
    fn parameters(&self) -> &'static [ParamSpec];

    /// Import the requested pool, logging progress to `sink`.
    fn import(&self, request: &PoolRequest, sink: &dyn Sink) -> PoolImportOutcome;
}

/// Importer for builds without pool support.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPoolImport;

impl PoolImport for NoPoolImport {
    fn parameters(&self) -> &'static [ParamSpec] {
        &[]
    }

    fn import(&self, _request: &PoolRequest, sink: &dyn Sink) -> PoolImportOutcome {
        printk!(sink, Info, "Pool import not available in this build.");
        PoolImportOutcome::NothingToImport
    }
}

/// Imports through the `zpool` tool shipped in the initramfs.
#[derive(Debug, Clone)]
pub struct ZpoolCommand {
    binary: PathBuf,
    cachefile: PathBuf,
    hostid: PathBuf,
}

impl ZpoolCommand {
    /// Importer running `binary`, using `cachefile` when it exists.
    pub fn new(binary: impl Into<PathBuf>, cachefile: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            cachefile: cachefile.into(),
            hostid: PathBuf::from("/etc/hostid"),
        }
    }

    /// Override where the host id file is looked for.
    pub fn with_hostid(mut self, hostid: impl Into<PathBuf>) -> Self {
        self.hostid = hostid.into();
        self
    }

    /// Arguments for `zpool`, datasets left unmounted (`-N`).
    pub fn import_args(&self, key: &PoolKey, request: &PoolRequest, use_cache: bool) -> Vec<String> {
        let mut args = vec!["import".to_string(), "-N".to_string()];
        if request.force {
            args.push("-f".into());
        }
        if use_cache {
            args.push("-c".into());
            args.push(self.cachefile.display().to_string());
        }
        args.push(key.as_str().to_string());
        if let Some(new_name) = &request.new_name {
            args.push(new_name.clone());
        }
        args
    }

    fn report_presence(&self, path: &Path, sink: &dyn Sink) -> bool {
        let present = path.exists();
        if present {
            printk!(sink, Info, "rootfstype=zfs: {} is present in initramfs.", path.display());
        } else {
            printk!(sink, Info, "rootfstype=zfs: {} not present in initramfs.", path.display());
        }
        present
    }
}

impl Default for ZpoolCommand {
    fn default() -> Self {
        Self::new("/sbin/zpool", "/etc/zfs/zpool.cache")
    }
}

fn is_no_such_pool(stderr: &str) -> bool {
    stderr.contains("no such pool") || stderr.contains("no pools available")
}

impl PoolImport for ZpoolCommand {
    fn parameters(&self) -> &'static [ParamSpec] {
        &POOL_PARAMS
    }

    fn import(&self, request: &PoolRequest, sink: &dyn Sink) -> PoolImportOutcome {
        let use_cache = self.report_presence(&self.cachefile, sink);
        self.report_presence(&self.hostid, sink);

        let Some(key) = &request.key else {
            printk!(sink, Info, "No zpool_import_name or zpool_import_guid given; nothing to import.");
            return PoolImportOutcome::NothingToImport;
        };

        let args = self.import_args(key, request, use_cache);
        printk!(sink, Info, "Attempting cmd: {} {}", self.binary.display(), args.join(" "));
        let output = match Command::new(&self.binary).args(&args).output() {
            Ok(output) => output,
            Err(err) => return PoolImportOutcome::Failed(format!("{}: {err}", self.binary.display())),
        };
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if output.status.success() {
            PoolImportOutcome::Imported
        } else if is_no_such_pool(&stderr) {
            PoolImportOutcome::NothingToImport
        } else {
            PoolImportOutcome::Failed(stderr)
        }
    }
}
