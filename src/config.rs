// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Packaging-time settings for /init, read from the initramfs.
// Author: Lukas Bower

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::kmsg::Sink;
use crate::printk;

/// Location of the optional settings file inside the initramfs.
pub const CONFIG_PATH: &str = "/etc/earlyinit.toml";

/// Paths and knobs fixed when the initramfs is assembled.
///
/// Boot-time choices (root device, init program, ...) come from the kernel
/// cmdline; this file only describes the initramfs layout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InitConfig {
    /// Kernel cmdline source.
    pub cmdline_path: PathBuf,
    /// Supported filesystem listing.
    pub filesystems_path: PathBuf,
    /// Kernel log device.
    pub kmsg_path: PathBuf,
    /// Pause after each kernel log line, in milliseconds.
    pub kmsg_delay_ms: u64,
    /// Mount point for the real root inside the initramfs.
    pub new_root: PathBuf,
    /// This program's own file, removed before switching root.
    pub self_path: PathBuf,
    /// Unlink [`self_path`](Self::self_path) before switching root.
    pub remove_self: bool,
    /// `zpool` tool used for pool-backed roots.
    pub zpool_binary: PathBuf,
    /// Pool cache handed to `zpool import -c` when present.
    pub zpool_cachefile: PathBuf,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            cmdline_path: PathBuf::from("/proc/cmdline"),
            filesystems_path: PathBuf::from("/proc/filesystems"),
            kmsg_path: PathBuf::from("/dev/kmsg"),
            kmsg_delay_ms: 50,
            new_root: PathBuf::from("/mnt"),
            self_path: PathBuf::from("/init"),
            remove_self: true,
            zpool_binary: PathBuf::from("/sbin/zpool"),
            zpool_cachefile: PathBuf::from("/etc/zfs/zpool.cache"),
        }
    }
}

/// Why the settings file was not used.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Settings file path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not valid TOML for [`InitConfig`].
    #[error("invalid {path}: {source}")]
    Parse {
        /// Settings file path.
        path: String,
        /// Deserialisation error.
        #[source]
        source: toml::de::Error,
    },
}

impl InitConfig {
    /// [`kmsg_delay_ms`](Self::kmsg_delay_ms) as a [`Duration`].
    pub fn kmsg_delay(&self) -> Duration {
        Duration::from_millis(self.kmsg_delay_ms)
    }

    /// Parse settings; absent keys keep their defaults.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Read `path`; `Ok(None)` when the file does not exist.
    pub fn read(path: &Path) -> Result<Option<Self>, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        Self::from_toml(&text)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })
    }

    /// Load settings, falling back to defaults with a warning on a bad file.
    pub fn load_or_default(path: &Path, sink: &dyn Sink) -> Self {
        match Self::read(path) {
            Ok(Some(cfg)) => {
                printk!(sink, Info, "Loaded settings from {}.", path.display());
                cfg
            }
            Ok(None) => Self::default(),
            Err(err) => {
                printk!(sink, Warn, "{err}; using built-in settings.");
                Self::default()
            }
        }
    }
}
