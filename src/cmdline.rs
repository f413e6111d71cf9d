// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Resolve kernel command-line parameters into a typed boot config.
// Author: Lukas Bower

//! Kernel command-line parser.
//!
//! The kernel hands `/init` a single line of `name=value` tokens. No quoting
//! or escaping exists: a value ends at the first whitespace. Each recognised
//! key is resolved from the first token that starts with `key=`, falling back
//! to the registry default.
//!
//! ```
//! use earlyinit::cmdline::{ParamSource, Registry};
//! use earlyinit::kmsg::RecordingSink;
//!
//! let sink = RecordingSink::new();
//! let cfg = Registry::base()
//!     .parse("root=/dev/sda1 rootfstype=ext4 quiet", &sink)
//!     .unwrap();
//! assert_eq!(cfg.root(), "/dev/sda1");
//! assert_eq!(cfg.init(), "/sbin/init");
//! assert_eq!(cfg.source(earlyinit::cmdline::INIT), Some(ParamSource::Default));
//! ```

use std::fmt;

use crate::error::BootError;
use crate::kmsg::Sink;
use crate::printk;

/// Root device or dataset to mount.
pub const ROOT: &str = "root=";
/// Filesystem type of the root.
pub const ROOTFSTYPE: &str = "rootfstype=";
/// `ro` or `rw`.
pub const MOUNTOPT: &str = "mountopt=";
/// Program to exec once the root is switched.
pub const INIT: &str = "init=";
/// Passed to init as its only argument.
pub const RUNLEVEL: &str = "runlevel=";
/// Device under /dev that takes over stdio.
pub const CONSOLE: &str = "console=";

const MISSING_PLACEHOLDER: &str = "<missing required param>";

/// Parameters every boot understands, in resolution order.
pub const BASE_PARAMS: [ParamSpec; 6] = [
    ParamSpec::required(ROOT),
    ParamSpec::required(ROOTFSTYPE),
    ParamSpec::optional(MOUNTOPT, "ro"),
    ParamSpec::optional(INIT, "/sbin/init"),
    ParamSpec::optional(RUNLEVEL, "3"),
    ParamSpec::optional(CONSOLE, "console"),
];

/// Description of one recognised parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    /// Matching key including the trailing `=`.
    pub key: &'static str,
    /// Parsing fails when a required key has no value.
    pub required: bool,
    /// Value used when the key is absent.
    pub default: Option<&'static str>,
}

impl ParamSpec {
    /// A key that must be given.
    pub const fn required(key: &'static str) -> Self {
        Self {
            key,
            required: true,
            default: None,
        }
    }

    /// A key that falls back to `default`.
    pub const fn optional(key: &'static str, default: &'static str) -> Self {
        Self {
            key,
            required: false,
            default: Some(default),
        }
    }
}

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSource {
    /// Taken from the registry.
    Default,
    /// Given on the kernel command line.
    Cmdline,
}

impl fmt::Display for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamSource::Default => f.write_str("default"),
            ParamSource::Cmdline => f.write_str("cmdline"),
        }
    }
}

/// A parameter with its final value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParam {
    /// The parameter this resolves.
    pub spec: ParamSpec,
    /// Resolved value; empty for optional keys without a default.
    pub value: String,
    /// Whether the value came from the cmdline.
    pub source: ParamSource,
}

/// Immutable result of a successful parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfig {
    params: Vec<ResolvedParam>,
}

impl ParsedConfig {
    /// Look up a parameter by key, including the trailing `=`.
    pub fn get(&self, key: &str) -> Option<&ResolvedParam> {
        self.params.iter().find(|p| p.spec.key == key)
    }

    /// Resolved value of `key`.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.get(key).map(|p| p.value.as_str())
    }

    /// Origin of the value of `key`.
    pub fn source(&self, key: &str) -> Option<ParamSource> {
        self.get(key).map(|p| p.source)
    }

    /// Resolved parameters in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedParam> {
        self.params.iter()
    }

    /// Value of `root=`.
    pub fn root(&self) -> &str {
        self.value(ROOT).unwrap_or_default()
    }

    /// Value of `rootfstype=`.
    pub fn rootfstype(&self) -> &str {
        self.value(ROOTFSTYPE).unwrap_or_default()
    }

    /// Value of `mountopt=`, unvalidated.
    pub fn mountopt(&self) -> &str {
        self.value(MOUNTOPT).unwrap_or_default()
    }

    /// Value of `init=`.
    pub fn init(&self) -> &str {
        self.value(INIT).unwrap_or_default()
    }

    /// Value of `runlevel=`.
    pub fn runlevel(&self) -> &str {
        self.value(RUNLEVEL).unwrap_or_default()
    }

    /// Value of `console=`, possibly the default.
    pub fn console(&self) -> &str {
        self.value(CONSOLE).unwrap_or_default()
    }

    /// The console device, only when it was named on the command line.
    pub fn requested_console(&self) -> Option<&str> {
        self.get(CONSOLE)
            .filter(|p| p.source == ParamSource::Cmdline)
            .map(|p| p.value.as_str())
    }
}

/// Ordered set of parameters the parser resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    specs: Vec<ParamSpec>,
}

impl Registry {
    /// Registry holding only [`BASE_PARAMS`].
    pub fn base() -> Self {
        Self {
            specs: BASE_PARAMS.to_vec(),
        }
    }

    /// Append extension parameters; keys already known are skipped.
    pub fn with(mut self, extra: &[ParamSpec]) -> Self {
        for spec in extra {
            if !self.specs.iter().any(|s| s.key == spec.key) {
                self.specs.push(*spec);
            }
        }
        self
    }

    /// Registered parameters in resolution order.
    pub fn specs(&self) -> &[ParamSpec] {
        &self.specs
    }

    /// Resolve every registered parameter against `cmdline`.
    ///
    /// All decisions are logged before a missing required parameter fails
    /// the parse, so the kernel log shows the complete picture.
    pub fn parse(&self, cmdline: &str, sink: &dyn Sink) -> Result<ParsedConfig, BootError> {
        let tokens: Vec<&str> = cmdline.split_ascii_whitespace().collect();
        let mut params = Vec::with_capacity(self.specs.len());
        let mut missing = Vec::new();

        for spec in &self.specs {
            let given = match tokens.iter().find_map(|t| t.strip_prefix(spec.key)) {
                Some("") => {
                    printk!(sink, Warn, "Kernel parameter {}: value missing.", spec.key);
                    None
                }
                other => other,
            };

            let (value, source) = match (given, spec.default) {
                (Some(v), _) => (v.to_string(), ParamSource::Cmdline),
                (None, Some(d)) => (d.to_string(), ParamSource::Default),
                (None, None) if spec.required => {
                    printk!(
                        sink,
                        Error,
                        "Using {}\"{}\" (source: {})",
                        spec.key,
                        MISSING_PLACEHOLDER,
                        ParamSource::Default
                    );
                    missing.push(spec.key);
                    continue;
                }
                (None, None) => (String::new(), ParamSource::Default),
            };

            printk!(sink, Info, "Using {}\"{}\" (source: {})", spec.key, value, source);
            params.push(ResolvedParam {
                spec: *spec,
                value,
                source,
            });
        }

        if !missing.is_empty() {
            printk!(
                sink,
                Error,
                "Aborting boot process: missing required kernel parameter(s)."
            );
            return Err(BootError::MissingRequired(missing));
        }
        Ok(ParsedConfig { params })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::base()
    }
}

/// Drop the newline the kernel appends to `/proc/cmdline`.
pub fn normalize(raw: &str) -> &str {
    raw.strip_suffix('\n').unwrap_or(raw)
}
