// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Library root for the earlyinit initramfs /init.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! `earlyinit` runs as `/init` inside an initramfs: it reads the kernel
//! cmdline, mounts the real root filesystem and switches to it.

/// Fatal boot errors and exit codes.
pub mod error;

/// Kernel log sinks and the `printk!` macro.
pub mod kmsg;

/// Kernel cmdline parameter registry and parser.
pub mod cmdline;

/// Bounded reads from procfs.
pub mod procfs;

/// Root filesystem type availability.
pub mod fstype;

/// Packaging-time settings (`/etc/earlyinit.toml`).
pub mod config;

/// Syscall seam: real and dry-run systems.
pub mod sys;

/// Early mounts, root mount and init verification.
pub mod mount;

/// Storage pool import capability.
pub mod pool;

/// Switch-root sequencer and the final exec.
pub mod switch_root;

/// The complete boot sequence.
pub mod boot;

/// Host-side rehearsal of the boot sequence.
pub mod check;

pub use boot::{Boot, BootOutcome};
pub use error::BootError;
