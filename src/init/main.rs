// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: /init entry point and host-side cmdline rehearsal tool.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! As PID 1 this binary boots the system and never looks at its arguments:
//! the kernel forwards stray cmdline words to init's argv. Run any other
//! way it is a small CLI for rehearsing a boot against a dry-run system.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{ensure, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::LevelFilter;

use earlyinit::boot::{Boot, BootOutcome};
use earlyinit::check::{run_check, CheckOptions, CmdlineSource};
use earlyinit::config::{InitConfig, CONFIG_PATH};
use earlyinit::kmsg::{KmsgSink, LogSink};
use earlyinit::pool::PoolImport;
use earlyinit::sys::LinuxSystem;

#[derive(Debug, Parser)]
#[command(author, version, about = "Initramfs /init: mount the real root and switch to it")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rehearse the boot sequence without mounting or executing anything.
    Check(CheckArgs),
    /// Perform the real boot; only meaningful as PID 1 inside an initramfs.
    Boot {
        /// Settings file inside the initramfs.
        #[arg(long, default_value = CONFIG_PATH)]
        config: PathBuf,
    },
}

#[derive(Debug, Parser)]
struct CheckArgs {
    /// Kernel cmdline to rehearse.
    #[arg(long, conflicts_with = "cmdline_file")]
    cmdline: Option<String>,
    /// Read the kernel cmdline from a file.
    #[arg(long, default_value = "/proc/cmdline")]
    cmdline_file: PathBuf,
    /// Supported filesystem listing.
    #[arg(long, default_value = "/proc/filesystems")]
    filesystems: PathBuf,
    /// Treat the init program as present and executable on the new root.
    #[arg(long, default_value_t = false)]
    init_present: bool,
    /// Device name present under /dev after the switch (repeatable).
    #[arg(long = "device")]
    devices: Vec<String>,
    /// Show debug output.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

#[cfg(feature = "zpool")]
fn pool_importer(settings: &InitConfig) -> Box<dyn PoolImport> {
    Box::new(earlyinit::pool::ZpoolCommand::new(
        &settings.zpool_binary,
        &settings.zpool_cachefile,
    ))
}

#[cfg(not(feature = "zpool"))]
fn pool_importer(_settings: &InitConfig) -> Box<dyn PoolImport> {
    Box::new(earlyinit::pool::NoPoolImport)
}

fn boot(config: &Path) -> ExitCode {
    let defaults = InitConfig::default();
    let early = KmsgSink::new(&defaults.kmsg_path, defaults.kmsg_delay());
    let settings = InitConfig::load_or_default(config, &early);
    let sink = KmsgSink::new(&settings.kmsg_path, settings.kmsg_delay());
    let pool = pool_importer(&settings);
    let mut sys = LinuxSystem::new();
    let outcome = Boot::new(&settings, &mut sys, &sink, pool.as_ref()).run();
    ExitCode::from(outcome.exit_code())
}

fn check(args: CheckArgs) -> Result<ExitCode> {
    init_logging(args.verbose);

    let cmdline = match args.cmdline {
        Some(line) => CmdlineSource::Text(line),
        None => {
            ensure!(
                args.cmdline_file.is_file(),
                "cmdline file {} not found",
                args.cmdline_file.display()
            );
            CmdlineSource::File(args.cmdline_file)
        }
    };

    let opts = CheckOptions {
        cmdline,
        filesystems_path: args.filesystems,
        init_present: args.init_present,
        devices: args.devices,
    };
    let report = run_check(&opts, &LogSink);

    for call in &report.calls {
        log::debug!("{call:?}");
    }
    match &report.outcome {
        BootOutcome::HandedOff(handoff) => println!(
            "init: would exec {} with argv [\"{}\"]",
            handoff.program.display(),
            handoff.argv0
        ),
        BootOutcome::Failed(err) => println!("init: boot would abort: {err}"),
    }
    Ok(ExitCode::from(report.outcome.exit_code()))
}

fn main() -> ExitCode {
    if nix::unistd::getpid().as_raw() == 1 {
        return boot(Path::new(CONFIG_PATH));
    }
    let cli = Cli::parse();
    match cli.command {
        Command::Boot { config } => boot(&config),
        Command::Check(args) => match check(args) {
            Ok(code) => code,
            Err(err) => {
                eprintln!("init: {err:#}");
                ExitCode::FAILURE
            }
        },
    }
}
