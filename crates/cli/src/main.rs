// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! brum — package-script supervisor with a model-tool server
//!
//! Runs package scripts, captures their output, and exposes the running
//! environment over the tool protocol: an HTTP instance server per project,
//! or a stdio hub that discovers and proxies to peer instances.

mod app;
mod args;
mod hub;
mod logging;

use args::Cli;
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    // clap exits with code 2 on bad arguments.
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("brum: failed to start runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let outcome = if cli.mcp {
        runtime.block_on(hub::run(cli))
    } else {
        runtime.block_on(app::run(cli))
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("brum: {e:#}");
            ExitCode::from(1)
        }
    }
}
