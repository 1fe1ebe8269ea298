// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-line surface

use brum_core::Config;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProxyModeArg {
    Reverse,
    Full,
}

/// Developer-workstation process supervisor with a model-tool server.
#[derive(Debug, Parser)]
#[command(name = "brum", version, about)]
pub struct Cli {
    /// Script names to start immediately, or an arbitrary command line.
    pub scripts: Vec<String>,

    /// Working directory (must contain a project manifest for script listing).
    #[arg(short = 'd', long = "dir", default_value = ".")]
    pub dir: PathBuf,

    /// Tool-server port.
    #[arg(short = 'p', long = "port", default_value_t = 7777)]
    pub port: u16,

    /// Disable the tool server entirely.
    #[arg(long = "no-mcp")]
    pub no_mcp: bool,

    /// Headless: run supervisor + tool server only.
    #[arg(long = "no-tui")]
    pub no_tui: bool,

    /// Hub mode over stdio.
    #[arg(long = "mcp", conflicts_with = "no_tui")]
    pub mcp: bool,

    /// Proxy mode.
    #[arg(long = "proxy-mode", value_enum, default_value = "reverse")]
    pub proxy_mode: ProxyModeArg,

    /// Proxy port (forward mode) or port base (reverse mode).
    #[arg(long = "proxy-port", default_value_t = 19888)]
    pub proxy_port: u16,

    /// Disable the proxy.
    #[arg(long = "no-proxy")]
    pub no_proxy: bool,

    /// Enable debug event surfaces.
    #[arg(long = "debug")]
    pub debug: bool,
}

impl Cli {
    /// Fold the flags into the runtime configuration value.
    pub fn to_config(&self) -> Config {
        Config {
            dir: self.dir.clone(),
            mcp_port: self.port,
            mcp_enabled: !self.no_mcp,
            proxy_port: self.proxy_port,
            proxy_enabled: !self.no_proxy,
            proxy_forward_mode: self.proxy_mode == ProxyModeArg::Full,
            debug: self.debug,
            ..Config::default()
        }
    }
}

#[cfg(test)]
#[path = "args_tests.rs"]
mod tests;
