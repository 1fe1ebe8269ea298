// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance composition root
//!
//! Construction order follows the dependency order: bus → log store →
//! supervisor → proxy → tool server → discovery registration. Teardown runs
//! in reverse under a bounded shutdown deadline.

use crate::args::Cli;
use anyhow::Context;
use brum_bus::EventBus;
use brum_core::InstanceDescriptor;
use brum_logs::LogStore;
use brum_mcp::{build_instance_core, read_scripts, McpHttpServer};
use brum_proxy::ProxyServer;
use brum_supervisor::{LogSink, Supervisor};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    crate::logging::init_instance(cli.debug);
    let config = cli.to_config();
    let dir = config
        .dir
        .canonicalize()
        .with_context(|| format!("working directory {} not found", config.dir.display()))?;
    let project_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());

    let cancel = CancellationToken::new();
    let bus = EventBus::with_workers(config.bus_workers);
    let logs = LogStore::new(&config, bus.clone());

    let sink_logs = Arc::clone(&logs);
    let sink: LogSink = Arc::new(move |id, name, line, is_error| {
        sink_logs.add(id.clone(), name, line, is_error);
    });
    let mcp_env = if config.mcp_enabled {
        vec![
            (
                "BRUMMER_MCP_URL".to_string(),
                format!("http://127.0.0.1:{}/mcp", config.mcp_port),
            ),
            ("BRUMMER_MCP_PORT".to_string(), config.mcp_port.to_string()),
        ]
    } else {
        Vec::new()
    };
    let supervisor = Supervisor::new(
        bus.clone(),
        sink,
        mcp_env,
        config.stop_grace,
        config.max_line_bytes,
    );

    let proxy = if config.proxy_enabled {
        match ProxyServer::start(&config, bus.clone(), &cancel).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "proxy disabled: startup failed");
                None
            }
        }
    } else {
        None
    };

    // Tool server; a bind failure here is a startup error (exit 1).
    let mut registration = None;
    if config.mcp_enabled {
        let core = build_instance_core(
            &project_name,
            env!("CARGO_PKG_VERSION"),
            dir.clone(),
            bus.clone(),
            supervisor.clone(),
            Arc::clone(&logs),
            proxy.clone(),
            config.session_idle_timeout,
            &cancel,
        );
        let server = McpHttpServer::start(core, config.mcp_port, &cancel)
            .await
            .context("tool server failed to start")?;

        // Discoverable instance: log and continue standalone on failure.
        let descriptor =
            InstanceDescriptor::new(&project_name, dir.clone(), server.addr.port());
        match brum_discovery::Registration::start(
            brum_discovery::default_instances_dir(),
            descriptor,
            config.discovery_heartbeat,
            &cancel,
        ) {
            Ok(reg) => registration = Some(reg),
            Err(e) => warn!(error = %e, "discovery registration failed, running standalone"),
        }
    }

    start_initial_scripts(&cli, &dir, &supervisor);

    // Wait for a termination signal.
    let interrupted = wait_for_shutdown().await;
    info!(interrupted, "shutting down");

    // Teardown in reverse order, bounded by the shutdown deadline.
    let deadline = config.shutdown_deadline;
    let shutdown = async {
        supervisor.stop_all().await;
        if let Some(registration) = &registration {
            registration.unregister();
        }
        cancel.cancel();
    };
    if tokio::time::timeout(deadline, shutdown).await.is_err() {
        error!("shutdown deadline exceeded, exiting anyway");
        cancel.cancel();
        if let Some(registration) = &registration {
            registration.unregister();
        }
    }

    Ok(if interrupted { ExitCode::from(130) } else { ExitCode::SUCCESS })
}

/// Start positional scripts; non-script positionals run as one command.
fn start_initial_scripts(cli: &Cli, dir: &std::path::Path, supervisor: &Supervisor) {
    if cli.scripts.is_empty() {
        return;
    }
    let scripts = read_scripts(dir).unwrap_or_default();
    let all_known = cli.scripts.iter().all(|s| scripts.contains_key(s));
    if all_known {
        for name in &cli.scripts {
            if let Some(command) = scripts.get(name) {
                if let Err(e) = supervisor.start(name, command, dir.to_path_buf()) {
                    error!(script = %name, error = %e, "script failed to start");
                }
            }
        }
    } else {
        // Arbitrary command line.
        let command = cli.scripts.join(" ");
        if let Err(e) = supervisor.start("command", &command, dir.to_path_buf()) {
            error!(%command, error = %e, "command failed to start");
        }
    }
}

/// Resolve on SIGINT (true) or SIGTERM (false).
async fn wait_for_shutdown() -> bool {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            error!(error = %e, "signal handler failed; waiting on ctrl-c only");
            let _ = tokio::signal::ctrl_c().await;
            return true;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => true,
        _ = term.recv() => false,
    }
}
