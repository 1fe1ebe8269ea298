// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hub composition root (stdio mode)
//!
//! Discovery feeds the connection manager; the health monitor patrols
//! active peers; the hub server speaks the protocol on stdio. A failure to
//! create the discovery directory is fatal here (exit 1), unlike for
//! instances.

use crate::args::Cli;
use anyhow::Context;
use brum_bus::EventBus;
use brum_discovery::{Discovery, DiscoveryEvent};
use brum_mcp::{ConnectionManager, Connector, HealthMonitor, HubClient, HubServer, PeerClient};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let _log_guard = crate::logging::init_hub(cli.debug);
    let config = cli.to_config();
    let cancel = CancellationToken::new();

    let (discovery, mut events) = Discovery::start(
        brum_discovery::default_instances_dir(),
        None,
        config.discovery_stale_after,
        config.discovery_sweep_interval,
        &cancel,
    )
    .context("discovery directory unavailable")?;
    // Keep the watcher alive for the whole run.
    let _discovery = discovery;

    let call_timeout = config.call_timeout;
    let connector: Connector = Arc::new(move |descriptor| {
        let endpoint = format!("http://127.0.0.1:{}/mcp", descriptor.port);
        Box::pin(async move {
            let client = HubClient::connect(endpoint, call_timeout).await?;
            Ok(Arc::new(client) as Arc<dyn PeerClient>)
        })
    });
    let conn = ConnectionManager::start(connector, config.max_retries, &cancel);

    // Bridge discovery events into the owner task.
    {
        let conn = conn.clone();
        let cancel = cancel.child_token();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => return,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => return,
                    },
                };
                match event {
                    DiscoveryEvent::Appeared(descriptor) => {
                        conn.instance_appeared(descriptor).await;
                    }
                    DiscoveryEvent::Disappeared(id) => conn.instance_lost(id).await,
                }
            }
        });
    }

    HealthMonitor::new(
        conn.clone(),
        config.ping_interval,
        config.ping_timeout,
        config.ping_failure_budget,
    )
    .start(&cancel);

    let bus = EventBus::with_workers(config.bus_workers);
    let hub = HubServer::new(conn, bus, env!("CARGO_PKG_VERSION"));
    info!("hub starting on stdio");

    let stdio_cancel = cancel.child_token();
    let served = tokio::select! {
        result = hub.run_stdio(stdio_cancel) => result,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            return Ok(ExitCode::from(130));
        }
    };
    served.context("stdio transport failed")?;
    cancel.cancel();
    Ok(ExitCode::SUCCESS)
}
