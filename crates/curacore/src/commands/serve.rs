//! Serve command - run the HTTP API.

use std::net::{IpAddr, SocketAddr};

use anyhow::{Context as _, Result};
use clap::Args;
use curacore_server::{AppState, Server, ServerConfig};
use tracing::info;

use super::Context;
use crate::services::Services;

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind (overrides `[server] bind`)
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Port to listen on (overrides `[server] port`)
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let config = ctx.config();
    let mut server_config = ServerConfig::from_config(&config.server())
        .context("Invalid [server] configuration")?;
    let addr = SocketAddr::new(
        args.bind.unwrap_or(server_config.bind_address.ip()),
        args.port.unwrap_or(server_config.bind_address.port()),
    );
    server_config = server_config.with_bind_address(addr);

    let services = Services::build(config)?;
    let session_config = config.session();
    let (sessions, cache) = services.session_manager(session_config.retain_completed);
    let _cleanup = cache.spawn_cleanup_task();
    let _archive_cleanup = sessions.completed_archive().spawn_cleanup_task();

    info!(
        backend = services.invoker.backend_name(),
        retain_completed = session_config.retain_completed,
        "Triage services ready"
    );

    let state = AppState::new(
        server_config,
        sessions,
        services.summarizer(),
        services.answerer(),
        services.retriever.clone(),
    );
    Server::new(state).run().await?;
    Ok(())
}
