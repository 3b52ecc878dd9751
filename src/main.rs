//! BessZone - serve the site behind a remote kill switch
//!
//! `besszone serve` runs the site with the edge gate in front of every page.
//! `besszone watch` polls a running site the way a loaded page would and
//! prints the redirect target once the switch flips on.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use besszone::cli::{watch_config_from_args, Cli, Command, ServeArgs, ServerConfig, WatchArgs};
use besszone::killswitch::FlagStatusManager;
use besszone::server::{self, AppState};
use besszone::watcher::{StatusEndpointClient, WatchEvent, WatchHandle};

/// Initializes logging, filtered by `BESSZONE_LOG` (default `besszone=info`)
fn init_tracing() {
    let filter = EnvFilter::try_from_env("BESSZONE_LOG")
        .unwrap_or_else(|_| EnvFilter::new("besszone=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_args(&args)?;

    let manager = Arc::new(FlagStatusManager::new(config.manager.clone()));
    tracing::info!(
        source = manager.source_url(),
        cache_secs = config.manager.cache_duration.as_secs(),
        "kill switch configured"
    );

    let state = AppState::from_config(manager, &config);
    server::serve(config.bind, state).await?;

    Ok(())
}

async fn watch(args: WatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (site, config) = watch_config_from_args(&args)?;

    let client = StatusEndpointClient::for_site(&site);
    tracing::info!(
        url = client.status_url(),
        interval_secs = config.interval.as_secs(),
        "watching kill switch"
    );

    let mut handle = WatchHandle::spawn(Arc::new(client), config);

    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(WatchEvent::Redirect { target }) => {
                    println!("{}", target);
                    return Ok(());
                }
                Some(WatchEvent::Checked { enabled }) => {
                    tracing::info!(enabled, "kill switch checked");
                }
                None => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Watch(args) => watch(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {}", error);
            ExitCode::FAILURE
        }
    }
}
