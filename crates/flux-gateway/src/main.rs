//! Gateway client demo
//!
//! Run with:
//! ```bash
//! FLUX_TOKEN="Bot ..." cargo run -p flux-gateway
//! ```
//!
//! Configuration is loaded from environment variables. Connects, logs lifecycle
//! notifications and incoming messages, and shuts down on Ctrl-C.

use flux_common::{try_init_tracing, ClientConfig};
use flux_gateway::{EventKind, GatewayEvent, LifecycleEvent, SessionManager};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize tracing
    if let Err(e) = try_init_tracing() {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run().await {
        error!(error = %e, "Gateway client failed");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = ClientConfig::from_env().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!(
        url = %config.gateway.url,
        bot = config.credential.is_bot(),
        ignored_events = ?config.gateway.ignored_events,
        "Configuration loaded"
    );

    let gateway = SessionManager::spawn(config.credential, config.gateway)?;
    let mut lifecycle = gateway.subscribe();

    gateway.events().on(EventKind::MessageCreate, |event| {
        if let GatewayEvent::MessageCreate(message) = event {
            info!(
                channel_id = %message.channel_id,
                author = %message.author.username,
                content = %message.content,
                "Message received"
            );
        }
        Ok(())
    });

    gateway.connect()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                gateway.shutdown();
                break;
            }
            event = lifecycle.recv() => match event {
                Ok(LifecycleEvent::Fatal { code, reason }) => {
                    anyhow::bail!("gateway terminated (code {code:?}): {reason}");
                }
                Ok(event) => info!(event = ?event, "Lifecycle"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Lifecycle receiver lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    gateway
        .wait_for_state(flux_gateway::ConnectionState::is_terminal)
        .await?;
    Ok(())
}
