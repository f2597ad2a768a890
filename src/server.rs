/// Accept Loop (spec §4.G): bind the AudioSocket TCP listener, spawn
/// an isolated Call Session per connection, and never let one
/// session's failure take down the listener.
///
/// Grounded on `spawn_tcp_receiver`/`handle_tcp_client` in
/// `transport_tcp.rs` (per-connection spawn, continue-on-accept-error)
/// and the original's `listen`/`Handle` split in
/// `packages/audiosocket/main.go`.
use crate::config::BridgeConfig;
use crate::session::{ self, SessionDeps };
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{ info, warn };

/// Bind and run the accept loop until a fatal listener error occurs.
pub async fn run(config: Arc<BridgeConfig>, deps: Arc<SessionDeps>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.listen).await?;
    info!(addr = %config.listen, "AudioSocket listener started");

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let config = config.clone();
                let deps = deps.clone();
                tokio::spawn(async move {
                    let outcome = session::run(stream, config, deps).await;
                    info!(peer = %peer, ?outcome, "session finished");
                });
            }
            Err(e) => {
                warn!(error = %e, "accept error");
            }
        }
    }
}
