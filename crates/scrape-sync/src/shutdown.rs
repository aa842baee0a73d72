use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Installs a handler for SIGTERM and SIGINT.
///
/// The returned token is cancelled when either signal arrives. If a signal
/// stream cannot be registered, the other one still triggers shutdown.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(stream) => Some(stream),
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                None
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(stream) => Some(stream),
            Err(e) => {
                log::error!("Failed to install SIGINT handler: {}", e);
                None
            }
        };

        if sigterm.is_none() && sigint.is_none() {
            return;
        }

        tokio::select! {
            Some(_) = recv(&mut sigterm) => {
                log::info!("Received SIGTERM, initiating graceful shutdown");
            }
            Some(_) = recv(&mut sigint) => {
                log::info!("Received SIGINT, initiating graceful shutdown");
            }
            else => return,
        }

        trigger.cancel();
    });

    token
}

async fn recv(stream: &mut Option<tokio::signal::unix::Signal>) -> Option<()> {
    match stream {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}
