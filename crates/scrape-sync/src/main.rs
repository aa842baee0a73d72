use std::process::ExitCode;
use std::sync::Arc;

use scrape_sync::{
    format_error_chain, health, shutdown::install_shutdown_handler, telemetry, HealthState,
    KubeClient, KubeConfig, Reconciler, Settings, SyncService,
};

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if let Err(e) = telemetry::init(settings.log_format) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(EXIT_FAILURE);
    }

    let client = match KubeConfig::in_cluster()
        .and_then(|config| KubeClient::new(config, &settings.node_selector, &settings.secret_key))
    {
        Ok(client) => Arc::new(client),
        Err(e) => {
            log::error!("Configuration error: {}", format_error_chain(&e));
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    log::info!(
        "Syncing job into secret {} (key '{}') every {:?} using {}",
        settings.store_key(),
        settings.secret_key,
        settings.sync_interval,
        client.base_url()
    );

    let shutdown = install_shutdown_handler();
    let health_state = HealthState::new();

    let health_token = shutdown.child_token();
    let health_server = tokio::spawn(health::serve(
        settings.health_addr,
        health_state.clone(),
        health_token.clone(),
    ));

    let reconciler = Arc::new(Reconciler::new(
        client.clone(),
        client.clone(),
        settings.store_key(),
        &settings.fallback_namespace,
    ));
    let service = SyncService::new(
        reconciler,
        settings.sync_interval,
        health_state,
        shutdown.clone(),
    );

    service.start().await;
    let result = service.join().await;

    health_token.cancel();
    match health_server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("Health server stopped with an error: {}", e),
        Err(e) => log::warn!("Health server task failed: {}", e),
    }
    drop(service);
    drop(client);

    match result {
        Ok(()) => {
            log::info!("Shut down cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Sync loop terminated: {}", format_error_chain(&e));
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
