mod backend;
mod consts;
mod distribution;
mod error;
mod handlers;
mod identity;
mod model;
mod purchase;
mod router;
mod session;
mod state;
mod units;
mod wallet;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use crate::backend::RestBackend;
use crate::model::Address;
use crate::wallet::{ChainSpec, JsonRpcWallet};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let backend_url = std::env::var("BACKEND_URL").unwrap_or_else(|_| consts::DEFAULT_BACKEND_URL.into());
    let backend_key = std::env::var("BACKEND_KEY").unwrap_or_default();
    let wallet_rpc_url =
        std::env::var("WALLET_RPC_URL").unwrap_or_else(|_| consts::DEFAULT_WALLET_RPC_URL.into());
    let company_wallet: Address = std::env::var("COMPANY_WALLET")
        .unwrap_or_else(|_| consts::DEFAULT_COMPANY_WALLET.into())
        .parse()
        .expect("COMPANY_WALLET must be a 0x-prefixed address");
    let host = std::env::var("HOST").unwrap_or_else(|_| consts::DEFAULT_HOST.into());
    let port = std::env::var("PORT").unwrap_or_else(|_| consts::DEFAULT_PORT.into());
    let bind_addr = format!("{host}:{port}");

    tracing::info!("Backend endpoint: {backend_url}");
    tracing::info!("Wallet provider endpoint: {wallet_rpc_url}");
    tracing::info!("Company wallet: {company_wallet}");
    tracing::info!("Listening on {bind_addr}");

    let backend = Arc::new(RestBackend::new(backend_url, backend_key));
    let wallet = Arc::new(JsonRpcWallet::new(wallet_rpc_url));
    wallet.spawn_watcher();

    let app_state = state::AppState::new(
        backend.clone(),
        wallet.clone(),
        company_wallet,
        ChainSpec::bnb_smart_chain(),
    );
    session::spawn_wallet_watcher(
        Arc::clone(&app_state.session),
        app_state.backend.clone(),
        app_state.wallet.clone(),
    );

    let app = router::build_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Ctrl+C received, shutting down"),
        _ = terminate => tracing::info!("SIGTERM received, shutting down"),
    }
}
