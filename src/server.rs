use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};

use crate::{api, debug, error::SyncError, spotify::auth::AuthFlow, warning};

pub struct BoundListener {
    pub listener: TcpListener,
    pub port: u16,
}

/// Binds the callback listener on `primary_port`, trying `fallback_port`
/// once if that fails.
pub async fn bind_callback_listener(
    host: &str,
    primary_port: u16,
    fallback_port: u16,
) -> Result<BoundListener, SyncError> {
    let listener = match TcpListener::bind((host, primary_port)).await {
        Ok(listener) => listener,
        Err(e) => {
            warning!(
                "Port {} is not available ({}), trying {}",
                primary_port,
                e,
                fallback_port
            );
            TcpListener::bind((host, fallback_port))
                .await
                .map_err(SyncError::CallbackServer)?
        }
    };

    let port = listener
        .local_addr()
        .map_err(SyncError::CallbackServer)?
        .port();
    Ok(BoundListener { listener, port })
}

/// Serves `/callback` and `/health` until `shutdown` fires (or its sender is
/// dropped). In-flight responses are completed before the task ends.
pub fn serve_callback(
    listener: TcpListener,
    auth: Arc<AuthFlow>,
    shutdown: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    let app = Router::new()
        .route("/health", get(api::health))
        .route("/callback", get(api::callback))
        .layer(Extension(auth));

    tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.await;
            })
            .await;

        if let Err(e) = result {
            warning!("Callback server stopped with error: {}", e);
        }
        debug!("Callback listener closed");
    })
}
