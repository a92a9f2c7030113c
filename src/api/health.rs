use std::sync::Arc;

use axum::{Extension, response::Json};
use serde_json::{Value, json};

use crate::spotify::auth::{AuthFlow, AuthPhase};

pub async fn health(Extension(auth): Extension<Arc<AuthFlow>>) -> Json<Value> {
    let phase = match auth.phase().await {
        AuthPhase::Idle => "idle",
        AuthPhase::AwaitingCallback => "awaiting_callback",
        AuthPhase::Exchanging => "exchanging",
        AuthPhase::Authenticated => "authenticated",
        AuthPhase::Failed(_) => "failed",
    };

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "authorization": phase,
        "connected": auth.session().is_connected(),
    }))
}
