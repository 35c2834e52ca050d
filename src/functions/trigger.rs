use crate::error::DispatchError;
use crate::functions::dispatch::{DispatchReport, Dispatcher};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, Method, header},
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub dispatch_secret: Arc<str>,
}

fn authorize(headers: &HeaderMap, secret: &str) -> Result<(), DispatchError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Err(DispatchError::MissingCredential);
    };
    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(DispatchError::InvalidCredential)?;

    if bool::from(token.as_bytes().ct_eq(secret.as_bytes())) {
        Ok(())
    } else {
        Err(DispatchError::InvalidCredential)
    }
}

/// Scheduler-facing trigger. Accepts any method so non-POST callers get a
/// JSON 405 instead of an empty one.
pub async fn trigger_dispatch(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
) -> Result<Json<DispatchReport>, DispatchError> {
    if method != Method::POST {
        return Err(DispatchError::MethodNotAllowed);
    }
    if let Err(err) = authorize(&headers, &state.dispatch_secret) {
        tracing::warn!(error = %err, "trigger: rejected dispatch request");
        return Err(err);
    }

    // a dropped connection must not cancel a batch between send and status write
    let dispatcher = state.dispatcher.clone();
    let report = tokio::spawn(async move { dispatcher.run_batch().await })
        .await
        .map_err(|e| DispatchError::Internal(panic_message(e)))??;
    Ok(Json(report))
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "dispatch task panicked".to_string())
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
