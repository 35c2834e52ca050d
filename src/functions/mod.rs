pub mod clock;
pub mod dispatch;
pub mod format;
pub mod trigger;

pub use clock::*;
pub use dispatch::*;
pub use trigger::*;

use axum::{
    Router,
    routing::{any, get},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/dispatch", any(trigger_dispatch))
        .route("/health", get(health))
        .with_state(state)
}
