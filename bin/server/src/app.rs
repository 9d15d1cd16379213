//! Router assembly.

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{any, get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{self, AppState};
use crate::upstream;

/// Builds the gateway router around `app`.
///
/// Every route, including the ones in `app`, runs behind the session guard.
pub fn router(state: Arc<AppState>, app: Router<Arc<AppState>>) -> Router {
    let mut gateway = Router::new()
        .route("/api/login", get(auth::login_init))
        .route("/api/login/callback", get(auth::login_callback))
        .route("/api/logout", get(auth::logout))
        .route("/api/me", get(auth::me))
        .route("/login", post(auth::password_login));

    if state.upstream.is_some() {
        gateway = gateway.route("/api/core/{*path}", any(upstream::forward));
    }

    gateway
        .merge(app)
        .layer(from_fn_with_state(state.clone(), auth::session_guard))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
