//! Router composition

use axum::{
    Router,
    http::{HeaderValue, header},
    middleware::from_fn_with_state,
};
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

use auth::middleware::{api_key_middleware, session_middleware};

use crate::routes;
use crate::state::AppState;

/// The full application: auth routes, storefront, `/api` and the layers
/// shared by all of them
pub fn create_app(state: AppState) -> Router {
    let auth_state = state.auth.clone();

    let api = routes::create_api_router(state.clone())
        .layer(from_fn_with_state(auth_state.clone(), api_key_middleware));

    Router::new()
        .merge(auth::routes::create_router(auth_state.clone()))
        .merge(routes::create_router(state))
        .nest("/api", api)
        .layer(from_fn_with_state(auth_state, session_middleware))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(TraceLayer::new_for_http())
}
