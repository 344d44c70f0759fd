// src/routes.rs
use axum::{
    http::{header::CONTENT_TYPE, HeaderName, Method},
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::cors::CorsLayer;

use crate::auth::{VIEWER_ID_HEADER, VIEWER_ROLE_HEADER};
use crate::handlers::{self, AppState};

pub fn create_routes(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static(VIEWER_ID_HEADER),
            HeaderName::from_static(VIEWER_ROLE_HEADER),
        ])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/api/polls", get(handlers::list_polls).post(handlers::create_poll))
        .route(
            "/api/polls/{id}",
            get(handlers::get_poll)
                .put(handlers::update_poll)
                .delete(handlers::delete_poll),
        )
        .route("/api/polls/{id}/vote", post(handlers::vote))
        .layer(cors)
        .with_state(state)
}
