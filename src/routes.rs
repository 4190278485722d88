use crate::handlers;
use crate::state::AppState;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::HeaderName::from_static("x-request-id"),
        ]);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/quizzes", get(handlers::list_quizzes))
        .route("/api/v1/quizzes/shuffle", post(handlers::shuffle))
        .route("/api/v1/quizzes/:id", get(handlers::get_quiz))
        .route("/api/v1/attempts", post(handlers::start_attempt))
        .route(
            "/api/v1/attempts/:id",
            get(handlers::get_attempt).delete(handlers::abandon_attempt),
        )
        .route("/api/v1/attempts/:id/select", post(handlers::select_option))
        .route("/api/v1/attempts/:id/text", post(handlers::set_text_answer))
        .route("/api/v1/attempts/:id/next", post(handlers::next_question))
        .route("/api/v1/attempts/:id/previous", post(handlers::previous_question))
        .route("/api/v1/attempts/:id/submit", post(handlers::submit_attempt))
        .route("/api/v1/attempts/:id/result", get(handlers::attempt_result))
        .route("/ws/attempts/:id", get(handlers::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
