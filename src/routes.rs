use crate::handlers;
use crate::state::AppState;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_credentials(true)
        .allow_origin([
            HeaderValue::from_static("http://localhost:5173"),
            HeaderValue::from_static("http://localhost:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::header::COOKIE,
            axum::http::header::SET_COOKIE,
            axum::http::HeaderName::from_static("x-request-id"),
            axum::http::HeaderName::from_static("x-forwarded-for"),
        ]);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/auth/login", post(handlers::login))
        .route("/api/v1/auth/logout", post(handlers::logout))
        .route("/api/v1/auth/me", get(handlers::me))
        .route("/api/v1/dashboard", get(handlers::dashboard))
        .route("/api/v1/exams/:exam_id/instructions", get(handlers::instructions))
        .route("/api/v1/exams/:exam_id/start", post(handlers::start_exam))
        .route("/api/v1/exams/:exam_id/results", get(handlers::results))
        .route(
            "/api/v1/sessions/:id",
            get(handlers::get_session).delete(handlers::abandon_session),
        )
        .route("/api/v1/sessions/:id/answers/:question_id", put(handlers::set_answer))
        .route(
            "/api/v1/sessions/:id/answers/:question_id/options",
            post(handlers::select_option),
        )
        .route("/api/v1/sessions/:id/flags/:question_id", post(handlers::toggle_flag))
        .route("/api/v1/sessions/:id/navigate", post(handlers::navigate))
        .route("/api/v1/sessions/:id/submit/request", post(handlers::request_submit))
        .route("/api/v1/sessions/:id/submit/cancel", post(handlers::cancel_submit))
        .route("/api/v1/sessions/:id/submit/confirm", post(handlers::confirm_submit))
        .route("/ws/sessions/:id", get(handlers::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
