// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, contest, participation, stats, submission, violation},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, contests, participations, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (pool, config, clock, caches).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let contest_routes = Router::new()
        .route("/", get(contest::list_contests))
        .route("/code/validate", post(contest::validate_code))
        .route("/{id}", get(contest::get_contest))
        .route("/{id}/questions", get(contest::contest_questions))
        .route("/{id}/join", post(participation::join))
        .route("/{id}/participation", get(participation::my_participation))
        .route("/{id}/stats", get(stats::contest_stats))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let participation_routes = Router::new()
        .route("/{id}/answers", put(submission::save_draft))
        .route("/{id}/submit", post(submission::submit))
        .route("/{id}/result", get(submission::get_result))
        .route("/{id}/violations", post(violation::record_violation))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/contests", post(contest::create_contest))
        .route("/contests/{id}/code", post(contest::issue_code))
        .route("/questions", post(admin::create_question))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/contests", contest_routes)
        .nest("/api/participations", participation_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
