//! API handlers for Libris REST endpoints

pub mod auth;
pub mod books;
pub mod borrow_requests;
pub mod donations;
pub mod health;
pub mod issues;
pub mod openapi;
pub mod penalties;
pub mod stats;
pub mod students;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    routing::{get, post},
    Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    typed_header::TypedHeaderRejectionReason,
    TypedHeader,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::AppError, models::auth::Claims, AppState};

/// Extractor for an authenticated actor from the bearer token
pub struct AuthenticatedUser(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match bearer_claims(parts, state).await? {
            Some(claims) => Ok(AuthenticatedUser(claims)),
            None => Err(AppError::Authentication("Missing authorization header".to_string())),
        }
    }
}

/// Like [`AuthenticatedUser`], but a request without an Authorization header
/// is let through anonymously. A header that is present must still be valid.
pub struct MaybeAuthenticatedUser(pub Option<Claims>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthenticatedUser(bearer_claims(parts, state).await?))
    }
}

async fn bearer_claims(parts: &mut Parts, state: &AppState) -> Result<Option<Claims>, AppError> {
    let TypedHeader(Authorization(bearer)) =
        match TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await {
            Ok(header) => header,
            Err(rejection) => {
                return match rejection.reason() {
                    TypedHeaderRejectionReason::Missing => Ok(None),
                    _ => Err(AppError::Authentication(
                        "Invalid authorization header format".to_string(),
                    )),
                }
            }
        };

    let claims = Claims::from_token(bearer.token(), &state.config.auth.jwt_secret)
        .map_err(|e| AppError::Authentication(e.to_string()))?;
    Ok(Some(claims))
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Authentication
        .route("/auth/students/register", post(auth::register_student))
        .route("/auth/students/login", post(auth::login_student))
        .route("/auth/librarians/register", post(auth::register_librarian))
        .route("/auth/librarians/login", post(auth::login_librarian))
        .route("/auth/me", get(auth::me))
        // Catalog
        .route("/books", get(books::list_books).post(books::create_book))
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        .route("/books/reconcile", post(books::reconcile_copies))
        // Borrow requests
        .route(
            "/borrow-requests",
            get(borrow_requests::list_borrow_requests).post(borrow_requests::submit_borrow_request),
        )
        .route("/borrow-requests/:id/approve", post(borrow_requests::approve_borrow_request))
        .route("/borrow-requests/:id/reject", post(borrow_requests::reject_borrow_request))
        .route("/borrow-requests/:id/take", post(borrow_requests::mark_as_taken))
        // Issues
        .route("/issues", get(issues::list_issues).post(issues::issue_book))
        .route("/issues/:id", get(issues::get_issue))
        .route("/issues/:id/return", post(issues::return_book))
        // Donations
        .route(
            "/donations",
            get(donations::list_donations).post(donations::submit_donation),
        )
        .route("/donations/:id/review", post(donations::review_donation))
        // Penalties
        .route("/penalties", get(penalties::compute_penalties))
        .route("/penalties/alerts", get(penalties::due_alerts))
        .route("/penalties/overdue", get(penalties::overdue_students))
        .route("/penalties/students", get(penalties::student_penalties))
        // Students
        .route(
            "/students/me",
            get(students::get_my_profile).put(students::update_my_profile),
        )
        .route("/students/me/history", get(students::my_history))
        // Statistics
        .route("/dashboard/stats", get(stats::get_stats))
        .with_state(state);

    // OpenAPI documentation
    let openapi = openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
