//! Authentication endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{librarian::RegisterLibrarian, student::RegisterStudent},
    services::auth::{AuthResponse, Profile},
};

use super::{AuthenticatedUser, MaybeAuthenticatedUser};

/// Student login request
#[derive(Deserialize, ToSchema)]
pub struct StudentLoginRequest {
    pub email: String,
    pub password: String,
}

/// Librarian login request
#[derive(Deserialize, ToSchema)]
pub struct LibrarianLoginRequest {
    pub username: String,
    pub password: String,
}

/// Register a student account
#[utoipa::path(
    post,
    path = "/auth/students/register",
    tag = "auth",
    request_body = RegisterStudent,
    responses(
        (status = 201, description = "Student registered", body = AuthResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email or student ID already registered")
    )
)]
pub async fn register_student(
    State(state): State<crate::AppState>,
    Json(request): Json<RegisterStudent>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let response = state.services.auth.register_student(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Student login
#[utoipa::path(
    post,
    path = "/auth/students/login",
    tag = "auth",
    request_body = StudentLoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login_student(
    State(state): State<crate::AppState>,
    Json(request): Json<StudentLoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let response = state
        .services
        .auth
        .login_student(&request.email, &request.password)
        .await?;
    Ok(Json(response))
}

/// Register a librarian. Open while no librarian exists, admin-only afterwards.
#[utoipa::path(
    post,
    path = "/auth/librarians/register",
    tag = "auth",
    security((), ("bearer_auth" = [])),
    request_body = RegisterLibrarian,
    responses(
        (status = 201, description = "Librarian registered", body = AuthResponse),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Admin privileges required"),
        (status = 409, description = "Username or email already registered")
    )
)]
pub async fn register_librarian(
    State(state): State<crate::AppState>,
    MaybeAuthenticatedUser(claims): MaybeAuthenticatedUser,
    Json(request): Json<RegisterLibrarian>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let response = state
        .services
        .auth
        .register_librarian(request, claims.as_ref())
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Librarian login
#[utoipa::path(
    post,
    path = "/auth/librarians/login",
    tag = "auth",
    request_body = LibrarianLoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login_librarian(
    State(state): State<crate::AppState>,
    Json(request): Json<LibrarianLoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let response = state
        .services
        .auth
        .login_librarian(&request.username, &request.password)
        .await?;
    Ok(Json(response))
}

/// Get current user profile
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current profile", body = Profile),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn me(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Profile>> {
    let profile = state.services.auth.me(&claims).await?;
    Ok(Json(profile))
}
