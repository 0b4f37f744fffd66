//! Student self-service endpoints

use axum::{extract::State, Json};

use crate::{
    error::AppResult,
    models::student::{Student, UpdateStudentProfile},
    services::students::BorrowingHistory,
};

use super::AuthenticatedUser;

/// Get own student profile
#[utoipa::path(
    get,
    path = "/students/me",
    tag = "students",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Student profile", body = Student),
        (status = 403, description = "Not a student")
    )
)]
pub async fn get_my_profile(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Student>> {
    let student_id = claims.require_student()?;

    let student = state.services.students.get_profile(student_id).await?;
    Ok(Json(student))
}

/// Update own student profile
#[utoipa::path(
    put,
    path = "/students/me",
    tag = "students",
    security(("bearer_auth" = [])),
    request_body = UpdateStudentProfile,
    responses(
        (status = 200, description = "Profile updated", body = Student),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn update_my_profile(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(update): Json<UpdateStudentProfile>,
) -> AppResult<Json<Student>> {
    let student_id = claims.require_student()?;

    let student = state
        .services
        .students
        .update_profile(student_id, update)
        .await?;
    Ok(Json(student))
}

/// Own borrowing history
#[utoipa::path(
    get,
    path = "/students/me/history",
    tag = "students",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current and past loans", body = BorrowingHistory),
        (status = 403, description = "Not a student")
    )
)]
pub async fn my_history(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<BorrowingHistory>> {
    let student_id = claims.require_student()?;

    let history = state.services.students.history(student_id).await?;
    Ok(Json(history))
}
