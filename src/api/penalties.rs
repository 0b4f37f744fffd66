//! Penalty and due-date monitoring endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::student::StudentPenaltySummary,
    services::penalty::{DueAlert, OverdueEntry, PenaltyReport},
};

use super::AuthenticatedUser;

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct PenaltyQuery {
    /// Restrict to one student. Students may only pass their own id.
    pub student_id: Option<Uuid>,
}

/// Recompute penalties as of now and return the totals
#[utoipa::path(
    get,
    path = "/penalties",
    tag = "penalties",
    security(("bearer_auth" = [])),
    params(PenaltyQuery),
    responses(
        (status = 200, description = "Recomputed totals", body = PenaltyReport),
        (status = 403, description = "Cannot access another student's penalties"),
        (status = 404, description = "Student not found")
    )
)]
pub async fn compute_penalties(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<PenaltyQuery>,
) -> AppResult<Json<PenaltyReport>> {
    let now = state.services.now();
    let penalty = &state.services.penalty;

    let report = if claims.is_librarian() {
        match query.student_id {
            Some(student_id) => penalty.recompute_student_penalty(student_id, now).await?,
            None => penalty.recompute_all(now).await?,
        }
    } else {
        let student_id = query.student_id.unwrap_or(claims.sub);
        claims.require_self_or_librarian(student_id)?;
        penalty.recompute_student_penalty(student_id, now).await?
    };

    Ok(Json(report))
}

/// Overdue, due-today and due-soon alerts for a student
#[utoipa::path(
    get,
    path = "/penalties/alerts",
    tag = "penalties",
    security(("bearer_auth" = [])),
    params(PenaltyQuery),
    responses(
        (status = 200, description = "Alerts for open loans", body = Vec<DueAlert>),
        (status = 400, description = "A librarian must name the student"),
        (status = 403, description = "Cannot access another student's alerts")
    )
)]
pub async fn due_alerts(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<PenaltyQuery>,
) -> AppResult<Json<Vec<DueAlert>>> {
    let student_id = match query.student_id {
        Some(id) => id,
        None if claims.is_librarian() => {
            return Err(crate::error::AppError::Validation(
                "student_id is required".to_string(),
            ))
        }
        None => claims.sub,
    };
    claims.require_self_or_librarian(student_id)?;

    let alerts = state
        .services
        .penalty
        .due_soon_alerts(student_id, state.services.now())
        .await?;
    Ok(Json(alerts))
}

/// Every overdue loan, most overdue first
#[utoipa::path(
    get,
    path = "/penalties/overdue",
    tag = "penalties",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Overdue loans", body = Vec<OverdueEntry>),
        (status = 403, description = "Librarian privileges required")
    )
)]
pub async fn overdue_students(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<OverdueEntry>>> {
    claims.require_librarian()?;

    let entries = state
        .services
        .penalty
        .overdue_students(state.services.now())
        .await?;
    Ok(Json(entries))
}

/// Cached penalty totals of every student
#[utoipa::path(
    get,
    path = "/penalties/students",
    tag = "penalties",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Students by total penalty", body = Vec<StudentPenaltySummary>),
        (status = 403, description = "Librarian privileges required")
    )
)]
pub async fn student_penalties(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<StudentPenaltySummary>>> {
    claims.require_librarian()?;

    let summaries = state.services.penalty.student_penalties().await?;
    Ok(Json(summaries))
}
