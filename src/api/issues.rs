//! Issue ledger endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::issue::{IssueBookDirect, IssueQuery, IssueRecord, IssueRecordDetails},
};

use super::{books::PaginatedResponse, AuthenticatedUser};

/// List issue records. Students only see their own.
#[utoipa::path(
    get,
    path = "/issues",
    tag = "issues",
    security(("bearer_auth" = [])),
    params(IssueQuery),
    responses(
        (status = 200, description = "Issue records, newest first", body = PaginatedResponse<IssueRecordDetails>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_issues(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(mut query): Query<IssueQuery>,
) -> AppResult<Json<PaginatedResponse<IssueRecordDetails>>> {
    if !claims.is_librarian() {
        query.student_id = Some(claims.require_student()?);
    }

    let (items, total) = state.services.lifecycle.list_issues(&query).await?;

    Ok(Json(PaginatedResponse {
        items,
        total,
        page: query.page(),
        per_page: query.per_page(),
    }))
}

/// Get one issue record
#[utoipa::path(
    get,
    path = "/issues/{id}",
    tag = "issues",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Issue record ID")),
    responses(
        (status = 200, description = "Issue record", body = IssueRecord),
        (status = 403, description = "Record belongs to another student"),
        (status = 404, description = "Issue record not found")
    )
)]
pub async fn get_issue(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<IssueRecord>> {
    let record = state.services.lifecycle.get_issue(id).await?;
    if !claims.is_librarian() && record.student_id != Some(claims.sub) {
        return Err(crate::error::AppError::Authorization(
            "Cannot access another student's records".to_string(),
        ));
    }
    Ok(Json(record))
}

/// Issue a copy over the counter
#[utoipa::path(
    post,
    path = "/issues",
    tag = "issues",
    security(("bearer_auth" = [])),
    request_body = IssueBookDirect,
    responses(
        (status = 201, description = "Copy issued", body = IssueRecord),
        (status = 400, description = "No copy available or bad date"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn issue_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<IssueBookDirect>,
) -> AppResult<(StatusCode, Json<IssueRecord>)> {
    claims.require_librarian()?;

    let record = state
        .services
        .lifecycle
        .issue_book_direct(&request, claims.sub)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Return an issued copy
#[utoipa::path(
    post,
    path = "/issues/{id}/return",
    tag = "issues",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Issue record ID")),
    responses(
        (status = 200, description = "Copy returned, penalty settled", body = IssueRecord),
        (status = 404, description = "Issue record not found or already returned")
    )
)]
pub async fn return_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<IssueRecord>> {
    claims.require_librarian()?;

    let record = state.services.lifecycle.return_book(id).await?;
    Ok(Json(record))
}
