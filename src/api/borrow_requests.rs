//! Borrow request endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        borrow_request::{
            ApproveBorrowRequest, BorrowRequest, BorrowRequestDetails, BorrowRequestQuery,
            MarkAsTaken, SubmitBorrowRequest,
        },
        issue::IssueRecord,
    },
};

use super::AuthenticatedUser;

/// List borrow requests. Students only see their own.
#[utoipa::path(
    get,
    path = "/borrow-requests",
    tag = "borrow-requests",
    security(("bearer_auth" = [])),
    params(BorrowRequestQuery),
    responses(
        (status = 200, description = "Matching requests, newest first", body = Vec<BorrowRequestDetails>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_borrow_requests(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(mut query): Query<BorrowRequestQuery>,
) -> AppResult<Json<Vec<BorrowRequestDetails>>> {
    if !claims.is_librarian() {
        query.student_id = Some(claims.require_student()?);
    }

    let requests = state.services.lifecycle.list_borrow_requests(&query).await?;
    Ok(Json(requests))
}

/// Ask to borrow a book
#[utoipa::path(
    post,
    path = "/borrow-requests",
    tag = "borrow-requests",
    security(("bearer_auth" = [])),
    request_body = SubmitBorrowRequest,
    responses(
        (status = 201, description = "Request created", body = BorrowRequest),
        (status = 400, description = "A pending request for this book already exists"),
        (status = 403, description = "Only students can request books"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn submit_borrow_request(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<SubmitBorrowRequest>,
) -> AppResult<(StatusCode, Json<BorrowRequest>)> {
    let student_id = claims.require_student()?;

    let created = state
        .services
        .lifecycle
        .submit_borrow_request(student_id, request.book_id)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Approve a pending request and reserve a copy
#[utoipa::path(
    post,
    path = "/borrow-requests/{id}/approve",
    tag = "borrow-requests",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Borrow request ID")),
    request_body(content = ApproveBorrowRequest, description = "Optional planned due date"),
    responses(
        (status = 200, description = "Request approved", body = BorrowRequest),
        (status = 400, description = "No copy available, request not pending, or bad date"),
        (status = 404, description = "Borrow request not found")
    )
)]
pub async fn approve_borrow_request(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Option<Json<ApproveBorrowRequest>>,
) -> AppResult<Json<BorrowRequest>> {
    claims.require_librarian()?;

    let body = body.map(|Json(b)| b).unwrap_or_default();
    let request = state
        .services
        .lifecycle
        .approve_borrow_request(id, claims.sub, body.due_date.as_deref())
        .await?;
    Ok(Json(request))
}

/// Reject a pending or approved request
#[utoipa::path(
    post,
    path = "/borrow-requests/{id}/reject",
    tag = "borrow-requests",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Borrow request ID")),
    responses(
        (status = 200, description = "Request rejected", body = BorrowRequest),
        (status = 400, description = "The book was already picked up"),
        (status = 404, description = "Borrow request not found")
    )
)]
pub async fn reject_borrow_request(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BorrowRequest>> {
    claims.require_librarian()?;

    let request = state.services.lifecycle.reject_borrow_request(id).await?;
    Ok(Json(request))
}

/// Record the pickup of a reserved copy
#[utoipa::path(
    post,
    path = "/borrow-requests/{id}/take",
    tag = "borrow-requests",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Borrow request ID")),
    request_body(content = MarkAsTaken, description = "Optional return date"),
    responses(
        (status = 200, description = "Copy issued", body = IssueRecord),
        (status = 400, description = "Request not awaiting pickup or bad date"),
        (status = 404, description = "Borrow request not found")
    )
)]
pub async fn mark_as_taken(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Option<Json<MarkAsTaken>>,
) -> AppResult<Json<IssueRecord>> {
    claims.require_librarian()?;

    let body = body.map(|Json(b)| b).unwrap_or_default();
    let record = state
        .services
        .lifecycle
        .mark_as_taken(id, claims.sub, body.return_date.as_deref())
        .await?;
    Ok(Json(record))
}
