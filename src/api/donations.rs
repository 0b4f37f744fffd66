//! Donation endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::donation::{Donation, DonationQuery, DonationReview, ReviewDonation, SubmitDonation},
};

use super::AuthenticatedUser;

/// List donations. Students only see their own.
#[utoipa::path(
    get,
    path = "/donations",
    tag = "donations",
    security(("bearer_auth" = [])),
    params(DonationQuery),
    responses(
        (status = 200, description = "Donations, newest first", body = Vec<Donation>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_donations(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(mut query): Query<DonationQuery>,
) -> AppResult<Json<Vec<Donation>>> {
    if !claims.is_librarian() {
        query.student_id = Some(claims.require_student()?);
    }

    let donations = state.services.lifecycle.list_donations(&query).await?;
    Ok(Json(donations))
}

/// Offer a book to the library
#[utoipa::path(
    post,
    path = "/donations",
    tag = "donations",
    security(("bearer_auth" = [])),
    request_body = SubmitDonation,
    responses(
        (status = 201, description = "Donation submitted", body = Donation),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Only students can donate")
    )
)]
pub async fn submit_donation(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<SubmitDonation>,
) -> AppResult<(StatusCode, Json<Donation>)> {
    let student_id = claims.require_student()?;

    let donation = state
        .services
        .lifecycle
        .submit_donation(student_id, &request)
        .await?;
    Ok((StatusCode::CREATED, Json(donation)))
}

/// Approve or reject a pending donation
#[utoipa::path(
    post,
    path = "/donations/{id}/review",
    tag = "donations",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Donation ID")),
    request_body = ReviewDonation,
    responses(
        (status = 200, description = "Donation reviewed", body = DonationReview),
        (status = 404, description = "Donation not found"),
        (status = 409, description = "Donation already reviewed")
    )
)]
pub async fn review_donation(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<ReviewDonation>,
) -> AppResult<Json<DonationReview>> {
    claims.require_librarian()?;

    let review = state
        .services
        .lifecycle
        .review_donation(id, claims.sub, &request)
        .await?;
    Ok(Json(review))
}
