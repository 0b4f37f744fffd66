//! Statistics endpoints

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{error::AppResult, models::issue::IssueRecordDetails};

use super::AuthenticatedUser;

/// Librarian dashboard
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub books: BookStats,
    pub loans: LoanStats,
    pub pending: PendingStats,
    /// Registered students
    pub students: i64,
    /// Latest open loans
    pub recent_issues: Vec<IssueRecordDetails>,
    /// Latest returns
    pub recent_returns: Vec<IssueRecordDetails>,
}

/// Catalog figures over active books
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookStats {
    pub titles: i64,
    pub total_copies: i64,
    pub available_copies: i64,
}

#[derive(Serialize, ToSchema)]
pub struct LoanStats {
    /// Open loans not yet overdue
    pub issued: i64,
    pub overdue: i64,
    pub returned: i64,
}

/// Work waiting for a librarian
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PendingStats {
    pub borrow_requests: i64,
    pub donations: i64,
}

/// Get dashboard statistics
#[utoipa::path(
    get,
    path = "/dashboard/stats",
    tag = "stats",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Dashboard statistics", body = StatsResponse),
        (status = 403, description = "Librarian privileges required")
    )
)]
pub async fn get_stats(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<StatsResponse>> {
    claims.require_librarian()?;

    let stats = state.services.stats.get_stats().await?;
    Ok(Json(stats))
}
