//! Borrow request model: a student's intent to borrow a book

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::enums::RequestStatus;

/// Borrow request from database
///
/// `pending → approved | rejected`, `approved → taken | rejected`, and an
/// approved request that is never taken is deleted once its grace period ends.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRequest {
    pub id: Uuid,
    pub student_id: Uuid,
    pub book_id: Uuid,
    pub status: RequestStatus,
    pub request_date: DateTime<Utc>,
    pub approved_date: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    /// Due date planned at approval, used when the pickup does not give one
    pub due_date: Option<DateTime<Utc>>,
    pub taken: bool,
    pub taken_date: Option<DateTime<Utc>>,
}

impl BorrowRequest {
    /// Approved and still holding a reserved copy
    pub fn is_awaiting_pickup(&self) -> bool {
        self.status == RequestStatus::Approved && !self.taken
    }
}

/// Borrow request joined with book and student labels for listings
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRequestDetails {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub request: BorrowRequest,
    pub book_title: Option<String>,
    pub book_author: Option<String>,
    pub student_name: Option<String>,
    pub student_roll_no: Option<String>,
}

/// Borrow request listing filter
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct BorrowRequestQuery {
    pub status: Option<RequestStatus>,
    pub student_id: Option<Uuid>,
    /// Only approved requests not yet picked up
    pub awaiting_pickup: Option<bool>,
}

/// Submit borrow request body
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBorrowRequest {
    pub book_id: Uuid,
}

/// Approve borrow request body
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApproveBorrowRequest {
    /// Planned due date (RFC 3339 or YYYY-MM-DD)
    pub due_date: Option<String>,
}

/// Mark-as-taken body
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkAsTaken {
    /// Return date (RFC 3339 or YYYY-MM-DD); defaults to the planned due date
    /// or to the standard loan length
    pub return_date: Option<String>,
}
