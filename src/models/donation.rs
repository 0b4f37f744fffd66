//! Donation model: a student's offer to give a book to the library

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{book::Book, enums::RequestStatus};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    pub id: Uuid,
    pub student_id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: String,
    pub status: RequestStatus,
    pub request_date: DateTime<Utc>,
    pub review_date: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
}

/// Submit donation body
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SubmitDonation {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Author is required"))]
    pub author: String,
    #[validate(length(min = 1, message = "ISBN is required"))]
    pub isbn: String,
    #[validate(length(min = 1, message = "Category is required"))]
    pub category: String,
}

/// Librarian decision on a donation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

impl From<ReviewDecision> for RequestStatus {
    fn from(decision: ReviewDecision) -> Self {
        match decision {
            ReviewDecision::Approved => RequestStatus::Approved,
            ReviewDecision::Rejected => RequestStatus::Rejected,
        }
    }
}

/// Review donation body
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ReviewDonation {
    pub decision: ReviewDecision,
    /// Copies to add to the catalog when approved (default 1)
    #[validate(range(min = 1, max = 1000, message = "Copies must be between 1 and 1000"))]
    pub copies: Option<i32>,
}

/// Outcome of a donation review
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DonationReview {
    pub donation: Donation,
    /// Catalog entry created or extended by an approval
    pub book: Option<Book>,
}

/// Donation listing filter
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct DonationQuery {
    pub status: Option<RequestStatus>,
    pub student_id: Option<Uuid>,
}
