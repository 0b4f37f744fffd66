//! Issue record: the authoritative record of a physical loan

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::enums::IssueStatus;

/// Issue record from database.
///
/// The student fields are a snapshot taken when the copy changed hands, so
/// later profile edits do not rewrite loan history.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueRecord {
    pub id: Uuid,
    pub book_id: Uuid,
    /// Registered student, absent for a direct issue to an unknown roll number
    pub student_id: Option<Uuid>,
    pub student_name: String,
    pub student_roll_no: String,
    pub student_dept: Option<String>,
    pub student_year: Option<i32>,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    /// Stored status: `issued` or `returned`
    pub status: IssueStatus,
    /// Penalty as of the last recompute
    pub penalty: i64,
    pub librarian_id: Uuid,
    /// Request this loan fulfilled, if it went through the request workflow
    pub borrow_request_id: Option<Uuid>,
}

impl IssueRecord {
    pub fn is_open(&self) -> bool {
        self.status == IssueStatus::Issued
    }

    /// Status with `overdue` derived from the due date
    pub fn effective_status(&self, as_of: DateTime<Utc>) -> IssueStatus {
        if self.is_open() && self.due_date.date_naive() < as_of.date_naive() {
            IssueStatus::Overdue
        } else {
            self.status
        }
    }
}

/// Issue record joined with its book for listings
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueRecordDetails {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub record: IssueRecord,
    pub book_title: Option<String>,
    pub book_author: Option<String>,
}

/// Values for a new issue record
#[derive(Debug, Clone)]
pub struct NewIssueRecord {
    pub book_id: Uuid,
    pub student_id: Option<Uuid>,
    pub student_name: String,
    pub student_roll_no: String,
    pub student_dept: Option<String>,
    pub student_year: Option<i32>,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub librarian_id: Uuid,
    pub borrow_request_id: Option<Uuid>,
}

/// Direct issue body (no borrow request)
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueBookDirect {
    pub book_id: Uuid,
    #[validate(length(min = 1, message = "Student name is required"))]
    pub student_name: String,
    #[validate(length(min = 1, message = "Student ID is required"))]
    pub student_roll_no: String,
    /// RFC 3339 or YYYY-MM-DD
    pub due_date: String,
}

/// Issue record listing parameters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct IssueQuery {
    /// `issued`, `returned`, or `overdue` (open records past their due date)
    pub status: Option<IssueStatus>,
    pub student_id: Option<Uuid>,
    pub book_id: Option<Uuid>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl IssueQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(10).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.per_page()
    }
}
