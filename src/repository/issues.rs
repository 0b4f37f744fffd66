//! Issue ledger: issue records
//!
//! `overdue` is never stored. Filters and counts on it compare the due date
//! against the start of the `as_of` UTC day.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::{start_of_day, unique_violation};
use crate::{
    error::{AppError, AppResult},
    models::{
        enums::IssueStatus,
        issue::{IssueQuery, IssueRecord, IssueRecordDetails, NewIssueRecord},
    },
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IssuesRepository: Send + Sync {
    /// Fails with `Conflict` if the borrow request already has a record
    async fn create(&self, record: &NewIssueRecord) -> AppResult<IssueRecord>;

    async fn get(&self, id: Uuid) -> AppResult<IssueRecord>;

    /// `issued → returned`; `None` if the record is not currently issued
    async fn mark_returned(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<Option<IssueRecord>>;

    /// Paged listing with the total match count. `issued` means open and not
    /// yet overdue.
    async fn list(
        &self,
        query: &IssueQuery,
        as_of: DateTime<Utc>,
    ) -> AppResult<(Vec<IssueRecordDetails>, i64)>;

    /// Open records, optionally for one student
    async fn list_open(&self, student_id: Option<Uuid>) -> AppResult<Vec<IssueRecord>>;

    /// Full borrowing history of a student, newest first
    async fn list_by_student(&self, student_id: Uuid) -> AppResult<Vec<IssueRecordDetails>>;

    async fn set_penalty(&self, id: Uuid, penalty: i64) -> AppResult<()>;

    async fn count_by_status(&self, status: IssueStatus, as_of: DateTime<Utc>) -> AppResult<i64>;

    async fn count_open_for_book(&self, book_id: Uuid) -> AppResult<i64>;

    /// Latest records in a stored status: issued by issue date, returned by
    /// return date
    async fn recent(&self, status: IssueStatus, limit: i64) -> AppResult<Vec<IssueRecordDetails>>;
}

#[derive(Clone)]
pub struct PgIssuesRepository {
    pool: Pool<Postgres>,
}

impl PgIssuesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

const STATUS_FILTER: &str = r#"
    ($1::text IS NULL
     OR ($1 = 'returned' AND ir.status = 'returned')
     OR ($1 = 'issued' AND ir.status = 'issued' AND ir.due_date >= $2)
     OR ($1 = 'overdue' AND ir.status = 'issued' AND ir.due_date < $2))
"#;

#[async_trait]
impl IssuesRepository for PgIssuesRepository {
    async fn create(&self, record: &NewIssueRecord) -> AppResult<IssueRecord> {
        sqlx::query_as::<_, IssueRecord>(
            r#"
            INSERT INTO issue_records (id, book_id, student_id, student_name, student_roll_no,
                                       student_dept, student_year, issue_date, due_date,
                                       status, penalty, librarian_id, borrow_request_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'issued', 0, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(record.book_id)
        .bind(record.student_id)
        .bind(&record.student_name)
        .bind(&record.student_roll_no)
        .bind(&record.student_dept)
        .bind(record.student_year)
        .bind(record.issue_date)
        .bind(record.due_date)
        .bind(record.librarian_id)
        .bind(record.borrow_request_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, "This borrow request has already been issued"))
    }

    async fn get(&self, id: Uuid) -> AppResult<IssueRecord> {
        sqlx::query_as::<_, IssueRecord>("SELECT * FROM issue_records WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Issue record not found".to_string()))
    }

    async fn mark_returned(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<Option<IssueRecord>> {
        let record = sqlx::query_as::<_, IssueRecord>(
            r#"
            UPDATE issue_records
            SET status = 'returned', return_date = $2
            WHERE id = $1 AND status = 'issued'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn list(
        &self,
        query: &IssueQuery,
        as_of: DateTime<Utc>,
    ) -> AppResult<(Vec<IssueRecordDetails>, i64)> {
        let day_start = start_of_day(as_of);
        let filter = format!(
            r#"
            WHERE {}
              AND ($3::uuid IS NULL OR ir.student_id = $3)
              AND ($4::uuid IS NULL OR ir.book_id = $4)
            "#,
            STATUS_FILTER
        );

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM issue_records ir {}",
            filter
        ))
        .bind(query.status)
        .bind(day_start)
        .bind(query.student_id)
        .bind(query.book_id)
        .fetch_one(&self.pool)
        .await?;

        let records = sqlx::query_as::<_, IssueRecordDetails>(&format!(
            r#"
            SELECT ir.*, b.title AS book_title, b.author AS book_author
            FROM issue_records ir
            LEFT JOIN books b ON b.id = ir.book_id
            {}
            ORDER BY ir.issue_date DESC
            LIMIT $5 OFFSET $6
            "#,
            filter
        ))
        .bind(query.status)
        .bind(day_start)
        .bind(query.student_id)
        .bind(query.book_id)
        .bind(query.per_page())
        .bind(query.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((records, total))
    }

    async fn list_open(&self, student_id: Option<Uuid>) -> AppResult<Vec<IssueRecord>> {
        let records = sqlx::query_as::<_, IssueRecord>(
            r#"
            SELECT * FROM issue_records
            WHERE status = 'issued' AND ($1::uuid IS NULL OR student_id = $1)
            ORDER BY due_date
            "#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn list_by_student(&self, student_id: Uuid) -> AppResult<Vec<IssueRecordDetails>> {
        let records = sqlx::query_as::<_, IssueRecordDetails>(
            r#"
            SELECT ir.*, b.title AS book_title, b.author AS book_author
            FROM issue_records ir
            LEFT JOIN books b ON b.id = ir.book_id
            WHERE ir.student_id = $1
            ORDER BY ir.issue_date DESC
            "#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn set_penalty(&self, id: Uuid, penalty: i64) -> AppResult<()> {
        sqlx::query("UPDATE issue_records SET penalty = $2 WHERE id = $1")
            .bind(id)
            .bind(penalty)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_by_status(&self, status: IssueStatus, as_of: DateTime<Utc>) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM issue_records ir WHERE {}",
            STATUS_FILTER
        ))
        .bind(status)
        .bind(start_of_day(as_of))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_open_for_book(&self, book_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM issue_records WHERE book_id = $1 AND status = 'issued'",
        )
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn recent(&self, status: IssueStatus, limit: i64) -> AppResult<Vec<IssueRecordDetails>> {
        let records = sqlx::query_as::<_, IssueRecordDetails>(
            r#"
            SELECT ir.*, b.title AS book_title, b.author AS book_author
            FROM issue_records ir
            LEFT JOIN books b ON b.id = ir.book_id
            WHERE ir.status = $1
            ORDER BY COALESCE(ir.return_date, ir.issue_date) DESC
            LIMIT $2
            "#,
        )
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
