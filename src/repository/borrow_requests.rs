//! Request ledger: borrow requests
//!
//! Every transition is a conditional update on the expected prior state.
//! `None` from a transition method means another caller got there first (or
//! the request was never in that state); the caller decides which error that is.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        borrow_request::{BorrowRequest, BorrowRequestDetails, BorrowRequestQuery},
        enums::RequestStatus,
    },
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BorrowRequestsRepository: Send + Sync {
    /// Fails with `DuplicateRequest` if the student already has a pending
    /// request for the book
    async fn create_pending(
        &self,
        student_id: Uuid,
        book_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowRequest>;

    async fn get(&self, id: Uuid) -> AppResult<BorrowRequest>;

    /// `pending → approved`
    async fn approve(
        &self,
        id: Uuid,
        librarian_id: Uuid,
        due_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<Option<BorrowRequest>>;

    /// `from → rejected`, only while untaken
    async fn reject(&self, id: Uuid, from: RequestStatus) -> AppResult<Option<BorrowRequest>>;

    /// `approved, untaken → taken`
    async fn mark_taken(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<Option<BorrowRequest>>;

    /// Undo `mark_taken` when the issue record could not be written
    async fn release_taken(&self, id: Uuid) -> AppResult<()>;

    async fn list(&self, query: &BorrowRequestQuery) -> AppResult<Vec<BorrowRequestDetails>>;

    /// Approved, untaken requests approved before `cutoff`
    async fn list_expired(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<BorrowRequest>>;

    /// Delete the request only if it is still approved, untaken and approved
    /// before `cutoff`
    async fn delete_if_untaken(&self, id: Uuid, cutoff: DateTime<Utc>) -> AppResult<bool>;

    async fn count_by_status(&self, status: RequestStatus) -> AppResult<i64>;

    /// Approved, untaken requests holding a copy of the book
    async fn count_reserved_for_book(&self, book_id: Uuid) -> AppResult<i64>;
}

#[derive(Clone)]
pub struct PgBorrowRequestsRepository {
    pool: Pool<Postgres>,
}

impl PgBorrowRequestsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BorrowRequestsRepository for PgBorrowRequestsRepository {
    async fn create_pending(
        &self,
        student_id: Uuid,
        book_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowRequest> {
        sqlx::query_as::<_, BorrowRequest>(
            r#"
            INSERT INTO borrow_requests (id, student_id, book_id, status, request_date, taken)
            VALUES ($1, $2, $3, 'pending', $4, FALSE)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(book_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::DuplicateRequest(
                "You already have a pending request for this book".to_string(),
            ),
            _ => AppError::Database(e),
        })
    }

    async fn get(&self, id: Uuid) -> AppResult<BorrowRequest> {
        sqlx::query_as::<_, BorrowRequest>("SELECT * FROM borrow_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Borrow request not found".to_string()))
    }

    async fn approve(
        &self,
        id: Uuid,
        librarian_id: Uuid,
        due_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<Option<BorrowRequest>> {
        let request = sqlx::query_as::<_, BorrowRequest>(
            r#"
            UPDATE borrow_requests
            SET status = 'approved', approved_date = $2, approved_by = $3, due_date = $4
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(librarian_id)
        .bind(due_date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(request)
    }

    async fn reject(&self, id: Uuid, from: RequestStatus) -> AppResult<Option<BorrowRequest>> {
        let request = sqlx::query_as::<_, BorrowRequest>(
            r#"
            UPDATE borrow_requests
            SET status = 'rejected'
            WHERE id = $1 AND status = $2 AND taken = FALSE
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(from)
        .fetch_optional(&self.pool)
        .await?;
        Ok(request)
    }

    async fn mark_taken(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<Option<BorrowRequest>> {
        let request = sqlx::query_as::<_, BorrowRequest>(
            r#"
            UPDATE borrow_requests
            SET taken = TRUE, taken_date = $2
            WHERE id = $1 AND status = 'approved' AND taken = FALSE
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(request)
    }

    async fn release_taken(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE borrow_requests SET taken = FALSE, taken_date = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, query: &BorrowRequestQuery) -> AppResult<Vec<BorrowRequestDetails>> {
        let requests = sqlx::query_as::<_, BorrowRequestDetails>(
            r#"
            SELECT br.*,
                   b.title AS book_title,
                   b.author AS book_author,
                   s.name AS student_name,
                   s.student_id AS student_roll_no
            FROM borrow_requests br
            LEFT JOIN books b ON b.id = br.book_id
            LEFT JOIN students s ON s.id = br.student_id
            WHERE ($1::text IS NULL OR br.status = $1)
              AND ($2::uuid IS NULL OR br.student_id = $2)
              AND ($3::boolean IS NULL OR $3 = FALSE
                   OR (br.status = 'approved' AND br.taken = FALSE))
            ORDER BY br.request_date DESC
            "#,
        )
        .bind(query.status)
        .bind(query.student_id)
        .bind(query.awaiting_pickup)
        .fetch_all(&self.pool)
        .await?;
        Ok(requests)
    }

    async fn list_expired(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<BorrowRequest>> {
        let requests = sqlx::query_as::<_, BorrowRequest>(
            r#"
            SELECT * FROM borrow_requests
            WHERE status = 'approved' AND taken = FALSE AND approved_date < $1
            ORDER BY approved_date
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(requests)
    }

    async fn delete_if_untaken(&self, id: Uuid, cutoff: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM borrow_requests
            WHERE id = $1 AND status = 'approved' AND taken = FALSE AND approved_date < $2
            "#,
        )
        .bind(id)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn count_by_status(&self, status: RequestStatus) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM borrow_requests WHERE status = $1")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_reserved_for_book(&self, book_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM borrow_requests
            WHERE book_id = $1 AND status = 'approved' AND taken = FALSE
            "#,
        )
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
