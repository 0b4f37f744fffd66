//! Request ledger: donations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        donation::{Donation, DonationQuery, SubmitDonation},
        enums::RequestStatus,
    },
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DonationsRepository: Send + Sync {
    async fn create(
        &self,
        student_id: Uuid,
        donation: &SubmitDonation,
        now: DateTime<Utc>,
    ) -> AppResult<Donation>;

    async fn get(&self, id: Uuid) -> AppResult<Donation>;

    /// `pending → status`; `None` if the donation was already reviewed
    async fn review(
        &self,
        id: Uuid,
        status: RequestStatus,
        librarian_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Donation>>;

    /// `status → pending`, undoing a review whose catalog step failed
    async fn reopen(&self, id: Uuid, status: RequestStatus) -> AppResult<bool>;

    async fn list(&self, query: &DonationQuery) -> AppResult<Vec<Donation>>;

    async fn count_by_status(&self, status: RequestStatus) -> AppResult<i64>;
}

#[derive(Clone)]
pub struct PgDonationsRepository {
    pool: Pool<Postgres>,
}

impl PgDonationsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DonationsRepository for PgDonationsRepository {
    async fn create(
        &self,
        student_id: Uuid,
        donation: &SubmitDonation,
        now: DateTime<Utc>,
    ) -> AppResult<Donation> {
        let donation = sqlx::query_as::<_, Donation>(
            r#"
            INSERT INTO donations (id, student_id, title, author, isbn, category, status, request_date)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(&donation.title)
        .bind(&donation.author)
        .bind(&donation.isbn)
        .bind(&donation.category)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(donation)
    }

    async fn get(&self, id: Uuid) -> AppResult<Donation> {
        sqlx::query_as::<_, Donation>("SELECT * FROM donations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Donation not found".to_string()))
    }

    async fn review(
        &self,
        id: Uuid,
        status: RequestStatus,
        librarian_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Donation>> {
        let donation = sqlx::query_as::<_, Donation>(
            r#"
            UPDATE donations
            SET status = $2, review_date = $3, reviewed_by = $4
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(now)
        .bind(librarian_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(donation)
    }

    async fn reopen(&self, id: Uuid, status: RequestStatus) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE donations
            SET status = 'pending', review_date = NULL, reviewed_by = NULL
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list(&self, query: &DonationQuery) -> AppResult<Vec<Donation>> {
        let donations = sqlx::query_as::<_, Donation>(
            r#"
            SELECT * FROM donations
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR student_id = $2)
            ORDER BY request_date DESC
            "#,
        )
        .bind(query.status)
        .bind(query.student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(donations)
    }

    async fn count_by_status(&self, status: RequestStatus) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM donations WHERE status = $1")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
