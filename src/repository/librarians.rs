//! Identity store: librarians

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::unique_violation;
use crate::{
    error::{AppError, AppResult},
    models::librarian::{Librarian, NewLibrarian},
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LibrariansRepository: Send + Sync {
    async fn create(&self, librarian: &NewLibrarian) -> AppResult<Librarian>;

    async fn get(&self, id: Uuid) -> AppResult<Librarian>;

    async fn find_by_username(&self, username: &str) -> AppResult<Option<Librarian>>;

    async fn count(&self) -> AppResult<i64>;
}

#[derive(Clone)]
pub struct PgLibrariansRepository {
    pool: Pool<Postgres>,
}

impl PgLibrariansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LibrariansRepository for PgLibrariansRepository {
    async fn create(&self, librarian: &NewLibrarian) -> AppResult<Librarian> {
        sqlx::query_as::<_, Librarian>(
            r#"
            INSERT INTO librarians (id, username, email, role, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&librarian.username)
        .bind(&librarian.email)
        .bind(librarian.role)
        .bind(&librarian.password_hash)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, "Librarian with this username or email already exists"))
    }

    async fn get(&self, id: Uuid) -> AppResult<Librarian> {
        sqlx::query_as::<_, Librarian>("SELECT * FROM librarians WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Librarian with id {} not found", id)))
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<Librarian>> {
        let librarian =
            sqlx::query_as::<_, Librarian>("SELECT * FROM librarians WHERE username = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
        Ok(librarian)
    }

    async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM librarians")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
