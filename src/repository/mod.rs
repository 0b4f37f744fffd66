//! Repository layer for database operations

pub mod books;
pub mod borrow_requests;
pub mod donations;
pub mod issues;
pub mod librarians;
pub mod memory;
pub mod students;

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use sqlx::{Pool, Postgres};

use crate::error::{AppError, AppResult};

pub use books::BooksRepository;
pub use borrow_requests::BorrowRequestsRepository;
pub use donations::DonationsRepository;
pub use issues::IssuesRepository;
pub use librarians::LibrariansRepository;
pub use students::StudentsRepository;

/// Main repository struct holding one handle per store
#[derive(Clone)]
pub struct Repository {
    /// Present only for the PostgreSQL backend
    pub pool: Option<Pool<Postgres>>,
    pub books: Arc<dyn BooksRepository>,
    pub students: Arc<dyn StudentsRepository>,
    pub librarians: Arc<dyn LibrariansRepository>,
    pub borrow_requests: Arc<dyn BorrowRequestsRepository>,
    pub donations: Arc<dyn DonationsRepository>,
    pub issues: Arc<dyn IssuesRepository>,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(books::PgBooksRepository::new(pool.clone())),
            students: Arc::new(students::PgStudentsRepository::new(pool.clone())),
            librarians: Arc::new(librarians::PgLibrariansRepository::new(pool.clone())),
            borrow_requests: Arc::new(borrow_requests::PgBorrowRequestsRepository::new(pool.clone())),
            donations: Arc::new(donations::PgDonationsRepository::new(pool.clone())),
            issues: Arc::new(issues::PgIssuesRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// Create a repository over a fresh in-memory store
    pub fn in_memory() -> Self {
        let store = memory::MemoryStore::new();
        Self {
            pool: None,
            books: Arc::new(store.clone()),
            students: Arc::new(store.clone()),
            librarians: Arc::new(store.clone()),
            borrow_requests: Arc::new(store.clone()),
            donations: Arc::new(store.clone()),
            issues: Arc::new(store),
        }
    }

    /// Check that the backing store answers
    pub async fn ping(&self) -> AppResult<()> {
        if let Some(pool) = &self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }
}

/// Map a unique-constraint violation to `Conflict`, anything else to `Database`
pub(crate) fn unique_violation(err: sqlx::Error, message: impl Into<String>) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(message.into()),
        _ => AppError::Database(err),
    }
}

/// Midnight UTC of the day containing `at`
pub(crate) fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::MIN).and_utc()
}
