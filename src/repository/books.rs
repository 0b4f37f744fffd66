//! Catalog store: books and their copy counters

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::unique_violation;
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookQuery, CreateBook, UpdateBook},
        enums::BookStatus,
    },
};

/// Catalog-wide copy totals for the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogTotals {
    pub titles: i64,
    pub total_copies: i64,
    pub available_copies: i64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BooksRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> AppResult<Book>;

    async fn find_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>>;

    /// Active books matching the query, with the total match count
    async fn search(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)>;

    /// Every book regardless of status
    async fn list_all(&self) -> AppResult<Vec<Book>>;

    async fn create(&self, book: &CreateBook) -> AppResult<Book>;

    /// Shifts `available_copies` by the change in `total_copies`; fails with
    /// `InvalidRequest` if that would leave fewer than zero available.
    async fn update(&self, id: Uuid, update: &UpdateBook) -> AppResult<Book>;

    async fn set_status(&self, id: Uuid, status: BookStatus) -> AppResult<Book>;

    /// Decrement `available_copies` if the book is active and has a copy left
    async fn take_copy(&self, id: Uuid) -> AppResult<bool>;

    /// Increment `available_copies` unless it already equals `total_copies`
    async fn restore_copy(&self, id: Uuid) -> AppResult<bool>;

    /// Grow both counters and reactivate the book
    async fn add_copies(&self, id: Uuid, copies: i32) -> AppResult<Book>;

    async fn set_available(&self, id: Uuid, available: i32) -> AppResult<()>;

    async fn totals(&self) -> AppResult<CatalogTotals>;
}

#[derive(Clone)]
pub struct PgBooksRepository {
    pool: Pool<Postgres>,
}

impl PgBooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn book_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Book with id {} not found", id))
}

fn copy_overflow(id: Uuid) -> AppError {
    AppError::InvalidRequest(format!("Too many copies for book {}", id))
}

#[async_trait]
impl BooksRepository for PgBooksRepository {
    async fn get(&self, id: Uuid) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| book_not_found(id))
    }

    async fn find_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE isbn = $1")
            .bind(isbn)
            .fetch_optional(&self.pool)
            .await?;
        Ok(book)
    }

    async fn search(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let pattern = query
            .search
            .as_ref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| format!("%{}%", s.trim()));

        let filter = r#"
            WHERE status = 'active'
              AND ($1::text IS NULL OR title ILIKE $1 OR author ILIKE $1 OR isbn ILIKE $1)
              AND ($2::text IS NULL OR category = $2)
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM books {}", filter))
            .bind(&pattern)
            .bind(&query.category)
            .fetch_one(&self.pool)
            .await?;

        let books = sqlx::query_as::<_, Book>(&format!(
            "SELECT * FROM books {} ORDER BY title LIMIT $3 OFFSET $4",
            filter
        ))
        .bind(&pattern)
        .bind(&query.category)
        .bind(query.per_page())
        .bind(query.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((books, total))
    }

    async fn list_all(&self) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>("SELECT * FROM books ORDER BY title")
            .fetch_all(&self.pool)
            .await?;
        Ok(books)
    }

    async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (id, title, author, isbn, category, description, published_year,
                               total_copies, available_copies, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, 'active', $9, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.category)
        .bind(&book.description)
        .bind(book.published_year)
        .bind(book.total_copies)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, format!("A book with ISBN {} already exists", book.isbn)))
    }

    async fn update(&self, id: Uuid, data: &UpdateBook) -> AppResult<Book> {
        let mut sets = vec!["updated_at = $1".to_string()];
        let mut idx = 2;

        macro_rules! add_field {
            ($field:expr, $name:expr) => {
                if $field.is_some() {
                    sets.push(format!("{} = ${}", $name, idx));
                    idx += 1;
                }
            };
        }

        add_field!(data.title, "title");
        add_field!(data.author, "author");
        add_field!(data.isbn, "isbn");
        add_field!(data.category, "category");
        add_field!(data.description, "description");
        add_field!(data.published_year, "published_year");
        add_field!(data.status, "status");

        let mut guard = String::new();
        if data.total_copies.is_some() {
            // Every SET expression sees the old row, so both columns use the old total
            sets.push(format!(
                "available_copies = available_copies + (${0} - total_copies), total_copies = ${0}",
                idx
            ));
            guard = format!(" AND available_copies + (${} - total_copies) >= 0", idx);
            idx += 1;
        }

        let query = format!(
            "UPDATE books SET {} WHERE id = ${}{} RETURNING *",
            sets.join(", "),
            idx,
            guard
        );

        let mut builder = sqlx::query_as::<_, Book>(&query).bind(Utc::now());

        macro_rules! bind_field {
            ($field:expr) => {
                if let Some(ref val) = $field {
                    builder = builder.bind(val);
                }
            };
        }

        bind_field!(data.title);
        bind_field!(data.author);
        bind_field!(data.isbn);
        bind_field!(data.category);
        bind_field!(data.description);
        bind_field!(data.published_year);
        bind_field!(data.status);
        bind_field!(data.total_copies);

        let updated = builder
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| unique_violation(e, "Another book already uses this ISBN"))?;

        match updated {
            Some(book) => Ok(book),
            None => {
                // Distinguish a missing book from a rejected copy reduction
                self.get(id).await?;
                Err(AppError::InvalidRequest(
                    "Cannot reduce total copies below the number currently issued or reserved"
                        .to_string(),
                ))
            }
        }
    }

    async fn set_status(&self, id: Uuid, status: BookStatus) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            "UPDATE books SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| book_not_found(id))
    }

    async fn take_copy(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE books
            SET available_copies = available_copies - 1, updated_at = NOW()
            WHERE id = $1 AND status = 'active' AND available_copies > 0
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn restore_copy(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE books
            SET available_copies = available_copies + 1, updated_at = NOW()
            WHERE id = $1 AND available_copies < total_copies
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn add_copies(&self, id: Uuid, copies: i32) -> AppResult<Book> {
        let book = sqlx::query_as::<_, Book>(
            r#"
            UPDATE books
            SET total_copies = total_copies + $2,
                available_copies = available_copies + $2,
                status = 'active',
                updated_at = NOW()
            WHERE id = $1 AND total_copies <= 2147483647 - $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(copies)
        .fetch_optional(&self.pool)
        .await?;

        match book {
            Some(book) => Ok(book),
            None => {
                // Distinguish a missing book from a counter that would overflow
                self.get(id).await?;
                Err(copy_overflow(id))
            }
        }
    }

    async fn set_available(&self, id: Uuid, available: i32) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE books
            SET available_copies = LEAST(GREATEST($2, 0), total_copies), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(available)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(book_not_found(id));
        }
        Ok(())
    }

    async fn totals(&self) -> AppResult<CatalogTotals> {
        let (titles, total_copies, available_copies): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(total_copies), 0)::bigint,
                   COALESCE(SUM(available_copies), 0)::bigint
            FROM books
            WHERE status = 'active'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CatalogTotals {
            titles,
            total_copies,
            available_copies,
        })
    }
}
