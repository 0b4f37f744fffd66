//! Catalog management service

use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookQuery, CreateBook, UpdateBook},
        enums::BookStatus,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Search active books
    pub async fn search_books(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        self.repository.books.search(query).await
    }

    /// Get a book by id, inactive ones included
    pub async fn get_book(&self, id: Uuid) -> AppResult<Book> {
        self.repository.books.get(id).await
    }

    pub async fn create_book(&self, book: CreateBook) -> AppResult<Book> {
        book.validate()?;
        let created = self.repository.books.create(&book).await?;
        tracing::info!(book_id = %created.id, isbn = %created.isbn, copies = created.total_copies, "Book added to catalog");
        Ok(created)
    }

    pub async fn update_book(&self, id: Uuid, update: UpdateBook) -> AppResult<Book> {
        update.validate()?;
        let updated = self.repository.books.update(id, &update).await?;
        tracing::info!(book_id = %id, "Book updated");
        Ok(updated)
    }

    /// Soft delete: the book disappears from search and can no longer be
    /// reserved, but its history stays intact
    pub async fn delete_book(&self, id: Uuid) -> AppResult<Book> {
        let book = self.repository.books.set_status(id, BookStatus::Inactive).await?;
        tracing::info!(book_id = %id, "Book deactivated");
        Ok(book)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn new_book(isbn: &str) -> CreateBook {
        CreateBook {
            title: "The Left Hand of Darkness".to_string(),
            author: "Ursula K. Le Guin".to_string(),
            isbn: isbn.to_string(),
            category: "Fiction".to_string(),
            description: None,
            published_year: Some(1969),
            total_copies: 2,
        }
    }

    #[tokio::test]
    async fn test_deleted_book_leaves_search_but_stays_readable() {
        let catalog = CatalogService::new(Repository::in_memory());
        let book = catalog.create_book(new_book("978-0441478125")).await.unwrap();

        catalog.delete_book(book.id).await.unwrap();

        let (found, total) = catalog.search_books(&BookQuery::default()).await.unwrap();
        assert!(found.is_empty());
        assert_eq!(total, 0);
        assert_eq!(
            catalog.get_book(book.id).await.unwrap().status,
            BookStatus::Inactive
        );
    }

    #[tokio::test]
    async fn test_duplicate_isbn_conflicts() {
        let catalog = CatalogService::new(Repository::in_memory());
        assert_ok!(catalog.create_book(new_book("978-0441478125")).await);

        let err = assert_err!(catalog.create_book(new_book("978-0441478125")).await);
        assert!(matches!(err, crate::error::AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_zero_copies_rejected() {
        let catalog = CatalogService::new(Repository::in_memory());
        let mut book = new_book("978-0441478125");
        book.total_copies = 0;

        let err = assert_err!(catalog.create_book(book).await);
        assert!(matches!(err, crate::error::AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_search_matches_author_case_insensitively() {
        let catalog = CatalogService::new(Repository::in_memory());
        catalog.create_book(new_book("978-0441478125")).await.unwrap();

        let query = BookQuery {
            search: Some("le guin".to_string()),
            ..Default::default()
        };
        let (found, total) = catalog.search_books(&query).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].isbn, "978-0441478125");
    }
}
