//! Data models for Libris

pub mod auth;
pub mod book;
pub mod borrow_request;
pub mod donation;
pub mod enums;
pub mod issue;
pub mod librarian;
pub mod student;

// Re-export commonly used types
pub use auth::Claims;
pub use book::Book;
pub use borrow_request::{BorrowRequest, BorrowRequestDetails};
pub use donation::Donation;
pub use enums::{BookStatus, IssueStatus, RequestStatus, Role};
pub use issue::{IssueRecord, IssueRecordDetails};
pub use librarian::Librarian;
pub use student::Student;
