//! In-memory store backing every repository trait.
//!
//! All tables sit behind one `RwLock`, so each method is a single atomic step:
//! the conditional transitions behave exactly like their SQL counterparts.
//! Used by tests and by `database.backend = "memory"`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    books::{BooksRepository, CatalogTotals},
    borrow_requests::BorrowRequestsRepository,
    donations::DonationsRepository,
    issues::IssuesRepository,
    librarians::LibrariansRepository,
    start_of_day,
    students::StudentsRepository,
};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookQuery, CreateBook, UpdateBook},
        borrow_request::{BorrowRequest, BorrowRequestDetails, BorrowRequestQuery},
        donation::{Donation, DonationQuery, SubmitDonation},
        enums::{BookStatus, IssueStatus, RequestStatus},
        issue::{IssueQuery, IssueRecord, IssueRecordDetails, NewIssueRecord},
        librarian::{Librarian, NewLibrarian},
        student::{NewStudent, Student, UpdateStudentProfile},
    },
};

#[derive(Default)]
struct Tables {
    books: HashMap<Uuid, Book>,
    students: HashMap<Uuid, Student>,
    librarians: HashMap<Uuid, Librarian>,
    borrow_requests: HashMap<Uuid, BorrowRequest>,
    donations: HashMap<Uuid, Donation>,
    issues: HashMap<Uuid, IssueRecord>,
}

impl Tables {
    fn issue_details(&self, record: &IssueRecord) -> IssueRecordDetails {
        let book = self.books.get(&record.book_id);
        IssueRecordDetails {
            record: record.clone(),
            book_title: book.map(|b| b.title.clone()),
            book_author: book.map(|b| b.author.clone()),
        }
    }
}

/// HashMap-backed store. Clone-friendly via Arc.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| AppError::Internal("memory store lock poisoned".into()))
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| AppError::Internal("memory store lock poisoned".into()))
    }
}

fn book_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Book with id {} not found", id))
}

fn copy_overflow(id: Uuid) -> AppError {
    AppError::InvalidRequest(format!("Too many copies for book {}", id))
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

fn paginate<T>(items: Vec<T>, offset: i64, limit: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

fn issue_matches_status(
    record: &IssueRecord,
    status: Option<IssueStatus>,
    day_start: DateTime<Utc>,
) -> bool {
    match status {
        None => true,
        Some(IssueStatus::Returned) => record.status == IssueStatus::Returned,
        Some(IssueStatus::Issued) => record.is_open() && record.due_date >= day_start,
        Some(IssueStatus::Overdue) => record.is_open() && record.due_date < day_start,
    }
}

#[async_trait]
impl BooksRepository for MemoryStore {
    async fn get(&self, id: Uuid) -> AppResult<Book> {
        self.read()?
            .books
            .get(&id)
            .cloned()
            .ok_or_else(|| book_not_found(id))
    }

    async fn find_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>> {
        Ok(self.read()?.books.values().find(|b| b.isbn == isbn).cloned())
    }

    async fn search(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let needle = query
            .search
            .as_ref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let tables = self.read()?;
        let mut books: Vec<Book> = tables
            .books
            .values()
            .filter(|b| b.is_active())
            .filter(|b| match &needle {
                Some(n) => contains_ci(&b.title, n) || contains_ci(&b.author, n) || contains_ci(&b.isbn, n),
                None => true,
            })
            .filter(|b| query.category.as_ref().map_or(true, |c| &b.category == c))
            .cloned()
            .collect();
        books.sort_by(|a, b| a.title.cmp(&b.title));

        let total = books.len() as i64;
        Ok((paginate(books, query.offset(), query.per_page()), total))
    }

    async fn list_all(&self) -> AppResult<Vec<Book>> {
        let mut books: Vec<Book> = self.read()?.books.values().cloned().collect();
        books.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(books)
    }

    async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        let mut tables = self.write()?;
        if tables.books.values().any(|b| b.isbn == book.isbn) {
            return Err(AppError::Conflict(format!(
                "A book with ISBN {} already exists",
                book.isbn
            )));
        }

        let now = Utc::now();
        let created = Book {
            id: Uuid::new_v4(),
            title: book.title.clone(),
            author: book.author.clone(),
            isbn: book.isbn.clone(),
            category: book.category.clone(),
            description: book.description.clone(),
            published_year: book.published_year,
            total_copies: book.total_copies,
            available_copies: book.total_copies,
            status: BookStatus::Active,
            created_at: now,
            updated_at: now,
        };
        tables.books.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: Uuid, data: &UpdateBook) -> AppResult<Book> {
        let mut tables = self.write()?;

        if let Some(isbn) = &data.isbn {
            if tables.books.values().any(|b| b.id != id && &b.isbn == isbn) {
                return Err(AppError::Conflict("Another book already uses this ISBN".to_string()));
            }
        }

        let book = tables.books.get_mut(&id).ok_or_else(|| book_not_found(id))?;

        if let Some(total) = data.total_copies {
            let available = book.available_copies + (total - book.total_copies);
            if available < 0 {
                return Err(AppError::InvalidRequest(
                    "Cannot reduce total copies below the number currently issued or reserved"
                        .to_string(),
                ));
            }
            book.total_copies = total;
            book.available_copies = available;
        }
        if let Some(title) = &data.title {
            book.title = title.clone();
        }
        if let Some(author) = &data.author {
            book.author = author.clone();
        }
        if let Some(isbn) = &data.isbn {
            book.isbn = isbn.clone();
        }
        if let Some(category) = &data.category {
            book.category = category.clone();
        }
        if data.description.is_some() {
            book.description = data.description.clone();
        }
        if data.published_year.is_some() {
            book.published_year = data.published_year;
        }
        if let Some(status) = data.status {
            book.status = status;
        }
        book.updated_at = Utc::now();
        Ok(book.clone())
    }

    async fn set_status(&self, id: Uuid, status: BookStatus) -> AppResult<Book> {
        let mut tables = self.write()?;
        let book = tables.books.get_mut(&id).ok_or_else(|| book_not_found(id))?;
        book.status = status;
        book.updated_at = Utc::now();
        Ok(book.clone())
    }

    async fn take_copy(&self, id: Uuid) -> AppResult<bool> {
        let mut tables = self.write()?;
        match tables.books.get_mut(&id) {
            Some(book) if book.is_active() && book.available_copies > 0 => {
                book.available_copies -= 1;
                book.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn restore_copy(&self, id: Uuid) -> AppResult<bool> {
        let mut tables = self.write()?;
        match tables.books.get_mut(&id) {
            Some(book) if book.available_copies < book.total_copies => {
                book.available_copies += 1;
                book.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn add_copies(&self, id: Uuid, copies: i32) -> AppResult<Book> {
        let mut tables = self.write()?;
        let book = tables.books.get_mut(&id).ok_or_else(|| book_not_found(id))?;
        let (Some(total), Some(available)) = (
            book.total_copies.checked_add(copies),
            book.available_copies.checked_add(copies),
        ) else {
            return Err(copy_overflow(id));
        };
        book.total_copies = total;
        book.available_copies = available;
        book.status = BookStatus::Active;
        book.updated_at = Utc::now();
        Ok(book.clone())
    }

    async fn set_available(&self, id: Uuid, available: i32) -> AppResult<()> {
        let mut tables = self.write()?;
        let book = tables.books.get_mut(&id).ok_or_else(|| book_not_found(id))?;
        book.available_copies = available.clamp(0, book.total_copies);
        book.updated_at = Utc::now();
        Ok(())
    }

    async fn totals(&self) -> AppResult<CatalogTotals> {
        let tables = self.read()?;
        Ok(tables
            .books
            .values()
            .filter(|b| b.is_active())
            .fold(CatalogTotals::default(), |mut acc, b| {
                acc.titles += 1;
                acc.total_copies += i64::from(b.total_copies);
                acc.available_copies += i64::from(b.available_copies);
                acc
            }))
    }
}

#[async_trait]
impl StudentsRepository for MemoryStore {
    async fn create(&self, student: &NewStudent) -> AppResult<Student> {
        let mut tables = self.write()?;
        let taken = tables.students.values().any(|s| {
            s.email.eq_ignore_ascii_case(&student.email) || s.student_id == student.student_id
        });
        if taken {
            return Err(AppError::Conflict(
                "Student with this email or student ID already exists".to_string(),
            ));
        }

        let created = Student {
            id: Uuid::new_v4(),
            name: student.name.clone(),
            email: student.email.clone(),
            student_id: student.student_id.clone(),
            phone: student.phone.clone(),
            department: student.department.clone(),
            semester: student.semester,
            total_penalty: 0,
            password_hash: student.password_hash.clone(),
            created_at: Utc::now(),
        };
        tables.students.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> AppResult<Student> {
        self.read()?
            .students
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Student with id {} not found", id)))
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<Student>> {
        Ok(self
            .read()?
            .students
            .values()
            .find(|s| s.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_roll_no(&self, roll_no: &str) -> AppResult<Option<Student>> {
        Ok(self
            .read()?
            .students
            .values()
            .find(|s| s.student_id == roll_no)
            .cloned())
    }

    async fn update_profile(&self, id: Uuid, data: &UpdateStudentProfile) -> AppResult<Student> {
        let mut tables = self.write()?;

        if let Some(email) = &data.email {
            if tables
                .students
                .values()
                .any(|s| s.id != id && s.email.eq_ignore_ascii_case(email))
            {
                return Err(AppError::Conflict("Email is already in use".to_string()));
            }
        }

        let student = tables
            .students
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Student with id {} not found", id)))?;

        if let Some(name) = &data.name {
            student.name = name.clone();
        }
        if let Some(email) = &data.email {
            student.email = email.clone();
        }
        if data.phone.is_some() {
            student.phone = data.phone.clone();
        }
        if data.department.is_some() {
            student.department = data.department.clone();
        }
        if data.semester.is_some() {
            student.semester = data.semester;
        }
        Ok(student.clone())
    }

    async fn set_total_penalty(&self, id: Uuid, total: i64) -> AppResult<()> {
        if let Some(student) = self.write()?.students.get_mut(&id) {
            student.total_penalty = total;
        }
        Ok(())
    }

    async fn list(&self) -> AppResult<Vec<Student>> {
        let mut students: Vec<Student> = self.read()?.students.values().cloned().collect();
        students.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(students)
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.read()?.students.len() as i64)
    }
}

#[async_trait]
impl LibrariansRepository for MemoryStore {
    async fn create(&self, librarian: &NewLibrarian) -> AppResult<Librarian> {
        let mut tables = self.write()?;
        let taken = tables.librarians.values().any(|l| {
            l.username == librarian.username || l.email.eq_ignore_ascii_case(&librarian.email)
        });
        if taken {
            return Err(AppError::Conflict(
                "Librarian with this username or email already exists".to_string(),
            ));
        }

        let created = Librarian {
            id: Uuid::new_v4(),
            username: librarian.username.clone(),
            email: librarian.email.clone(),
            role: librarian.role,
            password_hash: librarian.password_hash.clone(),
            created_at: Utc::now(),
        };
        tables.librarians.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> AppResult<Librarian> {
        self.read()?
            .librarians
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Librarian with id {} not found", id)))
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<Librarian>> {
        Ok(self
            .read()?
            .librarians
            .values()
            .find(|l| l.username == username)
            .cloned())
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.read()?.librarians.len() as i64)
    }
}

#[async_trait]
impl BorrowRequestsRepository for MemoryStore {
    async fn create_pending(
        &self,
        student_id: Uuid,
        book_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowRequest> {
        let mut tables = self.write()?;
        let duplicate = tables.borrow_requests.values().any(|r| {
            r.student_id == student_id && r.book_id == book_id && r.status == RequestStatus::Pending
        });
        if duplicate {
            return Err(AppError::DuplicateRequest(
                "You already have a pending request for this book".to_string(),
            ));
        }

        let request = BorrowRequest {
            id: Uuid::new_v4(),
            student_id,
            book_id,
            status: RequestStatus::Pending,
            request_date: now,
            approved_date: None,
            approved_by: None,
            due_date: None,
            taken: false,
            taken_date: None,
        };
        tables.borrow_requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn get(&self, id: Uuid) -> AppResult<BorrowRequest> {
        self.read()?
            .borrow_requests
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Borrow request not found".to_string()))
    }

    async fn approve(
        &self,
        id: Uuid,
        librarian_id: Uuid,
        due_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<Option<BorrowRequest>> {
        let mut tables = self.write()?;
        match tables.borrow_requests.get_mut(&id) {
            Some(request) if request.status == RequestStatus::Pending => {
                request.status = RequestStatus::Approved;
                request.approved_date = Some(now);
                request.approved_by = Some(librarian_id);
                request.due_date = due_date;
                Ok(Some(request.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn reject(&self, id: Uuid, from: RequestStatus) -> AppResult<Option<BorrowRequest>> {
        let mut tables = self.write()?;
        match tables.borrow_requests.get_mut(&id) {
            Some(request) if request.status == from && !request.taken => {
                request.status = RequestStatus::Rejected;
                Ok(Some(request.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_taken(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<Option<BorrowRequest>> {
        let mut tables = self.write()?;
        match tables.borrow_requests.get_mut(&id) {
            Some(request) if request.is_awaiting_pickup() => {
                request.taken = true;
                request.taken_date = Some(now);
                Ok(Some(request.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn release_taken(&self, id: Uuid) -> AppResult<()> {
        if let Some(request) = self.write()?.borrow_requests.get_mut(&id) {
            request.taken = false;
            request.taken_date = None;
        }
        Ok(())
    }

    async fn list(&self, query: &BorrowRequestQuery) -> AppResult<Vec<BorrowRequestDetails>> {
        let tables = self.read()?;
        let mut requests: Vec<BorrowRequestDetails> = tables
            .borrow_requests
            .values()
            .filter(|r| query.status.map_or(true, |s| r.status == s))
            .filter(|r| query.student_id.map_or(true, |s| r.student_id == s))
            .filter(|r| !query.awaiting_pickup.unwrap_or(false) || r.is_awaiting_pickup())
            .map(|r| {
                let book = tables.books.get(&r.book_id);
                let student = tables.students.get(&r.student_id);
                BorrowRequestDetails {
                    request: r.clone(),
                    book_title: book.map(|b| b.title.clone()),
                    book_author: book.map(|b| b.author.clone()),
                    student_name: student.map(|s| s.name.clone()),
                    student_roll_no: student.map(|s| s.student_id.clone()),
                }
            })
            .collect();
        requests.sort_by(|a, b| b.request.request_date.cmp(&a.request.request_date));
        Ok(requests)
    }

    async fn list_expired(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<BorrowRequest>> {
        let mut requests: Vec<BorrowRequest> = self
            .read()?
            .borrow_requests
            .values()
            .filter(|r| r.is_awaiting_pickup() && r.approved_date.map_or(false, |d| d < cutoff))
            .cloned()
            .collect();
        requests.sort_by_key(|r| r.approved_date);
        Ok(requests)
    }

    async fn delete_if_untaken(&self, id: Uuid, cutoff: DateTime<Utc>) -> AppResult<bool> {
        let mut tables = self.write()?;
        let expired = tables.borrow_requests.get(&id).map_or(false, |r| {
            r.is_awaiting_pickup() && r.approved_date.map_or(false, |d| d < cutoff)
        });
        if expired {
            tables.borrow_requests.remove(&id);
        }
        Ok(expired)
    }

    async fn count_by_status(&self, status: RequestStatus) -> AppResult<i64> {
        Ok(self
            .read()?
            .borrow_requests
            .values()
            .filter(|r| r.status == status)
            .count() as i64)
    }

    async fn count_reserved_for_book(&self, book_id: Uuid) -> AppResult<i64> {
        Ok(self
            .read()?
            .borrow_requests
            .values()
            .filter(|r| r.book_id == book_id && r.is_awaiting_pickup())
            .count() as i64)
    }
}

#[async_trait]
impl DonationsRepository for MemoryStore {
    async fn create(
        &self,
        student_id: Uuid,
        donation: &SubmitDonation,
        now: DateTime<Utc>,
    ) -> AppResult<Donation> {
        let created = Donation {
            id: Uuid::new_v4(),
            student_id,
            title: donation.title.clone(),
            author: donation.author.clone(),
            isbn: donation.isbn.clone(),
            category: donation.category.clone(),
            status: RequestStatus::Pending,
            request_date: now,
            review_date: None,
            reviewed_by: None,
        };
        self.write()?.donations.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> AppResult<Donation> {
        self.read()?
            .donations
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Donation not found".to_string()))
    }

    async fn review(
        &self,
        id: Uuid,
        status: RequestStatus,
        librarian_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Donation>> {
        let mut tables = self.write()?;
        match tables.donations.get_mut(&id) {
            Some(donation) if donation.status == RequestStatus::Pending => {
                donation.status = status;
                donation.review_date = Some(now);
                donation.reviewed_by = Some(librarian_id);
                Ok(Some(donation.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn reopen(&self, id: Uuid, status: RequestStatus) -> AppResult<bool> {
        let mut tables = self.write()?;
        match tables.donations.get_mut(&id) {
            Some(donation) if donation.status == status => {
                donation.status = RequestStatus::Pending;
                donation.review_date = None;
                donation.reviewed_by = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(&self, query: &DonationQuery) -> AppResult<Vec<Donation>> {
        let mut donations: Vec<Donation> = self
            .read()?
            .donations
            .values()
            .filter(|d| query.status.map_or(true, |s| d.status == s))
            .filter(|d| query.student_id.map_or(true, |s| d.student_id == s))
            .cloned()
            .collect();
        donations.sort_by(|a, b| b.request_date.cmp(&a.request_date));
        Ok(donations)
    }

    async fn count_by_status(&self, status: RequestStatus) -> AppResult<i64> {
        Ok(self
            .read()?
            .donations
            .values()
            .filter(|d| d.status == status)
            .count() as i64)
    }
}

#[async_trait]
impl IssuesRepository for MemoryStore {
    async fn create(&self, record: &NewIssueRecord) -> AppResult<IssueRecord> {
        let mut tables = self.write()?;
        if let Some(request_id) = record.borrow_request_id {
            if tables
                .issues
                .values()
                .any(|r| r.borrow_request_id == Some(request_id))
            {
                return Err(AppError::Conflict(
                    "This borrow request has already been issued".to_string(),
                ));
            }
        }

        let created = IssueRecord {
            id: Uuid::new_v4(),
            book_id: record.book_id,
            student_id: record.student_id,
            student_name: record.student_name.clone(),
            student_roll_no: record.student_roll_no.clone(),
            student_dept: record.student_dept.clone(),
            student_year: record.student_year,
            issue_date: record.issue_date,
            due_date: record.due_date,
            return_date: None,
            status: IssueStatus::Issued,
            penalty: 0,
            librarian_id: record.librarian_id,
            borrow_request_id: record.borrow_request_id,
        };
        tables.issues.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> AppResult<IssueRecord> {
        self.read()?
            .issues
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Issue record not found".to_string()))
    }

    async fn mark_returned(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<Option<IssueRecord>> {
        let mut tables = self.write()?;
        match tables.issues.get_mut(&id) {
            Some(record) if record.is_open() => {
                record.status = IssueStatus::Returned;
                record.return_date = Some(now);
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list(
        &self,
        query: &IssueQuery,
        as_of: DateTime<Utc>,
    ) -> AppResult<(Vec<IssueRecordDetails>, i64)> {
        let day_start = start_of_day(as_of);
        let tables = self.read()?;
        let mut records: Vec<IssueRecordDetails> = tables
            .issues
            .values()
            .filter(|r| issue_matches_status(r, query.status, day_start))
            .filter(|r| query.student_id.map_or(true, |s| r.student_id == Some(s)))
            .filter(|r| query.book_id.map_or(true, |b| r.book_id == b))
            .map(|r| tables.issue_details(r))
            .collect();
        records.sort_by(|a, b| b.record.issue_date.cmp(&a.record.issue_date));

        let total = records.len() as i64;
        Ok((paginate(records, query.offset(), query.per_page()), total))
    }

    async fn list_open(&self, student_id: Option<Uuid>) -> AppResult<Vec<IssueRecord>> {
        let mut records: Vec<IssueRecord> = self
            .read()?
            .issues
            .values()
            .filter(|r| r.is_open())
            .filter(|r| student_id.map_or(true, |s| r.student_id == Some(s)))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.due_date);
        Ok(records)
    }

    async fn list_by_student(&self, student_id: Uuid) -> AppResult<Vec<IssueRecordDetails>> {
        let tables = self.read()?;
        let mut records: Vec<IssueRecordDetails> = tables
            .issues
            .values()
            .filter(|r| r.student_id == Some(student_id))
            .map(|r| tables.issue_details(r))
            .collect();
        records.sort_by(|a, b| b.record.issue_date.cmp(&a.record.issue_date));
        Ok(records)
    }

    async fn set_penalty(&self, id: Uuid, penalty: i64) -> AppResult<()> {
        if let Some(record) = self.write()?.issues.get_mut(&id) {
            record.penalty = penalty;
        }
        Ok(())
    }

    async fn count_by_status(&self, status: IssueStatus, as_of: DateTime<Utc>) -> AppResult<i64> {
        let day_start = start_of_day(as_of);
        Ok(self
            .read()?
            .issues
            .values()
            .filter(|r| issue_matches_status(r, Some(status), day_start))
            .count() as i64)
    }

    async fn count_open_for_book(&self, book_id: Uuid) -> AppResult<i64> {
        Ok(self
            .read()?
            .issues
            .values()
            .filter(|r| r.book_id == book_id && r.is_open())
            .count() as i64)
    }

    async fn recent(&self, status: IssueStatus, limit: i64) -> AppResult<Vec<IssueRecordDetails>> {
        let tables = self.read()?;
        let mut records: Vec<IssueRecordDetails> = tables
            .issues
            .values()
            .filter(|r| r.status == status)
            .map(|r| tables.issue_details(r))
            .collect();
        records.sort_by_key(|d| std::cmp::Reverse(d.record.return_date.unwrap_or(d.record.issue_date)));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn create_book(copies: i32) -> CreateBook {
        CreateBook {
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            isbn: "978-0441013593".to_string(),
            category: "Fiction".to_string(),
            description: None,
            published_year: Some(1965),
            total_copies: copies,
        }
    }

    #[tokio::test]
    async fn test_take_copy_stops_at_zero() {
        let store = MemoryStore::new();
        let book = BooksRepository::create(&store, &create_book(1)).await.unwrap();

        assert!(store.take_copy(book.id).await.unwrap());
        assert!(!store.take_copy(book.id).await.unwrap());
        assert_eq!(BooksRepository::get(&store, book.id).await.unwrap().available_copies, 0);
    }

    #[tokio::test]
    async fn test_restore_copy_never_exceeds_total() {
        let store = MemoryStore::new();
        let book = BooksRepository::create(&store, &create_book(2)).await.unwrap();

        assert!(!store.restore_copy(book.id).await.unwrap());
        assert!(store.take_copy(book.id).await.unwrap());
        assert!(store.restore_copy(book.id).await.unwrap());
        assert_eq!(BooksRepository::get(&store, book.id).await.unwrap().available_copies, 2);
    }

    #[tokio::test]
    async fn test_inactive_book_cannot_be_taken() {
        let store = MemoryStore::new();
        let book = BooksRepository::create(&store, &create_book(3)).await.unwrap();
        store.set_status(book.id, BookStatus::Inactive).await.unwrap();

        assert!(!store.take_copy(book.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_reducing_total_below_outstanding_is_rejected() {
        let store = MemoryStore::new();
        let book = BooksRepository::create(&store, &create_book(2)).await.unwrap();
        store.take_copy(book.id).await.unwrap();
        store.take_copy(book.id).await.unwrap();

        let update = UpdateBook {
            total_copies: Some(1),
            ..Default::default()
        };
        let err = store.update(book.id, &update).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));

        let grow = UpdateBook {
            total_copies: Some(5),
            ..Default::default()
        };
        let updated = store.update(book.id, &grow).await.unwrap();
        assert_eq!(updated.total_copies, 5);
        assert_eq!(updated.available_copies, 3);
    }

    #[tokio::test]
    async fn test_second_pending_request_is_duplicate() {
        let store = MemoryStore::new();
        let (student, book) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        store.create_pending(student, book, now).await.unwrap();
        let err = store.create_pending(student, book, now).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateRequest(_)));

        // A different book is fine
        store.create_pending(student, Uuid::new_v4(), now).await.unwrap();
    }

    #[tokio::test]
    async fn test_transitions_only_fire_from_expected_state() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let request = store
            .create_pending(Uuid::new_v4(), Uuid::new_v4(), now)
            .await
            .unwrap();

        assert!(store.mark_taken(request.id, now).await.unwrap().is_none());
        assert!(store.approve(request.id, Uuid::new_v4(), None, now).await.unwrap().is_some());
        assert!(store.approve(request.id, Uuid::new_v4(), None, now).await.unwrap().is_none());
        assert!(store.mark_taken(request.id, now).await.unwrap().is_some());
        assert!(store.mark_taken(request.id, now).await.unwrap().is_none());
        assert!(store
            .reject(request.id, RequestStatus::Approved)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_if_untaken_respects_cutoff() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let request = store
            .create_pending(Uuid::new_v4(), Uuid::new_v4(), now)
            .await
            .unwrap();
        let approved_at = now - Duration::days(8);
        store
            .approve(request.id, Uuid::new_v4(), None, approved_at)
            .await
            .unwrap();

        assert!(!store
            .delete_if_untaken(request.id, approved_at - Duration::days(1))
            .await
            .unwrap());
        assert!(store.delete_if_untaken(request.id, now).await.unwrap());
        assert!(!store.delete_if_untaken(request.id, now).await.unwrap());
    }

    #[tokio::test]
    async fn test_issue_status_filter_derives_overdue() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let base = NewIssueRecord {
            book_id: Uuid::new_v4(),
            student_id: None,
            student_name: "Asha".to_string(),
            student_roll_no: "CS-01".to_string(),
            student_dept: None,
            student_year: None,
            issue_date: now - Duration::days(20),
            due_date: now - Duration::days(3),
            librarian_id: Uuid::new_v4(),
            borrow_request_id: None,
        };
        IssuesRepository::create(&store, &base).await.unwrap();
        IssuesRepository::create(
            &store,
            &NewIssueRecord {
                due_date: now + Duration::days(3),
                ..base.clone()
            },
        )
        .await
        .unwrap();

        assert_eq!(IssuesRepository::count_by_status(&store, IssueStatus::Overdue, now).await.unwrap(), 1);
        assert_eq!(IssuesRepository::count_by_status(&store, IssueStatus::Issued, now).await.unwrap(), 1);
        assert_eq!(IssuesRepository::count_by_status(&store, IssueStatus::Returned, now).await.unwrap(), 0);
    }
}
