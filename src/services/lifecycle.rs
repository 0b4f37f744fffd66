//! Borrow/issue lifecycle.
//!
//! Copies are reserved when a request is approved and given back when the
//! request is rejected, expires, or the issued copy is returned. A direct issue
//! takes its copy at issuance. Every state change is claimed first with a
//! conditional update; only the caller that wins the claim touches the copy
//! counters, and a failed follow-up step undoes the claim.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;
use validator::Validate;

use super::penalty::PenaltyService;
use crate::{
    clock::Clock,
    config::LifecycleConfig,
    error::{AppError, AppResult},
    models::{
        book::{Book, CopyAdjustment, CreateBook},
        borrow_request::{BorrowRequest, BorrowRequestDetails, BorrowRequestQuery},
        donation::{Donation, DonationQuery, DonationReview, ReviewDecision, ReviewDonation, SubmitDonation},
        enums::RequestStatus,
        issue::{IssueBookDirect, IssueQuery, IssueRecord, IssueRecordDetails, NewIssueRecord},
    },
    repository::Repository,
};

/// Parse a client supplied date: RFC 3339, or `YYYY-MM-DD` taken as midnight UTC
pub fn parse_due_date(raw: &str) -> AppResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    Err(AppError::InvalidDate(format!(
        "'{}' is not a valid date (expected YYYY-MM-DD or RFC 3339)",
        raw
    )))
}

fn parse_optional_date(raw: Option<&str>) -> AppResult<Option<DateTime<Utc>>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_due_date(raw).map(Some),
        None => Ok(None),
    }
}

#[derive(Clone)]
pub struct LifecycleService {
    repository: Repository,
    config: LifecycleConfig,
    clock: Arc<dyn Clock>,
    penalty: PenaltyService,
}

impl LifecycleService {
    pub fn new(
        repository: Repository,
        config: LifecycleConfig,
        clock: Arc<dyn Clock>,
        penalty: PenaltyService,
    ) -> Self {
        Self {
            repository,
            config,
            clock,
            penalty,
        }
    }

    // ---- Borrow requests ----

    /// Create a pending request. Availability is checked at approval, not here.
    pub async fn submit_borrow_request(
        &self,
        student_id: Uuid,
        book_id: Uuid,
    ) -> AppResult<BorrowRequest> {
        self.repository.students.get(student_id).await?;
        let book = self.repository.books.get(book_id).await?;
        if !book.is_active() {
            return Err(AppError::InvalidRequest(
                "This book is no longer in the catalog".to_string(),
            ));
        }

        let request = self
            .repository
            .borrow_requests
            .create_pending(student_id, book_id, self.clock.now())
            .await?;

        tracing::info!(request_id = %request.id, %student_id, %book_id, "Borrow request submitted");
        Ok(request)
    }

    /// Approve a pending request, reserving one copy
    pub async fn approve_borrow_request(
        &self,
        request_id: Uuid,
        librarian_id: Uuid,
        due_date: Option<&str>,
    ) -> AppResult<BorrowRequest> {
        let request = self.repository.borrow_requests.get(request_id).await?;
        if request.status != RequestStatus::Pending {
            return Err(AppError::InvalidRequest(format!(
                "Request is {}, only pending requests can be approved",
                request.status
            )));
        }
        let due_date = parse_optional_date(due_date)?;

        if !self.repository.books.take_copy(request.book_id).await? {
            return Err(AppError::BookUnavailable(
                "No copies of this book are available".to_string(),
            ));
        }

        let approved = self
            .repository
            .borrow_requests
            .approve(request_id, librarian_id, due_date, self.clock.now())
            .await;

        match approved {
            Ok(Some(approved)) => {
                tracing::info!(%request_id, book_id = %approved.book_id, %librarian_id, "Borrow request approved");
                Ok(approved)
            }
            Ok(None) => {
                self.give_back_copy(request.book_id, "approval lost to a concurrent change")
                    .await;
                Err(AppError::InvalidRequest(
                    "Request is no longer pending".to_string(),
                ))
            }
            Err(e) => {
                self.give_back_copy(request.book_id, "approval failed").await;
                Err(e)
            }
        }
    }

    /// Reject a pending or approved-but-untaken request. Rejecting an already
    /// rejected request succeeds without changes.
    pub async fn reject_borrow_request(&self, request_id: Uuid) -> AppResult<BorrowRequest> {
        loop {
            let request = self.repository.borrow_requests.get(request_id).await?;

            if request.status == RequestStatus::Rejected {
                return Ok(request);
            }
            if request.taken {
                return Err(AppError::InvalidRequest(
                    "Book has already been picked up for this request".to_string(),
                ));
            }

            let from = request.status;
            if let Some(rejected) = self.repository.borrow_requests.reject(request_id, from).await? {
                if from == RequestStatus::Approved {
                    self.give_back_copy(rejected.book_id, "reservation rejected").await;
                }
                tracing::info!(%request_id, previous = %from, "Borrow request rejected");
                return Ok(rejected);
            }
            // The request moved on underneath us; decide again from its new state
        }
    }

    /// Hand the reserved copy to the student and open an issue record
    pub async fn mark_as_taken(
        &self,
        request_id: Uuid,
        librarian_id: Uuid,
        return_date: Option<&str>,
    ) -> AppResult<IssueRecord> {
        let request = self.repository.borrow_requests.get(request_id).await?;
        if !request.is_awaiting_pickup() {
            return Err(AppError::InvalidRequest(
                "Only approved requests that have not been picked up can be marked as taken"
                    .to_string(),
            ));
        }

        let now = self.clock.now();
        let due_date = parse_optional_date(return_date)?
            .or(request.due_date)
            .unwrap_or_else(|| now + Duration::days(self.config.default_loan_days));
        let student = self.repository.students.get(request.student_id).await?;

        if self
            .repository
            .borrow_requests
            .mark_taken(request_id, now)
            .await?
            .is_none()
        {
            return Err(AppError::InvalidRequest(
                "Request is no longer awaiting pickup".to_string(),
            ));
        }

        let record = NewIssueRecord {
            book_id: request.book_id,
            student_id: Some(student.id),
            student_name: student.name,
            student_roll_no: student.student_id,
            student_dept: student.department,
            student_year: student.semester,
            issue_date: now,
            due_date,
            librarian_id,
            borrow_request_id: Some(request_id),
        };

        match self.repository.issues.create(&record).await {
            Ok(issued) => {
                tracing::info!(
                    %request_id,
                    issue_id = %issued.id,
                    due_date = %issued.due_date,
                    "Reserved copy picked up"
                );
                Ok(issued)
            }
            Err(e) => {
                if let Err(release_err) = self.repository.borrow_requests.release_taken(request_id).await {
                    tracing::error!(%request_id, error = %release_err, "Failed to release pickup claim");
                }
                Err(e)
            }
        }
    }

    pub async fn list_borrow_requests(
        &self,
        query: &BorrowRequestQuery,
    ) -> AppResult<Vec<BorrowRequestDetails>> {
        self.repository.borrow_requests.list(query).await
    }

    // ---- Issues ----

    /// Issue a copy over the counter, without a borrow request
    pub async fn issue_book_direct(
        &self,
        input: &IssueBookDirect,
        librarian_id: Uuid,
    ) -> AppResult<IssueRecord> {
        input.validate()?;
        let due_date = parse_due_date(&input.due_date)?;
        self.repository.books.get(input.book_id).await?;
        let student = self
            .repository
            .students
            .find_by_roll_no(input.student_roll_no.trim())
            .await?;

        if !self.repository.books.take_copy(input.book_id).await? {
            return Err(AppError::BookUnavailable(
                "No copies of this book are available".to_string(),
            ));
        }

        let record = NewIssueRecord {
            book_id: input.book_id,
            student_id: student.as_ref().map(|s| s.id),
            student_name: input.student_name.trim().to_string(),
            student_roll_no: input.student_roll_no.trim().to_string(),
            student_dept: student.as_ref().and_then(|s| s.department.clone()),
            student_year: student.as_ref().and_then(|s| s.semester),
            issue_date: self.clock.now(),
            due_date,
            librarian_id,
            borrow_request_id: None,
        };

        match self.repository.issues.create(&record).await {
            Ok(issued) => {
                tracing::info!(
                    issue_id = %issued.id,
                    book_id = %issued.book_id,
                    roll_no = %issued.student_roll_no,
                    linked = issued.student_id.is_some(),
                    "Book issued directly"
                );
                Ok(issued)
            }
            Err(e) => {
                self.give_back_copy(input.book_id, "direct issue failed").await;
                Err(e)
            }
        }
    }

    /// Close an issue record and put its copy back on the shelf
    pub async fn return_book(&self, issue_id: Uuid) -> AppResult<IssueRecord> {
        let record = self.repository.issues.get(issue_id).await?;
        if !record.is_open() {
            return Err(AppError::AlreadyReturned(
                "Book has already been returned".to_string(),
            ));
        }

        let now = self.clock.now();
        let mut returned = self
            .repository
            .issues
            .mark_returned(issue_id, now)
            .await?
            .ok_or_else(|| AppError::AlreadyReturned("Book has already been returned".to_string()))?;

        self.give_back_copy(returned.book_id, "book returned").await;
        returned.penalty = self.penalty.settle_returned(&returned, now).await?;

        tracing::info!(%issue_id, book_id = %returned.book_id, penalty = returned.penalty, "Book returned");
        Ok(returned)
    }

    pub async fn get_issue(&self, issue_id: Uuid) -> AppResult<IssueRecord> {
        let mut record = self.repository.issues.get(issue_id).await?;
        record.status = record.effective_status(self.clock.now());
        Ok(record)
    }

    /// Paged issue records with `overdue` shown for open loans past due
    pub async fn list_issues(&self, query: &IssueQuery) -> AppResult<(Vec<IssueRecordDetails>, i64)> {
        let now = self.clock.now();
        let (mut records, total) = self.repository.issues.list(query, now).await?;
        for details in &mut records {
            details.record.status = details.record.effective_status(now);
        }
        Ok((records, total))
    }

    // ---- Donations ----

    pub async fn submit_donation(
        &self,
        student_id: Uuid,
        input: &SubmitDonation,
    ) -> AppResult<Donation> {
        input.validate()?;
        self.repository.students.get(student_id).await?;
        let donation = self
            .repository
            .donations
            .create(student_id, input, self.clock.now())
            .await?;

        tracing::info!(donation_id = %donation.id, %student_id, isbn = %donation.isbn, "Donation submitted");
        Ok(donation)
    }

    /// Approve or reject a pending donation. An approval adds the copies to the
    /// catalog, extending an existing entry with the same ISBN.
    pub async fn review_donation(
        &self,
        donation_id: Uuid,
        librarian_id: Uuid,
        input: &ReviewDonation,
    ) -> AppResult<DonationReview> {
        input.validate()?;
        let donation = self.repository.donations.get(donation_id).await?;
        if donation.status != RequestStatus::Pending {
            return Err(AppError::Conflict(format!(
                "Donation has already been {}",
                donation.status
            )));
        }

        let donation = self
            .repository
            .donations
            .review(donation_id, input.decision.into(), librarian_id, self.clock.now())
            .await?
            .ok_or_else(|| AppError::Conflict("Donation has already been reviewed".to_string()))?;

        let book = match input.decision {
            ReviewDecision::Approved => {
                match self.catalog_donation(&donation, input.copies.unwrap_or(1)).await {
                    Ok(book) => Some(book),
                    Err(e) => {
                        self.reopen_donation(donation_id).await;
                        return Err(e);
                    }
                }
            }
            ReviewDecision::Rejected => None,
        };

        tracing::info!(
            %donation_id,
            %librarian_id,
            decision = %donation.status,
            book_id = ?book.as_ref().map(|b| b.id),
            "Donation reviewed"
        );
        Ok(DonationReview { donation, book })
    }

    /// Put an approval back to pending so it can be reviewed again
    async fn reopen_donation(&self, donation_id: Uuid) {
        match self
            .repository
            .donations
            .reopen(donation_id, RequestStatus::Approved)
            .await
        {
            Ok(true) => tracing::warn!(%donation_id, "Donation approval rolled back"),
            Ok(false) => tracing::warn!(%donation_id, "Donation changed before rollback"),
            Err(e) => tracing::error!(%donation_id, error = %e, "Failed to roll back donation approval"),
        }
    }

    async fn catalog_donation(
        &self,
        donation: &Donation,
        copies: i32,
    ) -> AppResult<Book> {
        if let Some(existing) = self.repository.books.find_by_isbn(&donation.isbn).await? {
            return self.repository.books.add_copies(existing.id, copies).await;
        }

        let book = CreateBook {
            title: donation.title.clone(),
            author: donation.author.clone(),
            isbn: donation.isbn.clone(),
            category: donation.category.clone(),
            description: None,
            published_year: None,
            total_copies: copies,
        };

        match self.repository.books.create(&book).await {
            Ok(created) => Ok(created),
            // Another approval created the entry first
            Err(AppError::Conflict(_)) => {
                let existing = self
                    .repository
                    .books
                    .find_by_isbn(&donation.isbn)
                    .await?
                    .ok_or_else(|| AppError::Internal("Book vanished after ISBN conflict".to_string()))?;
                self.repository.books.add_copies(existing.id, copies).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn list_donations(&self, query: &DonationQuery) -> AppResult<Vec<Donation>> {
        self.repository.donations.list(query).await
    }

    // ---- Maintenance ----

    /// Recompute every book's available count from its open issues and
    /// reservations, returning the books that needed a correction
    pub async fn reconcile_copies(&self) -> AppResult<Vec<CopyAdjustment>> {
        let mut adjustments = Vec::new();

        for book in self.repository.books.list_all().await? {
            let issued = self.repository.issues.count_open_for_book(book.id).await?;
            let reserved = self
                .repository
                .borrow_requests
                .count_reserved_for_book(book.id)
                .await?;

            let expected = (i64::from(book.total_copies) - issued - reserved)
                .clamp(0, i64::from(book.total_copies)) as i32;

            if expected != book.available_copies {
                self.repository.books.set_available(book.id, expected).await?;
                tracing::warn!(
                    book_id = %book.id,
                    previous = book.available_copies,
                    corrected = expected,
                    "Corrected available copies"
                );
                adjustments.push(CopyAdjustment {
                    book_id: book.id,
                    title: book.title,
                    total_copies: book.total_copies,
                    issued,
                    reserved,
                    previous_available: book.available_copies,
                    corrected_available: expected,
                });
            }
        }

        tracing::info!(corrected = adjustments.len(), "Copy reconciliation finished");
        Ok(adjustments)
    }

    async fn give_back_copy(&self, book_id: Uuid, reason: &'static str) {
        match self.repository.books.restore_copy(book_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(%book_id, reason, "Copy not restored: book already at total copies");
            }
            Err(e) => {
                tracing::error!(%book_id, reason, error = %e, "Failed to restore copy");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::FixedClock,
        repository::{books::MockBooksRepository, borrow_requests::MockBorrowRequestsRepository},
    };
    use chrono::{TimeZone, Timelike};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn pending(id: Uuid, book_id: Uuid) -> BorrowRequest {
        BorrowRequest {
            id,
            student_id: Uuid::new_v4(),
            book_id,
            status: RequestStatus::Pending,
            request_date: now(),
            approved_date: None,
            approved_by: None,
            due_date: None,
            taken: false,
            taken_date: None,
        }
    }

    fn service(repository: Repository) -> LifecycleService {
        let config = LifecycleConfig::default();
        let penalty = PenaltyService::new(repository.clone(), config.clone());
        LifecycleService::new(repository, config, Arc::new(FixedClock::new(now())), penalty)
    }

    #[test]
    fn test_parse_due_date_formats() {
        let day = parse_due_date("2025-04-01").unwrap();
        assert_eq!(day, Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap());

        let instant = parse_due_date("2025-04-01T18:30:00+02:00").unwrap();
        assert_eq!(instant.hour(), 16);

        assert!(matches!(parse_due_date("next tuesday"), Err(AppError::InvalidDate(_))));
        assert!(matches!(parse_due_date("2025-13-01"), Err(AppError::InvalidDate(_))));
    }

    #[test]
    fn test_blank_optional_date_is_absent() {
        assert_eq!(parse_optional_date(Some("  ")).unwrap(), None);
        assert_eq!(parse_optional_date(None).unwrap(), None);
    }

    #[tokio::test]
    async fn test_approve_without_copy_never_touches_request() {
        let request_id = Uuid::new_v4();
        let book_id = Uuid::new_v4();

        let mut requests = MockBorrowRequestsRepository::new();
        requests
            .expect_get()
            .returning(move |_| Ok(pending(request_id, book_id)));
        requests.expect_approve().never();

        let mut books = MockBooksRepository::new();
        books.expect_take_copy().times(1).returning(|_| Ok(false));

        let mut repository = Repository::in_memory();
        repository.borrow_requests = Arc::new(requests);
        repository.books = Arc::new(books);

        let err = service(repository)
            .approve_borrow_request(request_id, Uuid::new_v4(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BookUnavailable(_)));
    }

    #[tokio::test]
    async fn test_losing_approval_race_gives_copy_back() {
        let request_id = Uuid::new_v4();
        let book_id = Uuid::new_v4();

        let mut requests = MockBorrowRequestsRepository::new();
        requests
            .expect_get()
            .returning(move |_| Ok(pending(request_id, book_id)));
        requests.expect_approve().times(1).returning(|_, _, _, _| Ok(None));

        let mut books = MockBooksRepository::new();
        books.expect_take_copy().times(1).returning(|_| Ok(true));
        books
            .expect_restore_copy()
            .withf(move |id| *id == book_id)
            .times(1)
            .returning(|_| Ok(true));

        let mut repository = Repository::in_memory();
        repository.borrow_requests = Arc::new(requests);
        repository.books = Arc::new(books);

        let err = service(repository)
            .approve_borrow_request(request_id, Uuid::new_v4(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_bad_due_date_rejected_before_reserving() {
        let request_id = Uuid::new_v4();
        let book_id = Uuid::new_v4();

        let mut requests = MockBorrowRequestsRepository::new();
        requests
            .expect_get()
            .returning(move |_| Ok(pending(request_id, book_id)));

        let mut books = MockBooksRepository::new();
        books.expect_take_copy().never();

        let mut repository = Repository::in_memory();
        repository.borrow_requests = Arc::new(requests);
        repository.books = Arc::new(books);

        let err = service(repository)
            .approve_borrow_request(request_id, Uuid::new_v4(), Some("31/12/2025"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidDate(_)));
    }
}
