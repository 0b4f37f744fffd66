//! Lending lifecycle scenarios against the in-memory store

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use libris_server::{
    clock::{Clock, FixedClock},
    config::AppConfig,
    error::AppError,
    models::{
        book::{Book, CreateBook},
        donation::{ReviewDecision, ReviewDonation, SubmitDonation},
        enums::{IssueStatus, RequestStatus},
        issue::IssueBookDirect,
        student::{NewStudent, Student},
    },
    repository::Repository,
    services::{penalty::AlertLevel, Services},
};

struct Library {
    repository: Repository,
    clock: FixedClock,
    services: Services,
    config: AppConfig,
    librarian: Uuid,
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
}

fn library() -> Library {
    let repository = Repository::in_memory();
    let clock = FixedClock::new(start());
    let config = AppConfig::default();
    let services = Services::new(repository.clone(), &config, Arc::new(clock.clone()));
    Library {
        repository,
        clock,
        services,
        config,
        librarian: Uuid::new_v4(),
    }
}

impl Library {
    async fn book(&self, isbn: &str, copies: i32) -> Book {
        self.repository
            .books
            .create(&CreateBook {
                title: format!("Title {}", isbn),
                author: "Author".to_string(),
                isbn: isbn.to_string(),
                category: "General".to_string(),
                description: None,
                published_year: None,
                total_copies: copies,
            })
            .await
            .unwrap()
    }

    async fn student(&self, roll_no: &str) -> Student {
        self.repository
            .students
            .create(&NewStudent {
                name: format!("Student {}", roll_no),
                email: format!("{}@campus.test", roll_no.to_lowercase()),
                student_id: roll_no.to_string(),
                phone: None,
                department: Some("Physics".to_string()),
                semester: Some(2),
                password_hash: String::new(),
            })
            .await
            .unwrap()
    }

    async fn available(&self, book_id: Uuid) -> i32 {
        self.repository.books.get(book_id).await.unwrap().available_copies
    }

    /// available + open issues + reservations
    async fn accounted(&self, book_id: Uuid) -> i64 {
        i64::from(self.available(book_id).await)
            + self.repository.issues.count_open_for_book(book_id).await.unwrap()
            + self
                .repository
                .borrow_requests
                .count_reserved_for_book(book_id)
                .await
                .unwrap()
    }

    async fn issue_direct(&self, book_id: Uuid, roll_no: &str, due: &str) -> Uuid {
        self.services
            .lifecycle
            .issue_book_direct(
                &IssueBookDirect {
                    book_id,
                    student_name: format!("Student {}", roll_no),
                    student_roll_no: roll_no.to_string(),
                    due_date: due.to_string(),
                },
                self.librarian,
            )
            .await
            .unwrap()
            .id
    }
}

#[tokio::test]
async fn concurrent_approvals_of_last_copy_admit_one() {
    let lib = library();
    let book = lib.book("111", 1).await;
    let a = lib.student("A-1").await;
    let b = lib.student("B-1").await;

    let lifecycle = &lib.services.lifecycle;
    let req_a = lifecycle.submit_borrow_request(a.id, book.id).await.unwrap();
    let req_b = lifecycle.submit_borrow_request(b.id, book.id).await.unwrap();

    let (first, second) = tokio::join!(
        lifecycle.approve_borrow_request(req_a.id, lib.librarian, None),
        lifecycle.approve_borrow_request(req_b.id, lib.librarian, None),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(AppError::BookUnavailable(_)))));
    assert_eq!(lib.available(book.id).await, 0);
    assert_eq!(lib.accounted(book.id).await, 1);
}

#[tokio::test]
async fn copies_are_conserved_through_the_lifecycle() {
    let lib = library();
    let book = lib.book("222", 3).await;
    let students = [lib.student("C-1").await, lib.student("C-2").await, lib.student("C-3").await];
    let lifecycle = &lib.services.lifecycle;

    let mut requests = Vec::new();
    for student in &students {
        requests.push(lifecycle.submit_borrow_request(student.id, book.id).await.unwrap());
    }
    assert_eq!(lib.accounted(book.id).await, 3);

    lifecycle
        .approve_borrow_request(requests[0].id, lib.librarian, None)
        .await
        .unwrap();
    lifecycle
        .approve_borrow_request(requests[1].id, lib.librarian, Some("2025-03-20"))
        .await
        .unwrap();
    assert_eq!(lib.available(book.id).await, 1);
    assert_eq!(lib.accounted(book.id).await, 3);

    let issued = lifecycle
        .mark_as_taken(requests[0].id, lib.librarian, None)
        .await
        .unwrap();
    assert_eq!(issued.due_date, start() + Duration::days(14));
    assert_eq!(lib.accounted(book.id).await, 3);

    let planned = lifecycle
        .mark_as_taken(requests[1].id, lib.librarian, None)
        .await
        .unwrap();
    assert_eq!(planned.due_date, Utc.with_ymd_and_hms(2025, 3, 20, 0, 0, 0).unwrap());

    lifecycle.reject_borrow_request(requests[2].id).await.unwrap();
    lifecycle.return_book(issued.id).await.unwrap();

    assert_eq!(lib.available(book.id).await, 2);
    assert_eq!(lib.accounted(book.id).await, 3);
}

#[tokio::test]
async fn single_copy_taken_by_one_student_blocks_the_next() {
    let lib = library();
    let book = lib.book("333", 1).await;
    let a = lib.student("D-1").await;
    let b = lib.student("D-2").await;
    let lifecycle = &lib.services.lifecycle;

    let req_a = lifecycle.submit_borrow_request(a.id, book.id).await.unwrap();
    let req_b = lifecycle.submit_borrow_request(b.id, book.id).await.unwrap();

    lifecycle
        .approve_borrow_request(req_a.id, lib.librarian, None)
        .await
        .unwrap();
    lifecycle
        .mark_as_taken(req_a.id, lib.librarian, None)
        .await
        .unwrap();

    let blocked = lifecycle
        .approve_borrow_request(req_b.id, lib.librarian, None)
        .await;
    assert!(matches!(blocked, Err(AppError::BookUnavailable(_))));

    let still_pending = lib.repository.borrow_requests.get(req_b.id).await.unwrap();
    assert_eq!(still_pending.status, RequestStatus::Pending);
}

#[tokio::test]
async fn duplicate_pending_request_is_refused() {
    let lib = library();
    let book = lib.book("444", 2).await;
    let student = lib.student("E-1").await;
    let lifecycle = &lib.services.lifecycle;

    lifecycle.submit_borrow_request(student.id, book.id).await.unwrap();
    let again = lifecycle.submit_borrow_request(student.id, book.id).await;
    assert!(matches!(again, Err(AppError::DuplicateRequest(_))));
}

#[tokio::test]
async fn rejecting_a_reservation_frees_its_copy_but_not_after_pickup() {
    let lib = library();
    let book = lib.book("555", 1).await;
    let a = lib.student("F-1").await;
    let b = lib.student("F-2").await;
    let lifecycle = &lib.services.lifecycle;

    let req_a = lifecycle.submit_borrow_request(a.id, book.id).await.unwrap();
    lifecycle
        .approve_borrow_request(req_a.id, lib.librarian, None)
        .await
        .unwrap();
    assert_eq!(lib.available(book.id).await, 0);

    let rejected = lifecycle.reject_borrow_request(req_a.id).await.unwrap();
    assert_eq!(rejected.status, RequestStatus::Rejected);
    assert_eq!(lib.available(book.id).await, 1);

    // Rejecting twice changes nothing
    lifecycle.reject_borrow_request(req_a.id).await.unwrap();
    assert_eq!(lib.available(book.id).await, 1);

    let req_b = lifecycle.submit_borrow_request(b.id, book.id).await.unwrap();
    lifecycle
        .approve_borrow_request(req_b.id, lib.librarian, None)
        .await
        .unwrap();
    lifecycle
        .mark_as_taken(req_b.id, lib.librarian, None)
        .await
        .unwrap();

    let too_late = lifecycle.reject_borrow_request(req_b.id).await;
    assert!(matches!(too_late, Err(AppError::InvalidRequest(_))));
    assert_eq!(lib.available(book.id).await, 0);
}

#[tokio::test]
async fn second_return_is_refused_without_restoring_twice() {
    let lib = library();
    let book = lib.book("666", 2).await;
    let issue_id = lib.issue_direct(book.id, "G-1", "2025-03-24").await;
    assert_eq!(lib.available(book.id).await, 1);

    let returned = lib.services.lifecycle.return_book(issue_id).await.unwrap();
    assert_eq!(returned.status, IssueStatus::Returned);
    assert_eq!(returned.return_date, Some(start()));

    let again = lib.services.lifecycle.return_book(issue_id).await;
    assert!(matches!(again, Err(AppError::AlreadyReturned(_))));
    assert_eq!(lib.available(book.id).await, 2);
}

#[tokio::test]
async fn three_days_late_costs_thirty() {
    let lib = library();
    let book = lib.book("777", 1).await;
    let student = lib.student("H-1").await;
    lib.issue_direct(book.id, "H-1", "2025-03-07").await;

    let report = lib
        .services
        .penalty
        .recompute_student_penalty(student.id, lib.clock.now())
        .await
        .unwrap();

    assert_eq!(report.total_penalty, 30);
    assert_eq!(report.records[0].penalty, 30);
    assert_eq!(
        lib.repository.students.get(student.id).await.unwrap().total_penalty,
        30
    );

    let overdue = lib
        .services
        .penalty
        .overdue_students(lib.clock.now())
        .await
        .unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].days_overdue, 3);
    assert_eq!(overdue[0].student_roll_no, "H-1");
}

#[tokio::test]
async fn recomputing_penalties_twice_is_idempotent() {
    let lib = library();
    let book = lib.book("888", 2).await;
    let student = lib.student("I-1").await;
    lib.issue_direct(book.id, "I-1", "2025-03-05").await;
    lib.issue_direct(book.id, "I-1", "2025-03-09").await;

    let penalty = &lib.services.penalty;
    let first = penalty.recompute_all(lib.clock.now()).await.unwrap();
    let second = penalty.recompute_all(lib.clock.now()).await.unwrap();

    assert_eq!(first.total_penalty, 60);
    assert_eq!(first.total_penalty, second.total_penalty);
    assert_eq!(first.students, second.students);
    assert_eq!(
        lib.repository.students.get(student.id).await.unwrap().total_penalty,
        60
    );
}

#[tokio::test]
async fn due_tomorrow_raises_a_due_soon_alert_without_penalty() {
    let lib = library();
    let book = lib.book("999", 1).await;
    let student = lib.student("J-1").await;
    lib.issue_direct(book.id, "J-1", "2025-03-11").await;

    let alerts = lib
        .services
        .penalty
        .due_soon_alerts(student.id, lib.clock.now())
        .await
        .unwrap();

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].status, AlertLevel::DueSoon);
    assert_eq!(alerts[0].days_difference, 1);
    assert_eq!(alerts[0].penalty, 0);
}

#[tokio::test]
async fn return_settles_the_final_penalty() {
    let lib = library();
    let book = lib.book("1010", 1).await;
    let student = lib.student("K-1").await;
    let issue_id = lib.issue_direct(book.id, "K-1", "2025-03-08").await;

    let returned = lib.services.lifecycle.return_book(issue_id).await.unwrap();
    assert_eq!(returned.penalty, 20);

    // Penalties stop accruing once the copy is back
    lib.clock.advance(Duration::days(5));
    lib.services.penalty.recompute_all(lib.clock.now()).await.unwrap();
    assert_eq!(lib.repository.issues.get(issue_id).await.unwrap().penalty, 20);
    assert_eq!(
        lib.repository.students.get(student.id).await.unwrap().total_penalty,
        0
    );
}

#[tokio::test]
async fn untaken_reservation_is_reclaimed_after_eight_days() {
    let lib = library();
    let book = lib.book("1111", 1).await;
    let student = lib.student("L-1").await;
    let lifecycle = &lib.services.lifecycle;

    let request = lifecycle.submit_borrow_request(student.id, book.id).await.unwrap();
    lifecycle
        .approve_borrow_request(request.id, lib.librarian, None)
        .await
        .unwrap();
    lib.clock.advance(Duration::days(8));

    let sweeper = lib.services.sweeper(&lib.config);
    let report = sweeper.sweep().await.unwrap();

    assert_eq!(report.reclaimed, vec![request.id]);
    assert_eq!(lib.available(book.id).await, 1);
    assert!(matches!(
        lib.repository.borrow_requests.get(request.id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn concurrent_sweeps_reclaim_exactly_once() {
    let lib = library();
    let book = lib.book("1212", 2).await;
    let student = lib.student("M-1").await;
    let lifecycle = &lib.services.lifecycle;

    let request = lifecycle.submit_borrow_request(student.id, book.id).await.unwrap();
    lifecycle
        .approve_borrow_request(request.id, lib.librarian, None)
        .await
        .unwrap();
    lib.clock.advance(Duration::days(8));

    let sweeper = lib.services.sweeper(&lib.config);
    let (first, second) = tokio::join!(sweeper.sweep(), sweeper.sweep());
    let reclaimed = first.unwrap().reclaimed.len() + second.unwrap().reclaimed.len();
    assert_eq!(reclaimed, 1);

    let third = sweeper.sweep().await.unwrap();
    assert!(third.reclaimed.is_empty());
    assert_eq!(lib.available(book.id).await, 2);
}

#[tokio::test]
async fn pickup_after_the_sweep_reclaimed_the_reservation_is_refused() {
    let lib = library();
    let book = lib.book("1818", 1).await;
    let student = lib.student("S-1").await;
    let lifecycle = &lib.services.lifecycle;

    let request = lifecycle.submit_borrow_request(student.id, book.id).await.unwrap();
    lifecycle
        .approve_borrow_request(request.id, lib.librarian, None)
        .await
        .unwrap();
    lib.clock.advance(Duration::days(8));

    let report = lib.services.sweeper(&lib.config).sweep().await.unwrap();
    assert_eq!(report.reclaimed, vec![request.id]);

    let taken = lifecycle.mark_as_taken(request.id, lib.librarian, None).await;
    assert!(matches!(taken, Err(AppError::NotFound(_))));

    assert_eq!(lib.repository.issues.count_open_for_book(book.id).await.unwrap(), 0);
    assert_eq!(lib.available(book.id).await, 1);
    assert_eq!(lib.accounted(book.id).await, 1);
}

#[tokio::test]
async fn taken_reservation_survives_the_sweep() {
    let lib = library();
    let book = lib.book("1313", 1).await;
    let student = lib.student("N-1").await;
    let lifecycle = &lib.services.lifecycle;

    let request = lifecycle.submit_borrow_request(student.id, book.id).await.unwrap();
    lifecycle
        .approve_borrow_request(request.id, lib.librarian, None)
        .await
        .unwrap();
    lifecycle
        .mark_as_taken(request.id, lib.librarian, None)
        .await
        .unwrap();
    lib.clock.advance(Duration::days(30));

    let report = lib.services.sweeper(&lib.config).sweep().await.unwrap();
    assert_eq!(report.examined, 0);
    assert_eq!(lib.available(book.id).await, 0);
}

#[tokio::test]
async fn reconcile_repairs_a_drifted_counter() {
    let lib = library();
    let book = lib.book("1414", 3).await;
    let student = lib.student("O-1").await;
    let lifecycle = &lib.services.lifecycle;

    let request = lifecycle.submit_borrow_request(student.id, book.id).await.unwrap();
    lifecycle
        .approve_borrow_request(request.id, lib.librarian, None)
        .await
        .unwrap();
    lib.issue_direct(book.id, "O-1", "2025-03-24").await;

    lib.repository.books.set_available(book.id, 3).await.unwrap();

    let adjustments = lifecycle.reconcile_copies().await.unwrap();
    assert_eq!(adjustments.len(), 1);
    assert_eq!(adjustments[0].issued, 1);
    assert_eq!(adjustments[0].reserved, 1);
    assert_eq!(adjustments[0].corrected_available, 1);
    assert_eq!(lib.available(book.id).await, 1);

    assert!(lifecycle.reconcile_copies().await.unwrap().is_empty());
}

#[tokio::test]
async fn approved_donation_extends_an_existing_isbn() {
    let lib = library();
    let book = lib.book("1515", 1).await;
    let student = lib.student("P-1").await;
    let lifecycle = &lib.services.lifecycle;

    let donation = lifecycle
        .submit_donation(
            student.id,
            &SubmitDonation {
                title: "Donated".to_string(),
                author: "Someone".to_string(),
                isbn: "1515".to_string(),
                category: "General".to_string(),
            },
        )
        .await
        .unwrap();

    let review = ReviewDonation {
        decision: ReviewDecision::Approved,
        copies: Some(2),
    };
    let outcome = lifecycle
        .review_donation(donation.id, lib.librarian, &review)
        .await
        .unwrap();

    assert_eq!(outcome.donation.status, RequestStatus::Approved);
    let extended = outcome.book.unwrap();
    assert_eq!(extended.id, book.id);
    assert_eq!(extended.total_copies, 3);
    assert_eq!(extended.available_copies, 3);

    let again = lifecycle
        .review_donation(donation.id, lib.librarian, &review)
        .await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn failed_donation_approval_stays_pending_and_leaves_the_catalog_usable() {
    let lib = library();
    let book = lib.book("1717", i32::MAX - 1).await;
    let student = lib.student("R-1").await;
    let lifecycle = &lib.services.lifecycle;

    let donation = lifecycle
        .submit_donation(
            student.id,
            &SubmitDonation {
                title: "Donated".to_string(),
                author: "Someone".to_string(),
                isbn: "1717".to_string(),
                category: "General".to_string(),
            },
        )
        .await
        .unwrap();

    let oversized = ReviewDonation {
        decision: ReviewDecision::Approved,
        copies: Some(i32::MAX),
    };
    let result = lifecycle
        .review_donation(donation.id, lib.librarian, &oversized)
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    let overflowing = ReviewDonation {
        decision: ReviewDecision::Approved,
        copies: Some(5),
    };
    let result = lifecycle
        .review_donation(donation.id, lib.librarian, &overflowing)
        .await;
    assert!(matches!(result, Err(AppError::InvalidRequest(_))));

    let unchanged = lib.repository.books.get(book.id).await.unwrap();
    assert_eq!(unchanged.total_copies, i32::MAX - 1);
    assert_eq!(unchanged.available_copies, i32::MAX - 1);

    let reopened = lib.repository.donations.get(donation.id).await.unwrap();
    assert_eq!(reopened.status, RequestStatus::Pending);
    assert!(reopened.reviewed_by.is_none());

    let rejection = ReviewDonation {
        decision: ReviewDecision::Rejected,
        copies: None,
    };
    let outcome = lifecycle
        .review_donation(donation.id, lib.librarian, &rejection)
        .await
        .unwrap();
    assert_eq!(outcome.donation.status, RequestStatus::Rejected);
}

#[tokio::test]
async fn direct_issue_rejects_a_malformed_date_without_taking_a_copy() {
    let lib = library();
    let book = lib.book("1616", 1).await;

    let result = lib
        .services
        .lifecycle
        .issue_book_direct(
            &IssueBookDirect {
                book_id: book.id,
                student_name: "Walk-in".to_string(),
                student_roll_no: "Q-1".to_string(),
                due_date: "next tuesday".to_string(),
            },
            lib.librarian,
        )
        .await;

    assert!(matches!(result, Err(AppError::InvalidDate(_))));
    assert_eq!(lib.available(book.id).await, 1);
}
