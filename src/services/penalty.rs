//! Overdue detection and penalty accrual.
//!
//! Penalties are always recomputed from the due dates, never accumulated, so
//! running a recompute twice at the same instant changes nothing. All
//! comparisons are made on UTC calendar days.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::LifecycleConfig,
    error::{AppError, AppResult},
    models::{issue::IssueRecord, student::StudentPenaltySummary},
    repository::Repository,
};

/// Whole UTC days between the due date and `as_of`, zero if not yet due
pub fn days_overdue(due_date: DateTime<Utc>, as_of: DateTime<Utc>) -> i64 {
    (as_of.date_naive() - due_date.date_naive()).num_days().max(0)
}

/// An open record whose due day is before the `as_of` day
pub fn is_overdue(record: &IssueRecord, as_of: DateTime<Utc>) -> bool {
    record.is_open() && record.due_date.date_naive() < as_of.date_naive()
}

pub fn compute_penalty(record: &IssueRecord, as_of: DateTime<Utc>, per_day: i64) -> i64 {
    if is_overdue(record, as_of) {
        days_overdue(record.due_date, as_of) * per_day
    } else {
        0
    }
}

/// Alert level of an open loan relative to its due date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum AlertLevel {
    Overdue,
    DueToday,
    DueSoon,
}

/// Classify a due date against `as_of`. Returns the level and the signed day
/// difference (`due - as_of`), or `None` when the due date is beyond the horizon.
pub fn classify(
    due_date: DateTime<Utc>,
    as_of: DateTime<Utc>,
    horizon_days: i64,
) -> Option<(AlertLevel, i64)> {
    let difference = (due_date.date_naive() - as_of.date_naive()).num_days();
    match difference {
        d if d < 0 => Some((AlertLevel::Overdue, d)),
        0 => Some((AlertLevel::DueToday, 0)),
        d if d <= horizon_days => Some((AlertLevel::DueSoon, d)),
        _ => None,
    }
}

/// Due-soon / overdue alert for one open loan
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DueAlert {
    pub issue_id: Uuid,
    pub book_id: Uuid,
    pub book_title: Option<String>,
    pub due_date: DateTime<Utc>,
    pub status: AlertLevel,
    /// Due day minus today; negative when overdue
    pub days_difference: i64,
    pub days_overdue: i64,
    /// Projected penalty, zero unless overdue
    pub penalty: i64,
}

/// One student's recomputed total
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentPenaltyTotal {
    pub student_id: Uuid,
    pub total_penalty: i64,
}

/// Result of a penalty recompute
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PenaltyReport {
    /// Sum over every student in the report
    pub total_penalty: i64,
    pub students: Vec<StudentPenaltyTotal>,
    /// Open records with their refreshed penalty
    pub records: Vec<IssueRecord>,
}

/// Overdue loan line for the librarian monitor
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OverdueEntry {
    pub issue_id: Uuid,
    pub book_id: Uuid,
    pub book_title: Option<String>,
    pub student_id: Option<Uuid>,
    pub student_name: String,
    pub student_roll_no: String,
    pub student_dept: Option<String>,
    pub student_year: Option<i32>,
    pub due_date: DateTime<Utc>,
    pub days_overdue: i64,
    pub penalty: i64,
}

#[derive(Clone)]
pub struct PenaltyService {
    repository: Repository,
    config: LifecycleConfig,
}

impl PenaltyService {
    pub fn new(repository: Repository, config: LifecycleConfig) -> Self {
        Self { repository, config }
    }

    pub fn penalty_for(&self, record: &IssueRecord, as_of: DateTime<Utc>) -> i64 {
        compute_penalty(record, as_of, self.config.penalty_per_day)
    }

    /// Recompute every open record of one student and the student's total
    pub async fn recompute_student_penalty(
        &self,
        student_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> AppResult<PenaltyReport> {
        self.repository.students.get(student_id).await?;

        let records = self.refresh_records(Some(student_id), as_of).await?;
        let total: i64 = records.iter().map(|r| r.penalty).sum();
        self.repository
            .students
            .set_total_penalty(student_id, total)
            .await?;

        tracing::debug!(%student_id, total, "Recomputed student penalty");

        Ok(PenaltyReport {
            total_penalty: total,
            students: vec![StudentPenaltyTotal {
                student_id,
                total_penalty: total,
            }],
            records,
        })
    }

    /// Recompute every open record and every student's total. Students with no
    /// open loans are reset to zero.
    pub async fn recompute_all(&self, as_of: DateTime<Utc>) -> AppResult<PenaltyReport> {
        let records = self.refresh_records(None, as_of).await?;

        let mut totals: HashMap<Uuid, i64> = HashMap::new();
        for record in &records {
            if let Some(student_id) = record.student_id {
                *totals.entry(student_id).or_default() += record.penalty;
            }
        }

        let mut students = Vec::new();
        for student in self.repository.students.list().await? {
            let total = totals.get(&student.id).copied().unwrap_or(0);
            if student.total_penalty != total {
                self.repository
                    .students
                    .set_total_penalty(student.id, total)
                    .await?;
            }
            students.push(StudentPenaltyTotal {
                student_id: student.id,
                total_penalty: total,
            });
        }

        let total_penalty = students.iter().map(|s| s.total_penalty).sum();
        tracing::info!(
            records = records.len(),
            students = students.len(),
            total_penalty,
            "Recomputed all penalties"
        );

        Ok(PenaltyReport {
            total_penalty,
            students,
            records,
        })
    }

    /// Fix the penalty of a record that was just returned and refresh its
    /// student's total
    pub async fn settle_returned(&self, record: &IssueRecord, returned_at: DateTime<Utc>) -> AppResult<i64> {
        let penalty = days_overdue(record.due_date, returned_at) * self.config.penalty_per_day;
        self.repository.issues.set_penalty(record.id, penalty).await?;

        if let Some(student_id) = record.student_id {
            self.recompute_student_penalty(student_id, returned_at).await?;
        }
        Ok(penalty)
    }

    /// Alerts for the student's open loans that are overdue or due within the
    /// configured horizon
    pub async fn due_soon_alerts(
        &self,
        student_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> AppResult<Vec<DueAlert>> {
        let records = self.repository.issues.list_open(Some(student_id)).await?;
        let mut titles = BookTitles::new(&self.repository);

        let mut alerts = Vec::new();
        for record in records {
            let Some((status, days_difference)) =
                classify(record.due_date, as_of, self.config.due_soon_horizon_days)
            else {
                continue;
            };

            alerts.push(DueAlert {
                issue_id: record.id,
                book_id: record.book_id,
                book_title: titles.get(record.book_id).await?,
                due_date: record.due_date,
                status,
                days_difference,
                days_overdue: days_overdue(record.due_date, as_of),
                penalty: self.penalty_for(&record, as_of),
            });
        }
        Ok(alerts)
    }

    /// Every overdue open loan, most overdue first
    pub async fn overdue_students(&self, as_of: DateTime<Utc>) -> AppResult<Vec<OverdueEntry>> {
        let records = self.repository.issues.list_open(None).await?;
        let mut titles = BookTitles::new(&self.repository);

        let mut entries = Vec::new();
        for record in records.into_iter().filter(|r| is_overdue(r, as_of)) {
            entries.push(OverdueEntry {
                issue_id: record.id,
                book_id: record.book_id,
                book_title: titles.get(record.book_id).await?,
                student_id: record.student_id,
                days_overdue: days_overdue(record.due_date, as_of),
                penalty: self.penalty_for(&record, as_of),
                student_name: record.student_name,
                student_roll_no: record.student_roll_no,
                student_dept: record.student_dept,
                student_year: record.student_year,
                due_date: record.due_date,
            });
        }
        entries.sort_by(|a, b| b.days_overdue.cmp(&a.days_overdue));
        Ok(entries)
    }

    /// Cached totals of every student, highest first
    pub async fn student_penalties(&self) -> AppResult<Vec<StudentPenaltySummary>> {
        let mut summaries: Vec<StudentPenaltySummary> = self
            .repository
            .students
            .list()
            .await?
            .iter()
            .map(StudentPenaltySummary::from)
            .collect();
        summaries.sort_by(|a, b| b.total_penalty.cmp(&a.total_penalty));
        Ok(summaries)
    }

    async fn refresh_records(
        &self,
        student_id: Option<Uuid>,
        as_of: DateTime<Utc>,
    ) -> AppResult<Vec<IssueRecord>> {
        let mut records = self.repository.issues.list_open(student_id).await?;
        for record in &mut records {
            let penalty = self.penalty_for(record, as_of);
            if record.penalty != penalty {
                self.repository.issues.set_penalty(record.id, penalty).await?;
                record.penalty = penalty;
            }
        }
        Ok(records)
    }
}

/// Book title lookups memoized for one listing
struct BookTitles<'a> {
    repository: &'a Repository,
    cache: HashMap<Uuid, Option<String>>,
}

impl<'a> BookTitles<'a> {
    fn new(repository: &'a Repository) -> Self {
        Self {
            repository,
            cache: HashMap::new(),
        }
    }

    async fn get(&mut self, book_id: Uuid) -> AppResult<Option<String>> {
        if let Some(title) = self.cache.get(&book_id) {
            return Ok(title.clone());
        }
        let title = match self.repository.books.get(book_id).await {
            Ok(book) => Some(book.title),
            Err(AppError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        self.cache.insert(book_id, title.clone());
        Ok(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::enums::IssueStatus,
        repository::{books::MockBooksRepository, issues::MockIssuesRepository},
    };
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 15, 30, 0).unwrap()
    }

    fn record(due_date: DateTime<Utc>, status: IssueStatus) -> IssueRecord {
        IssueRecord {
            id: Uuid::new_v4(),
            book_id: Uuid::new_v4(),
            student_id: Some(Uuid::new_v4()),
            student_name: "Asha".to_string(),
            student_roll_no: "CS-01".to_string(),
            student_dept: Some("CS".to_string()),
            student_year: Some(3),
            issue_date: due_date - Duration::days(14),
            due_date,
            return_date: None,
            status,
            penalty: 0,
            librarian_id: Uuid::new_v4(),
            borrow_request_id: None,
        }
    }

    #[test]
    fn test_three_days_late_costs_thirty() {
        let r = record(as_of() - Duration::days(3), IssueStatus::Issued);
        assert!(is_overdue(&r, as_of()));
        assert_eq!(compute_penalty(&r, as_of(), 10), 30);
    }

    #[test]
    fn test_due_today_is_not_overdue() {
        // Due earlier the same UTC day
        let r = record(as_of() - Duration::hours(10), IssueStatus::Issued);
        assert!(!is_overdue(&r, as_of()));
        assert_eq!(compute_penalty(&r, as_of(), 10), 0);
    }

    #[test]
    fn test_returned_record_accrues_nothing() {
        let r = record(as_of() - Duration::days(5), IssueStatus::Returned);
        assert!(!is_overdue(&r, as_of()));
        assert_eq!(compute_penalty(&r, as_of(), 10), 0);
    }

    #[test]
    fn test_days_overdue_counts_calendar_days() {
        // 23:59 the day before counts as one full day late
        let due = Utc.with_ymd_and_hms(2025, 3, 9, 23, 59, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2025, 3, 10, 0, 1, 0).unwrap();
        assert_eq!(days_overdue(due, early), 1);
        assert_eq!(days_overdue(as_of() + Duration::days(2), as_of()), 0);
    }

    #[test]
    fn test_classify_alert_levels() {
        assert_eq!(
            classify(as_of() + Duration::days(1), as_of(), 2),
            Some((AlertLevel::DueSoon, 1))
        );
        assert_eq!(
            classify(as_of() + Duration::days(2), as_of(), 2),
            Some((AlertLevel::DueSoon, 2))
        );
        assert_eq!(classify(as_of(), as_of(), 2), Some((AlertLevel::DueToday, 0)));
        assert_eq!(
            classify(as_of() - Duration::days(4), as_of(), 2),
            Some((AlertLevel::Overdue, -4))
        );
        assert_eq!(classify(as_of() + Duration::days(3), as_of(), 2), None);
    }

    #[test]
    fn test_alert_level_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&AlertLevel::DueSoon).unwrap(),
            "\"due-soon\""
        );
        assert_eq!(
            serde_json::to_string(&AlertLevel::DueToday).unwrap(),
            "\"due-today\""
        );
    }

    #[tokio::test]
    async fn test_overdue_listing_surfaces_store_failures() {
        let late = record(as_of() - Duration::days(2), IssueStatus::Issued);

        let mut issues = MockIssuesRepository::new();
        issues
            .expect_list_open()
            .returning(move |_| Ok(vec![late.clone()]));

        let mut books = MockBooksRepository::new();
        books
            .expect_get()
            .returning(|_| Err(AppError::Internal("connection reset".to_string())));

        let mut repository = Repository::in_memory();
        repository.issues = Arc::new(issues);
        repository.books = Arc::new(books);

        let service = PenaltyService::new(repository, LifecycleConfig::default());
        let result = service.overdue_students(as_of()).await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn test_overdue_listing_tolerates_missing_books() {
        let late = record(as_of() - Duration::days(2), IssueStatus::Issued);

        let mut issues = MockIssuesRepository::new();
        issues
            .expect_list_open()
            .returning(move |_| Ok(vec![late.clone()]));

        let mut books = MockBooksRepository::new();
        books
            .expect_get()
            .returning(|id| Err(AppError::NotFound(format!("Book with id {} not found", id))));

        let mut repository = Repository::in_memory();
        repository.issues = Arc::new(issues);
        repository.books = Arc::new(books);

        let service = PenaltyService::new(repository, LifecycleConfig::default());
        let entries = service.overdue_students(as_of()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].book_title.is_none());
    }
}
