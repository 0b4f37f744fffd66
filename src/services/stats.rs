//! Statistics service

use std::sync::Arc;

use crate::{
    api::stats::{BookStats, LoanStats, PendingStats, StatsResponse},
    clock::Clock,
    error::AppResult,
    models::enums::{IssueStatus, RequestStatus},
    repository::Repository,
};

/// Entries shown in each "recent" list of the dashboard
const RECENT_LIMIT: i64 = 5;

#[derive(Clone)]
pub struct StatsService {
    repository: Repository,
    clock: Arc<dyn Clock>,
}

impl StatsService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Librarian dashboard figures as of now
    pub async fn get_stats(&self) -> AppResult<StatsResponse> {
        let now = self.clock.now();
        let totals = self.repository.books.totals().await?;
        let issues = &self.repository.issues;

        let loans = LoanStats {
            issued: issues.count_by_status(IssueStatus::Issued, now).await?,
            overdue: issues.count_by_status(IssueStatus::Overdue, now).await?,
            returned: issues.count_by_status(IssueStatus::Returned, now).await?,
        };

        let pending = PendingStats {
            borrow_requests: self
                .repository
                .borrow_requests
                .count_by_status(RequestStatus::Pending)
                .await?,
            donations: self
                .repository
                .donations
                .count_by_status(RequestStatus::Pending)
                .await?,
        };

        let mut recent_issues = issues.recent(IssueStatus::Issued, RECENT_LIMIT).await?;
        for details in &mut recent_issues {
            details.record.status = details.record.effective_status(now);
        }
        let recent_returns = issues.recent(IssueStatus::Returned, RECENT_LIMIT).await?;

        Ok(StatsResponse {
            books: BookStats {
                titles: totals.titles,
                total_copies: totals.total_copies,
                available_copies: totals.available_copies,
            },
            loans,
            pending,
            students: self.repository.students.count().await?,
            recent_issues,
            recent_returns,
        })
    }
}
