//! Student self-service: profile and borrowing history

use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    clock::Clock,
    error::AppResult,
    models::{
        enums::IssueStatus,
        issue::IssueRecordDetails,
        student::{Student, UpdateStudentProfile},
    },
    repository::Repository,
};

/// A student's loans split by state
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowingHistory {
    pub current: Vec<IssueRecordDetails>,
    pub returned: Vec<IssueRecordDetails>,
    /// Cached total as of the last penalty recompute
    pub total_penalty: i64,
}

#[derive(Clone)]
pub struct StudentService {
    repository: Repository,
    clock: Arc<dyn Clock>,
}

impl StudentService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    pub async fn get_profile(&self, student_id: Uuid) -> AppResult<Student> {
        self.repository.students.get(student_id).await
    }

    pub async fn update_profile(
        &self,
        student_id: Uuid,
        mut update: UpdateStudentProfile,
    ) -> AppResult<Student> {
        update.validate()?;
        update.email = update.email.map(|e| e.trim().to_lowercase());
        let student = self
            .repository
            .students
            .update_profile(student_id, &update)
            .await?;
        tracing::info!(%student_id, "Student profile updated");
        Ok(student)
    }

    pub async fn history(&self, student_id: Uuid) -> AppResult<BorrowingHistory> {
        let student = self.repository.students.get(student_id).await?;
        let now = self.clock.now();
        let (current, returned) = self
            .repository
            .issues
            .list_by_student(student_id)
            .await?
            .into_iter()
            .map(|mut d| {
                d.record.status = d.record.effective_status(now);
                d
            })
            .partition(|d| d.record.status != IssueStatus::Returned);

        Ok(BorrowingHistory {
            current,
            returned,
            total_penalty: student.total_penalty,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::FixedClock,
        models::{book::CreateBook, issue::NewIssueRecord, student::NewStudent},
    };
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_history_marks_late_loans_overdue() {
        let repository = Repository::in_memory();
        let now = Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap();
        let service = StudentService::new(repository.clone(), Arc::new(FixedClock::new(now)));

        let student = repository
            .students
            .create(&NewStudent {
                name: "Asha".to_string(),
                email: "asha@example.edu".to_string(),
                student_id: "CS-01".to_string(),
                phone: None,
                department: Some("CS".to_string()),
                semester: Some(3),
                password_hash: String::new(),
            })
            .await
            .unwrap();
        let book = repository
            .books
            .create(&CreateBook {
                title: "Dune".to_string(),
                author: "Frank Herbert".to_string(),
                isbn: "978-0441013593".to_string(),
                category: "Fiction".to_string(),
                description: None,
                published_year: None,
                total_copies: 1,
            })
            .await
            .unwrap();
        repository
            .issues
            .create(&NewIssueRecord {
                book_id: book.id,
                student_id: Some(student.id),
                student_name: student.name.clone(),
                student_roll_no: student.student_id.clone(),
                student_dept: None,
                student_year: None,
                issue_date: now - Duration::days(20),
                due_date: now - Duration::days(6),
                librarian_id: Uuid::new_v4(),
                borrow_request_id: None,
            })
            .await
            .unwrap();

        let history = service.history(student.id).await.unwrap();
        assert!(history.returned.is_empty());
        assert_eq!(history.current.len(), 1);
        assert_eq!(history.current[0].record.status, IssueStatus::Overdue);
        assert_eq!(history.current[0].book_title.as_deref(), Some("Dune"));
    }
}
