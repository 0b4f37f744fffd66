//! Student model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Registered student
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Institutional roll number
    pub student_id: String,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub semester: Option<i32>,
    /// Sum of penalties over the student's open loans, as of the last recompute
    pub total_penalty: i64,
    /// Hashed password (argon2)
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Student registration request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterStudent {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Valid email is required"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 1, message = "Student ID is required"))]
    pub student_id: String,
    pub phone: Option<String>,
    #[validate(length(min = 1, message = "Department is required"))]
    pub department: String,
    #[validate(range(min = 1, message = "Semester is required"))]
    pub semester: i32,
}

/// Row to insert once the password has been hashed
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub name: String,
    pub email: String,
    pub student_id: String,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub semester: Option<i32>,
    pub password_hash: String,
}

/// Update own profile request
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStudentProfile {
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    #[validate(range(min = 1, message = "Semester must be at least 1"))]
    pub semester: Option<i32>,
}

/// Per-student penalty line for the librarian overview
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentPenaltySummary {
    pub id: Uuid,
    pub name: String,
    pub student_id: String,
    pub department: Option<String>,
    pub total_penalty: i64,
}

impl From<&Student> for StudentPenaltySummary {
    fn from(student: &Student) -> Self {
        Self {
            id: student.id,
            name: student.name.clone(),
            student_id: student.student_id.clone(),
            department: student.department.clone(),
            total_penalty: student.total_penalty,
        }
    }
}
