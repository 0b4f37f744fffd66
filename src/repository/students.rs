//! Identity store: students

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::unique_violation;
use crate::{
    error::{AppError, AppResult},
    models::student::{NewStudent, Student, UpdateStudentProfile},
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StudentsRepository: Send + Sync {
    /// Fails with `Conflict` when the email or roll number is taken
    async fn create(&self, student: &NewStudent) -> AppResult<Student>;

    async fn get(&self, id: Uuid) -> AppResult<Student>;

    async fn find_by_email(&self, email: &str) -> AppResult<Option<Student>>;

    async fn find_by_roll_no(&self, roll_no: &str) -> AppResult<Option<Student>>;

    async fn update_profile(&self, id: Uuid, update: &UpdateStudentProfile) -> AppResult<Student>;

    async fn set_total_penalty(&self, id: Uuid, total: i64) -> AppResult<()>;

    async fn list(&self) -> AppResult<Vec<Student>>;

    async fn count(&self) -> AppResult<i64>;
}

#[derive(Clone)]
pub struct PgStudentsRepository {
    pool: Pool<Postgres>,
}

impl PgStudentsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StudentsRepository for PgStudentsRepository {
    async fn create(&self, student: &NewStudent) -> AppResult<Student> {
        sqlx::query_as::<_, Student>(
            r#"
            INSERT INTO students (id, name, email, student_id, phone, department, semester,
                                  total_penalty, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&student.name)
        .bind(&student.email)
        .bind(&student.student_id)
        .bind(&student.phone)
        .bind(&student.department)
        .bind(student.semester)
        .bind(&student.password_hash)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, "Student with this email or student ID already exists"))
    }

    async fn get(&self, id: Uuid) -> AppResult<Student> {
        sqlx::query_as::<_, Student>("SELECT * FROM students WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Student with id {} not found", id)))
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<Student>> {
        let student =
            sqlx::query_as::<_, Student>("SELECT * FROM students WHERE LOWER(email) = LOWER($1)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(student)
    }

    async fn find_by_roll_no(&self, roll_no: &str) -> AppResult<Option<Student>> {
        let student = sqlx::query_as::<_, Student>("SELECT * FROM students WHERE student_id = $1")
            .bind(roll_no)
            .fetch_optional(&self.pool)
            .await?;
        Ok(student)
    }

    async fn update_profile(&self, id: Uuid, data: &UpdateStudentProfile) -> AppResult<Student> {
        let mut sets: Vec<String> = Vec::new();
        let mut idx = 1;

        macro_rules! add_field {
            ($field:expr, $name:expr) => {
                if $field.is_some() {
                    sets.push(format!("{} = ${}", $name, idx));
                    idx += 1;
                }
            };
        }

        add_field!(data.name, "name");
        add_field!(data.email, "email");
        add_field!(data.phone, "phone");
        add_field!(data.department, "department");
        add_field!(data.semester, "semester");

        if sets.is_empty() {
            return self.get(id).await;
        }

        let query = format!(
            "UPDATE students SET {} WHERE id = ${} RETURNING *",
            sets.join(", "),
            idx
        );

        let mut builder = sqlx::query_as::<_, Student>(&query);

        macro_rules! bind_field {
            ($field:expr) => {
                if let Some(ref val) = $field {
                    builder = builder.bind(val);
                }
            };
        }

        bind_field!(data.name);
        bind_field!(data.email);
        bind_field!(data.phone);
        bind_field!(data.department);
        bind_field!(data.semester);

        builder
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| unique_violation(e, "Email is already in use"))?
            .ok_or_else(|| AppError::NotFound(format!("Student with id {} not found", id)))
    }

    async fn set_total_penalty(&self, id: Uuid, total: i64) -> AppResult<()> {
        sqlx::query("UPDATE students SET total_penalty = $2 WHERE id = $1")
            .bind(id)
            .bind(total)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self) -> AppResult<Vec<Student>> {
        let students = sqlx::query_as::<_, Student>("SELECT * FROM students ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(students)
    }

    async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
