//! Registration, login and token issuance for students and librarians

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::{
        auth::Claims,
        enums::Role,
        librarian::{Librarian, NewLibrarian, RegisterLibrarian},
        student::{NewStudent, RegisterStudent, Student},
    },
    repository::Repository,
};

/// Token plus the profile of whoever it was issued to
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub token_type: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<Student>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub librarian: Option<Librarian>,
}

/// Profile behind a token
#[derive(Debug, Serialize, ToSchema)]
pub struct Profile {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<Student>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub librarian: Option<Librarian>,
}

#[derive(Clone)]
pub struct AuthService {
    repository: Repository,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    pub async fn register_student(&self, input: RegisterStudent) -> AppResult<AuthResponse> {
        input.validate()?;

        let student = self
            .repository
            .students
            .create(&NewStudent {
                name: input.name.trim().to_string(),
                email: input.email.trim().to_lowercase(),
                student_id: input.student_id.trim().to_string(),
                phone: input.phone,
                department: Some(input.department),
                semester: Some(input.semester),
                password_hash: self.hash_password(&input.password)?,
            })
            .await?;

        tracing::info!(student_id = %student.id, roll_no = %student.student_id, "Student registered");
        self.student_response(student)
    }

    pub async fn login_student(&self, email: &str, password: &str) -> AppResult<AuthResponse> {
        let student = self
            .repository
            .students
            .find_by_email(email.trim())
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid credentials".to_string()))?;

        if !verify_password(&student.password_hash, password)? {
            return Err(AppError::Authentication("Invalid credentials".to_string()));
        }
        self.student_response(student)
    }

    /// Register a librarian. The very first account becomes an admin; after
    /// that only an admin may add librarians.
    pub async fn register_librarian(
        &self,
        input: RegisterLibrarian,
        actor: Option<&Claims>,
    ) -> AppResult<AuthResponse> {
        input.validate()?;

        let role = if self.repository.librarians.count().await? == 0 {
            Role::Admin
        } else {
            match actor {
                Some(claims) if claims.role == Role::Admin => Role::Librarian,
                Some(_) => {
                    return Err(AppError::Authorization(
                        "Only an admin can register librarians".to_string(),
                    ))
                }
                None => {
                    return Err(AppError::Authentication(
                        "Authentication required to register librarians".to_string(),
                    ))
                }
            }
        };

        let librarian = self
            .repository
            .librarians
            .create(&NewLibrarian {
                username: input.username.trim().to_string(),
                email: input.email.trim().to_lowercase(),
                role,
                password_hash: self.hash_password(&input.password)?,
            })
            .await?;

        tracing::info!(librarian_id = %librarian.id, username = %librarian.username, %role, "Librarian registered");
        self.librarian_response(librarian)
    }

    pub async fn login_librarian(&self, username: &str, password: &str) -> AppResult<AuthResponse> {
        let librarian = self
            .repository
            .librarians
            .find_by_username(username.trim())
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid credentials".to_string()))?;

        if !verify_password(&librarian.password_hash, password)? {
            return Err(AppError::Authentication("Invalid credentials".to_string()));
        }
        self.librarian_response(librarian)
    }

    /// Current profile of the token holder
    pub async fn me(&self, claims: &Claims) -> AppResult<Profile> {
        let mut profile = Profile {
            role: claims.role,
            student: None,
            librarian: None,
        };
        match claims.role {
            Role::Student => profile.student = Some(self.repository.students.get(claims.sub).await?),
            Role::Librarian | Role::Admin => {
                profile.librarian = Some(self.repository.librarians.get(claims.sub).await?)
            }
        }
        Ok(profile)
    }

    /// Hash a password using Argon2
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }

    fn create_token(&self, sub: Uuid, role: Role, name: &str) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub,
            role,
            name: name.to_string(),
            exp: now + (self.config.jwt_expiration_hours as i64 * 3600),
            iat: now,
        };
        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    fn student_response(&self, student: Student) -> AppResult<AuthResponse> {
        Ok(AuthResponse {
            token: self.create_token(student.id, Role::Student, &student.name)?,
            token_type: "Bearer".to_string(),
            role: Role::Student,
            student: Some(student),
            librarian: None,
        })
    }

    fn librarian_response(&self, librarian: Librarian) -> AppResult<AuthResponse> {
        Ok(AuthResponse {
            token: self.create_token(librarian.id, librarian.role, &librarian.username)?,
            token_type: "Bearer".to_string(),
            role: librarian.role,
            student: None,
            librarian: Some(librarian),
        })
    }
}

fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
