//! Access token claims and role checks

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Role;
use crate::error::AppError;

/// JWT claims for authenticated actors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Student or librarian id, depending on `role`
    pub sub: Uuid,
    pub role: Role,
    /// Display name (student name or librarian username)
    pub name: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn is_librarian(&self) -> bool {
        self.role.is_staff()
    }

    pub fn require_librarian(&self) -> Result<(), AppError> {
        if self.is_librarian() {
            Ok(())
        } else {
            Err(AppError::Authorization("Librarian privileges required".to_string()))
        }
    }

    /// Returns the student id carried by the token
    pub fn require_student(&self) -> Result<Uuid, AppError> {
        if self.role == Role::Student {
            Ok(self.sub)
        } else {
            Err(AppError::Authorization("Only students can perform this action".to_string()))
        }
    }

    /// Students may only look at their own records; librarians at anyone's.
    pub fn require_self_or_librarian(&self, student_id: Uuid) -> Result<(), AppError> {
        if self.is_librarian() || (self.role == Role::Student && self.sub == student_id) {
            Ok(())
        } else {
            Err(AppError::Authorization("Cannot access another student's records".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn claims(role: Role) -> Claims {
        let now = Utc::now().timestamp();
        Claims {
            sub: Uuid::new_v4(),
            role,
            name: "tester".to_string(),
            exp: now + 3600,
            iat: now,
        }
    }

    #[test]
    fn test_token_round_trip_keeps_role() {
        let original = claims(Role::Librarian);
        let token = original.create_token("secret").unwrap();
        let parsed = Claims::from_token(&token, "secret").unwrap();
        assert_eq!(parsed.sub, original.sub);
        assert_eq!(parsed.role, Role::Librarian);
    }

    #[test]
    fn test_token_rejected_with_wrong_secret() {
        let token = claims(Role::Student).create_token("secret").unwrap();
        assert!(Claims::from_token(&token, "other").is_err());
    }

    #[test]
    fn test_role_checks() {
        let student = claims(Role::Student);
        assert!(student.require_librarian().is_err());
        assert_eq!(student.require_student().unwrap(), student.sub);
        assert!(student.require_self_or_librarian(student.sub).is_ok());
        assert!(student.require_self_or_librarian(Uuid::new_v4()).is_err());

        let admin = claims(Role::Admin);
        assert!(admin.require_librarian().is_ok());
        assert!(admin.require_student().is_err());
        assert!(admin.require_self_or_librarian(Uuid::new_v4()).is_ok());
    }
}
