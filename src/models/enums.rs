//! Status and role enums shared by the lending models.
//!
//! All of them are persisted as lowercase TEXT columns.

use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, Postgres};
use utoipa::ToSchema;

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($name), s)),
                }
            }
        }

        impl sqlx::Type<Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <String as sqlx::Type<Postgres>>::compatible(ty)
            }
        }

        impl<'r> Decode<'r, Postgres> for $name {
            fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
                let s: String = Decode::<Postgres>::decode(value)?;
                s.parse().map_err(|e: String| e.into())
            }
        }

        impl Encode<'_, Postgres> for $name {
            fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
                let s: String = self.as_str().to_string();
                <String as Encode<Postgres>>::encode(s, buf)
            }
        }
    };
}

text_enum! {
    /// Catalog visibility of a book (inactive = soft-deleted)
    BookStatus {
        Active => "active",
        Inactive => "inactive",
    }
}

text_enum! {
    /// Review state of a borrow request or a donation
    RequestStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

text_enum! {
    /// Loan state. `Overdue` is derived at read time and never stored.
    IssueStatus {
        Issued => "issued",
        Returned => "returned",
        Overdue => "overdue",
    }
}

text_enum! {
    /// Actor role carried in access tokens
    Role {
        Student => "student",
        Librarian => "librarian",
        /// Passes every librarian check
        Admin => "admin",
    }
}

impl Role {
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Librarian | Role::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Approved".parse::<RequestStatus>().unwrap(), RequestStatus::Approved);
        assert_eq!("INACTIVE".parse::<BookStatus>().unwrap(), BookStatus::Inactive);
        assert!("lost".parse::<IssueStatus>().is_err());
    }

    #[test]
    fn test_serde_uses_stored_spelling() {
        assert_eq!(serde_json::to_string(&IssueStatus::Returned).unwrap(), "\"returned\"");
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert!(role.is_staff());
        assert!(!Role::Student.is_staff());
    }
}
