use chrono::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Inclusive bounds for a review score.
pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 10;

/// User role enumeration for role-based access control.
///
/// Stored in the database as a PostgreSQL ENUM type called "user_role".
/// Authorization decisions go through the capability predicates below, not
/// through comparisons against individual variants.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Moderator,
    Admin,
}

impl UserRole {
    pub fn to_str(&self) -> &str {
        match self {
            UserRole::User => "user",
            UserRole::Moderator => "moderator",
            UserRole::Admin => "admin",
        }
    }

    /// User management and catalog writes.
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    /// May edit or delete any review or comment, not just their own.
    pub fn can_moderate(&self) -> bool {
        matches!(self, UserRole::Moderator | UserRole::Admin)
    }
}

impl FromStr for UserRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(UserRole::User),
            "moderator" => Ok(UserRole::Moderator),
            "admin" => Ok(UserRole::Admin),
            _ => Err(()),
        }
    }
}

/// User model representing the users table.
///
/// There is no password column: sign-in happens by exchanging an emailed
/// confirmation code for an access token. `updated_at` feeds the
/// confirmation-code MAC, so any profile or role change invalidates codes
/// issued earlier.
#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub role: UserRole,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A slug-addressed grouping of titles (e.g. "films", "books").
#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct Genre {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

/// A reviewable creative work.
///
/// `category_id` is nullable: deleting a category detaches its titles
/// instead of cascading. Genres attach through the genre_title link table.
/// The rating is always computed from reviews at read time, never stored.
#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct Title {
    pub id: i64,
    pub name: String,
    pub year: i32,
    pub description: Option<String>,
    pub category_id: Option<i64>,
}

/// One user's review of one title.
///
/// The (title_id, author_id) pair is UNIQUE in the database; that constraint
/// is the single enforcement point for one-review-per-user-per-title.
#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct Review {
    pub id: i64,
    pub title_id: i64,
    pub author_id: Uuid,
    pub text: String,
    pub score: i32,
    pub pub_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct Comment {
    pub id: i64,
    pub review_id: i64,
    pub author_id: Uuid,
    pub text: String,
    pub pub_date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in [UserRole::User, UserRole::Moderator, UserRole::Admin] {
            assert_eq!(UserRole::from_str(role.to_str()), Ok(role));
        }
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!(UserRole::from_str("superuser").is_err());
        assert!(UserRole::from_str("Admin").is_err());
        assert!(UserRole::from_str("").is_err());
    }

    #[test]
    fn only_admin_holds_admin_capability() {
        assert!(UserRole::Admin.is_admin());
        assert!(!UserRole::Moderator.is_admin());
        assert!(!UserRole::User.is_admin());
    }

    #[test]
    fn moderation_capability_covers_moderator_and_admin() {
        assert!(UserRole::Admin.can_moderate());
        assert!(UserRole::Moderator.can_moderate());
        assert!(!UserRole::User.can_moderate());
    }
}
