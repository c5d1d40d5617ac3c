use super::DBClient;
use crate::models::{User, UserRole};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, username, email, first_name, last_name, bio, role, created_at, updated_at";

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Default, Clone)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub role: Option<UserRole>,
}

/// User database operations trait
pub trait UserExt {
    /// Get single user by ID, username, or email.
    /// Returns Option - Some(user) if found, None if not found
    async fn get_user(
        &self,
        user_id: Option<Uuid>,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, sqlx::Error>;

    /// Get the user matching exactly this (username, email) pair, if any.
    /// Distinguishes a resubmitted signup from a conflicting one.
    async fn get_user_by_credentials(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, sqlx::Error>;

    /// Get paginated list of all users
    async fn get_users(&self, page: u32, limit: usize) -> Result<Vec<User>, sqlx::Error>;

    /// Get total count of all users
    async fn get_user_count(&self) -> Result<i64, sqlx::Error>;

    /// Create a user through signup; role defaults to "user" in the schema.
    async fn save_user(&self, username: &str, email: &str) -> Result<User, sqlx::Error>;

    /// Create a user with the full admin payload.
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
        bio: Option<&str>,
        role: UserRole,
    ) -> Result<User, sqlx::Error>;

    /// Partially update a user addressed by username.
    /// Always bumps updated_at, which invalidates outstanding confirmation codes.
    async fn update_user(
        &self,
        username: &str,
        changes: &UserChanges,
    ) -> Result<Option<User>, sqlx::Error>;

    /// Delete user by username
    async fn delete_user(&self, username: &str) -> Result<(), sqlx::Error>;
}

impl UserExt for DBClient {
    async fn get_user(
        &self,
        user_id: Option<Uuid>,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, sqlx::Error> {
        let mut user: Option<User> = None;

        if let Some(user_id) = user_id {
            user = sqlx::query_as::<_, User>(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
            ))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        } else if let Some(username) = username {
            user = sqlx::query_as::<_, User>(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
            ))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        } else if let Some(email) = email {
            user = sqlx::query_as::<_, User>(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
            ))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        }

        Ok(user)
    }

    async fn get_user_by_credentials(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 AND email = $2"
        ))
        .bind(username)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn get_users(&self, page: u32, limit: usize) -> Result<Vec<User>, sqlx::Error> {
        let offset = (page - 1) * limit as u32;

        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY username LIMIT $1 OFFSET $2"
        ))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn get_user_count(&self) -> Result<i64, sqlx::Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn save_user(&self, username: &str, email: &str) -> Result<User, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, email) VALUES ($1, $2) RETURNING {USER_COLUMNS}"
        ))
        .bind(username)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create_user(
        &self,
        username: &str,
        email: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
        bio: Option<&str>,
        role: UserRole,
    ) -> Result<User, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, email, first_name, last_name, bio, role) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        ))
        .bind(username)
        .bind(email)
        .bind(first_name)
        .bind(last_name)
        .bind(bio)
        .bind(role)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn update_user(
        &self,
        username: &str,
        changes: &UserChanges,
    ) -> Result<Option<User>, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("UPDATE users SET updated_at = NOW()");

        if let Some(new_username) = &changes.username {
            qb.push(", username = ").push_bind(new_username.clone());
        }
        if let Some(email) = &changes.email {
            qb.push(", email = ").push_bind(email.clone());
        }
        if let Some(first_name) = &changes.first_name {
            qb.push(", first_name = ").push_bind(first_name.clone());
        }
        if let Some(last_name) = &changes.last_name {
            qb.push(", last_name = ").push_bind(last_name.clone());
        }
        if let Some(bio) = &changes.bio {
            qb.push(", bio = ").push_bind(bio.clone());
        }
        if let Some(role) = changes.role {
            qb.push(", role = ").push_bind(role);
        }

        qb.push(" WHERE username = ").push_bind(username);
        qb.push(format!(" RETURNING {USER_COLUMNS}"));

        qb.build_query_as::<User>()
            .fetch_optional(&self.pool)
            .await
    }

    async fn delete_user(&self, username: &str) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        Ok(())
    }
}
