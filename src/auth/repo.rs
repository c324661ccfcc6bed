use sqlx::PgPool;

use crate::auth::error::{AuthError, ConflictField};
pub use crate::auth::repo_types::User;

/// Idempotent schema for the user store. The unique constraint names are
/// matched in `conflict_field`.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    phone TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT users_email_key UNIQUE (email),
    CONSTRAINT users_phone_key UNIQUE (phone)
)
"#;

pub async fn ensure_schema(db: &PgPool) -> anyhow::Result<()> {
    sqlx::query(SCHEMA).execute(db).await?;
    tracing::debug!("users table ready");
    Ok(())
}

fn conflict_field(constraint: &str) -> Option<ConflictField> {
    match constraint {
        "users_email_key" => Some(ConflictField::Email),
        "users_phone_key" => Some(ConflictField::Phone),
        _ => None,
    }
}

impl User {
    /// Create a new user with hashed password.
    pub async fn create(
        db: &PgPool,
        name: &str,
        email: &str,
        phone: &str,
        password_hash: &str,
    ) -> Result<User, AuthError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, phone, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, phone, password_hash, created_at
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(phone)
        .bind(password_hash)
        .fetch_one(db)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    if let Some(field) = db_err.constraint().and_then(conflict_field) {
                        return AuthError::Conflict(field);
                    }
                }
            }
            AuthError::Database(e)
        })?;
        Ok(user)
    }

    /// Find a user by phone number.
    pub async fn find_by_phone(db: &PgPool, phone: &str) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, phone, password_hash, created_at
            FROM users
            WHERE phone = $1
            "#,
        )
        .bind(phone)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Find a user by ID.
    pub async fn find_by_id(db: &PgPool, id: i64) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, phone, password_hash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_email_constraint_to_email_field() {
        assert_eq!(conflict_field("users_email_key"), Some(ConflictField::Email));
    }

    #[test]
    fn maps_phone_constraint_to_phone_field() {
        assert_eq!(conflict_field("users_phone_key"), Some(ConflictField::Phone));
    }

    #[test]
    fn unknown_constraint_maps_to_none() {
        assert_eq!(conflict_field("users_pkey"), None);
        assert_eq!(conflict_field(""), None);
    }
}
