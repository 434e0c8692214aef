use chrono::Utc;
use rand::{Rng, distr::Alphanumeric};

use crate::{
    db::DbPool,
    error::{AppError, Result, conflict_on_constraint},
    models::user::{CreateUser, CreatedUser, UpdateUser, User, UserDto, UserStatus},
    services::auth_service::{hash_password, verify_password},
};

const GENERATED_PASSWORD_LEN: usize = 16;

/// User store for database operations
#[derive(Clone)]
pub struct UserStore {
    pool: DbPool,
}

impl UserStore {
    /// Create a new UserStore with the provided database pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM profiles")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }

    /// Get a list of all users
    pub async fn get_all_users(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM profiles ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        Ok(users)
    }

    /// Get a user by ID
    pub async fn get_user_by_id(&self, id: i64) -> Result<User> {
        sqlx::query_as::<_, User>("SELECT * FROM profiles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("User", id))
    }

    /// Get a user by email, case-insensitively
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM profiles WHERE email = ?")
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Check email and password of an active user
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let invalid = || AppError::Auth("Invalid email or password".into());

        let user = self.get_user_by_email(email).await?.ok_or_else(invalid)?;
        if !verify_password(password, &user.password_hash) {
            tracing::warn!("Failed login for {}", user.email);
            return Err(invalid());
        }
        if !user.is_active() {
            return Err(AppError::Auth("Account is inactive".into()));
        }

        Ok(user)
    }

    /// Create a user, generating a password when none is given
    pub async fn create_user(&self, input: CreateUser) -> Result<CreatedUser> {
        let (password, generated) = match input.password {
            Some(password) => (password, false),
            None => (generate_password(), true),
        };
        let password_hash = hash_password(&password)?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO profiles (name, email, role, status, password_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(input.name.trim())
        .bind(normalize_email(&input.email))
        .bind(input.role)
        .bind(UserStatus::Active)
        .bind(&password_hash)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_constraint(e, "a user with this email already exists"))?;

        let user = self.get_user_by_id(result.last_insert_rowid()).await?;
        tracing::info!("Created user {} with role {}", user.email, user.role.as_str());

        Ok(CreatedUser {
            user: UserDto::from(user),
            generated_password: generated.then_some(password),
        })
    }

    /// Update name, role or status of a user
    pub async fn update_user(&self, id: i64, update: UpdateUser) -> Result<User> {
        let existing = self.get_user_by_id(id).await?;

        sqlx::query(
            r#"
            UPDATE profiles
            SET name = ?, role = ?, status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.name.as_deref().map(str::trim).unwrap_or(existing.name.as_str()))
        .bind(update.role.unwrap_or(existing.role))
        .bind(update.status.unwrap_or(existing.status))
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        // Return the updated user
        self.get_user_by_id(id).await
    }

    pub async fn set_password(&self, id: i64, password: &str) -> Result<()> {
        let password_hash = hash_password(password)?;

        let result = sqlx::query("UPDATE profiles SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("User", id));
        }
        Ok(())
    }

    /// Delete a user by ID
    pub async fn delete_user(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM profiles WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                conflict_on_constraint(e, "user still owns quotations or invoices, deactivate instead")
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("User", id));
        }
        Ok(())
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Random alphanumeric password for accounts created without one
pub fn generate_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}
