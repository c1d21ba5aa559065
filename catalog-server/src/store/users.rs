//! User accounts and sessions.
//!
//! Passwords are argon2id PHC strings. Sessions are opaque UUID tokens
//! with a sliding 24 hour expiry. Repeated failed logins lock the
//! account for a cooling-off period.

use catalog_common::db::init::now_timestamp;
use catalog_common::db::models::{Session, User};
use catalog_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::warn;
use uuid::Uuid;

const MAX_FAILED_ATTEMPTS: i64 = 5;
const LOCKOUT_MINUTES: i64 = 15;
const SESSION_HOURS: i64 = 24;

pub fn hash_password(password: &str) -> Result<String> {
    use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
    use argon2::Argon2;

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| Error::Internal(format!("Password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::password_hash::{PasswordHash, PasswordVerifier};
    use argon2::Argon2;

    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            warn!(error = %err, "stored password hash is unparseable");
            false
        }
    }
}

fn timestamp_after(duration: chrono::Duration) -> String {
    (chrono::Utc::now() + duration)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn map_user(row: &SqliteRow) -> std::result::Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        role: row.try_get("role")?,
        active: row.try_get("active")?,
        must_change_password: row.try_get("must_change_password")?,
        failed_attempts: row.try_get("failed_attempts")?,
        locked_until: row.try_get("locked_until")?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn get_user_by_username(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
    let row = sqlx::query("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_user).transpose().map_err(Error::from)
}

/// True while the lockout window set by repeated failures is still open.
/// Timestamps share one format, so string comparison orders correctly.
pub fn is_locked(user: &User) -> bool {
    match &user.locked_until {
        Some(until) => *until > now_timestamp(),
        None => false,
    }
}

/// Record a login attempt outcome. Failure increments the counter and,
/// at the threshold, locks the account and resets the count.
pub async fn record_login_attempt(pool: &SqlitePool, user_id: i64, success: bool) -> Result<()> {
    if success {
        sqlx::query("UPDATE users SET failed_attempts = 0, locked_until = NULL WHERE id = ?")
            .bind(user_id)
            .execute(pool)
            .await?;
        return Ok(());
    }

    let attempts: i64 =
        sqlx::query_scalar("SELECT failed_attempts FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await?;

    if attempts + 1 >= MAX_FAILED_ATTEMPTS {
        let until = timestamp_after(chrono::Duration::minutes(LOCKOUT_MINUTES));
        warn!(user_id, "account locked after repeated login failures");
        sqlx::query("UPDATE users SET failed_attempts = 0, locked_until = ? WHERE id = ?")
            .bind(until)
            .bind(user_id)
            .execute(pool)
            .await?;
    } else {
        sqlx::query("UPDATE users SET failed_attempts = failed_attempts + 1 WHERE id = ?")
            .bind(user_id)
            .execute(pool)
            .await?;
    }
    Ok(())
}

pub async fn update_password(pool: &SqlitePool, user_id: i64, new_password: &str) -> Result<()> {
    let hash = hash_password(new_password)?;
    let result = sqlx::query(
        "UPDATE users SET password_hash = ?, must_change_password = 0 WHERE id = ?",
    )
    .bind(hash)
    .bind(user_id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("User {user_id}")));
    }
    Ok(())
}

/// Create the initial admin account when the users table is empty.
/// Returns the seeded username, or None when accounts already exist.
pub async fn seed_admin_if_empty(pool: &SqlitePool) -> Result<Option<String>> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Ok(None);
    }

    let password = std::env::var("CATALOG_ADMIN_PASSWORD").unwrap_or_else(|_| "change-me".to_string());
    let hash = hash_password(&password)?;
    sqlx::query(
        "INSERT INTO users (username, password_hash, role, must_change_password)
         VALUES ('admin', ?, 'admin', 1)",
    )
    .bind(hash)
    .execute(pool)
    .await?;
    Ok(Some("admin".to_string()))
}

// ============ Sessions ============

pub async fn create_session(pool: &SqlitePool, user_id: i64) -> Result<String> {
    let token = Uuid::new_v4().to_string();
    let expires_at = timestamp_after(chrono::Duration::hours(SESSION_HOURS));
    sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES (?, ?, ?)")
        .bind(&token)
        .bind(user_id)
        .bind(expires_at)
        .execute(pool)
        .await?;
    Ok(token)
}

/// Resolve a token to its session. Expired sessions and sessions whose
/// user has been deactivated resolve to None.
pub async fn get_session(pool: &SqlitePool, token: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        "SELECT s.token, s.user_id, s.expires_at,
                u.username, u.role, u.must_change_password
         FROM sessions s
         JOIN users u ON s.user_id = u.id
         WHERE s.token = ? AND s.expires_at > ? AND u.active = 1",
    )
    .bind(token)
    .bind(now_timestamp())
    .fetch_optional(pool)
    .await?;

    row.map(|r| {
        Ok(Session {
            token: r.try_get("token")?,
            user_id: r.try_get("user_id")?,
            username: r.try_get("username")?,
            role: r.try_get("role")?,
            must_change_password: r.try_get("must_change_password")?,
            expires_at: r.try_get("expires_at")?,
        })
    })
    .transpose()
    .map_err(|e: sqlx::Error| Error::from(e))
}

/// Slide the expiry forward on activity
pub async fn refresh_session(pool: &SqlitePool, token: &str) -> Result<()> {
    let expires_at = timestamp_after(chrono::Duration::hours(SESSION_HOURS));
    sqlx::query("UPDATE sessions SET expires_at = ? WHERE token = ?")
        .bind(expires_at)
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_session(pool: &SqlitePool, token: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn cleanup_expired_sessions(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now_timestamp())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn lockout_window_uses_sortable_timestamps() {
        let user = User {
            id: 1,
            username: "admin".to_string(),
            password_hash: String::new(),
            role: "admin".to_string(),
            active: true,
            must_change_password: false,
            failed_attempts: 0,
            locked_until: Some("2099-01-01 00:00:00".to_string()),
            created_at: now_timestamp(),
        };
        assert!(is_locked(&user));

        let unlocked = User { locked_until: Some("2001-01-01 00:00:00".to_string()), ..user };
        assert!(!is_locked(&unlocked));
    }
}
