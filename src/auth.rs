use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "teacher" => Some(Self::Teacher),
            "student" => Some(Self::Student),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::Student => "student",
        }
    }

    pub fn is_staff(self) -> bool {
        matches!(self, Self::Admin | Self::Teacher)
    }

    /// Dashboard a freshly logged-in user lands on.
    pub fn home_view(self) -> &'static str {
        match self {
            Self::Admin => "home",
            Self::Teacher => "teacher_dashboard",
            Self::Student => "student_dashboard",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is calling. Built by the router from a verified session token.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

/// False for a wrong password and for a stored value that is not a PHC string.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Creates a session row and returns the raw token; only its digest is stored.
pub fn issue_session(conn: &Connection, user_id: i64, ttl_minutes: i64) -> anyhow::Result<String> {
    let created = now();
    let expires = Duration::try_minutes(ttl_minutes)
        .and_then(|ttl| created.checked_add_signed(ttl))
        .ok_or_else(|| anyhow::anyhow!("session ttl of {ttl_minutes} minutes is out of range"))?;
    let token = Uuid::new_v4().simple().to_string();
    conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?",
        [created],
    )?;
    conn.execute(
        "INSERT INTO sessions(token_hash, user_id, created_at, expires_at) VALUES(?, ?, ?, ?)",
        (token_digest(&token), user_id, created, expires),
    )?;
    Ok(token)
}

pub fn resolve_session(conn: &Connection, token: &str) -> rusqlite::Result<Option<AuthContext>> {
    let row: Option<(i64, String, String)> = conn
        .query_row(
            "SELECT u.id, u.username, u.role
             FROM sessions s
             JOIN users u ON u.id = s.user_id
             WHERE s.token_hash = ? AND s.expires_at > ?",
            (token_digest(token), now()),
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    Ok(row.and_then(|(user_id, username, role)| {
        Role::parse(&role).map(|role| AuthContext {
            user_id,
            username,
            role,
        })
    }))
}

pub fn revoke_session(conn: &Connection, token: &str) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "DELETE FROM sessions WHERE token_hash = ?",
        [token_digest(token)],
    )?;
    Ok(n > 0)
}
