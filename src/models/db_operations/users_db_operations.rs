use crate::models::{User, UserRole};
use bcrypt::{hash, verify, BcryptError};
use chrono::Utc;
use rusqlite::{params, Connection, Error as RusqliteError, OptionalExtension, Row};

const USER_COLUMNS: &str = "id, username, full_name, role, is_active, last_login_time";

fn bcrypt_to_rusqlite_error(e: BcryptError) -> RusqliteError {
    RusqliteError::ToSqlConversionFailure(Box::new(e))
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        full_name: row.get(2)?,
        role: row.get(3)?,
        is_active: row.get(4)?,
        last_login_time: row.get(5)?,
    })
}

pub fn create_user(
    conn: &Connection,
    username: &str,
    full_name: Option<&str>,
    password: &str,
    role: UserRole,
) -> Result<i64, RusqliteError> {
    let hashed_password = hash(password, bcrypt::DEFAULT_COST).map_err(bcrypt_to_rusqlite_error)?;
    conn.execute(
        "INSERT INTO users (username, full_name, password_hash, role) VALUES (?1, ?2, ?3, ?4)",
        params![username, full_name, hashed_password, role],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn read_all_users(conn: &Connection) -> Result<Vec<User>, RusqliteError> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))?;
    let rows = stmt.query_map([], row_to_user)?;
    let mut users = Vec::new();
    for user in rows {
        users.push(user?);
    }
    Ok(users)
}

pub fn read_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>, RusqliteError> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
        [username],
        row_to_user,
    )
    .optional()
}

pub fn read_user_by_id(conn: &Connection, user_id: i64) -> Result<Option<User>, RusqliteError> {
    conn.query_row(&format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS), [user_id], row_to_user)
        .optional()
}

pub fn update_user(
    conn: &Connection,
    user_id: i64,
    full_name: Option<&str>,
    role: UserRole,
    is_active: bool,
    new_password: Option<&str>,
) -> Result<usize, RusqliteError> {
    if let Some(password) = new_password.filter(|p| !p.is_empty()) {
        let hashed_password = hash(password, bcrypt::DEFAULT_COST).map_err(bcrypt_to_rusqlite_error)?;
        return conn.execute(
            "UPDATE users SET full_name = ?1, role = ?2, is_active = ?3, password_hash = ?4 WHERE id = ?5",
            params![full_name, role, is_active, hashed_password, user_id],
        );
    }

    conn.execute(
        "UPDATE users SET full_name = ?1, role = ?2, is_active = ?3 WHERE id = ?4",
        params![full_name, role, is_active, user_id],
    )
}

pub fn update_password(conn: &Connection, username: &str, new_password: &str) -> Result<usize, RusqliteError> {
    let hashed_password = hash(new_password, bcrypt::DEFAULT_COST).map_err(bcrypt_to_rusqlite_error)?;
    conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE username = ?2",
        params![hashed_password, username],
    )
}

pub fn delete_user(conn: &Connection, user_id: i64) -> Result<usize, RusqliteError> {
    conn.execute("DELETE FROM users WHERE id = ?1", [user_id])
}

/// Returns the user when the password matches and the account is active.
pub fn verify_credentials(conn: &Connection, username: &str, password: &str) -> Result<Option<User>, RusqliteError> {
    let row: Option<(String, bool)> = conn
        .query_row(
            "SELECT password_hash, is_active FROM users WHERE username = ?1",
            [username],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match row {
        Some((password_hash, true)) if verify(password, &password_hash).unwrap_or(false) => {
            read_user_by_username(conn, username)
        }
        _ => Ok(None),
    }
}

pub fn update_last_login_time(conn: &Connection, user_id: i64) -> Result<(), RusqliteError> {
    let now = super::format_timestamp(&Utc::now());
    conn.execute("UPDATE users SET last_login_time = ?1 WHERE id = ?2", params![now, user_id])?;
    Ok(())
}
