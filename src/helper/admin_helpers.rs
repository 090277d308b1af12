use crate::models::db_operations::users_db_operations;
use crate::models::{User, UserRole};
use crate::DbPool;
use thiserror::Error;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Error, Debug)]
pub enum AdminHelperError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("R2D2 Pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("User not found")]
    NotFound,
    #[error("Username '{0}' is already taken")]
    UsernameTaken(String),
    #[error("{0}")]
    Validation(String),
}

fn get_conn(pool: &DbPool) -> Result<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>, AdminHelperError> {
    pool.get().map_err(AdminHelperError::Pool)
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation)
}

pub fn validate_username(username: &str) -> Result<(), AdminHelperError> {
    let valid = (3..=64).contains(&username.len())
        && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(AdminHelperError::Validation(
            "Username must be 3-64 characters of letters, digits, '.', '_' or '-'.".to_string(),
        ))
    }
}

pub fn validate_password(password: &str) -> Result<(), AdminHelperError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AdminHelperError::Validation(format!(
            "Password must be at least {} characters long.",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub fn create_user(
    pool: &DbPool,
    username: &str,
    full_name: Option<&str>,
    password: &str,
    role: UserRole,
) -> Result<User, AdminHelperError> {
    let username = username.trim();
    validate_username(username)?;
    validate_password(password)?;

    let conn = get_conn(pool)?;
    let id = users_db_operations::create_user(&conn, username, full_name, password, role).map_err(|e| {
        if is_unique_violation(&e) {
            AdminHelperError::UsernameTaken(username.to_string())
        } else {
            e.into()
        }
    })?;
    log::info!("Created {} account '{}'", role, username);
    users_db_operations::read_user_by_id(&conn, id)?.ok_or(AdminHelperError::NotFound)
}

pub fn fetch_all_users(pool: &DbPool) -> Result<Vec<User>, AdminHelperError> {
    let conn = get_conn(pool)?;
    Ok(users_db_operations::read_all_users(&conn)?)
}

pub fn update_user(
    pool: &DbPool,
    user_id: i64,
    full_name: Option<&str>,
    role: UserRole,
    is_active: bool,
    new_password: Option<&str>,
) -> Result<User, AdminHelperError> {
    if let Some(password) = new_password.filter(|p| !p.is_empty()) {
        validate_password(password)?;
    }
    let conn = get_conn(pool)?;
    if users_db_operations::update_user(&conn, user_id, full_name, role, is_active, new_password)? == 0 {
        return Err(AdminHelperError::NotFound);
    }
    users_db_operations::read_user_by_id(&conn, user_id)?.ok_or(AdminHelperError::NotFound)
}

/// Admins cannot delete their own account.
pub fn delete_user(pool: &DbPool, user_id: i64, acting_user_id: i64) -> Result<(), AdminHelperError> {
    if user_id == acting_user_id {
        return Err(AdminHelperError::Validation("You cannot delete your own account.".to_string()));
    }
    let conn = get_conn(pool)?;
    match users_db_operations::delete_user(&conn, user_id)? {
        0 => Err(AdminHelperError::NotFound),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_pool;

    #[test]
    fn duplicate_usernames_are_reported() {
        let (_dir, pool) = temp_pool();
        create_user(&pool, "editor1", Some("Ed"), "long-enough", UserRole::Editor).unwrap();
        let err = create_user(&pool, "editor1", None, "long-enough", UserRole::Editor).unwrap_err();
        assert!(matches!(err, AdminHelperError::UsernameTaken(_)));
    }

    #[test]
    fn rejects_short_passwords_and_self_delete() {
        let (_dir, pool) = temp_pool();
        assert!(matches!(
            create_user(&pool, "editor2", None, "short", UserRole::Editor),
            Err(AdminHelperError::Validation(_))
        ));
        let admin = create_user(&pool, "boss", None, "long-enough", UserRole::Admin).unwrap();
        assert!(matches!(delete_user(&pool, admin.id, admin.id), Err(AdminHelperError::Validation(_))));
        assert!(matches!(delete_user(&pool, 999, admin.id), Err(AdminHelperError::NotFound)));
    }
}
