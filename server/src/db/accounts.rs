//! Account row operations.
//!
//! Credentials are plain string compares: strong credential protection is
//! out of scope for this server and the accounts table is not exposed.

use anyhow::Result;
use rusqlite::OptionalExtension;

use crate::db::database::Database;

#[derive(Debug, Clone)]
pub struct AccountRow {
    pub id: i32,
    pub username: String,
    pub gm_level: i32,
}

/// Outcome of an authentication attempt.
#[derive(Debug)]
pub enum LoginResult {
    Ok(AccountRow),
    BadCredentials,
}

pub fn authenticate(db: &Database, username: &str, password: &str) -> Result<LoginResult> {
    let row = db.with_conn(|conn| {
        let mut stmt = conn.prepare_cached(
            "SELECT id, username, password, gm_level FROM accounts WHERE username = ?1",
        )?;
        stmt.query_row([username], |r| {
            Ok((
                r.get::<_, i32>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, i32>(3)?,
            ))
        })
        .optional()
    })?;

    match row {
        Some((id, username, stored_password, gm_level)) if stored_password == password => {
            Ok(LoginResult::Ok(AccountRow {
                id,
                username,
                gm_level,
            }))
        }
        _ => Ok(LoginResult::BadCredentials),
    }
}

pub fn create_account(
    db: &Database,
    username: &str,
    password: &str,
    gm_level: i32,
) -> Result<i32> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO accounts (username, password, gm_level) VALUES (?1, ?2, ?3)",
        )?;
        stmt.execute(rusqlite::params![username, password, gm_level])?;
        Ok(conn.last_insert_rowid() as i32)
    })
}
