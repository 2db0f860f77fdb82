use chrono::{DateTime, Utc};
use rusqlite::{named_params, params, OptionalExtension, Transaction};

use crate::db::{self, DB};

use super::*;

#[derive(Debug, Clone)]
pub struct CreateUserParameters {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub verification_code: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GetUserByEmailParameters {
    pub user_email: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GetUserByIdParameters {
    pub user_id: UserId,
}

#[derive(Debug, Clone)]
pub struct GoogleLoginParameters {
    pub google_id: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Inserts a pending local account.
pub async fn create_local(db: DB, args: CreateUserParameters) -> db::Result<User> {
    let user = db
        .call(move |conn| {
            conn.query_row(
                &format!(
                    r#"INSERT INTO users (username, email, password, verification_code, status)
                        VALUES (:username, :email, :password, :verification_code, 'pending')
                        RETURNING {USER_COLUMNS}"#
                ),
                named_params! {
                    ":username": args.username,
                    ":email": args.email,
                    ":password": args.password_hash,
                    ":verification_code": args.verification_code,
                },
                |r| User::try_from(r),
            )
            .map_err(|e| e.into())
        })
        .await?;

    Ok(user)
}

pub async fn username_taken(db: DB, username: String) -> db::Result<bool> {
    exists(db, "SELECT 1 FROM users WHERE username = ?", username).await
}

pub async fn email_taken(db: DB, email: String) -> db::Result<bool> {
    exists(db, "SELECT 1 FROM users WHERE email = ?", email).await
}

async fn exists(db: DB, sql: &'static str, value: String) -> db::Result<bool> {
    let found = db
        .call(move |conn| Ok(conn.query_row(sql, [value], |_| Ok(())).optional()?))
        .await?;

    Ok(found.is_some())
}

/// Looks up an active user whose username or email matches `identifier`, ignoring case.
pub async fn find_active_by_identifier(db: DB, identifier: String) -> db::Result<Option<User>> {
    let user = db
        .call(move |conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {USER_COLUMNS} FROM users
                            WHERE (username = :identifier OR email = :identifier) AND status = 'active'"
                    ),
                    named_params! { ":identifier": identifier },
                    |r| User::try_from(r),
                )
                .optional()?)
        })
        .await?;

    Ok(user)
}

pub async fn find_one_by_id(db: DB, args: GetUserByIdParameters) -> db::Result<User> {
    let user_id = args.user_id;
    let user = db
        .call(move |conn| {
            conn.query_row_and_then(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"),
                [args.user_id],
                |r| User::try_from(r),
            )
            .map_err(|e| e.into())
        })
        .await
        .map_err(db::Error::from)
        .map_err(|e| e.not_found_message(format!("User '{}' not found", user_id)))?;

    Ok(user)
}

pub async fn find_one_by_email(db: DB, args: GetUserByEmailParameters) -> db::Result<User> {
    let user_email = args.user_email.to_owned();
    let user = db
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"),
                [args.user_email],
                |r| User::try_from(r),
            )
            .map_err(|e| e.into())
        })
        .await
        .map_err(db::Error::from)
        .map_err(|e| e.not_found_message(format!("User '{}' not found", user_email)))?;

    Ok(user)
}

/// Activates the account when both the email and the code match.
pub async fn verify_email(db: DB, email: String, code: String) -> db::Result<Option<User>> {
    let user = db
        .call(move |conn| {
            Ok(conn
                .query_row(
                    &format!(
                        r#"UPDATE users SET status = 'active', verification_code = NULL, updated_at = CURRENT_TIMESTAMP
                            WHERE email = :email AND verification_code = :code
                            RETURNING {USER_COLUMNS}"#
                    ),
                    named_params! { ":email": email, ":code": code },
                    |r| User::try_from(r),
                )
                .optional()?)
        })
        .await?;

    Ok(user)
}

/// Returns false when no account has that email.
pub async fn set_reset_token(db: DB, email: String, token: String, expires: DateTime<Utc>) -> db::Result<bool> {
    let updated = db
        .call(move |conn| {
            Ok(conn.execute(
                r#"UPDATE users SET reset_password_token = ?, reset_password_expires = ?, updated_at = CURRENT_TIMESTAMP
                    WHERE email = ?"#,
                params![token, expires, email],
            )?)
        })
        .await?;

    Ok(updated > 0)
}

pub async fn find_by_reset_token(db: DB, token: String) -> db::Result<Option<User>> {
    let user = db
        .call(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE reset_password_token = ?"),
                    [token],
                    |r| User::try_from(r),
                )
                .optional()?)
        })
        .await?;

    Ok(user)
}

/// Replaces the password hash and consumes any pending reset token.
pub async fn update_password(db: DB, user_id: UserId, password_hash: String) -> db::Result<User> {
    let user = db
        .call(move |conn| {
            conn.query_row(
                &format!(
                    r#"UPDATE users SET password = ?, reset_password_token = NULL, reset_password_expires = NULL,
                        updated_at = CURRENT_TIMESTAMP
                        WHERE id = ?
                        RETURNING {USER_COLUMNS}"#
                ),
                params![password_hash, user_id],
                |r| User::try_from(r),
            )
            .map_err(|e| e.into())
        })
        .await
        .map_err(db::Error::from)
        .map_err(|e| e.not_found_message(format!("User '{}' not found", user_id)))?;

    Ok(user)
}

/// Finds or creates the account behind a Google profile.
///
/// An existing account with the same email gets the Google id linked to it.
/// The account always ends up active.
pub async fn google_login(db: DB, args: GoogleLoginParameters) -> db::Result<User> {
    let user = db
        .call(move |conn| {
            let tx = conn.transaction()?;

            let by_google_id: Option<UserId> = tx
                .query_row("SELECT id FROM users WHERE google_id = ?", [&args.google_id], |r| r.get(0))
                .optional()?;

            let user_id = match by_google_id {
                Some(id) => id,
                None => {
                    let by_email: Option<UserId> = tx
                        .query_row("SELECT id FROM users WHERE email = ?", [&args.email], |r| r.get(0))
                        .optional()?;

                    match by_email {
                        Some(id) => {
                            tx.execute(
                                "UPDATE users SET google_id = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
                                params![args.google_id, id],
                            )?;
                            id
                        }
                        None => {
                            let username = available_username(&tx, &args)?;
                            tx.query_row(
                                r#"INSERT INTO users (username, email, google_id, status)
                                    VALUES (?, ?, ?, 'active') RETURNING id"#,
                                params![username, args.email, args.google_id],
                                |r| r.get(0),
                            )?
                        }
                    }
                }
            };

            tx.execute(
                "UPDATE users SET status = 'active', updated_at = CURRENT_TIMESTAMP WHERE id = ? AND status != 'active'",
                [user_id],
            )?;

            let user = tx.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"),
                [user_id],
                |r| User::try_from(r),
            )?;

            tx.commit()?;
            Ok(user)
        })
        .await?;

    Ok(user)
}

fn available_username(tx: &Transaction, args: &GoogleLoginParameters) -> rusqlite::Result<String> {
    let base = args
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| args.email.split('@').next().unwrap_or(&args.email))
        .to_string();

    let suffix: String = {
        let chars: Vec<char> = args.google_id.chars().collect();
        chars[chars.len().saturating_sub(6)..].iter().collect()
    };

    let mut candidate = base.clone();
    let mut attempt = 0;
    loop {
        let taken = tx
            .query_row("SELECT 1 FROM users WHERE username = ?", [&candidate], |_| Ok(()))
            .optional()?
            .is_some();
        if !taken {
            return Ok(candidate);
        }

        attempt += 1;
        candidate = match attempt {
            1 => format!("{base}_{suffix}"),
            n => format!("{base}_{suffix}{n}"),
        };
    }
}

/// Removes an account along with its notes.
pub async fn delete_user(db: DB, user_id: UserId) -> db::Result<()> {
    db.call(move |conn| {
        conn.execute("DELETE FROM users WHERE id = ?", [user_id])?;
        Ok(())
    })
    .await?;

    Ok(())
}
