mod migrations;

use rusqlite::ErrorCode;
use tokio_rusqlite::Connection;

use crate::config::config;

pub use migrations::MIGRATIONS;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not_found")]
    NotFound(String),
    #[error("unique_violation: {0}")]
    UniqueViolation(String),
    #[error(transparent)]
    TokioRusqlite(tokio_rusqlite::Error),
    #[error(transparent)]
    Rusqlite(rusqlite::Error),
    #[error(transparent)]
    Migration(#[from] rusqlite_migration::Error),
}

impl Error {
    pub fn not_found_message(self, message: impl Into<String>) -> Self {
        if matches!(self, Self::NotFound(_)) {
            return Self::NotFound(message.into());
        }
        self
    }
}

impl From<tokio_rusqlite::Error> for Error {
    fn from(error: tokio_rusqlite::Error) -> Self {
        match error {
            tokio_rusqlite::Error::Rusqlite(error) => error.into(),
            error => Self::TokioRusqlite(error),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(error: rusqlite::Error) -> Self {
        match error {
            rusqlite::Error::QueryReturnedNoRows => Self::NotFound("Not found".into()),
            rusqlite::Error::SqliteFailure(ref failure, Some(ref message))
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                match unique_column(message) {
                    Some(column) => Self::UniqueViolation(column),
                    None => Self::Rusqlite(error),
                }
            }
            error => Self::Rusqlite(error),
        }
    }
}

/// Column name from a message like `UNIQUE constraint failed: users.email`.
fn unique_column(message: &str) -> Option<String> {
    let columns = message.strip_prefix("UNIQUE constraint failed: ")?;
    let first = columns.split(',').next()?.trim();
    Some(first.rsplit('.').next().unwrap_or(first).to_string())
}

pub type DB = Connection;

pub async fn init_db() -> Result<DB> {
    let conn = tokio_rusqlite::Connection::open(&config().database_url).await?;

    conn.call(|conn| {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        MIGRATIONS
            .to_latest(conn)
            .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;

        Ok(())
    })
    .await?;

    tracing::info!("database ready at {}", config().database_url);

    Ok(conn)
}

#[cfg(test)]
pub async fn init_test_db() -> Result<DB> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;

    conn.call(|conn| {
        conn.pragma_update(None, "foreign_keys", "ON")?;

        MIGRATIONS
            .to_latest(conn)
            .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;

        Ok(())
    })
    .await?;

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_valid() {
        assert!(MIGRATIONS.validate().is_ok());
    }

    #[test]
    fn unique_column_from_message() {
        assert_eq!(unique_column("UNIQUE constraint failed: users.email").as_deref(), Some("email"));
        assert_eq!(unique_column("NOT NULL constraint failed: notes.title"), None);
    }

    #[tokio::test]
    async fn unique_violation_is_mapped() -> Result<()> {
        let db = init_test_db().await?;

        let result = db
            .call(|conn| {
                conn.execute(
                    "INSERT INTO users (username, email, status) VALUES ('bob', 'bob@mail.com', 'active')",
                    [],
                )?;
                conn.execute(
                    "INSERT INTO users (username, email, status) VALUES ('BOB', 'other@mail.com', 'active')",
                    [],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from);

        assert!(matches!(result, Err(Error::UniqueViolation(column)) if column == "username"));
        Ok(())
    }

    #[tokio::test]
    async fn categories_are_seeded() -> Result<()> {
        let db = init_test_db().await?;

        let count = db
            .call(|conn| Ok(conn.query_row::<u32, _, _>("SELECT count(*) FROM categories", [], |r| r.get(0))?))
            .await?;

        assert_eq!(count, 6);
        Ok(())
    }
}
