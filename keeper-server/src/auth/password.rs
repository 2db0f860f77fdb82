use crate::{Error, Result};

/// Lowest cost bcrypt accepts.
pub const MIN_BCRYPT_COST: u32 = 4;

pub async fn hash_password(password: String, cost: u32) -> Result<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| Error::Unexpected(e.into()))?
        .map_err(|e| Error::Unexpected(e.into()))
}

pub async fn verify_password(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| Error::Unexpected(e.into()))?
        .map_err(|e| Error::Unexpected(e.into()))
}

/// A parseable address whose domain has a top-level part.
pub fn is_valid_email(email: &str) -> bool {
    let Ok(address) = email.parse::<lettre::Address>() else {
        return false;
    };

    let domain = address.domain();
    domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

/// At least 8 characters with a lowercase letter, an uppercase letter, a digit and a symbol.
pub fn is_strong_password(password: &str) -> bool {
    password.chars().count() >= 8
        && password.chars().any(char::is_lowercase)
        && password.chars().any(char::is_uppercase)
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_alphanumeric())
}
