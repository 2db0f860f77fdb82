use chrono::{DateTime, Duration, Utc};
use rand::{Rng, RngCore};

pub const RESET_TOKEN_TTL_SECS: i64 = 60 * 60;

pub fn generate_verification_code() -> String {
    rand::thread_rng().gen_range(10000..=99999).to_string()
}

pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn reset_token_expires_at(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::seconds(RESET_TOKEN_TTL_SECS)
}

pub fn reset_token_expired(expires: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires.map_or(true, |expires| now >= expires)
}
