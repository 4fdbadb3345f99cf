use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Dashboard sessions last one day.
pub const SESSION_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// Encode an HS256 dashboard token signed with `secret`, issued at `now`.
///
/// Returns (token_string, expires_at_rfc3339).
pub fn encode_jwt(secret: &str, now: DateTime<Utc>) -> Result<(String, String)> {
    let exp = now + Duration::hours(SESSION_HOURS);

    let claims = Claims {
        sub: "dashboard".to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| anyhow!("encode_jwt: {}", e))?;

    Ok((token, exp.to_rfc3339()))
}

/// Decode and validate a dashboard token. Expired or foreign tokens fail.
pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| anyhow!("decode_jwt: {}", e))?;

    Ok(data.claims)
}
