//! Password hashing, credential rules and bearer tokens.

use std::time::Duration;

use anyhow::anyhow;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::UserId;

use super::AppError;

pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 64;
pub const MIN_PASSWORD_LEN: usize = 8;

/// JWT payload. `sub` carries the user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and validates HS256 tokens with a shared secret.
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenAuthority {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn issue(&self, user_id: UserId) -> Result<String, AppError> {
        let iat = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: user_id.to_string(),
            iat,
            exp: iat.saturating_add(ttl),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Database(anyhow!("Failed to sign token: {e}")))
    }

    /// Check signature and expiry, then return the subject.
    pub fn verify(&self, token: &str) -> Result<UserId, AppError> {
        let data = jsonwebtoken::decode::<Claims>(
            token,
            &self.decoding,
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|_| AppError::InvalidToken)?;

        Uuid::parse_str(&data.claims.sub).map_err(|_| AppError::InvalidToken)
    }
}

/// Trim and check a username, returning the stored form.
pub fn normalize_username(username: &str) -> Result<String, AppError> {
    let trimmed = username.trim();
    let len = trimmed.chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
        return Err(AppError::InvalidInput(format!(
            "username must be between {MIN_USERNAME_LEN} and {MAX_USERNAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::InvalidInput(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Hash with argon2 defaults and a fresh salt. CPU-heavy, so it runs on
/// the blocking pool.
pub async fn hash_password(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| anyhow!("Failed to hash password: {e}"))
    })
    .await
    .map_err(|e| AppError::Database(anyhow!("Password hashing task failed: {e}")))?
    .map_err(AppError::Database)
}

/// Compare a password against a stored PHC string. A malformed hash counts
/// as a mismatch.
pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || {
        PasswordHash::new(&hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    })
    .await
    .map_err(|e| AppError::Database(anyhow!("Password verification task failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_is_trimmed_and_bounded() {
        assert_eq!(normalize_username("  alice ").unwrap(), "alice");
        assert!(matches!(
            normalize_username(" ab "),
            Err(AppError::InvalidInput(_))
        ));
        assert!(normalize_username(&"x".repeat(65)).is_err());
        assert!(normalize_username(&"x".repeat(64)).is_ok());
    }

    #[test]
    fn short_password_is_rejected() {
        assert!(validate_password("1234567").is_err());
        assert!(validate_password("12345678").is_ok());
    }

    #[tokio::test]
    async fn hash_verifies_only_the_hashed_password() {
        let hash = hash_password("correct horse".into()).await.unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse".into(), hash.clone()).await.unwrap());
        assert!(!verify_password("wrong horse".into(), hash).await.unwrap());
        assert!(!verify_password("anything".into(), "not-a-hash".into()).await.unwrap());
    }

    #[test]
    fn token_roundtrip_and_tamper() {
        let authority = TokenAuthority::new(b"test-secret", Duration::from_secs(3600));
        let user_id = Uuid::new_v4();
        let token = authority.issue(user_id).unwrap();
        assert_eq!(authority.verify(&token).unwrap(), user_id);

        let other = TokenAuthority::new(b"other-secret", Duration::from_secs(3600));
        assert!(matches!(other.verify(&token), Err(AppError::InvalidToken)));
        assert!(matches!(authority.verify("garbage"), Err(AppError::InvalidToken)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let authority = TokenAuthority::new(b"test-secret", Duration::from_secs(3600));
        let past = Utc::now().timestamp() - 7200;
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            iat: past,
            exp: past + 60,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(matches!(authority.verify(&token), Err(AppError::InvalidToken)));
    }
}
