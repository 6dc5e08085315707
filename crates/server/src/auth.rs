//! Password hashing and access tokens.
//!
//! Passwords are stored as argon2id PHC strings. Access tokens are HS256
//! JWTs carrying the user id and username, valid for `token_ttl_secs`.

use std::time::Duration;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use store::User;

use crate::error::{ServerError, ServerResult};

/// Token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    pub username: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: u64,
}

/// The authenticated caller, placed in request extensions by
/// [`require_auth`](crate::middleware::require_auth).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
}

pub fn hash_password(password: &str) -> ServerResult<String> {
    let salt = SaltString::encode_b64(uuid::Uuid::new_v4().as_bytes())
        .map_err(|e| ServerError::Internal(format!("salt generation failed: {e}")))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ServerError::Internal(format!("password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

/// False for a wrong password and for an unparseable stored hash.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "stored password hash is malformed");
            false
        }
    }
}

/// Signing and verification keys derived from one shared secret.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 5;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    pub fn issue(&self, user: &User) -> ServerResult<String> {
        let exp = chrono::Utc::now().timestamp().max(0) as u64 + self.ttl.as_secs();
        self.sign(&Claims {
            id: user.id.clone(),
            username: user.username.clone(),
            exp,
        })
    }

    pub fn sign(&self, claims: &Claims) -> ServerResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| ServerError::Internal(format!("token signing failed: {e}")))
    }

    /// Check signature and expiry.
    pub fn verify(&self, token: &str) -> ServerResult<Claims> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| ServerError::Authentication("Invalid or expired token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: "u-1".into(),
            username: "alice".into(),
            password_hash: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not-a-phc-string"));
    }

    #[test]
    fn salts_differ_between_hashes() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn issued_token_verifies_with_claims() {
        let keys = TokenKeys::new("secret", Duration::from_secs(900));
        let token = keys.issue(&user()).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.id, "u-1");
        assert_eq!(claims.username, "alice");

        let now = Utc::now().timestamp() as u64;
        assert!(claims.exp >= now + 890 && claims.exp <= now + 910);
    }

    #[test]
    fn expired_or_foreign_tokens_are_rejected() {
        let keys = TokenKeys::new("secret", Duration::from_secs(900));
        let expired = keys
            .sign(&Claims {
                id: "u-1".into(),
                username: "alice".into(),
                exp: Utc::now().timestamp() as u64 - 120,
            })
            .unwrap();
        assert!(matches!(keys.verify(&expired), Err(ServerError::Authentication(_))));

        let other = TokenKeys::new("other-secret", Duration::from_secs(900));
        let foreign = other.issue(&user()).unwrap();
        assert!(keys.verify(&foreign).is_err());
        assert!(keys.verify("garbage").is_err());
    }
}
