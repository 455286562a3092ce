/**
 * Session Tokens
 * Short-lived access tokens and long-lived refresh tokens, signed with separate secrets
 */
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::JwtConfig;
use crate::db::models::{Role, User};

/// Access token claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Refresh token claims; `jti` makes every issued token distinct
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RefreshClaims {
    pub sub: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct JwtKeys {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtKeys {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn issue_access(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let data = decode::<Claims>(token, &self.access_decoding, &Validation::new(Algorithm::HS256))?;
        Ok(data.claims)
    }

    pub fn issue_refresh(&self, user_id: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = RefreshClaims {
            sub: user_id.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, jsonwebtoken::errors::Error> {
        let data = decode::<RefreshClaims>(
            token,
            &self.refresh_decoding,
            &Validation::new(Algorithm::HS256),
        )?;
        Ok(data.claims)
    }

    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, jsonwebtoken::errors::Error> {
        Ok(TokenPair {
            access_token: self.issue_access(user)?,
            refresh_token: self.issue_refresh(&user.id)?,
        })
    }
}

/// SHA-256 hex digest under which a refresh token is stored.
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::models::{new_object_id, ProviderKind};

    fn user() -> User {
        let now = Utc::now();
        User {
            id: new_object_id(),
            email: "admin@example.com".into(),
            password_hash: None,
            name: "Admin".into(),
            avatar: None,
            role: Role::Admin,
            is_active: true,
            provider: ProviderKind::Local,
            provider_id: None,
            refresh_token_hash: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_access_token_round_trip() {
        let keys = JwtKeys::new(&AppConfig::default().jwt);
        let user = user();
        let token = keys.issue_access(&user).unwrap();
        let claims = keys.verify_access(&token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn test_tokens_are_not_interchangeable() {
        let keys = JwtKeys::new(&AppConfig::default().jwt);
        let pair = keys.issue_pair(&user()).unwrap();
        assert!(keys.verify_access(&pair.refresh_token).is_err());
        assert!(keys.verify_refresh(&pair.access_token).is_err());
        assert!(keys.verify_refresh(&pair.refresh_token).is_ok());
    }

    #[test]
    fn test_refresh_tokens_are_unique() {
        let keys = JwtKeys::new(&AppConfig::default().jwt);
        let id = new_object_id();
        assert_ne!(keys.issue_refresh(&id).unwrap(), keys.issue_refresh(&id).unwrap());
    }

    #[test]
    fn test_invalid_token_is_rejected() {
        let keys = JwtKeys::new(&AppConfig::default().jwt);
        assert!(keys.verify_access("invalid.jwt.token").is_err());
    }

    #[test]
    fn test_token_digest_is_hex_sha256() {
        let digest = token_digest("abc");
        assert_eq!(digest.len(), 64);
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
