use crate::errors::{AppError, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Access tokens live this long; the bookkeeping row in `user_tokens` carries
/// the same expiry.
pub const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub admin: bool,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

pub struct JwtManager {
    secret: String,
}

impl JwtManager {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    pub fn generate_token(&self, user_id: &Uuid, email: &str, is_admin: bool) -> Result<String> {
        let now = Utc::now();
        let expiration = now + Duration::hours(TOKEN_TTL_HOURS);
        let jti = Uuid::new_v4().to_string();

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            admin: is_admin,
            exp: expiration.timestamp(),
            iat: now.timestamp(),
            jti,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_ref()),
        )
        .map_err(|e| AppError::AuthenticationError(format!("Failed to generate token: {}", e)))?;

        Ok(token)
    }

    pub fn validate_token(&self, token: &str) -> Result<TokenData<Claims>> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_ref()),
            &Validation::default(),
        )
        .map_err(|e| AppError::AuthenticationError(format!("Invalid token: {}", e)))?;

        Ok(token_data)
    }
}

/// The principal resolved from a bearer token. Handlers thread this into every
/// service call; nothing below the HTTP layer reads ambient session state.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub is_admin: bool,
    pub token_id: String,
}

impl TryFrom<Claims> for AuthenticatedUser {
    type Error = AppError;

    fn try_from(claims: Claims) -> Result<Self> {
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|e| AppError::ValidationError(format!("Invalid user ID in token: {}", e)))?;

        Ok(Self {
            user_id,
            email: claims.email,
            is_admin: claims.admin,
            token_id: claims.jti,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip_preserves_claims() {
        let manager = JwtManager::new("test-secret".to_string());
        let user_id = Uuid::new_v4();
        let token = manager
            .generate_token(&user_id, "jane@example.com", true)
            .unwrap();

        let data = manager.validate_token(&token).unwrap();
        assert_eq!(data.claims.sub, user_id.to_string());
        assert_eq!(data.claims.email, "jane@example.com");
        assert!(data.claims.admin);

        let principal = AuthenticatedUser::try_from(data.claims).unwrap();
        assert_eq!(principal.user_id, user_id);
        assert!(principal.is_admin);
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let manager = JwtManager::new("secret-a".to_string());
        let other = JwtManager::new("secret-b".to_string());
        let token = manager
            .generate_token(&Uuid::new_v4(), "jane@example.com", false)
            .unwrap();

        assert!(other.validate_token(&token).is_err());
    }
}
