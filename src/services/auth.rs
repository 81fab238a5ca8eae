use crate::database::sqlite::SqliteDatabase;
use crate::errors::{AppError, Result};
use crate::models::user::User;
use crate::services::jwt::{AuthenticatedUser, JwtManager, TOKEN_TTL_HOURS};
use crate::utils::crypto::PasswordManager;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// A freshly minted access token together with its expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct AuthService {
    jwt_manager: JwtManager,
    database: Arc<SqliteDatabase>,
}

impl AuthService {
    pub fn new(database: Arc<SqliteDatabase>, jwt_secret: String) -> Self {
        Self {
            jwt_manager: JwtManager::new(jwt_secret),
            database,
        }
    }

    pub fn from_env(database: Arc<SqliteDatabase>) -> Self {
        let jwt_secret =
            std::env::var("JWT_SECRET").expect("JWT_SECRET must be set in environment");
        Self::new(database, jwt_secret)
    }

    pub fn database(&self) -> Arc<SqliteDatabase> {
        self.database.clone()
    }

    /// Credentials check. The failure message never says which half was wrong.
    pub async fn authenticate_user(&self, email: &str, password: &str) -> Result<User> {
        let user = self
            .database
            .get_user_by_email(email)
            .await?
            .ok_or_else(|| {
                AppError::AuthenticationError("Invalid email or password".to_string())
            })?;

        if !PasswordManager::verify_password(password, &user.password_hash)? {
            return Err(AppError::AuthenticationError(
                "Invalid email or password".to_string(),
            ));
        }

        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(IssuedToken, User)> {
        let user = self.authenticate_user(email, password).await?;
        let issued = self.issue_token(&user).await?;

        tracing::info!(action = "user_logged_in", user_id = %user.id);
        Ok((issued, user))
    }

    async fn issue_token(&self, user: &User) -> Result<IssuedToken> {
        let token = self
            .jwt_manager
            .generate_token(&user.id, &user.email, user.is_admin)?;

        let token_data = self.jwt_manager.validate_token(&token)?;
        let token_id = &token_data.claims.jti;
        let token_hash = self.hash_token(&token);
        let expires_at = Utc::now() + Duration::hours(TOKEN_TTL_HOURS);

        self.database
            .store_user_token(&user.id, token_id, &token_hash, expires_at)
            .await?;

        let _ = self.database.cleanup_expired_tokens().await;

        Ok(IssuedToken { token, expires_at })
    }

    /// Signature and expiry must check out, and the bookkeeping row must still
    /// be live: a structurally fine token that has been logged out is refused.
    pub async fn validate_token(&self, token: &str) -> Result<AuthenticatedUser> {
        let token_data = self.jwt_manager.validate_token(token)?;
        let token_id = &token_data.claims.jti;

        if !self.database.is_token_valid(token_id).await? {
            return Err(AppError::AuthenticationError(
                "Token has been revoked or expired".to_string(),
            ));
        }

        AuthenticatedUser::try_from(token_data.claims)
    }

    pub async fn refresh_token(&self, old_token: &str) -> Result<IssuedToken> {
        let principal = self.validate_token(old_token).await?;
        let user = self
            .database
            .get_user_by_id(&principal.user_id)
            .await?
            .ok_or_else(|| AppError::AuthenticationError("Unknown user".to_string()))?;

        self.database.revoke_token(&principal.token_id).await?;
        let issued = self.issue_token(&user).await?;

        tracing::info!(action = "token_refreshed", user_id = %user.id);
        Ok(issued)
    }

    pub async fn logout(&self, token: &str) -> Result<()> {
        let token_data = self.jwt_manager.validate_token(token)?;
        self.database.revoke_token(&token_data.claims.jti).await?;

        tracing::info!(action = "user_logged_out", token_id = %token_data.claims.jti);
        Ok(())
    }

    fn hash_token(&self, token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::User;
    use uuid::Uuid;

    async fn service() -> AuthService {
        let db = SqliteDatabase::connect("sqlite::memory:").await.unwrap();
        AuthService::new(Arc::new(db), "test-secret".to_string())
    }

    async fn seeded_user(service: &AuthService) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            full_name: "Jane Doe".to_string(),
            email: "jane@example.com".to_string(),
            password_hash: PasswordManager::hash_password("Correct1!horse").unwrap(),
            email_verified: true,
            verify_token: None,
            is_admin: false,
            balance: 0.0,
            created_at: now,
            updated_at: now,
        };
        service.database().create_user(&user).await.unwrap();
        user
    }

    #[tokio::test]
    async fn login_issues_a_validating_token() {
        let service = service().await;
        seeded_user(&service).await;

        let (issued, user) = service
            .login("jane@example.com", "Correct1!horse")
            .await
            .unwrap();
        assert!(issued.expires_at > Utc::now());

        let principal = service.validate_token(&issued.token).await.unwrap();
        assert_eq!(principal.user_id, user.id);
        assert!(!principal.is_admin);
    }

    #[tokio::test]
    async fn wrong_credentials_fail_without_detail() {
        let service = service().await;
        seeded_user(&service).await;

        let err = service
            .login("jane@example.com", "wrong")
            .await
            .unwrap_err();
        let wrong_pw = format!("{}", err);

        let err = service
            .login("nobody@example.com", "Correct1!horse")
            .await
            .unwrap_err();
        let wrong_email = format!("{}", err);

        assert_eq!(wrong_pw, wrong_email);
    }

    #[tokio::test]
    async fn logout_revokes_the_token() {
        let service = service().await;
        seeded_user(&service).await;

        let (issued, _) = service
            .login("jane@example.com", "Correct1!horse")
            .await
            .unwrap();
        service.logout(&issued.token).await.unwrap();

        let err = service.validate_token(&issued.token).await.unwrap_err();
        assert!(matches!(err, AppError::AuthenticationError(_)));
    }

    #[tokio::test]
    async fn refresh_rotates_the_bookkeeping_row() {
        let service = service().await;
        seeded_user(&service).await;

        let (issued, _) = service
            .login("jane@example.com", "Correct1!horse")
            .await
            .unwrap();
        let refreshed = service.refresh_token(&issued.token).await.unwrap();

        assert!(service.validate_token(&refreshed.token).await.is_ok());
        assert!(service.validate_token(&issued.token).await.is_err());
    }
}
