use crate::database::sqlite::SqliteDatabase;
use crate::errors::{AppError, Result};
use crate::models::user::User;
use crate::utils::crypto::PasswordManager;
use crate::utils::validation::Validator;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

pub struct UserService {
    pub db: Arc<SqliteDatabase>,
    admin_email: Option<String>,
}

impl UserService {
    pub fn new(db: Arc<SqliteDatabase>, admin_email: Option<String>) -> Self {
        Self { db, admin_email }
    }

    /// Create an account with a pending email-verification token. There is no
    /// mail transport here; the token is logged for operational delivery. An
    /// account registering with the configured admin email gets the admin flag.
    pub async fn register_user(
        &self,
        full_name: &str,
        email: &str,
        password: &str,
    ) -> Result<User> {
        Validator::validate_full_name(full_name)?;
        Validator::validate_email(email)?;
        Validator::validate_password(password)?;

        let password_hash = PasswordManager::hash_password(password)?;
        let verify_token = PasswordManager::generate_verification_token();
        let is_admin = self
            .admin_email
            .as_deref()
            .is_some_and(|admin| admin.eq_ignore_ascii_case(email));

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            full_name: full_name.trim().to_string(),
            email: email.to_string(),
            password_hash,
            email_verified: false,
            verify_token: Some(verify_token.clone()),
            is_admin,
            balance: 0.0,
            created_at: now,
            updated_at: now,
        };

        self.db.create_user(&user).await?;

        tracing::info!(
            action = "user_registered",
            user_id = %user.id,
            is_admin = is_admin
        );
        tracing::info!(
            action = "verification_token_issued",
            user_id = %user.id,
            token = %verify_token
        );

        Ok(user)
    }

    /// Consume a verification token, marking the account's email verified.
    pub async fn verify_email(&self, token: &str) -> Result<User> {
        if token.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Verification token is required".to_string(),
            ));
        }

        let user = self
            .db
            .get_user_by_verify_token(token)
            .await?
            .ok_or_else(|| {
                AppError::ValidationError("Invalid or expired verification token".to_string())
            })?;

        self.db.verify_user_email(&user.id).await?;

        tracing::info!(action = "email_verified", user_id = %user.id);
        self.db
            .get_user_by_id(&user.id)
            .await?
            .ok_or_else(|| AppError::NotFoundError("User not found".to_string()))
    }

    pub async fn get_profile(&self, user_id: &Uuid) -> Result<User> {
        self.db
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFoundError("User not found".to_string()))
    }

    pub async fn get_balance(&self, user_id: &Uuid) -> Result<f64> {
        self.db.get_user_balance(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service_with_admin(admin_email: Option<&str>) -> UserService {
        let db = SqliteDatabase::connect("sqlite::memory:").await.unwrap();
        UserService::new(Arc::new(db), admin_email.map(String::from))
    }

    #[tokio::test]
    async fn registration_creates_an_unverified_user_with_token() {
        let service = service_with_admin(None).await;
        let user = service
            .register_user("Jane Doe", "jane@example.com", "Correct1!horse")
            .await
            .unwrap();

        assert!(!user.email_verified);
        assert!(!user.is_admin);
        let token = user.verify_token.clone().expect("token issued");
        assert_eq!(token.len(), 64);

        let verified = service.verify_email(&token).await.unwrap();
        assert!(verified.email_verified);
        assert!(verified.verify_token.is_none());

        // Token is single-use.
        assert!(service.verify_email(&token).await.is_err());
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let service = service_with_admin(None).await;
        service
            .register_user("Jane Doe", "jane@example.com", "Correct1!horse")
            .await
            .unwrap();

        let err = service
            .register_user("Other Jane", "jane@example.com", "Correct1!horse")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(format!("{}", err), "Validation error: Email already registered");
    }

    #[tokio::test]
    async fn admin_email_gets_the_admin_flag() {
        let service = service_with_admin(Some("admin@example.com")).await;

        let admin = service
            .register_user("Site Admin", "Admin@Example.com", "Correct1!horse")
            .await
            .unwrap();
        assert!(admin.is_admin);

        let user = service
            .register_user("Jane Doe", "jane@example.com", "Correct1!horse")
            .await
            .unwrap();
        assert!(!user.is_admin);
    }

    #[tokio::test]
    async fn weak_passwords_are_rejected_before_hashing() {
        let service = service_with_admin(None).await;
        let err = service
            .register_user("Jane Doe", "jane@example.com", "weak")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
