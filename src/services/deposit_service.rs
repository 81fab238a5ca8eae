use crate::database::sqlite::SqliteDatabase;
use crate::errors::{AppError, Result};
use crate::models::transaction::DepositTransaction;
use crate::services::jwt::AuthenticatedUser;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

pub struct DepositService {
    pub db: Arc<SqliteDatabase>,
}

impl DepositService {
    pub fn new(db: Arc<SqliteDatabase>) -> Self {
        Self { db }
    }

    /// Record a completed deposit for the caller. Replays of the same
    /// transaction hash return the original record without re-crediting.
    pub async fn record_deposit(
        &self,
        principal: &AuthenticatedUser,
        amount: f64,
        currency: &str,
        transaction_hash: &str,
        payment_method: &str,
    ) -> Result<DepositTransaction> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(AppError::ValidationError(
                "Amount must be a positive number".to_string(),
            ));
        }
        if transaction_hash.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Transaction hash is required".to_string(),
            ));
        }
        if currency.trim().is_empty() || payment_method.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Currency and payment method are required".to_string(),
            ));
        }

        let deposit = DepositTransaction {
            id: Uuid::new_v4(),
            user_id: principal.user_id,
            amount,
            currency: currency.to_string(),
            transaction_hash: transaction_hash.trim().to_string(),
            payment_method: payment_method.to_string(),
            status: "completed".to_string(),
            created_at: Utc::now(),
        };

        let recorded = self.db.record_deposit(&deposit).await?;

        tracing::info!(
            action = "deposit_recorded",
            user_id = %principal.user_id,
            transaction_id = %recorded.id,
            amount = recorded.amount
        );
        Ok(recorded)
    }

    pub async fn get_total(
        &self,
        principal: &AuthenticatedUser,
        payment_method: Option<&str>,
    ) -> Result<f64> {
        self.db
            .get_deposit_total(&principal.user_id, payment_method)
            .await
    }

    pub async fn get_balance(&self, principal: &AuthenticatedUser) -> Result<f64> {
        self.db.get_user_balance(&principal.user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::User;

    async fn service() -> DepositService {
        let db = SqliteDatabase::connect("sqlite::memory:").await.unwrap();
        DepositService::new(Arc::new(db))
    }

    async fn seeded_principal(service: &DepositService) -> AuthenticatedUser {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            full_name: "Test User".to_string(),
            email: "deposit@example.com".to_string(),
            password_hash: "$argon2id$fake".to_string(),
            email_verified: true,
            verify_token: None,
            is_admin: false,
            balance: 0.0,
            created_at: now,
            updated_at: now,
        };
        service.db.create_user(&user).await.unwrap();
        AuthenticatedUser {
            user_id: user.id,
            email: user.email,
            is_admin: false,
            token_id: Uuid::new_v4().to_string(),
        }
    }

    #[tokio::test]
    async fn deposits_credit_the_balance_once_per_hash() {
        let service = service().await;
        let user = seeded_principal(&service).await;

        let first = service
            .record_deposit(&user, 100.0, "USD", "0xhash1", "crypto")
            .await
            .unwrap();
        let replay = service
            .record_deposit(&user, 100.0, "USD", "0xhash1", "crypto")
            .await
            .unwrap();
        assert_eq!(replay.id, first.id);

        assert_eq!(service.get_balance(&user).await.unwrap(), 100.0);
        assert_eq!(service.get_total(&user, None).await.unwrap(), 100.0);
        assert_eq!(
            service.get_total(&user, Some("crypto")).await.unwrap(),
            100.0
        );
        assert_eq!(service.get_total(&user, Some("card")).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn invalid_deposits_are_rejected() {
        let service = service().await;
        let user = seeded_principal(&service).await;

        assert!(service
            .record_deposit(&user, 0.0, "USD", "0xhash", "crypto")
            .await
            .is_err());
        assert!(service
            .record_deposit(&user, -5.0, "USD", "0xhash", "crypto")
            .await
            .is_err());
        assert!(service
            .record_deposit(&user, f64::NAN, "USD", "0xhash", "crypto")
            .await
            .is_err());
        assert!(service
            .record_deposit(&user, 10.0, "USD", "  ", "crypto")
            .await
            .is_err());
        assert!(service
            .record_deposit(&user, 10.0, "", "0xhash", "crypto")
            .await
            .is_err());
    }
}
