use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Server-side deposit ledger entry. The transaction hash is the idempotency
/// key: recording the same hash twice returns the original row untouched.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DepositTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub transaction_hash: String,
    pub payment_method: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
