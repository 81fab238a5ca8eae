use crate::models::kyc::{KycCategory, KycDocument, KycFormData, ReviewStatus, VerificationStatus};
use crate::models::user::UserResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub message: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyEmailResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ValidateResponse {
    pub valid: bool,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub is_admin: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogoutResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct CategoryQuery {
    pub category: Option<KycCategory>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct KycFormListResponse {
    pub forms: Vec<KycFormData>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct KycDocumentListResponse {
    pub documents: Vec<KycDocument>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct KycDocumentUploadResponse {
    pub document_id: Uuid,
    pub status: ReviewStatus,
}

/// One record slot per category; a null means nothing submitted yet.
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct KycDocumentsByCategory {
    pub identification: Option<KycDocument>,
    pub address: Option<KycDocument>,
    pub tax: Option<KycDocument>,
    pub financial: Option<KycDocument>,
}

impl KycDocumentsByCategory {
    pub fn from_records(records: Vec<KycDocument>) -> Self {
        let mut by_category = Self::default();
        for record in records {
            match record.category {
                KycCategory::Identification => by_category.identification = Some(record),
                KycCategory::Address => by_category.address = Some(record),
                KycCategory::Tax => by_category.tax = Some(record),
                KycCategory::Financial => by_category.financial = Some(record),
            }
        }
        by_category
    }
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct KycFormsByCategory {
    pub identification: Option<KycFormData>,
    pub address: Option<KycFormData>,
    pub tax: Option<KycFormData>,
    pub financial: Option<KycFormData>,
}

impl KycFormsByCategory {
    pub fn from_records(records: Vec<KycFormData>) -> Self {
        let mut by_category = Self::default();
        for record in records {
            match record.category {
                KycCategory::Identification => by_category.identification = Some(record),
                KycCategory::Address => by_category.address = Some(record),
                KycCategory::Tax => by_category.tax = Some(record),
                KycCategory::Financial => by_category.financial = Some(record),
            }
        }
        by_category
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct KycAdminUserEntry {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub documents: KycDocumentsByCategory,
    pub forms: KycFormsByCategory,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct KycAdminListResponse {
    pub users: Vec<KycAdminUserEntry>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdminListQuery {
    pub limit: Option<i64>,
    pub after: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct KycReviewRequest {
    pub user_id: Uuid,
    pub category: KycCategory,
    pub document_id: Option<Uuid>,
    pub form_id: Option<Uuid>,
    pub status: ReviewStatus,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct KycReviewResponse {
    pub success: bool,
    pub message: String,
    pub verification: VerificationStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DepositRequest {
    pub amount: f64,
    pub currency: String,
    pub transaction_hash: String,
    pub payment_method: String,
}

#[derive(Debug, Deserialize)]
pub struct DepositTotalQuery {
    pub payment_method: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DepositTotalResponse {
    pub total: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceResponse {
    pub balance: f64,
}
