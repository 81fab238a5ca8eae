use crate::database::sqlite::SqliteDatabase;
use crate::errors::{AppError, Result};
use crate::models::kyc::{
    KycCategory, KycDocument, KycDocumentBlob, KycFormData, KycFormFields, ReviewStatus,
    VerificationStatus,
};
use crate::models::user::User;
use crate::services::jwt::AuthenticatedUser;
use crate::utils::validation::Validator;
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

pub struct KycService {
    pub db: Arc<SqliteDatabase>,
}

impl KycService {
    pub fn new(db: Arc<SqliteDatabase>) -> Self {
        Self { db }
    }

    // Submission operations, scoped to the calling principal.

    /// Save one form section. The tagged payload already proved itself against
    /// the category's schema; whatever was stored before is replaced wholesale
    /// and the section goes back to pending review.
    pub async fn submit_form(
        &self,
        principal: &AuthenticatedUser,
        submission: KycFormFields,
    ) -> Result<KycFormData> {
        let category = submission.category();
        let fields_json = submission.to_json()?;

        let form = self
            .db
            .upsert_kyc_form(&principal.user_id, category, &fields_json)
            .await?;

        tracing::info!(
            action = "kyc_form_submitted",
            user_id = %principal.user_id,
            category = %category
        );
        Ok(form)
    }

    pub async fn get_form(
        &self,
        principal: &AuthenticatedUser,
        category: KycCategory,
    ) -> Result<Option<KycFormData>> {
        self.db.get_kyc_form(&principal.user_id, category).await
    }

    pub async fn get_forms(&self, principal: &AuthenticatedUser) -> Result<Vec<KycFormData>> {
        self.db.get_kyc_forms(&principal.user_id).await
    }

    /// Store an uploaded document. Type and size are checked before anything
    /// touches storage; the record and blob land together, resetting the
    /// section to pending.
    pub async fn submit_document(
        &self,
        principal: &AuthenticatedUser,
        category: KycCategory,
        content_type: &str,
        content: &[u8],
    ) -> Result<KycDocument> {
        Validator::validate_upload(content_type, content.len())?;

        let document = self
            .db
            .upsert_kyc_document(&principal.user_id, category, content_type, content)
            .await?;

        tracing::info!(
            action = "kyc_document_uploaded",
            user_id = %principal.user_id,
            category = %category,
            file_size = document.file_size
        );
        Ok(document)
    }

    pub async fn get_document(
        &self,
        principal: &AuthenticatedUser,
        category: KycCategory,
    ) -> Result<Option<KycDocument>> {
        self.db.get_kyc_document(&principal.user_id, category).await
    }

    pub async fn get_documents(&self, principal: &AuthenticatedUser) -> Result<Vec<KycDocument>> {
        self.db.get_kyc_documents(&principal.user_id).await
    }

    /// Fetch the caller's own document bytes. A document that does not exist
    /// and a document that belongs to someone else are indistinguishable to
    /// the caller, so ids cannot be probed across users.
    pub async fn get_own_document_blob(
        &self,
        principal: &AuthenticatedUser,
        document_id: &Uuid,
    ) -> Result<KycDocumentBlob> {
        let document = self.db.get_kyc_document_by_id(document_id).await?;

        match document {
            Some(document) if document.user_id == principal.user_id => self
                .db
                .get_kyc_document_blob(document_id)
                .await?
                .ok_or_else(|| AppError::NotFoundError("Document not found".to_string())),
            _ => Err(AppError::NotFoundError("Document not found".to_string())),
        }
    }

    pub async fn get_verification_status(
        &self,
        principal: &AuthenticatedUser,
    ) -> Result<VerificationStatus> {
        self.db.get_verification_status(&principal.user_id).await
    }

    // Review operations. Every one of these re-checks the admin flag; there is
    // no path around the gate.

    fn require_admin(principal: &AuthenticatedUser) -> Result<()> {
        if !principal.is_admin {
            return Err(AppError::AuthorizationError(
                "Admin access required".to_string(),
            ));
        }
        Ok(())
    }

    /// One keyset page of users with their document and form records.
    pub async fn list_users(
        &self,
        principal: &AuthenticatedUser,
        limit: Option<i64>,
        after: Option<String>,
    ) -> Result<(
        Vec<(User, Vec<KycDocument>, Vec<KycFormData>)>,
        Option<String>,
    )> {
        Self::require_admin(principal)?;

        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let page = self.db.list_users_with_kyc(limit, after.as_deref()).await?;

        let next_cursor = if page.len() as i64 == limit {
            page.last().map(|(user, _, _)| user.id.to_string())
        } else {
            None
        };

        Ok((page, next_cursor))
    }

    /// Apply an admin verdict to a document and/or form of one user's section,
    /// returning the freshly recomputed rollup.
    #[allow(clippy::too_many_arguments)]
    pub async fn review(
        &self,
        principal: &AuthenticatedUser,
        user_id: &Uuid,
        category: KycCategory,
        document_id: Option<&Uuid>,
        form_id: Option<&Uuid>,
        status: ReviewStatus,
        rejection_reason: Option<&str>,
    ) -> Result<VerificationStatus> {
        Self::require_admin(principal)?;

        if !status.is_verdict() {
            return Err(AppError::ValidationError(
                "Status must be approved or rejected".to_string(),
            ));
        }

        if document_id.is_none() && form_id.is_none() {
            return Err(AppError::ValidationError(
                "Either document_id or form_id must be provided".to_string(),
            ));
        }

        // A reason only makes sense on rejection; approval clears any old one.
        let reason = match status {
            ReviewStatus::Rejected => rejection_reason,
            _ => None,
        };

        let verification = self
            .db
            .set_kyc_review_status(user_id, category, document_id, form_id, status, reason)
            .await?;

        tracing::info!(
            action = "kyc_review_applied",
            admin_id = %principal.user_id,
            user_id = %user_id,
            category = %category,
            status = %status
        );
        Ok(verification)
    }

    /// Admin view of any document's bytes.
    pub async fn get_document_blob_for_review(
        &self,
        principal: &AuthenticatedUser,
        document_id: &Uuid,
    ) -> Result<KycDocumentBlob> {
        Self::require_admin(principal)?;

        self.db
            .get_kyc_document_blob(document_id)
            .await?
            .ok_or_else(|| AppError::NotFoundError("Document not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::kyc::IdentificationFields;
    use chrono::Utc;

    async fn service() -> KycService {
        let db = SqliteDatabase::connect("sqlite::memory:").await.unwrap();
        KycService::new(Arc::new(db))
    }

    async fn seeded_principal(service: &KycService, email: &str, is_admin: bool) -> AuthenticatedUser {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            full_name: "Test User".to_string(),
            email: email.to_string(),
            password_hash: "$argon2id$fake".to_string(),
            email_verified: true,
            verify_token: None,
            is_admin,
            balance: 0.0,
            created_at: now,
            updated_at: now,
        };
        service.db.create_user(&user).await.unwrap();
        AuthenticatedUser {
            user_id: user.id,
            email: user.email,
            is_admin,
            token_id: Uuid::new_v4().to_string(),
        }
    }

    fn identification_payload(id_number: &str) -> KycFormFields {
        KycFormFields::Identification(IdentificationFields {
            full_name: "Jane Doe".to_string(),
            date_of_birth: "1990-01-01".to_string(),
            nationality: "US".to_string(),
            id_type: "passport".to_string(),
            id_number: id_number.to_string(),
            expiry_date: "2030-01-01".to_string(),
        })
    }

    #[tokio::test]
    async fn first_submission_is_pending_with_stored_fields() {
        let service = service().await;
        let user = seeded_principal(&service, "jane@example.com", false).await;

        let form = service
            .submit_form(&user, identification_payload("X123"))
            .await
            .unwrap();
        assert_eq!(form.status, ReviewStatus::Pending);
        assert_eq!(form.category, KycCategory::Identification);
        assert_eq!(form.fields["idNumber"], "X123");
        assert_eq!(form.fields["fullName"], "Jane Doe");
    }

    #[tokio::test]
    async fn approve_then_resubmit_reverts_to_pending() {
        let service = service().await;
        let admin = seeded_principal(&service, "admin@example.com", true).await;
        let user = seeded_principal(&service, "jane@example.com", false).await;

        let form = service
            .submit_form(&user, identification_payload("X123"))
            .await
            .unwrap();

        service
            .review(
                &admin,
                &user.user_id,
                KycCategory::Identification,
                None,
                Some(&form.id),
                ReviewStatus::Approved,
                None,
            )
            .await
            .unwrap();

        let status = service.get_verification_status(&user).await.unwrap();
        assert_eq!(status.identification.form, ReviewStatus::Approved);

        let resubmitted = service
            .submit_form(&user, identification_payload("Y456"))
            .await
            .unwrap();
        assert_eq!(resubmitted.id, form.id);
        assert_eq!(resubmitted.status, ReviewStatus::Pending);
        assert_eq!(resubmitted.fields["idNumber"], "Y456");

        let status = service.get_verification_status(&user).await.unwrap();
        assert_eq!(status.identification.form, ReviewStatus::Pending);
    }

    #[tokio::test]
    async fn blob_reads_are_ownership_masked() {
        let service = service().await;
        let owner = seeded_principal(&service, "owner@example.com", false).await;
        let other = seeded_principal(&service, "other@example.com", false).await;

        let document = service
            .submit_document(&owner, KycCategory::Tax, "application/pdf", b"%PDF-1.4 data")
            .await
            .unwrap();

        let blob = service
            .get_own_document_blob(&owner, &document.id)
            .await
            .unwrap();
        assert_eq!(blob.content, b"%PDF-1.4 data");
        assert_eq!(blob.content_type, "application/pdf");

        let err = service
            .get_own_document_blob(&other, &document.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFoundError(_)));
    }

    #[tokio::test]
    async fn oversized_or_wrong_type_uploads_are_rejected() {
        let service = service().await;
        let user = seeded_principal(&service, "jane@example.com", false).await;

        let err = service
            .submit_document(&user, KycCategory::Tax, "text/html", b"<html>")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let big = vec![0u8; crate::utils::validation::MAX_UPLOAD_SIZE + 1];
        let err = service
            .submit_document(&user, KycCategory::Tax, "image/png", &big)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn review_surface_requires_the_admin_flag() {
        let service = service().await;
        let user = seeded_principal(&service, "jane@example.com", false).await;

        let err = service
            .list_users(&user, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthorizationError(_)));

        let err = service
            .review(
                &user,
                &user.user_id,
                KycCategory::Tax,
                None,
                Some(&Uuid::new_v4()),
                ReviewStatus::Approved,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthorizationError(_)));

        let err = service
            .get_document_blob_for_review(&user, &Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthorizationError(_)));
    }

    #[tokio::test]
    async fn review_rejects_bad_inputs() {
        let service = service().await;
        let admin = seeded_principal(&service, "admin@example.com", true).await;
        let user = seeded_principal(&service, "jane@example.com", false).await;

        // Pending is not a verdict.
        let err = service
            .review(
                &admin,
                &user.user_id,
                KycCategory::Tax,
                None,
                Some(&Uuid::new_v4()),
                ReviewStatus::Pending,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        // At least one target id is required.
        let err = service
            .review(
                &admin,
                &user.user_id,
                KycCategory::Tax,
                None,
                None,
                ReviewStatus::Approved,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn rejection_stores_the_reason_and_approval_clears_it() {
        let service = service().await;
        let admin = seeded_principal(&service, "admin@example.com", true).await;
        let user = seeded_principal(&service, "jane@example.com", false).await;

        let form = service
            .submit_form(&user, identification_payload("X123"))
            .await
            .unwrap();

        service
            .review(
                &admin,
                &user.user_id,
                KycCategory::Identification,
                None,
                Some(&form.id),
                ReviewStatus::Rejected,
                Some("ID number illegible"),
            )
            .await
            .unwrap();

        let stored = service
            .get_form(&user, KycCategory::Identification)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ReviewStatus::Rejected);
        assert_eq!(stored.rejection_reason.as_deref(), Some("ID number illegible"));

        service
            .review(
                &admin,
                &user.user_id,
                KycCategory::Identification,
                None,
                Some(&form.id),
                ReviewStatus::Approved,
                Some("should be ignored"),
            )
            .await
            .unwrap();

        let stored = service
            .get_form(&user, KycCategory::Identification)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ReviewStatus::Approved);
        assert!(stored.rejection_reason.is_none());
    }

    #[tokio::test]
    async fn admin_listing_pages_and_carries_records() {
        let service = service().await;
        let admin = seeded_principal(&service, "admin@example.com", true).await;
        let user = seeded_principal(&service, "jane@example.com", false).await;

        service
            .submit_form(&user, identification_payload("X123"))
            .await
            .unwrap();
        service
            .submit_document(&user, KycCategory::Identification, "image/png", b"png")
            .await
            .unwrap();

        let (page, next) = service.list_users(&admin, Some(10), None).await.unwrap();
        assert!(next.is_none());
        assert_eq!(page.len(), 2);

        let (_, documents, forms) = page
            .iter()
            .find(|(u, _, _)| u.id == user.user_id)
            .expect("listed user");
        assert_eq!(documents.len(), 1);
        assert_eq!(forms.len(), 1);
    }
}
