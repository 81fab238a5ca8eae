use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Extension, FromRequestParts, Multipart, Path, Query},
    http::{header::AUTHORIZATION, header::CONTENT_LENGTH, header::CONTENT_TYPE, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::api::types::*;
use crate::api::AppState;
use crate::errors::AppError;
use crate::models::kyc::{KycCategory, KycDocumentBlob, KycFormData, KycFormFields, VerificationStatus};
use crate::models::transaction::DepositTransaction;
use crate::models::user::UserResponse;
use crate::utils::validation::MAX_UPLOAD_SIZE;

// JWT extractor for Authorization: Bearer ...
pub struct AuthBearer(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthBearer
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(auth) = parts.headers.get(AUTHORIZATION) {
            if let Ok(auth_str) = auth.to_str() {
                if let Some(token) = auth_str.strip_prefix("Bearer ") {
                    return Ok(AuthBearer(token.to_string()));
                }
            }
        }
        Err(AppError::AuthenticationError(
            "Missing or invalid Authorization header".to_string(),
        ))
    }
}

pub fn auth_router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/verify-email", post(verify_email))
        .route("/login", post(login))
        .route("/validate", get(validate_token))
        .route("/refresh", post(refresh_token))
        .route("/logout", post(logout))
}

pub fn kyc_router() -> Router {
    Router::new()
        .route("/forms", post(submit_kyc_form).get(get_kyc_forms))
        .route(
            "/documents",
            post(upload_kyc_document).get(get_kyc_documents),
        )
        .route("/documents/:id/blob", get(download_kyc_document))
        .route("/status", get(get_kyc_status))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE + 64 * 1024))
}

pub fn admin_kyc_router() -> Router {
    Router::new()
        .route("/users", get(admin_list_kyc_users))
        .route("/status", post(admin_review_kyc))
        .route("/documents/:id/blob", get(admin_download_kyc_document))
}

pub fn transactions_router() -> Router {
    Router::new()
        .route("/deposit", post(record_deposit))
        .route("/total", get(get_deposit_total))
}

pub fn user_router() -> Router {
    Router::new().route("/balance", get(get_balance))
}

pub fn profile_router() -> Router {
    Router::new().route("/", get(get_profile))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered, email verification pending", body = RegisterResponse),
        (status = 400, description = "Validation failed")
    )
)]
pub async fn register(
    Extension(state): Extension<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .users
        .register_user(&payload.full_name, &payload.email, &payload.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.id,
            message: "Registration successful. Check your email for a verification token."
                .to_string(),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/verify-email",
    tag = "Auth",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = VerifyEmailResponse),
        (status = 400, description = "Invalid or expired verification token")
    )
)]
pub async fn verify_email(
    Extension(state): Extension<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<Json<VerifyEmailResponse>, AppError> {
    state.users.verify_email(&payload.token).await?;

    Ok(Json(VerifyEmailResponse {
        success: true,
        message: "Email verified successfully".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid email or password")
    )
)]
pub async fn login(
    Extension(state): Extension<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let (issued, user) = state.auth.login(&payload.email, &payload.password).await?;

    Ok(Json(LoginResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        user: UserResponse::from(user),
    }))
}

#[utoipa::path(
    get,
    path = "/api/auth/validate",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Token introspection result", body = ValidateResponse)
    )
)]
pub async fn validate_token(
    Extension(state): Extension<AppState>,
    AuthBearer(token): AuthBearer,
) -> Json<ValidateResponse> {
    match state.auth.validate_token(&token).await {
        Ok(principal) => Json(ValidateResponse {
            valid: true,
            user_id: Some(principal.user_id),
            email: Some(principal.email),
            is_admin: Some(principal.is_admin),
        }),
        Err(_) => Json(ValidateResponse {
            valid: false,
            user_id: None,
            email: None,
            is_admin: None,
        }),
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "New token issued, old one revoked", body = RefreshResponse),
        (status = 401, description = "Token invalid or revoked")
    )
)]
pub async fn refresh_token(
    Extension(state): Extension<AppState>,
    AuthBearer(token): AuthBearer,
) -> Result<Json<RefreshResponse>, AppError> {
    let issued = state.auth.refresh_token(&token).await?;

    Ok(Json(RefreshResponse {
        token: issued.token,
        expires_at: issued.expires_at,
    }))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Session revoked", body = LogoutResponse),
        (status = 401, description = "Token invalid")
    )
)]
pub async fn logout(
    Extension(state): Extension<AppState>,
    AuthBearer(token): AuthBearer,
) -> Result<Json<LogoutResponse>, AppError> {
    state.auth.logout(&token).await?;

    Ok(Json(LogoutResponse {
        message: "Logged out successfully".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/profile",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Authenticated user's profile", body = UserResponse),
        (status = 401, description = "Token invalid")
    )
)]
pub async fn get_profile(
    Extension(state): Extension<AppState>,
    AuthBearer(token): AuthBearer,
) -> Result<Json<UserResponse>, AppError> {
    let principal = state.auth.validate_token(&token).await?;
    let user = state.users.get_profile(&principal.user_id).await?;

    Ok(Json(UserResponse::from(user)))
}

#[utoipa::path(
    post,
    path = "/api/kyc/forms",
    tag = "KYC",
    security(("bearerAuth" = [])),
    request_body = KycFormFields,
    responses(
        (status = 200, description = "Form stored and queued for review", body = KycFormData),
        (status = 401, description = "Token invalid"),
        (status = 422, description = "Fields do not match the declared category")
    )
)]
pub async fn submit_kyc_form(
    Extension(state): Extension<AppState>,
    AuthBearer(token): AuthBearer,
    Json(payload): Json<KycFormFields>,
) -> Result<Json<KycFormData>, AppError> {
    let principal = state.auth.validate_token(&token).await?;
    let form = state.kyc.submit_form(&principal, payload).await?;

    Ok(Json(form))
}

#[utoipa::path(
    get,
    path = "/api/kyc/forms",
    tag = "KYC",
    security(("bearerAuth" = [])),
    params(
        ("category" = Option<KycCategory>, Query, description = "Restrict the response to one category")
    ),
    responses(
        (status = 200, description = "Submitted form sections", body = KycFormListResponse),
        (status = 404, description = "No form submitted for the requested category")
    )
)]
pub async fn get_kyc_forms(
    Extension(state): Extension<AppState>,
    AuthBearer(token): AuthBearer,
    Query(query): Query<CategoryQuery>,
) -> Result<Response, AppError> {
    let principal = state.auth.validate_token(&token).await?;

    match query.category {
        Some(category) => {
            let form = state
                .kyc
                .get_form(&principal, category)
                .await?
                .ok_or_else(|| AppError::NotFoundError("Form not found".to_string()))?;
            Ok(Json(form).into_response())
        }
        None => {
            let forms = state.kyc.get_forms(&principal).await?;
            Ok(Json(KycFormListResponse { forms }).into_response())
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/kyc/documents",
    tag = "KYC",
    security(("bearerAuth" = [])),
    request_body(content = Vec<u8>, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Document stored and queued for review", body = KycDocumentUploadResponse),
        (status = 400, description = "Unsupported media type or file too large"),
        (status = 401, description = "Token invalid")
    )
)]
pub async fn upload_kyc_document(
    Extension(state): Extension<AppState>,
    AuthBearer(token): AuthBearer,
    mut multipart: Multipart,
) -> Result<Json<KycDocumentUploadResponse>, AppError> {
    let principal = state.auth.validate_token(&token).await?;

    let mut category: Option<KycCategory> = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::ValidationError(format!("Invalid multipart payload: {}", e)))?
    {
        match field.name() {
            Some("category") => {
                let value = field.text().await.map_err(|e| {
                    AppError::ValidationError(format!("Failed to read category field: {}", e))
                })?;
                category = Some(value.parse()?);
            }
            Some("file") => {
                let content_type = field.content_type().map(str::to_string).ok_or_else(|| {
                    AppError::ValidationError("File part must declare a content type".to_string())
                })?;
                let bytes = field.bytes().await.map_err(|e| {
                    AppError::ValidationError(format!("Failed to read file field: {}", e))
                })?;
                file = Some((content_type, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let category =
        category.ok_or_else(|| AppError::ValidationError("Missing category field".to_string()))?;
    let (content_type, content) =
        file.ok_or_else(|| AppError::ValidationError("Missing file field".to_string()))?;

    let document = state
        .kyc
        .submit_document(&principal, category, &content_type, &content)
        .await?;

    Ok(Json(KycDocumentUploadResponse {
        document_id: document.id,
        status: document.status,
    }))
}

#[utoipa::path(
    get,
    path = "/api/kyc/documents",
    tag = "KYC",
    security(("bearerAuth" = [])),
    params(
        ("category" = Option<KycCategory>, Query, description = "Restrict the response to one category")
    ),
    responses(
        (status = 200, description = "Uploaded document metadata", body = KycDocumentListResponse),
        (status = 404, description = "No document uploaded for the requested category")
    )
)]
pub async fn get_kyc_documents(
    Extension(state): Extension<AppState>,
    AuthBearer(token): AuthBearer,
    Query(query): Query<CategoryQuery>,
) -> Result<Response, AppError> {
    let principal = state.auth.validate_token(&token).await?;

    match query.category {
        Some(category) => {
            let document = state
                .kyc
                .get_document(&principal, category)
                .await?
                .ok_or_else(|| AppError::NotFoundError("Document not found".to_string()))?;
            Ok(Json(document).into_response())
        }
        None => {
            let documents = state.kyc.get_documents(&principal).await?;
            Ok(Json(KycDocumentListResponse { documents }).into_response())
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/kyc/documents/{id}/blob",
    tag = "KYC",
    security(("bearerAuth" = [])),
    params(
        ("id" = Uuid, Path, description = "Document id")
    ),
    responses(
        (status = 200, description = "Raw document bytes with the stored content type"),
        (status = 404, description = "Document not found")
    )
)]
pub async fn download_kyc_document(
    Extension(state): Extension<AppState>,
    AuthBearer(token): AuthBearer,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let principal = state.auth.validate_token(&token).await?;
    let blob = state.kyc.get_own_document_blob(&principal, &id).await?;

    blob_response(blob)
}

#[utoipa::path(
    get,
    path = "/api/kyc/status",
    tag = "KYC",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Per-category verification rollup", body = VerificationStatus),
        (status = 401, description = "Token invalid")
    )
)]
pub async fn get_kyc_status(
    Extension(state): Extension<AppState>,
    AuthBearer(token): AuthBearer,
) -> Result<Json<VerificationStatus>, AppError> {
    let principal = state.auth.validate_token(&token).await?;
    let status = state.kyc.get_verification_status(&principal).await?;

    Ok(Json(status))
}

#[utoipa::path(
    get,
    path = "/api/admin/kyc/users",
    tag = "Admin",
    security(("bearerAuth" = [])),
    params(
        ("limit" = Option<i64>, Query, description = "Page size, capped at 200"),
        ("after" = Option<String>, Query, description = "Cursor returned by the previous page")
    ),
    responses(
        (status = 200, description = "Users with their KYC records", body = KycAdminListResponse),
        (status = 403, description = "Admin access required")
    )
)]
pub async fn admin_list_kyc_users(
    Extension(state): Extension<AppState>,
    AuthBearer(token): AuthBearer,
    Query(query): Query<AdminListQuery>,
) -> Result<Json<KycAdminListResponse>, AppError> {
    let principal = state.auth.validate_token(&token).await?;
    let (entries, next_cursor) = state
        .kyc
        .list_users(&principal, query.limit, query.after)
        .await?;

    let users = entries
        .into_iter()
        .map(|(user, documents, forms)| KycAdminUserEntry {
            id: user.id,
            full_name: user.full_name,
            email: user.email,
            documents: KycDocumentsByCategory::from_records(documents),
            forms: KycFormsByCategory::from_records(forms),
        })
        .collect();

    Ok(Json(KycAdminListResponse { users, next_cursor }))
}

#[utoipa::path(
    post,
    path = "/api/admin/kyc/status",
    tag = "Admin",
    security(("bearerAuth" = [])),
    request_body = KycReviewRequest,
    responses(
        (status = 200, description = "Verdict recorded and rollup recomputed", body = KycReviewResponse),
        (status = 400, description = "Invalid verdict or missing record ids"),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "No record matches the supplied ids")
    )
)]
pub async fn admin_review_kyc(
    Extension(state): Extension<AppState>,
    AuthBearer(token): AuthBearer,
    Json(payload): Json<KycReviewRequest>,
) -> Result<Json<KycReviewResponse>, AppError> {
    let principal = state.auth.validate_token(&token).await?;
    let verification = state
        .kyc
        .review(
            &principal,
            &payload.user_id,
            payload.category,
            payload.document_id.as_ref(),
            payload.form_id.as_ref(),
            payload.status,
            payload.rejection_reason.as_deref(),
        )
        .await?;

    Ok(Json(KycReviewResponse {
        success: true,
        message: format!("KYC {} review recorded", payload.category),
        verification,
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/kyc/documents/{id}/blob",
    tag = "Admin",
    security(("bearerAuth" = [])),
    params(
        ("id" = Uuid, Path, description = "Document id")
    ),
    responses(
        (status = 200, description = "Raw document bytes with the stored content type"),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "Document not found")
    )
)]
pub async fn admin_download_kyc_document(
    Extension(state): Extension<AppState>,
    AuthBearer(token): AuthBearer,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let principal = state.auth.validate_token(&token).await?;
    let blob = state
        .kyc
        .get_document_blob_for_review(&principal, &id)
        .await?;

    blob_response(blob)
}

#[utoipa::path(
    post,
    path = "/api/transactions/deposit",
    tag = "Transactions",
    security(("bearerAuth" = [])),
    request_body = DepositRequest,
    responses(
        (status = 200, description = "Deposit recorded, or the existing record when the hash was already seen", body = DepositTransaction),
        (status = 400, description = "Validation failed")
    )
)]
pub async fn record_deposit(
    Extension(state): Extension<AppState>,
    AuthBearer(token): AuthBearer,
    Json(payload): Json<DepositRequest>,
) -> Result<Json<DepositTransaction>, AppError> {
    let principal = state.auth.validate_token(&token).await?;
    let transaction = state
        .deposits
        .record_deposit(
            &principal,
            payload.amount,
            &payload.currency,
            &payload.transaction_hash,
            &payload.payment_method,
        )
        .await?;

    Ok(Json(transaction))
}

#[utoipa::path(
    get,
    path = "/api/transactions/total",
    tag = "Transactions",
    security(("bearerAuth" = [])),
    params(
        ("payment_method" = Option<String>, Query, description = "Restrict the total to one payment method")
    ),
    responses(
        (status = 200, description = "Sum of completed deposits", body = DepositTotalResponse)
    )
)]
pub async fn get_deposit_total(
    Extension(state): Extension<AppState>,
    AuthBearer(token): AuthBearer,
    Query(query): Query<DepositTotalQuery>,
) -> Result<Json<DepositTotalResponse>, AppError> {
    let principal = state.auth.validate_token(&token).await?;
    let total = state
        .deposits
        .get_total(&principal, query.payment_method.as_deref())
        .await?;

    Ok(Json(DepositTotalResponse { total }))
}

#[utoipa::path(
    get,
    path = "/api/user/balance",
    tag = "Transactions",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Current account balance", body = BalanceResponse)
    )
)]
pub async fn get_balance(
    Extension(state): Extension<AppState>,
    AuthBearer(token): AuthBearer,
) -> Result<Json<BalanceResponse>, AppError> {
    let principal = state.auth.validate_token(&token).await?;
    let balance = state.deposits.get_balance(&principal).await?;

    Ok(Json(BalanceResponse { balance }))
}

fn blob_response(blob: KycDocumentBlob) -> Result<Response, AppError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, blob.content_type)
        .header(CONTENT_LENGTH, blob.content.len())
        .body(Body::from(blob.content))
        .map_err(|e| AppError::InternalError(format!("Failed to build blob response: {}", e)))
}
