use axum::http::HeaderValue;
use axum::{response::IntoResponse, Extension, Json, Router};
use hyper::Method;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, Instrument};
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa_redoc::{Redoc, Servable};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::database::sqlite::SqliteDatabase;
use crate::errors::AppError;
use crate::services::auth::AuthService;
use crate::services::deposit_service::DepositService;
use crate::services::kyc_service::KycService;
use crate::services::user_service::UserService;
use crate::utils::middleware::global_rate_limiter;

mod routes;
mod types;
pub mod docs;

/// Shared handles threaded through every handler via an Extension layer.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqliteDatabase>,
    pub auth: Arc<AuthService>,
    pub users: Arc<UserService>,
    pub kyc: Arc<KycService>,
    pub deposits: Arc<DepositService>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::register,
        routes::verify_email,
        routes::login,
        routes::validate_token,
        routes::refresh_token,
        routes::logout,
        routes::get_profile,
        // KYC endpoints:
        routes::submit_kyc_form,
        routes::get_kyc_forms,
        routes::upload_kyc_document,
        routes::get_kyc_documents,
        routes::download_kyc_document,
        routes::get_kyc_status,
        // Admin review endpoints:
        routes::admin_list_kyc_users,
        routes::admin_review_kyc,
        routes::admin_download_kyc_document,
        // Deposit endpoints:
        routes::record_deposit,
        routes::get_deposit_total,
        routes::get_balance,
    ),
    components(
        schemas(
            types::RegisterRequest,
            types::RegisterResponse,
            types::VerifyEmailRequest,
            types::VerifyEmailResponse,
            types::LoginRequest,
            types::LoginResponse,
            types::ValidateResponse,
            types::RefreshResponse,
            types::LogoutResponse,
            types::KycFormListResponse,
            types::KycDocumentListResponse,
            types::KycDocumentUploadResponse,
            types::KycDocumentsByCategory,
            types::KycFormsByCategory,
            types::KycAdminUserEntry,
            types::KycAdminListResponse,
            types::KycReviewRequest,
            types::KycReviewResponse,
            types::DepositRequest,
            types::DepositTotalResponse,
            types::BalanceResponse,

            crate::models::user::UserResponse,
            crate::models::kyc::KycCategory,
            crate::models::kyc::ReviewStatus,
            crate::models::kyc::KycFormFields,
            crate::models::kyc::IdentificationFields,
            crate::models::kyc::AddressFields,
            crate::models::kyc::TaxFields,
            crate::models::kyc::FinancialFields,
            crate::models::kyc::KycFormData,
            crate::models::kyc::KycDocument,
            crate::models::kyc::CategoryStatus,
            crate::models::kyc::VerificationStatus,
            crate::models::transaction::DepositTransaction,
        )
    ),
    tags(
        (name = "Auth", description = "Registration, email verification and session endpoints"),
        (name = "KYC", description = "Investor verification submissions. All endpoints require JWT authentication. Use the Authorize button and paste your token as 'Bearer <token>'!"),
        (name = "Admin", description = "Compliance review endpoints, restricted to admin accounts"),
        (name = "Transactions", description = "Deposit recording and balance endpoints")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearerAuth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub async fn request_id_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let request_id = Uuid::new_v4().to_string();
    req.extensions_mut().insert(request_id.clone());
    let span = tracing::info_span!("request", request_id = %request_id, method = %req.method(), uri = %req.uri());
    next.run(req).instrument(span).await
}

/// Assembles the application router around the supplied state. The rate
/// limiter and CORS policy are layered on by `start_http_server` so tests can
/// drive this router directly.
pub fn build_router(state: AppState) -> Router {
    let openapi = ApiDoc::openapi();

    Router::new()
        .nest("/api/auth", routes::auth_router())
        .nest("/api/kyc", routes::kyc_router())
        .nest("/api/admin/kyc", routes::admin_kyc_router())
        .nest("/api/transactions", routes::transactions_router())
        .nest("/api/user", routes::user_router())
        .nest("/api/profile", routes::profile_router())
        .route("/health", axum::routing::get(health_check))
        // OpenAPI Documentation Routes
        .route("/docs/openapi.json", axum::routing::get(openapi_json))
        .route("/docs/redoc", axum::routing::get(redoc_ui))
        .route("/docs/markdown", axum::routing::get(api_markdown))
        .route("/docs", axum::routing::get(api_documentation))
        // Swagger UI
        .merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", openapi.clone()))
        // Redoc UI
        .merge(Redoc::with_url("/api/redoc", openapi))
        .layer(Extension(state))
        .layer(axum::middleware::from_fn(request_id_middleware))
}

fn cors_layer() -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    match std::env::var("CORS_ALLOWED_ORIGINS") {
        Ok(origins) => {
            let parsed: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            cors.allow_origin(parsed)
        }
        Err(_) => cors.allow_origin(Any),
    }
}

/// Main entry point for the TokenizeHub API server.
/// Sets up all routes, middleware, and documentation endpoints.
pub async fn start_http_server() -> Result<(), AppError> {
    let database_path =
        std::env::var("DATABASE_PATH").unwrap_or_else(|_| "tokenizehub.db".to_string());
    let db = Arc::new(SqliteDatabase::new(&database_path).await?);

    let auth = Arc::new(AuthService::from_env(db.clone()));
    let users = Arc::new(UserService::new(
        db.clone(),
        std::env::var("ADMIN_EMAIL").ok(),
    ));
    let kyc = Arc::new(KycService::new(db.clone()));
    let deposits = Arc::new(DepositService::new(db.clone()));

    let state = AppState {
        db,
        auth,
        users,
        kyc,
        deposits,
    };

    let app = build_router(state)
        .layer(cors_layer())
        .layer(axum::middleware::from_fn(global_rate_limiter));

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr: SocketAddr = format!("0.0.0.0:{}", port)
        .parse()
        .map_err(|e| AppError::InternalError(format!("Invalid listen address: {}", e)))?;

    info!(action = "server_started", addr = %addr, docs = %format!("http://{}/api/docs", addr));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to bind {}: {}", addr, e)))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| AppError::InternalError(format!("Server error: {}", e)))?;

    Ok(())
}

async fn health_check() -> impl IntoResponse {
    "OK"
}

/// Export OpenAPI specification as JSON
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Serves the Redoc UI for API documentation.
async fn redoc_ui() -> impl IntoResponse {
    let html = r#"
    <!DOCTYPE html>
    <html>
    <head>
        <title>TokenizeHub API Documentation</title>
        <meta charset="utf-8"/>
        <meta name="viewport" content="width=device-width, initial-scale=1">
        <link href="https://fonts.googleapis.com/css?family=Montserrat:300,400,700|Roboto:300,400,700" rel="stylesheet">
        <style>
            body {
                margin: 0;
                padding: 0;
            }
        </style>
    </head>
    <body>
        <redoc spec-url="/docs/openapi.json"></redoc>
        <script src="https://cdn.redoc.ly/redoc/latest/bundles/redoc.standalone.js"></script>
    </body>
    </html>
    "#;
    axum::response::Html(html)
}

/// Serves the API documentation as downloadable Markdown.
async fn api_markdown() -> impl IntoResponse {
    let markdown = docs::generate_markdown_docs();
    axum::response::Response::builder()
        .header("Content-Type", "text/markdown")
        .header(
            "Content-Disposition",
            "attachment; filename=\"API_DOCUMENTATION.md\"",
        )
        .body(axum::body::Body::from(markdown))
        .unwrap_or_else(|_| axum::response::Response::new(axum::body::Body::empty()))
}

/// Serves the main API documentation HTML page.
async fn api_documentation() -> impl IntoResponse {
    let html = docs::generate_documentation_html();
    axum::response::Html(html)
}
