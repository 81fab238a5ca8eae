use crate::errors::{AppError, Result};
use crate::models::kyc::{
    KycCategory, KycDocument, KycDocumentBlob, KycFormData, ReviewStatus, VerificationStatus,
};
use crate::models::transaction::DepositTransaction;
use crate::models::user::User;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Open (creating if necessary) a file-backed database and ensure the schema.
    pub async fn new(database_path: &str) -> Result<Self> {
        // Ensure the directory exists
        if let Some(parent) = Path::new(database_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::DatabaseError(format!("Failed to create database directory: {}", e))
            })?;
        }

        if !Path::new(database_path).exists() {
            std::fs::File::create(database_path).map_err(|e| {
                AppError::DatabaseError(format!("Failed to create database file: {}", e))
            })?;
            tracing::info!(action = "database_file_created", path = %database_path);
        }

        let database_url = format!("sqlite:{}", database_path);
        let db = Self::connect(&database_url).await?;
        tracing::info!(action = "database_connected", path = %database_path);
        Ok(db)
    }

    /// Connect to an arbitrary SQLite URL (tests use `sqlite::memory:`) and
    /// ensure the schema. In-memory databases are pinned to a single pooled
    /// connection; each `:memory:` connection is otherwise its own database.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new().max_connections(1)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = options
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect to database: {}", e)))?;

        let db = Self { pool };
        db.create_tables().await?;
        Ok(db)
    }

    pub fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create_tables(&self) -> Result<()> {
        let query = r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                full_name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                email_verified BOOLEAN DEFAULT FALSE,
                verify_token TEXT,
                is_admin BOOLEAN DEFAULT FALSE,
                balance REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_tokens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                token_id TEXT UNIQUE NOT NULL,
                token_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                is_active BOOLEAN DEFAULT TRUE,
                FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS kyc_documents (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                category TEXT NOT NULL,
                file_type TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                rejection_reason TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE,
                UNIQUE(user_id, category)
            );

            CREATE TABLE IF NOT EXISTS kyc_document_blobs (
                document_id TEXT PRIMARY KEY,
                content BLOB NOT NULL,
                content_type TEXT NOT NULL,
                size INTEGER NOT NULL,
                FOREIGN KEY (document_id) REFERENCES kyc_documents (id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS kyc_forms (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                category TEXT NOT NULL,
                fields TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                rejection_reason TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE,
                UNIQUE(user_id, category)
            );

            CREATE TABLE IF NOT EXISTS kyc_verification_status (
                user_id TEXT PRIMARY KEY,
                identification_form_status TEXT NOT NULL,
                identification_document_status TEXT NOT NULL,
                address_form_status TEXT NOT NULL,
                address_document_status TEXT NOT NULL,
                tax_form_status TEXT NOT NULL,
                tax_document_status TEXT NOT NULL,
                financial_form_status TEXT NOT NULL,
                financial_document_status TEXT NOT NULL,
                is_complete BOOLEAN NOT NULL DEFAULT FALSE,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS deposit_transactions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                amount REAL NOT NULL,
                currency TEXT NOT NULL,
                transaction_hash TEXT UNIQUE NOT NULL,
                payment_method TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'completed',
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
            CREATE INDEX IF NOT EXISTS idx_users_verify_token ON users(verify_token);
            CREATE INDEX IF NOT EXISTS idx_tokens_user_id ON user_tokens(user_id);
            CREATE INDEX IF NOT EXISTS idx_tokens_token_id ON user_tokens(token_id);
            CREATE INDEX IF NOT EXISTS idx_tokens_active ON user_tokens(is_active);
            CREATE INDEX IF NOT EXISTS idx_kyc_documents_user_id ON kyc_documents(user_id);
            CREATE INDEX IF NOT EXISTS idx_kyc_forms_user_id ON kyc_forms(user_id);
            CREATE INDEX IF NOT EXISTS idx_deposits_user_id ON deposit_transactions(user_id);
            CREATE INDEX IF NOT EXISTS idx_deposits_hash ON deposit_transactions(transaction_hash);
        "#;

        sqlx::query(query)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create tables: {}", e)))?;

        tracing::debug!(action = "database_tables_verified");
        Ok(())
    }

    // User methods

    pub async fn create_user(&self, user: &User) -> Result<()> {
        let query = r#"
            INSERT INTO users (id, full_name, email, password_hash, email_verified, verify_token, is_admin, balance, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#;

        sqlx::query(query)
            .bind(user.id.to_string())
            .bind(&user.full_name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.email_verified)
            .bind(&user.verify_token)
            .bind(user.is_admin)
            .bind(user.balance)
            .bind(user.created_at.to_rfc3339())
            .bind(user.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if e.to_string().contains("UNIQUE constraint failed") {
                    AppError::ValidationError("Email already registered".to_string())
                } else {
                    AppError::DatabaseError(format!("Failed to create user: {}", e))
                }
            })?;

        tracing::debug!(action = "user_saved", user_id = %user.id);
        Ok(())
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch user by email: {}", e)))?;

        row.map(|row| user_from_row(&row)).transpose()
    }

    pub async fn get_user_by_id(&self, user_id: &Uuid) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch user by id: {}", e)))?;

        row.map(|row| user_from_row(&row)).transpose()
    }

    pub async fn get_user_by_verify_token(&self, token: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE verify_token = ?1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to fetch user by verify token: {}", e))
            })?;

        row.map(|row| user_from_row(&row)).transpose()
    }

    /// Mark the user's email verified and consume the token.
    pub async fn verify_user_email(&self, user_id: &Uuid) -> Result<()> {
        let query = r#"
            UPDATE users
            SET email_verified = TRUE, verify_token = NULL, updated_at = ?1
            WHERE id = ?2
        "#;

        let result = sqlx::query(query)
            .bind(Utc::now().to_rfc3339())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to verify user email: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFoundError("User not found".to_string()));
        }

        tracing::debug!(action = "user_email_verified", user_id = %user_id);
        Ok(())
    }

    pub async fn get_user_balance(&self, user_id: &Uuid) -> Result<f64> {
        let row = sqlx::query("SELECT balance FROM users WHERE id = ?1")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch balance: {}", e)))?;

        match row {
            Some(row) => Ok(row.get("balance")),
            None => Err(AppError::NotFoundError("User not found".to_string())),
        }
    }

    // JWT token methods

    pub async fn store_user_token(
        &self,
        user_id: &Uuid,
        token_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        // One live session per user: deactivate whatever came before.
        sqlx::query("UPDATE user_tokens SET is_active = FALSE WHERE user_id = ?1 AND is_active = TRUE")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to deactivate existing tokens: {}", e))
            })?;

        let query = r#"
            INSERT INTO user_tokens (user_id, token_id, token_hash, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
        "#;

        sqlx::query(query)
            .bind(user_id.to_string())
            .bind(token_id)
            .bind(token_hash)
            .bind(Utc::now().to_rfc3339())
            .bind(expires_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to store token: {}", e)))?;

        tracing::debug!(action = "token_stored", user_id = %user_id);
        Ok(())
    }

    pub async fn is_token_valid(&self, token_id: &str) -> Result<bool> {
        let query = r#"
            SELECT COUNT(*) as count FROM user_tokens
            WHERE token_id = ?1 AND is_active = TRUE AND expires_at > ?2
        "#;

        let row = sqlx::query(query)
            .bind(token_id)
            .bind(Utc::now().to_rfc3339())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to check token: {}", e)))?;

        let count: i64 = row.get("count");
        Ok(count > 0)
    }

    /// Idempotent: revoking an unknown or already-revoked token is a no-op.
    pub async fn revoke_token(&self, token_id: &str) -> Result<()> {
        sqlx::query("UPDATE user_tokens SET is_active = FALSE WHERE token_id = ?1")
            .bind(token_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to revoke token: {}", e)))?;

        tracing::debug!(action = "token_revoked", token_id = %token_id);
        Ok(())
    }

    pub async fn cleanup_expired_tokens(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM user_tokens WHERE expires_at <= ?1")
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to clean up expired tokens: {}", e))
            })?;

        Ok(result.rows_affected())
    }

    // KYC form methods

    /// Create-or-replace the form for (user, category). Fields are replaced
    /// wholesale, status resets to pending, and the per-user rollup is
    /// recomputed before the transaction commits.
    pub async fn upsert_kyc_form(
        &self,
        user_id: &Uuid,
        category: KycCategory,
        fields_json: &str,
    ) -> Result<KycFormData> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let query = r#"
            INSERT INTO kyc_forms (id, user_id, category, fields, status, rejection_reason, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, 'pending', NULL, ?5, ?5)
            ON CONFLICT(user_id, category) DO UPDATE SET
                fields = excluded.fields,
                status = 'pending',
                rejection_reason = NULL,
                updated_at = excluded.updated_at
        "#;

        sqlx::query(query)
            .bind(Uuid::new_v4().to_string())
            .bind(user_id.to_string())
            .bind(category.as_str())
            .bind(fields_json)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to upsert KYC form: {}", e)))?;

        let row = sqlx::query("SELECT * FROM kyc_forms WHERE user_id = ?1 AND category = ?2")
            .bind(user_id.to_string())
            .bind(category.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to read back KYC form: {}", e)))?;
        let form = form_from_row(&row)?;

        recompute_verification_status(&mut tx, user_id).await?;
        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit KYC form: {}", e)))?;

        tracing::debug!(action = "kyc_form_saved", user_id = %user_id, category = %category);
        Ok(form)
    }

    pub async fn get_kyc_form(
        &self,
        user_id: &Uuid,
        category: KycCategory,
    ) -> Result<Option<KycFormData>> {
        let row = sqlx::query("SELECT * FROM kyc_forms WHERE user_id = ?1 AND category = ?2")
            .bind(user_id.to_string())
            .bind(category.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch KYC form: {}", e)))?;

        row.map(|row| form_from_row(&row)).transpose()
    }

    pub async fn get_kyc_forms(&self, user_id: &Uuid) -> Result<Vec<KycFormData>> {
        let rows = sqlx::query("SELECT * FROM kyc_forms WHERE user_id = ?1 ORDER BY category")
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch KYC forms: {}", e)))?;

        rows.iter().map(form_from_row).collect()
    }

    // KYC document methods

    /// Create-or-replace the document and its blob for (user, category) in a
    /// single transaction; the rollup is recomputed before commit. The row id
    /// is stable across re-uploads.
    pub async fn upsert_kyc_document(
        &self,
        user_id: &Uuid,
        category: KycCategory,
        file_type: &str,
        content: &[u8],
    ) -> Result<KycDocument> {
        let now = Utc::now().to_rfc3339();
        let file_size = content.len() as i64;
        let mut tx = self.pool.begin().await?;

        let query = r#"
            INSERT INTO kyc_documents (id, user_id, category, file_type, file_size, status, rejection_reason, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 'pending', NULL, ?6, ?6)
            ON CONFLICT(user_id, category) DO UPDATE SET
                file_type = excluded.file_type,
                file_size = excluded.file_size,
                status = 'pending',
                rejection_reason = NULL,
                updated_at = excluded.updated_at
        "#;

        sqlx::query(query)
            .bind(Uuid::new_v4().to_string())
            .bind(user_id.to_string())
            .bind(category.as_str())
            .bind(file_type)
            .bind(file_size)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to upsert KYC document: {}", e))
            })?;

        let row = sqlx::query("SELECT * FROM kyc_documents WHERE user_id = ?1 AND category = ?2")
            .bind(user_id.to_string())
            .bind(category.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to read back KYC document: {}", e))
            })?;
        let document = document_from_row(&row)?;

        let blob_query = r#"
            INSERT INTO kyc_document_blobs (document_id, content, content_type, size)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(document_id) DO UPDATE SET
                content = excluded.content,
                content_type = excluded.content_type,
                size = excluded.size
        "#;

        sqlx::query(blob_query)
            .bind(document.id.to_string())
            .bind(content)
            .bind(file_type)
            .bind(file_size)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to upsert document blob: {}", e)))?;

        recompute_verification_status(&mut tx, user_id).await?;
        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit KYC document: {}", e)))?;

        tracing::debug!(
            action = "kyc_document_saved",
            user_id = %user_id,
            category = %category,
            file_size = file_size
        );
        Ok(document)
    }

    pub async fn get_kyc_document(
        &self,
        user_id: &Uuid,
        category: KycCategory,
    ) -> Result<Option<KycDocument>> {
        let row = sqlx::query("SELECT * FROM kyc_documents WHERE user_id = ?1 AND category = ?2")
            .bind(user_id.to_string())
            .bind(category.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch KYC document: {}", e)))?;

        row.map(|row| document_from_row(&row)).transpose()
    }

    pub async fn get_kyc_documents(&self, user_id: &Uuid) -> Result<Vec<KycDocument>> {
        let rows = sqlx::query("SELECT * FROM kyc_documents WHERE user_id = ?1 ORDER BY category")
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch KYC documents: {}", e)))?;

        rows.iter().map(document_from_row).collect()
    }

    pub async fn get_kyc_document_by_id(&self, document_id: &Uuid) -> Result<Option<KycDocument>> {
        let row = sqlx::query("SELECT * FROM kyc_documents WHERE id = ?1")
            .bind(document_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to fetch KYC document by id: {}", e))
            })?;

        row.map(|row| document_from_row(&row)).transpose()
    }

    pub async fn get_kyc_document_blob(
        &self,
        document_id: &Uuid,
    ) -> Result<Option<KycDocumentBlob>> {
        let row = sqlx::query("SELECT * FROM kyc_document_blobs WHERE document_id = ?1")
            .bind(document_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch document blob: {}", e)))?;

        match row {
            Some(row) => Ok(Some(KycDocumentBlob {
                document_id: *document_id,
                content: row.get::<Vec<u8>, _>("content"),
                content_type: row.get("content_type"),
                size: row.get("size"),
            })),
            None => Ok(None),
        }
    }

    // Review methods

    /// Apply an admin verdict to the referenced document and/or form. Each id
    /// must belong to the given user and category. The rollup is recomputed in
    /// the same transaction and returned.
    pub async fn set_kyc_review_status(
        &self,
        user_id: &Uuid,
        category: KycCategory,
        document_id: Option<&Uuid>,
        form_id: Option<&Uuid>,
        status: ReviewStatus,
        rejection_reason: Option<&str>,
    ) -> Result<VerificationStatus> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        if let Some(document_id) = document_id {
            let result = sqlx::query(
                r#"
                UPDATE kyc_documents
                SET status = ?1, rejection_reason = ?2, updated_at = ?3
                WHERE id = ?4 AND user_id = ?5 AND category = ?6
                "#,
            )
            .bind(status.as_str())
            .bind(rejection_reason)
            .bind(&now)
            .bind(document_id.to_string())
            .bind(user_id.to_string())
            .bind(category.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to update document status: {}", e))
            })?;

            if result.rows_affected() == 0 {
                return Err(AppError::NotFoundError("Document not found".to_string()));
            }
        }

        if let Some(form_id) = form_id {
            let result = sqlx::query(
                r#"
                UPDATE kyc_forms
                SET status = ?1, rejection_reason = ?2, updated_at = ?3
                WHERE id = ?4 AND user_id = ?5 AND category = ?6
                "#,
            )
            .bind(status.as_str())
            .bind(rejection_reason)
            .bind(&now)
            .bind(form_id.to_string())
            .bind(user_id.to_string())
            .bind(category.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to update form status: {}", e)))?;

            if result.rows_affected() == 0 {
                return Err(AppError::NotFoundError("Form not found".to_string()));
            }
        }

        let verification = recompute_verification_status(&mut tx, user_id).await?;
        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit review: {}", e)))?;

        tracing::debug!(
            action = "kyc_review_applied",
            user_id = %user_id,
            category = %category,
            status = %status
        );
        Ok(verification)
    }

    /// Read the materialized rollup; users with no submissions yet read as all
    /// not_submitted.
    pub async fn get_verification_status(&self, user_id: &Uuid) -> Result<VerificationStatus> {
        let row = sqlx::query("SELECT * FROM kyc_verification_status WHERE user_id = ?1")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to fetch verification status: {}", e))
            })?;

        match row {
            Some(row) => verification_from_row(&row),
            None => Ok(VerificationStatus::compute(
                &HashMap::new(),
                &HashMap::new(),
            )),
        }
    }

    /// Page of users with their document and form records, keyset-ordered by
    /// user id. `after` is the last id of the previous page.
    pub async fn list_users_with_kyc(
        &self,
        limit: i64,
        after: Option<&str>,
    ) -> Result<Vec<(User, Vec<KycDocument>, Vec<KycFormData>)>> {
        let rows = match after {
            Some(after) => {
                sqlx::query("SELECT * FROM users WHERE id > ?1 ORDER BY id ASC LIMIT ?2")
                    .bind(after)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT * FROM users ORDER BY id ASC LIMIT ?1")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| AppError::DatabaseError(format!("Failed to list users: {}", e)))?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let user = user_from_row(row)?;
            let documents = self.get_kyc_documents(&user.id).await?;
            let forms = self.get_kyc_forms(&user.id).await?;
            results.push((user, documents, forms));
        }

        Ok(results)
    }

    // Deposit methods

    /// Record a completed deposit and credit the user's balance atomically.
    /// The transaction hash is the idempotency key: a repeat returns the
    /// already-stored row without touching the balance.
    pub async fn record_deposit(&self, deposit: &DepositTransaction) -> Result<DepositTransaction> {
        let mut tx = self.pool.begin().await?;

        let query = r#"
            INSERT INTO deposit_transactions (id, user_id, amount, currency, transaction_hash, payment_method, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(transaction_hash) DO NOTHING
        "#;

        let result = sqlx::query(query)
            .bind(deposit.id.to_string())
            .bind(deposit.user_id.to_string())
            .bind(deposit.amount)
            .bind(&deposit.currency)
            .bind(&deposit.transaction_hash)
            .bind(&deposit.payment_method)
            .bind(&deposit.status)
            .bind(deposit.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to record deposit: {}", e)))?;

        if result.rows_affected() > 0 {
            sqlx::query("UPDATE users SET balance = balance + ?1, updated_at = ?2 WHERE id = ?3")
                .bind(deposit.amount)
                .bind(Utc::now().to_rfc3339())
                .bind(deposit.user_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to credit balance: {}", e)))?;

            tx.commit()
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to commit deposit: {}", e)))?;

            tracing::debug!(
                action = "deposit_recorded",
                user_id = %deposit.user_id,
                amount = deposit.amount
            );
            return Ok(deposit.clone());
        }

        // Hash already known: surface the original record unchanged.
        drop(tx);
        let row = sqlx::query("SELECT * FROM deposit_transactions WHERE transaction_hash = ?1")
            .bind(&deposit.transaction_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to fetch existing deposit: {}", e))
            })?;

        deposit_from_row(&row)
    }

    pub async fn get_deposit_total(
        &self,
        user_id: &Uuid,
        payment_method: Option<&str>,
    ) -> Result<f64> {
        let row = match payment_method {
            Some(method) => {
                sqlx::query(
                    r#"
                    SELECT COALESCE(SUM(amount), 0.0) as total FROM deposit_transactions
                    WHERE user_id = ?1 AND payment_method = ?2 AND status = 'completed'
                    "#,
                )
                .bind(user_id.to_string())
                .bind(method)
                .fetch_one(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT COALESCE(SUM(amount), 0.0) as total FROM deposit_transactions
                    WHERE user_id = ?1 AND status = 'completed'
                    "#,
                )
                .bind(user_id.to_string())
                .fetch_one(&self.pool)
                .await
            }
        }
        .map_err(|e| AppError::DatabaseError(format!("Failed to sum deposits: {}", e)))?;

        Ok(row.get("total"))
    }
}

/// Recompute the per-user rollup from every form and document row visible to
/// the transaction and upsert the materialized record. Callers commit.
async fn recompute_verification_status(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &Uuid,
) -> Result<VerificationStatus> {
    let form_rows = sqlx::query("SELECT category, status FROM kyc_forms WHERE user_id = ?1")
        .bind(user_id.to_string())
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to read form statuses: {}", e)))?;

    let document_rows =
        sqlx::query("SELECT category, status FROM kyc_documents WHERE user_id = ?1")
            .bind(user_id.to_string())
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to read document statuses: {}", e))
            })?;

    let mut form_statuses = HashMap::new();
    for row in &form_rows {
        let category = KycCategory::from_str(&row.get::<String, _>("category"))
            .map_err(|e| AppError::DatabaseError(format!("Corrupt form category: {}", e)))?;
        let status = ReviewStatus::from_str(&row.get::<String, _>("status"))
            .map_err(|e| AppError::DatabaseError(format!("Corrupt form status: {}", e)))?;
        form_statuses.insert(category, status);
    }

    let mut document_statuses = HashMap::new();
    for row in &document_rows {
        let category = KycCategory::from_str(&row.get::<String, _>("category"))
            .map_err(|e| AppError::DatabaseError(format!("Corrupt document category: {}", e)))?;
        let status = ReviewStatus::from_str(&row.get::<String, _>("status"))
            .map_err(|e| AppError::DatabaseError(format!("Corrupt document status: {}", e)))?;
        document_statuses.insert(category, status);
    }

    let verification = VerificationStatus::compute(&form_statuses, &document_statuses);

    let query = r#"
        INSERT INTO kyc_verification_status (
            user_id,
            identification_form_status, identification_document_status,
            address_form_status, address_document_status,
            tax_form_status, tax_document_status,
            financial_form_status, financial_document_status,
            is_complete, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(user_id) DO UPDATE SET
            identification_form_status = excluded.identification_form_status,
            identification_document_status = excluded.identification_document_status,
            address_form_status = excluded.address_form_status,
            address_document_status = excluded.address_document_status,
            tax_form_status = excluded.tax_form_status,
            tax_document_status = excluded.tax_document_status,
            financial_form_status = excluded.financial_form_status,
            financial_document_status = excluded.financial_document_status,
            is_complete = excluded.is_complete,
            updated_at = excluded.updated_at
    "#;

    sqlx::query(query)
        .bind(user_id.to_string())
        .bind(verification.identification.form.as_str())
        .bind(verification.identification.document.as_str())
        .bind(verification.address.form.as_str())
        .bind(verification.address.document.as_str())
        .bind(verification.tax.form.as_str())
        .bind(verification.tax.document.as_str())
        .bind(verification.financial.form.as_str())
        .bind(verification.financial.document.as_str())
        .bind(verification.is_complete)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to write verification status: {}", e))
        })?;

    Ok(verification)
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: Uuid::parse_str(&row.get::<String, _>("id"))
            .map_err(|e| AppError::DatabaseError(format!("Invalid user ID: {}", e)))?,
        full_name: row.get("full_name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        email_verified: row.get("email_verified"),
        verify_token: row.get("verify_token"),
        is_admin: row.get("is_admin"),
        balance: row.get("balance"),
        created_at: parse_timestamp(row, "created_at")?,
        updated_at: parse_timestamp(row, "updated_at")?,
    })
}

fn document_from_row(row: &SqliteRow) -> Result<KycDocument> {
    Ok(KycDocument {
        id: Uuid::parse_str(&row.get::<String, _>("id"))
            .map_err(|e| AppError::DatabaseError(format!("Invalid document ID: {}", e)))?,
        user_id: Uuid::parse_str(&row.get::<String, _>("user_id"))
            .map_err(|e| AppError::DatabaseError(format!("Invalid user ID: {}", e)))?,
        category: KycCategory::from_str(&row.get::<String, _>("category"))
            .map_err(|e| AppError::DatabaseError(format!("Corrupt document category: {}", e)))?,
        file_type: row.get("file_type"),
        file_size: row.get("file_size"),
        status: ReviewStatus::from_str(&row.get::<String, _>("status"))
            .map_err(|e| AppError::DatabaseError(format!("Corrupt document status: {}", e)))?,
        rejection_reason: row.get("rejection_reason"),
        created_at: parse_timestamp(row, "created_at")?,
        updated_at: parse_timestamp(row, "updated_at")?,
    })
}

fn form_from_row(row: &SqliteRow) -> Result<KycFormData> {
    let fields: serde_json::Value = serde_json::from_str(&row.get::<String, _>("fields"))
        .map_err(|e| AppError::DatabaseError(format!("Corrupt form fields: {}", e)))?;

    Ok(KycFormData {
        id: Uuid::parse_str(&row.get::<String, _>("id"))
            .map_err(|e| AppError::DatabaseError(format!("Invalid form ID: {}", e)))?,
        user_id: Uuid::parse_str(&row.get::<String, _>("user_id"))
            .map_err(|e| AppError::DatabaseError(format!("Invalid user ID: {}", e)))?,
        category: KycCategory::from_str(&row.get::<String, _>("category"))
            .map_err(|e| AppError::DatabaseError(format!("Corrupt form category: {}", e)))?,
        fields,
        status: ReviewStatus::from_str(&row.get::<String, _>("status"))
            .map_err(|e| AppError::DatabaseError(format!("Corrupt form status: {}", e)))?,
        rejection_reason: row.get("rejection_reason"),
        created_at: parse_timestamp(row, "created_at")?,
        updated_at: parse_timestamp(row, "updated_at")?,
    })
}

fn deposit_from_row(row: &SqliteRow) -> Result<DepositTransaction> {
    Ok(DepositTransaction {
        id: Uuid::parse_str(&row.get::<String, _>("id"))
            .map_err(|e| AppError::DatabaseError(format!("Invalid deposit ID: {}", e)))?,
        user_id: Uuid::parse_str(&row.get::<String, _>("user_id"))
            .map_err(|e| AppError::DatabaseError(format!("Invalid user ID: {}", e)))?,
        amount: row.get("amount"),
        currency: row.get("currency"),
        transaction_hash: row.get("transaction_hash"),
        payment_method: row.get("payment_method"),
        status: row.get("status"),
        created_at: parse_timestamp(row, "created_at")?,
    })
}

fn verification_from_row(row: &SqliteRow) -> Result<VerificationStatus> {
    let status = |column: &str| -> Result<ReviewStatus> {
        ReviewStatus::from_str(&row.get::<String, _>(column))
            .map_err(|e| AppError::DatabaseError(format!("Corrupt status in {}: {}", column, e)))
    };

    let mut form_statuses = HashMap::new();
    let mut document_statuses = HashMap::new();
    form_statuses.insert(
        KycCategory::Identification,
        status("identification_form_status")?,
    );
    document_statuses.insert(
        KycCategory::Identification,
        status("identification_document_status")?,
    );
    form_statuses.insert(KycCategory::Address, status("address_form_status")?);
    document_statuses.insert(KycCategory::Address, status("address_document_status")?);
    form_statuses.insert(KycCategory::Tax, status("tax_form_status")?);
    document_statuses.insert(KycCategory::Tax, status("tax_document_status")?);
    form_statuses.insert(KycCategory::Financial, status("financial_form_status")?);
    document_statuses.insert(KycCategory::Financial, status("financial_document_status")?);

    Ok(VerificationStatus::compute(
        &form_statuses,
        &document_statuses,
    ))
}

fn parse_timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&row.get::<String, _>(column))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::DatabaseError(format!("Invalid {} date: {}", column, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> SqliteDatabase {
        SqliteDatabase::connect("sqlite::memory:")
            .await
            .expect("in-memory database")
    }

    fn test_user(email: &str) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            full_name: "Test User".to_string(),
            email: email.to_string(),
            password_hash: "$argon2id$fake".to_string(),
            email_verified: false,
            verify_token: Some("token123".to_string()),
            is_admin: false,
            balance: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_validation_error() {
        let db = test_db().await;
        let user = test_user("dup@example.com");
        db.create_user(&user).await.unwrap();

        let second = test_user("dup@example.com");
        let err = db.create_user(&second).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn form_upsert_keeps_one_row_and_resets_status() {
        let db = test_db().await;
        let user = test_user("form@example.com");
        db.create_user(&user).await.unwrap();

        let first = db
            .upsert_kyc_form(&user.id, KycCategory::Address, r#"{"city":"Springfield"}"#)
            .await
            .unwrap();
        assert_eq!(first.status, ReviewStatus::Pending);

        // Approve, then resubmit: same row id, status back to pending.
        db.set_kyc_review_status(
            &user.id,
            KycCategory::Address,
            None,
            Some(&first.id),
            ReviewStatus::Approved,
            None,
        )
        .await
        .unwrap();

        let second = db
            .upsert_kyc_form(&user.id, KycCategory::Address, r#"{"city":"Shelbyville"}"#)
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.status, ReviewStatus::Pending);
        assert_eq!(second.fields["city"], "Shelbyville");

        let all = db.get_kyc_forms(&user.id).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn document_upsert_replaces_blob_in_place() {
        let db = test_db().await;
        let user = test_user("doc@example.com");
        db.create_user(&user).await.unwrap();

        let first = db
            .upsert_kyc_document(&user.id, KycCategory::Tax, "image/png", b"old-bytes")
            .await
            .unwrap();
        let second = db
            .upsert_kyc_document(&user.id, KycCategory::Tax, "application/pdf", b"new-bytes")
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.file_type, "application/pdf");

        let blob = db
            .get_kyc_document_blob(&first.id)
            .await
            .unwrap()
            .expect("blob present");
        assert_eq!(blob.content, b"new-bytes");
        assert_eq!(blob.content_type, "application/pdf");
        assert_eq!(blob.size, 9);
    }

    #[tokio::test]
    async fn review_updates_roll_into_the_aggregate() {
        let db = test_db().await;
        let user = test_user("agg@example.com");
        db.create_user(&user).await.unwrap();

        let mut form_ids = HashMap::new();
        let mut document_ids = HashMap::new();
        for category in KycCategory::ALL {
            let form = db
                .upsert_kyc_form(&user.id, category, "{}")
                .await
                .unwrap();
            let document = db
                .upsert_kyc_document(&user.id, category, "image/png", b"img")
                .await
                .unwrap();
            form_ids.insert(category, form.id);
            document_ids.insert(category, document.id);
        }

        let status = db.get_verification_status(&user.id).await.unwrap();
        assert!(!status.is_complete);
        assert_eq!(status.identification.form, ReviewStatus::Pending);

        for category in KycCategory::ALL {
            db.set_kyc_review_status(
                &user.id,
                category,
                Some(&document_ids[&category]),
                Some(&form_ids[&category]),
                ReviewStatus::Approved,
                None,
            )
            .await
            .unwrap();
        }

        let status = db.get_verification_status(&user.id).await.unwrap();
        assert!(status.is_complete);

        // A single rejection flips the rollup back off.
        db.set_kyc_review_status(
            &user.id,
            KycCategory::Financial,
            Some(&document_ids[&KycCategory::Financial]),
            None,
            ReviewStatus::Rejected,
            Some("blurry scan"),
        )
        .await
        .unwrap();

        let status = db.get_verification_status(&user.id).await.unwrap();
        assert!(!status.is_complete);
        assert_eq!(status.financial.document, ReviewStatus::Rejected);
        assert_eq!(status.financial.form, ReviewStatus::Approved);
    }

    #[tokio::test]
    async fn review_of_unknown_ids_is_not_found() {
        let db = test_db().await;
        let user = test_user("missing@example.com");
        db.create_user(&user).await.unwrap();

        let err = db
            .set_kyc_review_status(
                &user.id,
                KycCategory::Tax,
                Some(&Uuid::new_v4()),
                None,
                ReviewStatus::Approved,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFoundError(_)));
    }

    #[tokio::test]
    async fn deposits_are_idempotent_on_transaction_hash() {
        let db = test_db().await;
        let user = test_user("deposit@example.com");
        db.create_user(&user).await.unwrap();

        let deposit = DepositTransaction {
            id: Uuid::new_v4(),
            user_id: user.id,
            amount: 250.0,
            currency: "USD".to_string(),
            transaction_hash: "0xabc123".to_string(),
            payment_method: "crypto".to_string(),
            status: "completed".to_string(),
            created_at: Utc::now(),
        };

        let first = db.record_deposit(&deposit).await.unwrap();
        assert_eq!(first.id, deposit.id);
        assert_eq!(db.get_user_balance(&user.id).await.unwrap(), 250.0);

        let replay = DepositTransaction {
            id: Uuid::new_v4(),
            ..deposit.clone()
        };
        let second = db.record_deposit(&replay).await.unwrap();
        assert_eq!(second.id, deposit.id);
        assert_eq!(db.get_user_balance(&user.id).await.unwrap(), 250.0);

        let total = db.get_deposit_total(&user.id, None).await.unwrap();
        assert_eq!(total, 250.0);
        let by_method = db
            .get_deposit_total(&user.id, Some("crypto"))
            .await
            .unwrap();
        assert_eq!(by_method, 250.0);
        let other_method = db.get_deposit_total(&user.id, Some("card")).await.unwrap();
        assert_eq!(other_method, 0.0);
    }

    #[tokio::test]
    async fn user_listing_pages_by_id() {
        let db = test_db().await;
        for i in 0..5 {
            db.create_user(&test_user(&format!("user{}@example.com", i)))
                .await
                .unwrap();
        }

        let first_page = db.list_users_with_kyc(2, None).await.unwrap();
        assert_eq!(first_page.len(), 2);
        let cursor = first_page[1].0.id.to_string();

        let second_page = db.list_users_with_kyc(2, Some(&cursor)).await.unwrap();
        assert_eq!(second_page.len(), 2);
        assert!(second_page[0].0.id.to_string() > cursor);

        let mut seen: Vec<String> = first_page
            .iter()
            .chain(second_page.iter())
            .map(|(u, _, _)| u.id.to_string())
            .collect();
        seen.dedup();
        assert_eq!(seen.len(), 4);
    }

    #[tokio::test]
    async fn verify_token_flow_marks_user_verified() {
        let db = test_db().await;
        let user = test_user("verify@example.com");
        db.create_user(&user).await.unwrap();

        let found = db
            .get_user_by_verify_token("token123")
            .await
            .unwrap()
            .expect("user by token");
        assert_eq!(found.id, user.id);

        db.verify_user_email(&user.id).await.unwrap();
        let reloaded = db.get_user_by_id(&user.id).await.unwrap().unwrap();
        assert!(reloaded.email_verified);
        assert!(reloaded.verify_token.is_none());
        assert!(db.get_user_by_verify_token("token123").await.unwrap().is_none());
    }
}
