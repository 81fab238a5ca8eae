/// Generate comprehensive Markdown documentation from OpenAPI spec
pub fn generate_markdown_docs() -> String {
    let mut markdown = String::new();

    // Header
    markdown.push_str("# TokenizeHub API Documentation\n\n");
    markdown.push_str("## Overview\n\n");
    markdown.push_str("TokenizeHub is a fractional real-estate investment backend. This API covers account registration, email verification, JWT sessions, the four-part KYC submission flow (forms plus supporting documents), the compliance review queue, and deposit recording.\n\n");

    // Table of Contents
    markdown.push_str("## Table of Contents\n\n");
    markdown.push_str("- [Authentication](#authentication)\n");
    markdown.push_str("- [KYC Submissions](#kyc-submissions)\n");
    markdown.push_str("- [Compliance Review](#compliance-review)\n");
    markdown.push_str("- [Transactions](#transactions)\n");
    markdown.push_str("- [Error Codes](#error-codes)\n");
    markdown.push_str("- [Examples](#examples)\n\n");

    // Authentication Section
    markdown.push_str("## Authentication\n\n");
    markdown.push_str("Most endpoints require JWT authentication. Include your JWT token in the Authorization header:\n\n");
    markdown.push_str("```http\nAuthorization: Bearer <your-jwt-token>\n```\n\n");
    markdown.push_str("Tokens are issued at login, expire after 24 hours, and are revoked by logout. Each login replaces the previous session.\n\n");

    // Base URL
    markdown.push_str("## Base URL\n\n");
    markdown.push_str("```\nhttp://localhost:8080/api\n```\n\n");

    // Authentication endpoints
    markdown.push_str("## Authentication Endpoints\n\n");

    markdown.push_str("### POST /api/auth/register\n\n");
    markdown.push_str("**Description:** Register a new investor account\n\n");
    markdown.push_str("**Request Body:**\n```json\n{\n  \"full_name\": \"Jane Investor\",\n  \"email\": \"user@example.com\",\n  \"password\": \"SecurePassword123!\"\n}\n```\n\n");
    markdown.push_str("**Response:**\n```json\n{\n  \"user_id\": \"uuid\",\n  \"message\": \"Registration successful. Check your email for a verification token.\"\n}\n```\n\n");

    markdown.push_str("### POST /api/auth/verify-email\n\n");
    markdown.push_str("**Description:** Consume the emailed verification token\n\n");
    markdown.push_str("**Request Body:**\n```json\n{\n  \"token\": \"64-character hex token\"\n}\n```\n\n");

    markdown.push_str("### POST /api/auth/login\n\n");
    markdown.push_str("**Description:** Authenticate and get a JWT token\n\n");
    markdown.push_str("**Request Body:**\n```json\n{\n  \"email\": \"user@example.com\",\n  \"password\": \"SecurePassword123!\"\n}\n```\n\n");
    markdown.push_str("**Response:**\n```json\n{\n  \"token\": \"jwt-token\",\n  \"expires_at\": \"2024-01-02T00:00:00Z\",\n  \"user\": { \"id\": \"uuid\", \"email\": \"user@example.com\" }\n}\n```\n\n");

    markdown.push_str("### GET /api/auth/validate\n\n");
    markdown.push_str("**Description:** Introspect the bearer token\n\n");
    markdown.push_str("**Response:**\n```json\n{\n  \"valid\": true,\n  \"user_id\": \"uuid\",\n  \"email\": \"user@example.com\",\n  \"is_admin\": false\n}\n```\n\n");

    markdown.push_str("### POST /api/auth/refresh\n\n");
    markdown.push_str("**Description:** Rotate the bearer token, revoking the old one\n\n");

    markdown.push_str("### POST /api/auth/logout\n\n");
    markdown.push_str("**Description:** Revoke the current session\n\n");

    markdown.push_str("### GET /api/profile\n\n");
    markdown.push_str("**Description:** Get the authenticated user's profile\n\n");
    markdown.push_str("**Response:**\n```json\n{\n  \"id\": \"uuid\",\n  \"full_name\": \"Jane Investor\",\n  \"email\": \"user@example.com\",\n  \"email_verified\": true,\n  \"is_admin\": false,\n  \"balance\": 0.0,\n  \"created_at\": \"2024-01-01T00:00:00Z\"\n}\n```\n\n");

    // KYC endpoints
    markdown.push_str("## KYC Submissions\n\n");
    markdown.push_str("Verification covers four categories: `identification`, `address`, `tax` and `financial`. Each category takes one structured form and one supporting document. Resubmitting either replaces the previous record and resets that slot to `pending`.\n\n");

    markdown.push_str("### POST /api/kyc/forms\n\n");
    markdown.push_str("**Description:** Submit or replace the form for one category\n\n");
    markdown.push_str("**Request Body:**\n```json\n{\n  \"category\": \"identification\",\n  \"fields\": {\n    \"fullName\": \"Jane Investor\",\n    \"dateOfBirth\": \"1990-01-15\",\n    \"nationality\": \"US\",\n    \"idType\": \"passport\",\n    \"idNumber\": \"X1234567\",\n    \"expiryDate\": \"2030-01-15\"\n  }\n}\n```\n\n");

    markdown.push_str("### GET /api/kyc/forms\n\n");
    markdown.push_str("**Description:** Fetch submitted forms. Pass `?category=` for a single record (404 when absent); omit it for all submitted records.\n\n");

    markdown.push_str("### POST /api/kyc/documents\n\n");
    markdown.push_str("**Description:** Upload a supporting document as `multipart/form-data` with a `category` part and a `file` part. JPEG, PNG, WebP and PDF up to 10 MiB are accepted.\n\n");
    markdown.push_str("**Response:**\n```json\n{\n  \"document_id\": \"uuid\",\n  \"status\": \"pending\"\n}\n```\n\n");

    markdown.push_str("### GET /api/kyc/documents\n\n");
    markdown.push_str("**Description:** Fetch uploaded document metadata, with the same optional `category` filter as forms.\n\n");

    markdown.push_str("### GET /api/kyc/documents/{id}/blob\n\n");
    markdown.push_str("**Description:** Download your own document bytes with the stored content type.\n\n");

    markdown.push_str("### GET /api/kyc/status\n\n");
    markdown.push_str("**Description:** Per-category rollup of form and document review states\n\n");
    markdown.push_str("**Response:**\n```json\n{\n  \"identification\": { \"form\": \"approved\", \"document\": \"pending\" },\n  \"address\": { \"form\": \"not_submitted\", \"document\": \"not_submitted\" },\n  \"tax\": { \"form\": \"not_submitted\", \"document\": \"not_submitted\" },\n  \"financial\": { \"form\": \"not_submitted\", \"document\": \"not_submitted\" },\n  \"is_complete\": false\n}\n```\n\n");

    // Admin endpoints
    markdown.push_str("## Compliance Review\n\n");
    markdown.push_str("Admin accounts only. Non-admin tokens receive 403.\n\n");

    markdown.push_str("### GET /api/admin/kyc/users\n\n");
    markdown.push_str("**Description:** Page through users with their KYC records. `limit` caps at 200; pass the returned `next_cursor` as `after` for the next page.\n\n");

    markdown.push_str("### POST /api/admin/kyc/status\n\n");
    markdown.push_str("**Description:** Record an approve/reject verdict for one category. Supply `document_id`, `form_id` or both; a `rejection_reason` is stored only with rejections.\n\n");
    markdown.push_str("**Request Body:**\n```json\n{\n  \"user_id\": \"uuid\",\n  \"category\": \"identification\",\n  \"document_id\": \"uuid\",\n  \"form_id\": \"uuid\",\n  \"status\": \"approved\",\n  \"rejection_reason\": null\n}\n```\n\n");

    markdown.push_str("### GET /api/admin/kyc/documents/{id}/blob\n\n");
    markdown.push_str("**Description:** Download any user's document bytes for review.\n\n");

    // Transactions
    markdown.push_str("## Transactions\n\n");

    markdown.push_str("### POST /api/transactions/deposit\n\n");
    markdown.push_str("**Description:** Record a completed deposit. Replays of the same `transaction_hash` return the original record without crediting again.\n\n");
    markdown.push_str("**Request Body:**\n```json\n{\n  \"amount\": 1000.0,\n  \"currency\": \"USD\",\n  \"transaction_hash\": \"0xabc123\",\n  \"payment_method\": \"bank_transfer\"\n}\n```\n\n");

    markdown.push_str("### GET /api/transactions/total\n\n");
    markdown.push_str("**Description:** Sum of the caller's completed deposits, optionally filtered by `payment_method`.\n\n");

    markdown.push_str("### GET /api/user/balance\n\n");
    markdown.push_str("**Description:** Current account balance\n\n");

    // Error codes
    markdown.push_str("## Error Codes\n\n");
    markdown.push_str("| Code | Description |\n");
    markdown.push_str("|------|-------------|\n");
    markdown.push_str("| 200 | Success |\n");
    markdown.push_str("| 201 | Created |\n");
    markdown.push_str("| 400 | Bad Request - Invalid input data |\n");
    markdown.push_str("| 401 | Unauthorized - Invalid or missing JWT token |\n");
    markdown.push_str("| 403 | Forbidden - Admin access required |\n");
    markdown.push_str("| 404 | Not Found - Resource not found |\n");
    markdown.push_str("| 422 | Unprocessable Entity - Body does not match the declared schema |\n");
    markdown.push_str("| 429 | Too Many Requests - Rate limit exceeded |\n");
    markdown.push_str("| 500 | Internal Server Error |\n\n");

    // Examples
    markdown.push_str("## Examples\n\n");
    markdown.push_str("### Register a new user\n\n");
    markdown.push_str("```bash\ncurl -X POST http://localhost:8080/api/auth/register \\\n");
    markdown.push_str("  -H \"Content-Type: application/json\" \\\n");
    markdown.push_str("  -d '{\n");
    markdown.push_str("    \"full_name\": \"Jane Investor\",\n");
    markdown.push_str("    \"email\": \"user@example.com\",\n");
    markdown.push_str("    \"password\": \"SecurePassword123!\"\n");
    markdown.push_str("  }'\n```\n\n");

    markdown.push_str("### Submit an identification form\n\n");
    markdown.push_str("```bash\ncurl -X POST http://localhost:8080/api/kyc/forms \\\n");
    markdown.push_str("  -H \"Authorization: Bearer <your-jwt-token>\" \\\n");
    markdown.push_str("  -H \"Content-Type: application/json\" \\\n");
    markdown.push_str("  -d '{\n");
    markdown.push_str("    \"category\": \"identification\",\n");
    markdown.push_str("    \"fields\": {\n");
    markdown.push_str("      \"fullName\": \"Jane Investor\",\n");
    markdown.push_str("      \"dateOfBirth\": \"1990-01-15\",\n");
    markdown.push_str("      \"nationality\": \"US\",\n");
    markdown.push_str("      \"idType\": \"passport\",\n");
    markdown.push_str("      \"idNumber\": \"X1234567\",\n");
    markdown.push_str("      \"expiryDate\": \"2030-01-15\"\n");
    markdown.push_str("    }\n");
    markdown.push_str("  }'\n```\n\n");

    markdown.push_str("### Upload a supporting document\n\n");
    markdown.push_str("```bash\ncurl -X POST http://localhost:8080/api/kyc/documents \\\n");
    markdown.push_str("  -H \"Authorization: Bearer <your-jwt-token>\" \\\n");
    markdown.push_str("  -F \"category=identification\" \\\n");
    markdown.push_str("  -F \"file=@passport.pdf;type=application/pdf\"\n```\n\n");

    markdown.push_str("### Approve a submission (admin)\n\n");
    markdown.push_str("```bash\ncurl -X POST http://localhost:8080/api/admin/kyc/status \\\n");
    markdown.push_str("  -H \"Authorization: Bearer <admin-jwt-token>\" \\\n");
    markdown.push_str("  -H \"Content-Type: application/json\" \\\n");
    markdown.push_str("  -d '{\n");
    markdown.push_str("    \"user_id\": \"<user-uuid>\",\n");
    markdown.push_str("    \"category\": \"identification\",\n");
    markdown.push_str("    \"document_id\": \"<document-uuid>\",\n");
    markdown.push_str("    \"status\": \"approved\"\n");
    markdown.push_str("  }'\n```\n\n");

    markdown.push_str("## Support\n\n");
    markdown.push_str("For technical support or questions about the API, please contact the development team.\n\n");
    markdown.push_str("---\n\n");
    markdown.push_str("*This documentation is auto-generated from the OpenAPI specification and will stay in sync with the codebase.*\n");

    markdown
}

/// Generate comprehensive HTML documentation page
pub fn generate_documentation_html() -> String {
    let html = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>TokenizeHub API Documentation</title>
    <style>
        * {
            margin: 0;
            padding: 0;
            box-sizing: border-box;
        }

        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, Cantarell, sans-serif;
            line-height: 1.6;
            color: #333;
            background-color: #f8f9fa;
        }

        .container {
            max-width: 1200px;
            margin: 0 auto;
            padding: 20px;
        }

        .header {
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            color: white;
            padding: 40px 0;
            text-align: center;
            margin-bottom: 30px;
            border-radius: 10px;
        }

        .header h1 {
            font-size: 2.5rem;
            margin-bottom: 10px;
        }

        .header p {
            font-size: 1.2rem;
            opacity: 0.9;
        }

        .nav {
            background: white;
            padding: 20px;
            border-radius: 10px;
            margin-bottom: 30px;
            box-shadow: 0 2px 10px rgba(0,0,0,0.1);
        }

        .nav h2 {
            margin-bottom: 15px;
            color: #333;
        }

        .nav-links {
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(250px, 1fr));
            gap: 15px;
        }

        .nav-link {
            display: block;
            padding: 15px;
            background: #f8f9fa;
            border: 2px solid #e9ecef;
            border-radius: 8px;
            text-decoration: none;
            color: #495057;
            transition: all 0.3s ease;
        }

        .nav-link:hover {
            border-color: #667eea;
            background: #f0f2ff;
            transform: translateY(-2px);
        }

        .nav-link h3 {
            margin-bottom: 5px;
            color: #333;
        }

        .nav-link p {
            font-size: 0.9rem;
            color: #6c757d;
        }

        .footer {
            text-align: center;
            padding: 20px;
            color: #6c757d;
        }
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>TokenizeHub API</h1>
            <p>Fractional real-estate investment backend with KYC verification</p>
        </div>

        <div class="nav">
            <h2>Documentation</h2>
            <div class="nav-links">
                <a href="/api/docs" class="nav-link">
                    <h3>Swagger UI</h3>
                    <p>Interactive API explorer. Authorize with a bearer token and try requests live.</p>
                </a>
                <a href="/api/redoc" class="nav-link">
                    <h3>Redoc</h3>
                    <p>Readable reference rendering of the OpenAPI specification.</p>
                </a>
                <a href="/docs/openapi.json" class="nav-link">
                    <h3>OpenAPI JSON</h3>
                    <p>Raw specification for client generators and tooling.</p>
                </a>
                <a href="/docs/markdown" class="nav-link">
                    <h3>Markdown</h3>
                    <p>Downloadable documentation with request and response examples.</p>
                </a>
            </div>
        </div>

        <div class="footer">
            <p>TokenizeHub &mdash; auto-generated documentation, kept in sync with the codebase.</p>
        </div>
    </div>
</body>
</html>
    "#;

    html.to_string()
}
