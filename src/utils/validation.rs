use crate::errors::{AppError, Result};
use regex::Regex;

/// Hard ceiling for KYC document uploads.
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

const ALLOWED_UPLOAD_TYPES: [&str; 4] =
    ["image/jpeg", "image/png", "image/webp", "application/pdf"];

pub struct Validator;

impl Validator {
    pub fn validate_email(email: &str) -> Result<()> {
        let email_regex = Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .map_err(|e| AppError::InternalError(format!("Regex error: {}", e)))?;

        if !email_regex.is_match(email) {
            return Err(AppError::ValidationError("Invalid email format".to_string()));
        }

        if email.len() > 254 {
            return Err(AppError::ValidationError("Email too long".to_string()));
        }

        Ok(())
    }

    pub fn validate_full_name(name: &str) -> Result<()> {
        let name = name.trim();
        if name.len() < 2 {
            return Err(AppError::ValidationError(
                "Full name must be at least 2 characters long".to_string(),
            ));
        }

        if name.len() > 100 {
            return Err(AppError::ValidationError(
                "Full name must be less than 100 characters".to_string(),
            ));
        }

        let name_regex = Regex::new(r"^[a-zA-ZÀ-ÿ' .-]+$")
            .map_err(|e| AppError::InternalError(format!("Regex error: {}", e)))?;

        if !name_regex.is_match(name) {
            return Err(AppError::ValidationError(
                "Full name can only contain letters, spaces, apostrophes, periods, and hyphens"
                    .to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_password(password: &str) -> Result<()> {
        if password.len() < 8 {
            return Err(AppError::ValidationError(
                "Password must be at least 8 characters long".to_string(),
            ));
        }

        if password.len() > 128 {
            return Err(AppError::ValidationError(
                "Password must be less than 128 characters".to_string(),
            ));
        }

        let has_uppercase = password.chars().any(|c| c.is_uppercase());
        let has_lowercase = password.chars().any(|c| c.is_lowercase());
        let has_digit = password.chars().any(|c| c.is_numeric());
        let has_special = password
            .chars()
            .any(|c| "!@#$%^&*()_+-=[]{}|;:,.<>?".contains(c));

        if !has_uppercase {
            return Err(AppError::ValidationError(
                "Password must contain at least one uppercase letter".to_string(),
            ));
        }

        if !has_lowercase {
            return Err(AppError::ValidationError(
                "Password must contain at least one lowercase letter".to_string(),
            ));
        }

        if !has_digit {
            return Err(AppError::ValidationError(
                "Password must contain at least one digit".to_string(),
            ));
        }

        if !has_special {
            return Err(AppError::ValidationError(
                "Password must contain at least one special character".to_string(),
            ));
        }

        Ok(())
    }

    /// Server-side gate for document uploads: images and PDF only, capped size.
    pub fn validate_upload(content_type: &str, size: usize) -> Result<()> {
        if !ALLOWED_UPLOAD_TYPES.contains(&content_type) {
            return Err(AppError::ValidationError(format!(
                "Unsupported file type: {}. Allowed types are JPEG, PNG, WebP, and PDF",
                content_type
            )));
        }

        if size == 0 {
            return Err(AppError::ValidationError("File is empty".to_string()));
        }

        if size > MAX_UPLOAD_SIZE {
            return Err(AppError::ValidationError(format!(
                "File too large: {} bytes exceeds the {} byte limit",
                size, MAX_UPLOAD_SIZE
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_reasonable_emails() {
        assert!(Validator::validate_email("jane.doe@example.com").is_ok());
        assert!(Validator::validate_email("not-an-email").is_err());
        assert!(Validator::validate_email("@example.com").is_err());
    }

    #[test]
    fn full_name_rules() {
        assert!(Validator::validate_full_name("Jane Doe").is_ok());
        assert!(Validator::validate_full_name("O'Brien-Smith Jr.").is_ok());
        assert!(Validator::validate_full_name("J").is_err());
        assert!(Validator::validate_full_name("Jane<script>").is_err());
    }

    #[test]
    fn password_complexity_is_enforced() {
        assert!(Validator::validate_password("Correct1!horse").is_ok());
        assert!(Validator::validate_password("short1!").is_err());
        assert!(Validator::validate_password("alllowercase1!").is_err());
        assert!(Validator::validate_password("ALLUPPERCASE1!").is_err());
        assert!(Validator::validate_password("NoDigits!!").is_err());
        assert!(Validator::validate_password("NoSpecial11").is_err());
    }

    #[test]
    fn upload_gate_checks_type_and_size() {
        assert!(Validator::validate_upload("image/png", 1024).is_ok());
        assert!(Validator::validate_upload("application/pdf", 2 * 1024 * 1024).is_ok());
        assert!(Validator::validate_upload("text/html", 1024).is_err());
        assert!(Validator::validate_upload("image/png", 0).is_err());
        assert!(Validator::validate_upload("image/png", MAX_UPLOAD_SIZE + 1).is_err());
    }
}
