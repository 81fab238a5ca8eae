use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// The four verification sections every user works through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum KycCategory {
    Identification,
    Address,
    Tax,
    Financial,
}

impl KycCategory {
    pub const ALL: [KycCategory; 4] = [
        KycCategory::Identification,
        KycCategory::Address,
        KycCategory::Tax,
        KycCategory::Financial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KycCategory::Identification => "identification",
            KycCategory::Address => "address",
            KycCategory::Tax => "tax",
            KycCategory::Financial => "financial",
        }
    }
}

impl fmt::Display for KycCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KycCategory {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identification" => Ok(KycCategory::Identification),
            "address" => Ok(KycCategory::Address),
            "tax" => Ok(KycCategory::Tax),
            "financial" => Ok(KycCategory::Financial),
            other => Err(AppError::ValidationError(format!(
                "Invalid KYC category: {}",
                other
            ))),
        }
    }
}

/// Review state of one form or document. `NotSubmitted` is derived from the
/// absence of a record and is never written to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    NotSubmitted,
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::NotSubmitted => "not_submitted",
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }

    /// Only these two are legal verdicts for an admin review action.
    pub fn is_verdict(&self) -> bool {
        matches!(self, ReviewStatus::Approved | ReviewStatus::Rejected)
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_submitted" => Ok(ReviewStatus::NotSubmitted),
            "pending" => Ok(ReviewStatus::Pending),
            "approved" => Ok(ReviewStatus::Approved),
            "rejected" => Ok(ReviewStatus::Rejected),
            other => Err(AppError::ValidationError(format!(
                "Invalid review status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IdentificationFields {
    pub full_name: String,
    pub date_of_birth: String,
    pub nationality: String,
    pub id_type: String,
    pub id_number: String,
    pub expiry_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddressFields {
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub residence_since: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaxFields {
    pub tax_id_number: String,
    pub tax_residency: String,
    pub tax_status: String,
    pub is_foreign_tax_payer: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_tax_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinancialFields {
    pub employment_status: String,
    pub occupation: String,
    pub annual_income: String,
    pub source_of_funds: String,
    pub purpose_of_account: String,
}

/// A form submission: the category tag selects which field schema the payload
/// must satisfy, so a malformed section is rejected at deserialization time.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "category", content = "fields", rename_all = "lowercase")]
pub enum KycFormFields {
    Identification(IdentificationFields),
    Address(AddressFields),
    Tax(TaxFields),
    Financial(FinancialFields),
}

impl KycFormFields {
    pub fn category(&self) -> KycCategory {
        match self {
            KycFormFields::Identification(_) => KycCategory::Identification,
            KycFormFields::Address(_) => KycCategory::Address,
            KycFormFields::Tax(_) => KycCategory::Tax,
            KycFormFields::Financial(_) => KycCategory::Financial,
        }
    }

    /// JSON text of the bare field object, as persisted.
    pub fn to_json(&self) -> crate::errors::Result<String> {
        let value = match self {
            KycFormFields::Identification(f) => serde_json::to_string(f),
            KycFormFields::Address(f) => serde_json::to_string(f),
            KycFormFields::Tax(f) => serde_json::to_string(f),
            KycFormFields::Financial(f) => serde_json::to_string(f),
        };
        value.map_err(AppError::from)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct KycDocument {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category: KycCategory,
    pub file_type: String,
    pub file_size: i64,
    pub status: ReviewStatus,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Binary payload, one per document. Never serialized into API bodies; the
/// blob endpoints write the raw bytes straight into the response.
#[derive(Debug, Clone)]
pub struct KycDocumentBlob {
    pub document_id: Uuid,
    pub content: Vec<u8>,
    pub content_type: String,
    pub size: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct KycFormData {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category: KycCategory,
    #[schema(value_type = Object)]
    pub fields: serde_json::Value,
    pub status: ReviewStatus,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct CategoryStatus {
    pub form: ReviewStatus,
    pub document: ReviewStatus,
}

impl CategoryStatus {
    fn approved(&self) -> bool {
        self.form == ReviewStatus::Approved && self.document == ReviewStatus::Approved
    }
}

/// Per-user rollup of all eight review slots. Recomputed inside the same
/// transaction as any status write, so a committed read is never stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct VerificationStatus {
    pub identification: CategoryStatus,
    pub address: CategoryStatus,
    pub tax: CategoryStatus,
    pub financial: CategoryStatus,
    pub is_complete: bool,
}

impl VerificationStatus {
    /// Build the rollup from whatever records exist; missing entries read as
    /// `not_submitted`. `is_complete` holds iff every slot is approved.
    pub fn compute(
        form_statuses: &HashMap<KycCategory, ReviewStatus>,
        document_statuses: &HashMap<KycCategory, ReviewStatus>,
    ) -> Self {
        let slot = |category: KycCategory| CategoryStatus {
            form: form_statuses
                .get(&category)
                .copied()
                .unwrap_or(ReviewStatus::NotSubmitted),
            document: document_statuses
                .get(&category)
                .copied()
                .unwrap_or(ReviewStatus::NotSubmitted),
        };

        let identification = slot(KycCategory::Identification);
        let address = slot(KycCategory::Address);
        let tax = slot(KycCategory::Tax);
        let financial = slot(KycCategory::Financial);
        let is_complete = identification.approved()
            && address.approved()
            && tax.approved()
            && financial.approved();

        VerificationStatus {
            identification,
            address,
            tax,
            financial,
            is_complete,
        }
    }

    pub fn category(&self, category: KycCategory) -> CategoryStatus {
        match category {
            KycCategory::Identification => self.identification,
            KycCategory::Address => self.address,
            KycCategory::Tax => self.tax,
            KycCategory::Financial => self.financial,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_storage_text() {
        for category in KycCategory::ALL {
            assert_eq!(category.as_str().parse::<KycCategory>().unwrap(), category);
        }
        assert!("passport".parse::<KycCategory>().is_err());
    }

    #[test]
    fn status_round_trips_through_storage_text() {
        for status in [
            ReviewStatus::NotSubmitted,
            ReviewStatus::Pending,
            ReviewStatus::Approved,
            ReviewStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<ReviewStatus>().unwrap(), status);
        }
        assert!("done".parse::<ReviewStatus>().is_err());
    }

    #[test]
    fn only_approved_and_rejected_are_verdicts() {
        assert!(ReviewStatus::Approved.is_verdict());
        assert!(ReviewStatus::Rejected.is_verdict());
        assert!(!ReviewStatus::Pending.is_verdict());
        assert!(!ReviewStatus::NotSubmitted.is_verdict());
    }

    #[test]
    fn form_payload_deserializes_against_its_category_schema() {
        let body = serde_json::json!({
            "category": "identification",
            "fields": {
                "fullName": "Jane Doe",
                "dateOfBirth": "1990-01-01",
                "nationality": "US",
                "idType": "passport",
                "idNumber": "X123",
                "expiryDate": "2030-01-01"
            }
        });
        let parsed: KycFormFields = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.category(), KycCategory::Identification);
        match parsed {
            KycFormFields::Identification(fields) => {
                assert_eq!(fields.full_name, "Jane Doe");
                assert_eq!(fields.id_number, "X123");
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn mismatched_fields_for_a_category_are_rejected() {
        // address fields under the identification tag must not parse
        let body = serde_json::json!({
            "category": "identification",
            "fields": {
                "streetAddress": "1 Main St",
                "city": "Springfield",
                "state": "IL",
                "postalCode": "62701",
                "country": "US",
                "residenceSince": "2020-01-01"
            }
        });
        assert!(serde_json::from_value::<KycFormFields>(body).is_err());
    }

    #[test]
    fn tax_fields_allow_omitting_foreign_tax_id() {
        let body = serde_json::json!({
            "category": "tax",
            "fields": {
                "taxIdNumber": "T-900",
                "taxResidency": "US",
                "taxStatus": "resident",
                "isForeignTaxPayer": false
            }
        });
        let parsed: KycFormFields = serde_json::from_value(body).unwrap();
        match parsed {
            KycFormFields::Tax(fields) => assert!(fields.foreign_tax_id.is_none()),
            other => panic!("wrong variant: {:?}", other),
        }
    }

    fn all_approved() -> HashMap<KycCategory, ReviewStatus> {
        KycCategory::ALL
            .into_iter()
            .map(|c| (c, ReviewStatus::Approved))
            .collect()
    }

    #[test]
    fn aggregate_is_complete_only_when_all_eight_slots_approved() {
        let status = VerificationStatus::compute(&all_approved(), &all_approved());
        assert!(status.is_complete);

        let mut forms = all_approved();
        forms.insert(KycCategory::Tax, ReviewStatus::Rejected);
        let status = VerificationStatus::compute(&forms, &all_approved());
        assert!(!status.is_complete);
        assert_eq!(status.tax.form, ReviewStatus::Rejected);
        assert_eq!(status.tax.document, ReviewStatus::Approved);
    }

    #[test]
    fn missing_records_read_as_not_submitted() {
        let status = VerificationStatus::compute(&HashMap::new(), &HashMap::new());
        assert!(!status.is_complete);
        for category in KycCategory::ALL {
            assert_eq!(status.category(category).form, ReviewStatus::NotSubmitted);
            assert_eq!(
                status.category(category).document,
                ReviewStatus::NotSubmitted
            );
        }
    }
}
