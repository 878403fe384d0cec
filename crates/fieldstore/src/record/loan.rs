//! Loan application record: the owner of the IRD number, date of birth and NZBN.

use chrono::{DateTime, NaiveDate, Utc};
use common::{FieldError, RecordRef};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{LegacyPlaintext, Record};
use crate::attribute::{AuditScope, DecryptAudit, EncryptedAttribute};
use crate::query::find_by_secondary_then_filter;
use crate::repository::RecordRepository;
use crate::store::{EncryptedFieldStore, DATE_FORMAT};

/// Encrypted attribute: IRD tax number.
pub const IRD_NUMBER: &str = "ird_number";
/// Encrypted attribute: customer date of birth.
pub const CUSTOMER_DATE_OF_BIRTH: &str = "customer_date_of_birth";
/// Encrypted attribute: New Zealand Business Number (marketing loans only).
pub const NZBN: &str = "nzbn";
/// Queryable attribute: customer email (case-insensitive).
pub const CUSTOMER_EMAIL: &str = "customer_email";

const ALL_ENCRYPTED: &[&str] = &[IRD_NUMBER, CUSTOMER_DATE_OF_BIRTH, NZBN];
const PERSONAL_ENCRYPTED: &[&str] = &[IRD_NUMBER, CUSTOMER_DATE_OF_BIRTH];

/// Product line an application belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanKind {
    /// Business promotional activities. Carries an NZBN.
    Marketing,
    /// Property improvements.
    Renovation,
    /// Property purchase deposits.
    Deposit,
}

impl LoanKind {
    /// Stable lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanKind::Marketing => "marketing",
            LoanKind::Renovation => "renovation",
            LoanKind::Deposit => "deposit",
        }
    }
}

/// Lifecycle state of an application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    #[default]
    Draft,
    Submitted,
    UnderReview,
    Approved,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    /// Stable snake_case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Withdrawn => "withdrawn",
        }
    }
}

/// A customer's loan application.
///
/// Plain fields are public and queryable. The three sensitive values live in
/// private encrypted columns and are reached through typed accessors that
/// take the [`EncryptedFieldStore`] explicitly.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanApplication {
    pub application_id: Uuid,
    pub kind: LoanKind,
    pub customer_email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub status: ApplicationStatus,
    /// Requested amount in NZD cents.
    pub loan_amount_cents: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    encrypted_ird_number: EncryptedAttribute,
    #[serde(default)]
    encrypted_customer_dob: EncryptedAttribute,
    #[serde(default)]
    encrypted_nzbn: EncryptedAttribute,

    // Pre-encryption plaintext columns, emptied by the migration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    legacy_ird_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    legacy_customer_dob: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    legacy_nzbn: Option<String>,
}

impl LoanApplication {
    /// Create a draft application with no sensitive values set.
    pub fn new(
        kind: LoanKind,
        customer_email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        loan_amount_cents: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            application_id: Uuid::new_v4(),
            kind,
            customer_email: customer_email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            status: ApplicationStatus::Draft,
            loan_amount_cents,
            created_at: now,
            updated_at: now,
            encrypted_ird_number: EncryptedAttribute::empty(),
            encrypted_customer_dob: EncryptedAttribute::empty(),
            encrypted_nzbn: EncryptedAttribute::empty(),
            legacy_ird_number: None,
            legacy_customer_dob: None,
            legacy_nzbn: None,
        }
    }

    /// Attach a legacy plaintext IRD number, as loaded from a pre-encryption row.
    pub fn with_legacy_ird_number(mut self, ird: impl Into<String>) -> Self {
        self.legacy_ird_number = Some(ird.into());
        self
    }

    /// Attach a legacy plaintext date of birth.
    pub fn with_legacy_customer_dob(mut self, dob: NaiveDate) -> Self {
        self.legacy_customer_dob = Some(dob);
        self
    }

    /// Attach a legacy plaintext NZBN.
    pub fn with_legacy_nzbn(mut self, nzbn: impl Into<String>) -> Self {
        self.legacy_nzbn = Some(nzbn.into());
        self
    }

    // -----------------------------------------------------------------------
    // Typed accessors
    // -----------------------------------------------------------------------

    /// Decrypted IRD number.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Decryption`] if the stored token is rejected.
    pub fn ird_number(
        &self,
        store: &EncryptedFieldStore,
        audit: Option<&dyn DecryptAudit>,
    ) -> Result<Option<String>, FieldError> {
        let record = self.record_ref();
        self.encrypted_ird_number
            .get(store, scope(audit, &record, IRD_NUMBER))
    }

    /// Encrypt and store the IRD number (`None` clears it).
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Encryption`] if the value cannot be encrypted.
    pub fn set_ird_number(
        &mut self,
        store: &EncryptedFieldStore,
        value: Option<&str>,
    ) -> Result<(), FieldError> {
        self.encrypted_ird_number.set(store, value)?;
        self.touch();
        Ok(())
    }

    /// Decrypted date of birth.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Decryption`] if the stored token is rejected.
    pub fn customer_date_of_birth(
        &self,
        store: &EncryptedFieldStore,
        audit: Option<&dyn DecryptAudit>,
    ) -> Result<Option<NaiveDate>, FieldError> {
        let record = self.record_ref();
        self.encrypted_customer_dob
            .get_date(store, scope(audit, &record, CUSTOMER_DATE_OF_BIRTH))
    }

    /// Encrypt and store the date of birth (`None` clears it).
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Encryption`] if the value cannot be encrypted.
    pub fn set_customer_date_of_birth(
        &mut self,
        store: &EncryptedFieldStore,
        value: Option<NaiveDate>,
    ) -> Result<(), FieldError> {
        self.encrypted_customer_dob.set_date(store, value)?;
        self.touch();
        Ok(())
    }

    /// Decrypted NZBN. Always `None` for non-marketing applications.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Decryption`] if the stored token is rejected.
    pub fn nzbn(
        &self,
        store: &EncryptedFieldStore,
        audit: Option<&dyn DecryptAudit>,
    ) -> Result<Option<String>, FieldError> {
        let record = self.record_ref();
        self.encrypted_nzbn.get(store, scope(audit, &record, NZBN))
    }

    /// Encrypt and store the NZBN (`None` clears it).
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Encryption`] if the value cannot be encrypted or
    /// if this is not a marketing application.
    pub fn set_nzbn(
        &mut self,
        store: &EncryptedFieldStore,
        value: Option<&str>,
    ) -> Result<(), FieldError> {
        if self.kind != LoanKind::Marketing && value.is_some_and(|v| !v.is_empty()) {
            return Err(FieldError::Encryption(format!(
                "{NZBN} is not recorded on {} applications",
                self.kind.as_str()
            )));
        }
        self.encrypted_nzbn.set(store, value)?;
        self.touch();
        Ok(())
    }

    /// Find applications by email and date of birth, newest first.
    ///
    /// Email is matched case-insensitively by the repository; the date of
    /// birth is encrypted, so it is compared after decryption. Each of those
    /// decrypts is reported to `audit` when one is given.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Repository`] if candidates cannot be loaded.
    pub fn find_application<Repo>(
        repo: &Repo,
        store: &EncryptedFieldStore,
        email: &str,
        date_of_birth: NaiveDate,
        audit: Option<&dyn DecryptAudit>,
    ) -> Result<Vec<Self>, FieldError>
    where
        Repo: RecordRepository<Self> + ?Sized,
    {
        let dob = date_of_birth.format(DATE_FORMAT).to_string();
        let mut found = find_by_secondary_then_filter(
            repo,
            store,
            CUSTOMER_EMAIL,
            email,
            CUSTOMER_DATE_OF_BIRTH,
            &dob,
            audit,
        )?;
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(found)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn scope<'a>(
    audit: Option<&'a dyn DecryptAudit>,
    record: &'a RecordRef,
    attribute: &'a str,
) -> Option<AuditScope<'a>> {
    audit.map(|hook| AuditScope {
        hook,
        record,
        attribute,
    })
}

impl Record for LoanApplication {
    const ENCRYPTED_ATTRIBUTES: &'static [&'static str] = ALL_ENCRYPTED;

    fn record_ref(&self) -> RecordRef {
        RecordRef::new(self.application_id)
    }

    fn kind(&self) -> &'static str {
        self.kind.as_str()
    }

    fn encrypted_attribute_names(&self) -> &'static [&'static str] {
        match self.kind {
            LoanKind::Marketing => ALL_ENCRYPTED,
            LoanKind::Renovation | LoanKind::Deposit => PERSONAL_ENCRYPTED,
        }
    }

    fn encrypted_attribute(&self, name: &str) -> Option<&EncryptedAttribute> {
        match name {
            IRD_NUMBER => Some(&self.encrypted_ird_number),
            CUSTOMER_DATE_OF_BIRTH => Some(&self.encrypted_customer_dob),
            NZBN if self.kind == LoanKind::Marketing => Some(&self.encrypted_nzbn),
            _ => None,
        }
    }

    fn encrypted_attribute_mut(&mut self, name: &str) -> Option<&mut EncryptedAttribute> {
        match name {
            IRD_NUMBER => Some(&mut self.encrypted_ird_number),
            CUSTOMER_DATE_OF_BIRTH => Some(&mut self.encrypted_customer_dob),
            NZBN if self.kind == LoanKind::Marketing => Some(&mut self.encrypted_nzbn),
            _ => None,
        }
    }

    fn queryable_matches(&self, attribute: &str, value: &str) -> Option<bool> {
        let matched = match attribute {
            CUSTOMER_EMAIL => self.customer_email.to_lowercase() == value.trim().to_lowercase(),
            "application_id" => self.application_id.to_string() == value,
            "first_name" => self.first_name == value,
            "last_name" => self.last_name == value,
            "status" => self.status.as_str() == value,
            "kind" => self.kind.as_str() == value,
            _ => return None,
        };
        Some(matched)
    }
}

impl LegacyPlaintext for LoanApplication {
    fn legacy_plaintext(&self, attribute: &str) -> Option<String> {
        match attribute {
            IRD_NUMBER => self.legacy_ird_number.clone(),
            CUSTOMER_DATE_OF_BIRTH => self
                .legacy_customer_dob
                .map(|d| d.format(DATE_FORMAT).to_string()),
            NZBN if self.kind == LoanKind::Marketing => self.legacy_nzbn.clone(),
            _ => None,
        }
        .filter(|v| !v.is_empty())
    }

    fn clear_legacy_plaintext(&mut self, attribute: &str) {
        match attribute {
            IRD_NUMBER => self.legacy_ird_number = None,
            CUSTOMER_DATE_OF_BIRTH => self.legacy_customer_dob = None,
            NZBN => self.legacy_nzbn = None,
            _ => {}
        }
    }
}

impl std::fmt::Debug for LoanApplication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoanApplication")
            .field("application_id", &self.application_id)
            .field("kind", &self.kind)
            .field("customer_email", &self.customer_email)
            .field("status", &self.status)
            .field("loan_amount_cents", &self.loan_amount_cents)
            .field("updated_at", &self.updated_at)
            .field("encrypted_ird_number", &self.encrypted_ird_number)
            .field("encrypted_customer_dob", &self.encrypted_customer_dob)
            .field("encrypted_nzbn", &self.encrypted_nzbn)
            .finish_non_exhaustive()
    }
}
