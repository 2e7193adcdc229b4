//! Document submission, search and state-change payloads
//!
//! Everything here validates locally so malformed requests never reach the
//! network. Query types render to the API's camelCase query parameters.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::tin::Tin;
use crate::constants::{MAX_DATE_WINDOW_DAYS, MAX_DOCUMENTS_PER_SUBMISSION, MAX_PAGE_SIZE};
use crate::errors::{MyInvoisError, Result};
use crate::impl_domain_status_conversions;

/// Query parameter pairs, in insertion order
pub type QueryPairs = Vec<(&'static str, String)>;

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// `from <= to` and at most [`MAX_DATE_WINDOW_DAYS`] apart
fn validate_window(
    field: &str,
    from: Option<&DateTime<Utc>>,
    to: Option<&DateTime<Utc>>,
) -> Result<()> {
    match (from, to) {
        (Some(from), Some(to)) => {
            if from > to {
                return Err(MyInvoisError::validation_field(
                    field,
                    format!("{field}From must not be after {field}To"),
                ));
            }
            if *to - *from > Duration::days(MAX_DATE_WINDOW_DAYS) {
                return Err(MyInvoisError::validation_field(
                    field,
                    format!("{field} range must not exceed {MAX_DATE_WINDOW_DAYS} days"),
                ));
            }
            Ok(())
        }
        (None, None) => Ok(()),
        _ => Err(MyInvoisError::validation_field(
            field,
            format!("{field}From and {field}To must be provided together"),
        )),
    }
}

/// `pageNo` starts at 1; `pageSize` is 1..=[`MAX_PAGE_SIZE`]
pub fn validate_paging(page_no: Option<u32>, page_size: Option<u32>) -> Result<()> {
    if page_no == Some(0) {
        return Err(MyInvoisError::validation_field("pageNo", "pageNo starts at 1"));
    }
    if let Some(size) = page_size {
        if size == 0 || size > MAX_PAGE_SIZE {
            return Err(MyInvoisError::validation_field(
                "pageSize",
                format!("pageSize must be between 1 and {MAX_PAGE_SIZE}"),
            ));
        }
    }
    Ok(())
}

/// Direction of a document relative to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceDirection {
    Sent,
    Received,
}

impl InvoiceDirection {
    fn as_param(self) -> &'static str {
        match self {
            Self::Sent => "Sent",
            Self::Received => "Received",
        }
    }
}

/// Document status filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    Valid,
    Invalid,
    Cancelled,
    Submitted,
}

impl DocumentStatus {
    fn as_param(self) -> &'static str {
        match self {
            Self::Valid => "Valid",
            Self::Invalid => "Invalid",
            Self::Cancelled => "Cancelled",
            Self::Submitted => "Submitted",
        }
    }
}

/// Filters for document search and recent-document listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentQuery {
    pub uuid: Option<String>,
    pub submission_date_from: Option<DateTime<Utc>>,
    pub submission_date_to: Option<DateTime<Utc>>,
    pub issue_date_from: Option<DateTime<Utc>>,
    pub issue_date_to: Option<DateTime<Utc>>,
    pub page_no: Option<u32>,
    pub page_size: Option<u32>,
    pub direction: Option<InvoiceDirection>,
    pub status: Option<DocumentStatus>,
    pub document_type: Option<String>,
    pub receiver_tin: Option<Tin>,
    pub issuer_tin: Option<Tin>,
}

impl DocumentQuery {
    pub fn submitted_between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.submission_date_from = Some(from);
        self.submission_date_to = Some(to);
        self
    }

    pub fn issued_between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.issue_date_from = Some(from);
        self.issue_date_to = Some(to);
        self
    }

    pub fn page(mut self, page_no: u32, page_size: u32) -> Self {
        self.page_no = Some(page_no);
        self.page_size = Some(page_size);
        self
    }

    /// Validation for the recent-documents listing
    pub fn validate(&self) -> Result<()> {
        validate_window(
            "submissionDate",
            self.submission_date_from.as_ref(),
            self.submission_date_to.as_ref(),
        )?;
        validate_window("issueDate", self.issue_date_from.as_ref(), self.issue_date_to.as_ref())?;
        validate_paging(self.page_no, self.page_size)
    }

    /// Search additionally requires a submission or issue date window
    pub fn validate_for_search(&self) -> Result<()> {
        self.validate()?;
        if self.submission_date_from.is_none() && self.issue_date_from.is_none() {
            return Err(MyInvoisError::validation_field(
                "submissionDate",
                "Either a submission date or an issue date range is required",
            ));
        }
        Ok(())
    }

    pub fn to_query(&self) -> QueryPairs {
        let mut pairs = QueryPairs::new();
        if let Some(uuid) = &self.uuid {
            pairs.push(("uuid", uuid.clone()));
        }
        if let Some(ts) = &self.submission_date_from {
            pairs.push(("submissionDateFrom", format_timestamp(ts)));
        }
        if let Some(ts) = &self.submission_date_to {
            pairs.push(("submissionDateTo", format_timestamp(ts)));
        }
        if let Some(ts) = &self.issue_date_from {
            pairs.push(("issueDateFrom", format_timestamp(ts)));
        }
        if let Some(ts) = &self.issue_date_to {
            pairs.push(("issueDateTo", format_timestamp(ts)));
        }
        if let Some(page_no) = self.page_no {
            pairs.push(("pageNo", page_no.to_string()));
        }
        if let Some(page_size) = self.page_size {
            pairs.push(("pageSize", page_size.to_string()));
        }
        if let Some(direction) = self.direction {
            pairs.push(("invoiceDirection", direction.as_param().to_string()));
        }
        if let Some(status) = self.status {
            pairs.push(("status", status.as_param().to_string()));
        }
        if let Some(document_type) = &self.document_type {
            pairs.push(("documentType", document_type.clone()));
        }
        if let Some(tin) = &self.receiver_tin {
            pairs.push(("receiverTin", tin.to_string()));
        }
        if let Some(tin) = &self.issuer_tin {
            pairs.push(("issuerTin", tin.to_string()));
        }
        pairs
    }
}

/// Filters for taxpayer notifications
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationQuery {
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub notification_type: Option<u32>,
    pub language: Option<String>,
    pub status: Option<u32>,
    pub page_no: Option<u32>,
    pub page_size: Option<u32>,
}

impl NotificationQuery {
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { date_from: Some(from), date_to: Some(to), ..Self::default() }
    }

    pub fn validate(&self) -> Result<()> {
        validate_window("date", self.date_from.as_ref(), self.date_to.as_ref())?;
        validate_paging(self.page_no, self.page_size)
    }

    pub fn to_query(&self) -> QueryPairs {
        let mut pairs = QueryPairs::new();
        if let Some(ts) = &self.date_from {
            pairs.push(("dateFrom", format_timestamp(ts)));
        }
        if let Some(ts) = &self.date_to {
            pairs.push(("dateTo", format_timestamp(ts)));
        }
        if let Some(kind) = self.notification_type {
            pairs.push(("type", kind.to_string()));
        }
        if let Some(language) = &self.language {
            pairs.push(("language", language.clone()));
        }
        if let Some(status) = self.status {
            pairs.push(("status", status.to_string()));
        }
        if let Some(page_no) = self.page_no {
            pairs.push(("pageNo", page_no.to_string()));
        }
        if let Some(page_size) = self.page_size {
            pairs.push(("pageSize", page_size.to_string()));
        }
        pairs
    }
}

/// Target state of a document state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentState {
    Cancelled,
    Rejected,
}

impl_domain_status_conversions!(DocumentState {
    Cancelled => "cancelled",
    Rejected => "rejected",
});

/// Body of a cancel/reject request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStateUpdate {
    pub status: DocumentState,
    pub reason: String,
}

impl DocumentStateUpdate {
    pub fn cancel(reason: impl Into<String>) -> Self {
        Self { status: DocumentState::Cancelled, reason: reason.into() }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self { status: DocumentState::Rejected, reason: reason.into() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.reason.trim().is_empty() {
            return Err(MyInvoisError::validation_field("reason", "A reason is required"));
        }
        Ok(())
    }
}

/// Identification type accepted by taxpayer validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaxpayerIdType {
    Nric,
    Passport,
    Brn,
    Army,
}

impl TaxpayerIdType {
    pub fn as_param(self) -> &'static str {
        match self {
            Self::Nric => "NRIC",
            Self::Passport => "PASSPORT",
            Self::Brn => "BRN",
            Self::Army => "ARMY",
        }
    }
}

/// One document inside a submission batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionDocument {
    /// `JSON` or `XML`
    pub format: String,
    /// Base64 of the raw document
    pub document: String,
    /// Lowercase hex SHA-256 of the raw document
    pub document_hash: String,
    /// Caller-assigned invoice number
    pub code_number: String,
}

impl SubmissionDocument {
    /// Encode a raw JSON document
    pub fn json(raw: &str, code_number: impl Into<String>) -> Self {
        Self::encode("JSON", raw, code_number)
    }

    /// Encode a raw XML document
    pub fn xml(raw: &str, code_number: impl Into<String>) -> Self {
        Self::encode("XML", raw, code_number)
    }

    fn encode(format: &str, raw: &str, code_number: impl Into<String>) -> Self {
        Self {
            format: format.to_string(),
            document: STANDARD.encode(raw.as_bytes()),
            document_hash: hex::encode(Sha256::digest(raw.as_bytes())),
            code_number: code_number.into(),
        }
    }
}

/// Submission batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSubmission {
    pub documents: Vec<SubmissionDocument>,
}

impl DocumentSubmission {
    pub fn new(documents: Vec<SubmissionDocument>) -> Self {
        Self { documents }
    }

    pub fn validate(&self) -> Result<()> {
        if self.documents.is_empty() || self.documents.len() > MAX_DOCUMENTS_PER_SUBMISSION {
            return Err(MyInvoisError::validation_field(
                "documents",
                format!("A submission must contain 1 to {MAX_DOCUMENTS_PER_SUBMISSION} documents"),
            ));
        }
        if let Some(blank) = self.documents.iter().position(|d| d.code_number.trim().is_empty()) {
            return Err(MyInvoisError::validation_field(
                format!("documents.{blank}.codeNumber"),
                "codeNumber is required",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn search_requires_a_date_window() {
        let err = DocumentQuery::default().validate_for_search().unwrap_err();
        assert!(err.field_errors().unwrap().contains_key("submissionDate"));
        assert!(DocumentQuery::default().validate().is_ok());
    }

    #[test]
    fn date_windows_are_bounded() {
        let ok = DocumentQuery::default().submitted_between(day(1), day(31));
        assert!(ok.validate_for_search().is_ok());

        let reversed = DocumentQuery::default().submitted_between(day(10), day(2));
        assert!(reversed.validate_for_search().is_err());

        let too_wide = DocumentQuery::default().issued_between(
            day(1),
            Utc.with_ymd_and_hms(2025, 2, 2, 0, 0, 0).unwrap(),
        );
        assert!(too_wide.validate_for_search().is_err());

        let half_open =
            DocumentQuery { submission_date_from: Some(day(1)), ..DocumentQuery::default() };
        assert!(half_open.validate().is_err());
    }

    #[test]
    fn page_size_limits() {
        let q = DocumentQuery::default().page(1, 100);
        assert!(q.validate().is_ok());
        assert!(DocumentQuery::default().page(1, 0).validate().is_err());
        assert!(DocumentQuery::default().page(1, 101).validate().is_err());
        assert!(DocumentQuery::default().page(0, 10).validate().is_err());
    }

    #[test]
    fn query_pairs_use_api_names() {
        let q = DocumentQuery {
            direction: Some(InvoiceDirection::Received),
            status: Some(DocumentStatus::Valid),
            receiver_tin: Some(Tin::parse("C1234567890").unwrap()),
            ..DocumentQuery::default()
        }
        .submitted_between(day(1), day(2))
        .page(2, 50);

        let pairs = q.to_query();
        assert!(pairs.contains(&("submissionDateFrom", "2025-01-01T00:00:00Z".to_string())));
        assert!(pairs.contains(&("invoiceDirection", "Received".to_string())));
        assert!(pairs.contains(&("status", "Valid".to_string())));
        assert!(pairs.contains(&("receiverTin", "C1234567890".to_string())));
        assert!(pairs.contains(&("pageSize", "50".to_string())));
    }

    #[test]
    fn notification_query_validation() {
        assert!(NotificationQuery::between(day(1), day(5)).validate().is_ok());
        assert!(NotificationQuery::between(day(5), day(1)).validate().is_err());
        let pairs = NotificationQuery::between(day(1), day(5)).to_query();
        assert_eq!(pairs[0], ("dateFrom", "2025-01-01T00:00:00Z".to_string()));
    }

    #[test]
    fn state_update_requires_reason() {
        assert!(DocumentStateUpdate::cancel("Wrong buyer").validate().is_ok());
        let err = DocumentStateUpdate::reject("   ").validate().unwrap_err();
        assert!(err.field_errors().unwrap().contains_key("reason"));

        let body = serde_json::to_value(DocumentStateUpdate::cancel("dup")).unwrap();
        assert_eq!(body["status"], "cancelled");
    }

    #[test]
    fn submission_document_is_encoded_and_hashed() {
        let doc = SubmissionDocument::json("{}", "INV-001");
        assert_eq!(doc.document, "e30=");
        assert_eq!(
            doc.document_hash,
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );

        let body = serde_json::to_value(&doc).unwrap();
        assert_eq!(body["documentHash"], doc.document_hash);
        assert_eq!(body["codeNumber"], "INV-001");
    }

    #[test]
    fn submission_size_limits() {
        assert!(DocumentSubmission::default().validate().is_err());

        let one = DocumentSubmission::new(vec![SubmissionDocument::json("{}", "INV-1")]);
        assert!(one.validate().is_ok());

        let many = DocumentSubmission::new(
            (0..101).map(|i| SubmissionDocument::json("{}", format!("INV-{i}"))).collect(),
        );
        assert!(many.validate().is_err());

        let blank = DocumentSubmission::new(vec![SubmissionDocument::xml("<a/>", " ")]);
        assert!(blank.validate().is_err());
    }
}
