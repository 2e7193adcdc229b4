//! Domain constants
//!
//! API hosts, endpoint paths and defaults shared by configuration, the
//! authentication client and the webhook state machine.

// Hosts
pub const SANDBOX_BASE_URL: &str = "https://preprod-api.myinvois.hasil.gov.my";
pub const PRODUCTION_BASE_URL: &str = "https://api.myinvois.hasil.gov.my";

// Identity
pub const TOKEN_PATH: &str = "/connect/token";
pub const DEFAULT_SCOPE: &str = "InvoicingAPI";
pub const ON_BEHALF_OF_HEADER: &str = "onbehalfof";
pub const TOKEN_CACHE_PREFIX: &str = "myinvois:token";
pub const TIN_PATTERN: &str = r"^C\d{10}$";
pub const TIN_REQUIRED_MESSAGE: &str = "Taxpayer TIN must be set";
pub const INVALID_TIN_MESSAGE: &str = "Invalid TIN format. Expected C followed by 10 digits";

// Resource paths
pub const API_PREFIX: &str = "/api/v1.0";
pub const SUBMISSIONS_PATH: &str = "/api/v1.0/documentsubmissions";
pub const DOCUMENTS_PATH: &str = "/api/v1.0/documents";
pub const DOCUMENT_STATE_PATH: &str = "/api/v1.0/documents/state";
pub const TAXPAYER_VALIDATE_PATH: &str = "/api/v1.0/taxpayer/validate";
pub const DOCUMENT_TYPES_PATH: &str = "/api/v1.0/documenttypes";
pub const NOTIFICATIONS_PATH: &str = "/api/v1.0/notifications/taxpayer";

// Auth defaults
pub const DEFAULT_TOKEN_REFRESH_BUFFER_SECS: u64 = 300;

// HTTP defaults
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RETRY_TIMES: u32 = 3;
pub const DEFAULT_RETRY_BASE_MS: u64 = 200;
pub const DEFAULT_RETRY_CAP_MS: u64 = 10_000;

// Cache defaults
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

// Query limits
pub const MAX_PAGE_SIZE: u32 = 100;
pub const MAX_DATE_WINDOW_DAYS: i64 = 31;
pub const MAX_DOCUMENTS_PER_SUBMISSION: usize = 100;

// Webhooks
pub const DEFAULT_WEBHOOK_MAX_RETRIES: u32 = 3;
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 30;
pub const MAX_WEBHOOK_TIMEOUT_SECS: u64 = 120;
pub const WEBHOOK_BACKOFF_BASE_MINUTES: i64 = 5;
pub const MAX_WEBHOOK_BACKOFF_MINUTES: i64 = 24 * 60;
pub const MAX_STORED_RESPONSE_BODY: usize = 4096;
pub const WILDCARD_EVENT: &str = "*";

// Webhook event types
pub const EVENT_DOCUMENT_SUBMITTED: &str = "document.submitted";
pub const EVENT_DOCUMENT_VALIDATED: &str = "document.validated";
pub const EVENT_DOCUMENT_INVALID: &str = "document.invalid";
pub const EVENT_DOCUMENT_CANCELLED: &str = "document.cancelled";
pub const EVENT_DOCUMENT_REJECTED: &str = "document.rejected";
pub const EVENT_SUBMISSION_COMPLETED: &str = "submission.completed";
