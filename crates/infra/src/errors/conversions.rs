//! Conversions from external infrastructure errors into domain errors.

use myinvois_domain::MyInvoisError;
use reqwest::Error as HttpError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub MyInvoisError);

impl From<InfraError> for MyInvoisError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<MyInvoisError> for InfraError {
    fn from(value: MyInvoisError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoMyInvoisError {
    fn into_myinvois(self) -> MyInvoisError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → MyInvoisError */
/* -------------------------------------------------------------------------- */

impl IntoMyInvoisError for HttpError {
    fn into_myinvois(self) -> MyInvoisError {
        if self.is_timeout() {
            return MyInvoisError::network(format!("HTTP request timed out: {self}"));
        }

        if self.is_connect() {
            return MyInvoisError::network(format!("HTTP connection failure: {self}"));
        }

        if self.is_builder() {
            return MyInvoisError::config(format!("Invalid HTTP request: {self}"));
        }

        if self.is_decode() {
            return MyInvoisError::api(
                self.status().map(|s| s.as_u16()),
                "Invalid JSON response from API",
            );
        }

        // Request, body and redirect failures all mean no usable response arrived
        MyInvoisError::network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_myinvois())
    }
}

/* -------------------------------------------------------------------------- */
/* toml / serde_json → MyInvoisError */
/* -------------------------------------------------------------------------- */

impl From<toml::de::Error> for InfraError {
    fn from(value: toml::de::Error) -> Self {
        InfraError(MyInvoisError::config(format!("Invalid TOML format: {value}")))
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(MyInvoisError::internal(format!("JSON serialization failed: {value}")))
    }
}
