//! Macro for implementing Display and FromStr for status enums
//!
//! Status enums travel as lowercase strings (API payloads, storage rows, log
//! fields). The macro keeps both directions in one mapping table.
//!
//! # Example
//!
//! ```rust
//! use myinvois_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum SubmissionStatus {
//!     InProgress,
//!     Valid,
//!     PartiallyValid,
//!     Invalid,
//! }
//!
//! impl_domain_status_conversions!(SubmissionStatus {
//!     InProgress => "inprogress",
//!     Valid => "valid",
//!     PartiallyValid => "partiallyvalid",
//!     Invalid => "invalid",
//! });
//!
//! assert_eq!("Valid".parse::<SubmissionStatus>(), Ok(SubmissionStatus::Valid));
//! ```

/// Implements Display and FromStr traits for status enums
///
/// - Display writes the mapped string as-is
/// - FromStr lowercases its input before matching, so mapped strings must be
///   lowercase
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl ::std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($str),)+
                }
            }
        }

        impl ::std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => ::std::result::Result::Ok(Self::$variant),)+
                    _ => ::std::result::Result::Err(::std::format!(
                        "Invalid {}: {}",
                        ::std::stringify!($enum_name),
                        s
                    )),
                }
            }
        }
    };
}
