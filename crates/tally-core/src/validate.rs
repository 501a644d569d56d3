//! Input validation for externally supplied identifiers.
//!
//! Called by the HTTP layer before any storage operation; the storage
//! contract itself does not re-validate.

use thiserror::Error;

/// Upper bound on `name` and `build_id` length.
pub const MAX_IDENT_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be between 1 and 255 characters")]
    Length { field: &'static str },

    #[error("{field} contains invalid characters")]
    Charset { field: &'static str },
}

/// Project names: alphanumerics, `_` and `-`.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    validate_ident(name, "name", |c| {
        c.is_ascii_alphanumeric() || c == '_' || c == '-'
    })
}

/// Build identifiers additionally allow `.` (version-like ids).
pub fn validate_build_id(build_id: &str) -> Result<(), ValidationError> {
    validate_ident(build_id, "build_id", |c| {
        c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
    })
}

/// Validate both request parameters, name first.
pub fn validate_request(name: &str, build_id: &str) -> Result<(), ValidationError> {
    validate_name(name)?;
    validate_build_id(build_id)
}

fn validate_ident(
    value: &str,
    field: &'static str,
    allowed: impl Fn(char) -> bool,
) -> Result<(), ValidationError> {
    // Counted in characters, matching the error message. Valid
    // identifiers are ASCII so this only matters for rejected input.
    if value.is_empty() || value.chars().count() > MAX_IDENT_LEN {
        return Err(ValidationError::Length { field });
    }
    if !value.chars().all(allowed) {
        return Err(ValidationError::Charset { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_and_rejects_expected_inputs() {
        let long = "x".repeat(256);
        let cases: &[(&str, &str, Option<ValidationError>)] = &[
            ("valid-name", "build-123", None),
            ("valid_name", "build.123", None),
            ("", "build-123", Some(ValidationError::Length { field: "name" })),
            (
                "valid-name",
                "",
                Some(ValidationError::Length { field: "build_id" }),
            ),
            (
                "invalid name!",
                "build-123",
                Some(ValidationError::Charset { field: "name" }),
            ),
            (
                "valid-name",
                "build@123",
                Some(ValidationError::Charset { field: "build_id" }),
            ),
            (
                long.as_str(),
                "build-123",
                Some(ValidationError::Length { field: "name" }),
            ),
            (
                "valid-name",
                long.as_str(),
                Some(ValidationError::Length { field: "build_id" }),
            ),
        ];

        for (name, build_id, want) in cases {
            let got = validate_request(name, build_id).err();
            assert_eq!(&got, want, "name={name:?} build_id={build_id:?}");
        }
    }

    #[test]
    fn dot_allowed_in_build_id_only() {
        assert!(validate_build_id("1.2.3").is_ok());
        assert_eq!(
            validate_name("1.2.3"),
            Err(ValidationError::Charset { field: "name" })
        );
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        // 200 two-byte characters: within the length bound, so the
        // charset rule is what rejects it.
        let multibyte = "é".repeat(200);
        assert_eq!(
            validate_name(&multibyte),
            Err(ValidationError::Charset { field: "name" })
        );
        assert_eq!(
            validate_name(&"é".repeat(256)),
            Err(ValidationError::Length { field: "name" })
        );
    }

    #[test]
    fn error_messages_match_http_responses() {
        let err = validate_name("").unwrap_err();
        assert_eq!(err.to_string(), "name must be between 1 and 255 characters");
        let err = validate_build_id("a b").unwrap_err();
        assert_eq!(err.to_string(), "build_id contains invalid characters");
    }
}
