//! Field validation utilities shared by manifest loading and request parsing.

use crate::types::{Error, Result};

/// Validate that a string is not empty (after trimming).
pub fn validate_non_empty(s: &str, field: &str) -> Result<()> {
    if s.trim().is_empty() {
        return Err(Error::validation(format!("{} cannot be empty", field)));
    }
    Ok(())
}

/// Validate that a value is positive.
pub fn validate_positive(n: u64, field: &str) -> Result<()> {
    if n == 0 {
        return Err(Error::validation(format!("{} must be positive", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_non_empty() {
        assert!(validate_non_empty("quotes", "name").is_ok());
        let err = validate_non_empty("  ", "name").unwrap_err();
        assert_eq!(err.to_string(), "validation error: name cannot be empty");
    }

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive(1, "timeoutMs").is_ok());
        assert!(validate_positive(0, "timeoutMs").is_err());
    }
}
