//! Strongly-typed identifiers.
//!
//! All IDs are validated at construction time and implement common traits.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to define a strongly-typed ID newtype wrapper.
///
/// Generates: struct, `from_string()`, `as_str()`, Display, Serialize, Deserialize.
/// Optionally generates `new()` (UUID v4) and `Default` if `uuid` flag is passed.
macro_rules! define_id {
    ($name:ident, uuid) => {
        define_id!($name);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn from_string(s: String) -> Result<Self, &'static str> {
                if s.trim().is_empty() {
                    return Err(concat!(stringify!($name), " cannot be empty"));
                }
                Ok(Self(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(JobId, uuid);
define_id!(RequestId, uuid);
define_id!(Identity);

impl Identity {
    /// Identity used when the caller presents none.
    pub fn anonymous() -> Self {
        Self("anonymous".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ids_rejected() {
        assert!(JobId::from_string(String::new()).is_err());
        assert!(Identity::from_string("   ".to_string()).is_err());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[test]
    fn test_serializes_transparently() {
        let id = JobId::from_string("job-1".to_string()).unwrap();
        assert_eq!(serde_json::to_value(&id).unwrap(), serde_json::json!("job-1"));
    }
}
