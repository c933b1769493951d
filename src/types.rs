use crate::error::{Error, Result};
use std::borrow::Borrow;
use std::fmt;

const MAX_NAME_LEN: usize = 128;

fn validate_name(value: &str, kind: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidGuardName(format!("{kind} must not be empty")));
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(Error::InvalidGuardName(format!(
            "{kind} length must be <= {MAX_NAME_LEN}"
        )));
    }
    if !trimmed.chars().all(is_allowed_name_char) {
        return Err(Error::InvalidGuardName(format!(
            "{kind} contains invalid characters"
        )));
    }
    Ok(trimmed.to_string())
}

// `.` separates configuration keys, so it never appears inside a name.
fn is_allowed_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, ':' | '_' | '-')
}

macro_rules! define_name_type {
    ($(#[$doc:meta])* $name:ident, $kind:expr) => {
        $(#[$doc])*
        #[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
        #[derive(serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a validated name.
            pub fn new(value: impl AsRef<str>) -> Result<Self> {
                validate_name(value.as_ref(), $kind).map(Self)
            }

            /// Returns the underlying string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<&str> for $name {
            type Error = Error;

            fn try_from(value: &str) -> Result<Self> {
                Self::new(value)
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(value: String) -> Result<Self> {
                Self::new(value)
            }
        }
    };
}

define_name_type!(
    /// Name of an independently configured guard. Case-sensitive.
    GuardName,
    "guard name"
);
define_name_type!(
    /// Identifies the persistence adapter a guard asks for.
    AdapterName,
    "adapter name"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_name_should_trim_and_keep_case() {
        let name = GuardName::try_from("  Api_v2 ").unwrap();
        assert_eq!(name.as_str(), "Api_v2");
        assert_ne!(name, GuardName::try_from("api_v2").unwrap());
    }

    #[test]
    fn guard_name_should_reject_empty() {
        let err = GuardName::try_from("   ").expect_err("must reject");
        assert!(err.to_string().contains("guard name must not be empty"));
    }

    #[test]
    fn guard_name_should_reject_key_separator() {
        let result = GuardName::try_from("api.v2");
        assert!(matches!(result, Err(Error::InvalidGuardName(_))));
    }

    #[test]
    fn adapter_name_should_reject_overlong_values() {
        let long = "a".repeat(MAX_NAME_LEN + 1);
        let err = AdapterName::new(long).expect_err("must reject");
        assert!(err.to_string().contains("adapter name length"));
    }
}
