use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u64>()
                    .map($name::new)
                    .map_err(|_| ParseIdError {
                        kind: stringify!($name),
                    })
            }
        }
    };
}

numeric_id!(
    /// Server identifier of one attempt.
    AttemptId
);
numeric_id!(
    /// Server identifier of a question. Stable across shuffles.
    QuestionId
);
numeric_id!(
    /// Server identifier of an answer option.
    OptionId
);

/// Error returned when an id cannot be parsed from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: &'static str,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {} from string", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_as_bare_numbers() {
        assert_eq!(AttemptId::new(42).to_string(), "42");
        assert_eq!(format!("{:?}", QuestionId::new(7)), "QuestionId(7)");
    }

    #[test]
    fn ids_parse_with_surrounding_whitespace() {
        let id: OptionId = " 123 ".parse().unwrap();
        assert_eq!(id, OptionId::new(123));
    }

    #[test]
    fn invalid_id_names_its_kind() {
        let err = "abc".parse::<AttemptId>().unwrap_err();
        assert_eq!(err.to_string(), "failed to parse AttemptId from string");
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&QuestionId::new(9)).unwrap();
        assert_eq!(json, "9");
    }
}
