//! String identifiers carried through a command. Both serialize as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Name under which a profile is submitted to the manager.
    ProfileName
);

string_newtype!(
    /// Identifier of a command instance, attached to every log line it emits.
    CommandId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_name_display_and_emptiness() {
        let name = ProfileName::from("WifiConfig");
        assert_eq!(name.to_string(), "WifiConfig");
        assert_eq!(name.as_str(), "WifiConfig");
        assert!(!name.is_empty());
        assert!(ProfileName::new(String::new()).is_empty());
    }

    #[test]
    fn command_id_serializes_as_plain_string() {
        let id = CommandId::new("ProfileManagerCommand");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ProfileManagerCommand\"");
        let back: CommandId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
