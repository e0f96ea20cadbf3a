//! Macros for defining typed ID types.

/// Macro to define a typed, opaque string ID.
///
/// This generates a newtype wrapper around `String` with:
/// - `new()` to wrap a value without validation (callers that accept
///   user input validate separately and report their own errors)
/// - `parse()` to build from untrusted input
/// - `Display`, `FromStr`, `Serialize` and `Deserialize` implementations
/// - `Ord`, `Hash`, and other standard traits
///
/// Ordering is plain lexicographic byte order, which is what destroy victim
/// selection relies on.
///
/// # Example
///
/// ```ignore
/// define_id!(GroupId);
///
/// let id = GroupId::new("workers");
/// let parsed: GroupId = "workers".parse()?;
/// ```
#[macro_export]
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Wraps a value without validation.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Parses an ID from untrusted input.
            ///
            /// The value must be non-blank and free of control characters.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                if s.trim().is_empty() {
                    return Err($crate::IdError::Empty);
                }

                if let Some((position, character)) =
                    s.char_indices().find(|(_, c)| c.is_control())
                {
                    return Err($crate::IdError::InvalidCharacter {
                        character,
                        position,
                    });
                }

                Ok(Self(s.to_string()))
            }

            /// Returns the ID as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the ID is empty or only whitespace.
            #[must_use]
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}
