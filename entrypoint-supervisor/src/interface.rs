use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Reasons an interface name is refused
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum InvalidInterface {
    /// The name is empty
    #[error("the interface name must not be empty")]
    Empty,
    /// The name contains a NUL byte, which cannot be passed as a process argument
    #[error("the interface name must not contain a NUL byte")]
    Nul,
}

/// Value forwarded to the workload as `--interface <name>`.
///
/// Any text is accepted except the empty string and text containing NUL bytes.
/// The value is treated as a single opaque argument: it is quoted when embedded
/// into a script and passed as one `argv` element when spawned directly.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InterfaceName(String);

impl InterfaceName {
    /// Flag the workload receives the interface name with
    pub const FLAG: &'static str = "--interface";

    /// Validates and wraps an interface name
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidInterface> {
        let name = name.into();
        if name.is_empty() {
            return Err(InvalidInterface::Empty);
        }
        if name.contains('\0') {
            return Err(InvalidInterface::Nul);
        }

        Ok(Self(name))
    }

    /// Returns the raw interface name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for InterfaceName {
    type Err = InvalidInterface;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for InterfaceName {
    type Error = InvalidInterface;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<InterfaceName> for String {
    fn from(value: InterfaceName) -> Self {
        value.0
    }
}

impl AsRef<str> for InterfaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InterfaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for InterfaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::{InterfaceName, InvalidInterface};

    #[test]
    fn accepts_plain_names() {
        for name in ["k2eg", "epics", "test"] {
            assert_eq!(InterfaceName::new(name).unwrap().as_str(), name);
        }
    }

    #[test]
    fn accepts_metacharacters_verbatim() {
        let name = "k2eg; rm -rf ./sentinel $(id) `id` 'quoted' \"double\"";
        assert_eq!(InterfaceName::new(name).unwrap().as_str(), name);
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(InterfaceName::new(""), Err(InvalidInterface::Empty));
    }

    #[test]
    fn rejects_nul() {
        assert_eq!(InterfaceName::new("k2\0eg"), Err(InvalidInterface::Nul));
    }

    #[test]
    fn deserialize_validates() {
        serde_json::from_str::<InterfaceName>(r#""""#).unwrap_err();
        let name: InterfaceName = serde_json::from_str(r#""epics""#).unwrap();
        assert_eq!(name.as_str(), "epics");
    }
}
