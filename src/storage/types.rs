//! core type-safe wrappers around git primitives for the storage layer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use git2::Oid;

/// A full-length SHA-1 object identifier.
///
/// Object maps and ref listings carry ids as 40-character hex strings, so
/// parsing is strict: abbreviated ids are rejected instead of being padded
/// with zeros the way `git2::Oid::from_str` would.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) Oid);

impl ObjectId {
    /// number of hex characters in a full object id
    pub const HEX_LEN: usize = 40;

    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    /// raw Oid (for internal use only)
    pub(crate) fn raw(&self) -> Oid {
        self.0
    }

    /// parse an ObjectId from exactly 40 hex characters
    pub fn from_hex(hex: &str) -> Result<Self, InvalidValueError> {
        if hex.len() != Self::HEX_LEN {
            return Err(InvalidValueError::ObjectIdLength(hex.len()));
        }
        if let Some(position) = hex.bytes().position(|b| !b.is_ascii_hexdigit()) {
            return Err(InvalidValueError::ObjectIdCharacter {
                char: hex[position..].chars().next().unwrap_or('?'),
                position,
            });
        }

        Oid::from_str(hex)
            .map(Self)
            .map_err(|_| InvalidValueError::ObjectIdLength(hex.len()))
    }

    /// the nil object id, used by history rewriters to mark removed objects
    pub fn zero() -> Self {
        Self(Oid::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// short form of the object ID
    pub fn short(&self) -> String {
        self.0.to_string()[..7].to_string()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectId {
    type Err = InvalidValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// A fully qualified reference name such as `refs/heads/main`.
///
/// Names are validated against git's ref-format rules and must either be
/// `HEAD` or live below `refs/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferenceName(String);

impl ReferenceName {
    pub const HEAD: &'static str = "HEAD";

    /// create a new ReferenceName, validating the input
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidValueError> {
        let name = name.into();

        if name.is_empty() {
            return Err(InvalidValueError::Empty);
        }
        if name != Self::HEAD && !name.starts_with("refs/") {
            return Err(InvalidValueError::NotQualified(name));
        }
        if !git2::Reference::is_valid_name(&name) {
            return Err(InvalidValueError::InvalidReference(name));
        }

        Ok(Self(name))
    }

    /// build `<namespace><suffix>`, e.g. `refs/dangling/` + an object id
    pub fn in_namespace(namespace: &str, suffix: &str) -> Result<Self, InvalidValueError> {
        Self::new(format!("{}{}", namespace, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ReferenceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ReferenceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ReferenceName {
    type Err = InvalidValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// An author or committer identity with an explicit timestamp.
///
/// The offset is kept so the serialized commit carries the caller's timezone
/// rather than the host's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
    pub when: DateTime<FixedOffset>,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: impl Into<String>, when: DateTime<FixedOffset>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            when,
        }
    }

    /// convert to git2::Signature
    pub(crate) fn to_git2_signature(&self) -> Result<git2::Signature<'static>, git2::Error> {
        let offset_minutes = self.when.offset().local_minus_utc() / 60;
        let time = git2::Time::new(self.when.timestamp(), offset_minutes);
        git2::Signature::new(&self.name, &self.email, &time)
    }
}

/// error type for invalid object ids and reference names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidValueError {
    Empty,
    ObjectIdLength(usize),
    ObjectIdCharacter { char: char, position: usize },
    NotQualified(String),
    InvalidReference(String),
}

impl fmt::Display for InvalidValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "value cannot be empty"),
            Self::ObjectIdLength(len) => {
                write!(f, "object id must be {} hex characters, got {}", ObjectId::HEX_LEN, len)
            }
            Self::ObjectIdCharacter { char, position } => {
                write!(f, "invalid object id character '{}' at position {}", char, position)
            }
            Self::NotQualified(name) => write!(f, "reference '{}' is not fully qualified", name),
            Self::InvalidReference(name) => write!(f, "invalid reference name: '{}'", name),
        }
    }
}

impl std::error::Error for InvalidValueError {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_object_id_parsing() {
        let hex = "1e292f8fedd741b75372e19097c76d327140c312";
        let oid = ObjectId::from_hex(hex).unwrap();
        assert_eq!(oid.to_string(), hex);
        assert_eq!(oid.short(), "1e292f8");

        assert_eq!(
            ObjectId::from_hex("1e292f8"),
            Err(InvalidValueError::ObjectIdLength(7))
        );
        assert!(matches!(
            ObjectId::from_hex("zz292f8fedd741b75372e19097c76d327140c312"),
            Err(InvalidValueError::ObjectIdCharacter { position: 0, .. })
        ));
    }

    #[test]
    fn test_zero_object_id() {
        let zero = ObjectId::from_hex(&"0".repeat(40)).unwrap();
        assert!(zero.is_zero());
        assert_eq!(zero, ObjectId::zero());
    }

    #[test]
    fn test_reference_name_valid() {
        assert!(ReferenceName::new("refs/heads/main").is_ok());
        assert!(ReferenceName::new("refs/keep-around/1e292f8fedd741b75372e19097c76d327140c312").is_ok());
        assert!(ReferenceName::new("HEAD").is_ok());
    }

    #[test]
    fn test_reference_name_invalid() {
        assert_eq!(ReferenceName::new(""), Err(InvalidValueError::Empty));
        assert!(matches!(
            ReferenceName::new("heads/main"),
            Err(InvalidValueError::NotQualified(_))
        ));
        assert!(matches!(
            ReferenceName::new("refs/heads/a..b"),
            Err(InvalidValueError::InvalidReference(_))
        ));
        assert!(ReferenceName::new("refs/heads/with space").is_err());
    }

    #[test]
    fn test_reference_namespace() {
        let name = ReferenceName::in_namespace("refs/dangling/", "abc").unwrap();
        assert_eq!(name.as_str(), "refs/dangling/abc");
        assert!(name.has_prefix("refs/dangling/"));
    }

    #[test]
    fn test_identity_signature_keeps_offset() {
        let when = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2020, 7, 30, 7, 45, 50)
            .unwrap();
        let identity = Identity::new("John Doe", "john.doe@example.com", when);
        let sig = identity.to_git2_signature().unwrap();

        assert_eq!(sig.name(), Some("John Doe"));
        assert_eq!(sig.when().seconds(), 1596087950);
        assert_eq!(sig.when().offset_minutes(), 120);
    }
}
