use crate::{Result, error::Error};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

/// Key of the alias table.
///
/// Card UIDs are stored as uppercase hex; scanner payloads are stored
/// exactly as read after trimming. Both share one key space, so a barcode
/// whose text equals a card UID resolves to the same alias entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Create an identifier from text supplied by an observer.
    ///
    /// The text is kept verbatim; only the empty string is rejected.
    ///
    /// # Errors
    /// Returns `Error::EmptyIdentifier` if `raw` is empty.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(Error::EmptyIdentifier);
        }
        Ok(Self(raw))
    }

    /// Build the identifier for a card from its raw UID bytes.
    ///
    /// ```
    /// use tagbridge_core::Identifier;
    ///
    /// let id = Identifier::from_card_uid(&[0xa1, 0xb2, 0xc3]).unwrap();
    /// assert_eq!(id.as_str(), "A1B2C3");
    /// ```
    ///
    /// # Errors
    /// Returns `Error::InvalidCardUid` if `uid` is empty.
    pub fn from_card_uid(uid: &[u8]) -> Result<Self> {
        if uid.is_empty() {
            return Err(Error::InvalidCardUid("empty UID".to_string()));
        }
        Ok(Self(uid.iter().map(|b| format!("{:02X}", b)).collect()))
    }

    /// Build the identifier for one line read from the barcode scanner.
    ///
    /// Surrounding whitespace and NUL characters are stripped; case is
    /// preserved. Returns `None` when nothing is left.
    ///
    /// ```
    /// use tagbridge_core::Identifier;
    ///
    /// assert_eq!(Identifier::from_scan(" abc123\r").unwrap().as_str(), "abc123");
    /// assert!(Identifier::from_scan("\u{0}\u{0}").is_none());
    /// ```
    pub fn from_scan(line: &str) -> Option<Self> {
        let trimmed = line.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for Identifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Identifier::new(s)
    }
}

/// Identifier → alias mapping. Absence of a key means the token is unnamed.
pub type AliasTable = BTreeMap<Identifier, String>;

/// Device family that produced an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Contactless card reader.
    Card,
    /// Serial barcode scanner.
    Scanner,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Card => write!(f, "card"),
            Source::Scanner => write!(f, "scanner"),
        }
    }
}

/// A token was presented to one of the devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedEvent {
    pub identifier: Identifier,
    pub source: Source,
    /// Alias known for the identifier at the moment it was observed.
    pub known_name: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl ObservedEvent {
    pub fn new(identifier: Identifier, source: Source, known_name: Option<String>) -> Self {
        Self {
            identifier,
            source,
            known_name,
            observed_at: Utc::now(),
        }
    }
}

/// Read-only view of the alias table handed to device adapters.
pub trait AliasLookup: Send + Sync {
    /// Current alias for `identifier`, if any.
    fn lookup(&self, identifier: &Identifier) -> Option<String>;
}

impl AliasLookup for AliasTable {
    fn lookup(&self, identifier: &Identifier) -> Option<String> {
        self.get(identifier).cloned()
    }
}
