//! Document identifiers: serial numbers and CDX URNs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const URN_UUID_PREFIX: &str = "urn:uuid:";
const CDX_URN_PREFIX: &str = "urn:cdx:";

/// Checks the 8-4-4-4-12 lowercase hyphenated UUID form.
fn is_lowercase_hyphenated_uuid(s: &str) -> bool {
    if s.len() != 36 {
        return false;
    }
    let layout_ok = s.char_indices().all(|(i, c)| match i {
        8 | 13 | 18 | 23 => c == '-',
        _ => matches!(c, '0'..='9' | 'a'..='f'),
    });
    layout_ok && Uuid::try_parse(s).is_ok()
}

/// A document lineage key.
///
/// Either `urn:uuid:<uuid>` or `{<uuid>}`, with the UUID in lowercase
/// hyphenated form and no surrounding whitespace.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SerialNumber(String);

impl SerialNumber {
    /// Parse and validate a serial number.
    pub fn parse(value: &str) -> crate::Result<Self> {
        if Self::is_valid(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(crate::Error::InvalidSerialNumber(value.to_string()))
        }
    }

    pub fn is_valid(value: &str) -> bool {
        if let Some(uuid) = value.strip_prefix(URN_UUID_PREFIX) {
            return is_lowercase_hyphenated_uuid(uuid);
        }
        value
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .is_some_and(is_lowercase_hyphenated_uuid)
    }

    /// A fresh `urn:uuid:` serial number backed by a random UUID.
    pub fn generate() -> Self {
        Self(format!("{URN_UUID_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bare UUID portion, without prefix or braces.
    pub fn uuid(&self) -> &str {
        self.0
            .strip_prefix(URN_UUID_PREFIX)
            .or_else(|| {
                self.0
                    .strip_prefix('{')
                    .and_then(|rest| rest.strip_suffix('}'))
            })
            .unwrap_or(&self.0)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerialNumber({self})")
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SerialNumber {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        if Self::is_valid(&value) {
            Ok(Self(value))
        } else {
            Err(crate::Error::InvalidSerialNumber(value))
        }
    }
}

impl From<SerialNumber> for String {
    fn from(value: SerialNumber) -> Self {
        value.0
    }
}

/// A `(serial number, version)` pair addressing one stored document.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BomIdentifier {
    pub serial_number: String,
    pub version: u32,
}

impl BomIdentifier {
    pub fn new(serial_number: impl Into<String>, version: u32) -> Self {
        Self {
            serial_number: serial_number.into(),
            version,
        }
    }

    /// Render as `urn:cdx:<uuid>/<version>`.
    ///
    /// Returns `None` when the serial number is not a valid UUID-based serial.
    pub fn to_cdx_urn(&self) -> Option<String> {
        let serial = SerialNumber::parse(&self.serial_number).ok()?;
        Some(format!("{CDX_URN_PREFIX}{}/{}", serial.uuid(), self.version))
    }
}

impl fmt::Display for BomIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.serial_number, self.version)
    }
}

/// A parsed `urn:cdx:<uuid>/<version>` reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CdxUrn {
    serial_number: SerialNumber,
    version: u32,
}

impl CdxUrn {
    pub fn parse(urn: &str) -> crate::Result<Self> {
        let invalid = || crate::Error::InvalidUrn(urn.to_string());

        let rest = urn.strip_prefix(CDX_URN_PREFIX).ok_or_else(invalid)?;
        let (uuid, version) = rest.split_once('/').ok_or_else(invalid)?;
        if !is_lowercase_hyphenated_uuid(uuid) {
            return Err(invalid());
        }

        // Positive decimal without sign or leading zero.
        if version.is_empty()
            || version.starts_with('0')
            || !version.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let version: u32 = version.parse().map_err(|_| invalid())?;

        Ok(Self {
            serial_number: SerialNumber(format!("{URN_UUID_PREFIX}{uuid}")),
            version,
        })
    }

    /// The equivalent `urn:uuid:` serial number.
    pub fn serial_number(&self) -> &SerialNumber {
        &self.serial_number
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn into_identifier(self) -> BomIdentifier {
        BomIdentifier::new(self.serial_number.into_string(), self.version)
    }
}
