//! Wire formats and schema specification versions.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Schema specification version of a document.
///
/// Variants are declared oldest first so that `Ord` follows release order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpecVersion {
    V1_0,
    V1_1,
    V1_2,
    V1_3,
    V1_4,
}

impl SpecVersion {
    /// The version used for the canonical stored form.
    pub const LATEST: SpecVersion = SpecVersion::V1_4;

    /// The oldest version any codec can produce.
    pub const OLDEST: SpecVersion = SpecVersion::V1_0;

    /// Every known version, oldest first.
    pub const ALL: [SpecVersion; 5] = [
        SpecVersion::V1_0,
        SpecVersion::V1_1,
        SpecVersion::V1_2,
        SpecVersion::V1_3,
        SpecVersion::V1_4,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1_0 => "1.0",
            Self::V1_1 => "1.1",
            Self::V1_2 => "1.2",
            Self::V1_3 => "1.3",
            Self::V1_4 => "1.4",
        }
    }

    /// The version released immediately before this one.
    pub fn previous(self) -> Option<SpecVersion> {
        match self {
            Self::V1_0 => None,
            Self::V1_1 => Some(Self::V1_0),
            Self::V1_2 => Some(Self::V1_1),
            Self::V1_3 => Some(Self::V1_2),
            Self::V1_4 => Some(Self::V1_3),
        }
    }
}

impl fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpecVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SpecVersion::ALL
            .into_iter()
            .find(|v| v.as_str() == s.trim())
            .ok_or_else(|| Error::InvalidSpecVersion(s.to_string()))
    }
}

impl Serialize for SpecVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SpecVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Wire encoding of a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Format {
    /// Markup-tree encoding.
    Xml,
    /// JSON-tree encoding.
    Json,
    /// Compact binary encoding.
    Protobuf,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::Xml, Format::Json, Format::Protobuf];

    /// Lowercase name, as used in original-document key suffixes.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::Json => "json",
            Self::Protobuf => "protobuf",
        }
    }

    /// Oldest specification version this format can carry.
    pub fn oldest_supported(self) -> SpecVersion {
        match self {
            Self::Xml => SpecVersion::V1_0,
            Self::Json => SpecVersion::V1_2,
            Self::Protobuf => SpecVersion::V1_3,
        }
    }

    pub fn latest_supported(self) -> SpecVersion {
        SpecVersion::LATEST
    }

    pub fn supports(self, version: SpecVersion) -> bool {
        version >= self.oldest_supported() && version <= self.latest_supported()
    }

    /// Fails with [`Error::UnsupportedCombination`] when `version` is out of range.
    pub fn ensure_supports(self, version: SpecVersion) -> Result<()> {
        if self.supports(version) {
            Ok(())
        } else {
            Err(Error::UnsupportedCombination {
                format: self,
                spec_version: version,
            })
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Format::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnsupportedFormat(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_versions_are_release_ordered() {
        assert!(SpecVersion::V1_0 < SpecVersion::V1_4);
        assert_eq!(SpecVersion::LATEST.previous(), Some(SpecVersion::V1_3));
        assert_eq!(SpecVersion::OLDEST.previous(), None);
    }

    #[test]
    fn spec_version_parse_and_display() {
        assert_eq!("1.2".parse::<SpecVersion>().unwrap(), SpecVersion::V1_2);
        assert_eq!(SpecVersion::V1_3.to_string(), "1.3");
        assert!("1.5".parse::<SpecVersion>().is_err());
        assert!("".parse::<SpecVersion>().is_err());
    }

    #[test]
    fn format_parse_is_case_insensitive() {
        assert_eq!("XML".parse::<Format>().unwrap(), Format::Xml);
        assert_eq!("Protobuf".parse::<Format>().unwrap(), Format::Protobuf);
        assert!("yaml".parse::<Format>().is_err());
    }

    #[test]
    fn format_version_ranges() {
        assert!(Format::Xml.supports(SpecVersion::V1_0));
        assert!(!Format::Json.supports(SpecVersion::V1_1));
        assert!(Format::Json.supports(SpecVersion::V1_2));
        assert!(!Format::Protobuf.supports(SpecVersion::V1_2));
        assert!(Format::Protobuf.supports(SpecVersion::V1_4));

        match Format::Protobuf.ensure_supports(SpecVersion::V1_0) {
            Err(Error::UnsupportedCombination { format, spec_version }) => {
                assert_eq!(format, Format::Protobuf);
                assert_eq!(spec_version, SpecVersion::V1_0);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
