//! Logical key layout shared by every backend.
//!
//! ```text
//! storage-metadata
//! v1/{escaped serial}/{version}/bom.cdx
//! v1/{escaped serial}/{version}/bom.v{major}_{minor}.{format}
//! ```
//!
//! Keys always use `/` as separator; the filesystem backend maps them onto
//! path components.

use crate::error::{StorageError, StorageResult};
use bomrepo_core::{Format, SpecVersion};
use serde::{Deserialize, Serialize};

/// Layout version written into the storage metadata record.
pub const STORAGE_LAYOUT_VERSION: u32 = 1;

/// Key of the root-level storage metadata record.
pub const METADATA_KEY: &str = "storage-metadata";

/// File name of the canonical document inside a version namespace.
pub const CANONICAL_NAME: &str = "bom.cdx";

/// Persisted `{ "InternalStorageVersion": n }` record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageMetadata {
    #[serde(rename = "InternalStorageVersion")]
    pub internal_storage_version: u32,
}

impl StorageMetadata {
    pub fn current() -> Self {
        Self {
            internal_storage_version: STORAGE_LAYOUT_VERSION,
        }
    }

    pub fn to_bytes(self) -> StorageResult<Vec<u8>> {
        serde_json::to_vec(&self).map_err(|e| StorageError::Corrupt {
            key: METADATA_KEY.to_string(),
            message: e.to_string(),
        })
    }

    pub fn from_bytes(data: &[u8]) -> StorageResult<Self> {
        serde_json::from_slice(data).map_err(|e| StorageError::Corrupt {
            key: METADATA_KEY.to_string(),
            message: e.to_string(),
        })
    }

    /// Reject records written by a different layout version.
    pub fn ensure_supported(self) -> StorageResult<()> {
        if self.internal_storage_version != STORAGE_LAYOUT_VERSION {
            return Err(StorageError::UnsupportedLayout {
                found: self.internal_storage_version,
                supported: STORAGE_LAYOUT_VERSION,
            });
        }
        Ok(())
    }
}

/// Replace `:` with `_` so a serial number is a single valid key component.
pub fn escape_serial(serial_number: &str) -> String {
    serial_number.replace(':', "_")
}

/// Reverse of [`escape_serial`].
pub fn unescape_serial(escaped: &str) -> String {
    escaped.replace('_', ":")
}

/// Top-level directory holding every lineage for this layout version.
pub fn layout_root() -> String {
    format!("v{STORAGE_LAYOUT_VERSION}")
}

pub fn serial_prefix(serial_number: &str) -> String {
    format!("{}/{}", layout_root(), escape_serial(serial_number))
}

pub fn version_prefix(serial_number: &str, version: u32) -> String {
    format!("{}/{}", serial_prefix(serial_number), version)
}

pub fn canonical_key(serial_number: &str, version: u32) -> String {
    format!("{}/{}", version_prefix(serial_number, version), CANONICAL_NAME)
}

/// Spec version as it appears in original names: `v1_2`.
pub fn spec_token(spec_version: SpecVersion) -> String {
    format!("v{}", spec_version.as_str().replace('.', "_"))
}

pub fn original_name(format: Format, spec_version: SpecVersion) -> String {
    format!("bom.{}.{}", spec_token(spec_version), format.as_str())
}

pub fn original_key(
    serial_number: &str,
    version: u32,
    format: Format,
    spec_version: SpecVersion,
) -> String {
    format!(
        "{}/{}",
        version_prefix(serial_number, version),
        original_name(format, spec_version)
    )
}

/// Parse `bom.{spec}.{format}` back into its tags.
///
/// Accepts the `v1_2` token written by [`original_name`] and the dotted
/// `1.2` spelling. The tags are taken from the text between the first and
/// the last dot. Returns `None` for the canonical document and for names
/// that are not original documents.
pub fn parse_original_name(name: &str) -> Option<(Format, SpecVersion)> {
    if name == CANONICAL_NAME {
        return None;
    }
    let rest = name.strip_prefix("bom.")?;
    let (spec, format) = rest.rsplit_once('.')?;
    let spec_version = match spec.strip_prefix('v') {
        Some(token) => token.replace('_', ".").parse().ok()?,
        None => spec.parse().ok()?,
    };
    let format = format.parse().ok()?;
    Some((format, spec_version))
}

/// Parse a version namespace component (`"12"`), rejecting zero.
pub fn parse_version(component: &str) -> Option<u32> {
    component.parse::<u32>().ok().filter(|v| *v > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERIAL: &str = "urn:uuid:3e671687-395b-41f5-a30f-a58921a69b79";

    #[test]
    fn keys_follow_versioned_layout() {
        assert_eq!(
            canonical_key(SERIAL, 3),
            "v1/urn_uuid_3e671687-395b-41f5-a30f-a58921a69b79/3/bom.cdx"
        );
        assert_eq!(
            original_key(SERIAL, 1, Format::Xml, SpecVersion::V1_2),
            "v1/urn_uuid_3e671687-395b-41f5-a30f-a58921a69b79/1/bom.v1_2.xml"
        );
    }

    #[test]
    fn escape_is_reversible_for_urns() {
        let escaped = escape_serial(SERIAL);
        assert!(!escaped.contains(':'));
        assert_eq!(unescape_serial(&escaped), SERIAL);

        let braced = "{3e671687-395b-41f5-a30f-a58921a69b79}";
        assert_eq!(unescape_serial(&escape_serial(braced)), braced);
    }

    #[test]
    fn original_names_parse_back() {
        for format in Format::ALL {
            for spec in SpecVersion::ALL {
                let name = original_name(format, spec);
                assert_eq!(parse_original_name(&name), Some((format, spec)));
            }
        }
        assert_eq!(
            parse_original_name("bom.v1_2.xml"),
            Some((Format::Xml, SpecVersion::V1_2))
        );
        assert_eq!(original_name(Format::Xml, SpecVersion::V1_2), "bom.v1_2.xml");
        assert_eq!(
            parse_original_name("bom.1.3.json"),
            Some((Format::Json, SpecVersion::V1_3))
        );
        assert_eq!(parse_original_name("bom.cdx"), None);
        assert_eq!(parse_original_name("bom.9.9.xml"), None);
        assert_eq!(parse_original_name("bom.v9_9.xml"), None);
        assert_eq!(parse_original_name("bom.1.2.yaml"), None);
        assert_eq!(parse_original_name("notes.txt"), None);
    }

    #[test]
    fn metadata_record_uses_persisted_field_name() {
        let bytes = StorageMetadata::current().to_bytes().unwrap();
        assert_eq!(bytes, br#"{"InternalStorageVersion":1}"#);

        let parsed = StorageMetadata::from_bytes(br#"{"InternalStorageVersion":2}"#).unwrap();
        assert!(matches!(
            parsed.ensure_supported(),
            Err(StorageError::UnsupportedLayout {
                found: 2,
                supported: 1
            })
        ));
        assert!(matches!(
            StorageMetadata::from_bytes(b"garbage"),
            Err(StorageError::Corrupt { .. })
        ));
    }

    #[test]
    fn version_components_must_be_positive() {
        assert_eq!(parse_version("7"), Some(7));
        assert_eq!(parse_version("0"), None);
        assert_eq!(parse_version("x"), None);
    }
}
