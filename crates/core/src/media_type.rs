//! Media type parsing and content negotiation.

use crate::error::{Error, Result};
use crate::format::{Format, SpecVersion};
use std::fmt;

const XML_TYPES: [&str; 3] = [
    "application/vnd.cyclonedx+xml",
    "text/xml",
    "application/xml",
];
const JSON_TYPES: [&str; 2] = ["application/vnd.cyclonedx+json", "application/json"];
const PROTOBUF_TYPES: [&str; 2] = [
    "application/x.vnd.cyclonedx+protobuf",
    "application/octet-stream",
];
const WILDCARDS: [&str; 2] = ["*/*", "application/*"];

/// A parsed document media type with an optional `version` parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MediaType {
    pub format: Format,
    pub spec_version: Option<SpecVersion>,
}

impl MediaType {
    pub fn new(format: Format, spec_version: Option<SpecVersion>) -> Self {
        Self {
            format,
            spec_version,
        }
    }

    /// Parse a single media type such as
    /// `application/vnd.cyclonedx+json; version=1.3`.
    ///
    /// Parameters other than `version` are ignored.
    pub fn parse(value: &str) -> Result<Self> {
        let mut parts = value.split(';');
        let base = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        let format = format_for(&base).ok_or_else(|| Error::UnsupportedMediaType(value.to_string()))?;

        let mut spec_version = None;
        for param in parts {
            let Some((key, raw)) = param.split_once('=') else {
                continue;
            };
            if key.trim().eq_ignore_ascii_case("version") {
                let raw = raw.trim().trim_matches('"');
                spec_version = Some(raw.parse::<SpecVersion>()?);
            }
        }

        Ok(Self {
            format,
            spec_version,
        })
    }

    /// The explicit version, or the newest the format supports.
    pub fn resolved_version(&self) -> SpecVersion {
        self.spec_version
            .unwrap_or_else(|| self.format.latest_supported())
    }

    /// The canonical product media type for a format, without parameters.
    pub fn base_for(format: Format) -> &'static str {
        match format {
            Format::Xml => XML_TYPES[0],
            Format::Json => JSON_TYPES[0],
            Format::Protobuf => PROTOBUF_TYPES[0],
        }
    }

    /// `<base>; version=<v>` for a concrete format and version.
    pub fn content_type(format: Format, spec_version: SpecVersion) -> String {
        format!("{}; version={}", Self::base_for(format), spec_version)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Self::base_for(self.format))?;
        if let Some(version) = self.spec_version {
            write!(f, "; version={version}")?;
        }
        Ok(())
    }
}

fn format_for(base: &str) -> Option<Format> {
    if XML_TYPES.contains(&base) {
        Some(Format::Xml)
    } else if JSON_TYPES.contains(&base) {
        Some(Format::Json)
    } else if PROTOBUF_TYPES.contains(&base) {
        Some(Format::Protobuf)
    } else {
        None
    }
}

/// One entry of an `Accept` list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcceptEntry {
    Any,
    Media(MediaType),
}

/// Parse an `Accept` header, keeping recognised entries in their given order.
///
/// Entries with an unknown base type or an unparseable version are skipped.
pub fn parse_accept(header: &str) -> Vec<AcceptEntry> {
    header
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let base = entry.split(';').next().unwrap_or_default().trim();
            if WILDCARDS.iter().any(|w| w.eq_ignore_ascii_case(base)) {
                return Some(AcceptEntry::Any);
            }
            MediaType::parse(entry).ok().map(AcceptEntry::Media)
        })
        .collect()
}

/// Choose the output `(format, version)` for a canonical document.
///
/// The first acceptable entry the codecs can produce wins. An empty header
/// or a wildcard selects JSON at the latest version.
pub fn negotiate_output(accept: &str) -> Result<(Format, SpecVersion)> {
    if accept.trim().is_empty() {
        return Ok((Format::Json, SpecVersion::LATEST));
    }
    parse_accept(accept)
        .into_iter()
        .find_map(|entry| match entry {
            AcceptEntry::Any => Some((Format::Json, SpecVersion::LATEST)),
            AcceptEntry::Media(media) => {
                let version = media.resolved_version();
                media
                    .format
                    .supports(version)
                    .then_some((media.format, version))
            }
        })
        .ok_or_else(|| Error::NotAcceptable(accept.to_string()))
}

/// Check an `Accept` header against a preserved original document.
///
/// The original is served byte-for-byte, so an entry matches only when it
/// names the product media type of the original's format and its version,
/// if given, equals the original's version. Aliases, wildcards and an empty
/// header are not acceptable.
pub fn negotiate_original(
    accept: &str,
    format: Format,
    spec_version: SpecVersion,
) -> Result<MediaType> {
    let product = MediaType::base_for(format);
    let acceptable = accept
        .split(',')
        .map(str::trim)
        .filter(|entry| {
            entry
                .split(';')
                .next()
                .is_some_and(|base| base.trim().eq_ignore_ascii_case(product))
        })
        .filter_map(|entry| MediaType::parse(entry).ok())
        .any(|media| media.spec_version.is_none_or(|v| v == spec_version));
    if acceptable {
        Ok(MediaType::new(format, Some(spec_version)))
    } else {
        Err(Error::NotAcceptable(accept.to_string()))
    }
}
