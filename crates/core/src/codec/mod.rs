//! Format codecs and the output conversion path.
//!
//! Every codec decodes into the version-agnostic [`Bom`] model and encodes
//! from it. The output path narrows the canonical document with the
//! downgrade chain before handing it to the codec for the requested format.

pub mod json;
pub mod protobuf;
pub mod xml;

use crate::downgrade::downgrade;
use crate::error::Result;
use crate::format::{Format, SpecVersion};
use crate::model::Bom;

/// Format of the canonical stored form.
pub const CANONICAL_FORMAT: Format = Format::Protobuf;

/// Decode a document submitted in `format`.
///
/// The specification version is taken from the document itself and must be
/// one the format can carry.
pub fn decode(data: &[u8], format: Format) -> Result<Bom> {
    let bom = match format {
        Format::Xml => xml::decode(data)?,
        Format::Json => json::decode(data)?,
        Format::Protobuf => protobuf::decode(data)?,
    };
    format.ensure_supports(bom.spec_version)?;
    Ok(bom)
}

/// Render `bom` as `format` at `spec_version`, downgrading as needed.
pub fn encode(bom: &Bom, format: Format, spec_version: SpecVersion) -> Result<Vec<u8>> {
    format.ensure_supports(spec_version)?;
    let narrowed = downgrade(bom.clone(), spec_version)?;
    encode_exact(&narrowed, format)
}

/// Encode without any version conversion.
fn encode_exact(bom: &Bom, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Xml => xml::encode(bom),
        Format::Json => json::encode(bom),
        Format::Protobuf => protobuf::encode(bom),
    }
}

/// Encode the canonical stored form: compact binary at the latest version.
///
/// The model is a superset of every older version, so a document decoded
/// from an older submission is lifted by relabelling its version.
pub fn encode_canonical(bom: &Bom) -> Result<Vec<u8>> {
    let mut canonical = bom.clone();
    canonical.spec_version = SpecVersion::LATEST;
    encode_exact(&canonical, CANONICAL_FORMAT)
}

pub fn decode_canonical(data: &[u8]) -> Result<Bom> {
    protobuf::decode(data)
}
