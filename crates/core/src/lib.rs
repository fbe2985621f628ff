//! Core domain types and shared logic for the BOM repository.
//!
//! This crate defines the data model used across all other crates:
//! - Document model and schema specification versions
//! - Serial numbers and CDX URN identifiers
//! - Media types and content negotiation
//! - Format codecs and the schema downgrade chain
//! - Configuration

pub mod codec;
pub mod config;
pub mod downgrade;
pub mod error;
pub mod format;
pub mod media_type;
pub mod model;
pub mod serial;

pub use error::{Error, Result};
pub use format::{Format, SpecVersion};
pub use media_type::MediaType;
pub use model::Bom;
pub use serial::{BomIdentifier, CdxUrn, SerialNumber};
