//! JSON-tree codec.

use crate::error::{Error, Result};
use crate::format::Format;
use crate::model::Bom;
use serde::{Deserialize, Serialize};

const BOM_FORMAT: &str = "CycloneDX";

#[derive(Serialize)]
struct JsonBomOut<'a> {
    #[serde(rename = "bomFormat")]
    bom_format: &'static str,
    #[serde(flatten)]
    bom: &'a Bom,
}

#[derive(Deserialize)]
struct JsonBomIn {
    #[serde(rename = "bomFormat")]
    bom_format: String,
    #[serde(flatten)]
    bom: Bom,
}

pub fn encode(bom: &Bom) -> Result<Vec<u8>> {
    let envelope = JsonBomOut {
        bom_format: BOM_FORMAT,
        bom,
    };
    serde_json::to_vec_pretty(&envelope).map_err(|e| Error::encode(Format::Json, e))
}

pub fn decode(data: &[u8]) -> Result<Bom> {
    let envelope: JsonBomIn =
        serde_json::from_slice(data).map_err(|e| Error::decode(Format::Json, e))?;
    if envelope.bom_format != BOM_FORMAT {
        return Err(Error::decode(
            Format::Json,
            format!("unexpected bomFormat {:?}", envelope.bom_format),
        ));
    }
    Ok(envelope.bom)
}
