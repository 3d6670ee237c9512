//! Worker output assembly
//!
//! Workers key their output by image file name (`"3.jpg"`). Results are
//! put back into input order using the number before the first `.`.

use serde_json::{Map, Value};

use super::types::OcrResult;
use super::worker::WorkerOutput;
use crate::error::{GatewayError, Result};

/// Order worker output by image index and merge metadata
pub fn assemble_results(
    output: WorkerOutput,
    image_count: usize,
    omit_meta: bool,
) -> Result<Vec<OcrResult>> {
    let (text, filled) = index_mapping(output.text, image_count, "text")?;
    if filled != image_count {
        return Err(GatewayError::OutputParseError(format!(
            "Expected {} results, worker returned {}",
            image_count, filled
        )));
    }

    let meta = match output.meta {
        _ if omit_meta => vec![None; image_count],
        Some(Value::Null) | None => vec![None; image_count],
        Some(value) => index_mapping(value, image_count, "meta")?.0,
    };

    text.into_iter()
        .zip(meta)
        .enumerate()
        .map(|(index, (text, meta))| {
            let text = match text {
                Some(Value::String(text)) => text,
                Some(_) => {
                    return Err(GatewayError::OutputParseError(format!(
                        "Text for image {} is not a string",
                        index
                    )))
                }
                None => {
                    return Err(GatewayError::OutputParseError(format!(
                        "Missing text for image {}",
                        index
                    )))
                }
            };

            let meta = match meta {
                None => Map::new(),
                Some(Value::Object(meta)) => meta,
                Some(_) => {
                    return Err(GatewayError::OutputParseError(format!(
                        "Meta for image {} is not an object",
                        index
                    )))
                }
            };

            Ok(OcrResult { text, meta })
        })
        .collect()
}

/// Turn a `name -> value` object into a vector indexed by image number
///
/// Returns the slots along with how many of them were filled.
fn index_mapping(
    value: Value,
    image_count: usize,
    what: &str,
) -> Result<(Vec<Option<Value>>, usize)> {
    let entries = match value {
        Value::Object(entries) => entries,
        _ => {
            return Err(GatewayError::OutputParseError(format!(
                "Worker {} output is not an object",
                what
            )))
        }
    };

    let mut slots: Vec<Option<Value>> = vec![None; image_count];
    let mut filled = 0;
    for (name, value) in entries {
        let index = parse_index(&name)?;
        let slot = slots.get_mut(index).ok_or_else(|| {
            GatewayError::OutputParseError(format!(
                "Index {} out of range for {} images",
                index, image_count
            ))
        })?;
        if slot.is_some() {
            return Err(GatewayError::OutputParseError(format!(
                "Duplicate {} entry for image {}",
                what, index
            )));
        }
        *slot = Some(value);
        filled += 1;
    }

    Ok((slots, filled))
}

fn parse_index(name: &str) -> Result<usize> {
    let stem = name.split('.').next().unwrap_or(name);
    stem.parse().map_err(|_| {
        GatewayError::OutputParseError(format!("Output name {:?} has no numeric index", name))
    })
}
