//! Response shape validation and final variant formatting.

use crate::repair::robust_parse;
use crate::text::preprocess_tts_text;
use crate::{Result, RewriteError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One rewritten caption/TTS pair. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    /// Rewritten TTS script; absent in caption-only jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts: Option<String>,

    /// Rewritten caption body
    pub caption: String,
}

/// Turn raw model output into exactly `k` finalized variants.
///
/// Repairs the JSON, validates the response shape against the requested
/// variant count, appends the preserved hashtag set to every caption and
/// normalizes TTS line breaks. Returns an error rather than ever padding or
/// silently under-delivering.
pub fn normalize_response(
    raw: &str,
    k: u32,
    tts_mode: bool,
    tags: &[String],
) -> Result<Vec<Variant>> {
    let data = robust_parse(raw)?;
    let variants = validate_shape(data, k, tts_mode)?;
    Ok(variants
        .into_iter()
        .map(|variant| finalize(variant, tags))
        .collect())
}

/// Validate the parsed response against the requested variant count.
pub fn validate_shape(data: Value, k: u32, tts_mode: bool) -> Result<Vec<Variant>> {
    let variants = if k == 1 {
        single_from(data)?
    } else {
        many_from(data, k as usize)?
    };

    if tts_mode {
        if let Some(missing) = variants.iter().position(|v| v.tts.is_none()) {
            return Err(RewriteError::Shape(format!(
                "variant {} is missing the \"tts\" field",
                missing + 1
            )));
        }
    }

    Ok(variants)
}

fn single_from(data: Value) -> Result<Vec<Variant>> {
    let Some(map) = data.as_object() else {
        return Err(RewriteError::Shape(format!(
            "expected a JSON object, got: {}",
            data
        )));
    };

    if map.contains_key("caption") || map.contains_key("tts") {
        let variant = parse_variant(data)?;
        return Ok(vec![variant]);
    }

    // A variants wrapper around a single object is tolerated; take the first.
    if let Some(Value::Array(items)) = map.get("variants") {
        if let Some(first) = items.first() {
            let variant = parse_variant(first.clone())?;
            return Ok(vec![variant]);
        }
    }

    Err(RewriteError::Shape(format!(
        "response is not a single variant object: {}",
        data
    )))
}

fn many_from(data: Value, k: usize) -> Result<Vec<Variant>> {
    let Some(items) = data.get("variants").and_then(Value::as_array) else {
        return Err(RewriteError::Shape(format!(
            "response should contain a \"variants\" array: {}",
            data
        )));
    };

    // An overlong array is trimmed; an underlong one is a hard failure.
    if items.len() < k {
        return Err(RewriteError::Shape(format!(
            "expected {} variants, got {}",
            k,
            items.len()
        )));
    }

    items
        .iter()
        .take(k)
        .map(|item| parse_variant(item.clone()))
        .collect()
}

fn parse_variant(value: Value) -> Result<Variant> {
    serde_json::from_value(value)
        .map_err(|e| RewriteError::Shape(format!("malformed variant: {}", e)))
}

/// Append the preserved hashtags and normalize TTS line breaks.
pub fn finalize(variant: Variant, tags: &[String]) -> Variant {
    let mut caption = variant.caption.trim().to_string();
    if !tags.is_empty() {
        caption = format!("{}\n{}", caption, tags.join(" ")).trim().to_string();
    }

    Variant {
        caption,
        tts: variant.tts.map(|t| preprocess_tts_text(t.trim())),
    }
}
