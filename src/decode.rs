use serde_json::Value;

use crate::{
    wire::{ChatResponse, FoodAnalysisPayload},
    DietAiError, FoodAnalysis,
};

pub(crate) const DEFAULT_CONFIDENCE: f64 = 0.7;

/// Extracts `choices[0].message.content` as non-blank text.
pub(crate) fn decode_completion_text(envelope: Value) -> Result<String, DietAiError> {
    let response: ChatResponse = serde_json::from_value(envelope)
        .map_err(|err| DietAiError::malformed(format!("invalid completion envelope: {err}")))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| DietAiError::malformed("completion has no choices"))?;
    let content = choice
        .message
        .content
        .ok_or_else(|| DietAiError::malformed("completion message has no content"))?;

    let content = content.trim();
    if content.is_empty() {
        return Err(DietAiError::malformed("completion content is empty"));
    }
    Ok(content.to_owned())
}

/// Parses and validates the structured food analysis.
pub(crate) fn decode_food_analysis(
    envelope: Value,
    min_confidence: f64,
) -> Result<FoodAnalysis, DietAiError> {
    let text = decode_completion_text(envelope)?;
    let json = strip_code_fence(&text);
    let payload: FoodAnalysisPayload = serde_json::from_str(json)
        .map_err(|err| DietAiError::malformed(format!("invalid analysis JSON: {err}")))?;

    let ingredients: Vec<String> = payload
        .ingredients
        .ok_or_else(|| DietAiError::malformed("analysis is missing `ingredients`"))?
        .into_iter()
        .map(|item| item.trim().to_owned())
        .filter(|item| !item.is_empty())
        .collect();
    if ingredients.is_empty() {
        return Err(DietAiError::malformed("analysis has no ingredients"));
    }

    let confidence = payload.confidence.unwrap_or(DEFAULT_CONFIDENCE);
    if !(0.0..=1.0).contains(&confidence) {
        return Err(DietAiError::malformed(format!(
            "confidence {confidence} is outside [0, 1]"
        )));
    }
    if confidence < min_confidence {
        return Err(DietAiError::LowConfidence { confidence });
    }

    let preparation = payload
        .preparation
        .unwrap_or_default()
        .into_iter()
        .map(|item| item.trim().to_owned())
        .filter(|item| !item.is_empty())
        .collect();

    Ok(FoodAnalysis {
        ingredients,
        confidence,
        preparation,
    })
}

/// Unwraps a Markdown code fence (optionally tagged `json`) if present.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    let inner = inner
        .strip_prefix("json")
        .or_else(|| inner.strip_prefix("JSON"))
        .unwrap_or(inner);
    inner.trim()
}
