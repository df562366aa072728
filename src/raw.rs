//! Raw completion passthrough types.
//!
//! Enabled with the `raw-mode` feature.

/// Response envelope exactly as returned by the upstream API.
#[derive(Clone, Debug, PartialEq)]
pub struct RawCompletion(pub serde_json::Value);

impl RawCompletion {
    /// Text of the first choice, if any.
    pub fn first_content(&self) -> Option<&str> {
        self.0
            .get("choices")?
            .get(0)?
            .get("message")?
            .get("content")?
            .as_str()
    }
}
