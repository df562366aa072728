use std::{fmt, sync::Arc};

use crate::{
    clock::{Clock, SystemClock},
    decode::{decode_completion_text, decode_food_analysis},
    gateway::Gateway,
    image::validate_image,
    prompt::{build_chat_request, build_vision_request},
    transport::{ReqwestTransport, Transport},
    wire::ChatRequest,
    ClientOptions, DietAiError, FoodAnalysis, GatewayStats, Message, Result, UserProfile,
};

/// Default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Formats a base URL into the chat completions endpoint.
///
/// Example: `"https://api.openai.com/"` → `"https://api.openai.com/v1/chat/completions"`
pub fn base_url_to_completions_url(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.ends_with("/chat/completions") {
        return trimmed.to_owned();
    }
    if trimmed.ends_with("/v1") {
        return format!("{trimmed}/chat/completions");
    }
    format!("{trimmed}/v1/chat/completions")
}

#[derive(Clone)]
/// Diet assistant client: chat and meal photo analysis behind a resilient
/// gateway.
///
/// Clones share the same cache, queue and circuit breaker.
pub struct DietAiClient {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    gateway: Arc<Gateway>,
}

impl fmt::Debug for DietAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DietAiClient")
            .field("transport", &self.transport)
            .field("options", self.gateway.options())
            .finish()
    }
}

impl DietAiClient {
    /// Creates a client with a raw authorization header value.
    ///
    /// `base_url` may be the API root (`https://api.openai.com`), the `/v1`
    /// prefix or the full completions endpoint.
    pub fn new(base_url: impl AsRef<str>, authorization: impl Into<String>) -> Self {
        let url = base_url_to_completions_url(base_url.as_ref());
        Self::with_transport(Arc::new(ReqwestTransport::new(url, authorization)))
    }

    /// Creates a client from an API key.
    ///
    /// If the key is missing the `Bearer ` prefix, it is added automatically.
    pub fn new_bearer(base_url: impl AsRef<str>, api_key: impl AsRef<str>) -> Self {
        let authorization = normalize_bearer_authorization(api_key.as_ref());
        Self::new(base_url, authorization)
    }

    /// Creates a client for the public OpenAI API.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dietai_http::DietAiClient;
    ///
    /// let client = DietAiClient::openai("sk-...");
    /// ```
    pub fn openai(api_key: impl AsRef<str>) -> Self {
        Self::new_bearer(OPENAI_BASE_URL, api_key)
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `DIETAI_API_KEY`: API key (Bearer prefix optional)
    /// - `DIETAI_BASE_URL`: optional, defaults to the OpenAI API
    ///
    /// Returns an error if the key is missing or empty.
    pub fn from_env() -> std::result::Result<Self, String> {
        let api_key = std::env::var("DIETAI_API_KEY")
            .map_err(|_| "missing DIETAI_API_KEY environment variable".to_owned())?;
        if api_key.trim().is_empty() {
            return Err("DIETAI_API_KEY is set but empty".to_owned());
        }
        let base_url = match std::env::var("DIETAI_BASE_URL") {
            Ok(url) if url.trim().is_empty() => {
                return Err("DIETAI_BASE_URL is set but empty".to_owned())
            }
            Ok(url) => url,
            Err(_) => OPENAI_BASE_URL.to_owned(),
        };
        Ok(Self::new_bearer(base_url, api_key))
    }

    /// Creates a client on top of a custom transport.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let gateway = Arc::new(Gateway::new(
            Arc::clone(&transport),
            Arc::clone(&clock),
            ClientOptions::default(),
        ));
        Self {
            transport,
            clock,
            gateway,
        }
    }

    /// Applies client options.
    ///
    /// Rebuilds the gateway, so cached responses and breaker state are reset.
    pub fn with_options(self, opts: ClientOptions) -> Self {
        let clock = Arc::clone(&self.clock);
        self.rebuild(opts, clock)
    }

    /// Replaces the time source used for cache expiry and breaker cooldowns.
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        let opts = self.gateway.options().clone();
        self.rebuild(opts, clock)
    }

    pub fn options(&self) -> &ClientOptions {
        self.gateway.options()
    }

    /// Asks the nutrition assistant for the next reply in a conversation.
    pub async fn chat_completion(
        &self,
        messages: &[Message],
        profile: &UserProfile,
    ) -> Result<String> {
        let request = build_chat_request(messages, profile, self.gateway.options())?;
        self.gateway
            .send_with(to_body(&request)?, decode_completion_text)
            .await
    }

    /// Identifies the foods in a meal photo given as a JPEG/PNG data URI.
    ///
    /// The image is validated locally first; invalid images never reach the
    /// network or the queue.
    pub async fn analyze_image(&self, image_data: &str) -> Result<FoodAnalysis> {
        let image = validate_image(image_data)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(bytes = image.decoded_len, kind = ?image.kind, "analyzing meal photo");

        let request = build_vision_request(&image, self.gateway.options());
        let min_confidence = self.gateway.options().min_confidence;
        self.gateway
            .send_with(to_body(&request)?, move |envelope| {
                decode_food_analysis(envelope, min_confidence)
            })
            .await
    }

    /// Sends a caller-built request body through the gateway and returns the
    /// untouched response envelope.
    #[cfg(feature = "raw-mode")]
    pub async fn complete_raw(&self, body: serde_json::Value) -> Result<crate::raw::RawCompletion> {
        self.gateway
            .send(body)
            .await
            .map(crate::raw::RawCompletion)
    }

    /// Snapshot of the queue, cache and circuit breaker.
    pub fn stats(&self) -> GatewayStats {
        self.gateway.stats()
    }

    /// Drops every cached response.
    pub fn clear_cache(&self) {
        self.gateway.clear_cache();
    }

    fn rebuild(self, opts: ClientOptions, clock: Arc<dyn Clock>) -> Self {
        let gateway = Arc::new(Gateway::new(
            Arc::clone(&self.transport),
            Arc::clone(&clock),
            opts,
        ));
        Self {
            transport: self.transport,
            clock,
            gateway,
        }
    }
}

fn to_body(request: &ChatRequest) -> Result<serde_json::Value> {
    serde_json::to_value(request)
        .map_err(|err| DietAiError::malformed(format!("request could not be encoded: {err}")))
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::{base_url_to_completions_url, normalize_bearer_authorization, DietAiClient};

    #[test]
    fn normalize_bearer_adds_prefix_when_missing() {
        assert_eq!(
            normalize_bearer_authorization("sk-abc123"),
            "Bearer sk-abc123".to_owned()
        );
    }

    #[test]
    fn normalize_bearer_keeps_existing_prefix() {
        assert_eq!(
            normalize_bearer_authorization("bEaReR sk-abc123"),
            "bEaReR sk-abc123".to_owned()
        );
    }

    #[test]
    fn completions_url_from_any_base() {
        for base in [
            "https://api.openai.com",
            "https://api.openai.com/",
            "https://api.openai.com/v1",
            "https://api.openai.com/v1/chat/completions",
        ] {
            assert_eq!(
                base_url_to_completions_url(base),
                "https://api.openai.com/v1/chat/completions"
            );
        }
    }

    #[test]
    fn debug_redacts_authorization_value() {
        let client = DietAiClient::new_bearer("https://api.example", "sk-secret-token");
        let debug = format!("{client:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("sk-secret-token"));
    }
}
