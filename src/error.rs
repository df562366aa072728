use std::fmt;

/// Error type returned by this crate.
///
/// `Display` renders a Portuguese message meant to be shown to the end user.
/// The variants carry the technical details for logging and matching.
#[derive(Debug, thiserror::Error)]
pub enum DietAiError {
    /// Input rejected locally before any network call.
    #[error("{0}")]
    InvalidInput(InputRejection),
    /// Upstream answered 401 or 403.
    #[error("Falha de autenticação com o serviço de IA. Verifique a chave da API.")]
    AuthFailure { status: u16, body: String },
    /// Upstream kept answering 429 after the retry budget was spent.
    #[error("Muitas solicitações ao serviço de IA. Aguarde alguns instantes e tente novamente.")]
    RateLimited { retry_after_ms: Option<u64> },
    /// Upstream kept answering with a non-success status after all retries.
    #[error("O serviço de IA está sobrecarregado no momento. Tente novamente mais tarde.")]
    Overloaded { status: u16, body: String },
    /// The circuit breaker is open; no request was sent.
    #[error("O serviço está temporariamente indisponível. Tente novamente em alguns instantes.")]
    ServiceUnavailable { retry_in_ms: u64 },
    /// Connection, DNS, reset or body transfer failure.
    #[error("Erro de conexão. Verifique sua internet e tente novamente.")]
    Network { message: String },
    /// The hard request deadline elapsed.
    #[error("O serviço de IA demorou demais para responder. Tente novamente.")]
    Timeout { after_ms: u64 },
    /// Response body could not be parsed or lacked expected fields.
    #[error("Não foi possível interpretar a resposta do serviço de IA.")]
    MalformedResponse { detail: String },
    /// Image analysis came back with a confidence under the accepted minimum.
    #[error("Não foi possível identificar os alimentos com segurança. Tente outra foto, com boa iluminação e o prato inteiro visível.")]
    LowConfidence { confidence: f64 },
}

impl DietAiError {
    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedResponse {
            detail: detail.into(),
        }
    }

    /// Whether a failed upstream call counts toward opening the circuit
    /// breaker. Credential problems and local rejections do not.
    ///
    /// Only errors of the call itself are checked here; a well-formed
    /// envelope that fails to decode never reaches the breaker.
    pub(crate) fn counts_as_upstream_failure(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::Overloaded { .. }
                | Self::Network { .. }
                | Self::Timeout { .. }
                | Self::MalformedResponse { .. }
        )
    }
}

/// Reason an input was rejected before reaching the network.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InputRejection {
    /// No image payload was provided.
    MissingImage,
    /// Data URI header missing or not JPEG/PNG.
    UnsupportedFormat,
    /// Payload is not valid base64.
    InvalidEncoding,
    /// Decoded image exceeds the upper size bound.
    TooLarge,
    /// Decoded image is below the lower size bound.
    TooSmall,
    /// Conversation has no message with text.
    EmptyConversation,
}

impl fmt::Display for InputRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::MissingImage => "Nenhuma imagem foi enviada. Tire ou selecione uma foto do prato.",
            Self::UnsupportedFormat => "Formato de imagem não suportado. Use fotos em JPEG ou PNG.",
            Self::InvalidEncoding => "A imagem está corrompida ou em um formato inválido.",
            Self::TooLarge => "A imagem é muito grande. O tamanho máximo é de 4 MB.",
            Self::TooSmall => "A imagem é muito pequena ou está vazia. Envie uma foto com mais qualidade.",
            Self::EmptyConversation => "Digite uma mensagem antes de enviar.",
        };
        f.write_str(message)
    }
}

impl From<InputRejection> for DietAiError {
    fn from(rejection: InputRejection) -> Self {
        Self::InvalidInput(rejection)
    }
}

#[cfg(test)]
mod tests {
    use super::{DietAiError, InputRejection};

    #[test]
    fn rejections_have_distinct_messages() {
        let all = [
            InputRejection::MissingImage,
            InputRejection::UnsupportedFormat,
            InputRejection::InvalidEncoding,
            InputRejection::TooLarge,
            InputRejection::TooSmall,
            InputRejection::EmptyConversation,
        ];
        let mut messages: Vec<String> = all.iter().map(ToString::to_string).collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), all.len());
    }

    #[test]
    fn display_does_not_leak_upstream_body() {
        let err = DietAiError::AuthFailure {
            status: 401,
            body: "invalid api key sk-123".to_owned(),
        };
        assert!(!err.to_string().contains("sk-123"));
    }

    #[test]
    fn only_upstream_failures_feed_the_breaker() {
        assert!(DietAiError::Timeout { after_ms: 1 }.counts_as_upstream_failure());
        assert!(DietAiError::Overloaded {
            status: 503,
            body: String::new()
        }
        .counts_as_upstream_failure());
        assert!(!DietAiError::AuthFailure {
            status: 403,
            body: String::new()
        }
        .counts_as_upstream_failure());
        assert!(DietAiError::malformed("invalid response JSON").counts_as_upstream_failure());
        assert!(!DietAiError::from(InputRejection::TooSmall).counts_as_upstream_failure());
        assert!(!DietAiError::LowConfidence { confidence: 0.2 }.counts_as_upstream_failure());
    }
}
