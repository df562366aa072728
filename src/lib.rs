//! `dietai-http` is a resilient async client for the AI features of a diet
//! assistant, on top of an OpenAI-compatible chat completions API.
//!
//! Two operations are exposed:
//! - [`DietAiClient::chat_completion`]
//! - [`DietAiClient::analyze_image`]
//!
//! Both go through a [`Gateway`] that caches identical requests, queues calls
//! FIFO under a concurrency ceiling, retries with exponential backoff and
//! jitter, honors `Retry-After`, and stops calling a failing upstream through
//! a circuit breaker.

mod backoff;
mod breaker;
mod cache;
mod client;
pub mod clock;
mod decode;
mod dispatch;
mod error;
mod gateway;
mod image;
mod options;
mod prompt;
pub mod transport;
mod types;
mod wire;

#[cfg(feature = "raw-mode")]
pub mod raw;

pub use client::{base_url_to_completions_url, DietAiClient, OPENAI_BASE_URL};
pub use error::{DietAiError, InputRejection};
pub use gateway::Gateway;
pub use options::ClientOptions;
pub use types::{FoodAnalysis, GatewayStats, Message, Role, UserProfile};

pub type Result<T> = std::result::Result<T, DietAiError>;
