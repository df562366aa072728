use serde::{Deserialize, Serialize};

/// Author of a conversation message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of the conversation with the assistant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// What the assistant knows about the user. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub name: Option<String>,
    pub age: Option<u32>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub goal: Option<String>,
    pub activity_level: Option<String>,
    pub dietary_restrictions: Vec<String>,
}

/// Foods recognized in a meal photo.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FoodAnalysis {
    pub ingredients: Vec<String>,
    pub confidence: f64,
    pub preparation: Vec<String>,
}

/// Point-in-time view of the gateway state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub active_requests: usize,
    pub peak_active_requests: usize,
    pub queued_requests: usize,
    pub cache_entries: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub breaker_open: bool,
    pub consecutive_failures: u32,
}
