//! YAML-sourced agent specification (spec §3 "Agent specification").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub deployment_id: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    512
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSpec {
    pub name: String,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default = "default_rate")]
    pub rate: f32,
}

fn default_style() -> String {
    "neutral".to_string()
}

fn default_rate() -> f32 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsSpec {
    pub path: String,
}

/// One entry of `agents.yaml`, loaded once at startup and handed to the
/// `AgentRegistry` (spec §3, §4.2, §9 "frozen after startup").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub model: ModelSpec,
    pub voice: VoiceSpec,
    pub prompts: PromptsSpec,
    #[serde(default)]
    pub tools: Vec<String>,
    /// First-time greeting spoken on handoff into this agent (§4.5 step 4).
    #[serde(default)]
    pub greeting: Option<String>,
    /// Brief re-entry phrase spoken on repeat handoff within a session.
    #[serde(default)]
    pub reentry_phrase: Option<String>,
}
