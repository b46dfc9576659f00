//! `CoreMemory` — per-session conversation state (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry in `CoreMemory.history`.
///
/// Append-only within a session (§3 invariants). `turn_epoch` ties the
/// entry to the turn that produced it, so a cancelled turn's partial
/// history is clearly attributable (§4.4 ordering guarantees, §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub agent_name: String,
    pub role: Role,
    pub content: String,
    pub turn_epoch: u64,
    pub at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(agent_name: impl Into<String>, role: Role, content: impl Into<String>, turn_epoch: u64) -> Self {
        Self {
            agent_name: agent_name.into(),
            role,
            content: content.into(),
            turn_epoch,
            at: Utc::now(),
        }
    }
}

/// Policy for bounding `history` growth (§3: "size-capped, oldest-first
/// eviction permitted").
#[derive(Debug, Clone, Copy)]
pub struct HistoryPolicy {
    pub max_entries: usize,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self { max_entries: 200 }
    }
}

/// Per-session conversation state, persisted through `SessionStore` at
/// every turn boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreMemory {
    session_id: String,
    pub active_agent: String,
    pub history: Vec<HistoryEntry>,
    pub context: HashMap<String, Value>,
    pub latency_marks: HashMap<String, u64>,
    /// Monotonic version stamp for last-write-wins with a CAS escape hatch
    /// (§4.1 consistency).
    pub version: u64,
}

impl CoreMemory {
    pub fn new(session_id: impl Into<String>, entry_agent: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            active_agent: entry_agent.into(),
            history: Vec::new(),
            context: HashMap::new(),
            latency_marks: HashMap::new(),
            version: 0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn append_history(&mut self, entry: HistoryEntry, policy: HistoryPolicy) {
        self.history.push(entry);
        if self.history.len() > policy.max_entries {
            let overflow = self.history.len() - policy.max_entries;
            self.history.drain(0..overflow);
        }
    }

    /// `"greeted:<AgentName>" -> bool` flags live directly in `context`
    /// (§3); this is a typed accessor over that convention.
    pub fn has_greeted(&self, agent_name: &str) -> bool {
        self.context
            .get(&format!("greeted:{agent_name}"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn mark_greeted(&mut self, agent_name: &str) {
        self.context
            .insert(format!("greeted:{agent_name}"), Value::Bool(true));
    }

    pub fn set_voice_profile(&mut self, voice_name: &str, voice_style: &str, voice_rate: f32) {
        self.context
            .insert("voice_name".to_string(), Value::String(voice_name.to_string()));
        self.context
            .insert("voice_style".to_string(), Value::String(voice_style.to_string()));
        self.context.insert(
            "voice_rate".to_string(),
            serde_json::json!(voice_rate),
        );
    }

    pub fn record_latency(&mut self, label: &str, millis: u64) {
        self.latency_marks.insert(label.to_string(), millis);
    }

    pub fn bump_version(&mut self) {
        self.version += 1;
    }
}

/// Returned by a specialist handler or a tool call (spec §3).
///
/// Unknown fields are preserved through persistence via `extra`, so that a
/// specialist can stash domain-specific data without the core needing to
/// know its shape (§3: "Unknown fields must be preserved through
/// persistence").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff: Option<Handoff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_text: Option<String>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

impl ToolEnvelope {
    pub fn ok(assistant_text: impl Into<String>) -> Self {
        Self {
            success: true,
            assistant_text: Some(assistant_text.into()),
            ..Default::default()
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn handoff_to(mut self, target_agent: impl Into<String>, topic: impl Into<String>) -> Self {
        self.handoff = Some(Handoff::AiAgent);
        self.target_agent = Some(target_agent.into());
        self.topic = Some(topic.into());
        self
    }

    pub fn escalate(mut self, reason: impl Into<String>) -> Self {
        self.handoff = Some(Handoff::HumanAgent);
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Handoff {
    AiAgent,
    HumanAgent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_round_trip() {
        let json = serde_json::json!({
            "success": true,
            "handoff": "ai_agent",
            "target_agent": "Billing",
            "topic": "payments",
            "lead_score": 87
        });
        let env: ToolEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(env.extra.get("lead_score").unwrap(), &serde_json::json!(87));
        let back = serde_json::to_value(&env).unwrap();
        assert_eq!(back.get("lead_score").unwrap(), &serde_json::json!(87));
    }

    #[test]
    fn history_eviction_is_oldest_first() {
        let mut mem = CoreMemory::new("s1", "AuthAgent");
        let policy = HistoryPolicy { max_entries: 2 };
        mem.append_history(HistoryEntry::new("AuthAgent", Role::User, "one", 1), policy);
        mem.append_history(HistoryEntry::new("AuthAgent", Role::Assistant, "two", 1), policy);
        mem.append_history(HistoryEntry::new("AuthAgent", Role::User, "three", 2), policy);
        assert_eq!(mem.history.len(), 2);
        assert_eq!(mem.history[0].content, "two");
    }

    #[test]
    fn greeting_flags_round_trip() {
        let mut mem = CoreMemory::new("s1", "AuthAgent");
        assert!(!mem.has_greeted("Billing"));
        mem.mark_greeted("Billing");
        assert!(mem.has_greeted("Billing"));
    }
}
