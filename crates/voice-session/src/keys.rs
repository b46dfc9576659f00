//! Hierarchical, colon-separated key schema (spec §4.1):
//! `{app}:{env}:{type}:{id}:{component}`.

#[derive(Debug, Clone)]
pub struct KeySchema {
    app: String,
    env: String,
}

impl KeySchema {
    pub fn new(app: impl Into<String>, env: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            env: env.into(),
        }
    }

    fn key(&self, kind: &str, session_id: &str, component: &str) -> String {
        format!("{}:{}:{}:{}:{}", self.app, self.env, kind, session_id, component)
    }

    pub fn session(&self, session_id: &str) -> String {
        self.key("session", session_id, "session")
    }

    pub fn history(&self, session_id: &str) -> String {
        self.key("session", session_id, "history")
    }

    pub fn lease(&self, session_id: &str) -> String {
        self.key("session", session_id, "lease")
    }

    pub fn archive(&self, session_id: &str) -> String {
        self.key("archive", session_id, "session")
    }
}

impl Default for KeySchema {
    fn default() -> Self {
        Self::new("voiceagent", "prod")
    }
}
