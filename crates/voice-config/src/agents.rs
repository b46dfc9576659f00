//! Loads the `AgentSpec` roster from a directory of YAML files and resolves
//! the entry agent (spec §4.2 "frozen after startup").

use std::fs;
use std::path::Path;

use voice_core::AgentSpec;

use crate::ConfigError;

/// The loaded roster plus the resolved entry agent name.
#[derive(Debug, Clone)]
pub struct AgentRoster {
    pub agents: Vec<AgentSpec>,
    pub entry_agent: String,
}

/// Reads every `*.yaml` / `*.yml` file directly under `dir`, parses each as
/// an `AgentSpec`, and resolves the entry agent.
///
/// `entry_agent` is the `ENTRY_AGENT` setting; when absent, the first agent
/// in lexical filename order is treated as the entry agent, matching the
/// "coerced to auth agent if unset" fallback in spec §6.
pub fn load_agent_roster(
    dir: impl AsRef<Path>,
    entry_agent: Option<&str>,
) -> Result<AgentRoster, ConfigError> {
    let dir = dir.as_ref();
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("yaml") | Some("yml")
            )
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(ConfigError::MissingField(format!(
            "no agent specification files found under {}",
            dir.display()
        )));
    }

    let mut agents = Vec::with_capacity(paths.len());
    for path in &paths {
        let raw = fs::read_to_string(path)?;
        let spec: AgentSpec = serde_yaml::from_str(&raw)?;
        agents.push(spec);
    }

    let resolved_entry = match entry_agent {
        Some(name) if agents.iter().any(|a| a.name == name) => name.to_string(),
        Some(name) => {
            return Err(ConfigError::InvalidValue {
                field: "session.entry_agent".to_string(),
                message: format!("no agent named '{name}' in roster"),
            })
        }
        None => agents[0].name.clone(),
    };

    Ok(AgentRoster {
        agents,
        entry_agent: resolved_entry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_agent(dir: &Path, filename: &str, name: &str) {
        let yaml = format!(
            "name: {name}\nmodel:\n  deployment_id: gpt-4o-mini\nvoice:\n  name: en-US-JennyNeural\nprompts:\n  path: prompts/{name}.md\n"
        );
        fs::write(dir.join(filename), yaml).unwrap();
    }

    #[test]
    fn resolves_explicit_entry_agent() {
        let dir = tempfile::tempdir().unwrap();
        write_agent(dir.path(), "a_billing.yaml", "Billing");
        write_agent(dir.path(), "b_auth.yaml", "Auth");

        let roster = load_agent_roster(dir.path(), Some("Auth")).unwrap();
        assert_eq!(roster.entry_agent, "Auth");
        assert_eq!(roster.agents.len(), 2);
    }

    #[test]
    fn falls_back_to_first_in_lexical_order() {
        let dir = tempfile::tempdir().unwrap();
        write_agent(dir.path(), "a_billing.yaml", "Billing");
        write_agent(dir.path(), "b_auth.yaml", "Auth");

        let roster = load_agent_roster(dir.path(), None).unwrap();
        assert_eq!(roster.entry_agent, "Billing");
    }

    #[test]
    fn unknown_entry_agent_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_agent(dir.path(), "a_billing.yaml", "Billing");

        let result = load_agent_roster(dir.path(), Some("Nonexistent"));
        assert!(result.is_err());
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_agent_roster(dir.path(), None).is_err());
    }
}
