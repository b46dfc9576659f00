use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum AgentError {
    #[error("no agent named '{0}' is registered")]
    UnknownAgent(String),

    #[error("handler invocation exceeded its deadline")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, AgentError>;
