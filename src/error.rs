use thiserror::Error;

#[derive(Debug, Error)]
pub enum CharmError {
    /// A subprocess could not be spawned, exited non-zero, or printed
    /// something we could not make sense of.
    #[error("command `{command}` failed: {reason}")]
    ExternalCommand { command: String, reason: String },

    #[error("invalid action parameters: {0}")]
    InvalidParams(String),

    #[error("{0} must run on the leader unit")]
    NotLeader(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CharmError {
    pub fn external(command: impl ToString, reason: impl ToString) -> Self {
        Self::ExternalCommand {
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CharmError>;
