use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ObtestError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to start server: {0}")]
    Start(String),

    #[error("Server exited during startup with code {code:?}")]
    Exited { code: Option<i32> },

    #[error("Server not ready after {waited:?}")]
    NotReady { waited: Duration },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Poll timeout after {0:?}")]
    ProtocolTimeout(Duration),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Transcript mismatch: {0}")]
    CompareMismatch(String),

    #[error("Case did not finish within {0:?}")]
    CaseTimeout(Duration),

    #[error("Build failed ({} diagnostic lines)", diagnostics.len())]
    Build { diagnostics: Vec<String> },
}

/// Script-level failures raised by the command interpreter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Found empty connection name")]
    EmptyName,

    #[error("Connection with name {0} already exists")]
    DuplicateConnection(String),

    #[error("No such connection named {0}")]
    UnknownConnection(String),

    #[error("No such command {0}")]
    UnknownCommand(String),
}

impl ObtestError {
    /// True for both the per-read socket budget and the whole-case deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ObtestError::ProtocolTimeout(_) | ObtestError::CaseTimeout(_)
        )
    }

    /// Errors that end a single case without taking the run down with it.
    pub fn is_case_local(&self) -> bool {
        matches!(
            self,
            ObtestError::Connection(_)
                | ObtestError::ProtocolTimeout(_)
                | ObtestError::Command(_)
                | ObtestError::CompareMismatch(_)
                | ObtestError::CaseTimeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ObtestError>;
