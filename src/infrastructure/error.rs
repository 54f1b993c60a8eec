use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Invalid act: {0}")]
    InvalidAct(String),
    #[error("Invalid calendar event: {0}")]
    InvalidEvent(String),
    #[error("Calendar access denied")]
    CalendarAccessDenied,
    #[error("Calendar fetch failed: {0}")]
    CalendarFetch(String),
}
