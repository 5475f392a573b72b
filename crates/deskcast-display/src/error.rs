use thiserror::Error;

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("X11 connection error: {0}")]
    Connect(String),

    #[error("display capture error: {0}")]
    Capture(String),

    #[error("input injection error: {0}")]
    Input(String),
}
