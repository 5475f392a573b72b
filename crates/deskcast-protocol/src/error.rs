use thiserror::Error;

/// Error type shared across every deskcast crate.
///
/// Each producer loop matches on this only to decide whether a failure is
/// fatal to that loop; there is no retry logic anywhere in this enum's
/// consumers.
#[derive(Debug, Error)]
pub enum DeskcastError {
    #[error("display capture error: {0}")]
    Capture(String),

    #[error("pixel conversion error: {0}")]
    Convert(String),

    #[error("video encoder error: {0}")]
    Encode(String),

    #[error("audio capture error: {0}")]
    Audio(String),

    #[error("opus encoder error: {0}")]
    Opus(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed control message: {0}")]
    ControlMessage(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DeskcastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_error_display() {
        let e = DeskcastError::Capture("XShmGetImage failed".into());
        assert!(e.to_string().contains("XShmGetImage failed"));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken");
        let err: DeskcastError = io_err.into();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: DeskcastError = json_err.into();
        assert!(matches!(err, DeskcastError::ControlMessage(_)));
    }
}
