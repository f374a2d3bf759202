//! Engine error types
//!
//! A single closed taxonomy shared by every layer. Decoder diagnostics are
//! translated once in the `sound` module; hardware failures are mapped to
//! `InvalidPointer` / `ExtensionMissing` / `OutOfMemory` by the `hardware`
//! module and never surface backend-specific detail beyond a message.

use thiserror::Error;

/// Errors that can occur during audio operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// The sound file does not exist
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// The container is not recognised or has no audio track
    #[error("Unrecognised format: {0}")]
    FormatError(String),

    /// The sample encoding or codec is not supported
    #[error("Unsupported encoding: {0}")]
    Encoding(String),

    /// The file is truncated or corrupt
    #[error("Malformed audio data: {0}")]
    Malformed(String),

    /// Any other I/O or operating-system failure while decoding
    #[error("System error: {0}")]
    SystemError(String),

    /// The output device could not be opened or failed
    #[error("Audio device error: {0}")]
    DeviceError(String),

    /// The process-wide audio context could not be created
    #[error("Audio context error: {0}")]
    ContextError(String),

    /// The hardware lacks a required capability
    #[error("Audio extension missing: {0}")]
    ExtensionMissing(&'static str),

    /// The stream does not support seeking
    #[error("Stream is not seekable")]
    CannotSeek,

    /// The operation needs a bound sound but the channel has none
    #[error("No sound bound to channel")]
    NoSound,

    /// Bad channel index, seek position or parameter value
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// A required argument was missing
    #[error("Required argument missing: {0}")]
    NullPointer(&'static str),

    /// A handle does not name a live object
    #[error("Invalid handle: {0}")]
    InvalidPointer(String),

    /// A channel worker thread could not be spawned
    #[error("Failed to spawn channel worker: {0}")]
    ThreadFailure(String),

    /// A hardware resource could not be allocated
    #[error("Out of audio resources: {0}")]
    OutOfMemory(String),
}

impl AudioError {
    /// Map an I/O error raised while reading a sound file
    pub(crate) fn from_io(err: &std::io::Error, context: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => AudioError::FileNotFound(context.to_string()),
            std::io::ErrorKind::UnexpectedEof => {
                AudioError::Malformed(format!("{}: unexpected end of file", context))
            }
            _ => AudioError::SystemError(format!("{}: {}", context, err)),
        }
    }
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_mapping() {
        let missing = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert_eq!(
            AudioError::from_io(&missing, "a.wav"),
            AudioError::FileNotFound("a.wav".to_string())
        );

        let eof = std::io::Error::from(std::io::ErrorKind::UnexpectedEof);
        assert!(matches!(AudioError::from_io(&eof, "a.wav"), AudioError::Malformed(_)));

        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(matches!(AudioError::from_io(&denied, "a.wav"), AudioError::SystemError(_)));
    }

    #[test]
    fn test_display() {
        assert_eq!(AudioError::NoSound.to_string(), "No sound bound to channel");
        assert_eq!(
            AudioError::OutOfRange("channel 40".into()).to_string(),
            "Value out of range: channel 40"
        );
    }
}
