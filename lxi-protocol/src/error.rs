use std::io;

/// Errors raised while encoding commands or interpreting structured replies.
///
/// Replies that merely fail to parse as a scalar are not errors; see
/// [`crate::decode::Decoded`].
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Refusing to send an empty command")]
    EmptyCommand,
    #[error("Invalid endpoint {0}")]
    InvalidEndpoint(String),
    #[error("Invalid identity reply {0:?}")]
    InvalidIdentity(String),
    #[error("Invalid waveform preamble: {0}")]
    InvalidPreamble(String),
    #[error("Invalid block header: {0}")]
    InvalidBlockHeader(String),
    #[error("Command too long! Maximum is {max}, but got {got}")]
    CommandTooLong { max: usize, got: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            ProtocolError::EmptyCommand.to_string(),
            "Refusing to send an empty command"
        );
        assert_eq!(
            ProtocolError::CommandTooLong { max: 4, got: 9 }.to_string(),
            "Command too long! Maximum is 4, but got 9"
        );
    }

    #[test]
    fn from_io() {
        let err: ProtocolError = io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(err, ProtocolError::Io(_)));
    }
}
