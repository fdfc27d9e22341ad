use std::io;

use lxi_protocol::error::ProtocolError;

/// Errors reported by [`crate::Instrument`].
///
/// Silence and unparseable scalar replies are not errors; they surface as
/// empty replies and sentinel values.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The operation needs an established connection.
    #[error("not connected")]
    NotConnected,

    /// The instrument closed or reset the socket.
    #[error("connection lost")]
    ConnectionLost,

    /// The send budget ran out before the command was written.
    #[error("timed out sending command")]
    Timeout,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Maps a data-path I/O error, folding the various "peer went away" kinds
/// into [`Error::ConnectionLost`].
pub(crate) fn map_io_error(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotConnected
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::UnexpectedEof => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_errors_become_connection_lost() {
        for kind in [io::ErrorKind::ConnectionReset, io::ErrorKind::BrokenPipe] {
            assert!(matches!(
                map_io_error(io::Error::from(kind)),
                Error::ConnectionLost
            ));
        }
        assert!(matches!(
            map_io_error(io::Error::from(io::ErrorKind::PermissionDenied)),
            Error::Io(_)
        ));
    }

    #[test]
    fn display() {
        assert_eq!(Error::NotConnected.to_string(), "not connected");
        assert_eq!(
            Error::from(ProtocolError::EmptyCommand).to_string(),
            "Refusing to send an empty command"
        );
    }
}
