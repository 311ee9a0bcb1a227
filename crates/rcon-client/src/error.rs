use std::io::ErrorKind;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RconError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?} waiting for the server")]
    Timeout(Duration),

    #[error("timed out after {0:?} writing to the server")]
    WriteTimeout(Duration),

    #[error("connection closed by the server")]
    ConnectionClosed,

    #[error("authentication rejected by the server")]
    AuthRejected,

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("connection was re-established but `{command}` was not confirmed: {source}")]
    CommandLost {
        command: String,
        #[source]
        source: Box<RconError>,
    },

    #[error("giving up after {attempts} reconnect attempts")]
    ReconnectExhausted { attempts: u32 },
}

impl RconError {
    /// Whether the link this error came from is unusable and has to be
    /// replaced before the next command.
    ///
    /// Timeouts leave the link in place: the server may still answer, and
    /// the late response is discarded by request id on the next exchange.
    pub fn is_connection_terminated(&self) -> bool {
        match self {
            RconError::ConnectionClosed
            | RconError::MalformedPacket(_)
            | RconError::WriteTimeout(_) => true,
            RconError::Io(e) => !matches!(
                e.kind(),
                ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
            ),
            RconError::Timeout(_)
            | RconError::AuthRejected
            | RconError::CommandLost { .. }
            | RconError::ReconnectExhausted { .. } => false,
        }
    }
}
