//! Reference retry classifiers
//!
//! Which errors are worth retrying is the caller's decision. These helpers
//! cover the two common cases: never retry, and retry transport failures.

use std::error::Error;
use std::io;

/// Message fragments of transport-level failures, matched case-insensitively
const TRANSPORT_SIGNATURES: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection aborted",
    "broken pipe",
    "unexpected eof",
    "dial tcp",
    "dial udp",
    "error trying to connect",
    "failed to connect",
];

/// Capability of an error to report itself as a temporary network failure
pub trait TemporaryError {
    fn is_temporary(&self) -> bool;
}

/// Conservative default: nothing is retryable
pub fn never_retry<E: ?Sized>(_err: &E) -> bool {
    false
}

/// Whether the error, or anything in its `source()` chain, is a
/// transport-level failure
pub fn is_network_error<E>(err: &E) -> bool
where
    E: Error + 'static,
{
    let mut current: Option<&(dyn Error + 'static)> = Some(err);
    while let Some(e) = current {
        let io_kind = e.downcast_ref::<io::Error>().map(io::Error::kind);
        if io_kind.is_some_and(is_transport_io_kind) {
            return true;
        }
        if matches_transport_signature(&e.to_string()) {
            return true;
        }
        current = e.source();
    }
    false
}

/// [`is_network_error`], or the error says it is temporary
pub fn is_temporary_network_error<E>(err: &E) -> bool
where
    E: Error + TemporaryError + 'static,
{
    err.is_temporary() || is_network_error(err)
}

fn is_transport_io_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
    )
}

fn matches_transport_signature(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    TRANSPORT_SIGNATURES
        .iter()
        .any(|signature| message.contains(signature))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    enum ClientError {
        #[error("request failed")]
        Transport(#[source] io::Error),

        #[error("server returned {0}")]
        Status(u16),

        #[error("gateway busy")]
        Busy,
    }

    impl TemporaryError for ClientError {
        fn is_temporary(&self) -> bool {
            matches!(self, ClientError::Busy)
        }
    }

    #[test]
    fn test_never_retry() {
        assert!(!never_retry(&ClientError::Status(503)));
        assert!(!never_retry("anything"));
    }

    #[test]
    fn test_io_kinds() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "nope");
        assert!(is_network_error(&refused));

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert!(!is_network_error(&denied));
    }

    #[test]
    fn test_walks_source_chain() {
        let err = ClientError::Transport(io::Error::new(io::ErrorKind::BrokenPipe, "write"));
        assert!(is_network_error(&err));
        assert!(!is_network_error(&ClientError::Status(409)));
    }

    #[test]
    fn test_message_signatures() {
        let err = io::Error::other("dial tcp 10.0.0.1:443: Connection Refused");
        assert!(is_network_error(&err));

        let err = io::Error::other("read: unexpected EOF");
        assert!(is_network_error(&err));

        let err = io::Error::other("name already in use");
        assert!(!is_network_error(&err));
    }

    #[test]
    fn test_temporary_capability() {
        assert!(is_temporary_network_error(&ClientError::Busy));
        assert!(!is_temporary_network_error(&ClientError::Status(400)));
    }
}
