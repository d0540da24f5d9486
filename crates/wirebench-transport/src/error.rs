//! Normalisation of client-library errors into [`ErrorKind`]s.

use std::error::Error as StdError;
use std::fmt::Write as _;

use tokio_tungstenite::tungstenite;
use wirebench_core::ErrorKind;

/// Render an error with its full source chain, `outer: inner: root`.
pub fn error_chain(err: &dyn StdError) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.contains(&text) {
            let _ = write!(out, ": {text}");
        }
        source = cause.source();
    }
    out
}

/// Classify a `reqwest` failure.
pub fn classify_reqwest(err: &reqwest::Error) -> (ErrorKind, String) {
    let kind = if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_connect() || err.is_request() || err.is_body() {
        ErrorKind::ConnectionFailed
    } else {
        ErrorKind::ProtocolError
    };
    (kind, error_chain(err))
}

/// Classify a WebSocket failure.
pub fn classify_ws(err: &tungstenite::Error) -> (ErrorKind, String) {
    use tungstenite::Error;

    let kind = match err {
        Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => ErrorKind::Timeout,
        Error::Io(_) | Error::ConnectionClosed | Error::AlreadyClosed => {
            ErrorKind::ConnectionFailed
        }
        Error::Http(response) => {
            return (
                ErrorKind::ProtocolError,
                format!("handshake rejected with HTTP {}", response.status()),
            );
        }
        Error::Url(_) | Error::HttpFormat(_) | Error::Protocol(_) | Error::Capacity(_) => {
            ErrorKind::ProtocolError
        }
        _ => ErrorKind::ConnectionFailed,
    };
    (kind, error_chain(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Layer(&'static str, Option<Box<Layer>>);

    impl std::fmt::Display for Layer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }

    impl StdError for Layer {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            self.1.as_deref().map(|l| l as &(dyn StdError + 'static))
        }
    }

    #[test]
    fn chain_joins_sources_without_repeats() {
        let err = Layer(
            "request failed",
            Some(Box::new(Layer(
                "connect error",
                Some(Box::new(Layer("connection refused", None))),
            ))),
        );
        assert_eq!(
            error_chain(&err),
            "request failed: connect error: connection refused"
        );

        let repeated = Layer("io: refused", Some(Box::new(Layer("refused", None))));
        assert_eq!(error_chain(&repeated), "io: refused");
    }

    #[test]
    fn ws_io_errors() {
        let refused = tungstenite::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert_eq!(classify_ws(&refused).0, ErrorKind::ConnectionFailed);

        let timed_out = tungstenite::Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "slow",
        ));
        assert_eq!(classify_ws(&timed_out).0, ErrorKind::Timeout);
    }

    #[test]
    fn ws_protocol_errors() {
        let err = tungstenite::Error::Protocol(
            tungstenite::error::ProtocolError::HandshakeIncomplete,
        );
        assert_eq!(classify_ws(&err).0, ErrorKind::ProtocolError);
        assert_eq!(
            classify_ws(&tungstenite::Error::ConnectionClosed).0,
            ErrorKind::ConnectionFailed
        );
    }
}
