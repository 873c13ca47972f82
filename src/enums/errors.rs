///
/// errors.rs
///
/// Error taxonomy of the playback engine, one enum per failure class.
/// `SessionError` aggregates them for the controller.
///
use std::{io, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
}

#[derive(Debug, Error)]
pub enum SoapError {
    #[error("{action}: no response from renderer after {attempts} attempt(s)")]
    NoResponse { action: &'static str, attempts: u32 },
    #[error("{action}: renderer returned a SOAP fault ({detail})")]
    Fault { action: &'static str, detail: String },
    #[error("{action}: unexpected response ({reason})")]
    Parse { action: &'static str, reason: String },
    #[error("{action}: service not offered by this renderer")]
    Unsupported { action: &'static str },
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no network route to {host}: {source}")]
    NoRoute {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("Cannot reach TV at {host}. Is it turned on?")]
    NoTransport { host: String },
    #[error("invalid renderer address '{0}'")]
    InvalidHost(String),
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("could not run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("probe failed ({status}): {stderr}")]
    Failed { status: String, stderr: String },
    #[error("unreadable probe output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no audio or video stream found")]
    NoStreams,
}

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("could not start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("producer has no output pipe")]
    NoPipe,
    #[error("producer exited during startup ({0})")]
    ExitedEarly(String),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("could not listen on {addr}: {reason}")]
    Bind { addr: String, reason: String },
    #[error("could not start the server thread: {0}")]
    Thread(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Resolution(#[from] ResolveError),
    #[error("{}: {source}", path.display())]
    Negotiation {
        path: PathBuf,
        #[source]
        source: ProbeError,
    },
    #[error(transparent)]
    ProducerSetup(#[from] ProducerError),
    #[error(transparent)]
    Soap(#[from] SoapError),
    #[error(transparent)]
    Serving(#[from] ServerError),
    #[error("nothing to play")]
    EmptyPlaylist,
}

impl SessionError {
    /// failures that only cost the current playlist item
    #[must_use]
    pub fn is_item_local(&self) -> bool {
        matches!(
            self,
            SessionError::Negotiation { .. } | SessionError::ProducerSetup(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let e = ResolveError::NoTransport {
            host: "192.168.1.20".into(),
        };
        assert_eq!(
            e.to_string(),
            "Cannot reach TV at 192.168.1.20. Is it turned on?"
        );
        let e = SessionError::from(SoapError::NoResponse {
            action: "Play",
            attempts: 3,
        });
        assert_eq!(
            e.to_string(),
            "Play: no response from renderer after 3 attempt(s)"
        );
        assert!(!e.is_item_local());
        let e = SessionError::Negotiation {
            path: "/tmp/a.mkv".into(),
            source: ProbeError::NoStreams,
        };
        assert!(e.is_item_local());
        assert_eq!(e.to_string(), "/tmp/a.mkv: no audio or video stream found");
    }
}
