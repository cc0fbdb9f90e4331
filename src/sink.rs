//! Outbound HTTP sink: serializes a [`Payload`] and POSTs it to the configured endpoint (§4.8).

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::payload::Payload;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sending payload: {0}")]
    Request(#[from] reqwest::Error),
    #[error("endpoint returned status {0}")]
    BadStatus(reqwest::StatusCode),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("reading API credentials file: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing API credentials file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("agent_uuid is required in API credentials file")]
    MissingAgentUuid,
    #[error("api_key is required in API credentials file")]
    MissingApiKey,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiAuth {
    pub agent_uuid: String,
    pub api_key: String,
    pub api_url: String,
}

impl ApiAuth {
    /// Loads and validates credentials from `path`. Missing `agent_uuid`/`api_key` is fatal
    /// (§6); an absent file is the caller's concern (disabling the sink entirely), which it
    /// distinguishes via [`AuthError::file_absent`] on the returned error.
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let contents = fs::read_to_string(path)?;
        let auth: ApiAuth = serde_json::from_str(&contents)?;
        if auth.agent_uuid.is_empty() {
            return Err(AuthError::MissingAgentUuid);
        }
        if auth.api_key.is_empty() {
            return Err(AuthError::MissingApiKey);
        }
        Ok(auth)
    }
}

impl AuthError {
    /// True when `path` simply didn't exist, the "absent file disables the sink" case (§6).
    /// Any other error (malformed JSON, missing required fields) is a fatal misconfiguration.
    pub fn file_absent(&self) -> bool {
        matches!(self, AuthError::Io(err) if err.kind() == std::io::ErrorKind::NotFound)
    }
}

pub trait Sink {
    fn send(&self, payload: &Payload) -> Result<(), SinkError>;
}

pub struct HttpSink {
    client: reqwest::blocking::Client,
    auth: ApiAuth,
}

impl HttpSink {
    pub fn new(auth: ApiAuth) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            auth,
        }
    }
}

impl Sink for HttpSink {
    fn send(&self, payload: &Payload) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.auth.api_url)
            .header("Content-Type", "application/json")
            .header("X-Agent-UUID", &self.auth.agent_uuid)
            .header("X-API-Key", &self.auth.api_key)
            .json(payload)
            .send()?;

        if response.status().as_u16() >= 300 {
            return Err(SinkError::BadStatus(response.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_auth(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_valid_credentials() {
        let f = write_auth(
            r#"{"agent_uuid": "abc", "api_key": "secret", "api_url": "https://example.com/api"}"#,
        );
        let auth = ApiAuth::load(f.path()).unwrap();
        assert_eq!(auth.agent_uuid, "abc");
    }

    #[test]
    fn missing_agent_uuid_is_fatal() {
        let f = write_auth(r#"{"agent_uuid": "", "api_key": "secret", "api_url": "https://x"}"#);
        let err = ApiAuth::load(f.path()).unwrap_err();
        assert!(matches!(err, AuthError::MissingAgentUuid));
    }

    #[test]
    fn missing_api_key_is_fatal() {
        let f = write_auth(r#"{"agent_uuid": "abc", "api_key": "", "api_url": "https://x"}"#);
        let err = ApiAuth::load(f.path()).unwrap_err();
        assert!(matches!(err, AuthError::MissingApiKey));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let f = write_auth("not json");
        assert!(ApiAuth::load(f.path()).is_err());
    }

    #[test]
    fn missing_file_is_reported_as_absent() {
        let err = ApiAuth::load(Path::new("/nonexistent/watchd-api.json")).unwrap_err();
        assert!(err.file_absent());
    }

    #[test]
    fn invalid_credentials_are_not_reported_as_absent() {
        let f = write_auth(r#"{"agent_uuid": "", "api_key": "secret", "api_url": "https://x"}"#);
        let err = ApiAuth::load(f.path()).unwrap_err();
        assert!(!err.file_absent());
    }
}
